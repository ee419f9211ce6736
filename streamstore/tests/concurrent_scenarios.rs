//! Concurrent writer tests.
//!
//! Sessions opened at the same revision race to commit from separate tokio
//! tasks. Exactly one commit per revision may win; every loser must observe a
//! concurrency conflict and leave nothing behind in the stream.

use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use streamstore::{
    CommitId, Event, EventStoreError, InMemoryPersistence, StreamId, StreamRevision, StreamStore,
};
use tokio::sync::Barrier;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CounterIncremented {
    writer: usize,
}

impl Event for CounterIncremented {
    const EVENT_TYPE: &'static str = "CounterIncremented";
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn exactly_one_of_many_racing_writers_wins() {
    let store = StreamStore::in_memory();
    let stream_id = StreamId::from_uuid(Uuid::now_v7());
    let writers = 8;
    let barrier = Arc::new(Barrier::new(writers));

    let mut handles = Vec::with_capacity(writers);
    for writer in 0..writers {
        let store = store.clone();
        let stream_id = stream_id.clone();
        let barrier = Arc::clone(&barrier);
        handles.push(tokio::spawn(async move {
            let mut stream = store
                .open_stream(stream_id, StreamRevision::initial(), StreamRevision::unbounded())
                .await?;
            let _ = stream.add_event(&CounterIncremented { writer })?;
            let _ = barrier.wait().await;
            stream.commit_changes(CommitId::new()).await
        }));
    }

    let outcomes: Vec<Result<_, EventStoreError>> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.expect("writer task panicked"))
        .collect();

    let winners = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
    let conflicts = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, Err(error) if error.is_concurrency_conflict()))
        .count();
    assert_eq!(winners, 1);
    assert_eq!(conflicts, writers - 1);

    let reopened = store
        .open_stream(stream_id, StreamRevision::initial(), StreamRevision::unbounded())
        .await
        .unwrap();
    assert_eq!(reopened.committed_events().len(), 1);
    assert_eq!(reopened.stream_revision(), StreamRevision::new(1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn writers_retrying_after_conflicts_all_land_in_order() {
    let backend = Arc::new(InMemoryPersistence::new());
    let stream_id = StreamId::from_uuid(Uuid::now_v7());
    let writers = 6;

    let handles = (0..writers).map(|writer| {
        // each task gets its own store handle over the shared backend
        let store = StreamStore::new(Arc::clone(&backend));
        let stream_id = stream_id.clone();
        tokio::spawn(async move {
            loop {
                let mut stream = store
                    .open_stream(
                        stream_id.clone(),
                        StreamRevision::initial(),
                        StreamRevision::unbounded(),
                    )
                    .await?;
                let _ = stream.add_event(&CounterIncremented { writer })?;
                match stream.commit_changes(CommitId::new()).await {
                    Ok(_) => return Ok::<_, EventStoreError>(()),
                    Err(error) if error.is_concurrency_conflict() => tokio::task::yield_now().await,
                    Err(error) => return Err(error),
                }
            }
        })
    });

    for joined in join_all(handles).await {
        joined.expect("writer task panicked").unwrap();
    }

    let store = StreamStore::new(backend);
    let commits = store
        .commits(&stream_id, StreamRevision::initial(), StreamRevision::unbounded())
        .await
        .unwrap();
    assert_eq!(commits.len(), writers);
    for (index, commit) in commits.iter().enumerate() {
        assert_eq!(commit.commit_sequence().into_inner(), index as u64 + 1);
        assert_eq!(commit.stream_revision().into_inner(), index as u64 + 1);
    }

    let mut seen: Vec<usize> = commits
        .iter()
        .flat_map(|commit| commit.events())
        .map(|event| {
            event
                .payload()
                .decode::<CounterIncremented>()
                .unwrap()
                .expect("counter event")
                .writer
        })
        .collect();
    seen.sort_unstable();
    assert_eq!(seen, (0..writers).collect::<Vec<_>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn writers_on_different_streams_do_not_conflict() {
    let store = StreamStore::in_memory();
    let streams: Vec<StreamId> = (0..5).map(|_| StreamId::from_uuid(Uuid::now_v7())).collect();
    let barrier = Arc::new(Barrier::new(streams.len()));

    let handles = streams.iter().cloned().enumerate().map(|(writer, stream_id)| {
        let store = store.clone();
        let barrier = Arc::clone(&barrier);
        tokio::spawn(async move {
            let mut stream = store.create_stream(stream_id);
            let _ = stream.add_event(&CounterIncremented { writer })?;
            let _ = barrier.wait().await;
            stream.commit_changes(CommitId::new()).await
        })
    });

    for joined in join_all(handles).await {
        let commit = joined.expect("writer task panicked").unwrap();
        assert!(commit.is_some());
    }
}
