//! Property-based tests for the invariants of streams and replay.

use std::collections::BTreeSet;

use proptest::prelude::*;
use serde::{Deserialize, Serialize};
use streamstore::{
    Aggregate, CommitId, Event, EventPayload, Replayer, StreamId, StreamRevision, StreamStore,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SomethingHappened {
    something: String,
}

impl Event for SomethingHappened {
    const EVENT_TYPE: &'static str = "SomethingHappened";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Unhandled {
    n: u8,
}

impl Event for Unhandled {
    const EVENT_TYPE: &'static str = "Unhandled";
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Happenings {
    somethings: BTreeSet<String>,
    count: usize,
}

impl Aggregate for Happenings {
    fn replayer() -> Replayer<Self> {
        Replayer::new().on::<SomethingHappened, _>(|state: &mut Self, event| {
            let _ = state.somethings.insert(event.something);
            state.count += 1;
        })
    }
}

#[derive(Debug, Clone)]
enum Step {
    Known(String),
    Unknown(u8),
}

impl Step {
    fn payload(&self) -> EventPayload {
        let encoded = match self {
            Self::Known(something) => EventPayload::encode(&SomethingHappened {
                something: something.clone(),
            }),
            Self::Unknown(n) => EventPayload::encode(&Unhandled { n: *n }),
        };
        encoded.expect("test events encode")
    }

    const fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        3 => "[a-z]{1,8}".prop_map(Step::Known),
        1 => any::<u8>().prop_map(Step::Unknown),
    ]
}

fn arb_stream_id() -> impl Strategy<Value = StreamId> {
    "[a-zA-Z0-9][a-zA-Z0-9._-]{0,40}"
        .prop_filter_map("Invalid StreamId", |s| StreamId::try_new(s).ok())
}

proptest! {
    #[test]
    fn revision_never_decreases(
        stream_id in arb_stream_id(),
        batches in prop::collection::vec(0usize..4, 1..8),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let store = StreamStore::in_memory();
            let mut stream = store.create_stream(stream_id.clone());
            let mut last = stream.stream_revision();
            let mut total = 0u64;

            for size in batches {
                for n in 0..size {
                    let _ = stream
                        .add_event(&SomethingHappened { something: format!("e{n}") })
                        .unwrap();
                }
                let _ = stream.commit_changes(CommitId::new()).await.unwrap();
                total += size as u64;

                prop_assert!(stream.stream_revision() >= last);
                prop_assert_eq!(stream.stream_revision(), StreamRevision::new(total));
                last = stream.stream_revision();
            }

            let reopened = store
                .open_stream(stream_id, StreamRevision::initial(), StreamRevision::unbounded())
                .await
                .unwrap();
            prop_assert_eq!(reopened.stream_revision(), last);
            prop_assert_eq!(reopened.committed_events().len() as u64, total);
            Ok(())
        })?;
    }

    #[test]
    fn snapshot_then_rest_equals_full_replay(
        steps in prop::collection::vec(arb_step(), 0..20),
        split in any::<prop::sample::Index>(),
    ) {
        let payloads: Vec<EventPayload> = steps.iter().map(Step::payload).collect();
        let k = split.index(payloads.len() + 1);
        let stream_id = StreamId::try_new("fold-split").unwrap();

        let full = Happenings::replay(&payloads).unwrap();

        let prefix = Happenings::replay(&payloads[..k]).unwrap();
        let snapshot = prefix
            .snapshot(stream_id, StreamRevision::new(k as u64))
            .unwrap();
        let resumed = Happenings::from_snapshot(Some(&snapshot), &payloads[k..]).unwrap();

        prop_assert_eq!(resumed, full);
    }

    #[test]
    fn unknown_events_are_as_if_absent(steps in prop::collection::vec(arb_step(), 0..20)) {
        let all: Vec<EventPayload> = steps.iter().map(Step::payload).collect();
        let known_only: Vec<EventPayload> = steps
            .iter()
            .filter(|step| step.is_known())
            .map(Step::payload)
            .collect();

        let with_unknown = Happenings::replay(&all);
        let without_unknown = Happenings::replay(&known_only);

        prop_assert!(with_unknown.is_ok());
        prop_assert_eq!(with_unknown.unwrap(), without_unknown.unwrap());
    }

    #[test]
    fn repeated_commit_id_never_double_applies(
        stream_id in arb_stream_id(),
        events in 1usize..5,
        retries in 1usize..4,
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let store = StreamStore::in_memory();
            let commit_id = CommitId::new();
            let mut stream = store.create_stream(stream_id.clone());
            for n in 0..events {
                let _ = stream
                    .add_event(&SomethingHappened { something: format!("e{n}") })
                    .unwrap();
            }
            let _ = stream.commit_changes(commit_id).await.unwrap();

            for _ in 0..retries {
                let outcome = stream.commit_changes(commit_id).await;
                prop_assert!(matches!(outcome, Err(ref error) if error.is_duplicate_commit()));
            }

            let reopened = store
                .open_stream(stream_id, StreamRevision::initial(), StreamRevision::unbounded())
                .await
                .unwrap();
            prop_assert_eq!(reopened.committed_events().len(), events);
            Ok(())
        })?;
    }
}
