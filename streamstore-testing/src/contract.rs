use std::fmt;

use serde::{Deserialize, Serialize};
use streamstore::{
    Commit, CommitAttempt, CommitId, CommitPersistence, Event, EventEnvelope, EventStoreError,
    Snapshot, StreamId, StreamRevision, StreamStore,
};
use uuid::Uuid;

#[derive(Debug)]
pub struct ContractTestFailure {
    scenario: &'static str,
    detail: String,
}

impl ContractTestFailure {
    fn new(scenario: &'static str, detail: impl Into<String>) -> Self {
        Self {
            scenario,
            detail: detail.into(),
        }
    }

    fn store_error(
        scenario: &'static str,
        operation: &'static str,
        error: EventStoreError,
    ) -> Self {
        Self::new(
            scenario,
            format!("{operation} operation returned unexpected error: {error}"),
        )
    }

    fn assertion(scenario: &'static str, detail: impl Into<String>) -> Self {
        Self::new(scenario, detail)
    }
}

impl fmt::Display for ContractTestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.scenario, self.detail)
    }
}

impl std::error::Error for ContractTestFailure {}

pub type ContractTestResult = Result<(), ContractTestFailure>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractTestEvent {
    label: String,
}

impl ContractTestEvent {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Event for ContractTestEvent {
    const EVENT_TYPE: &'static str = "ContractTestEvent";
}

fn contract_stream_id(
    scenario: &'static str,
    label: &str,
) -> Result<StreamId, ContractTestFailure> {
    // Include UUID for parallel test execution against shared database
    let raw = format!("contract::{scenario}::{label}::{}", Uuid::now_v7());

    StreamId::try_new(raw.clone()).map_err(|error| {
        ContractTestFailure::assertion(
            scenario,
            format!("unable to construct stream id `{raw}`: {error}"),
        )
    })
}

fn contract_attempt(
    scenario: &'static str,
    stream_id: &StreamId,
    expected_revision: u64,
    commit_id: CommitId,
    labels: &[&str],
) -> Result<CommitAttempt, ContractTestFailure> {
    let events = labels
        .iter()
        .map(|label| EventEnvelope::new(stream_id.clone(), &ContractTestEvent::new(*label)))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|error| ContractTestFailure::store_error(scenario, "encode", error))?;

    CommitAttempt::new(
        stream_id.clone(),
        StreamRevision::new(expected_revision),
        commit_id,
        events,
    )
    .map_err(|error| ContractTestFailure::store_error(scenario, "commit_attempt", error))
}

async fn append_contract_commit<P: CommitPersistence>(
    scenario: &'static str,
    persistence: &P,
    stream_id: &StreamId,
    expected_revision: u64,
    labels: &[&str],
) -> Result<Commit, ContractTestFailure> {
    let attempt = contract_attempt(
        scenario,
        stream_id,
        expected_revision,
        CommitId::new(),
        labels,
    )?;
    persistence
        .append(attempt)
        .await
        .map_err(|error| ContractTestFailure::store_error(scenario, "append", error))
}

async fn read_all<P: CommitPersistence>(
    scenario: &'static str,
    persistence: &P,
    stream_id: &StreamId,
) -> Result<Vec<Commit>, ContractTestFailure> {
    persistence
        .read_commits(stream_id, StreamRevision::initial(), StreamRevision::unbounded())
        .await
        .map_err(|error| ContractTestFailure::store_error(scenario, "read_commits", error))
}

fn labels_of(commits: &[Commit]) -> Vec<String> {
    commits
        .iter()
        .flat_map(Commit::events)
        .filter_map(|event| event.payload().decode::<ContractTestEvent>().ok().flatten())
        .map(|event| event.label)
        .collect()
}

pub async fn test_basic_append_read<F, P>(make_persistence: F) -> ContractTestResult
where
    F: Fn() -> P + Send + Sync + Clone + 'static,
    P: CommitPersistence + 'static,
{
    const SCENARIO: &str = "basic_append_read";

    let persistence = make_persistence();
    let stream_id = contract_stream_id(SCENARIO, "single")?;

    let first = append_contract_commit(SCENARIO, &persistence, &stream_id, 0, &["a", "b"]).await?;
    let second = append_contract_commit(SCENARIO, &persistence, &stream_id, 2, &["c"]).await?;

    if first.stream_revision() != StreamRevision::new(2)
        || second.stream_revision() != StreamRevision::new(3)
    {
        return Err(ContractTestFailure::assertion(
            SCENARIO,
            format!(
                "expected commit revisions 2 and 3, observed {} and {}",
                first.stream_revision(),
                second.stream_revision()
            ),
        ));
    }

    if second.commit_sequence() != first.commit_sequence().next() {
        return Err(ContractTestFailure::assertion(
            SCENARIO,
            format!(
                "expected consecutive commit sequences, observed {} then {}",
                first.commit_sequence(),
                second.commit_sequence()
            ),
        ));
    }

    let commits = read_all(SCENARIO, &persistence, &stream_id).await?;
    if commits != vec![first, second] {
        return Err(ContractTestFailure::assertion(
            SCENARIO,
            format!(
                "read_commits did not return the appended commits in order, observed {} commits",
                commits.len()
            ),
        ));
    }

    let labels = labels_of(&commits);
    if labels != ["a", "b", "c"] {
        return Err(ContractTestFailure::assertion(
            SCENARIO,
            format!("expected events a, b, c in order, observed {labels:?}"),
        ));
    }

    let head = persistence
        .stream_head(&stream_id)
        .await
        .map_err(|error| ContractTestFailure::store_error(SCENARIO, "stream_head", error))?;
    match head {
        Some(head) if head.revision == StreamRevision::new(3) => Ok(()),
        other => Err(ContractTestFailure::assertion(
            SCENARIO,
            format!("expected stream head at revision 3, observed {other:?}"),
        )),
    }
}

pub async fn test_concurrent_revision_conflicts<F, P>(make_persistence: F) -> ContractTestResult
where
    F: Fn() -> P + Send + Sync + Clone + 'static,
    P: CommitPersistence + 'static,
{
    const SCENARIO: &str = "concurrent_revision_conflicts";

    let persistence = make_persistence();
    let stream_id = contract_stream_id(SCENARIO, "shared")?;

    let _ = append_contract_commit(SCENARIO, &persistence, &stream_id, 0, &["first"]).await?;

    let stale = contract_attempt(SCENARIO, &stream_id, 0, CommitId::new(), &["second"])?;
    match persistence.append(stale).await {
        Err(EventStoreError::ConcurrencyConflict {
            expected, current, ..
        }) if expected == StreamRevision::initial() && current == StreamRevision::new(1) => {}
        Err(error) => return Err(ContractTestFailure::store_error(SCENARIO, "append", error)),
        Ok(_) => {
            return Err(ContractTestFailure::assertion(
                SCENARIO,
                "expected concurrency conflict but append succeeded",
            ))
        }
    }

    let commits = read_all(SCENARIO, &persistence, &stream_id).await?;
    let labels = labels_of(&commits);
    if labels != ["first"] {
        return Err(ContractTestFailure::assertion(
            SCENARIO,
            format!("expected only the winning commit to be stored, observed {labels:?}"),
        ));
    }

    Ok(())
}

/// Two independently constructed backends over the same storage each open the
/// stream at revision 0 and commit. The second must see a conflict.
pub async fn test_conflict_across_connections<F, P>(make_persistence: F) -> ContractTestResult
where
    F: Fn() -> P + Send + Sync + Clone + 'static,
    P: CommitPersistence + 'static,
{
    const SCENARIO: &str = "conflict_across_connections";

    let first_store = StreamStore::new(make_persistence());
    let second_store = StreamStore::new(make_persistence());
    let stream_id = contract_stream_id(SCENARIO, "shared")?;

    let mut first = first_store
        .open_stream(
            stream_id.clone(),
            StreamRevision::initial(),
            StreamRevision::unbounded(),
        )
        .await
        .map_err(|error| ContractTestFailure::store_error(SCENARIO, "open_stream", error))?;
    let mut second = second_store
        .open_stream(
            stream_id.clone(),
            StreamRevision::initial(),
            StreamRevision::unbounded(),
        )
        .await
        .map_err(|error| ContractTestFailure::store_error(SCENARIO, "open_stream", error))?;

    let _ = first
        .add_event(&ContractTestEvent::new("data1"))
        .map_err(|error| ContractTestFailure::store_error(SCENARIO, "add_event", error))?;
    let _ = first
        .commit_changes(CommitId::new())
        .await
        .map_err(|error| ContractTestFailure::store_error(SCENARIO, "commit_changes", error))?;

    let _ = second
        .add_event(&ContractTestEvent::new("data2"))
        .map_err(|error| ContractTestFailure::store_error(SCENARIO, "add_event", error))?;
    match second.commit_changes(CommitId::new()).await {
        Err(error) if error.is_concurrency_conflict() => {}
        Err(error) => {
            return Err(ContractTestFailure::store_error(
                SCENARIO,
                "commit_changes",
                error,
            ))
        }
        Ok(_) => {
            return Err(ContractTestFailure::assertion(
                SCENARIO,
                "expected the second connection to observe a concurrency conflict",
            ))
        }
    }

    if second.uncommitted_events().len() != 1 {
        return Err(ContractTestFailure::assertion(
            SCENARIO,
            "the losing session should keep its uncommitted event",
        ));
    }

    Ok(())
}

pub async fn test_duplicate_commit_detection<F, P>(make_persistence: F) -> ContractTestResult
where
    F: Fn() -> P + Send + Sync + Clone + 'static,
    P: CommitPersistence + 'static,
{
    const SCENARIO: &str = "duplicate_commit_detection";

    let persistence = make_persistence();
    let stream_id = contract_stream_id(SCENARIO, "retry")?;
    let commit_id = CommitId::new();

    let attempt = contract_attempt(SCENARIO, &stream_id, 0, commit_id, &["once"])?;
    let _ = persistence
        .append(attempt.clone())
        .await
        .map_err(|error| ContractTestFailure::store_error(SCENARIO, "append", error))?;

    // Retried with the stale revision: duplicate wins over conflict.
    match persistence.append(attempt).await {
        Err(error) if error.is_duplicate_commit() => {}
        Err(error) => return Err(ContractTestFailure::store_error(SCENARIO, "append", error)),
        Ok(_) => {
            return Err(ContractTestFailure::assertion(
                SCENARIO,
                "expected duplicate commit but the retry was appended",
            ))
        }
    }

    // Same commit id at the current revision is still a duplicate.
    let current = contract_attempt(SCENARIO, &stream_id, 1, commit_id, &["again"])?;
    match persistence.append(current).await {
        Err(error) if error.is_duplicate_commit() => {}
        Err(error) => return Err(ContractTestFailure::store_error(SCENARIO, "append", error)),
        Ok(_) => {
            return Err(ContractTestFailure::assertion(
                SCENARIO,
                "expected duplicate commit for a reused commit id",
            ))
        }
    }

    let commits = read_all(SCENARIO, &persistence, &stream_id).await?;
    if commits.len() != 1 {
        return Err(ContractTestFailure::assertion(
            SCENARIO,
            format!(
                "expected exactly one stored commit, observed {}",
                commits.len()
            ),
        ));
    }

    Ok(())
}

pub async fn test_missing_stream_reads<F, P>(make_persistence: F) -> ContractTestResult
where
    F: Fn() -> P + Send + Sync + Clone + 'static,
    P: CommitPersistence + 'static,
{
    const SCENARIO: &str = "missing_stream_reads";

    let persistence = make_persistence();
    let stream_id = contract_stream_id(SCENARIO, "ghost")?;

    let commits = read_all(SCENARIO, &persistence, &stream_id).await?;
    if !commits.is_empty() {
        return Err(ContractTestFailure::assertion(
            SCENARIO,
            "expected read_commits to succeed with no commits for an untouched stream",
        ));
    }

    let head = persistence
        .stream_head(&stream_id)
        .await
        .map_err(|error| ContractTestFailure::store_error(SCENARIO, "stream_head", error))?;
    if head.is_some() {
        return Err(ContractTestFailure::assertion(
            SCENARIO,
            "expected no stream head for an untouched stream",
        ));
    }

    let snapshot = persistence
        .get_snapshot(&stream_id, StreamRevision::unbounded())
        .await
        .map_err(|error| ContractTestFailure::store_error(SCENARIO, "get_snapshot", error))?;
    if snapshot.is_some() {
        return Err(ContractTestFailure::assertion(
            SCENARIO,
            "expected no snapshot for an untouched stream",
        ));
    }

    Ok(())
}

pub async fn test_stream_isolation<F, P>(make_persistence: F) -> ContractTestResult
where
    F: Fn() -> P + Send + Sync + Clone + 'static,
    P: CommitPersistence + 'static,
{
    const SCENARIO: &str = "stream_isolation";

    let persistence = make_persistence();
    let left_stream = contract_stream_id(SCENARIO, "left")?;
    let right_stream = contract_stream_id(SCENARIO, "right")?;

    // Both streams start at revision 0; revisions are per stream.
    let _ = append_contract_commit(SCENARIO, &persistence, &left_stream, 0, &["left"]).await?;
    let _ = append_contract_commit(SCENARIO, &persistence, &right_stream, 0, &["right"]).await?;

    let left = read_all(SCENARIO, &persistence, &left_stream).await?;
    let right = read_all(SCENARIO, &persistence, &right_stream).await?;

    if labels_of(&left) != ["left"] {
        return Err(ContractTestFailure::assertion(
            SCENARIO,
            format!("left stream read {:?}", labels_of(&left)),
        ));
    }

    if labels_of(&right) != ["right"] {
        return Err(ContractTestFailure::assertion(
            SCENARIO,
            format!("right stream read {:?}", labels_of(&right)),
        ));
    }

    if left
        .iter()
        .chain(right.iter())
        .any(|commit| commit.events().iter().any(|e| e.stream_id() != commit.stream_id()))
    {
        return Err(ContractTestFailure::assertion(
            SCENARIO,
            "read events belonging to another stream",
        ));
    }

    Ok(())
}

pub async fn test_revision_window<F, P>(make_persistence: F) -> ContractTestResult
where
    F: Fn() -> P + Send + Sync + Clone + 'static,
    P: CommitPersistence + 'static,
{
    const SCENARIO: &str = "revision_window";

    let persistence = make_persistence();
    let stream_id = contract_stream_id(SCENARIO, "windowed")?;

    // revisions 1..=2, 3..=4, 5
    let _ = append_contract_commit(SCENARIO, &persistence, &stream_id, 0, &["a", "b"]).await?;
    let _ = append_contract_commit(SCENARIO, &persistence, &stream_id, 2, &["c", "d"]).await?;
    let _ = append_contract_commit(SCENARIO, &persistence, &stream_id, 4, &["e"]).await?;

    let cases: [(u64, u64, &[u64]); 4] = [
        (0, 1, &[1]),
        (2, 4, &[2]),
        (1, 3, &[1, 2]),
        (5, u64::MAX, &[]),
    ];

    for (min, max, expected) in cases {
        let commits = persistence
            .read_commits(&stream_id, StreamRevision::new(min), StreamRevision::new(max))
            .await
            .map_err(|error| ContractTestFailure::store_error(SCENARIO, "read_commits", error))?;
        let sequences: Vec<u64> = commits
            .iter()
            .map(|commit| commit.commit_sequence().into_inner())
            .collect();
        if sequences != expected {
            return Err(ContractTestFailure::assertion(
                SCENARIO,
                format!(
                    "window ({min}, {max}] expected commits {expected:?}, observed {sequences:?}"
                ),
            ));
        }
    }

    Ok(())
}

pub async fn test_snapshot_lookup<F, P>(make_persistence: F) -> ContractTestResult
where
    F: Fn() -> P + Send + Sync + Clone + 'static,
    P: CommitPersistence + 'static,
{
    const SCENARIO: &str = "snapshot_lookup";

    let persistence = make_persistence();
    let stream_id = contract_stream_id(SCENARIO, "snapshotted")?;
    let _ = append_contract_commit(
        SCENARIO,
        &persistence,
        &stream_id,
        0,
        &["1", "2", "3", "4", "5", "6"],
    )
    .await?;

    for revision in [3_u64, 6] {
        let snapshot = Snapshot::new(
            stream_id.clone(),
            StreamRevision::new(revision),
            serde_json::json!({ "revision": revision }),
        );
        let added = persistence
            .add_snapshot(snapshot)
            .await
            .map_err(|error| ContractTestFailure::store_error(SCENARIO, "add_snapshot", error))?;
        if !added {
            return Err(ContractTestFailure::assertion(
                SCENARIO,
                format!("snapshot at revision {revision} was not stored"),
            ));
        }
    }

    let cases: [(u64, Option<u64>); 4] = [(2, None), (3, Some(3)), (5, Some(3)), (u64::MAX, Some(6))];
    for (max, expected) in cases {
        let found = persistence
            .get_snapshot(&stream_id, StreamRevision::new(max))
            .await
            .map_err(|error| ContractTestFailure::store_error(SCENARIO, "get_snapshot", error))?
            .map(|snapshot| snapshot.stream_revision().into_inner());
        if found != expected {
            return Err(ContractTestFailure::assertion(
                SCENARIO,
                format!(
                    "get_snapshot at max revision {max} expected {expected:?}, observed {found:?}"
                ),
            ));
        }
    }

    Ok(())
}

pub async fn test_duplicate_snapshot_keeps_original<F, P>(
    make_persistence: F,
) -> ContractTestResult
where
    F: Fn() -> P + Send + Sync + Clone + 'static,
    P: CommitPersistence + 'static,
{
    const SCENARIO: &str = "duplicate_snapshot_keeps_original";

    let persistence = make_persistence();
    let stream_id = contract_stream_id(SCENARIO, "snapshotted")?;
    let _ = append_contract_commit(SCENARIO, &persistence, &stream_id, 0, &["data1", "data2"])
        .await?;
    let original = Snapshot::new(
        stream_id.clone(),
        StreamRevision::new(2),
        serde_json::json!(["data1", "data2"]),
    );
    let replacement = Snapshot::new(
        stream_id.clone(),
        StreamRevision::new(2),
        serde_json::json!(["other"]),
    );

    let first = persistence
        .add_snapshot(original.clone())
        .await
        .map_err(|error| ContractTestFailure::store_error(SCENARIO, "add_snapshot", error))?;
    let second = persistence
        .add_snapshot(replacement)
        .await
        .map_err(|error| ContractTestFailure::store_error(SCENARIO, "add_snapshot", error))?;

    if !first || second {
        return Err(ContractTestFailure::assertion(
            SCENARIO,
            format!("expected add_snapshot to report true then false, observed {first} then {second}"),
        ));
    }

    let stored = persistence
        .get_snapshot(&stream_id, StreamRevision::unbounded())
        .await
        .map_err(|error| ContractTestFailure::store_error(SCENARIO, "get_snapshot", error))?;
    if stored.as_ref() != Some(&original) {
        return Err(ContractTestFailure::assertion(
            SCENARIO,
            format!("expected the original snapshot to be kept, observed {stored:?}"),
        ));
    }

    Ok(())
}

pub async fn test_snapshot_ahead_of_stream_is_refused<F, P>(
    make_persistence: F,
) -> ContractTestResult
where
    F: Fn() -> P + Send + Sync + Clone + 'static,
    P: CommitPersistence + 'static,
{
    const SCENARIO: &str = "snapshot_ahead_of_stream_is_refused";

    let persistence = make_persistence();
    let stream_id = contract_stream_id(SCENARIO, "short")?;
    let never_committed = contract_stream_id(SCENARIO, "ghost")?;
    let _ = append_contract_commit(SCENARIO, &persistence, &stream_id, 0, &["only"]).await?;

    let refusals = [
        Snapshot::new(
            stream_id.clone(),
            StreamRevision::new(10),
            serde_json::json!("ahead"),
        ),
        Snapshot::new(
            never_committed.clone(),
            StreamRevision::new(3),
            serde_json::json!("ghost"),
        ),
    ];
    for snapshot in refusals {
        let revision = snapshot.stream_revision();
        let added = persistence
            .add_snapshot(snapshot)
            .await
            .map_err(|error| ContractTestFailure::store_error(SCENARIO, "add_snapshot", error))?;
        if added {
            return Err(ContractTestFailure::assertion(
                SCENARIO,
                format!("snapshot at revision {revision} was stored ahead of its stream"),
            ));
        }
    }

    for candidate in [&stream_id, &never_committed] {
        let stored = persistence
            .get_snapshot(candidate, StreamRevision::unbounded())
            .await
            .map_err(|error| ContractTestFailure::store_error(SCENARIO, "get_snapshot", error))?;
        if stored.is_some() {
            return Err(ContractTestFailure::assertion(
                SCENARIO,
                format!("expected no snapshot for {candidate}, observed {stored:?}"),
            ));
        }
    }

    // The stream's own head is still an acceptable snapshot revision.
    let at_head = persistence
        .add_snapshot(Snapshot::new(
            stream_id.clone(),
            StreamRevision::new(1),
            serde_json::json!("at head"),
        ))
        .await
        .map_err(|error| ContractTestFailure::store_error(SCENARIO, "add_snapshot", error))?;
    if !at_head {
        return Err(ContractTestFailure::assertion(
            SCENARIO,
            "snapshot at the stream head was refused",
        ));
    }

    Ok(())
}

pub async fn test_streams_to_snapshot<F, P>(make_persistence: F) -> ContractTestResult
where
    F: Fn() -> P + Send + Sync + Clone + 'static,
    P: CommitPersistence + 'static,
{
    const SCENARIO: &str = "streams_to_snapshot";

    let persistence = make_persistence();
    let behind = contract_stream_id(SCENARIO, "behind")?;
    let caught_up = contract_stream_id(SCENARIO, "caught-up")?;
    let short = contract_stream_id(SCENARIO, "short")?;

    let _ = append_contract_commit(SCENARIO, &persistence, &behind, 0, &["1", "2", "3", "4"])
        .await?;
    let _ = append_contract_commit(SCENARIO, &persistence, &caught_up, 0, &["1", "2", "3", "4"])
        .await?;
    let _ = append_contract_commit(SCENARIO, &persistence, &short, 0, &["1"]).await?;
    let _ = persistence
        .add_snapshot(Snapshot::new(
            caught_up.clone(),
            StreamRevision::new(3),
            serde_json::json!(null),
        ))
        .await
        .map_err(|error| ContractTestFailure::store_error(SCENARIO, "add_snapshot", error))?;

    // The backend may be shared with other tests; only this scenario's streams matter.
    let ours = [&behind, &caught_up, &short];
    let due: Vec<StreamId> = persistence
        .streams_to_snapshot(3)
        .await
        .map_err(|error| ContractTestFailure::store_error(SCENARIO, "streams_to_snapshot", error))?
        .into_iter()
        .map(|head| head.stream_id)
        .filter(|stream_id| ours.contains(&stream_id))
        .collect();

    if due != [behind] {
        return Err(ContractTestFailure::assertion(
            SCENARIO,
            format!("expected only the stream without a recent snapshot, observed {due:?}"),
        ));
    }

    Ok(())
}

#[macro_export]
macro_rules! commit_persistence_contract_tests {
    (suite = $suite:ident, make_persistence = $make_persistence:expr $(,)?) => {
        #[allow(non_snake_case)]
        mod $suite {
            use $crate::contract::{
                test_basic_append_read, test_concurrent_revision_conflicts,
                test_conflict_across_connections, test_duplicate_commit_detection,
                test_duplicate_snapshot_keeps_original, test_missing_stream_reads,
                test_revision_window, test_snapshot_ahead_of_stream_is_refused,
                test_snapshot_lookup, test_stream_isolation, test_streams_to_snapshot,
            };

            #[tokio::test(flavor = "multi_thread")]
            async fn basic_append_read_contract() {
                test_basic_append_read($make_persistence)
                    .await
                    .expect("commit persistence contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn concurrent_revision_conflicts_contract() {
                test_concurrent_revision_conflicts($make_persistence)
                    .await
                    .expect("commit persistence contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn conflict_across_connections_contract() {
                test_conflict_across_connections($make_persistence)
                    .await
                    .expect("commit persistence contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn duplicate_commit_detection_contract() {
                test_duplicate_commit_detection($make_persistence)
                    .await
                    .expect("commit persistence contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn missing_stream_reads_contract() {
                test_missing_stream_reads($make_persistence)
                    .await
                    .expect("commit persistence contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn stream_isolation_contract() {
                test_stream_isolation($make_persistence)
                    .await
                    .expect("commit persistence contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn revision_window_contract() {
                test_revision_window($make_persistence)
                    .await
                    .expect("commit persistence contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn snapshot_lookup_contract() {
                test_snapshot_lookup($make_persistence)
                    .await
                    .expect("commit persistence contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn duplicate_snapshot_keeps_original_contract() {
                test_duplicate_snapshot_keeps_original($make_persistence)
                    .await
                    .expect("commit persistence contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn snapshot_ahead_of_stream_is_refused_contract() {
                test_snapshot_ahead_of_stream_is_refused($make_persistence)
                    .await
                    .expect("commit persistence contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn streams_to_snapshot_contract() {
                test_streams_to_snapshot($make_persistence)
                    .await
                    .expect("commit persistence contract failed");
            }
        }
    };
}

pub use commit_persistence_contract_tests;
