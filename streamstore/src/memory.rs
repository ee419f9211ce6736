//! Transient in-process backend.
//!
//! Useful for tests and for processes that do not need durability across
//! restarts. Clones share the same storage, so separate [`crate::StreamStore`]
//! handles built from clones behave like separate connections to one database.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::commit::{Commit, CommitAttempt, StreamHead};
use crate::errors::{EventStoreError, EventStoreResult};
use crate::persistence::CommitPersistence;
use crate::snapshot::Snapshot;
use crate::types::{CommitId, CommitSequence, StreamId, StreamRevision, Timestamp};

/// Everything recorded for one stream.
#[derive(Debug, Default)]
struct StreamLog {
    commits: Vec<Commit>,
    commit_ids: HashSet<CommitId>,
    snapshots: BTreeMap<StreamRevision, Snapshot>,
}

impl StreamLog {
    fn revision(&self) -> StreamRevision {
        self.commits
            .last()
            .map_or_else(StreamRevision::initial, Commit::stream_revision)
    }

    fn commit_sequence(&self) -> CommitSequence {
        self.commits
            .last()
            .map_or_else(CommitSequence::initial, Commit::commit_sequence)
    }

    fn snapshot_revision(&self) -> StreamRevision {
        self.snapshots
            .keys()
            .next_back()
            .copied()
            .unwrap_or_else(StreamRevision::initial)
    }

    fn head(&self, stream_id: &StreamId) -> Option<StreamHead> {
        if self.commits.is_empty() {
            return None;
        }

        Some(StreamHead {
            stream_id: stream_id.clone(),
            revision: self.revision(),
            commit_sequence: self.commit_sequence(),
            snapshot_revision: self.snapshot_revision(),
        })
    }
}

/// Thread-safe in-memory commit storage.
#[derive(Clone, Default)]
pub struct InMemoryPersistence {
    streams: Arc<RwLock<HashMap<StreamId, StreamLog>>>,
}

impl InMemoryPersistence {
    /// Creates a new, empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CommitPersistence for InMemoryPersistence {
    #[instrument(
        name = "memory.append",
        skip(self, attempt),
        fields(
            stream_id = %attempt.stream_id(),
            expected = %attempt.expected_revision(),
            events = attempt.events().len()
        )
    )]
    async fn append(&self, attempt: CommitAttempt) -> EventStoreResult<Commit> {
        // Check and write under one write lock: this is the compare-and-append.
        let mut streams = self.streams.write();
        let (current, sequence, duplicate) = streams.get(attempt.stream_id()).map_or(
            (StreamRevision::initial(), CommitSequence::initial(), false),
            |log| {
                (
                    log.revision(),
                    log.commit_sequence(),
                    log.commit_ids.contains(&attempt.commit_id()),
                )
            },
        );

        if duplicate {
            warn!(
                commit_id = %attempt.commit_id(),
                "[memory.duplicate_commit] commit id already recorded"
            );
            return Err(EventStoreError::DuplicateCommit {
                stream_id: attempt.stream_id().clone(),
                commit_id: attempt.commit_id(),
            });
        }

        if current != attempt.expected_revision() {
            warn!(
                current = %current,
                "[memory.concurrency_conflict] optimistic concurrency check failed"
            );
            return Err(EventStoreError::ConcurrencyConflict {
                stream_id: attempt.stream_id().clone(),
                expected: attempt.expected_revision(),
                current,
            });
        }

        // Only an accepted commit creates the stream.
        let log = streams.entry(attempt.stream_id().clone()).or_default();
        let commit = attempt.into_commit(sequence.next(), Timestamp::now());
        let _ = log.commit_ids.insert(commit.commit_id());
        log.commits.push(commit.clone());

        info!(
            commit_sequence = %commit.commit_sequence(),
            revision = %commit.stream_revision(),
            "[memory.append] commit recorded"
        );

        Ok(commit)
    }

    #[instrument(name = "memory.read_commits", skip(self))]
    async fn read_commits(
        &self,
        stream_id: &StreamId,
        min_revision: StreamRevision,
        max_revision: StreamRevision,
    ) -> EventStoreResult<Vec<Commit>> {
        let streams = self.streams.read();
        let commits: Vec<Commit> = streams.get(stream_id).map_or_else(Vec::new, |log| {
            log.commits
                .iter()
                .filter(|commit| commit.overlaps(min_revision, max_revision))
                .cloned()
                .collect()
        });

        debug!(
            commit_count = commits.len(),
            "[memory.read_commits] commits read"
        );
        Ok(commits)
    }

    async fn stream_head(&self, stream_id: &StreamId) -> EventStoreResult<Option<StreamHead>> {
        let streams = self.streams.read();
        Ok(streams.get(stream_id).and_then(|log| log.head(stream_id)))
    }

    #[instrument(name = "memory.get_snapshot", skip(self))]
    async fn get_snapshot(
        &self,
        stream_id: &StreamId,
        max_revision: StreamRevision,
    ) -> EventStoreResult<Option<Snapshot>> {
        let streams = self.streams.read();
        Ok(streams.get(stream_id).and_then(|log| {
            log.snapshots
                .range(..=max_revision)
                .next_back()
                .map(|(_, snapshot)| snapshot.clone())
        }))
    }

    #[instrument(
        name = "memory.add_snapshot",
        skip(self, snapshot),
        fields(stream_id = %snapshot.stream_id(), revision = %snapshot.stream_revision())
    )]
    async fn add_snapshot(&self, snapshot: Snapshot) -> EventStoreResult<bool> {
        use std::collections::btree_map::Entry;

        let mut streams = self.streams.write();
        let Some(log) = streams.get_mut(snapshot.stream_id()) else {
            warn!("[memory.add_snapshot] stream has no commits, snapshot refused");
            return Ok(false);
        };

        let current = log.revision();
        if snapshot.stream_revision() > current {
            warn!(
                current = %current,
                "[memory.add_snapshot] snapshot is ahead of the stream, refused"
            );
            return Ok(false);
        }

        match log.snapshots.entry(snapshot.stream_revision()) {
            Entry::Vacant(entry) => {
                let _ = entry.insert(snapshot);
                Ok(true)
            }
            Entry::Occupied(_) => Ok(false),
        }
    }

    #[instrument(name = "memory.streams_to_snapshot", skip(self))]
    async fn streams_to_snapshot(&self, threshold: u64) -> EventStoreResult<Vec<StreamHead>> {
        let streams = self.streams.read();
        let mut heads: Vec<StreamHead> = streams
            .iter()
            .filter_map(|(stream_id, log)| log.head(stream_id))
            .filter(|head| head.revisions_since_snapshot() >= threshold)
            .collect();
        heads.sort_by(|left, right| left.stream_id.cmp(&right.stream_id));
        Ok(heads)
    }
}
