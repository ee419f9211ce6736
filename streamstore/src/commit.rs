//! Commits: the indivisible batches in which events are appended to a stream.

use serde::{Deserialize, Serialize};

use crate::errors::{EventStoreError, EventStoreResult};
use crate::event::EventEnvelope;
use crate::types::{CommitId, CommitSequence, StreamId, StreamRevision, Timestamp};

/// A request to append a batch of events to a stream.
///
/// An attempt is only constructible when it carries at least one event and every
/// event is addressed to the attempt's stream.
#[derive(Debug, Clone)]
pub struct CommitAttempt {
    stream_id: StreamId,
    commit_id: CommitId,
    expected_revision: StreamRevision,
    events: Vec<EventEnvelope>,
}

impl CommitAttempt {
    /// Validates and builds a commit attempt.
    pub fn new(
        stream_id: StreamId,
        expected_revision: StreamRevision,
        commit_id: CommitId,
        events: Vec<EventEnvelope>,
    ) -> EventStoreResult<Self> {
        if events.is_empty() {
            return Err(EventStoreError::EmptyCommit { stream_id });
        }

        if let Some(foreign) = events.iter().find(|event| event.stream_id() != &stream_id) {
            return Err(EventStoreError::StreamMismatch {
                expected: stream_id,
                actual: foreign.stream_id().clone(),
            });
        }

        Ok(Self {
            stream_id,
            commit_id,
            expected_revision,
            events,
        })
    }

    /// The target stream.
    pub const fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    /// The idempotency token of the commit.
    pub const fn commit_id(&self) -> CommitId {
        self.commit_id
    }

    /// The revision the writer observed before buffering its events.
    pub const fn expected_revision(&self) -> StreamRevision {
        self.expected_revision
    }

    /// The events to append, in order.
    pub fn events(&self) -> &[EventEnvelope] {
        &self.events
    }

    /// Turns the attempt into the commit a backend records once the revision
    /// check has passed.
    pub fn into_commit(self, commit_sequence: CommitSequence, commit_stamp: Timestamp) -> Commit {
        let stream_revision = self.expected_revision.advance(self.events.len());
        Commit {
            stream_id: self.stream_id,
            commit_id: self.commit_id,
            commit_sequence,
            stream_revision,
            commit_stamp,
            events: self.events,
        }
    }
}

/// A recorded, immutable batch of events.
///
/// Event revisions inside a commit run from [`Commit::start_revision`] to
/// [`Commit::stream_revision`] inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    stream_id: StreamId,
    commit_id: CommitId,
    commit_sequence: CommitSequence,
    stream_revision: StreamRevision,
    commit_stamp: Timestamp,
    events: Vec<EventEnvelope>,
}

impl Commit {
    /// Rebuilds a commit read back from a backend.
    pub const fn restore(
        stream_id: StreamId,
        commit_id: CommitId,
        commit_sequence: CommitSequence,
        stream_revision: StreamRevision,
        commit_stamp: Timestamp,
        events: Vec<EventEnvelope>,
    ) -> Self {
        Self {
            stream_id,
            commit_id,
            commit_sequence,
            stream_revision,
            commit_stamp,
            events,
        }
    }

    /// The stream the commit belongs to.
    pub const fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    /// The idempotency token the commit was written with.
    pub const fn commit_id(&self) -> CommitId {
        self.commit_id
    }

    /// Position among the commits of the stream, starting at 1.
    pub const fn commit_sequence(&self) -> CommitSequence {
        self.commit_sequence
    }

    /// Revision of the first event in the commit.
    pub fn start_revision(&self) -> StreamRevision {
        let count = u64::try_from(self.events.len()).unwrap_or(u64::MAX);
        StreamRevision::new(
            self.stream_revision
                .into_inner()
                .saturating_sub(count)
                .saturating_add(1),
        )
    }

    /// Revision of the last event in the commit, which is the stream revision
    /// right after the commit.
    pub const fn stream_revision(&self) -> StreamRevision {
        self.stream_revision
    }

    /// When the commit was recorded.
    pub const fn commit_stamp(&self) -> Timestamp {
        self.commit_stamp
    }

    /// The committed events, in order.
    pub fn events(&self) -> &[EventEnvelope] {
        &self.events
    }

    /// Consumes the commit, returning its events.
    pub fn into_events(self) -> Vec<EventEnvelope> {
        self.events
    }

    /// Pairs each event with its revision.
    pub fn revisions(&self) -> impl Iterator<Item = (StreamRevision, &EventEnvelope)> + '_ {
        let start = self.start_revision().into_inner();
        self.events
            .iter()
            .zip(start..)
            .map(|(event, revision)| (StreamRevision::new(revision), event))
    }

    /// Returns true when the commit holds at least one event with a revision in
    /// `(min_revision, max_revision]`.
    pub fn overlaps(&self, min_revision: StreamRevision, max_revision: StreamRevision) -> bool {
        self.stream_revision > min_revision && self.start_revision() <= max_revision
    }
}

/// Summary of a stream's position, as reported by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamHead {
    /// The stream
    pub stream_id: StreamId,
    /// Revision of the newest committed event
    pub revision: StreamRevision,
    /// Sequence of the newest commit
    pub commit_sequence: CommitSequence,
    /// Revision of the newest snapshot, `0` when there is none
    pub snapshot_revision: StreamRevision,
}

impl StreamHead {
    /// Number of events committed since the newest snapshot.
    pub fn revisions_since_snapshot(&self) -> u64 {
        self.revision
            .into_inner()
            .saturating_sub(self.snapshot_revision.into_inner())
    }
}
