//! The storage port driven by streams and snapshot readers.
//!
//! A [`CommitPersistence`] backend owns all shared mutable state. Its `append`
//! is the single linearization point of the whole system: the compare of the
//! expected revision and the write of the commit happen as one atomic step, so
//! two writers that observed the same revision can never both succeed.
//!
//! Implementations include:
//! - [`crate::memory::InMemoryPersistence`]: transient, process-local backend
//! - `streamstore-postgres`: durable PostgreSQL backend

use std::sync::Arc;

use async_trait::async_trait;

use crate::commit::{Commit, CommitAttempt, StreamHead};
use crate::errors::EventStoreResult;
use crate::snapshot::Snapshot;
use crate::types::{StreamId, StreamRevision};

/// Append-only commit storage with snapshot support.
///
/// All operations are scoped to a single stream; no cross-stream atomicity is
/// provided or required.
#[async_trait]
pub trait CommitPersistence: Send + Sync {
    /// Appends `attempt` as the next commit of its stream.
    ///
    /// # Errors
    ///
    /// * `EventStoreError::DuplicateCommit` - the commit id is already recorded for the
    ///   stream. Checked before the revision so a retried commit is recognized as such.
    /// * `EventStoreError::ConcurrencyConflict` - the stream's revision differs from
    ///   `attempt.expected_revision()`.
    async fn append(&self, attempt: CommitAttempt) -> EventStoreResult<Commit>;

    /// Reads the commits holding events with revisions in `(min_revision, max_revision]`,
    /// in commit order.
    ///
    /// An unknown stream or an empty window yields an empty list.
    async fn read_commits(
        &self,
        stream_id: &StreamId,
        min_revision: StreamRevision,
        max_revision: StreamRevision,
    ) -> EventStoreResult<Vec<Commit>>;

    /// Returns the head of `stream_id`, or `None` when it has no commits.
    async fn stream_head(&self, stream_id: &StreamId) -> EventStoreResult<Option<StreamHead>>;

    /// Returns the newest snapshot of `stream_id` whose revision is at most `max_revision`.
    async fn get_snapshot(
        &self,
        stream_id: &StreamId,
        max_revision: StreamRevision,
    ) -> EventStoreResult<Option<Snapshot>>;

    /// Stores a snapshot. Returns `false` and stores nothing when the stream has
    /// not reached the snapshot's revision (including a stream with no commits),
    /// or when a snapshot already exists for the same stream and revision; the
    /// stored one is kept.
    async fn add_snapshot(&self, snapshot: Snapshot) -> EventStoreResult<bool>;

    /// Lists the heads of streams whose revision is at least `threshold` events past
    /// their newest snapshot, ordered by stream id.
    async fn streams_to_snapshot(&self, threshold: u64) -> EventStoreResult<Vec<StreamHead>>;
}

/// Forwarding implementation so shared backends can be handed out as `Arc<P>`.
#[async_trait]
impl<P: CommitPersistence + ?Sized> CommitPersistence for Arc<P> {
    async fn append(&self, attempt: CommitAttempt) -> EventStoreResult<Commit> {
        (**self).append(attempt).await
    }

    async fn read_commits(
        &self,
        stream_id: &StreamId,
        min_revision: StreamRevision,
        max_revision: StreamRevision,
    ) -> EventStoreResult<Vec<Commit>> {
        (**self)
            .read_commits(stream_id, min_revision, max_revision)
            .await
    }

    async fn stream_head(&self, stream_id: &StreamId) -> EventStoreResult<Option<StreamHead>> {
        (**self).stream_head(stream_id).await
    }

    async fn get_snapshot(
        &self,
        stream_id: &StreamId,
        max_revision: StreamRevision,
    ) -> EventStoreResult<Option<Snapshot>> {
        (**self).get_snapshot(stream_id, max_revision).await
    }

    async fn add_snapshot(&self, snapshot: Snapshot) -> EventStoreResult<bool> {
        (**self).add_snapshot(snapshot).await
    }

    async fn streams_to_snapshot(&self, threshold: u64) -> EventStoreResult<Vec<StreamHead>> {
        (**self).streams_to_snapshot(threshold).await
    }
}
