//! Entry point tying a backend to stream sessions and snapshots.

use std::sync::Arc;

use tracing::instrument;

use crate::commit::Commit;
use crate::errors::EventStoreResult;
use crate::memory::InMemoryPersistence;
use crate::persistence::CommitPersistence;
use crate::snapshot::{Snapshot, SnapshotStore};
use crate::stream::EventStream;
use crate::types::{StreamId, StreamRevision};

/// Handle to a commit store.
///
/// Cloning is cheap; all clones share the same backend.
///
/// # Example
///
/// ```ignore
/// let store = StreamStore::in_memory();
///
/// let mut stream = store.create_stream(stream_id.clone());
/// stream.add_event(&SomethingHappened { something: "data1".into() })?;
/// stream.commit_changes(CommitId::new()).await?;
///
/// let reopened = store
///     .open_stream(stream_id, StreamRevision::initial(), StreamRevision::unbounded())
///     .await?;
/// assert_eq!(reopened.committed_events().len(), 1);
/// ```
#[derive(Clone)]
pub struct StreamStore {
    persistence: Arc<dyn CommitPersistence>,
}

impl StreamStore {
    /// Wraps a backend.
    pub fn new<P>(persistence: P) -> Self
    where
        P: CommitPersistence + 'static,
    {
        Self {
            persistence: Arc::new(persistence),
        }
    }

    /// A store over a fresh, unshared [`InMemoryPersistence`].
    pub fn in_memory() -> Self {
        Self::new(InMemoryPersistence::new())
    }

    /// Opens a session with the committed events in `(min_revision, max_revision]`.
    ///
    /// A stream without commits opens empty from revision 0; the stream comes
    /// into existence with its first commit.
    ///
    /// # Errors
    ///
    /// * `EventStoreError::InvalidRevisionWindow` - `min_revision > max_revision`.
    /// * `EventStoreError::RevisionAhead` - the stream has not reached `min_revision`.
    pub async fn open_stream(
        &self,
        stream_id: StreamId,
        min_revision: StreamRevision,
        max_revision: StreamRevision,
    ) -> EventStoreResult<EventStream> {
        EventStream::open(
            Arc::clone(&self.persistence),
            stream_id,
            min_revision,
            max_revision,
        )
        .await
    }

    /// Opens a session with the events committed after `snapshot` up to
    /// `max_revision`.
    pub async fn open_stream_from_snapshot(
        &self,
        snapshot: &Snapshot,
        max_revision: StreamRevision,
    ) -> EventStoreResult<EventStream> {
        EventStream::open_from_snapshot(Arc::clone(&self.persistence), snapshot, max_revision)
            .await
    }

    /// Starts a session on a stream expected to be new, without reading it.
    ///
    /// If the stream already has commits, the first commit from this session
    /// fails with a concurrency conflict.
    pub fn create_stream(&self, stream_id: StreamId) -> EventStream {
        EventStream::create(Arc::clone(&self.persistence), stream_id)
    }

    /// Reads the raw commits holding events in `(min_revision, max_revision]`.
    #[instrument(name = "store.commits", skip(self))]
    pub async fn commits(
        &self,
        stream_id: &StreamId,
        min_revision: StreamRevision,
        max_revision: StreamRevision,
    ) -> EventStoreResult<Vec<Commit>> {
        self.persistence
            .read_commits(stream_id, min_revision, max_revision)
            .await
    }

    /// Stores a snapshot. See [`SnapshotStore::add`].
    pub async fn add_snapshot(&self, snapshot: Snapshot) -> EventStoreResult<bool> {
        self.snapshots().add(snapshot).await
    }

    /// Returns the newest snapshot of `stream_id` at or below `max_revision`.
    pub async fn get_snapshot(
        &self,
        stream_id: &StreamId,
        max_revision: StreamRevision,
    ) -> EventStoreResult<Option<Snapshot>> {
        self.snapshots().get(stream_id, max_revision).await
    }

    /// The snapshot accessor sharing this store's backend.
    pub fn snapshots(&self) -> SnapshotStore {
        SnapshotStore::new(Arc::clone(&self.persistence))
    }
}

impl std::fmt::Debug for StreamStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamStore").finish_non_exhaustive()
    }
}
