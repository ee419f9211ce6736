//! The per-stream session through which events are read and written.
//!
//! An [`EventStream`] loads the committed events of a revision window when it is
//! opened, buffers new events, and commits them with the revision it last
//! observed as the expected revision. The backend's compare-and-append decides
//! the outcome; the session never retries or merges on its own.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::commit::{Commit, CommitAttempt};
use crate::errors::{EventStoreError, EventStoreResult, ReplayResult};
use crate::event::{Event, EventEnvelope};
use crate::persistence::CommitPersistence;
use crate::replay::Aggregate;
use crate::snapshot::Snapshot;
use crate::types::{CommitId, CommitSequence, EventId, StreamId, StreamRevision};

/// A session on one stream.
///
/// Sessions are cheap and short-lived: open one, inspect or add events,
/// commit, drop. Dropping a session with uncommitted events discards them.
pub struct EventStream {
    persistence: Arc<dyn CommitPersistence>,
    stream_id: StreamId,
    stream_revision: StreamRevision,
    commit_sequence: CommitSequence,
    committed: Vec<EventEnvelope>,
    uncommitted: Vec<EventEnvelope>,
    identifiers: HashSet<CommitId>,
}

impl EventStream {
    /// A fresh session on a stream, positioned at revision 0, without reading.
    pub(crate) fn create(persistence: Arc<dyn CommitPersistence>, stream_id: StreamId) -> Self {
        Self {
            persistence,
            stream_id,
            stream_revision: StreamRevision::initial(),
            commit_sequence: CommitSequence::initial(),
            committed: Vec::new(),
            uncommitted: Vec::new(),
            identifiers: HashSet::new(),
        }
    }

    /// Opens a session loading the events with revisions in
    /// `(min_revision, max_revision]`.
    #[instrument(name = "stream.open", skip(persistence))]
    pub(crate) async fn open(
        persistence: Arc<dyn CommitPersistence>,
        stream_id: StreamId,
        min_revision: StreamRevision,
        max_revision: StreamRevision,
    ) -> EventStoreResult<Self> {
        if min_revision > max_revision {
            return Err(EventStoreError::InvalidRevisionWindow {
                min: min_revision,
                max: max_revision,
            });
        }

        let commits = persistence
            .read_commits(&stream_id, min_revision, max_revision)
            .await?;

        let mut stream = Self::create(persistence, stream_id);
        stream.stream_revision = min_revision;
        let loaded_commits = commits.len();
        stream.populate(commits, min_revision, max_revision);

        if loaded_commits == 0 && min_revision > StreamRevision::initial() {
            let current = stream
                .persistence
                .stream_head(&stream.stream_id)
                .await?
                .map_or_else(StreamRevision::initial, |head| head.revision);
            if current < min_revision {
                warn!(
                    current = %current,
                    "[stream.open] requested revision is ahead of the stream"
                );
                return Err(EventStoreError::RevisionAhead {
                    stream_id: stream.stream_id,
                    requested: min_revision,
                    current,
                });
            }
        }

        debug!(
            commits = loaded_commits,
            events = stream.committed.len(),
            revision = %stream.stream_revision,
            "[stream.open] stream loaded"
        );
        Ok(stream)
    }

    /// Opens a session loading only the events committed after `snapshot`, up
    /// to `max_revision`. Earlier events are summarized by the snapshot itself.
    pub(crate) async fn open_from_snapshot(
        persistence: Arc<dyn CommitPersistence>,
        snapshot: &Snapshot,
        max_revision: StreamRevision,
    ) -> EventStoreResult<Self> {
        Self::open(
            persistence,
            snapshot.stream_id().clone(),
            snapshot.stream_revision(),
            max_revision,
        )
        .await
    }

    fn populate(
        &mut self,
        commits: Vec<Commit>,
        min_revision: StreamRevision,
        max_revision: StreamRevision,
    ) {
        for commit in commits {
            let _ = self.identifiers.insert(commit.commit_id());
            self.commit_sequence = commit.commit_sequence();

            let start = commit.start_revision();
            for (offset, event) in commit.into_events().into_iter().enumerate() {
                let revision = start.advance(offset);
                if revision > max_revision {
                    break;
                }
                if revision <= min_revision {
                    continue;
                }
                self.stream_revision = revision;
                self.committed.push(event);
            }
        }
    }

    /// The stream this session reads and writes.
    pub const fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    /// Revision of the last event this session loaded or committed. New commits
    /// are appended with this as the expected revision.
    pub const fn stream_revision(&self) -> StreamRevision {
        self.stream_revision
    }

    /// Sequence of the last commit this session loaded or wrote.
    pub const fn commit_sequence(&self) -> CommitSequence {
        self.commit_sequence
    }

    /// Committed events in the loaded window plus those committed through this
    /// session, in revision order.
    pub fn committed_events(&self) -> &[EventEnvelope] {
        &self.committed
    }

    /// Events added since the last successful commit.
    pub fn uncommitted_events(&self) -> &[EventEnvelope] {
        &self.uncommitted
    }

    /// Returns true when there are events waiting to be committed.
    pub fn has_changes(&self) -> bool {
        !self.uncommitted.is_empty()
    }

    /// Buffers an event for the next commit.
    ///
    /// # Errors
    ///
    /// `EventStoreError::StreamMismatch` when the envelope is addressed to
    /// another stream.
    pub fn add(&mut self, event: EventEnvelope) -> EventStoreResult<()> {
        if event.stream_id() != &self.stream_id {
            return Err(EventStoreError::StreamMismatch {
                expected: self.stream_id.clone(),
                actual: event.stream_id().clone(),
            });
        }

        self.uncommitted.push(event);
        Ok(())
    }

    /// Wraps a typed event in an envelope for this stream and buffers it.
    pub fn add_event<E: Event>(&mut self, event: &E) -> EventStoreResult<EventId> {
        let envelope = EventEnvelope::new(self.stream_id.clone(), event)?;
        let event_id = envelope.event_id();
        self.uncommitted.push(envelope);
        Ok(event_id)
    }

    /// Discards all uncommitted events.
    pub fn clear_changes(&mut self) {
        self.uncommitted.clear();
    }

    /// Commits the buffered events as one commit identified by `commit_id`.
    ///
    /// Returns `Ok(None)` without touching the backend when nothing is buffered.
    ///
    /// # Errors
    ///
    /// * `EventStoreError::DuplicateCommit` - this session already saw `commit_id`,
    ///   or the backend has it recorded for the stream.
    /// * `EventStoreError::ConcurrencyConflict` - another writer advanced the
    ///   stream. The buffered events are kept; re-open the stream to see the
    ///   latest state before trying again.
    #[instrument(
        name = "stream.commit_changes",
        skip(self),
        fields(
            stream_id = %self.stream_id,
            expected = %self.stream_revision,
            events = self.uncommitted.len()
        )
    )]
    pub async fn commit_changes(&mut self, commit_id: CommitId) -> EventStoreResult<Option<Commit>> {
        if self.identifiers.contains(&commit_id) {
            warn!("[stream.commit_changes] commit id already seen by this session");
            return Err(EventStoreError::DuplicateCommit {
                stream_id: self.stream_id.clone(),
                commit_id,
            });
        }

        if self.uncommitted.is_empty() {
            debug!("[stream.commit_changes] nothing to commit");
            return Ok(None);
        }

        let attempt = CommitAttempt::new(
            self.stream_id.clone(),
            self.stream_revision,
            commit_id,
            self.uncommitted.clone(),
        )?;

        match self.persistence.append(attempt).await {
            Ok(commit) => {
                self.committed.append(&mut self.uncommitted);
                self.stream_revision = commit.stream_revision();
                self.commit_sequence = commit.commit_sequence();
                let _ = self.identifiers.insert(commit.commit_id());
                info!(
                    revision = %self.stream_revision,
                    commit_sequence = %self.commit_sequence,
                    "[stream.commit_changes] changes committed"
                );
                Ok(Some(commit))
            }
            Err(error) => {
                warn!(
                    error = %error,
                    "[stream.commit_changes] commit rejected, uncommitted events kept"
                );
                Err(error)
            }
        }
    }

    /// Rebuilds `A` from `snapshot` (if any) and this session's committed events.
    ///
    /// Pass the snapshot the session was opened from, so that the events it
    /// summarizes are not applied twice.
    pub fn replay<A: Aggregate>(&self, snapshot: Option<&Snapshot>) -> ReplayResult<A> {
        A::from_snapshot(snapshot, self.committed.iter().map(EventEnvelope::payload))
    }
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("stream_id", &self.stream_id)
            .field("stream_revision", &self.stream_revision)
            .field("commit_sequence", &self.commit_sequence)
            .field("committed", &self.committed.len())
            .field("uncommitted", &self.uncommitted.len())
            .finish_non_exhaustive()
    }
}
