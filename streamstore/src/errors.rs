//! Error types for streamstore.
//!
//! The error design separates two concerns:
//!
//! - **EventStoreError**: failures while appending, reading or opening streams. The
//!   concurrency outcomes (`ConcurrencyConflict`, `DuplicateCommit`) are returned to the
//!   caller of `commit_changes`/`append` exactly as the backend produced them.
//! - **ReplayError**: failures while folding events or snapshots into state. An event
//!   type without an apply rule is *not* an error; it is skipped.

use crate::types::{CommitId, StreamId, StreamRevision};
use thiserror::Error;

/// Identifies the backend operation that failed.
///
/// Used by `EventStoreError::StoreFailure` to provide strongly-typed
/// identification of which operation encountered an infrastructure failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Appending a commit.
    Append,
    /// Reading commits of a stream.
    ReadCommits,
    /// Reading the head of a stream.
    ReadStreamHead,
    /// Reading a snapshot.
    GetSnapshot,
    /// Storing a snapshot.
    AddSnapshot,
    /// Listing streams that are due for a snapshot.
    StreamsToSnapshot,
    /// Beginning a database transaction.
    BeginTransaction,
    /// Committing a database transaction.
    CommitTransaction,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Append => write!(f, "append"),
            Self::ReadCommits => write!(f, "read_commits"),
            Self::ReadStreamHead => write!(f, "read_stream_head"),
            Self::GetSnapshot => write!(f, "get_snapshot"),
            Self::AddSnapshot => write!(f, "add_snapshot"),
            Self::StreamsToSnapshot => write!(f, "streams_to_snapshot"),
            Self::BeginTransaction => write!(f, "begin_transaction"),
            Self::CommitTransaction => write!(f, "commit_transaction"),
        }
    }
}

/// Errors that can occur when interacting with the commit store.
///
/// # Handling
///
/// - **ConcurrencyConflict**: another writer advanced the stream first. Re-open the
///   stream, re-apply the change and commit again. The store never retries for you.
/// - **DuplicateCommit**: the commit id was already recorded for the stream. The
///   commit has already happened; treat it as success.
/// - **StoreFailure**: infrastructure problem in the backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventStoreError {
    /// The stream advanced past the revision the writer last observed.
    #[error(
        "concurrency conflict on stream {stream_id}: expected revision {expected}, current revision is {current}"
    )]
    ConcurrencyConflict {
        /// The stream that was modified concurrently
        stream_id: StreamId,
        /// The revision the writer based its commit on
        expected: StreamRevision,
        /// The revision the stream actually had
        current: StreamRevision,
    },

    /// The commit id has already been recorded for the stream.
    #[error("commit {commit_id} was already recorded for stream {stream_id}")]
    DuplicateCommit {
        /// The stream the commit belongs to
        stream_id: StreamId,
        /// The repeated commit id
        commit_id: CommitId,
    },

    /// A commit must carry at least one event.
    #[error("commit for stream {stream_id} contains no events")]
    EmptyCommit {
        /// The stream the empty commit was addressed to
        stream_id: StreamId,
    },

    /// An event envelope was addressed to a different stream.
    #[error("event for stream {actual} cannot be written to stream {expected}")]
    StreamMismatch {
        /// The stream being written
        expected: StreamId,
        /// The stream named by the envelope
        actual: StreamId,
    },

    /// The requested revision window is empty by construction.
    #[error("invalid revision window: min revision {min} is greater than max revision {max}")]
    InvalidRevisionWindow {
        /// Lower (exclusive) bound
        min: StreamRevision,
        /// Upper (inclusive) bound
        max: StreamRevision,
    },

    /// A stream was opened at a revision it has not reached yet.
    #[error("stream {stream_id} is at revision {current}, cannot open at revision {requested}")]
    RevisionAhead {
        /// The stream being opened
        stream_id: StreamId,
        /// The revision the caller asked for
        requested: StreamRevision,
        /// The current revision of the stream
        current: StreamRevision,
    },

    /// An event or snapshot could not be serialized.
    #[error("serialization failed: {detail}")]
    SerializationFailed {
        /// The serializer's message
        detail: String,
    },

    /// A stored payload could not be deserialized into the requested type.
    #[error("failed to deserialize event of type {event_type}: {detail}")]
    DeserializationFailed {
        /// The variant tag of the payload
        event_type: String,
        /// The deserializer's message
        detail: String,
    },

    /// Represents infrastructure failures surfaced by the backing store (e.g., connection drops).
    #[error("{operation} operation failed")]
    StoreFailure {
        /// The backend step that failed
        operation: Operation,
    },
}

impl EventStoreError {
    /// Returns true for an optimistic concurrency conflict.
    pub const fn is_concurrency_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }

    /// Returns true when the commit had already been recorded.
    pub const fn is_duplicate_commit(&self) -> bool {
        matches!(self, Self::DuplicateCommit { .. })
    }
}

/// Errors raised while rebuilding state from events and snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplayError {
    /// An event with a registered apply rule could not be decoded.
    #[error("event of type {event_type} could not be decoded: {detail}")]
    MalformedEvent {
        /// The variant tag of the event
        event_type: String,
        /// The deserializer's message
        detail: String,
    },

    /// A snapshot payload could not be decoded into the requested state type.
    #[error("snapshot of stream {stream_id} at revision {revision} could not be decoded: {detail}")]
    MalformedSnapshot {
        /// The stream of the snapshot
        stream_id: StreamId,
        /// The revision of the snapshot
        revision: StreamRevision,
        /// The deserializer's message
        detail: String,
    },
}

/// Result type for store operations.
pub type EventStoreResult<T> = Result<T, EventStoreError>;

/// Result type for replay operations.
pub type ReplayResult<T> = Result<T, ReplayError>;

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_snapshot;

    fn stream() -> StreamId {
        StreamId::try_new("orders-17").expect("valid stream id")
    }

    #[test]
    fn concurrency_conflict_message_names_both_revisions() {
        let error = EventStoreError::ConcurrencyConflict {
            stream_id: stream(),
            expected: StreamRevision::new(0),
            current: StreamRevision::new(1),
        };

        assert_snapshot!(error.to_string(), @"concurrency conflict on stream orders-17: expected revision 0, current revision is 1");
    }

    #[test]
    fn revision_ahead_message_names_requested_revision() {
        let error = EventStoreError::RevisionAhead {
            stream_id: stream(),
            requested: StreamRevision::new(9),
            current: StreamRevision::new(3),
        };

        assert_snapshot!(error.to_string(), @"stream orders-17 is at revision 3, cannot open at revision 9");
    }

    #[test]
    fn store_failure_message_names_operation() {
        let error = EventStoreError::StoreFailure {
            operation: Operation::ReadCommits,
        };

        assert_snapshot!(error.to_string(), @"read_commits operation failed");
    }

    #[test]
    fn classification_helpers_match_their_variant_only() {
        let conflict = EventStoreError::ConcurrencyConflict {
            stream_id: stream(),
            expected: StreamRevision::new(0),
            current: StreamRevision::new(2),
        };
        let duplicate = EventStoreError::DuplicateCommit {
            stream_id: stream(),
            commit_id: CommitId::new(),
        };

        assert!(conflict.is_concurrency_conflict());
        assert!(!conflict.is_duplicate_commit());
        assert!(duplicate.is_duplicate_commit());
        assert!(!duplicate.is_concurrency_conflict());
    }
}
