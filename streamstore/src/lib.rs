//! `StreamStore` - append-only event streams with optimistic concurrency
//!
//! Events are appended to a stream in indivisible commits. Every commit names the
//! revision its writer last observed; the backend accepts it only if the stream is
//! still at that revision, so of two writers racing from the same revision exactly
//! one wins and the other gets [`EventStoreError::ConcurrencyConflict`]. Commit ids
//! make retries idempotent ([`EventStoreError::DuplicateCommit`]).
//!
//! State is rebuilt by replaying events through a [`Replayer`], optionally seeded
//! from a [`Snapshot`]. Events whose type has no apply rule are skipped, so old
//! streams keep replaying as the set of handled events evolves.
//!
//! Backends implement [`CommitPersistence`]. [`InMemoryPersistence`] ships with
//! this crate; `streamstore-postgres` provides a durable one.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod commit;
pub mod errors;
pub mod event;
pub mod memory;
pub mod persistence;
pub mod replay;
pub mod snapshot;
pub mod store;
pub mod stream;
pub mod types;
mod validation;

pub use commit::{Commit, CommitAttempt, StreamHead};
pub use errors::{EventStoreError, EventStoreResult, Operation, ReplayError, ReplayResult};
pub use event::{Event, EventEnvelope, EventPayload};
pub use memory::InMemoryPersistence;
pub use persistence::CommitPersistence;
pub use replay::{Aggregate, Applied, Replayer};
pub use snapshot::{Snapshot, SnapshotStore};
pub use store::StreamStore;
pub use stream::EventStream;
pub use types::{CommitId, CommitSequence, EventId, StreamId, StreamRevision, Timestamp};
