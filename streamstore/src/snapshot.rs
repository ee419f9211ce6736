//! Point-in-time snapshots of reconstructed stream state.
//!
//! The store treats snapshot payloads as opaque JSON. Encoding state into a
//! snapshot and decoding it back is done by the caller, usually through
//! [`crate::replay::Aggregate`].

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::commit::StreamHead;
use crate::errors::{EventStoreError, EventStoreResult, ReplayError, ReplayResult};
use crate::persistence::CommitPersistence;
use crate::types::{StreamId, StreamRevision};

/// State of a stream as of a revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    stream_id: StreamId,
    stream_revision: StreamRevision,
    payload: Value,
}

impl Snapshot {
    /// Builds a snapshot from an already encoded payload.
    pub const fn new(stream_id: StreamId, stream_revision: StreamRevision, payload: Value) -> Self {
        Self {
            stream_id,
            stream_revision,
            payload,
        }
    }

    /// Encodes `state` as the snapshot of `stream_id` at `stream_revision`.
    pub fn capture<S: Serialize>(
        stream_id: StreamId,
        stream_revision: StreamRevision,
        state: &S,
    ) -> EventStoreResult<Self> {
        let payload =
            serde_json::to_value(state).map_err(|error| EventStoreError::SerializationFailed {
                detail: error.to_string(),
            })?;
        Ok(Self::new(stream_id, stream_revision, payload))
    }

    /// Decodes the payload as `S`.
    pub fn restore<S: DeserializeOwned>(&self) -> ReplayResult<S> {
        S::deserialize(&self.payload).map_err(|error| ReplayError::MalformedSnapshot {
            stream_id: self.stream_id.clone(),
            revision: self.stream_revision,
            detail: error.to_string(),
        })
    }

    /// The stream the snapshot summarizes.
    pub const fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    /// The revision of the last event folded into the snapshot.
    pub const fn stream_revision(&self) -> StreamRevision {
        self.stream_revision
    }

    /// The opaque payload.
    pub const fn payload(&self) -> &Value {
        &self.payload
    }
}

/// Accessor for the snapshots kept by a [`CommitPersistence`] backend.
#[derive(Clone)]
pub struct SnapshotStore {
    persistence: Arc<dyn CommitPersistence>,
}

impl SnapshotStore {
    pub(crate) fn new(persistence: Arc<dyn CommitPersistence>) -> Self {
        Self { persistence }
    }

    /// Stores a snapshot.
    ///
    /// Returns `false` when the stream has not reached the snapshot's revision,
    /// or when a snapshot already exists for the same stream and revision; the
    /// stored one is kept unchanged.
    #[instrument(
        name = "snapshots.add",
        skip(self, snapshot),
        fields(stream_id = %snapshot.stream_id(), revision = %snapshot.stream_revision())
    )]
    pub async fn add(&self, snapshot: Snapshot) -> EventStoreResult<bool> {
        let added = self.persistence.add_snapshot(snapshot).await?;
        if !added {
            debug!("[snapshots.add] snapshot not stored");
        }
        Ok(added)
    }

    /// Returns the newest snapshot of `stream_id` at or below `max_revision`.
    #[instrument(name = "snapshots.get", skip(self))]
    pub async fn get(
        &self,
        stream_id: &StreamId,
        max_revision: StreamRevision,
    ) -> EventStoreResult<Option<Snapshot>> {
        self.persistence.get_snapshot(stream_id, max_revision).await
    }

    /// Lists streams with at least `threshold` events committed since their
    /// newest snapshot.
    #[instrument(name = "snapshots.streams_to_snapshot", skip(self))]
    pub async fn streams_to_snapshot(&self, threshold: u64) -> EventStoreResult<Vec<StreamHead>> {
        self.persistence.streams_to_snapshot(threshold).await
    }
}
