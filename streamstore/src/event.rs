//! Event types for the commit store.
//!
//! Domain events are plain serde types implementing [`Event`]. Before they are
//! stored they are encoded into an [`EventPayload`], a tagged variant carrying the
//! event's type name next to its JSON data, and wrapped in an [`EventEnvelope`]
//! that adds identity and header metadata.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{EventStoreError, EventStoreResult};
use crate::types::{EventId, StreamId};

/// A domain event that can be appended to a stream.
///
/// `EVENT_TYPE` is the variant tag written next to the event data. It is what the
/// replay engine dispatches on, so it must stay stable once events are stored.
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct SomethingHappened { something: String }
///
/// impl Event for SomethingHappened {
///     const EVENT_TYPE: &'static str = "SomethingHappened";
/// }
/// ```
pub trait Event: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Stable variant tag of this event type.
    const EVENT_TYPE: &'static str;
}

/// An encoded event: its variant tag plus its data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    event_type: String,
    data: Value,
}

impl EventPayload {
    /// Encodes a typed event.
    pub fn encode<E: Event>(event: &E) -> EventStoreResult<Self> {
        let data =
            serde_json::to_value(event).map_err(|error| EventStoreError::SerializationFailed {
                detail: error.to_string(),
            })?;

        Ok(Self {
            event_type: E::EVENT_TYPE.to_string(),
            data,
        })
    }

    /// Builds a payload from a raw tag and data, e.g. for an event type this
    /// process has no Rust type for.
    pub fn from_parts(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
        }
    }

    /// The variant tag.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// The encoded event data.
    pub const fn data(&self) -> &Value {
        &self.data
    }

    /// Returns true when the payload carries an `E`.
    pub fn is<E: Event>(&self) -> bool {
        self.event_type == E::EVENT_TYPE
    }

    /// Decodes the payload as `E`.
    ///
    /// Returns `Ok(None)` when the payload is tagged with another event type.
    pub fn decode<E: Event>(&self) -> EventStoreResult<Option<E>> {
        if !self.is::<E>() {
            return Ok(None);
        }

        E::deserialize(&self.data)
            .map(Some)
            .map_err(|error| EventStoreError::DeserializationFailed {
                event_type: self.event_type.clone(),
                detail: error.to_string(),
            })
    }
}

/// An immutable event wrapped with its identity and headers.
///
/// Two envelopes are equal when their event ids are equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    event_id: EventId,
    stream_id: StreamId,
    payload: EventPayload,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    headers: BTreeMap<String, String>,
}

impl EventEnvelope {
    /// Wraps a typed event under a freshly generated event id.
    pub fn new<E: Event>(stream_id: StreamId, event: &E) -> EventStoreResult<Self> {
        Self::with_id(EventId::new(), stream_id, event)
    }

    /// Wraps a typed event under a caller-chosen event id.
    pub fn with_id<E: Event>(
        event_id: EventId,
        stream_id: StreamId,
        event: &E,
    ) -> EventStoreResult<Self> {
        Ok(Self::from_payload(
            event_id,
            stream_id,
            EventPayload::encode(event)?,
        ))
    }

    /// Wraps an already encoded payload.
    pub const fn from_payload(event_id: EventId, stream_id: StreamId, payload: EventPayload) -> Self {
        Self {
            event_id,
            stream_id,
            payload,
            headers: BTreeMap::new(),
        }
    }

    /// Returns the envelope with an additional header.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let _ = self.headers.insert(key.into(), value.into());
        self
    }

    /// The unique identifier of this event.
    pub const fn event_id(&self) -> EventId {
        self.event_id
    }

    /// The stream this event is addressed to.
    pub const fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    /// The encoded event.
    pub const fn payload(&self) -> &EventPayload {
        &self.payload
    }

    /// Header metadata, ordered by key.
    pub const fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Looks up a single header.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }
}

impl PartialEq for EventEnvelope {
    fn eq(&self, other: &Self) -> bool {
        self.event_id == other.event_id
    }
}

impl Eq for EventEnvelope {}

impl Hash for EventEnvelope {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.event_id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    struct SomethingHappened {
        something: String,
    }

    impl Event for SomethingHappened {
        const EVENT_TYPE: &'static str = "SomethingHappened";
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    struct SomethingElse {
        count: u32,
    }

    impl Event for SomethingElse {
        const EVENT_TYPE: &'static str = "SomethingElse";
    }

    fn stream_id() -> StreamId {
        StreamId::try_new("envelope-tests").expect("valid stream id")
    }

    fn happened(something: &str) -> SomethingHappened {
        SomethingHappened {
            something: something.to_string(),
        }
    }

    #[test]
    fn payload_is_tagged_with_event_type() {
        let payload = EventPayload::encode(&happened("data1")).expect("encodes");

        assert_eq!(payload.event_type(), "SomethingHappened");
        assert!(payload.is::<SomethingHappened>());
        assert!(!payload.is::<SomethingElse>());
    }

    #[test]
    fn decode_returns_event_for_matching_tag() {
        let payload = EventPayload::encode(&happened("data1")).expect("encodes");

        let decoded = payload.decode::<SomethingHappened>().expect("decodes");

        assert_eq!(decoded, Some(happened("data1")));
    }

    #[test]
    fn decode_returns_none_for_other_tag() {
        let payload = EventPayload::encode(&happened("data1")).expect("encodes");

        let decoded = payload.decode::<SomethingElse>().expect("tag mismatch is not an error");

        assert_eq!(decoded, None);
    }

    #[test]
    fn decode_reports_malformed_data_for_matching_tag() {
        let payload = EventPayload::from_parts("SomethingElse", serde_json::json!({"count": "x"}));

        let error = payload.decode::<SomethingElse>().unwrap_err();

        assert!(matches!(
            error,
            EventStoreError::DeserializationFailed { ref event_type, .. } if event_type == "SomethingElse"
        ));
    }

    #[test]
    fn envelopes_are_equal_when_event_ids_match() {
        let event_id = EventId::new();
        let first = EventEnvelope::with_id(event_id, stream_id(), &happened("a")).unwrap();
        let second = EventEnvelope::with_id(event_id, stream_id(), &happened("b")).unwrap();
        let third = EventEnvelope::new(stream_id(), &happened("a")).unwrap();

        assert_eq!(first, second);
        assert_ne!(first, third);
    }

    #[test]
    fn headers_are_kept_in_key_order() {
        let envelope = EventEnvelope::new(stream_id(), &happened("a"))
            .unwrap()
            .with_header("user", "alice")
            .with_header("correlation", "c-1");

        let keys: Vec<&String> = envelope.headers().keys().collect();

        assert_eq!(keys, ["correlation", "user"]);
        assert_eq!(envelope.header("user"), Some("alice"));
        assert_eq!(envelope.header("missing"), None);
    }

    #[test]
    fn envelope_serializes_with_tag_and_data() {
        let envelope = EventEnvelope::new(stream_id(), &happened("data1")).unwrap();

        let json = serde_json::to_value(&envelope).unwrap();

        assert_eq!(json["payload"]["event_type"], "SomethingHappened");
        assert_eq!(json["payload"]["data"]["something"], "data1");
        assert!(json.get("headers").is_none());
    }
}
