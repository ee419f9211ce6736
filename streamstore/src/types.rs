//! Core types for the streamstore library.
//!
//! This module defines the identifiers and counters used throughout the library.
//! All types use smart constructors to ensure validity at construction time,
//! following the "parse, don't validate" principle.

use chrono::{DateTime, Utc};
use nutype::nutype;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::validation::printable_stream_id;

/// A stream identifier that uniquely identifies an event stream.
///
/// `StreamId` values are guaranteed to be non-empty, at most 255 characters and
/// free of control characters. Once constructed, a `StreamId` is always valid.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255, predicate = printable_stream_id),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct StreamId(String);

impl StreamId {
    /// Creates a stream identifier from a UUID, the usual identity of an aggregate.
    pub fn from_uuid(id: Uuid) -> Self {
        // The hyphenated form is 36 printable ASCII characters
        Self::try_new(id.hyphenated().to_string())
            .expect("a hyphenated UUID is always a valid stream id")
    }
}

/// A globally unique event identifier using UUIDv7 format.
///
/// `EventId` values are guaranteed to be UUIDv7, which provides:
/// - Time-based ordering capability
/// - Globally unique identification
/// - Monotonic sort order for events created in sequence
#[nutype(
    validate(predicate = |id: &Uuid| id.get_version() == Some(uuid::Version::SortRand)),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new `EventId` with the current timestamp.
    pub fn new() -> Self {
        // This will always succeed as Uuid::now_v7() always returns a valid v7 UUID
        Self::try_new(Uuid::now_v7()).expect("Uuid::now_v7() should always return a valid v7 UUID")
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

/// Caller-supplied idempotency token for a commit.
///
/// Any non-nil UUID is accepted so that identifiers minted by other systems can be
/// used to detect retried commits.
#[nutype(
    validate(predicate = |id: &Uuid| !id.is_nil()),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct CommitId(Uuid);

impl CommitId {
    /// Creates a new, time-ordered commit identifier.
    pub fn new() -> Self {
        Self::try_new(Uuid::now_v7()).expect("Uuid::now_v7() is never nil")
    }
}

impl Default for CommitId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<EventId> for CommitId {
    /// Uses an event's identifier as the commit token, the common choice when a
    /// commit carries a single triggering event.
    fn from(event_id: EventId) -> Self {
        // EventId is guaranteed to be v7, so it is never nil
        Self::try_new(*event_id.as_ref()).expect("EventId should never be the nil UUID")
    }
}

/// The revision of a stream: the number of events committed to it so far.
///
/// Revisions start at 0 (empty stream). The first committed event has revision 1.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    Into,
    Serialize,
    Deserialize
))]
pub struct StreamRevision(u64);

impl StreamRevision {
    /// The revision of a stream without any commits.
    pub fn initial() -> Self {
        Self::new(0)
    }

    /// The open upper bound used when a read should include the latest event.
    pub fn unbounded() -> Self {
        Self::new(u64::MAX)
    }

    /// Returns the revision directly after this one.
    #[must_use]
    pub fn next(self) -> Self {
        self.advance(1)
    }

    /// Returns the revision reached after appending `count` events.
    #[must_use]
    pub fn advance(self, count: usize) -> Self {
        let count = u64::try_from(count).unwrap_or(u64::MAX);
        Self::new(self.into_inner().saturating_add(count))
    }
}

/// Position of a commit among all commits of its stream.
///
/// The first commit of a stream has sequence 1; 0 means "no commit yet".
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    Into,
    Serialize,
    Deserialize
))]
pub struct CommitSequence(u64);

impl CommitSequence {
    /// The sequence of a stream without any commits.
    pub fn initial() -> Self {
        Self::new(0)
    }

    /// Returns the sequence of the commit following this one.
    #[must_use]
    pub fn next(self) -> Self {
        Self::new(self.into_inner().saturating_add(1))
    }
}

/// A wall-clock timestamp, used as the stamp of a commit.
///
/// This wrapper ensures consistent timestamp handling throughout the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a new timestamp from a UTC `DateTime`.
    pub const fn new(datetime: DateTime<Utc>) -> Self {
        Self(datetime)
    }

    /// Creates a timestamp representing the current moment.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Returns the underlying `DateTime`.
    pub const fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Converts the timestamp into the underlying `DateTime`.
    pub const fn into_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(datetime: DateTime<Utc>) -> Self {
        Self::new(datetime)
    }
}

impl From<Timestamp> for DateTime<Utc> {
    fn from(timestamp: Timestamp) -> Self {
        timestamp.into_datetime()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn stream_id_accepts_valid_strings(s in "[a-zA-Z0-9_-]{1,255}") {
            let result = StreamId::try_new(s.clone());
            prop_assert!(result.is_ok());
            let stream_id = result.unwrap();
            prop_assert_eq!(stream_id.as_ref(), &s);
        }

        #[test]
        fn stream_id_trims_whitespace(s in " {0,10}[a-zA-Z0-9_-]{1,240} {0,10}") {
            let stream_id = StreamId::try_new(s.clone()).unwrap();
            prop_assert_eq!(stream_id.as_ref(), s.trim());
        }

        #[test]
        fn stream_id_rejects_empty_strings(s in " {0,50}") {
            prop_assert!(StreamId::try_new(s).is_err());
        }

        #[test]
        fn stream_id_rejects_strings_over_255_chars(s in "[a-zA-Z0-9]{256,500}") {
            prop_assert!(StreamId::try_new(s).is_err());
        }

        #[test]
        fn stream_revision_advance_adds_count(v in 0u64..u64::MAX / 2, count in 0usize..10_000) {
            let advanced = StreamRevision::new(v).advance(count);
            prop_assert_eq!(advanced.into_inner(), v + count as u64);
        }

        #[test]
        fn stream_revision_ordering_matches_u64(v1 in any::<u64>(), v2 in any::<u64>()) {
            let r1 = StreamRevision::new(v1);
            let r2 = StreamRevision::new(v2);
            prop_assert_eq!(r1 < r2, v1 < v2);
            prop_assert_eq!(r1 == r2, v1 == v2);
        }

        #[test]
        fn commit_id_accepts_any_non_nil_uuid(uuid_bytes in any::<[u8; 16]>()) {
            let uuid = Uuid::from_bytes(uuid_bytes);
            prop_assume!(!uuid.is_nil());
            prop_assert!(CommitId::try_new(uuid).is_ok());
        }
    }

    #[test]
    fn stream_id_from_uuid_uses_hyphenated_form() {
        let uuid = Uuid::now_v7();

        let stream_id = StreamId::from_uuid(uuid);

        assert_eq!(stream_id.as_ref(), uuid.hyphenated().to_string());
    }

    #[test]
    fn stream_id_rejects_embedded_control_characters() {
        assert!(StreamId::try_new("orders\0-42").is_err());
        assert!(StreamId::try_new("orders\n42").is_err());
    }

    #[test]
    fn event_id_new_creates_valid_v7() {
        let event_id = EventId::new();
        assert_eq!(
            event_id.as_ref().get_version(),
            Some(uuid::Version::SortRand)
        );
    }

    #[test]
    fn event_id_rejects_v4_uuid() {
        assert!(EventId::try_new(Uuid::from_u128(0x1234_5678_9abc_4def_8123_4567_89ab_cdef)).is_err());
    }

    #[test]
    fn commit_id_rejects_nil_uuid() {
        assert!(CommitId::try_new(Uuid::nil()).is_err());
    }

    #[test]
    fn commit_id_from_event_id_keeps_uuid() {
        let event_id = EventId::new();

        let commit_id = CommitId::from(event_id);

        assert_eq!(commit_id.as_ref(), event_id.as_ref());
    }

    #[test]
    fn stream_revision_initial_is_zero_and_next_is_one() {
        assert_eq!(StreamRevision::initial().into_inner(), 0);
        assert_eq!(StreamRevision::initial().next(), StreamRevision::new(1));
    }

    #[test]
    fn stream_revision_advance_saturates_at_unbounded() {
        assert_eq!(
            StreamRevision::unbounded().advance(3),
            StreamRevision::unbounded()
        );
    }

    #[test]
    fn commit_sequence_next_increments_by_one() {
        assert_eq!(CommitSequence::new(4).next(), CommitSequence::new(5));
    }

    #[test]
    fn timestamp_now_creates_current_time() {
        let before = Utc::now();
        let timestamp = Timestamp::now();
        let after = Utc::now();

        assert!(timestamp.as_datetime() >= &before);
        assert!(timestamp.as_datetime() <= &after);
    }

    #[test]
    fn revision_serializes_as_plain_number() {
        let json = serde_json::to_string(&StreamRevision::new(42)).unwrap();
        assert_eq!(json, "42");
    }
}
