//! Rebuilding state by folding events through per-type apply rules.
//!
//! A [`Replayer`] is a dispatch table from event type tag to apply rule. Events
//! whose tag has no rule are skipped without error, so historical streams keep
//! replaying after an event type stops being handled. A tag that *does* have a
//! rule but whose data fails to decode is reported as
//! [`ReplayError::MalformedEvent`].

use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::errors::{EventStoreResult, ReplayError, ReplayResult};
use crate::event::{Event, EventPayload};
use crate::snapshot::Snapshot;
use crate::types::{StreamId, StreamRevision};

type ApplyRule<S> = Box<dyn Fn(&mut S, &EventPayload) -> ReplayResult<()> + Send + Sync>;

/// Outcome of applying one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// A rule matched the event's type and was run.
    Handled,
    /// No rule is registered for the event's type; state is unchanged.
    Skipped,
}

/// Dispatch table folding [`EventPayload`]s into a state `S`.
///
/// ```ignore
/// let replayer = Replayer::new()
///     .on::<SomethingHappened>(|seen: &mut Vec<String>, event| seen.push(event.something));
///
/// let seen = replayer.fold(Vec::new(), events.iter().map(EventEnvelope::payload))?;
/// ```
pub struct Replayer<S> {
    rules: HashMap<&'static str, ApplyRule<S>>,
}

impl<S: 'static> Replayer<S> {
    /// Creates a replayer without rules. Every event is skipped.
    pub fn new() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    /// Registers the apply rule for events of type `E`, replacing any earlier
    /// rule for the same tag.
    #[must_use]
    pub fn on<E, F>(mut self, apply: F) -> Self
    where
        E: Event,
        F: Fn(&mut S, E) + Send + Sync + 'static,
    {
        let rule: ApplyRule<S> = Box::new(move |state: &mut S, payload: &EventPayload| {
            let event =
                E::deserialize(payload.data()).map_err(|error| ReplayError::MalformedEvent {
                    event_type: payload.event_type().to_string(),
                    detail: error.to_string(),
                })?;
            apply(state, event);
            Ok(())
        });
        let _ = self.rules.insert(E::EVENT_TYPE, rule);
        self
    }

    /// Returns true when a rule is registered for `event_type`.
    pub fn handles(&self, event_type: &str) -> bool {
        self.rules.contains_key(event_type)
    }

    /// Applies a single event to `state`.
    ///
    /// # Errors
    ///
    /// `ReplayError::MalformedEvent` when the event's type has a rule but its
    /// data cannot be decoded. `state` is unchanged in that case.
    pub fn apply(&self, state: &mut S, payload: &EventPayload) -> ReplayResult<Applied> {
        match self.rules.get(payload.event_type()) {
            Some(rule) => {
                rule(state, payload)?;
                Ok(Applied::Handled)
            }
            None => {
                trace!(
                    event_type = payload.event_type(),
                    "[replay.skip] no apply rule registered, event ignored"
                );
                Ok(Applied::Skipped)
            }
        }
    }

    /// Folds `payloads`, in order, onto `seed`.
    pub fn fold<'a, I>(&self, seed: S, payloads: I) -> ReplayResult<S>
    where
        I: IntoIterator<Item = &'a EventPayload>,
    {
        let mut state = seed;
        for payload in payloads {
            let _ = self.apply(&mut state, payload)?;
        }
        Ok(state)
    }
}

impl<S: 'static> Default for Replayer<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> fmt::Debug for Replayer<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut handled: Vec<&&str> = self.rules.keys().collect();
        handled.sort();
        f.debug_struct("Replayer")
            .field("handled", &handled)
            .finish()
    }
}

/// State that can be rebuilt from a stream's events and captured as a snapshot.
///
/// Implementors only describe their apply rules; seeding from a snapshot and
/// folding the remaining events is provided.
pub trait Aggregate: Default + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The apply rules for this state.
    fn replayer() -> Replayer<Self>;

    /// Rebuilds state from the beginning of a stream.
    fn replay<'a, I>(events: I) -> ReplayResult<Self>
    where
        I: IntoIterator<Item = &'a EventPayload>,
    {
        Self::replayer().fold(Self::default(), events)
    }

    /// Rebuilds state from an optional snapshot followed by the events
    /// committed after it. Without a snapshot the seed is `Self::default()`.
    fn from_snapshot<'a, I>(snapshot: Option<&Snapshot>, events: I) -> ReplayResult<Self>
    where
        I: IntoIterator<Item = &'a EventPayload>,
    {
        let seed = match snapshot {
            Some(snapshot) => snapshot.restore()?,
            None => Self::default(),
        };
        Self::replayer().fold(seed, events)
    }

    /// Captures this state as the snapshot of `stream_id` at `revision`.
    fn snapshot(&self, stream_id: StreamId, revision: StreamRevision) -> EventStoreResult<Snapshot> {
        Snapshot::capture(stream_id, revision, self)
    }
}
