//! Change events and the matching helpers used by listeners.
//!
//! An [`Event`] is produced once per observed value change of a tag. Windowed
//! listeners receive an [`Events`] view of the recent history and can test it
//! with a [`Predicate`] or a [`Match`].
//!
//! Matching accepts either the tag name or the raw address, so `"Start"` and
//! `"X0"` are interchangeable for a tag registered as `add_tag("X0", Some("Start"))`.
//!
//! # Example
//!
//! ```
//! use melsec_mc::{Event, Events, Match, Predicate};
//!
//! let events = Events::new(vec![
//!     Event::new("X1", "Left Button", 1),
//!     Event::new("X2", "Right Button", 1),
//! ]);
//!
//! assert!(events.contains(&Match::name("Left Button").value(1)));
//! assert!(events.contains(&Match::name("X2")));
//! assert!(events.matches(&Predicate::all(["Left Button", "Right Button"], 1)));
//! ```

use std::time::SystemTime;

/// A single observed value change.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Event {
    /// Device address of the tag, e.g. `"X0"`.
    pub address: String,
    /// Logical name of the tag.
    pub name: String,
    /// New value.
    pub value: u16,
    /// Wall-clock time the change was detected.
    pub timestamp: SystemTime,
}

impl Event {
    /// Creates an event stamped with the current time.
    pub fn new(address: impl Into<String>, name: impl Into<String>, value: u16) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
            value,
            timestamp: SystemTime::now(),
        }
    }

    /// Returns whether the event refers to `name` (by name or address) with `value`.
    pub fn matches(&self, name: &str, value: u16) -> bool {
        self.refers_to(name) && self.value == value
    }

    /// Returns whether `name` is this event's name or address.
    pub fn refers_to(&self, name: &str) -> bool {
        self.name == name || self.address == name
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.address == self.name {
            write!(f, "<{}: {}>", self.address, self.value)
        } else {
            write!(f, "<{}({}): {}>", self.address, self.name, self.value)
        }
    }
}

/// A set of `(name, value)` conditions that must hold together.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Predicate {
    pairs: Vec<(String, u16)>,
    unsatisfiable: bool,
}

impl Predicate {
    /// Creates a predicate from explicit `(name, value)` pairs.
    pub fn new<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, u16)>,
        S: Into<String>,
    {
        Self {
            pairs: pairs.into_iter().map(|(n, v)| (n.into(), v)).collect(),
            unsatisfiable: false,
        }
    }

    /// Creates a predicate requiring every name to have the same `value`.
    pub fn all<I, S>(names: I, value: u16) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(names.into_iter().map(|n| (n, value)))
    }

    /// Pairs `names` with `values` positionally.
    ///
    /// When the lengths differ the predicate is kept but never matches.
    pub fn zip<S: AsRef<str>>(names: &[S], values: &[u16]) -> Self {
        let mut predicate = Self::new(
            names
                .iter()
                .zip(values)
                .map(|(n, &v)| (n.as_ref().to_string(), v)),
        );
        predicate.unsatisfiable = names.len() != values.len();
        predicate
    }

    /// Returns the required pairs.
    pub fn pairs(&self) -> &[(String, u16)] {
        &self.pairs
    }

    /// Returns whether `event` satisfies at least one required pair.
    pub fn is_triggered_by(&self, event: &Event) -> bool {
        !self.unsatisfiable && self.pairs.iter().any(|(n, v)| event.matches(n, *v))
    }

    /// Returns whether every required pair is present among `events`.
    pub fn is_satisfied_by<'a, I>(&self, events: I) -> bool
    where
        I: IntoIterator<Item = &'a Event>,
        I::IntoIter: Clone,
    {
        if self.unsatisfiable {
            return false;
        }
        let events = events.into_iter();
        self.pairs
            .iter()
            .all(|(n, v)| events.clone().any(|e| e.matches(n, *v)))
    }
}

/// A name matcher with an optional value constraint.
///
/// ```
/// use melsec_mc::{Event, Match};
///
/// let event = Event::new("X0", "Emergency Stop", 0);
/// assert!(Match::name("Emergency Stop").is_match(&event));
/// assert!(!Match::name("Emergency Stop").value(1).is_match(&event));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    name: String,
    value: Option<u16>,
}

impl Match {
    /// Matches any event for `name` (tag name or address).
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }

    /// Additionally requires the event value to equal `value`.
    pub fn value(mut self, value: u16) -> Self {
        self.value = Some(value);
        self
    }

    /// Returns whether `event` matches.
    pub fn is_match(&self, event: &Event) -> bool {
        event.refers_to(&self.name) && self.value.map_or(true, |v| v == event.value)
    }
}

/// A chronological slice of event history, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Events {
    events: Vec<Event>,
}

impl Events {
    /// Wraps events given oldest first.
    pub fn new(events: Vec<Event>) -> Self {
        Self { events }
    }

    /// Returns the most recent event.
    pub fn last(&self) -> Option<&Event> {
        self.events.last()
    }

    /// Returns the number of events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns whether there are no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Iterates oldest first.
    pub fn iter(&self) -> std::slice::Iter<'_, Event> {
        self.events.iter()
    }

    /// Returns whether any event matches `m`.
    pub fn contains(&self, m: &Match) -> bool {
        self.events.iter().any(|e| m.is_match(e))
    }

    /// Returns whether the latest event triggers `predicate` and every pair
    /// of the predicate is present somewhere in the slice.
    ///
    /// Requiring the latest event to take part keeps a stale combination
    /// from matching again on an unrelated change.
    pub fn matches(&self, predicate: &Predicate) -> bool {
        match self.last() {
            Some(last) => predicate.is_triggered_by(last) && predicate.is_satisfied_by(&self.events),
            None => false,
        }
    }

    /// Consumes the view and returns the events.
    pub fn into_vec(self) -> Vec<Event> {
        self.events
    }
}

impl<'a> IntoIterator for &'a Events {
    type Item = &'a Event;
    type IntoIter = std::slice::Iter<'a, Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

impl std::ops::Index<usize> for Events {
    type Output = Event;

    fn index(&self, index: usize) -> &Event {
        &self.events[index]
    }
}
