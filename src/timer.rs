// SPDX-License-Identifier: MPL-2.0

//! Registry of cancellable delayed events.
//!
//! Events are kept ordered by deadline, ties broken by registration order.
//! Nothing here sleeps: the event loop asks for [`Timers::next_deadline`],
//! waits until then, and drains whatever [`Timers::pop_due`] hands back.

use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap},
};

use crate::clock::Timestamp;

/// Token returned on registration, used to cancel the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(u64);

#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Timestamp,
    id: EventId,
}

impl PartialEq for Deadline {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Deadline {}

impl PartialOrd for Deadline {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Deadline {
    fn cmp(&self, other: &Self) -> Ordering {
        self.at
            .total_cmp(&other.at)
            .then_with(|| self.id.cmp(&other.id))
    }
}

#[derive(Debug)]
pub struct Timers<E> {
    pending: BTreeMap<Deadline, E>,
    index: HashMap<EventId, Timestamp>,
    next_id: u64,
}

impl<E> Default for Timers<E> {
    fn default() -> Self {
        Self {
            pending: BTreeMap::new(),
            index: HashMap::new(),
            next_id: 0,
        }
    }
}

impl<E> Timers<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `event` to fire at `at`. Deadlines in the past fire at `now`.
    pub fn add(&mut self, at: Timestamp, now: Timestamp, event: E) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;

        let at = if at.is_nan() { now } else { at.max(now) };
        self.pending.insert(Deadline { at, id }, event);
        self.index.insert(id, at);

        tracing::trace!(?id, at, delay = at - now, "registered event");
        id
    }

    /// Cancel a pending event. Unknown or already fired ids are ignored.
    pub fn cancel(&mut self, id: EventId) -> Option<E> {
        let at = self.index.remove(&id)?;
        self.pending.remove(&Deadline { at, id })
    }

    /// Deadline of the earliest pending event.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Timestamp> {
        self.pending.first_key_value().map(|(deadline, _)| deadline.at)
    }

    /// Remove and return the earliest event if it is due at `now`.
    ///
    /// The event is out of the registry before the caller acts on it, so the
    /// callback is free to register or cancel other events.
    pub fn pop_due(&mut self, now: Timestamp) -> Option<(EventId, E)> {
        let entry = self.pending.first_entry()?;
        if entry.key().at > now {
            return None;
        }

        let id = entry.key().id;
        let event = entry.remove();
        self.index.remove(&id);
        Some((id, event))
    }

    /// Cancel every pending event, returning how many were dropped.
    pub fn clear(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        self.index.clear();
        count
    }

    #[cfg(test)]
    #[must_use]
    pub fn contains(&self, id: EventId) -> bool {
        self.index.contains_key(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(timers: &mut Timers<&'static str>, now: Timestamp) -> Vec<&'static str> {
        std::iter::from_fn(|| timers.pop_due(now))
            .map(|(_, event)| event)
            .collect()
    }

    #[test]
    fn fires_in_deadline_order() {
        let mut timers = Timers::new();
        timers.add(30.0, 0.0, "c");
        timers.add(10.0, 0.0, "a");
        timers.add(20.0, 0.0, "b");

        assert_eq!(timers.next_deadline(), Some(10.0));
        assert_eq!(drain(&mut timers, 25.0), vec!["a", "b"]);
        assert_eq!(timers.len(), 1);
        assert_eq!(drain(&mut timers, 30.0), vec!["c"]);
        assert!(timers.is_empty());
    }

    #[test]
    fn ties_fire_in_registration_order() {
        let mut timers = Timers::new();
        timers.add(5.0, 0.0, "first");
        timers.add(5.0, 0.0, "second");
        timers.add(5.0, 0.0, "third");

        assert_eq!(drain(&mut timers, 5.0), vec!["first", "second", "third"]);
    }

    #[test]
    fn past_deadlines_fire_immediately() {
        let mut timers = Timers::new();
        timers.add(1.0, 100.0, "late");

        assert_eq!(timers.next_deadline(), Some(100.0));
        assert_eq!(drain(&mut timers, 100.0), vec!["late"]);
    }

    #[test]
    fn nothing_fires_early() {
        let mut timers = Timers::new();
        timers.add(10.0, 0.0, "later");

        assert!(timers.pop_due(9.999).is_none());
        assert_eq!(timers.len(), 1);
    }

    #[test]
    fn cancel_is_idempotent() {
        let mut timers = Timers::new();
        let keep = timers.add(10.0, 0.0, "keep");
        let drop = timers.add(10.0, 0.0, "drop");

        assert_eq!(timers.cancel(drop), Some("drop"));
        assert_eq!(timers.cancel(drop), None);
        assert!(timers.contains(keep));
        assert!(!timers.contains(drop));

        assert_eq!(drain(&mut timers, 10.0), vec!["keep"]);
        // already fired
        assert_eq!(timers.cancel(keep), None);
    }

    #[test]
    fn clear_drops_everything() {
        let mut timers = Timers::new();
        let id = timers.add(1.0, 0.0, "a");
        timers.add(2.0, 0.0, "b");

        assert_eq!(timers.clear(), 2);
        assert!(timers.is_empty());
        assert_eq!(timers.next_deadline(), None);
        assert_eq!(timers.cancel(id), None);
    }
}
