use crate::{
    event::{Event, EventKind},
    prelude::*,
    tempo::TempoMap,
};
use std::slice;

/// The events of a single track chunk, in the order they are stored.
///
/// Tracks are never sorted automatically: events are expected to be appended in non-decreasing
/// time order, as they are laid out in a file.
/// Appending out of order is allowed, but the relative order of such events in merged views and
/// their delta times once written are unspecified.
///
/// Besides the stateless [`iter`](#method.iter), a track carries a cursor for step-wise
/// consumption through [`next_event`](#method.next_event).
#[derive(Clone, Debug, Default)]
pub struct Track {
    pub(crate) number: usize,
    pub(crate) events: Vec<Event>,
    cursor: usize,
}
impl Track {
    /// Create an empty track, not yet attached to any document.
    pub fn new() -> Track {
        Track::default()
    }

    pub(crate) fn from_events(events: Vec<Event>) -> Track {
        Track {
            number: 0,
            events,
            cursor: 0,
        }
    }

    /// 1-based number of this track within its document, or 0 if it is detached.
    #[inline]
    pub fn number(&self) -> usize {
        self.number
    }

    pub(crate) fn set_number(&mut self, number: usize) {
        self.number = number;
        for ev in &mut self.events {
            ev.track = number;
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    #[inline]
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// A fresh iterator over the events, from the first one.
    /// The step-wise cursor is not affected.
    #[inline]
    pub fn iter(&self) -> slice::Iter<Event> {
        self.events.iter()
    }

    /// Append an event at the given absolute pulse.
    ///
    /// The time in seconds is stamped once the track is attached to a document.
    pub fn append_event_at_pulses(&mut self, kind: EventKind, pulses: u64) -> &Event {
        self.events.push(Event {
            pulses,
            seconds: 0.0,
            track: self.number,
            kind,
        });
        &self.events[self.events.len() - 1]
    }

    /// Append an event at the given absolute time in seconds, converted to pulses through
    /// `tempo_map`.
    pub fn append_event_at_seconds(
        &mut self,
        kind: EventKind,
        seconds: f64,
        tempo_map: &TempoMap,
    ) -> StdResult<&Event, ValidationError> {
        ensure!(
            seconds.is_finite() && seconds >= 0.0,
            ValidationError::InvalidTime { time: seconds }
        );
        let pulses = tempo_map
            .checked_pulses_for_seconds(seconds)
            .ok_or(ValidationError::PulsesOutOfRange { time: seconds })?;
        self.events.push(Event {
            pulses,
            seconds,
            track: self.number,
            kind,
        });
        Ok(&self.events[self.events.len() - 1])
    }

    /// Index of the first event at or after the given pulse.
    pub(crate) fn position_of(&self, pulses: u64) -> usize {
        self.events.partition_point(|ev| ev.pulses < pulses)
    }

    /// Move the step-wise cursor back to the first event.
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    /// Move the step-wise cursor to the first event at or after the given pulse.
    pub fn seek_to_pulses(&mut self, pulses: u64) {
        self.cursor = self.position_of(pulses);
    }

    /// The event under the cursor, without advancing it.
    pub fn peek_next_event(&self) -> Option<&Event> {
        self.events.get(self.cursor)
    }

    /// The event under the cursor, advancing the cursor past it.
    pub fn next_event(&mut self) -> Option<&Event> {
        let ev = self.events.get(self.cursor)?;
        self.cursor += 1;
        Some(ev)
    }

    /// Time of the latest event in pulses, or 0 if the track is empty.
    pub fn length_pulses(&self) -> u64 {
        self.events.iter().map(|ev| ev.pulses).max().unwrap_or(0)
    }

    /// Time of the latest event in seconds, or 0 if the track is empty.
    pub fn length_seconds(&self) -> f64 {
        self.events.iter().map(|ev| ev.seconds).fold(0.0, f64::max)
    }

    /// Re-derive the time in seconds of every event.
    pub(crate) fn stamp_seconds(&mut self, tempo_map: &TempoMap) {
        for ev in &mut self.events {
            ev.seconds = tempo_map.seconds_for_pulses(ev.pulses);
        }
    }
}
impl PartialEq for Track {
    /// Tracks are equal if they hold the same events, wherever their cursors are.
    fn eq(&self, other: &Track) -> bool {
        self.number == other.number && self.events == other.events
    }
}
impl<'a> IntoIterator for &'a Track {
    type Item = &'a Event;
    type IntoIter = slice::Iter<'a, Event>;
    fn into_iter(self) -> slice::Iter<'a, Event> {
        self.events.iter()
    }
}
