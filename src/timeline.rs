//! The two time domains and the event cursors built on top of them.

use crate::{event::Event, prelude::*, tempo::TempoMap, track::Track};
use std::{cmp::Reverse, collections::BinaryHeap, slice, str::FromStr};

/// How times are expressed: metrical time counts pulses (ticks), physical time counts seconds.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum Domain {
    Metrical,
    Physical,
}
impl FromStr for Domain {
    type Err = ValidationError;
    fn from_str(tag: &str) -> StdResult<Domain, ValidationError> {
        match tag {
            "metrical" => Ok(Domain::Metrical),
            "physical" => Ok(Domain::Physical),
            _ => Err(ValidationError::UnknownDomain(tag.to_string())),
        }
    }
}
impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Domain::Metrical => "metrical",
            Domain::Physical => "physical",
        })
    }
}
impl Domain {
    /// The time of an event in this domain.
    #[inline]
    pub fn time_of(self, ev: &Event) -> Time {
        match self {
            Domain::Metrical => Time::Pulses(ev.pulses),
            Domain::Physical => Time::Seconds(ev.seconds),
        }
    }

    /// Whether an event lies past an inclusive upper bound. Negative bounds are unbounded.
    fn exceeds(self, ev: &Event, end: f64) -> bool {
        if end < 0.0 {
            return false;
        }
        match self {
            Domain::Metrical => ev.pulses as f64 > end,
            Domain::Physical => ev.seconds > end,
        }
    }

    /// The pulse a cursor should be placed at so that the first event it yields is at or
    /// after `start`. Non-positive starts rewind to the beginning.
    pub(crate) fn seek_target(self, start: f64, tempo_map: &TempoMap) -> u64 {
        if !(start > 0.0) {
            return 0;
        }
        match self {
            Domain::Metrical => start.ceil() as u64,
            Domain::Physical => tempo_map.ceil_pulses_for_seconds(start),
        }
    }
}

/// Convert a caller-supplied pulse time, rejecting anything that is not a whole, non-negative
/// number of pulses.
pub(crate) fn whole_pulses(time: f64) -> StdResult<u64, ValidationError> {
    ensure!(
        time.is_finite() && time >= 0.0,
        ValidationError::InvalidTime { time }
    );
    ensure!(time.fract() == 0.0, ValidationError::FractionalPulses { time });
    ensure!(
        time <= u64::MAX as f64,
        ValidationError::PulsesOutOfRange { time }
    );
    Ok(time as u64)
}

/// An instant in one of the two time domains.
#[derive(Copy, Clone, PartialEq, PartialOrd, Debug)]
pub enum Time {
    Pulses(u64),
    Seconds(f64),
}
impl Time {
    #[inline]
    pub fn domain(&self) -> Domain {
        match self {
            Time::Pulses(_) => Domain::Metrical,
            Time::Seconds(_) => Domain::Physical,
        }
    }

    #[inline]
    pub fn as_f64(&self) -> f64 {
        match *self {
            Time::Pulses(pulses) => pulses as f64,
            Time::Seconds(seconds) => seconds,
        }
    }
}
impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Time::Pulses(pulses) => write!(f, "{}", pulses),
            Time::Seconds(seconds) => write!(f, "{:?}", seconds),
        }
    }
}

/// Which events a query draws from.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum TrackSelector {
    /// Every track, merged in chronological order.
    All,
    /// A single track, by its 1-based number.
    Track(usize),
}
impl TrackSelector {
    /// `0` selects every track, positive numbers select a single track.
    pub fn from_number(number: i64) -> StdResult<TrackSelector, ValidationError> {
        match number {
            0 => Ok(TrackSelector::All),
            n if n > 0 => Ok(TrackSelector::Track(n as usize)),
            n => Err(ValidationError::InvalidTrackSelector(n)),
        }
    }
}

/// A playable message together with its time, as yielded by [`Events`](struct.Events.html).
///
/// `track` is only set when events are drawn from all tracks merged.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct TimedMessage {
    pub time: Time,
    pub track: Option<usize>,
    bytes: [u8; 3],
    len: u8,
}
impl TimedMessage {
    #[inline]
    pub fn status(&self) -> u8 {
        self.bytes[0]
    }

    /// The data bytes following the status, between zero and two of them.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.bytes[1..self.len as usize]
    }

    /// The status byte followed by the data bytes.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }
}
impl fmt::Display for TimedMessage {
    /// Formats as a `(time, [track,] status, data...)` tuple.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}", self.time)?;
        if let Some(track) = self.track {
            write!(f, ", {}", track)?;
        }
        for byte in self.bytes() {
            write!(f, ", {}", byte)?;
        }
        write!(f, ")")
    }
}

/// Step-wise cursor over all tracks at once, yielding events by ascending pulse and breaking
/// ties by ascending track number.
///
/// The cursor does not borrow the tracks, so it can live next to them.
#[derive(Clone, Debug, Default)]
pub(crate) struct MergeCursor {
    positions: Vec<usize>,
    ev_heap: BinaryHeap<Reverse<(u64, usize)>>,
}
impl MergeCursor {
    pub(crate) fn new(tracks: &[Track], start: u64) -> MergeCursor {
        let positions = tracks
            .iter()
            .map(|track| track.position_of(start))
            .collect::<Vec<_>>();
        let mut ev_heap = BinaryHeap::with_capacity(tracks.len());
        for (track_idx, (track, &pos)) in tracks.iter().zip(&positions).enumerate() {
            if let Some(ev) = track.events.get(pos) {
                ev_heap.push(Reverse((ev.pulses, track_idx)));
            }
        }
        MergeCursor { positions, ev_heap }
    }

    pub(crate) fn peek<'a>(&self, tracks: &'a [Track]) -> Option<&'a Event> {
        let Reverse((_, track_idx)) = *self.ev_heap.peek()?;
        tracks.get(track_idx)?.events.get(self.positions[track_idx])
    }

    pub(crate) fn next<'a>(&mut self, tracks: &'a [Track]) -> Option<&'a Event> {
        let Reverse((_, track_idx)) = self.ev_heap.pop()?;
        let track = tracks.get(track_idx)?;
        let pos = &mut self.positions[track_idx];
        let this_ev = track.events.get(*pos)?;
        *pos += 1;
        if let Some(next_ev) = track.events.get(*pos) {
            self.ev_heap.push(Reverse((next_ev.pulses, track_idx)));
        }
        Some(this_ev)
    }
}

enum EventSource<'a> {
    WholeDocument {
        tracks: &'a [Track],
        cursor: MergeCursor,
    },
    SingleTrack(slice::Iter<'a, Event>),
}
impl<'a> EventSource<'a> {
    fn next(&mut self) -> Option<&'a Event> {
        match self {
            EventSource::WholeDocument { tracks, cursor } => cursor.next(*tracks),
            EventSource::SingleTrack(iter) => iter.next(),
        }
    }
}

/// Lazy iterator over the playable messages inside a time window, in ascending time order.
///
/// Meta events, System Exclusive packets and MTC quarter frames are skipped, escapes show up
/// as a lone `0xF7` status. Iteration stops at the first playable event past the end of the window.
pub struct Events<'a> {
    source: EventSource<'a>,
    domain: Domain,
    end: f64,
    with_track: bool,
    done: bool,
}
impl<'a> Events<'a> {
    pub(crate) fn new(
        tracks: &'a [Track],
        selected: Option<&'a Track>,
        domain: Domain,
        start: u64,
        end: f64,
    ) -> Events<'a> {
        let (source, with_track) = match selected {
            Some(track) => (
                EventSource::SingleTrack(track.events[track.position_of(start)..].iter()),
                false,
            ),
            None => (
                EventSource::WholeDocument {
                    tracks,
                    cursor: MergeCursor::new(tracks, start),
                },
                true,
            ),
        };
        Events {
            source,
            domain,
            end,
            with_track,
            done: false,
        }
    }
}
impl<'a> Iterator for Events<'a> {
    type Item = TimedMessage;
    fn next(&mut self) -> Option<TimedMessage> {
        if self.done {
            return None;
        }
        loop {
            let ev = match self.source.next() {
                Some(ev) => ev,
                None => {
                    self.done = true;
                    return None;
                }
            };
            if ev.is_metadata() {
                continue;
            }
            if self.domain.exceeds(ev, self.end) {
                self.done = true;
                return None;
            }
            if ev.kind.is_ignorable() {
                continue;
            }
            if let Some((bytes, len)) = ev.kind.short_message() {
                return Some(TimedMessage {
                    time: self.domain.time_of(ev),
                    track: if self.with_track { Some(ev.track) } else { None },
                    bytes,
                    len: len as u8,
                });
            }
        }
    }
}
