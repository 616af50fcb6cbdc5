//! Conversion between metrical and physical time.

use crate::{event::MetaMessage, primitive::Timing, track::Track};

/// The tempo and time signature in effect from a given instant onwards.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct Tempo {
    /// Instant at which this entry takes effect, in pulses.
    pub pulses: u64,
    /// The same instant, in seconds.
    pub seconds: f64,
    pub micros_per_quarter: u32,
    pub numerator: u8,
    /// The actual note value of a beat (`4` for a quarter note), not the power of two stored in
    /// the file.
    pub denominator: u32,
    pub clocks_per_click: u8,
    pub notated_32nds_per_quarter: u8,
}
impl Default for Tempo {
    /// 120 beats per minute in 4/4.
    fn default() -> Tempo {
        Tempo {
            pulses: 0,
            seconds: 0.0,
            micros_per_quarter: 500_000,
            numerator: 4,
            denominator: 4,
            clocks_per_click: 24,
            notated_32nds_per_quarter: 8,
        }
    }
}
impl Tempo {
    /// Tempo in quarter notes per minute.
    pub fn bpm(&self) -> f64 {
        60_000_000.0 / self.micros_per_quarter as f64
    }
}

/// Tempo entries sorted by the pulse they take effect at.
///
/// There is always an entry at pulse 0; unless the file says otherwise it is the
/// [default](struct.Tempo.html#impl-Default) 120 BPM, 4/4 entry.
/// Every query is a floor lookup: the governing entry of an instant is the last entry that
/// starts at or before it.
#[derive(Clone, Debug, PartialEq)]
pub struct TempoMap {
    timing: Timing,
    entries: Vec<Tempo>,
}
impl TempoMap {
    pub fn new(timing: Timing) -> TempoMap {
        TempoMap {
            timing,
            entries: vec![Tempo::default()],
        }
    }

    #[inline]
    pub fn timing(&self) -> Timing {
        self.timing
    }

    #[inline]
    pub fn entries(&self) -> &[Tempo] {
        &self.entries
    }

    /// Insert an entry, replacing any entry that starts at the same pulse.
    ///
    /// The `seconds` field of the given entry is ignored and recomputed, along with the
    /// `seconds` of every later entry.
    pub fn observe(&mut self, mut entry: Tempo) {
        entry.micros_per_quarter = entry.micros_per_quarter.max(1);
        let idx = match self
            .entries
            .binary_search_by(|probe| probe.pulses.cmp(&entry.pulses))
        {
            Ok(idx) => {
                self.entries[idx] = entry;
                idx
            }
            Err(idx) => {
                self.entries.insert(idx, entry);
                idx
            }
        };
        self.update_seconds(idx);
    }

    /// Record a tempo change, keeping the time signature of the governing entry.
    pub fn observe_tempo(&mut self, pulses: u64, micros_per_quarter: u32) {
        let mut entry = *self.tempo_at_pulses(pulses);
        entry.pulses = pulses;
        entry.micros_per_quarter = micros_per_quarter;
        self.observe(entry);
    }

    /// Record a time signature change, keeping the tempo of the governing entry.
    ///
    /// `denominator_pow` is the power of two stored in the file.
    pub fn observe_time_signature(
        &mut self,
        pulses: u64,
        numerator: u8,
        denominator_pow: u8,
        clocks_per_click: u8,
        notated_32nds_per_quarter: u8,
    ) {
        let mut entry = *self.tempo_at_pulses(pulses);
        entry.pulses = pulses;
        entry.numerator = numerator;
        entry.denominator = 1u32.checked_shl(denominator_pow as u32).unwrap_or(0);
        entry.clocks_per_click = clocks_per_click;
        entry.notated_32nds_per_quarter = notated_32nds_per_quarter;
        self.observe(entry);
    }

    fn update_seconds(&mut self, from: usize) {
        //The first entry always sits at pulse 0
        if let Some(first) = self.entries.first_mut() {
            first.seconds = 0.0;
        }
        for idx in from.max(1)..self.entries.len() {
            let prev = self.entries[idx - 1];
            let entry = &mut self.entries[idx];
            entry.seconds = prev.seconds
                + self
                    .timing
                    .pulses_to_seconds(entry.pulses - prev.pulses, prev.micros_per_quarter);
        }
    }

    /// The entry governing the given pulse.
    pub fn tempo_at_pulses(&self, pulses: u64) -> &Tempo {
        let idx = self.entries.partition_point(|entry| entry.pulses <= pulses);
        &self.entries[idx.max(1) - 1]
    }

    /// The entry governing the given second, or `None` for negative or NaN times.
    pub fn tempo_at_seconds(&self, seconds: f64) -> Option<&Tempo> {
        if !(seconds >= 0.0) {
            return None;
        }
        let idx = self.entries.partition_point(|entry| entry.seconds <= seconds);
        Some(&self.entries[idx.max(1) - 1])
    }

    pub fn seconds_for_pulses(&self, pulses: u64) -> f64 {
        let entry = self.tempo_at_pulses(pulses);
        entry.seconds
            + self
                .timing
                .pulses_to_seconds(pulses - entry.pulses, entry.micros_per_quarter)
    }

    /// Rounded to the nearest pulse. Negative times map to pulse 0, times past the pulse range
    /// saturate at `u64::MAX`.
    pub fn pulses_for_seconds(&self, seconds: f64) -> u64 {
        match self.elapsed_pulses(seconds) {
            Some((entry, elapsed)) => entry.pulses.saturating_add(elapsed.round() as u64),
            None => 0,
        }
    }

    /// Like `pulses_for_seconds`, but `None` when the pulse does not fit in a `u64`.
    pub fn checked_pulses_for_seconds(&self, seconds: f64) -> Option<u64> {
        let (entry, elapsed) = match self.elapsed_pulses(seconds) {
            Some(found) => found,
            None => return Some(0),
        };
        let elapsed = elapsed.round();
        if !(elapsed < u64::MAX as f64) {
            return None;
        }
        entry.pulses.checked_add(elapsed as u64)
    }

    /// The first pulse whose time in seconds is at or after `seconds`.
    pub fn ceil_pulses_for_seconds(&self, seconds: f64) -> u64 {
        let mut pulses = match self.elapsed_pulses(seconds) {
            Some((entry, elapsed)) => entry.pulses.saturating_add(elapsed.floor() as u64),
            None => return 0,
        };
        //Float noise can leave the estimate a pulse off either way
        while pulses > 0 && self.seconds_for_pulses(pulses - 1) >= seconds {
            pulses -= 1;
        }
        while pulses < u64::MAX && self.seconds_for_pulses(pulses) < seconds {
            pulses += 1;
        }
        pulses
    }

    /// The governing entry of `seconds` and the fractional pulses elapsed since it.
    fn elapsed_pulses(&self, seconds: f64) -> Option<(&Tempo, f64)> {
        let entry = self.tempo_at_seconds(seconds)?;
        let elapsed = self
            .timing
            .seconds_to_pulses(seconds - entry.seconds, entry.micros_per_quarter);
        Some((entry, elapsed))
    }

    /// Rebuild the map from the tempo and time signature meta events of every track.
    ///
    /// Events are observed in time order across tracks; at equal times, lower track numbers
    /// come first.
    pub(crate) fn rebuild(&mut self, tracks: &[Track]) {
        self.entries.clear();
        self.entries.push(Tempo::default());
        let mut changes = tracks
            .iter()
            .flat_map(|track| track.events())
            .filter_map(|ev| match ev.meta()? {
                msg @ MetaMessage::Tempo(_) | msg @ MetaMessage::TimeSignature(..) => {
                    Some((ev.pulses(), msg))
                }
                _ => None,
            })
            .collect::<Vec<_>>();
        changes.sort_by_key(|(pulses, _)| *pulses);
        for (pulses, msg) in changes {
            match msg {
                MetaMessage::Tempo(micros) => self.observe_tempo(pulses, micros.as_int()),
                MetaMessage::TimeSignature(num, den, clocks, notes) => {
                    self.observe_time_signature(pulses, num, den, clocks, notes)
                }
                _ => {}
            }
        }
        log::trace!("tempo map rebuilt with {} entries", self.entries.len());
    }
}
