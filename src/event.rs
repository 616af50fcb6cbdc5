//! All sort of events and their parsers.

use crate::{
    prelude::*,
    primitive::{read_varlen_slice, write_varlen_slice, SmpteTime},
};

/// A single event of a track, stamped with both its metrical and its physical time.
///
/// Events are owned by their [`Track`](struct.Track.html).
/// `pulses` is the absolute time in ticks since the start of the file, and `seconds` is derived
/// from it through the tempo map of the owning [`Smf`](struct.Smf.html).
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub(crate) pulses: u64,
    pub(crate) seconds: f64,
    pub(crate) track: usize,
    pub kind: EventKind,
}
impl Event {
    /// Create a detached event, at time zero and with no owning track.
    pub fn new(kind: EventKind) -> Event {
        Event {
            pulses: 0,
            seconds: 0.0,
            track: 0,
            kind,
        }
    }

    /// Absolute time in pulses (ticks).
    #[inline]
    pub fn pulses(&self) -> u64 {
        self.pulses
    }

    /// Absolute time in seconds, as derived from the tempo map.
    #[inline]
    pub fn seconds(&self) -> f64 {
        self.seconds
    }

    /// 1-based number of the owning track, or 0 if the event is not part of a track.
    #[inline]
    pub fn track_number(&self) -> usize {
        self.track
    }

    /// Whether this is a meta event (status `0xFF`).
    #[inline]
    pub fn is_metadata(&self) -> bool {
        matches!(self.kind, EventKind::Meta { .. })
    }

    /// Decode the payload of a meta event.
    pub fn meta(&self) -> Option<MetaMessage> {
        match &self.kind {
            EventKind::Meta { kind, data } => Some(MetaMessage::parse(*kind, data)),
            _ => None,
        }
    }

    pub(crate) fn is_end_of_track(&self) -> bool {
        matches!(self.kind, EventKind::Meta { kind: 0x2F, .. })
    }
}

/// Represents the different kinds of SMF events and their raw bytes.
///
/// It notably does *not* include the timing of the event; the `Event` struct is responsible
/// for this.
#[derive(Clone, PartialEq, Eq, Debug, Hash)]
pub enum EventKind {
    /// A message with a known length: channel messages (`0x80 ..= 0xEF`), system common
    /// messages (`0xF1 ..= 0xF6`) and system realtime messages (`0xF8 ..= 0xFE`).
    ///
    /// Only the first `data_len(status)` bytes of `data` are meaningful, the rest are zero.
    Midi { status: u8, data: [u8; 2] },
    /// A System Exclusive message (`0xF0`), carrying arbitrary data.
    ///
    /// The data bytes do not include the implicit `0xF0` prefix, but do include the trailing
    /// `0xF7` byte if the file has one.
    SysEx(Vec<u8>),
    /// An escape sequence (`0xF7`), intended to send arbitrary data to the MIDI synthesizer.
    Escape(Vec<u8>),
    /// A meta event (`0xFF`), giving extra information for correct playback, like tempo, song
    /// name, lyrics, etc...
    ///
    /// The payload is kept raw; see [`MetaMessage`](enum.MetaMessage.html) for a decoded view.
    Meta { kind: u8, data: Vec<u8> },
}
impl EventKind {
    /// Build a fixed-length message, keeping only the data bytes its status uses.
    ///
    /// Returns `None` if `status` is not a status byte or needs a variable-length payload.
    pub fn midi(status: u8, data1: u8, data2: u8) -> Option<EventKind> {
        match status {
            0x00..=0x7F | 0xF0 | 0xF7 | 0xFF => None,
            _ => {
                let mut data = [data1, data2];
                for byte in &mut data[data_len(status)..] {
                    *byte = 0;
                }
                Some(EventKind::Midi { status, data })
            }
        }
    }

    /// A tempo change, in microseconds per quarter note.
    pub fn tempo(micros_per_quarter: u24) -> EventKind {
        EventKind::Meta {
            kind: 0x51,
            data: micros_per_quarter.as_int().to_be_bytes()[1..].to_vec(),
        }
    }

    /// The end-of-track marker, obligatory at the end of every track chunk.
    pub fn end_of_track() -> EventKind {
        EventKind::Meta {
            kind: 0x2F,
            data: Vec::new(),
        }
    }

    /// The status byte this event is stored with.
    pub fn status(&self) -> u8 {
        match self {
            EventKind::Midi { status, .. } => *status,
            EventKind::SysEx(_) => 0xF0,
            EventKind::Escape(_) => 0xF7,
            EventKind::Meta { .. } => 0xFF,
        }
    }

    /// The status byte followed by its data bytes, for fixed-length messages.
    ///
    /// Escapes are reduced to their bare `0xF7` status.
    pub fn short_message(&self) -> Option<([u8; 3], usize)> {
        match self {
            EventKind::Midi { status, data } => {
                let len = data_len(*status);
                Some(([*status, data[0], data[1]], 1 + len))
            }
            EventKind::Escape(_) => Some(([0xF7, 0, 0], 1)),
            _ => None,
        }
    }

    /// Whether a playback-oriented listing should skip this event.
    ///
    /// Meta events, System Exclusive packets and MTC quarter frames are skipped.
    pub(crate) fn is_ignorable(&self) -> bool {
        match self {
            EventKind::Midi { status, .. } => *status == 0xF1,
            EventKind::SysEx(_) | EventKind::Meta { .. } => true,
            EventKind::Escape(_) => false,
        }
    }

    /// Reads a status byte (or reuses the running status) and the event payload.
    fn read<'a>(raw: &mut &'a [u8], running_status: &mut Option<u8>) -> KindResult<EventKind> {
        //Read status
        let mut status = *raw.get(0).ok_or(err_invalid!("truncated"))?;
        if status < 0x80 {
            //Running status!
            status = running_status.ok_or(err_invalid!(
                "event missing status with no running status active"
            ))?;
        } else {
            //Consume the status byte, already known to be there
            *raw = &raw[1..];
        }
        let kind = match status {
            0x80..=0xEF | 0xF1..=0xF6 | 0xF8..=0xFE => {
                match status {
                    0x80..=0xEF => *running_status = Some(status),
                    0xF1..=0xF6 => *running_status = None,
                    //Realtime messages do not interrupt running status
                    _ => {}
                }
                let len = data_len(status);
                let bytes = raw.split_checked(len).ok_or(err_invalid!("truncated"))?;
                if cfg!(feature = "strict") {
                    ensure!(
                        bytes.iter().all(|byte| bit_range!(*byte, 7..8) == 0),
                        err_malformed!("data byte with top bit set")
                    );
                }
                let mut data = [0; 2];
                data[..len].copy_from_slice(bytes);
                EventKind::Midi { status, data }
            }
            0xFF => {
                *running_status = None;
                let kind = u8::read(raw)?;
                let data = read_varlen_slice(raw)?;
                EventKind::Meta {
                    kind,
                    data: data.to_vec(),
                }
            }
            0xF0 => {
                *running_status = None;
                EventKind::SysEx(read_varlen_slice(raw)?.to_vec())
            }
            0xF7 => {
                *running_status = None;
                EventKind::Escape(read_varlen_slice(raw)?.to_vec())
            }
            0x00..=0x7F => bail!(err_invalid!("invalid running status")),
        };
        Ok(kind)
    }

    /// Writes a single event to the given output writer.
    ///
    /// `running_status` keeps track of the last MIDI status, in order to make proper use of
    /// running status. It should be shared between consecutive calls, and should initially be set
    /// to `None`.
    fn write<W: io::Write>(&self, running_status: &mut Option<u8>, out: &mut W) -> io::Result<()> {
        //Running Status rules:
        // - Channel messages (0x80 ..= 0xEF) alter and use running status
        // - System common messages (0xF1 ..= 0xF6) cancel it
        // - System realtime messages (0xF8 ..= 0xFE) leave it untouched
        // - System Exclusive, escapes and meta events cancel it
        match self {
            EventKind::Midi { status, data } => {
                let status = *status;
                match status {
                    0x80..=0xEF => {
                        if Some(status) != *running_status {
                            out.write_all(&[status])?;
                            *running_status = Some(status);
                        }
                    }
                    0xF1..=0xF6 => {
                        out.write_all(&[status])?;
                        *running_status = None;
                    }
                    _ => out.write_all(&[status])?,
                }
                out.write_all(&data[..data_len(status)])?;
            }
            EventKind::SysEx(data) => {
                *running_status = None;
                out.write_all(&[0xF0])?;
                write_varlen_slice(data, out)?;
            }
            EventKind::Escape(data) => {
                *running_status = None;
                out.write_all(&[0xF7])?;
                write_varlen_slice(data, out)?;
            }
            EventKind::Meta { kind, data } => {
                *running_status = None;
                out.write_all(&[0xFF, *kind])?;
                write_varlen_slice(data, out)?;
            }
        }
        Ok(())
    }
}

/// Amount of data bytes following a status byte, for fixed-length messages.
#[inline]
pub(crate) fn data_len(status: u8) -> usize {
    match status {
        0x80..=0xBF | 0xE0..=0xEF | 0xF2 => 2,
        0xC0..=0xDF | 0xF1 | 0xF3 => 1,
        _ => 0,
    }
}

/// Decode one `(delta time, event)` pair from a track byte stream.
///
/// `running_status` carries the active running status from one call to the next and should be
/// `None` at the start of every track.
/// In case of failure the slice might be left in the middle of an event.
pub fn decode_event(
    raw: &mut &[u8],
    running_status: &mut Option<u8>,
) -> StdResult<(u32, EventKind), ErrorKind> {
    let delta = u28::read_u7(raw)?;
    let kind = EventKind::read(raw, running_status)?;
    Ok((delta.as_int(), kind))
}

/// Encode one `(delta time, event)` pair, omitting the status byte of channel messages that share
/// the status in `running_status`.
///
/// Reset `running_status` to `None` before a call to force the status byte to be written.
pub fn encode_event<W: io::Write>(
    delta: u32,
    kind: &EventKind,
    running_status: &mut Option<u8>,
    out: &mut W,
) -> io::Result<()> {
    let delta = u28::try_from(delta).ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "delta time exceeds 28 bits")
    })?;
    delta.write_varlen(out)?;
    kind.write(running_status, out)
}

/// A fixed-length message to be inserted into a new track, with loosely-typed fields as they
/// arrive from a caller.
///
/// `time` is in pulses or in seconds depending on the domain it is inserted with.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct EventSpec {
    pub time: f64,
    pub status: i64,
    pub data1: i64,
    pub data2: i64,
}
impl EventSpec {
    pub fn new(time: f64, status: i64, data1: i64, data2: i64) -> EventSpec {
        EventSpec {
            time,
            status,
            data1,
            data2,
        }
    }

    /// Check the byte fields and build the event they describe.
    pub(crate) fn to_kind(&self, index: usize) -> StdResult<EventKind, ValidationError> {
        let byte = |value: i64| {
            u8::try_from(value).map_err(|_| ValidationError::ByteOutOfRange { index, value })
        };
        let (status, data1, data2) = (byte(self.status)?, byte(self.data1)?, byte(self.data2)?);
        ensure!(
            status >= 0x80,
            ValidationError::NotAStatusByte {
                index,
                value: status
            }
        );
        let kind = EventKind::midi(status, data1, data2).ok_or(
            ValidationError::VariableLengthStatus {
                index,
                value: status,
            },
        )?;
        for &value in [data1, data2].iter().take(data_len(status)) {
            ensure!(value < 0x80, ValidationError::DataByteNotU7 { index, value });
        }
        Ok(kind)
    }
}

/// A "meta message", as defined by the SMF spec.
/// These events carry metadata about the track, such as tempo, time signature, copyright, etc...
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum MetaMessage<'a> {
    /// For `Format::Sequential` MIDI file types, `TrackNumber` can be empty, and defaults to
    /// the track index.
    TrackNumber(Option<u16>),
    /// Arbitrary text associated to an instant.
    Text(&'a [u8]),
    /// A copyright notice.
    Copyright(&'a [u8]),
    /// Information about the name of the track.
    TrackName(&'a [u8]),
    /// Information about the name of the current instrument.
    InstrumentName(&'a [u8]),
    /// Arbitrary lyric information associated to an instant.
    Lyric(&'a [u8]),
    /// Arbitrary marker text associated to an instant.
    Marker(&'a [u8]),
    /// Arbitrary cue point text associated to an instant.
    CuePoint(&'a [u8]),
    /// Information about the name of the current program.
    ProgramName(&'a [u8]),
    /// Name of the device that this file was intended to be played with.
    DeviceName(&'a [u8]),
    /// Number of the MIDI channel that this file was intended to be played with.
    MidiChannel(u8),
    /// Number of the MIDI port that this file was intended to be played with.
    MidiPort(u8),
    /// Obligatory at track end.
    EndOfTrack,
    /// Amount of microseconds per beat (quarter note).
    Tempo(u24),
    /// Offset for the starting point of a MIDI track from the start of a sequence, in SMPTE time.
    SmpteOffset(SmpteTime),
    /// In order of the MIDI specification, numerator, denominator (as a power of two), MIDI
    /// clocks per click, 32nd notes per quarter
    TimeSignature(u8, u8, u8, u8),
    /// As in the MIDI specification, negative numbers indicate number of flats and positive
    /// numbers indicate number of sharps.
    /// `false` indicates a major scale, `true` indicates a minor scale.
    KeySignature(i8, bool),
    /// Arbitrary data intended for the sequencer.
    SequencerSpecific(&'a [u8]),
    /// An unknown or malformed meta-message.
    ///
    /// The first `u8` is the raw meta-message identifier byte.
    /// The slice is the actual payload of the meta-message.
    Unknown(u8, &'a [u8]),
}
impl<'a> MetaMessage<'a> {
    /// Decode a meta event payload given its type byte.
    ///
    /// Payloads that are too short for their type decode as `Unknown`.
    pub fn parse(type_byte: u8, data: &'a [u8]) -> MetaMessage<'a> {
        let unknown = MetaMessage::Unknown(type_byte, data);
        match (type_byte, data) {
            (0x00, [hi, lo, ..]) => MetaMessage::TrackNumber(Some(u16::from_be_bytes([*hi, *lo]))),
            (0x00, _) => MetaMessage::TrackNumber(None),
            (0x01, _) => MetaMessage::Text(data),
            (0x02, _) => MetaMessage::Copyright(data),
            (0x03, _) => MetaMessage::TrackName(data),
            (0x04, _) => MetaMessage::InstrumentName(data),
            (0x05, _) => MetaMessage::Lyric(data),
            (0x06, _) => MetaMessage::Marker(data),
            (0x07, _) => MetaMessage::CuePoint(data),
            (0x08, _) => MetaMessage::ProgramName(data),
            (0x09, _) => MetaMessage::DeviceName(data),
            (0x20, [chan, ..]) => MetaMessage::MidiChannel(chan & 0x0F),
            (0x21, [port, ..]) => MetaMessage::MidiPort(port & 0x7F),
            (0x2F, _) => MetaMessage::EndOfTrack,
            (0x51, [a, b, c, ..]) => {
                MetaMessage::Tempo(u24::new(u32::from_be_bytes([0, *a, *b, *c])))
            }
            (0x54, _) => {
                let mut raw = data;
                SmpteTime::read(&mut raw)
                    .map(MetaMessage::SmpteOffset)
                    .unwrap_or(unknown)
            }
            (0x58, [num, den, clocks, notes, ..]) => {
                MetaMessage::TimeSignature(*num, *den, *clocks, *notes)
            }
            (0x59, [sharps, minor, ..]) => MetaMessage::KeySignature(*sharps as i8, *minor != 0),
            (0x7F, _) => MetaMessage::SequencerSpecific(data),
            _ => unknown,
        }
    }
}
