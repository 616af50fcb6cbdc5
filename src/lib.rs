//! # Overview
//!
//! `smf_timeline` is a Standard Midi File (SMF) codec that keeps every event on two clocks at once:
//! metrical time (pulses, also known as ticks) and physical time (seconds since the start of the
//! file).
//!
//! Loading a file decodes every track chunk into a [`Track`](struct.Track.html), collects the
//! tempo and time signature meta events of all tracks into a [`TempoMap`](struct.TempoMap.html),
//! and finally stamps every event with its time in seconds:
//!
//! ```rust
//! use smf_timeline::{Domain, Smf, Time, TrackSelector};
//!
//! # fn main() -> smf_timeline::Result<()> {
//! let bytes = [
//!     b'M', b'T', b'h', b'd', 0, 0, 0, 6, 0, 1, 0, 1, 0, 96,
//!     b'M', b'T', b'r', b'k', 0, 0, 0, 15,
//!     0x00, 0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20,
//!     0x60, 0x90, 60, 100,
//!     0x00, 0xFF, 0x2F, 0x00,
//! ];
//! let smf = Smf::parse(&bytes)?;
//!
//! assert_eq!(smf.duration(Domain::Metrical), Time::Pulses(96));
//! assert_eq!(smf.duration(Domain::Physical), Time::Seconds(0.5));
//!
//! for msg in smf.events(TrackSelector::All, Domain::Physical, 0.0, -1.0)? {
//!     println!("{}", msg);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Querying by time
//!
//! All queries take a [`Domain`](enum.Domain.html): `Domain::Metrical` interprets times as pulses,
//! `Domain::Physical` interprets them as seconds.
//! [`Smf::events`](struct.Smf.html#method.events) yields the playable messages inside a time
//! window, either for one track or for all tracks merged in chronological order.
//! [`Smf::tempo_at`](struct.Smf.html#method.tempo_at) returns the tempo and time signature in
//! effect at a given instant.
//!
//! # Writing Standard Midi Files
//!
//! Documents can be built from scratch through
//! [`Smf::add_events`](struct.Smf.html#method.add_events) and written back with `Smf::save`,
//! `Smf::write` or `Smf::to_bytes`.
//! Channel messages are written using running status unless disabled through
//! [`WriteOptions`](struct.WriteOptions.html).
//!
//! # About features
//!
//! - The `parallel` feature (enabled by default)
//!
//!   Decodes track chunks on the `rayon` thread pool. Files with a single track are always
//!   decoded on the calling thread.
//!
//! - The `strict` feature
//!
//!   By default the decoder will plow through files that break the letter of the SMF standard but
//!   can still be read unambiguously, logging a warning through the `log` facade.
//!   With the `strict` feature these files are rejected with an `ErrorKind::Malformed` error.
//!   Truncated or undecodable files are always rejected.

macro_rules! bail {
    ($err:expr) => {{
        return Err($err.into());
    }};
}
macro_rules! ensure {
    ($cond:expr, $err:expr) => {{
        if !$cond {
            bail!($err)
        }
    }};
}

/// Extract the bits of an integer in `range`, shifted down to the bottom.
macro_rules! bit_range {
    ($val:expr, $range:expr) => {{
        let val = $val;
        let range: ::std::ops::Range<u32> = $range;
        //Zero, typed like `val`
        let zero = val & !val;
        (val >> range.start) & !(!zero << (range.end - range.start))
    }};
}

/// All of the errors this crate produces.
#[macro_use]
mod error;

mod prelude {
    pub(crate) use crate::{
        error::{Error, ErrorKind, FormatError, KindResult, Result, StdResult, ValidationError},
        primitive::{u15, u24, u28, IntRead, IntReadBottom7, SplitChecked},
    };
    pub(crate) use std::{convert::TryFrom, fmt, fs::File, io, mem, path::Path};
}

mod event;
mod primitive;
mod riff;
mod smf;
mod tempo;
mod timeline;
mod track;

pub use crate::{
    error::{Error, ErrorKind, FormatError, IoAction, Result, ValidationError},
    event::{Event, EventKind, EventSpec, MetaMessage},
    primitive::{Format, Fps, SmpteTime, Timing},
    smf::{is_smf, InfoKey, Smf, WriteOptions},
    tempo::{Tempo, TempoMap},
    timeline::{Domain, Events, Time, TimedMessage, TrackSelector},
    track::Track,
};

/// Low-level building blocks of the SMF byte stream: big-endian integers, variable-length
/// quantities and chunk headers.
pub mod codec {
    pub use crate::event::{decode_event, encode_event};
    pub use crate::primitive::{
        read_chunk_header, read_u16, read_u32, read_u8, read_varlen, write_chunk_header,
        write_u16, write_u32, write_u8, write_varlen, ChunkHeader,
    };
}

/// Exotically-sized integers used by the MIDI standard.
pub mod num {
    pub use crate::primitive::{u15, u24, u28};
}
