//! Simple building-block data that can be read in one go.
//! All primitives have a known, fixed size, except for variable-length quantities.
//! Also, primitives advance the read pointer when read.

use crate::prelude::*;

pub(crate) trait SplitChecked: Sized {
    fn split_checked(&mut self, at: usize) -> Option<Self>;
}
impl<'a> SplitChecked for &'a [u8] {
    #[inline]
    fn split_checked(&mut self, at: usize) -> Option<&'a [u8]> {
        if at > self.len() {
            None
        } else {
            let (extracted, remainder) = self.split_at(at);
            *self = remainder;
            Some(extracted)
        }
    }
}

/// Implemented on integer types for reading as big-endian.
pub(crate) trait IntRead: Sized {
    /// Reads a big-endian integer.
    fn read(data: &mut &[u8]) -> KindResult<Self>;
}
/// Reads the int from u7 bytes, that is, the top bit in all bytes is a continuation flag.
pub(crate) trait IntReadBottom7: Sized {
    /// Read an int from bytes, but only using the bottom 7 bits of each byte.
    fn read_u7(data: &mut &[u8]) -> KindResult<Self>;
}

/// Implement simple big endian integer reads.
macro_rules! impl_read_int {
    {$( $int:ty ),*} => {
        $(
            impl IntRead for $int {
                #[inline]
                fn read(raw: &mut &[u8]) -> KindResult<$int> {
                    let bytes = raw.split_checked(mem::size_of::<$int>())
                        .ok_or(err_invalid!("truncated"))?;
                    Ok(bytes.iter().fold(0, |acc, byte| {
                        acc.checked_shl(8).unwrap_or(0) | *byte as $int
                    }))
                }
            }
        )*
    }
}
impl_read_int! {u8,u16,u32}

macro_rules! restricted_int {
    {$(#[$attr:meta])* $name:ident : $inner:tt => $bits:expr} => {
        $(#[$attr])*
        #[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Hash, Default)]
        #[repr(transparent)]
        #[allow(non_camel_case_types)]
        pub struct $name($inner);
        impl From<$inner> for $name {
            /// Lossy conversion, loses top bits.
            #[inline]
            fn from(raw: $inner) -> $name {
                $name::new(raw)
            }
        }
        impl From<$name> for $inner {
            #[inline]
            fn from(restricted: $name) -> $inner {restricted.0}
        }
        impl fmt::Display for $name {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
        impl $name {
            const MASK: $inner = (1 << $bits) - 1;

            /// The maximum value that this restricted integer can hold.
            #[inline]
            pub const fn max_value() -> $name {
                $name (Self::MASK)
            }

            /// Creates a restricted int from its non-restricted counterpart by masking off the
            /// extra bits.
            #[inline]
            pub const fn new(raw: $inner) -> $name {
                $name (raw & Self::MASK)
            }

            /// Returns `Some` if the raw integer is within range of the restricted integer, and
            /// `None` otherwise.
            #[inline]
            pub fn try_from(raw: $inner) -> Option<$name> {
                if raw <= Self::MASK {
                    Some($name(raw))
                }else{
                    None
                }
            }

            /// Get the inner integer out of the wrapper.
            /// The inner integer is guaranteed to be in range of the restricted wrapper.
            #[inline]
            pub fn as_int(self) -> $inner {
                self.0
            }
        }
        impl PartialEq<$inner> for $name {
            fn eq(&self, rhs: &$inner) -> bool {
                self.as_int() == *rhs
            }
        }
    };
}
restricted_int! {
    /// A 15-bit integer type.
    ///
    /// Wraps the `u16` type and ensures that the top bit is always zero.
    u15: u16 => 15
}
restricted_int! {
    /// A 24-bit integer type.
    ///
    /// Wraps the `u32` type and ensures that the top 8 bits are always zero.
    u24: u32 => 24
}
restricted_int! {
    /// Referred to in the MIDI spec as "variable length int".
    u28: u32 => 28
}

impl IntReadBottom7 for u28 {
    fn read_u7(raw: &mut &[u8]) -> KindResult<u28> {
        let mut int: u32 = 0;
        for _ in 0..4 {
            let byte = match raw.split_checked(1) {
                Some(slice) => slice[0],
                None => bail!(err_invalid!("truncated")),
            };
            int <<= 7;
            int |= bit_range!(byte, 0..7) as u32;
            if bit_range!(byte, 7..8) == 0 {
                //At most 4 reads of 7 bits each, so there are at most 28 bits in this int
                return Ok(u28::from(int));
            }
        }
        Err(err_invalid!("varlen integer larger than 4 bytes"))
    }
}

impl u28 {
    /// Encode as the minimal amount of 7-bit groups, most significant first.
    pub(crate) fn encode_varlen(&self) -> ([u8; 4], usize) {
        let int = self.as_int();
        let mut len = 1;
        while len < 4 && int >> (7 * len) != 0 {
            len += 1;
        }
        let mut bytes = [0; 4];
        for (i, byte) in bytes[..len].iter_mut().enumerate() {
            let shift = 7 * (len - 1 - i);
            *byte = ((int >> shift) & 0x7F) as u8;
            if i + 1 < len {
                *byte |= 0x80;
            }
        }
        (bytes, len)
    }

    pub(crate) fn write_varlen<W: io::Write>(&self, out: &mut W) -> io::Result<()> {
        let (bytes, len) = self.encode_varlen();
        out.write_all(&bytes[..len])
    }
}

/// Reads a slice represented in the input as a `u28` `len` followed by `len` bytes.
pub(crate) fn read_varlen_slice<'a>(raw: &mut &'a [u8]) -> KindResult<&'a [u8]> {
    let len = u28::read_u7(raw)?.as_int();
    raw.split_checked(len as usize)
        .ok_or(err_invalid!("truncated"))
}

/// Write a slice represented as a varlen `u28` as its length and then the raw bytes.
pub(crate) fn write_varlen_slice<W: io::Write>(slice: &[u8], out: &mut W) -> io::Result<()> {
    let len = u32::try_from(slice.len())
        .ok()
        .and_then(u28::try_from)
        .ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "varlen slice exceeds 28 bits")
        })?;
    len.write_varlen(out)?;
    out.write_all(slice)
}

/// Read a single byte.
#[inline]
pub fn read_u8(raw: &mut &[u8]) -> StdResult<u8, ErrorKind> {
    u8::read(raw)
}

/// Read a big-endian `u16`.
#[inline]
pub fn read_u16(raw: &mut &[u8]) -> StdResult<u16, ErrorKind> {
    u16::read(raw)
}

/// Read a big-endian `u32`.
#[inline]
pub fn read_u32(raw: &mut &[u8]) -> StdResult<u32, ErrorKind> {
    u32::read(raw)
}

/// Read a MIDI variable-length quantity.
///
/// Fails if the input ends before the quantity does, or if the quantity is longer than 4 bytes.
#[inline]
pub fn read_varlen(raw: &mut &[u8]) -> StdResult<u32, ErrorKind> {
    u28::read_u7(raw).map(u28::as_int)
}

#[inline]
pub fn write_u8<W: io::Write>(int: u8, out: &mut W) -> io::Result<()> {
    out.write_all(&[int])
}

#[inline]
pub fn write_u16<W: io::Write>(int: u16, out: &mut W) -> io::Result<()> {
    out.write_all(&int.to_be_bytes())
}

#[inline]
pub fn write_u32<W: io::Write>(int: u32, out: &mut W) -> io::Result<()> {
    out.write_all(&int.to_be_bytes())
}

/// Write a MIDI variable-length quantity using as few bytes as possible.
///
/// Produces an `InvalidInput` error if the value does not fit in 28 bits.
pub fn write_varlen<W: io::Write>(int: u32, out: &mut W) -> io::Result<()> {
    u28::try_from(int)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "varlen exceeds 28 bits"))?
        .write_varlen(out)
}

/// The 8-byte framing in front of every chunk.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub struct ChunkHeader {
    /// Four ASCII characters identifying the chunk type, such as `MThd` or `MTrk`.
    pub tag: [u8; 4],
    /// Length of the chunk body, in bytes.
    pub len: u32,
}
impl ChunkHeader {
    pub const HEADER: [u8; 4] = *b"MThd";
    pub const TRACK: [u8; 4] = *b"MTrk";

    /// Fails with a "bad tag" error if the tag is not the expected one.
    pub fn expect(&self, tag: [u8; 4]) -> StdResult<(), ErrorKind> {
        ensure!(self.tag == tag, err_invalid!("bad tag"));
        Ok(())
    }

    /// The chunk name used to locate errors.
    pub(crate) fn name(&self) -> &'static str {
        match &self.tag {
            b"MThd" => "MThd",
            b"MTrk" => "MTrk",
            _ => "file",
        }
    }
}

/// Read the tag and length of a chunk, leaving `raw` at the start of the chunk body.
pub fn read_chunk_header(raw: &mut &[u8]) -> StdResult<ChunkHeader, ErrorKind> {
    let tag = raw.split_checked(4).ok_or(err_invalid!("truncated"))?;
    let len = u32::read(raw)?;
    let mut id = [0; 4];
    id.copy_from_slice(tag);
    Ok(ChunkHeader { tag: id, len })
}

pub fn write_chunk_header<W: io::Write>(header: &ChunkHeader, out: &mut W) -> io::Result<()> {
    out.write_all(&header.tag)?;
    write_u32(header.len, out)
}

/// The order in which tracks should be laid out when playing back this SMF file.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum Format {
    /// This file should have a single track only.
    ///
    /// If the `strict` feature is enabled, an error is raised if the format is
    /// `Format::SingleTrack` and there is more than one track.
    SingleTrack,
    /// This file has several tracks that should be played simultaneously.
    ///
    /// Usually the first track controls tempo and other song metadata.
    Parallel,
    /// This file has several tracks, each one a separate song.
    Sequential,
}
impl Format {
    pub(crate) fn read(raw: &mut &[u8]) -> KindResult<Format> {
        let format = u16::read(raw)?;
        Ok(match format {
            0 => Format::SingleTrack,
            1 => Format::Parallel,
            2 => Format::Sequential,
            _ => bail!(err_invalid!("invalid smf format")),
        })
    }

    /// The numeric code stored in the header chunk.
    pub fn as_int(self) -> u16 {
        match self {
            Format::SingleTrack => 0,
            Format::Parallel => 1,
            Format::Sequential => 2,
        }
    }

    pub(crate) fn description(self) -> &'static str {
        match self {
            Format::SingleTrack => "single track",
            Format::Parallel => "several simultaneous tracks",
            Format::Sequential => "several independent tracks",
        }
    }
}

/// The timing for an SMF file, also known as the division.
/// This can be in ticks/beat or ticks/second.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum Timing {
    /// Specifies ticks/beat as a 15-bit integer.
    ///
    /// The length of a beat is not standard, so in order to fully describe the length of a MIDI
    /// tick the tempo meta event should be present.
    Metrical(u15),
    /// Specifies ticks/second by dividing a second into frames and then into subframes.
    /// Therefore the length of of a tick is `1/fps/subframe`.
    Timecode(Fps, u8),
}
impl Timing {
    pub(crate) fn read(raw: &mut &[u8]) -> KindResult<Timing> {
        let raw = u16::read(raw)?;
        if bit_range!(raw, 15..16) != 0 {
            //Timecode
            let fps = (bit_range!(raw, 8..16) as u8 as i8).wrapping_neg();
            let subframe = bit_range!(raw, 0..8) as u8;
            ensure!(subframe != 0, err_invalid!("zero ticks per frame"));
            Ok(Timing::Timecode(
                Fps::from_int(fps as u8).ok_or(err_invalid!("invalid smpte fps"))?,
                subframe,
            ))
        } else {
            //Metrical
            ensure!(raw != 0, err_invalid!("zero ticks per beat"));
            Ok(Timing::Metrical(u15::from(raw)))
        }
    }

    pub(crate) fn encode(&self) -> [u8; 2] {
        match self {
            Timing::Metrical(ticksperbeat) => ticksperbeat.as_int().to_be_bytes(),
            Timing::Timecode(framespersec, ticksperframe) => {
                [(-(framespersec.as_int() as i8)) as u8, *ticksperframe]
            }
        }
    }

    /// Pulses per quarter note, for metrical timing.
    #[inline]
    pub fn ppqn(&self) -> Option<u16> {
        match self {
            Timing::Metrical(ppqn) => Some(ppqn.as_int()),
            Timing::Timecode(..) => None,
        }
    }

    /// How long the given amount of pulses lasts, in seconds, under the given tempo.
    ///
    /// Timecode divisions have a fixed pulse length, regardless of tempo.
    pub fn pulses_to_seconds(&self, pulses: u64, micros_per_quarter: u32) -> f64 {
        match self {
            Timing::Metrical(ppqn) => {
                pulses as f64 * micros_per_quarter as f64
                    / (1_000_000.0 * ppqn.as_int().max(1) as f64)
            }
            Timing::Timecode(fps, ticksperframe) => {
                pulses as f64 / (fps.as_f64() * (*ticksperframe).max(1) as f64)
            }
        }
    }

    /// Inverse of `pulses_to_seconds`, without rounding.
    pub fn seconds_to_pulses(&self, seconds: f64, micros_per_quarter: u32) -> f64 {
        match self {
            Timing::Metrical(ppqn) => {
                seconds * 1_000_000.0 * ppqn.as_int().max(1) as f64
                    / micros_per_quarter.max(1) as f64
            }
            Timing::Timecode(fps, ticksperframe) => {
                seconds * fps.as_f64() * (*ticksperframe).max(1) as f64
            }
        }
    }
}
impl Default for Timing {
    fn default() -> Timing {
        Timing::Metrical(u15::new(120))
    }
}

/// A timestamp encoding an SMPTE time of the day.
///
/// Enforces several guarantees:
///
/// - `hour` is inside [0, 23]
/// - `minute` is inside [0, 59]
/// - `second` is inside [0, 59]
/// - `frame` is inside [0, fps - 1]
/// - `subframe` is inside [0, 99]
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub struct SmpteTime {
    hour: u8,
    minute: u8,
    second: u8,
    frame: u8,
    subframe: u8,
    fps: Fps,
}
impl SmpteTime {
    /// Create a new SMPTE timestamp with the given information.
    pub fn new(
        hour: u8,
        minute: u8,
        second: u8,
        frame: u8,
        subframe: u8,
        fps: Fps,
    ) -> Option<SmpteTime> {
        if hour < 24 && minute < 60 && second < 60 && frame < fps.as_int() && subframe < 100 {
            Some(SmpteTime {
                hour,
                minute,
                second,
                frame,
                subframe,
                fps,
            })
        } else {
            None
        }
    }

    #[inline]
    pub fn hour(&self) -> u8 {
        self.hour
    }

    #[inline]
    pub fn minute(&self) -> u8 {
        self.minute
    }

    #[inline]
    pub fn second(&self) -> u8 {
        self.second
    }

    /// The meaning of this value depends on the value of `fps`.
    #[inline]
    pub fn frame(&self) -> u8 {
        self.frame
    }

    /// Hundredths of a frame.
    #[inline]
    pub fn subframe(&self) -> u8 {
        self.subframe
    }

    #[inline]
    pub fn fps(&self) -> Fps {
        self.fps
    }

    /// The whole timestamp as seconds since midnight.
    pub fn as_seconds(&self) -> f64 {
        (self.hour as f64 * 60.0 + self.minute as f64) * 60.0
            + self.second as f64
            + (self.frame as f64 + self.subframe as f64 / 100.0) / self.fps.as_f64()
    }

    pub(crate) fn read(raw: &mut &[u8]) -> KindResult<SmpteTime> {
        let data = raw.split_checked(5).ok_or(err_invalid!("truncated"))?;
        let hour_fps = data[0];
        let (hour, fps) = (bit_range!(hour_fps, 0..5), bit_range!(hour_fps, 5..7));
        let fps = Fps::from_code(fps);
        SmpteTime::new(hour, data[1], data[2], data[3], data[4], fps)
            .ok_or(err_invalid!("invalid smpte time"))
    }
}

/// One of the four FPS values available for SMPTE times, as defined by the MIDI standard.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum Fps {
    /// 24 frames per second.
    Fps24,
    /// 25 frames per second.
    Fps25,
    /// Actually `29.97 = 30 / 1.001` frames per second.
    Fps29,
    /// 30 frames per second.
    Fps30,
}
impl Fps {
    /// Conversion from the 2-bit fps code found in SMPTE offsets.
    fn from_code(code: u8) -> Fps {
        match code & 0b11 {
            0 => Fps::Fps24,
            1 => Fps::Fps25,
            2 => Fps::Fps29,
            _ => Fps::Fps30,
        }
    }

    /// Converts an integer representing the semantic fps to an `Fps` value (ie. `24` -> `Fps24`).
    #[inline]
    pub fn from_int(raw: u8) -> Option<Fps> {
        Some(match raw {
            24 => Fps::Fps24,
            25 => Fps::Fps25,
            29 => Fps::Fps29,
            30 => Fps::Fps30,
            _ => return None,
        })
    }

    /// Get the integral approximate fps out.
    #[inline]
    pub fn as_int(self) -> u8 {
        match self {
            Fps::Fps24 => 24,
            Fps::Fps25 => 25,
            Fps::Fps29 => 29,
            Fps::Fps30 => 30,
        }
    }

    /// Get the actual fps out.
    #[inline]
    pub fn as_f64(self) -> f64 {
        match self {
            Fps::Fps24 => 24.0,
            Fps::Fps25 => 25.0,
            Fps::Fps29 => 30.0 / 1.001,
            Fps::Fps30 => 30.0,
        }
    }
}
