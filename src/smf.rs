//! Specific to the SMF packaging of MIDI streams.

use crate::{
    error::IoAction,
    event::{decode_event, encode_event, Event, EventKind, EventSpec},
    prelude::*,
    primitive::{read_chunk_header, ChunkHeader, Format, Timing},
    riff,
    tempo::{Tempo, TempoMap},
    timeline::{whole_pulses, Domain, Events, MergeCursor, Time, TrackSelector},
    track::Track,
};
use std::str::FromStr;

/// Serialization settings.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub struct WriteOptions {
    /// Omit the status byte of channel messages that repeat the previous status.
    ///
    /// Enabled by default.
    pub running_status: bool,
}
impl Default for WriteOptions {
    fn default() -> WriteOptions {
        WriteOptions {
            running_status: true,
        }
    }
}

/// A single header field, as queried by [`Smf::info`](struct.Smf.html#method.info).
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum InfoKey {
    /// Pulses per quarter note, or 0 for timecode files.
    Ppqn,
    /// Frames per second, or 0 for metrical files.
    Fps,
    /// Amount of tracks.
    Tracks,
    /// Ticks per frame, or 0 for metrical files.
    Resolution,
}
impl FromStr for InfoKey {
    type Err = ValidationError;
    fn from_str(tag: &str) -> StdResult<InfoKey, ValidationError> {
        match tag {
            "ppqn" => Ok(InfoKey::Ppqn),
            "fps" => Ok(InfoKey::Fps),
            "tracks" => Ok(InfoKey::Tracks),
            "resolution" => Ok(InfoKey::Resolution),
            _ => Err(ValidationError::UnknownInfoKey(tag.to_string())),
        }
    }
}

/// A Standard Midi File held in memory, with every event placed on both time domains.
///
/// The tempo map is derived from the tempo and time signature meta events of all tracks, and is
/// rebuilt, along with the time in seconds of every event, whenever the document changes.
///
/// Besides the stateless [`events`](#method.events) query, the document carries a cursor over
/// all tracks merged, driven by [`next_event`](#method.next_event) and the `seek_*` methods.
/// Every mutation of the document rewinds this cursor.
#[derive(Clone, Debug)]
pub struct Smf {
    format: Format,
    tracks: Vec<Track>,
    tempo_map: TempoMap,
    cursor: MergeCursor,
}
impl Default for Smf {
    fn default() -> Smf {
        Smf::new()
    }
}
impl Smf {
    /// Create an empty single-track document with the default division.
    pub fn new() -> Smf {
        Smf::with_timing(Timing::default())
    }

    /// Create an empty single-track document with the given division.
    pub fn with_timing(timing: Timing) -> Smf {
        Smf {
            format: Format::SingleTrack,
            tracks: Vec::new(),
            tempo_map: TempoMap::new(timing),
            cursor: MergeCursor::default(),
        }
    }

    /// Parse a `.mid` file, or an `.rmi` file wrapping one, held in memory.
    pub fn parse(raw: &[u8]) -> Result<Smf> {
        let raw = if riff::is_riff(raw) {
            riff::unwrap(raw)?
        } else {
            raw
        };
        let mut chunks = ChunkIter::new(raw);

        //Header chunk
        let (header, offset, body) = chunks.next_chunk()?.ok_or_else(|| {
            FormatError::new(err_invalid!("truncated"), 0, "file")
        })?;
        header
            .expect(ChunkHeader::HEADER)
            .map_err(|kind| FormatError::new(kind, 0, "MThd"))?;
        let (format, track_count, timing) = read_header(body, offset)?;

        //Track chunks
        let mut track_chunks = Vec::with_capacity(track_count as usize);
        while track_chunks.len() < track_count as usize {
            let (header, offset, body) = chunks.next_chunk()?.ok_or_else(|| {
                FormatError::new(err_invalid!("truncated"), raw.len(), "file")
            })?;
            log::trace!(
                "{} chunk of {} bytes at {}",
                String::from_utf8_lossy(&header.tag),
                header.len,
                offset - 8
            );
            if header.tag == ChunkHeader::TRACK {
                track_chunks.push((offset, body));
            } else if cfg!(feature = "strict") {
                bail!(FormatError::new(err_invalid!("bad tag"), offset - 8, "file"));
            } else {
                log::warn!(
                    "skipping unknown {:?} chunk at byte {}",
                    String::from_utf8_lossy(&header.tag),
                    offset - 8
                );
            }
        }
        if !chunks.raw.is_empty() {
            let extra_tracks = chunks.raw.starts_with(&ChunkHeader::TRACK);
            if cfg!(feature = "strict") {
                bail!(FormatError::new(
                    if extra_tracks {
                        err_malformed!("file has a different amount of tracks than declared")
                    } else {
                        err_malformed!("trailing bytes after the last track")
                    },
                    chunks.offset,
                    "file"
                ));
            }
            log::warn!(
                "ignoring {} trailing bytes after the last declared track",
                chunks.raw.len()
            );
        }
        if cfg!(feature = "strict") {
            ensure!(
                format != Format::SingleTrack || track_chunks.len() <= 1,
                FormatError::new(
                    err_malformed!("singletrack format file has multiple tracks"),
                    0,
                    "MThd"
                )
            );
        }

        let tracks = decode_tracks(&track_chunks)?;
        let mut smf = Smf {
            format,
            tracks: tracks.into_iter().map(Track::from_events).collect(),
            tempo_map: TempoMap::new(timing),
            cursor: MergeCursor::default(),
        };
        smf.retime();
        log::debug!(
            "loaded {} with {} events",
            smf,
            smf.tracks.iter().map(Track::len).sum::<usize>()
        );
        Ok(smf)
    }

    /// Read and parse a whole file out of a reader.
    pub fn read<R: io::Read>(mut reader: R) -> Result<Smf> {
        let mut raw = Vec::new();
        reader
            .read_to_end(&mut raw)
            .map_err(|err| Error::io("reader", IoAction::Read, err))?;
        Smf::parse(&raw)
    }

    /// Read and parse the file at the given path.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Smf> {
        let path = path.as_ref();
        let raw = std::fs::read(path).map_err(|err| Error::io(path.display(), IoAction::Read, err))?;
        Smf::parse(&raw)
    }

    /// Encode the file into a fresh buffer, with the default options.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.encode(WriteOptions::default())
    }

    /// Encode and write the file into the given writer, with the default options.
    pub fn write<W: io::Write>(&self, out: &mut W) -> Result<()> {
        self.write_with(out, WriteOptions::default())
    }

    /// Encode and write the file into the given writer.
    ///
    /// The file is fully encoded in memory before anything is written, so encoding failures
    /// never leave a partial file behind.
    pub fn write_with<W: io::Write>(&self, out: &mut W, options: WriteOptions) -> Result<()> {
        let raw = self.encode(options)?;
        out.write_all(&raw)
            .and_then(|()| out.flush())
            .map_err(|err| Error::io("writer", IoAction::Write, err))
    }

    /// Encode the file and write it to the given path, replacing any existing file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fn save_impl(smf: &Smf, path: &Path) -> Result<()> {
            let raw = smf.encode(WriteOptions::default())?;
            let fail = |err| Error::io(path.display(), IoAction::Write, err);
            let mut file = File::create(path).map_err(fail)?;
            io::Write::write_all(&mut file, &raw).map_err(fail)?;
            file.sync_all().map_err(fail)
        }
        save_impl(self, path.as_ref())
    }

    fn encode(&self, options: WriteOptions) -> Result<Vec<u8>> {
        let track_count = u16::try_from(self.tracks.len())
            .map_err(|_| ValidationError::TooManyTracks(self.tracks.len()))?;
        let track_chunks = encode_tracks(&self.tracks, options)?;
        let mut out =
            Vec::with_capacity(14 + track_chunks.iter().map(Vec::len).sum::<usize>());
        out.extend_from_slice(&ChunkHeader::HEADER);
        out.extend_from_slice(&6u32.to_be_bytes());
        out.extend_from_slice(&self.format.as_int().to_be_bytes());
        out.extend_from_slice(&track_count.to_be_bytes());
        out.extend_from_slice(&self.timing().encode());
        for chunk in track_chunks {
            out.extend_from_slice(&chunk);
        }
        log::debug!("encoded {} into {} bytes", self, out.len());
        Ok(out)
    }

    #[inline]
    pub fn format(&self) -> Format {
        self.format
    }

    /// Change the format stored in the header.
    ///
    /// Appending a second track to a single-track document switches it to
    /// `Format::Parallel` by itself.
    #[inline]
    pub fn set_format(&mut self, format: Format) {
        self.format = format;
    }

    #[inline]
    pub fn timing(&self) -> Timing {
        self.tempo_map.timing()
    }

    /// Change the division, re-deriving the time in seconds of every event.
    pub fn set_timing(&mut self, timing: Timing) {
        self.tempo_map = TempoMap::new(timing);
        self.retime();
    }

    #[inline]
    pub fn tempo_map(&self) -> &TempoMap {
        &self.tempo_map
    }

    #[inline]
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// The track with the given 1-based number.
    pub fn track(&self, number: usize) -> Option<&Track> {
        self.tracks.get(number.checked_sub(1)?)
    }

    /// Mutable access to the track with the given 1-based number.
    ///
    /// Events appended this way are not placed in physical time until
    /// [`retime`](#method.retime) is called; [`edit_track`](#method.edit_track) does so
    /// automatically.
    pub fn track_mut(&mut self, number: usize) -> Option<&mut Track> {
        self.tracks.get_mut(number.checked_sub(1)?)
    }

    /// Modify a track in place, then rebuild the tempo map and event times.
    pub fn edit_track<T>(&mut self, number: usize, edit: impl FnOnce(&mut Track) -> T) -> Result<T> {
        let track = self
            .track_mut(number)
            .ok_or(Error::TrackNotFound(number))?;
        let out = edit(track);
        self.retime();
        Ok(out)
    }

    /// Append a track, returning its number.
    pub fn push_track(&mut self, mut track: Track) -> Result<usize> {
        ensure!(
            self.tracks.len() < u16::max_value() as usize,
            ValidationError::TooManyTracks(self.tracks.len() + 1)
        );
        if self.format == Format::SingleTrack && !self.tracks.is_empty() {
            log::debug!("second track added, switching to {}", Format::Parallel.description());
            self.format = Format::Parallel;
        }
        let number = self.tracks.len() + 1;
        track.set_number(number);
        self.tracks.push(track);
        self.retime();
        Ok(number)
    }

    /// Create a new track out of loosely-typed message specs and append it.
    ///
    /// Times are interpreted in the given domain.
    /// Every spec is validated before the track is attached: on failure the document is left
    /// untouched.
    pub fn add_events(&mut self, domain: Domain, specs: &[EventSpec]) -> Result<usize> {
        let mut track = Track::new();
        for (index, spec) in specs.iter().enumerate() {
            let kind = spec.to_kind(index)?;
            match domain {
                Domain::Metrical => {
                    track.append_event_at_pulses(kind, whole_pulses(spec.time)?);
                }
                Domain::Physical => {
                    track.append_event_at_seconds(kind, spec.time, &self.tempo_map)?;
                }
            }
        }
        self.push_track(track)
    }

    /// Rebuild the tempo map out of the tracks and re-derive the time in seconds of every
    /// event. Also rewinds the merged cursor.
    pub fn retime(&mut self) {
        self.tempo_map.rebuild(&self.tracks);
        for (idx, track) in self.tracks.iter_mut().enumerate() {
            if track.number() != idx + 1 {
                track.set_number(idx + 1);
            }
            track.stamp_seconds(&self.tempo_map);
        }
        self.rewind();
    }

    /// The time of the latest event, in the given domain.
    pub fn duration(&self, domain: Domain) -> Time {
        match domain {
            Domain::Metrical => Time::Pulses(
                self.tracks
                    .iter()
                    .map(Track::length_pulses)
                    .max()
                    .unwrap_or(0),
            ),
            Domain::Physical => Time::Seconds(
                self.tracks
                    .iter()
                    .map(Track::length_seconds)
                    .fold(0.0, f64::max),
            ),
        }
    }

    /// The tempo entry governing the given instant.
    ///
    /// Returns `None` for negative or NaN times.
    pub fn tempo_at(&self, domain: Domain, time: f64) -> Option<Tempo> {
        match domain {
            Domain::Metrical => {
                if !(time >= 0.0) {
                    return None;
                }
                Some(*self.tempo_map.tempo_at_pulses(time as u64))
            }
            Domain::Physical => self.tempo_map.tempo_at_seconds(time).copied(),
        }
    }

    /// The playable messages from `start` to `end` inclusive, in ascending time order.
    ///
    /// A non-positive `start` starts from the beginning, a negative `end` runs until the last
    /// event.
    /// Fails if the selector names a track that does not exist.
    pub fn events(
        &self,
        selector: TrackSelector,
        domain: Domain,
        start: f64,
        end: f64,
    ) -> Result<Events> {
        let selected = match selector {
            TrackSelector::All => None,
            TrackSelector::Track(number) => {
                Some(self.track(number).ok_or(Error::TrackNotFound(number))?)
            }
        };
        let start = domain.seek_target(start, &self.tempo_map);
        Ok(Events::new(&self.tracks, selected, domain, start, end))
    }

    /// A single header field.
    pub fn info(&self, key: InfoKey) -> u32 {
        match (key, self.timing()) {
            (InfoKey::Tracks, _) => self.tracks.len() as u32,
            (InfoKey::Ppqn, Timing::Metrical(ppqn)) => ppqn.as_int() as u32,
            (InfoKey::Fps, Timing::Timecode(fps, _)) => fps.as_int() as u32,
            (InfoKey::Resolution, Timing::Timecode(_, subframe)) => subframe as u32,
            _ => 0,
        }
    }

    /// A one-line human-readable summary of the header.
    pub fn description(&self) -> String {
        self.to_string()
    }

    /// Move the merged cursor back to the first event.
    pub fn rewind(&mut self) {
        self.cursor = MergeCursor::new(&self.tracks, 0);
    }

    /// Move the merged cursor to the first event at or after the given pulse.
    pub fn seek_to_pulses(&mut self, pulses: u64) {
        self.cursor = MergeCursor::new(&self.tracks, pulses);
    }

    /// Move the merged cursor to the first event at or after the given time in seconds.
    pub fn seek_to_seconds(&mut self, seconds: f64) -> Result<()> {
        ensure!(
            seconds.is_finite() && seconds >= 0.0,
            ValidationError::InvalidTime { time: seconds }
        );
        let pulses = self.tempo_map.ceil_pulses_for_seconds(seconds);
        self.seek_to_pulses(pulses);
        Ok(())
    }

    /// The next event of the merged view, meta events included, advancing the cursor.
    pub fn next_event(&mut self) -> Option<&Event> {
        self.cursor.next(&self.tracks)
    }

    /// The next event of the merged view, without advancing the cursor.
    pub fn peek_next_event(&self) -> Option<&Event> {
        self.cursor.peek(&self.tracks)
    }
}
impl PartialEq for Smf {
    fn eq(&self, other: &Smf) -> bool {
        self.format == other.format
            && self.timing() == other.timing()
            && self.tracks == other.tracks
    }
}
impl fmt::Display for Smf {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "format: {} ({}); number of tracks: {}; division: ",
            self.format.as_int(),
            self.format.description(),
            self.tracks.len()
        )?;
        match self.timing() {
            Timing::Metrical(ppqn) => write!(f, "{} PPQN", ppqn),
            Timing::Timecode(fps, subframe) => {
                write!(f, "{} FPS, {} resolution", fps.as_int(), subframe)
            }
        }
    }
}

/// Whether the buffer starts with an SMF header, bare or wrapped in an RMID file.
pub fn is_smf(raw: &[u8]) -> bool {
    let mut raw = if riff::is_riff(raw) {
        match riff::unwrap(raw) {
            Ok(raw) => raw,
            Err(_) => return false,
        }
    } else {
        raw
    };
    match read_chunk_header(&mut raw) {
        Ok(header) => header.tag == ChunkHeader::HEADER && header.len >= 6 && raw.len() >= 6,
        Err(_) => false,
    }
}

/// Read format, declared track count and division out of the header chunk body.
fn read_header(mut raw: &[u8], offset: usize) -> StdResult<(Format, u16, Timing), FormatError> {
    let fail = |kind| FormatError::new(kind, offset, "MThd");
    if raw.len() > 6 {
        if cfg!(feature = "strict") {
            bail!(fail(err_malformed!("header chunk longer than 6 bytes")));
        }
        log::warn!("ignoring {} extra header bytes", raw.len() - 6);
    }
    let format = Format::read(&mut raw).map_err(fail)?;
    let track_count = u16::read(&mut raw).map_err(fail)?;
    let timing = Timing::read(&mut raw).map_err(fail)?;
    log::trace!(
        "header: format {}, {} tracks, {:?}",
        format.as_int(),
        track_count,
        timing
    );
    Ok((format, track_count, timing))
}

/// Splits the input into chunks, keeping track of absolute offsets.
struct ChunkIter<'a> {
    /// Starts at the current offset, ends at EOF.
    raw: &'a [u8],
    offset: usize,
}
impl<'a> ChunkIter<'a> {
    fn new(raw: &'a [u8]) -> ChunkIter<'a> {
        ChunkIter { raw, offset: 0 }
    }

    /// Read the next chunk header and body, with the absolute offset of the body.
    /// Returns `None` exactly at EOF.
    fn next_chunk(&mut self) -> StdResult<Option<(ChunkHeader, usize, &'a [u8])>, FormatError> {
        if self.raw.is_empty() {
            return Ok(None);
        }
        let start = self.offset;
        let header =
            read_chunk_header(&mut self.raw).map_err(|kind| FormatError::new(kind, start, "file"))?;
        let body = self
            .raw
            .split_checked(header.len as usize)
            .ok_or_else(|| FormatError::new(err_invalid!("truncated"), start, header.name()))?;
        self.offset += 8 + body.len();
        Ok(Some((header, start + 8, body)))
    }
}

/// Decode every track chunk, on several threads if enabled.
fn decode_tracks(chunks: &[(usize, &[u8])]) -> StdResult<Vec<Vec<Event>>, FormatError> {
    #[cfg(feature = "parallel")]
    {
        if chunks.len() > 1 {
            use rayon::prelude::*;

            return chunks
                .par_iter()
                .map(|&(offset, body)| decode_track(offset, body))
                .collect();
        }
    }
    chunks
        .iter()
        .map(|&(offset, body)| decode_track(offset, body))
        .collect()
}

/// Decode a single track chunk body, converting delta times into absolute pulses.
///
/// Decoding stops at the end-of-track event, which is kept.
fn decode_track(offset: usize, body: &[u8]) -> StdResult<Vec<Event>, FormatError> {
    let mut raw = body;
    let mut running_status = None;
    let mut pulses = 0u64;
    let mut events = Vec::with_capacity(body.len() / 3);
    loop {
        let at = offset + (body.len() - raw.len());
        if raw.is_empty() {
            if cfg!(feature = "strict") {
                bail!(FormatError::new(
                    err_malformed!("track missing end-of-track event"),
                    at,
                    "MTrk"
                ));
            }
            log::warn!("track chunk at byte {} has no end-of-track event", offset - 8);
            break;
        }
        let (delta, kind) = decode_event(&mut raw, &mut running_status)
            .map_err(|kind| FormatError::new(kind, at, "MTrk"))?;
        pulses += delta as u64;
        let ev = Event {
            pulses,
            seconds: 0.0,
            track: 0,
            kind,
        };
        let end_of_track = ev.is_end_of_track();
        events.push(ev);
        if end_of_track {
            if !raw.is_empty() {
                let at = offset + (body.len() - raw.len());
                if cfg!(feature = "strict") {
                    bail!(FormatError::new(
                        err_malformed!("bytes after end-of-track event"),
                        at,
                        "MTrk"
                    ));
                }
                log::warn!(
                    "ignoring {} bytes after end-of-track event at byte {}",
                    raw.len(),
                    at
                );
            }
            break;
        }
    }
    log::trace!("decoded {} events out of track at byte {}", events.len(), offset - 8);
    Ok(events)
}

/// Encode every track into its own chunk, on several threads if enabled.
fn encode_tracks(tracks: &[Track], options: WriteOptions) -> Result<Vec<Vec<u8>>> {
    #[cfg(feature = "parallel")]
    {
        if tracks.len() > 1 {
            use rayon::prelude::*;

            return tracks
                .par_iter()
                .map(|track| encode_track(track, options))
                .collect();
        }
    }
    tracks
        .iter()
        .map(|track| encode_track(track, options))
        .collect()
}

/// Encode a track as a full `MTrk` chunk.
///
/// Stored end-of-track events are dropped and a single one is written last, no earlier than the
/// latest event.
fn encode_track(track: &Track, options: WriteOptions) -> Result<Vec<u8>> {
    fn delta(from: u64, to: u64) -> StdResult<u32, ValidationError> {
        let delta = to.saturating_sub(from);
        u32::try_from(delta)
            .ok()
            .filter(|delta| *delta <= u28::max_value().as_int())
            .ok_or(ValidationError::DeltaTooLarge(delta))
    }
    let fail = |err| Error::io(format!("track {}", track.number()), IoAction::Write, err);

    let mut out = Vec::with_capacity(8 + track.len() * 3);
    out.extend_from_slice(b"MTrk\0\0\0\0");
    let mut running_status = None;
    let mut last = 0;
    for ev in track.iter().filter(|ev| !ev.is_end_of_track()) {
        if !options.running_status {
            running_status = None;
        }
        encode_event(delta(last, ev.pulses)?, &ev.kind, &mut running_status, &mut out)
            .map_err(fail)?;
        last = last.max(ev.pulses);
    }
    let end = track.length_pulses();
    encode_event(
        delta(last, end)?,
        &EventKind::end_of_track(),
        &mut running_status,
        &mut out,
    )
    .map_err(fail)?;

    let len = out.len() - 8;
    let len = u32::try_from(len).map_err(|_| ValidationError::ChunkTooLarge(len))?;
    out[4..8].copy_from_slice(&len.to_be_bytes());
    Ok(out)
}
