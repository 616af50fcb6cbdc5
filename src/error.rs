use std::{fmt, io};
use thiserror::Error;

/// The type of decoding error that occurred.
///
/// As a library consumer, detailed errors about what specific part of the MIDI spec was
/// violated are not very useful.
/// For this reason, errors are broadly categorized into 2 classes, and specific error info is
/// provided as a non-normative string literal.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Fatal errors while reading the file. It is likely that the file is not a MIDI file or
    /// is severely corrupted.
    ///
    /// This error cannot be ignored, as there is not enough data to continue parsing.
    Invalid(&'static str),

    /// Non-fatal error, but the file is clearly uncompliant.
    ///
    /// This kind of error is not emitted by default, only if the `strict` crate feature is
    /// enabled.
    Malformed(&'static str),
}
impl ErrorKind {
    /// Get the informative message on what exact part of the MIDI format was not respected.
    #[inline]
    pub fn message(&self) -> &'static str {
        match *self {
            ErrorKind::Invalid(msg) => msg,
            ErrorKind::Malformed(msg) => msg,
        }
    }
}
impl fmt::Display for ErrorKind {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorKind::Invalid(msg) => write!(f, "invalid midi: {}", msg),
            ErrorKind::Malformed(msg) => write!(f, "malformed midi: {}", msg),
        }
    }
}
impl std::error::Error for ErrorKind {}

macro_rules! err_invalid {
    ($msg:expr) => {{
        $crate::error::ErrorKind::Invalid($msg)
    }};
}
macro_rules! err_malformed {
    ($msg:expr) => {{
        $crate::error::ErrorKind::Malformed($msg)
    }};
}

/// A decoding failure, located in the input.
///
/// `offset` is the absolute byte offset into the buffer given to the parser (after unwrapping a
/// RIFF container, if any), pointing at the item that could not be decoded.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
#[error("{kind} (in {chunk} at byte {offset})")]
pub struct FormatError {
    kind: ErrorKind,
    offset: usize,
    chunk: &'static str,
}
impl FormatError {
    #[inline]
    pub(crate) fn new(kind: ErrorKind, offset: usize, chunk: &'static str) -> FormatError {
        FormatError {
            kind,
            offset,
            chunk,
        }
    }

    /// More information about the error itself.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Byte offset at which decoding failed.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// The chunk being decoded when the error occurred (`"MThd"`, `"MTrk"`, `"RIFF"` or `"file"`).
    #[inline]
    pub fn chunk(&self) -> &'static str {
        self.chunk
    }
}

/// What the library was attempting when an I/O error occurred.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum IoAction {
    Read,
    Write,
}
impl fmt::Display for IoAction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            IoAction::Read => "read",
            IoAction::Write => "write",
        })
    }
}

/// An argument was rejected before anything was modified.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ValidationError {
    #[error("event spec {index}: byte {value} is outside 0..=255")]
    ByteOutOfRange { index: usize, value: i64 },
    #[error("event spec {index}: data byte {value:#04x} has the top bit set")]
    DataByteNotU7 { index: usize, value: u8 },
    #[error("event spec {index}: {value:#04x} is not a status byte")]
    NotAStatusByte { index: usize, value: u8 },
    #[error("event spec {index}: status {value:#04x} needs a variable-length payload")]
    VariableLengthStatus { index: usize, value: u8 },
    #[error("time {time} is negative or not finite")]
    InvalidTime { time: f64 },
    #[error("pulse time {time} is not a whole number")]
    FractionalPulses { time: f64 },
    #[error("pulse time {time} does not fit in the pulse range")]
    PulsesOutOfRange { time: f64 },
    #[error("unknown time domain `{0}`, expected `metrical` or `physical`")]
    UnknownDomain(String),
    #[error("unrecognised smf information key `{0}`")]
    UnknownInfoKey(String),
    #[error("invalid track selector {0}")]
    InvalidTrackSelector(i64),
    #[error("{0} tracks do not fit in a midi header")]
    TooManyTracks(usize),
    #[error("delta time of {0} pulses exceeds the 28-bit range")]
    DeltaTooLarge(u64),
    #[error("chunk of {0} bytes exceeds the 32-bit range")]
    ChunkTooLarge(usize),
}

/// Every error this crate can produce.
#[derive(Debug, Error)]
pub enum Error {
    /// The input is not a decodable Standard Midi File.
    #[error(transparent)]
    Format(#[from] FormatError),
    /// The byte source or sink failed.
    #[error("failed to {action} `{resource}`: {source}")]
    Io {
        resource: String,
        action: IoAction,
        #[source]
        source: io::Error,
    },
    /// An argument was out of range. Nothing was modified.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// No track with the given 1-based number exists.
    #[error("no track with number {0}")]
    TrackNotFound(usize),
}
impl Error {
    pub(crate) fn io(resource: impl fmt::Display, action: IoAction, source: io::Error) -> Error {
        Error::Io {
            resource: resource.to_string(),
            action,
            source,
        }
    }

    /// The decoding error, if this is a format error.
    pub fn as_format(&self) -> Option<&FormatError> {
        match self {
            Error::Format(err) => Some(err),
            _ => None,
        }
    }
}

/// The result type used by every fallible operation in this crate.
pub type Result<T> = StdResult<T, Error>;
/// Result of low-level readers, located by their caller.
pub(crate) type KindResult<T> = StdResult<T, ErrorKind>;
pub(crate) use std::result::Result as StdResult;
