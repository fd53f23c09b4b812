//! Error types for jpeg-packer

use std::io;
use std::time::Duration;

/// Result type for jpeg-packer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while splitting a buffer into segments
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Buffer cannot hold SOI + EOI plus a marker byte
    #[error("Buffer too small: {size} bytes (min: {min})")]
    BufferTooSmall { size: usize, min: usize },

    /// A length field or payload extends past the end of the buffer
    #[error("Truncated segment 0x{marker:02X} at offset {offset}: need {needed} bytes, {available} available")]
    Truncated {
        marker: u8,
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// A length field smaller than the two bytes it occupies
    #[error("Invalid length {length} for segment 0x{marker:02X} at offset {offset}")]
    InvalidLength { marker: u8, offset: usize, length: u16 },

    /// Something other than 0xFF where a marker should start
    #[error("Expected 0xFF at offset {offset}, got 0x{found:02X}")]
    MissingMarker { offset: usize, found: u8 },
}

/// Errors raised by a metadata codec
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetadataError {
    /// Encoded metadata does not fit the TIFF offset space
    #[error("Encoded metadata too large: {size} bytes")]
    Oversized { size: usize },

    /// Codec-specific failure
    #[error("Metadata codec failed: {0}")]
    Codec(String),
}

/// Errors raised while rewriting a segment sequence
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MangleError {
    /// Sequence is too short or lacks SOI/EOI
    #[error("Malformed segment sequence: {0}")]
    MalformedSequence(String),

    /// Synthesized metadata alone exceeds the segment ceiling
    #[error("Metadata too large: {size} bytes (max: {max})")]
    MetadataTooLarge { size: usize, max: usize },

    /// Thumbnail does not fit and the policy forbids truncation
    #[error("Thumbnail too large: {size} bytes (max: {max})")]
    ThumbnailTooLarge { size: usize, max: usize },

    /// Metadata codec failure
    #[error(transparent)]
    Codec(#[from] MetadataError),
}

/// Errors raised while serializing a segment sequence
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecombineError {
    /// Output size does not fit in `usize`
    #[error("Output size overflow")]
    SizeOverflow,

    /// Sequence or segment breaks an ordering, ownership or length invariant
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

/// Errors that can occur while packing
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Input could not be parsed
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Metadata segments could not be synthesized
    #[error("Mangle error: {0}")]
    Mangle(#[from] MangleError),

    /// Output could not be serialized
    #[error("Recombine error: {0}")]
    Recombine(#[from] RecombineError),

    /// An input did not deliver within the bounded wait
    #[error("Collection timed out after {waited:?}: {missing} input(s) missing")]
    CollectionTimeout { waited: Duration, missing: usize },

    /// Operation not allowed in the current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// No input registered under this index
    #[error("Unknown input {0}")]
    UnknownInput(usize),

    /// Peer side of a channel went away
    #[error("Channel closed")]
    ChannelClosed,
}
