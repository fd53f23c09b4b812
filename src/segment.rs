//! Segment types and location tracking

use bytes::Bytes;

/// A byte range in a buffer (offset and size)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ByteRange {
    /// Offset from start of buffer
    pub offset: usize,
    /// Size in bytes
    pub size: usize,
}

impl ByteRange {
    /// Create a new byte range
    pub fn new(offset: usize, size: usize) -> Self {
        Self { offset, size }
    }

    /// Get the end offset of this range
    pub fn end_offset(&self) -> usize {
        self.offset + self.size
    }
}

/// Largest value a segment length field may carry
///
/// The length field counts itself, so the payload is at most two bytes less.
pub const MAX_SEGMENT_LENGTH: usize = 0xFFFD;

/// Largest payload that fits under [`MAX_SEGMENT_LENGTH`]
pub const MAX_SEGMENT_PAYLOAD: usize = MAX_SEGMENT_LENGTH - 2;

/// Payload bytes of a segment
///
/// Parsed segments borrow from the buffer they were read from; synthesized
/// segments own their bytes. Borrowed views hold a reference-counted handle to
/// the source, so no copy is made until serialization.
#[derive(Clone, PartialEq, Eq)]
pub enum SegmentData {
    /// View into a source buffer
    Borrowed { source: Bytes, range: ByteRange },
    /// Bytes allocated while rewriting the sequence
    Owned(Vec<u8>),
}

impl SegmentData {
    /// Empty payload (SOI, EOI and other standalone markers)
    pub fn empty() -> Self {
        SegmentData::Owned(Vec::new())
    }

    /// Borrow `range` out of `source`
    ///
    /// Callers guarantee the range lies within `source`.
    pub fn borrowed(source: &Bytes, range: ByteRange) -> Self {
        SegmentData::Borrowed {
            source: source.clone(),
            range,
        }
    }

    /// Payload as a slice
    pub fn as_slice(&self) -> &[u8] {
        match self {
            SegmentData::Borrowed { source, range } => &source[range.offset..range.end_offset()],
            SegmentData::Owned(bytes) => bytes,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            SegmentData::Borrowed { range, .. } => range.size,
            SegmentData::Owned(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if the bytes were allocated by the mangler
    pub fn is_owned(&self) -> bool {
        matches!(self, SegmentData::Owned(_))
    }
}

impl std::fmt::Debug for SegmentData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SegmentData::Borrowed { range, .. } => f
                .debug_struct("Borrowed")
                .field("offset", &range.offset)
                .field("size", &range.size)
                .finish(),
            SegmentData::Owned(bytes) => f.debug_tuple("Owned").field(&bytes.len()).finish(),
        }
    }
}

/// A single marker-delimited unit of a JPEG stream
///
/// Wire layout: `FF <marker> [<length:u16 BE> <payload>]`. The length field
/// counts itself plus the payload; markers without a payload carry no length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Marker byte following the 0xFF prefix
    pub marker: u8,
    /// Wire length field, `None` for standalone markers
    pub length: Option<u16>,
    /// Payload bytes (excluding spliced thumbnail bytes)
    pub data: SegmentData,
    /// Thumbnail bytes appended after `data` at serialization time
    pub thumbnail_len: usize,
}

impl Segment {
    /// Standalone marker with no length field (SOI, EOI, RSTn)
    pub fn standalone(marker: u8) -> Self {
        Self {
            marker,
            length: None,
            data: SegmentData::empty(),
            thumbnail_len: 0,
        }
    }

    /// Segment parsed from a source buffer
    pub fn borrowed(marker: u8, length: u16, source: &Bytes, range: ByteRange) -> Self {
        Self {
            marker,
            length: Some(length),
            data: SegmentData::borrowed(source, range),
            thumbnail_len: 0,
        }
    }

    /// Synthesized segment owning its payload
    ///
    /// `thumbnail_len` bytes of thumbnail are spliced in after `payload` when
    /// the segment is written. The combined payload must not exceed
    /// [`MAX_SEGMENT_PAYLOAD`]; callers clamp before constructing.
    pub fn owned(marker: u8, payload: Vec<u8>, thumbnail_len: usize) -> Self {
        let length = (payload.len() + thumbnail_len + 2) as u16;
        Self {
            marker,
            length: Some(length),
            data: SegmentData::Owned(payload),
            thumbnail_len,
        }
    }

    /// Payload bytes stored in the segment
    pub fn payload(&self) -> &[u8] {
        self.data.as_slice()
    }

    /// True if the payload begins with `identifier`
    pub fn has_identifier(&self, identifier: &[u8]) -> bool {
        self.payload().starts_with(identifier)
    }

    /// Bytes this segment occupies on the wire (marker framing included)
    pub fn wire_size(&self) -> usize {
        2 + self.length.map_or(0, usize::from)
    }

    /// Check `length == 2 + payload + thumbnail`
    pub fn is_length_consistent(&self) -> bool {
        match self.length {
            None => self.data.is_empty() && self.thumbnail_len == 0,
            Some(length) => {
                length >= 2 && usize::from(length) == 2 + self.data.len() + self.thumbnail_len
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_range() {
        let a = ByteRange::new(4, 10);
        assert_eq!(a.end_offset(), 14);
        assert_eq!(ByteRange::default().end_offset(), 0);
    }

    #[test]
    fn test_borrowed_data_is_a_view() {
        let source = Bytes::from_static(b"0123456789");
        let data = SegmentData::borrowed(&source, ByteRange::new(2, 3));
        assert_eq!(data.as_slice(), b"234");
        assert_eq!(data.len(), 3);
        assert!(!data.is_owned());
    }

    #[test]
    fn test_owned_segment_length_counts_thumbnail() {
        let seg = Segment::owned(0xE0, b"JFXX\0\x10".to_vec(), 100);
        assert_eq!(seg.length, Some(108));
        assert!(seg.data.is_owned());
        assert!(seg.is_length_consistent());
        assert_eq!(seg.wire_size(), 110);
    }

    #[test]
    fn test_standalone_segment() {
        let soi = Segment::standalone(0xD8);
        assert_eq!(soi.length, None);
        assert_eq!(soi.wire_size(), 2);
        assert!(soi.is_length_consistent());
    }

    #[test]
    fn test_inconsistent_length_detected() {
        let mut seg = Segment::owned(0xE1, vec![0u8; 10], 0);
        seg.length = Some(5);
        assert!(!seg.is_length_consistent());
    }
}
