//! Segment sequence and the byte ranges cut out of a parsed buffer

use crate::{
    jpeg::{marker_label, EOI, SOI, SOS},
    segment::{ByteRange, Segment},
};
use bytes::Bytes;

/// Ordered segments of one JPEG image
///
/// After a successful parse or mangle the first segment is SOI and the last
/// is EOI. Everything in between may be reordered by the mangler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentSequence {
    /// All segments in wire order
    pub segments: Vec<Segment>,
}

impl SegmentSequence {
    /// Create an empty sequence
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a segment
    pub fn push(&mut self, segment: Segment) {
        log::trace!(
            "segment {} (0x{:02X}), length = {:?}",
            marker_label(segment.marker),
            segment.marker,
            segment.length
        );
        self.segments.push(segment);
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Segment> {
        self.segments.iter()
    }

    pub fn first_marker(&self) -> Option<u8> {
        self.segments.first().map(|s| s.marker)
    }

    pub fn last_marker(&self) -> Option<u8> {
        self.segments.last().map(|s| s.marker)
    }

    /// Index of the first segment with `marker`
    pub fn position(&self, marker: u8) -> Option<usize> {
        self.segments.iter().position(|s| s.marker == marker)
    }

    /// Index of the last segment with `marker`
    pub fn rposition(&self, marker: u8) -> Option<usize> {
        self.segments.iter().rposition(|s| s.marker == marker)
    }

    /// Index of the first segment with `marker` whose payload starts with `identifier`
    pub fn find_app(&self, marker: u8, identifier: &[u8]) -> Option<usize> {
        self.segments
            .iter()
            .position(|s| s.marker == marker && s.has_identifier(identifier))
    }

    /// Number of segments with `marker`
    pub fn count(&self, marker: u8) -> usize {
        self.segments.iter().filter(|s| s.marker == marker).count()
    }

    /// Remove every segment with `marker`, returning how many were dropped
    pub fn remove_all(&mut self, marker: u8) -> usize {
        let before = self.segments.len();
        self.segments.retain(|s| s.marker != marker);
        before - self.segments.len()
    }

    /// SOI first, EOI last, at most one SOS
    pub fn is_well_formed(&self) -> bool {
        self.first_marker() == Some(SOI)
            && self.last_marker() == Some(EOI)
            && self.segments.len() >= 2
            && self.count(SOS) <= 1
    }
}

impl<'a> IntoIterator for &'a SegmentSequence {
    type Item = &'a Segment;
    type IntoIter = std::slice::Iter<'a, Segment>;

    fn into_iter(self) -> Self::IntoIter {
        self.segments.iter()
    }
}

/// Entropy-coded bytes following the SOS header
///
/// A zero-copy view into the primary buffer, spanning from the end of the SOS
/// header to the EOI marker (or the end of the buffer when EOI is missing).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanData {
    bytes: Bytes,
}

impl ScanData {
    /// View `range` of `source`
    pub fn new(source: &Bytes, range: ByteRange) -> Self {
        Self {
            bytes: source.slice(range.offset..range.end_offset()),
        }
    }

    /// No scan data (image without SOS)
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Encoded thumbnail bytes taken from a secondary buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailPayload {
    bytes: Bytes,
}

impl ThumbnailPayload {
    /// View `range` of `source`
    pub fn new(source: &Bytes, range: ByteRange) -> Self {
        Self {
            bytes: source.slice(range.offset..range.end_offset()),
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl From<Bytes> for ThumbnailPayload {
    fn from(bytes: Bytes) -> Self {
        Self { bytes }
    }
}
