//! Segment parser
//!
//! Splits one buffer into its segment sequence. Primary images are walked
//! marker by marker until SOS; everything after the SOS header is kept as an
//! opaque scan range. Secondary images are not walked at all, the whole
//! buffer becomes the thumbnail payload.

use super::{is_standalone, marker_label, EOI, MIN_BUFFER_SIZE, SOS};
use crate::{
    error::ParseError,
    segment::{ByteRange, Segment},
    structure::{ScanData, SegmentSequence, ThumbnailPayload},
};
use byteorder::{BigEndian, ReadBytesExt};
use bytes::Bytes;
use std::io::Cursor;

/// How a buffer is used in a round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Main image, parsed into segments
    Primary,
    /// Thumbnail, kept as one opaque payload
    Secondary,
}

/// Result of parsing a primary image
#[derive(Debug, Clone)]
pub struct PrimaryImage {
    /// Segments from SOI to EOI
    pub sequence: SegmentSequence,
    /// Entropy-coded data attached to the SOS segment
    pub scan: ScanData,
    /// False when no EOI was present and one was synthesized
    pub eoi_found: bool,
}

/// Output of [`parse`]
#[derive(Debug, Clone)]
pub enum ParseOutput {
    Primary(PrimaryImage),
    Secondary(ThumbnailPayload),
}

impl ParseOutput {
    pub fn into_primary(self) -> Option<PrimaryImage> {
        match self {
            ParseOutput::Primary(image) => Some(image),
            ParseOutput::Secondary(_) => None,
        }
    }

    pub fn into_thumbnail(self) -> Option<ThumbnailPayload> {
        match self {
            ParseOutput::Secondary(thumbnail) => Some(thumbnail),
            ParseOutput::Primary(_) => None,
        }
    }
}

/// Parse `buffer` according to its `role`
///
/// All returned ranges are views into `buffer`; nothing is copied. Fill
/// bytes (extra `0xFF` before a marker) are not recorded, so a recombined
/// buffer drops them and is otherwise byte-identical to the input.
pub fn parse(buffer: &Bytes, role: Role) -> Result<ParseOutput, ParseError> {
    let size = buffer.len();
    log::trace!("Received buffer of size: {size}");

    if size < MIN_BUFFER_SIZE {
        log::error!("Buffer too small (size: {size})");
        return Err(ParseError::BufferTooSmall {
            size,
            min: MIN_BUFFER_SIZE,
        });
    }

    let eoi = find_eoi(buffer);
    if eoi.is_none() {
        log::warn!("Couldn't find an EOI marker, using buffer end");
    }

    match role {
        Role::Primary => parse_primary(buffer, eoi).map(ParseOutput::Primary),
        Role::Secondary => {
            let end = eoi.map_or(size, |pos| pos + 2);
            log::debug!("Thumbnail data, size = {end}");
            Ok(ParseOutput::Secondary(ThumbnailPayload::new(
                buffer,
                ByteRange::new(0, end),
            )))
        }
    }
}

/// Find the EOI marker in the trailing window of the buffer
///
/// Only the last few bytes are inspected: an `FF D9` deeper in the buffer may
/// belong to an embedded thumbnail rather than to this image.
fn find_eoi(data: &[u8]) -> Option<usize> {
    let last = data.len().checked_sub(2)?;
    let first = data.len().saturating_sub(MIN_BUFFER_SIZE);
    (first..=last)
        .rev()
        .find(|&i| data[i] == 0xFF && data[i + 1] == EOI)
}

fn parse_primary(buffer: &Bytes, eoi: Option<usize>) -> Result<PrimaryImage, ParseError> {
    let size = buffer.len();
    let logical_end = eoi.unwrap_or(size);
    let mut cursor = Cursor::new(&buffer[..]);
    let mut sequence = SegmentSequence::new();
    let mut scan = ScanData::empty();
    let mut eoi_found = false;

    while (cursor.position() as usize) < size {
        let offset = cursor.position() as usize;

        let prefix = read_u8(&mut cursor, 0xFF)?;
        if prefix != 0xFF {
            return Err(ParseError::MissingMarker {
                offset,
                found: prefix,
            });
        }

        // Skip fill bytes
        let mut marker = read_u8(&mut cursor, 0xFF)?;
        while marker == 0xFF {
            marker = read_u8(&mut cursor, 0xFF)?;
        }

        if is_standalone(marker) {
            sequence.push(Segment::standalone(marker));
            log::debug!("marker = {:02x} ({})", marker, marker_label(marker));

            if marker == EOI {
                eoi_found = true;
                log::debug!("done parsing at 0x{:x} / 0x{:x}", cursor.position(), size);
                break;
            }
            continue;
        }

        let length = cursor
            .read_u16::<BigEndian>()
            .map_err(|_| truncated(marker, offset, 4, size))?;
        if length < 2 {
            return Err(ParseError::InvalidLength {
                marker,
                offset,
                length,
            });
        }

        let payload_start = cursor.position() as usize;
        let payload_size = usize::from(length) - 2;
        if payload_start + payload_size > size {
            return Err(truncated(marker, offset, 2 + usize::from(length), size));
        }

        sequence.push(Segment::borrowed(
            marker,
            length,
            buffer,
            ByteRange::new(payload_start, payload_size),
        ));
        log::debug!(
            "marker = {:02x} ({}), size = {}",
            marker,
            marker_label(marker),
            length
        );

        let next = payload_start + payload_size;
        cursor.set_position(next as u64);

        if marker == SOS {
            if next > logical_end {
                return Err(truncated(marker, offset, next, logical_end));
            }
            scan = ScanData::new(buffer, ByteRange::new(next, logical_end - next));
            log::debug!("Primary data, size = {}", scan.len());

            cursor.set_position(logical_end as u64);
            if eoi.is_none() {
                break;
            }
        }
    }

    if !eoi_found {
        log::warn!("No EOI segment after 0x{:x}, appending one", cursor.position());
        sequence.push(Segment::standalone(EOI));
    }

    Ok(PrimaryImage {
        sequence,
        scan,
        eoi_found,
    })
}

fn read_u8(cursor: &mut Cursor<&[u8]>, marker: u8) -> Result<u8, ParseError> {
    let offset = cursor.position() as usize;
    let available = cursor.get_ref().len().saturating_sub(offset);
    cursor
        .read_u8()
        .map_err(|_| truncated(marker, offset, 1, offset + available))
}

fn truncated(marker: u8, offset: usize, needed: usize, end: usize) -> ParseError {
    ParseError::Truncated {
        marker,
        offset,
        needed,
        available: end.saturating_sub(offset),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jpeg::{APP0, SOI};

    fn bytes(data: &[u8]) -> Bytes {
        Bytes::copy_from_slice(data)
    }

    #[test]
    fn test_parse_minimal_with_scan() {
        // SOI, APP0(len 4), SOS(len 2), scan "ab", EOI
        let data = bytes(&[
            0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x04, 0x11, 0x22, 0xFF, 0xDA, 0x00, 0x02, b'a', b'b',
            0xFF, 0xD9,
        ]);
        let image = parse(&data, Role::Primary).unwrap().into_primary().unwrap();

        let markers: Vec<u8> = image.sequence.iter().map(|s| s.marker).collect();
        assert_eq!(markers, vec![SOI, APP0, SOS, EOI]);
        assert_eq!(image.sequence.segments[1].payload(), &[0x11, 0x22]);
        assert_eq!(image.scan.as_slice(), b"ab");
        assert!(image.eoi_found);
    }

    #[test]
    fn test_buffer_too_small() {
        let err = parse(&bytes(&[0xFF, 0xD8, 0xFF, 0xD9]), Role::Primary).unwrap_err();
        assert_eq!(err, ParseError::BufferTooSmall { size: 4, min: 5 });
    }

    #[test]
    fn test_truncated_payload() {
        let data = bytes(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x00, 0x00]);
        let err = parse(&data, Role::Primary).unwrap_err();
        assert!(matches!(err, ParseError::Truncated { marker: 0xE0, .. }));
    }

    #[test]
    fn test_invalid_length() {
        let data = bytes(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x01, 0xFF, 0xD9]);
        let err = parse(&data, Role::Primary).unwrap_err();
        assert_eq!(
            err,
            ParseError::InvalidLength {
                marker: 0xE0,
                offset: 2,
                length: 1
            }
        );
    }

    #[test]
    fn test_missing_marker_prefix() {
        let data = bytes(&[0xFF, 0xD8, 0x12, 0x34, 0x56, 0xFF, 0xD9]);
        let err = parse(&data, Role::Primary).unwrap_err();
        assert_eq!(
            err,
            ParseError::MissingMarker {
                offset: 2,
                found: 0x12
            }
        );
    }

    #[test]
    fn test_missing_eoi_uses_buffer_end() {
        let data = bytes(&[
            0xFF, 0xD8, 0xFF, 0xDA, 0x00, 0x02, 1, 2, 3, 4, 5, 6, 7, 8,
        ]);
        let image = parse(&data, Role::Primary).unwrap().into_primary().unwrap();
        assert!(!image.eoi_found);
        assert_eq!(image.scan.as_slice(), &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(image.sequence.last_marker(), Some(EOI));
    }

    #[test]
    fn test_fill_bytes_skipped() {
        let data = bytes(&[0xFF, 0xD8, 0xFF, 0xFF, 0xE0, 0x00, 0x02, 0xFF, 0xD9]);
        let image = parse(&data, Role::Primary).unwrap().into_primary().unwrap();
        let markers: Vec<u8> = image.sequence.iter().map(|s| s.marker).collect();
        assert_eq!(markers, vec![SOI, APP0, EOI]);
    }

    #[test]
    fn test_secondary_is_opaque() {
        let data = bytes(&[0xFF, 0xD8, 0x00, 0x01, 0x02, 0xFF, 0xD9, 0x00]);
        let thumb = parse(&data, Role::Secondary)
            .unwrap()
            .into_thumbnail()
            .unwrap();
        // Trailing padding after EOI is dropped
        assert_eq!(thumb.as_slice(), &data[..7]);
    }

    #[test]
    fn test_secondary_without_eoi_keeps_everything() {
        let data = bytes(&[0xFF, 0xD8, 0x00, 0x01, 0x02, 0x03]);
        let thumb = parse(&data, Role::Secondary)
            .unwrap()
            .into_thumbnail()
            .unwrap();
        assert_eq!(thumb.len(), data.len());
    }

    #[test]
    fn test_find_eoi_only_inspects_tail() {
        // EOI early in the buffer is not the logical end
        let data = [0xFF, 0xD9, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(find_eoi(&data), None);
        let data = [0, 0, 0, 0, 0xFF, 0xD9, 0];
        assert_eq!(find_eoi(&data), Some(4));
    }
}
