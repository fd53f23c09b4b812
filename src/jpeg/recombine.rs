//! Segment recombiner
//!
//! Serializes a (mangled) segment sequence back into one contiguous buffer,
//! splicing the scan data after SOS and the thumbnail bytes after the segment
//! that declares them.

use super::{marker_label, SOS};
use crate::{
    error::RecombineError,
    structure::{ScanData, SegmentSequence, ThumbnailPayload},
};
use byteorder::{BigEndian, WriteBytesExt};
use bytes::Bytes;

/// Write `sequence` with its scan data and thumbnail into a new buffer
pub fn recombine(
    sequence: &SegmentSequence,
    scan: &ScanData,
    thumbnail: Option<&ThumbnailPayload>,
) -> Result<Bytes, RecombineError> {
    if !sequence.is_well_formed() {
        return Err(RecombineError::InvariantViolation(format!(
            "sequence must run SOI..EOI with at most one SOS (first: {:?}, last: {:?})",
            sequence.first_marker(),
            sequence.last_marker()
        )));
    }

    let size = output_size(sequence, scan, thumbnail)?;
    let mut out: Vec<u8> = Vec::with_capacity(size);

    for segment in sequence {
        write_err(out.write_u8(0xFF))?;
        write_err(out.write_u8(segment.marker))?;

        let Some(length) = segment.length else {
            continue;
        };
        write_err(out.write_u16::<BigEndian>(length))?;
        out.extend_from_slice(segment.payload());

        if segment.thumbnail_len > 0 {
            // Presence and length were checked while sizing
            if let Some(thumbnail) = thumbnail {
                out.extend_from_slice(&thumbnail.as_slice()[..segment.thumbnail_len]);
            }
        }

        if segment.marker == SOS {
            out.extend_from_slice(scan.as_slice());
        }
    }

    if out.len() != size {
        return Err(RecombineError::InvariantViolation(format!(
            "wrote {} bytes, expected {}",
            out.len(),
            size
        )));
    }

    log::debug!("Recombined buffer size: {size}");
    Ok(Bytes::from(out))
}

/// Validate every segment and sum their wire sizes
fn output_size(
    sequence: &SegmentSequence,
    scan: &ScanData,
    thumbnail: Option<&ThumbnailPayload>,
) -> Result<usize, RecombineError> {
    let mut size: usize = 0;
    let mut has_sos = false;

    for segment in sequence {
        if !segment.is_length_consistent() {
            return Err(RecombineError::InvariantViolation(format!(
                "{} length {:?} does not match payload {} + thumbnail {}",
                marker_label(segment.marker),
                segment.length,
                segment.data.len(),
                segment.thumbnail_len
            )));
        }

        if segment.thumbnail_len > 0 {
            if !segment.data.is_owned() {
                return Err(RecombineError::InvariantViolation(format!(
                    "{} carries a thumbnail but does not own its payload",
                    marker_label(segment.marker)
                )));
            }
            let available = thumbnail.map_or(0, ThumbnailPayload::len);
            if available < segment.thumbnail_len {
                return Err(RecombineError::InvariantViolation(format!(
                    "{} declares {} thumbnail bytes, {} available",
                    marker_label(segment.marker),
                    segment.thumbnail_len,
                    available
                )));
            }
        }

        has_sos |= segment.marker == SOS;
        size = size
            .checked_add(segment.wire_size())
            .ok_or(RecombineError::SizeOverflow)?;
    }

    if has_sos {
        size = size
            .checked_add(scan.len())
            .ok_or(RecombineError::SizeOverflow)?;
    } else if !scan.is_empty() {
        log::warn!("Dropping {} bytes of scan data without an SOS segment", scan.len());
    }

    Ok(size)
}

fn write_err(result: std::io::Result<()>) -> Result<(), RecombineError> {
    result.map_err(|e| RecombineError::InvariantViolation(e.to_string()))
}
