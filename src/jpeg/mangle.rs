//! Segment mangler
//!
//! Rewrites a primary image's segment sequence so it carries a thumbnail in
//! the configured metadata container. Only the sequence is touched; scan data
//! and thumbnail bytes stay where they are until recombination.

use super::{APP0, APP1, EOI, SOI};
use crate::{
    config::{OutputFormat, ThumbnailPolicy},
    error::MangleError,
    jfif::{jfif_payload, jfxx_header, JFIF_IDENTIFIER, JFXX_HEADER_SIZE, JFXX_IDENTIFIER},
    segment::{Segment, MAX_SEGMENT_PAYLOAD},
    structure::{SegmentSequence, ThumbnailPayload},
    tiff::{MetadataCodec, TiffExifCodec, EXIF_IDENTIFIER},
};
use std::{fmt, sync::Arc};

/// Configured mangling step
#[derive(Clone)]
pub struct Mangler {
    format: OutputFormat,
    policy: ThumbnailPolicy,
    codec: Arc<dyn MetadataCodec>,
}

impl fmt::Debug for Mangler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mangler")
            .field("format", &self.format)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Mangler {
    /// Mangler using the built-in TIFF codec and the default policy
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            policy: ThumbnailPolicy::default(),
            codec: Arc::new(TiffExifCodec),
        }
    }

    /// Replace the EXIF metadata codec
    pub fn with_codec(mut self, codec: Arc<dyn MetadataCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Set the oversize thumbnail policy
    pub fn with_thumbnail_policy(mut self, policy: ThumbnailPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn thumbnail_policy(&self) -> ThumbnailPolicy {
        self.policy
    }

    /// Rewrite `sequence` for the configured format
    ///
    /// On success the first segment is SOI, the last is EOI, and every
    /// segment added here owns its bytes.
    pub fn mangle(
        &self,
        mut sequence: SegmentSequence,
        thumbnail: Option<&ThumbnailPayload>,
    ) -> Result<SegmentSequence, MangleError> {
        canonicalize(&mut sequence)?;

        match self.format {
            OutputFormat::Exif => {
                let removed = sequence.remove_all(APP0);
                log::debug!("Removed {removed} APP0 segments");
                if let Some(thumbnail) = thumbnail {
                    self.insert_exif(&mut sequence, thumbnail.len())?;
                }
            }
            OutputFormat::Jfif => {
                let removed = sequence.remove_all(APP1);
                log::debug!("Removed {removed} APP1 segments");
                self.insert_jfif(&mut sequence, thumbnail.map(ThumbnailPayload::len))?;
            }
        }

        Ok(sequence)
    }

    fn insert_exif(
        &self,
        sequence: &mut SegmentSequence,
        thumbnail_len: usize,
    ) -> Result<(), MangleError> {
        let existing = sequence.find_app(APP1, EXIF_IDENTIFIER);
        let (metadata, embedded) = self.synthesize_exif(
            existing.map(|index| sequence.segments[index].payload()),
            thumbnail_len,
        )?;

        if let Some(index) = existing {
            sequence.segments.remove(index);
        }

        let segment = Segment::owned(APP1, metadata, embedded);
        log::debug!("EXIF APP1 segment length: {:?}", segment.length);
        sequence.segments.insert(1, segment);
        Ok(())
    }

    /// Run the codec until metadata and thumbnail fit in one segment
    ///
    /// Returns the metadata and the number of thumbnail bytes it describes.
    fn synthesize_exif(
        &self,
        existing: Option<&[u8]>,
        thumbnail_len: usize,
    ) -> Result<(Vec<u8>, usize), MangleError> {
        let mut allowed = thumbnail_len;
        loop {
            let declared = u32::try_from(allowed).unwrap_or(u32::MAX);
            let metadata = self.codec.synthesize_exif(existing, declared)?;
            if metadata.len() > MAX_SEGMENT_PAYLOAD {
                return Err(MangleError::MetadataTooLarge {
                    size: metadata.len(),
                    max: MAX_SEGMENT_PAYLOAD,
                });
            }

            let room = MAX_SEGMENT_PAYLOAD - metadata.len();
            if allowed <= room {
                return Ok((metadata, allowed));
            }
            // The codec is re-run so IFD1 describes the truncated length
            allowed = self.fit_thumbnail(thumbnail_len, room)?;
        }
    }

    fn insert_jfif(
        &self,
        sequence: &mut SegmentSequence,
        thumbnail_len: Option<usize>,
    ) -> Result<(), MangleError> {
        if thumbnail_len.is_some() {
            let before = sequence.len();
            sequence
                .segments
                .retain(|s| !(s.marker == APP0 && s.has_identifier(JFXX_IDENTIFIER)));
            if sequence.len() != before {
                log::debug!("Removed existing JFXX extension");
            }
        }

        let jfif = match sequence.find_app(APP0, JFIF_IDENTIFIER) {
            Some(index) => index,
            None => {
                sequence
                    .segments
                    .insert(1, Segment::owned(APP0, jfif_payload(), 0));
                1
            }
        };

        let Some(thumbnail_len) = thumbnail_len else {
            return Ok(());
        };

        let embedded = self.fit_thumbnail(thumbnail_len, MAX_SEGMENT_PAYLOAD - JFXX_HEADER_SIZE)?;
        sequence
            .segments
            .insert(jfif + 1, Segment::owned(APP0, jfxx_header(), embedded));
        Ok(())
    }

    /// Clamp a thumbnail to `room` bytes according to the policy
    fn fit_thumbnail(&self, thumbnail_len: usize, room: usize) -> Result<usize, MangleError> {
        if thumbnail_len <= room {
            return Ok(thumbnail_len);
        }

        match self.policy {
            ThumbnailPolicy::Truncate => {
                log::warn!("Thumbnail too big ({thumbnail_len} bytes), truncating to {room}");
                Ok(room)
            }
            ThumbnailPolicy::Reject => Err(MangleError::ThumbnailTooLarge {
                size: thumbnail_len,
                max: room,
            }),
        }
    }
}

/// Mangle with the default codec and policy
pub fn mangle(
    sequence: SegmentSequence,
    format: OutputFormat,
    thumbnail: Option<&ThumbnailPayload>,
) -> Result<SegmentSequence, MangleError> {
    Mangler::new(format).mangle(sequence, thumbnail)
}

/// Move the first SOI to the front and the last EOI to the back
fn canonicalize(sequence: &mut SegmentSequence) -> Result<(), MangleError> {
    if sequence.len() < 3 {
        return Err(MangleError::MalformedSequence(format!(
            "need at least 3 segments, got {}",
            sequence.len()
        )));
    }

    let soi = sequence
        .position(SOI)
        .ok_or_else(|| MangleError::MalformedSequence("no SOI segment".into()))?;
    if soi != 0 {
        log::debug!("Moving SOI from index {soi} to the front");
        let segment = sequence.segments.remove(soi);
        sequence.segments.insert(0, segment);
    }

    let eoi = sequence
        .rposition(EOI)
        .ok_or_else(|| MangleError::MalformedSequence("no EOI segment".into()))?;
    let last = sequence.len() - 1;
    if eoi != last {
        log::debug!("Moving EOI from index {eoi} to the end");
        let segment = sequence.segments.remove(eoi);
        sequence.segments.push(segment);
    }

    Ok(())
}
