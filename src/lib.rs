//! Streaming JPEG packer: embeds a thumbnail stream into a primary JPEG.
//!
//! Each round takes one encoded buffer from every input. The largest buffer
//! is the primary image; the first of the others becomes its thumbnail. The
//! packer rewrites the primary's metadata segments so the thumbnail travels
//! inside an EXIF APP1 (IFD1) or a JFIF APP0 extension (JFXX), and emits one
//! combined buffer per round.
//!
//! # Design Principles
//!
//! - **Zero-copy**: parsed segments and scan data are views into the input
//!   [`bytes::Bytes`]; only synthesized metadata is allocated
//! - **Stage separation**: parse, mangle and recombine are pure functions
//!   usable without the threaded packer
//! - **Bounded waits**: every blocking wait in the collector and worker ends
//!   on shutdown
//!
//! # Quick Start
//!
//! ```
//! use jpeg_packer::{Buffer, JpegPacker, OutputFormat, PackerConfig, PackerEvent};
//! use jpeg_packer::test_utils::{sample_primary, sample_thumbnail};
//!
//! # fn main() -> jpeg_packer::Result<()> {
//! let mut packer = JpegPacker::new(PackerConfig::new().with_format(OutputFormat::Jfif));
//! let main = packer.request_input()?;
//! let thumb = packer.request_input()?;
//! let events = packer.events();
//! packer.start()?;
//!
//! main.push(Buffer::new(sample_primary()))?;
//! thumb.push(Buffer::new(sample_thumbnail(200)))?;
//!
//! if let Ok(PackerEvent::Buffer(packed)) = events.recv() {
//!     assert_eq!(&packed.data[..2], &[0xFF, 0xD8]);
//! }
//! packer.stop()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Stage API
//!
//! ```
//! use bytes::Bytes;
//! use jpeg_packer::{jpeg, OutputFormat};
//! use jpeg_packer::test_utils::{sample_primary, sample_thumbnail};
//!
//! # fn main() -> jpeg_packer::Result<()> {
//! let primary = Bytes::from(sample_primary());
//! let secondary = Bytes::from(sample_thumbnail(64));
//!
//! let image = jpeg::parse(&primary, jpeg::Role::Primary)?.into_primary().unwrap();
//! let thumbnail = jpeg::parse(&secondary, jpeg::Role::Secondary)?.into_thumbnail();
//!
//! let sequence = jpeg::mangle(image.sequence, OutputFormat::Exif, thumbnail.as_ref())?;
//! let packed = jpeg::recombine(&sequence, &image.scan, thumbnail.as_ref())?;
//! assert!(packed.len() > primary.len());
//! # Ok(())
//! # }
//! ```

mod allocator;
mod config;
mod error;
pub mod jfif;
pub mod jpeg;
mod packer;
mod round;
mod segment;
mod structure;
pub mod tiff;
mod worker;

pub use allocator::IndexAllocator;
pub use config::{OutputFormat, PackerConfig, ThumbnailPolicy};
pub use error::{Error, MangleError, MetadataError, ParseError, RecombineError, Result};
pub use packer::JpegPacker;
pub use round::{input_channel, Buffer, Collected, InputHandle, InputReceiver, Round, RoundCollector};
pub use segment::{ByteRange, Segment, SegmentData, MAX_SEGMENT_LENGTH, MAX_SEGMENT_PAYLOAD};
pub use structure::{ScanData, SegmentSequence, ThumbnailPayload};
pub use tiff::{MetadataCodec, TiffExifCodec};
pub use worker::{pack_round, Handoff, PackerEvent, Worker};

// Test utilities - only compiled for tests or when explicitly enabled
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
