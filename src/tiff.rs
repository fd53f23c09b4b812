//! Minimal TIFF/EXIF codec
//!
//! Produces the APP1 payload that references a thumbnail appended right after
//! it. The payload keeps the primary image's IFD0 (and its Exif/GPS sub-IFDs)
//! when one is available and adds an IFD1 describing the thumbnail.
//!
//! TIFF Structure:
//! - Header: byte order (II/MM), magic (0x002A), IFD offset
//! - IFD (Image File Directory): tag count, tags (12 bytes each), next IFD offset
//! - Tags: tag ID (2), type (2), count (4), value/offset (4)
//!
//! All offsets are relative to the start of the TIFF header, which sits right
//! after the 6-byte `Exif\0\0` identifier. A thumbnail appended directly after
//! the payload therefore lives at offset `payload_len - 6`.

use crate::error::MetadataError;
use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// APP1 identifier preceding the TIFF header
pub const EXIF_IDENTIFIER: &[u8] = b"Exif\0\0";

/// TIFF/EXIF tag IDs
mod tags {
    // IFD0 (main image) tags
    pub const COMPRESSION: u16 = 0x0103;
    pub const STRIP_OFFSETS: u16 = 0x0111;
    pub const X_RESOLUTION: u16 = 0x011A;
    pub const Y_RESOLUTION: u16 = 0x011B;
    pub const RESOLUTION_UNIT: u16 = 0x0128;
    pub const TILE_OFFSETS: u16 = 0x0144;
    pub const SUB_IFDS: u16 = 0x014A;
    pub const Y_CB_CR_POSITIONING: u16 = 0x0213;
    pub const EXIF_IFD_POINTER: u16 = 0x8769;
    pub const GPS_IFD_POINTER: u16 = 0x8825;

    // EXIF sub-IFD tags
    pub const INTEROPERABILITY_IFD_POINTER: u16 = 0xA005;

    // IFD1 (thumbnail) tags
    pub const JPEG_INTERCHANGE_FORMAT: u16 = 0x0201;
    pub const JPEG_INTERCHANGE_FORMAT_LENGTH: u16 = 0x0202;
}

/// TIFF data types
mod types {
    pub const BYTE: u16 = 1;
    pub const ASCII: u16 = 2;
    pub const SHORT: u16 = 3;
    pub const LONG: u16 = 4;
    pub const RATIONAL: u16 = 5;
    pub const SBYTE: u16 = 6;
    pub const UNDEFINED: u16 = 7;
    pub const SSHORT: u16 = 8;
    pub const SLONG: u16 = 9;
    pub const SRATIONAL: u16 = 10;
    pub const FLOAT: u16 = 11;
    pub const DOUBLE: u16 = 12;

    /// Size in bytes of one value of type `ty`
    pub fn size(ty: u16) -> Option<usize> {
        match ty {
            BYTE | ASCII | SBYTE | UNDEFINED => Some(1),
            SHORT | SSHORT => Some(2),
            LONG | SLONG | FLOAT => Some(4),
            RATIONAL | SRATIONAL | DOUBLE => Some(8),
            _ => None,
        }
    }
}

/// Tags whose values are offsets into data this codec does not carry over
const DROPPED_TAGS: &[u16] = &[
    tags::STRIP_OFFSETS,
    tags::TILE_OFFSETS,
    tags::SUB_IFDS,
    tags::JPEG_INTERCHANGE_FORMAT,
    tags::JPEG_INTERCHANGE_FORMAT_LENGTH,
    tags::INTEROPERABILITY_IFD_POINTER,
];

/// Maximum number of tags in an IFD (prevents DOS attacks)
const MAX_IFD_TAGS: u16 = 1000;

const TIFF_HEADER_SIZE: usize = 8;
const IFD_ENTRY_SIZE: usize = 12;

/// Produces EXIF APP1 payloads
///
/// Implementations receive the payload of the primary image's existing EXIF
/// APP1 segment (identifier included), if any, and the number of thumbnail
/// bytes that will be appended after the returned payload. The returned bytes
/// must start with [`EXIF_IDENTIFIER`] and point IFD1's thumbnail offset at
/// `len - 6`.
pub trait MetadataCodec: Send + Sync {
    fn synthesize_exif(
        &self,
        existing_app1: Option<&[u8]>,
        thumbnail_len: u32,
    ) -> Result<Vec<u8>, MetadataError>;
}

/// Default codec writing a compact TIFF structure
#[derive(Debug, Clone, Copy, Default)]
pub struct TiffExifCodec;

impl TiffExifCodec {
    pub fn new() -> Self {
        Self
    }
}

impl MetadataCodec for TiffExifCodec {
    fn synthesize_exif(
        &self,
        existing_app1: Option<&[u8]>,
        thumbnail_len: u32,
    ) -> Result<Vec<u8>, MetadataError> {
        let directories = match existing_app1.and_then(Directories::parse) {
            Some(dirs) => dirs,
            None => {
                if existing_app1.is_some() {
                    log::warn!("Existing APP1 is not readable EXIF, using default IFD0");
                } else {
                    log::warn!("Missing IFD0");
                }
                Directories::default_ifd0()
            }
        };

        let payload = directories.write(thumbnail_len)?;
        log::debug!(
            "Created EXIF data size: {}, thumbnail offset: {}",
            payload.len(),
            payload.len() - EXIF_IDENTIFIER.len()
        );
        Ok(payload)
    }
}

/// Byte order for reading and writing multi-byte values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endian {
    Little,
    Big,
}

impl Endian {
    fn read_u16(&self, data: &[u8]) -> u16 {
        match self {
            Endian::Little => LittleEndian::read_u16(data),
            Endian::Big => BigEndian::read_u16(data),
        }
    }

    fn read_u32(&self, data: &[u8]) -> u32 {
        match self {
            Endian::Little => LittleEndian::read_u32(data),
            Endian::Big => BigEndian::read_u32(data),
        }
    }

    fn u16_bytes(&self, value: u16) -> [u8; 2] {
        let mut buf = [0u8; 2];
        match self {
            Endian::Little => LittleEndian::write_u16(&mut buf, value),
            Endian::Big => BigEndian::write_u16(&mut buf, value),
        }
        buf
    }

    fn u32_bytes(&self, value: u32) -> [u8; 4] {
        let mut buf = [0u8; 4];
        match self {
            Endian::Little => LittleEndian::write_u32(&mut buf, value),
            Endian::Big => BigEndian::write_u32(&mut buf, value),
        }
        buf
    }

    fn marker(&self) -> &'static [u8; 2] {
        match self {
            Endian::Little => b"II",
            Endian::Big => b"MM",
        }
    }
}

/// One IFD entry with its value bytes resolved
///
/// `value` holds `count * size(ty)` bytes in the directory's byte order.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    tag: u16,
    ty: u16,
    count: u32,
    value: Vec<u8>,
}

impl Entry {
    fn short(order: Endian, tag: u16, value: u16) -> Self {
        Self {
            tag,
            ty: types::SHORT,
            count: 1,
            value: order.u16_bytes(value).to_vec(),
        }
    }

    fn long(order: Endian, tag: u16, value: u32) -> Self {
        Self {
            tag,
            ty: types::LONG,
            count: 1,
            value: order.u32_bytes(value).to_vec(),
        }
    }

    fn rational(order: Endian, tag: u16, numerator: u32, denominator: u32) -> Self {
        let mut value = order.u32_bytes(numerator).to_vec();
        value.extend_from_slice(&order.u32_bytes(denominator));
        Self {
            tag,
            ty: types::RATIONAL,
            count: 1,
            value,
        }
    }

    /// Bytes this entry needs outside the IFD (word aligned)
    fn external_size(&self) -> usize {
        if self.value.len() <= 4 {
            0
        } else {
            self.value.len() + (self.value.len() & 1)
        }
    }
}

/// Directories carried from the existing APP1 into the new one
#[derive(Debug, Clone)]
struct Directories {
    order: Endian,
    ifd0: Vec<Entry>,
    exif: Vec<Entry>,
    gps: Vec<Entry>,
}

impl Directories {
    /// Minimal IFD0 for images without EXIF
    fn default_ifd0() -> Self {
        let order = Endian::Big;
        Self {
            order,
            ifd0: vec![
                Entry::rational(order, tags::X_RESOLUTION, 72, 1),
                Entry::rational(order, tags::Y_RESOLUTION, 72, 1),
                Entry::short(order, tags::RESOLUTION_UNIT, 2),
                Entry::short(order, tags::Y_CB_CR_POSITIONING, 1),
            ],
            exif: Vec::new(),
            gps: Vec::new(),
        }
    }

    /// Read IFD0 and its sub-IFDs from an APP1 payload
    fn parse(app1: &[u8]) -> Option<Self> {
        let tiff = app1.strip_prefix(EXIF_IDENTIFIER)?;
        let (order, ifd0_offset) = read_header(tiff)?;

        let (mut ifd0, _) = read_ifd(tiff, ifd0_offset, order)?;

        let sub_ifd = |tag: u16| -> Vec<Entry> {
            ifd0.iter()
                .find(|e| e.tag == tag && e.value.len() == 4)
                .map(|e| order.read_u32(&e.value))
                .and_then(|offset| read_ifd(tiff, offset, order))
                .map(|(entries, _)| entries)
                .unwrap_or_default()
        };
        let exif = sub_ifd(tags::EXIF_IFD_POINTER);
        let gps = sub_ifd(tags::GPS_IFD_POINTER);

        let mut exif = exif;
        ifd0.retain(|e| {
            !DROPPED_TAGS.contains(&e.tag)
                && e.tag != tags::EXIF_IFD_POINTER
                && e.tag != tags::GPS_IFD_POINTER
        });
        exif.retain(|e| !DROPPED_TAGS.contains(&e.tag));

        log::debug!(
            "Loaded IFD0 with {} tags (exif: {}, gps: {})",
            ifd0.len(),
            exif.len(),
            gps.len()
        );

        Some(Self {
            order,
            ifd0,
            exif,
            gps,
        })
    }

    /// Serialize `Exif\0\0` + TIFF, with IFD1 pointing past the end
    fn write(mut self, thumbnail_len: u32) -> Result<Vec<u8>, MetadataError> {
        let order = self.order;

        // Pointer entries take part in sizing before their values are known
        if !self.exif.is_empty() {
            self.ifd0.push(Entry::long(order, tags::EXIF_IFD_POINTER, 0));
        }
        if !self.gps.is_empty() {
            self.ifd0.push(Entry::long(order, tags::GPS_IFD_POINTER, 0));
        }

        let mut ifd1 = vec![
            Entry::short(order, tags::COMPRESSION, 6),
            Entry::long(order, tags::JPEG_INTERCHANGE_FORMAT, 0),
            Entry::long(order, tags::JPEG_INTERCHANGE_FORMAT_LENGTH, thumbnail_len),
        ];

        for dir in [&mut self.ifd0, &mut self.exif, &mut self.gps, &mut ifd1] {
            dir.sort_by_key(|e| e.tag);
        }

        let ifd0_offset = TIFF_HEADER_SIZE;
        let exif_offset = ifd0_offset + directory_size(&self.ifd0);
        let gps_offset = exif_offset + optional_directory_size(&self.exif);
        let ifd1_offset = gps_offset + optional_directory_size(&self.gps);
        let tiff_len = ifd1_offset + directory_size(&ifd1);

        let to_u32 = |value: usize| {
            u32::try_from(value).map_err(|_| MetadataError::Oversized {
                size: EXIF_IDENTIFIER.len() + tiff_len,
            })
        };

        set_long(&mut self.ifd0, order, tags::EXIF_IFD_POINTER, to_u32(exif_offset)?);
        set_long(&mut self.ifd0, order, tags::GPS_IFD_POINTER, to_u32(gps_offset)?);
        // The thumbnail follows the payload, i.e. starts right after the TIFF data
        set_long(&mut ifd1, order, tags::JPEG_INTERCHANGE_FORMAT, to_u32(tiff_len)?);

        let mut tiff = Vec::with_capacity(tiff_len);
        tiff.extend_from_slice(order.marker());
        tiff.extend_from_slice(&order.u16_bytes(0x002A));
        tiff.extend_from_slice(&order.u32_bytes(to_u32(ifd0_offset)?));

        write_ifd(&mut tiff, order, &self.ifd0, to_u32(ifd1_offset)?)?;
        if !self.exif.is_empty() {
            write_ifd(&mut tiff, order, &self.exif, 0)?;
        }
        if !self.gps.is_empty() {
            write_ifd(&mut tiff, order, &self.gps, 0)?;
        }
        write_ifd(&mut tiff, order, &ifd1, 0)?;

        if tiff.len() != tiff_len {
            return Err(MetadataError::Codec(format!(
                "TIFF layout mismatch: wrote {} bytes, expected {}",
                tiff.len(),
                tiff_len
            )));
        }

        let mut payload = Vec::with_capacity(EXIF_IDENTIFIER.len() + tiff.len());
        payload.extend_from_slice(EXIF_IDENTIFIER);
        payload.extend_from_slice(&tiff);
        Ok(payload)
    }
}

fn directory_size(entries: &[Entry]) -> usize {
    2 + entries.len() * IFD_ENTRY_SIZE + 4 + entries.iter().map(Entry::external_size).sum::<usize>()
}

fn optional_directory_size(entries: &[Entry]) -> usize {
    if entries.is_empty() {
        0
    } else {
        directory_size(entries)
    }
}

fn set_long(entries: &mut [Entry], order: Endian, tag: u16, value: u32) {
    if let Some(entry) = entries.iter_mut().find(|e| e.tag == tag) {
        entry.value = order.u32_bytes(value).to_vec();
    }
}

/// Append an IFD followed by its out-of-line values
fn write_ifd(
    out: &mut Vec<u8>,
    order: Endian,
    entries: &[Entry],
    next: u32,
) -> Result<(), MetadataError> {
    let start = out.len();
    let count = u16::try_from(entries.len())
        .map_err(|_| MetadataError::Codec(format!("Too many IFD entries: {}", entries.len())))?;

    let mut data_offset = start + 2 + entries.len() * IFD_ENTRY_SIZE + 4;
    let mut data = Vec::new();

    out.extend_from_slice(&order.u16_bytes(count));
    for entry in entries {
        out.extend_from_slice(&order.u16_bytes(entry.tag));
        out.extend_from_slice(&order.u16_bytes(entry.ty));
        out.extend_from_slice(&order.u32_bytes(entry.count));

        if entry.value.len() <= 4 {
            let mut inline = [0u8; 4];
            inline[..entry.value.len()].copy_from_slice(&entry.value);
            out.extend_from_slice(&inline);
        } else {
            let offset = u32::try_from(data_offset)
                .map_err(|_| MetadataError::Oversized { size: data_offset })?;
            out.extend_from_slice(&order.u32_bytes(offset));
            data.extend_from_slice(&entry.value);
            if entry.value.len() & 1 == 1 {
                data.push(0);
            }
            data_offset += entry.external_size();
        }
    }
    out.extend_from_slice(&order.u32_bytes(next));
    out.extend_from_slice(&data);
    Ok(())
}

/// Parse the TIFF header, returning byte order and IFD0 offset
fn read_header(tiff: &[u8]) -> Option<(Endian, u32)> {
    if tiff.len() < TIFF_HEADER_SIZE {
        return None;
    }

    // Byte order: "II" (0x4949) = little endian, "MM" (0x4D4D) = big endian
    let order = match &tiff[0..2] {
        b"II" => Endian::Little,
        b"MM" => Endian::Big,
        _ => return None,
    };

    if order.read_u16(&tiff[2..4]) != 0x002A {
        return None;
    }

    Some((order, order.read_u32(&tiff[4..8])))
}

/// Read the IFD at `offset`, returning its entries and the next IFD offset
///
/// Entries whose values fall outside `tiff` or use unknown types are skipped.
fn read_ifd(tiff: &[u8], offset: u32, order: Endian) -> Option<(Vec<Entry>, u32)> {
    let offset = offset as usize;
    let count_end = offset.checked_add(2)?;
    if count_end > tiff.len() {
        return None;
    }

    let tag_count = order.read_u16(&tiff[offset..count_end]);
    if tag_count > MAX_IFD_TAGS {
        log::warn!("IFD at 0x{offset:x} claims {tag_count} tags, ignoring");
        return None;
    }

    let entries_end = count_end + usize::from(tag_count) * IFD_ENTRY_SIZE;
    if entries_end > tiff.len() {
        return None;
    }

    let mut entries = Vec::with_capacity(usize::from(tag_count));
    for raw in tiff[count_end..entries_end].chunks_exact(IFD_ENTRY_SIZE) {
        let tag = order.read_u16(&raw[0..2]);
        let ty = order.read_u16(&raw[2..4]);
        let count = order.read_u32(&raw[4..8]);

        let Some(len) = types::size(ty).and_then(|size| size.checked_mul(count as usize)) else {
            log::debug!("Skipping tag 0x{tag:04x} with type {ty}");
            continue;
        };

        let value = if len <= 4 {
            raw[8..8 + len].to_vec()
        } else {
            let start = order.read_u32(&raw[8..12]) as usize;
            match start.checked_add(len).filter(|&end| end <= tiff.len()) {
                Some(end) => tiff[start..end].to_vec(),
                None => {
                    log::warn!("Tag 0x{tag:04x} value out of bounds, skipping");
                    continue;
                }
            }
        };

        entries.push(Entry {
            tag,
            ty,
            count,
            value,
        });
    }

    let next = tiff
        .get(entries_end..entries_end + 4)
        .map(|b| order.read_u32(b))
        .unwrap_or(0);

    Some((entries, next))
}

/// Information about an embedded thumbnail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThumbnailInfo {
    /// Offset of thumbnail JPEG data relative to the TIFF header
    pub offset: u32,
    /// Size of thumbnail JPEG data in bytes
    pub size: u32,
}

/// Read IFD1's thumbnail tags from an APP1 payload (identifier included)
pub fn read_thumbnail_info(app1: &[u8]) -> Option<ThumbnailInfo> {
    let tiff = app1.strip_prefix(EXIF_IDENTIFIER)?;
    let (order, ifd0_offset) = read_header(tiff)?;
    let (_, ifd1_offset) = read_ifd(tiff, ifd0_offset, order)?;
    if ifd1_offset == 0 {
        return None;
    }

    let (ifd1, _) = read_ifd(tiff, ifd1_offset, order)?;
    let value = |tag: u16| -> Option<u32> {
        let entry = ifd1.iter().find(|e| e.tag == tag)?;
        match (entry.ty, entry.value.len()) {
            (types::SHORT, 2) => Some(u32::from(order.read_u16(&entry.value))),
            (types::LONG, 4) => Some(order.read_u32(&entry.value)),
            _ => None,
        }
    };

    Some(ThumbnailInfo {
        offset: value(tags::JPEG_INTERCHANGE_FORMAT)?,
        size: value(tags::JPEG_INTERCHANGE_FORMAT_LENGTH)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Little-endian APP1 with Make="Canon" in IFD0 and an Exif sub-IFD
    fn sample_app1() -> Vec<u8> {
        let order = Endian::Little;
        let dirs = Directories {
            order,
            ifd0: vec![Entry {
                tag: 0x010F,
                ty: types::ASCII,
                count: 6,
                value: b"Canon\0".to_vec(),
            }],
            exif: vec![Entry {
                tag: 0x9003,
                ty: types::ASCII,
                count: 20,
                value: b"2024:01:02 03:04:05\0".to_vec(),
            }],
            gps: Vec::new(),
        };
        dirs.write(0).unwrap()
    }

    #[test]
    fn test_byte_order() {
        let be = Endian::Big;
        let le = Endian::Little;

        assert_eq!(be.read_u16(&[0x12, 0x34]), 0x1234);
        assert_eq!(le.read_u16(&[0x34, 0x12]), 0x1234);

        assert_eq!(be.read_u32(&[0x12, 0x34, 0x56, 0x78]), 0x12345678);
        assert_eq!(le.read_u32(&[0x78, 0x56, 0x34, 0x12]), 0x12345678);

        assert_eq!(be.u32_bytes(0x12345678), [0x12, 0x34, 0x56, 0x78]);
        assert_eq!(le.u16_bytes(0x1234), [0x34, 0x12]);
    }

    #[test]
    fn test_default_payload_points_past_itself() {
        let payload = TiffExifCodec.synthesize_exif(None, 1234).unwrap();
        assert!(payload.starts_with(EXIF_IDENTIFIER));
        assert_eq!(&payload[6..8], b"MM");

        let info = read_thumbnail_info(&payload).unwrap();
        assert_eq!(info.offset as usize, payload.len() - 6);
        assert_eq!(info.size, 1234);
    }

    #[test]
    fn test_existing_ifd0_preserved() {
        let existing = sample_app1();
        let payload = TiffExifCodec.synthesize_exif(Some(&existing), 99).unwrap();

        // Byte order carried over
        assert_eq!(&payload[6..8], b"II");

        let dirs = Directories::parse(&payload).unwrap();
        let make = dirs.ifd0.iter().find(|e| e.tag == 0x010F).unwrap();
        assert_eq!(make.value, b"Canon\0");
        let original = dirs.exif.iter().find(|e| e.tag == 0x9003).unwrap();
        assert_eq!(original.value, b"2024:01:02 03:04:05\0");

        let info = read_thumbnail_info(&payload).unwrap();
        assert_eq!(info.offset as usize, payload.len() - 6);
        assert_eq!(info.size, 99);
    }

    #[test]
    fn test_thumbnail_length_does_not_change_layout() {
        let a = TiffExifCodec.synthesize_exif(None, 1).unwrap();
        let b = TiffExifCodec.synthesize_exif(None, 60000).unwrap();
        assert_eq!(a.len(), b.len());
    }

    #[test]
    fn test_garbage_app1_falls_back_to_default() {
        let payload = TiffExifCodec
            .synthesize_exif(Some(b"Exif\0\0garbage"), 10)
            .unwrap();
        let default = TiffExifCodec.synthesize_exif(None, 10).unwrap();
        assert_eq!(payload, default);
    }

    #[test]
    fn test_out_of_bounds_value_skipped() {
        // IFD0 with one ASCII tag pointing far outside the data
        let mut tiff = b"MM\x00\x2A\x00\x00\x00\x08".to_vec();
        tiff.extend_from_slice(&[0x00, 0x01]); // 1 entry
        tiff.extend_from_slice(&[0x01, 0x0F, 0x00, 0x02, 0x00, 0x00, 0x00, 0x20]);
        tiff.extend_from_slice(&[0x00, 0x00, 0xFF, 0x00]);
        tiff.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);

        let (entries, next) = read_ifd(&tiff, 8, Endian::Big).unwrap();
        assert!(entries.is_empty());
        assert_eq!(next, 0);
    }

    #[test]
    fn test_excessive_tag_count_rejected() {
        let mut tiff = b"MM\x00\x2A\x00\x00\x00\x08".to_vec();
        tiff.extend_from_slice(&[0xFF, 0xFF]);
        assert!(read_ifd(&tiff, 8, Endian::Big).is_none());
    }
}
