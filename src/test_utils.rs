//! Test utilities: synthetic JPEG streams and a test logger.
//!
//! The builders produce small, structurally valid JPEG byte streams. They are
//! not decodable images; only the segment framing is realistic.
//!
//! # Usage
//!
//! ```
//! use jpeg_packer::test_utils::*;
//!
//! let primary = sample_primary();
//! let thumbnail = sample_thumbnail(256);
//! assert!(primary.len() > thumbnail.len());
//! ```

/// APP0 JFIF 1.01 payload found in camera output
pub const JFIF_APP0: &[u8] = b"JFIF\0\x01\x01\x00\x00\x01\x00\x01\x00\x00";

/// APP1 EXIF payload: big-endian IFD0 holding only Orientation = 6
pub const EXIF_APP1: &[u8] = &[
    b'E', b'x', b'i', b'f', 0, 0, // identifier
    b'M', b'M', 0x00, 0x2A, 0x00, 0x00, 0x00, 0x08, // TIFF header
    0x00, 0x01, // one entry
    0x01, 0x12, 0x00, 0x03, 0x00, 0x00, 0x00, 0x01, 0x00, 0x06, 0x00, 0x00, // Orientation
    0x00, 0x00, 0x00, 0x00, // no IFD1
];

/// APP1 XMP payload
pub const XMP_APP1: &[u8] = b"http://ns.adobe.com/xap/1.0/\0<x:xmpmeta/>";

/// SOS header for a single-component baseline scan
pub const SOS_HEADER: &[u8] = &[0x01, 0x01, 0x00, 0x00, 0x3F, 0x00];

/// Minimal DQT payload (table 0, all ones)
const DQT: [u8; 65] = {
    let mut table = [1u8; 65];
    table[0] = 0;
    table
};

/// Minimal SOF0 payload: 8-bit, 16x16, one component
const SOF0: &[u8] = &[0x08, 0x00, 0x10, 0x00, 0x10, 0x01, 0x01, 0x11, 0x00];

/// Install an `env_logger` that captures output per test
///
/// Available to unit tests and with the `test-logger` feature.
#[cfg(any(test, feature = "test-logger"))]
pub fn logger() {
    _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::max())
        .format_file(true)
        .format_line_number(true)
        .try_init();
}

/// Bytes that never contain 0xFF, so no accidental markers appear
pub fn filler(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// SOI, the given `(marker, payload)` segments, SOS with `scan`, EOI
///
/// # Panics
/// If a payload does not fit a segment length field.
pub fn build_jpeg(segments: &[(u8, &[u8])], scan: &[u8]) -> Vec<u8> {
    let mut out = vec![0xFF, 0xD8];
    for (marker, payload) in segments {
        push_segment(&mut out, *marker, payload);
    }
    push_segment(&mut out, 0xDA, SOS_HEADER);
    out.extend_from_slice(scan);
    out.extend_from_slice(&[0xFF, 0xD9]);
    out
}

fn push_segment(out: &mut Vec<u8>, marker: u8, payload: &[u8]) {
    let length = u16::try_from(payload.len() + 2).expect("segment payload too large");
    out.extend_from_slice(&[0xFF, marker]);
    out.extend_from_slice(&length.to_be_bytes());
    out.extend_from_slice(payload);
}

/// Primary image with JFIF, DQT and SOF0 segments and 1 KiB of scan data
pub fn sample_primary() -> Vec<u8> {
    build_jpeg(
        &[(0xE0, JFIF_APP0), (0xDB, &DQT), (0xC0, SOF0)],
        &filler(1024),
    )
}

/// Primary image carrying EXIF and XMP APP1 segments
pub fn sample_primary_with_exif() -> Vec<u8> {
    build_jpeg(
        &[
            (0xE1, EXIF_APP1),
            (0xE1, XMP_APP1),
            (0xDB, &DQT),
            (0xC0, SOF0),
        ],
        &filler(1024),
    )
}

/// [`sample_primary`] with its EOI marker cut off
pub fn primary_without_eoi() -> Vec<u8> {
    let mut data = sample_primary();
    data.truncate(data.len() - 2);
    data
}

/// Opaque thumbnail stream of exactly `len` bytes (at least 6)
pub fn sample_thumbnail(len: usize) -> Vec<u8> {
    let len = len.max(6);
    let mut out = vec![0xFF, 0xD8];
    out.extend(filler(len - 4).into_iter().map(|b| b + 1));
    out.extend_from_slice(&[0xFF, 0xD9]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_jpeg_framing() {
        let data = build_jpeg(&[(0xE0, b"ab")], b"xyz");
        assert_eq!(
            data,
            vec![
                0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x04, b'a', b'b', 0xFF, 0xDA, 0x00, 0x08, 0x01,
                0x01, 0x00, 0x00, 0x3F, 0x00, b'x', b'y', b'z', 0xFF, 0xD9
            ]
        );
    }

    #[test]
    fn test_samples_have_no_stray_markers() {
        assert!(!filler(4096).contains(&0xFF));
        let thumb = sample_thumbnail(100);
        assert_eq!(thumb.len(), 100);
        assert!(!thumb[2..98].contains(&0xFF));
        assert_eq!(sample_thumbnail(1).len(), 6);
    }

    #[test]
    fn test_primary_without_eoi() {
        let data = primary_without_eoi();
        assert_ne!(&data[data.len() - 2..], &[0xFF, 0xD9]);
    }
}
