//! JPEG segment handling: parse, mangle, recombine

mod mangle;
mod parse;
mod recombine;

pub use mangle::{mangle, Mangler};
pub use parse::{parse, ParseOutput, PrimaryImage, Role};
pub use recombine::recombine;

// JPEG markers
pub const SOI: u8 = 0xD8; // Start of Image
pub const EOI: u8 = 0xD9; // End of Image
pub const SOS: u8 = 0xDA; // Start of Scan (image data follows)
pub const APP0: u8 = 0xE0; // JFIF / JFXX
pub const APP1: u8 = 0xE1; // EXIF / XMP

// Special markers without length
pub const TEM: u8 = 0x01;
pub const RST0: u8 = 0xD0;
pub const RST7: u8 = 0xD7;

/// Minimum buffer that can hold SOI, EOI and one more marker byte
pub const MIN_BUFFER_SIZE: usize = 5;

/// True for markers that are not followed by a length field
pub fn is_standalone(marker: u8) -> bool {
    matches!(marker, SOI | EOI | TEM | RST0..=RST7)
}

/// Get human-readable label for a JPEG marker
pub fn marker_label(marker: u8) -> &'static str {
    match marker {
        0xD8 => "SOI",
        0xD9 => "EOI",
        0xDA => "SOS",
        0xDB => "DQT",
        0xC0 => "SOF0",
        0xC2 => "SOF2",
        0xC4 => "DHT",
        0xDD => "DRI",
        0xFE => "COM",
        0xD0..=0xD7 => "RST",
        0xE0 => "APP0",
        0xE1 => "APP1",
        0xE2 => "APP2",
        0xE3 => "APP3",
        0xE4 => "APP4",
        0xE5 => "APP5",
        0xE6 => "APP6",
        0xE7 => "APP7",
        0xE8 => "APP8",
        0xE9 => "APP9",
        0xEA => "APP10",
        0xEB => "APP11",
        0xEC => "APP12",
        0xED => "APP13",
        0xEE => "APP14",
        0xEF => "APP15",
        _ => "OTHER",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standalone_markers() {
        assert!(is_standalone(SOI));
        assert!(is_standalone(EOI));
        assert!(is_standalone(0xD3));
        assert!(!is_standalone(SOS));
        assert!(!is_standalone(APP0));
        assert!(!is_standalone(0xDB));
    }

    #[test]
    fn test_marker_labels() {
        assert_eq!(marker_label(APP1), "APP1");
        assert_eq!(marker_label(0xD5), "RST");
        assert_eq!(marker_label(0x42), "OTHER");
    }
}
