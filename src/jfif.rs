//! JFIF APP0 and JFXX thumbnail extension payloads

/// Identifier of the JFIF APP0 segment
pub const JFIF_IDENTIFIER: &[u8] = b"JFIF\0";

/// Identifier of the JFXX extension APP0 segment
pub const JFXX_IDENTIFIER: &[u8] = b"JFXX\0";

/// JFXX extension code for JPEG-compressed thumbnails
pub const JFXX_JPEG_THUMBNAIL: u8 = 0x10;

/// Size of the JFIF APP0 payload written by [`jfif_payload`]
pub const JFIF_PAYLOAD_SIZE: usize = 14;

/// Size of the JFXX header preceding the thumbnail bytes
pub const JFXX_HEADER_SIZE: usize = 6;

/// Density units of a JFIF header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum DensityUnits {
    /// Pixel aspect ratio only
    #[default]
    None = 0,
    DotsPerInch = 1,
    DotsPerCm = 2,
}

/// Fields of a JFIF APP0 header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JfifHeader {
    pub version: (u8, u8),
    pub units: DensityUnits,
    pub x_density: u16,
    pub y_density: u16,
}

impl Default for JfifHeader {
    fn default() -> Self {
        Self {
            version: (1, 2),
            units: DensityUnits::None,
            x_density: 1,
            y_density: 1,
        }
    }
}

impl JfifHeader {
    /// Serialize without an embedded RGB thumbnail
    pub fn to_payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(JFIF_PAYLOAD_SIZE);
        payload.extend_from_slice(JFIF_IDENTIFIER);
        payload.push(self.version.0);
        payload.push(self.version.1);
        payload.push(self.units as u8);
        payload.extend_from_slice(&self.x_density.to_be_bytes());
        payload.extend_from_slice(&self.y_density.to_be_bytes());
        // No uncompressed thumbnail
        payload.push(0);
        payload.push(0);
        payload
    }
}

/// Default JFIF 1.02 APP0 payload: aspect ratio 1:1, no thumbnail
pub fn jfif_payload() -> Vec<u8> {
    JfifHeader::default().to_payload()
}

/// JFXX header announcing a JPEG thumbnail; the thumbnail bytes follow it
pub fn jfxx_header() -> Vec<u8> {
    let mut header = Vec::with_capacity(JFXX_HEADER_SIZE);
    header.extend_from_slice(JFXX_IDENTIFIER);
    header.push(JFXX_JPEG_THUMBNAIL);
    header
}
