#![no_main]

use jpeg_packer::{pack_round, Buffer, OutputFormat, Round, ThumbnailPolicy};
use jpeg_packer::jpeg::Mangler;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }

    // First byte picks format and policy, second splits primary from thumbnail
    let format = if data[0] & 1 == 0 {
        OutputFormat::Exif
    } else {
        OutputFormat::Jfif
    };
    let policy = if data[0] & 2 == 0 {
        ThumbnailPolicy::Truncate
    } else {
        ThumbnailPolicy::Reject
    };
    let rest = &data[2..];
    let split = (usize::from(data[1]) * rest.len()) / 256;

    let primary = Buffer::new(rest[split..].to_vec());
    let thumbnail = Buffer::new(rest[..split].to_vec());
    let round = Round::new(primary, vec![thumbnail]);

    let mangler = Mangler::new(format).with_thumbnail_policy(policy);
    if let Ok(packed) = pack_round(&round, &mangler) {
        // Packed output always starts with SOI and ends with EOI
        assert_eq!(&packed.data[..2], &[0xFF, 0xD8]);
        assert_eq!(&packed.data[packed.len() - 2..], &[0xFF, 0xD9]);
    }
});
