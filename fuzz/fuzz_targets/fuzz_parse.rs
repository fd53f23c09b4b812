#![no_main]

use bytes::Bytes;
use jpeg_packer::jpeg::{parse, recombine, Role};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Any input must parse to a value or an error, never panic
    let buffer = Bytes::copy_from_slice(data);

    let _ = parse(&buffer, Role::Secondary);

    if let Ok(output) = parse(&buffer, Role::Primary) {
        if let Some(image) = output.into_primary() {
            // Parsed sequences always end with EOI, synthesized if missing
            assert_eq!(image.sequence.last_marker(), Some(0xD9));
            let _ = recombine(&image.sequence, &image.scan, None);
        }
    }
});
