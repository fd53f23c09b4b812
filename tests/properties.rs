// Property tests over synthetic JPEG streams

use bytes::Bytes;
use jpeg_packer::{
    jpeg::{parse, recombine, Mangler, Role, APP0, APP1, EOI, SOI},
    test_utils::{build_jpeg, sample_thumbnail},
    tiff::{read_thumbnail_info, EXIF_IDENTIFIER},
    OutputFormat, ThumbnailPolicy, MAX_SEGMENT_LENGTH,
};
use proptest::prelude::*;

/// Markers that carry a length field and may appear before SOS
const MARKERS: &[u8] = &[0xC0, 0xC4, 0xDB, 0xDD, 0xE0, 0xE1, 0xE2, 0xED, 0xFE];

fn segments() -> impl Strategy<Value = Vec<(u8, Vec<u8>)>> {
    prop::collection::vec(
        (
            prop::sample::select(MARKERS),
            prop::collection::vec(any::<u8>(), 0..300),
        ),
        0..8,
    )
}

fn format() -> impl Strategy<Value = OutputFormat> {
    prop_oneof![Just(OutputFormat::Exif), Just(OutputFormat::Jfif)]
}

fn jpeg(segments: &[(u8, Vec<u8>)], scan: &[u8]) -> Bytes {
    let refs: Vec<(u8, &[u8])> = segments.iter().map(|(m, p)| (*m, p.as_slice())).collect();
    Bytes::from(build_jpeg(&refs, scan))
}

proptest! {
    #[test]
    fn prop_roundtrip_framing(
        segments in segments(),
        scan in prop::collection::vec(any::<u8>(), 0..512),
    ) {
        let data = jpeg(&segments, &scan);
        let image = parse(&data, Role::Primary).unwrap().into_primary().unwrap();
        prop_assert_eq!(image.sequence.len(), segments.len() + 3);

        let out = recombine(&image.sequence, &image.scan, None).unwrap();
        prop_assert_eq!(out, data);
    }

    #[test]
    fn prop_mangled_sequence_invariants(
        segments in segments(),
        format in format(),
        thumbnail_len in prop::option::of(6usize..80_000),
    ) {
        let data = jpeg(&segments, b"scan");
        let image = parse(&data, Role::Primary).unwrap().into_primary().unwrap();
        let thumb_bytes = thumbnail_len.map(|len| Bytes::from(sample_thumbnail(len)));
        let thumbnail = thumb_bytes
            .as_ref()
            .and_then(|b| parse(b, Role::Secondary).unwrap().into_thumbnail());

        let sequence = Mangler::new(format)
            .mangle(image.sequence, thumbnail.as_ref())
            .unwrap();

        // Ordering
        prop_assert_eq!(sequence.first_marker(), Some(SOI));
        prop_assert_eq!(sequence.last_marker(), Some(EOI));

        for segment in &sequence {
            // Length field consistency and size ceiling
            prop_assert!(segment.is_length_consistent());
            if segment.data.is_owned() {
                prop_assert!(segment.wire_size() - 2 <= MAX_SEGMENT_LENGTH);
            }
        }

        // No cross-contamination
        match format {
            OutputFormat::Exif => prop_assert_eq!(sequence.count(APP0), 0),
            OutputFormat::Jfif => prop_assert_eq!(sequence.count(APP1), 0),
        }

        let out = recombine(&sequence, &image.scan, thumbnail.as_ref()).unwrap();
        prop_assert_eq!(&out[..2], &[0xFF, 0xD8]);
        prop_assert_eq!(&out[out.len() - 2..], &[0xFF, 0xD9]);
    }

    #[test]
    fn prop_exif_offset_matches_metadata(thumbnail_len in 6usize..70_000) {
        let data = jpeg(&[], b"scan");
        let thumb_bytes = Bytes::from(sample_thumbnail(thumbnail_len));
        let image = parse(&data, Role::Primary).unwrap().into_primary().unwrap();
        let thumbnail = parse(&thumb_bytes, Role::Secondary).unwrap().into_thumbnail();

        let sequence = Mangler::new(OutputFormat::Exif)
            .with_thumbnail_policy(ThumbnailPolicy::Truncate)
            .mangle(image.sequence, thumbnail.as_ref())
            .unwrap();
        let app1 = &sequence.segments[1];
        prop_assert!(app1.has_identifier(EXIF_IDENTIFIER));

        let info = read_thumbnail_info(app1.payload()).unwrap();
        prop_assert_eq!(info.offset as usize, app1.payload().len() - 6);
        prop_assert_eq!(info.size as usize, app1.thumbnail_len);
        prop_assert!(app1.thumbnail_len <= thumbnail_len);
    }
}
