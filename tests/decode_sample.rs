// MIT License
// Copyright (c) 2025 Gianluca Cannata <gcannata23@gmail.com>
//
// av-gif-codec - A GIF decoder and encoder written in Rust
use gif::{ContextValue, DecodeIssue, Element};

const BLACK: u32 = 0xFF00_0000;
const WHITE: u32 = 0xFFFF_FFFF;

/// 3x5 black and white sample: 256 color global table, one graphics
/// control extension, one image.
fn sample() -> Vec<u8> {
    let mut gif = b"GIF89a".to_vec();
    gif.extend_from_slice(&[0x03, 0x00, 0x05, 0x00, 0xF7, 0x00, 0x00]);

    let mut table = [0u8; 768];
    table[3] = 0x80;
    table[765..].copy_from_slice(&[0xFF, 0xFF, 0xFF]);
    gif.extend_from_slice(&table);

    gif.extend_from_slice(&[0x21, 0xF9, 0x04, 0x01, 0x00, 0x00, 0x10, 0x00]);
    gif.extend_from_slice(&[0x2C, 0x00, 0x00, 0x00, 0x00, 0x03, 0x00, 0x05, 0x00, 0x00]);
    gif.extend_from_slice(&[
        0x08, 0x0B, 0x00, 0x51, 0xFC, 0x1B, 0x28, 0x70, 0xA0, 0xC1, 0x83, 0x01, 0x01, 0x00,
    ]);
    gif.push(0x3B);
    gif
}

const TABLE_END: usize = 13 + 768;

fn collect(gif: &[u8]) -> Vec<Element> {
    gif::decode(gif).collect()
}

#[test]
fn sample_decodes_to_seven_elements() {
    let elements = collect(&sample());
    let names: Vec<&str> = elements.iter().map(|e| e.name()).collect();
    assert_eq!(
        names,
        vec![
            "Header",
            "LogicalScreenDescriptor",
            "GlobalColorTable",
            "GraphicsControlExtension",
            "ImageDescriptor",
            "Raster",
            "Trailer",
        ]
    );

    match &elements[0] {
        Element::Header(header) => assert_eq!(header.version(), "89a"),
        other => panic!("unexpected {:?}", other),
    }

    match &elements[1] {
        Element::LogicalScreenDescriptor(screen) => {
            assert_eq!((screen.width(), screen.height()), (3, 5));
            assert!(screen.global_color_table_flag());
            assert_eq!(screen.size_of_global_color_table(), 256);
            assert_eq!(screen.color_resolution(), 8);
            assert_eq!(screen.pixel_aspect_ratio(), None);
        }
        other => panic!("unexpected {:?}", other),
    }

    match &elements[3] {
        Element::GraphicsControlExtension(gce) => {
            assert!(gce.transparency_flag());
            assert_eq!(gce.transparency_index(), 16);
            assert_eq!(gce.delay_time(), 0);
            assert_eq!(gce.disposal_method(), 0);
        }
        other => panic!("unexpected {:?}", other),
    }

    match &elements[4] {
        Element::ImageDescriptor(descriptor) => {
            assert!(!descriptor.local_color_table_flag());
            assert_eq!(descriptor.pixel_count(), 15);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn sample_pixel_grid() {
    let raster = collect(&sample())
        .into_iter()
        .find_map(|e| match e {
            Element::Raster(raster) => Some(raster),
            _ => None,
        })
        .unwrap();

    assert_eq!((raster.width(), raster.height()), (3, 5));
    let rows: Vec<Vec<u32>> = (0..5)
        .map(|y| (0..3).map(|x| raster.get(x, y)).collect())
        .collect();
    assert_eq!(
        rows,
        vec![
            vec![BLACK, WHITE, WHITE],
            vec![WHITE, BLACK, WHITE],
            vec![WHITE, WHITE, WHITE],
            vec![WHITE, WHITE, WHITE],
            vec![WHITE, WHITE, WHITE],
        ]
    );
}

#[test]
fn truncated_inside_global_table() {
    let gif = sample();
    let elements = collect(&gif[..TABLE_END - 100]);

    assert_eq!(elements.len(), 3);
    assert_eq!(elements.iter().filter(|e| e.is_error()).count(), 1);
    let diagnostic = elements[2].diagnostic().unwrap();
    assert!(elements[2].is_error());
    assert_eq!(diagnostic.issue, DecodeIssue::TruncatedGlobalColorTable);
    assert_eq!(diagnostic.context("Read"), Some(&ContextValue::Number(668)));
    assert_eq!(diagnostic.context("Expected"), Some(&ContextValue::Number(768)));
}

#[test]
fn truncated_after_global_table() {
    let gif = sample();
    let elements = collect(&gif[..TABLE_END]);

    assert_eq!(elements.len(), 4);
    assert_eq!(elements.iter().filter(|e| e.is_error()).count(), 1);
    assert_eq!(
        elements[3].diagnostic().map(|d| &d.issue),
        Some(&DecodeIssue::EndOfStream)
    );
}

#[test]
fn truncated_screen_descriptor() {
    let elements = collect(&sample()[..9]);
    assert_eq!(elements.len(), 2);
    let diagnostic = elements[1].diagnostic().unwrap();
    assert_eq!(diagnostic.issue, DecodeIssue::TruncatedLogicalScreenDescriptor);
    assert_eq!(diagnostic.context("Read"), Some(&ContextValue::Number(3)));
}

#[test]
fn truncated_image_data() {
    let gif = sample();
    let elements = collect(&gif[..gif.len() - 5]);
    let last = elements.last().unwrap();
    assert!(last.is_error());
    assert_eq!(last.diagnostic().unwrap().issue, DecodeIssue::TruncatedImageData);
    assert!(!elements.iter().any(|e| matches!(e, Element::Raster(_))));
}

#[test]
fn code_outside_table_is_fatal() {
    let mut gif = sample();
    // first code after Clear becomes 0x1FF, far past the 258 entry table
    let data = TABLE_END + 8 + 10 + 2;
    gif[data + 1] = 0xFF;
    gif[data + 2] = 0xFF;

    let elements = collect(&gif);
    let last = elements.last().unwrap();
    assert!(last.is_error());
    let diagnostic = last.diagnostic().unwrap();
    assert_eq!(diagnostic.issue, DecodeIssue::CodeOutOfRange);
    assert_eq!(diagnostic.context("CodeCount"), Some(&ContextValue::Number(258)));
}

#[test]
fn malformed_graphics_control_is_skipped() {
    let mut gif = sample();
    // graphics control data cut down to 3 bytes
    let start = TABLE_END;
    gif.splice(start..start + 8, [0x21, 0xF9, 0x03, 0x01, 0x00, 0x00, 0x00]);

    let elements = collect(&gif);
    let warning = &elements[3];
    assert!(warning.is_warning());
    assert_eq!(
        warning.diagnostic().unwrap().issue,
        DecodeIssue::IgnoringGraphicsControlExtension(3)
    );
    assert_eq!(elements.last(), Some(&Element::Trailer));
    assert!(elements.iter().any(|e| matches!(e, Element::Raster(_))));
}

#[test]
fn unknown_block_ends_decoding() {
    let mut gif = sample();
    let trailer = gif.len() - 1;
    gif[trailer] = 0x00;

    let elements = collect(&gif);
    assert_eq!(elements.len(), 7);
    let diagnostic = elements[6].diagnostic().unwrap();
    assert_eq!(diagnostic.issue, DecodeIssue::UnsupportedBlock(0x00));
    assert_eq!(diagnostic.context("Separator"), Some(&ContextValue::Number(0)));
}

#[test]
fn nothing_follows_an_error() {
    let mut decoder = gif::decode(&b"GIF89"[..]);
    assert!(decoder.next().unwrap().is_error());
    assert_eq!(decoder.next(), None);
}
