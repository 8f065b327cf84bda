// MIT License
// Copyright (c) 2025 Gianluca Cannata <gcannata23@gmail.com>
//
// av-gif-codec - A GIF decoder and encoder written in Rust
use std::time::Duration;

use gif::{Element, Encoder, GraphicsControlExtension, ImageDescriptor, PixelSource, Raster};

/// Procedural frame, anything implementing `PixelSource` can be encoded.
struct Gradient {
    width: u32,
    height: u32,
    shift: u32,
}

impl PixelSource for Gradient {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn argb(&self, x: u32, y: u32) -> u32 {
        0xFF00_0000 | ((x * 16 + self.shift) & 0xFF) << 16 | ((y * 16) & 0xFF) << 8 | 0x40
    }
}

fn encode(width: u16, height: u16, frames: &[(Raster, Option<Duration>)]) -> Vec<u8> {
    let mut encoder = Encoder::new(width, height, Vec::new()).unwrap();
    for (frame, delay) in frames {
        encoder.add_frame(frame, *delay).unwrap();
    }
    encoder.finish().unwrap()
}

fn rasters(elements: &[Element]) -> Vec<&Raster> {
    elements
        .iter()
        .filter_map(|e| match e {
            Element::Raster(r) => Some(r),
            _ => None,
        })
        .collect()
}

fn descriptors(elements: &[Element]) -> Vec<ImageDescriptor> {
    elements
        .iter()
        .filter_map(|e| match e {
            Element::ImageDescriptor(d) => Some(*d),
            _ => None,
        })
        .collect()
}

fn controls(elements: &[Element]) -> Vec<GraphicsControlExtension> {
    elements
        .iter()
        .filter_map(|e| match e {
            Element::GraphicsControlExtension(g) => Some(*g),
            _ => None,
        })
        .collect()
}

fn decode(gif: &[u8]) -> Vec<Element> {
    let elements: Vec<Element> = gif::decode(gif).collect();
    assert!(
        elements.iter().all(|e| e.diagnostic().is_none()),
        "unexpected diagnostics in {:?}",
        elements.iter().filter_map(|e| e.diagnostic()).collect::<Vec<_>>()
    );
    assert_eq!(elements.last(), Some(&Element::Trailer));
    elements
}

fn stripes(width: u16, height: u16, colors: &[u32]) -> Raster {
    let mut raster = Raster::new(width, height);
    for y in 0..height {
        for x in 0..width {
            raster.set(x, y, colors[(x as usize + y as usize) % colors.len()]);
        }
    }
    raster
}

#[test]
fn opaque_frames_decode_back() {
    let first = stripes(6, 4, &[0xFF11_2233, 0xFF44_5566, 0xFF77_8899]);
    let second = stripes(6, 4, &[0xFFAA_BBCC, 0xFF00_0000]);
    let gif = encode(6, 4, &[(first.clone(), None), (second.clone(), None)]);
    let elements = decode(&gif);

    let decoded = rasters(&elements);
    assert_eq!(decoded.len(), 2);
    for (raster, source) in decoded.iter().zip([first, second]) {
        assert_eq!((raster.width(), raster.height()), (6, 4));
        assert_eq!(raster.pixels(), source.pixels());
    }
}

#[test]
fn any_pixel_source_can_be_encoded() {
    let mut encoder = Encoder::new(8, 8, Vec::new()).unwrap();
    encoder
        .add_frame(&Gradient { width: 8, height: 8, shift: 0 }, None)
        .unwrap();
    let expected = encoder.previous_frame().clone();
    let elements = decode(&encoder.finish().unwrap());

    let decoded = rasters(&elements);
    assert_eq!(decoded.len(), 1);
    assert_eq!(decoded[0].pixels(), expected.pixels());
    assert_eq!(decoded[0].get(3, 2), 0xFF30_2040);
}

#[test]
fn alpha_is_thresholded() {
    let mut frame = stripes(2, 1, &[0x80FF_0000]);
    frame.set(1, 0, 0x7F00_FF00);
    let elements = decode(&encode(2, 1, &[(frame, None)]));

    let descriptor = descriptors(&elements)[0];
    assert_eq!((descriptor.width(), descriptor.height()), (1, 1));
    assert_eq!(rasters(&elements)[0].get(0, 0), 0xFFFF_0000);
}

#[test]
fn identical_frames_write_a_single_pixel() {
    let frame = stripes(5, 5, &[0xFF12_3456, 0xFF65_4321]);
    let elements = decode(&encode(
        5,
        5,
        &[(frame.clone(), None), (frame, Some(Duration::from_millis(40)))],
    ));

    let images = descriptors(&elements);
    assert_eq!(images.len(), 2);
    assert_eq!((images[1].width(), images[1].height()), (1, 1));
    assert_eq!(images[1].size_of_local_color_table(), 2);

    let control = controls(&elements)[1];
    assert_eq!(control.delay_time(), 4);
    assert_eq!(control.disposal_method(), 1);
    assert!(control.transparency_flag());
    assert_eq!(control.transparency_index(), 0);
}

#[test]
fn one_pixel_change_is_cropped_to_it() {
    let first = stripes(7, 3, &[0xFF00_0000]);
    let mut second = first.clone();
    second.set(4, 2, 0xFFFF_FFFF);
    let elements = decode(&encode(7, 3, &[(first, None), (second, None)]));

    let images = descriptors(&elements);
    assert_eq!(images.len(), 2);
    assert_eq!(
        (images[1].left(), images[1].top(), images[1].width(), images[1].height()),
        (4, 2, 1, 1)
    );
    assert_eq!(rasters(&elements)[1].get(0, 0), 0xFFFF_FFFF);
}

#[test]
fn many_colors_are_split_into_stacked_images() {
    let colors: Vec<u32> = (0..300).map(|i| 0xFF00_0000 | i * 0x0101).collect();
    let frame = Raster::from_pixels(30, 10, colors.clone()).unwrap();
    let elements = decode(&encode(30, 10, &[(frame, Some(Duration::from_millis(500)))]));

    let images = descriptors(&elements);
    assert_eq!(images.len(), 2);
    assert_eq!(images[0], images[1]);
    assert_eq!((images[0].width(), images[0].height()), (30, 10));
    assert_eq!(images[0].size_of_local_color_table(), 256);
    assert_eq!(images[1].size_of_local_color_table(), 64);

    let delays: Vec<u16> = controls(&elements).iter().map(|g| g.delay_time()).collect();
    assert_eq!(delays, vec![0, 50]);

    // each image only carries its own batch, the rest is the placeholder
    let decoded = rasters(&elements);
    assert_eq!(decoded[0].pixels()[254], colors[254]);
    assert_eq!(decoded[0].pixels()[255], 0xFFFF_00FF);
    assert_eq!(decoded[1].pixels()[255], colors[255]);
    assert_eq!(decoded[1].pixels()[0], 0xFFFF_00FF);
}

#[test]
fn repetitions_survive_the_round_trip() {
    let mut encoder = Encoder::new(1, 1, Vec::new()).unwrap();
    encoder.start_repetition(3).unwrap();
    encoder.add_frame(&stripes(1, 1, &[0xFF00_FF00]), None).unwrap();
    let elements = decode(&encoder.finish().unwrap());

    let repetitions = elements.iter().find_map(|e| match e {
        Element::ApplicationExtension(ext) => ext.netscape_repetitions(),
        _ => None,
    });
    assert_eq!(repetitions, Some(3));
    assert_eq!(controls(&elements)[0].delay_time(), 10);
}
