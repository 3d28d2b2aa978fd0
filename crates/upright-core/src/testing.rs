//! Synthetic page fixtures for unit tests.

use image::{DynamicImage, GrayImage, Luma};

const LINE_HEIGHT: u32 = 9;
const LINE_PITCH: u32 = 22;
const SIDE_MARGIN: u32 = 30;

/// A page of dark "words" on white, upright, with the given vertical margins.
pub(crate) fn text_page(width: u32, height: u32, top_margin: u32, bottom_margin: u32) -> DynamicImage {
    let mut img = GrayImage::from_pixel(width, height, Luma([255]));
    let mut seed = 0x2545_f491_u32;
    let mut next = move || {
        seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        (seed >> 16) & 0x7fff
    };

    let mut y = top_margin;
    while y + LINE_HEIGHT + bottom_margin <= height {
        let mut x = SIDE_MARGIN + next() % 12;
        while x < width - SIDE_MARGIN {
            let word = 12 + next() % 36;
            let end = (x + word).min(width - SIDE_MARGIN);
            for yy in y..y + LINE_HEIGHT {
                for xx in x..end {
                    img.put_pixel(xx, yy, Luma([25]));
                }
            }
            x = end + 8;
        }
        y += LINE_PITCH;
    }

    DynamicImage::ImageLuma8(img)
}

/// A page with nothing on it.
pub(crate) fn blank_page(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageLuma8(GrayImage::from_pixel(width, height, Luma([252])))
}

/// Minimal little-endian EXIF chunk holding only an orientation tag.
pub(crate) fn exif_chunk(orientation: u16) -> Vec<u8> {
    let mut chunk = b"II\x2a\x00\x08\x00\x00\x00".to_vec();
    chunk.extend_from_slice(&1u16.to_le_bytes());
    chunk.extend_from_slice(&0x0112u16.to_le_bytes());
    // SHORT, one value, padded to four bytes
    chunk.extend_from_slice(&3u16.to_le_bytes());
    chunk.extend_from_slice(&1u32.to_le_bytes());
    chunk.extend_from_slice(&orientation.to_le_bytes());
    chunk.extend_from_slice(&[0, 0]);
    chunk.extend_from_slice(&0u32.to_le_bytes());
    chunk
}
