//! Shared helpers for integration tests

#![allow(dead_code)]

use bgremove_batch::{ImageAsset, LosslessFormat, UploadItem};
use image::{Rgb, RgbImage};

/// Opaque upload filled with a single colour, encoded as PNG
pub fn solid_upload(name: &str, width: u32, height: u32, color: [u8; 3]) -> UploadItem {
    let asset = ImageAsset::from_rgb(RgbImage::from_pixel(width, height, Rgb(color)));
    UploadItem::new(name, asset.encode(LosslessFormat::Png).unwrap())
}

/// Opaque upload with a horizontal gradient, so pixel identity is meaningful
pub fn gradient_upload(name: &str, width: u32, height: u32) -> UploadItem {
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) % 256) as u8])
    });
    UploadItem::new(name, ImageAsset::from_rgb(image).encode(LosslessFormat::Png).unwrap())
}

/// Bytes that no decoder accepts
pub fn corrupted_upload(name: &str) -> UploadItem {
    UploadItem::new(name, b"\x89PNG\r\n\x1a\nthis is not a real png".to_vec())
}

pub fn assert_close(actual: u8, expected: u8) {
    assert!(
        actual.abs_diff(expected) <= 1,
        "channel {actual} differs from {expected}"
    );
}
