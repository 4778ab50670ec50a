//! Shared test utilities.
//!
//! Synthetic images with known pixel values, so tests can assert exact
//! results without fixture files.

use crate::imaging::Pixels;
use image::{GrayImage, Luma, Rgb, RgbImage};

fn ramp(pos: u32, len: u32) -> u8 {
    (pos * 255 / len.saturating_sub(1).max(1)) as u8
}

/// Diagonal ramp: black at the top-left corner, white at the bottom-right.
pub fn gradient_grey(width: u32, height: u32) -> Pixels {
    let span = width + height - 1;
    Pixels::Grey(GrayImage::from_fn(width, height, |x, y| {
        Luma([ramp(x + y, span)])
    }))
}

/// Red ramps left to right, green top to bottom, blue is their complement.
pub fn gradient_rgb(width: u32, height: u32) -> Pixels {
    Pixels::Rgb(RgbImage::from_fn(width, height, |x, y| {
        let r = ramp(x, width);
        let g = ramp(y, height);
        Rgb([r, g, 255 - r / 2 - g / 2])
    }))
}

/// Black image with one white pixel at `(x, y)`.
pub fn single_dot(width: u32, height: u32, x: u32, y: u32) -> Pixels {
    let mut img = GrayImage::new(width, height);
    img.put_pixel(x, y, Luma([255]));
    Pixels::Grey(img)
}
