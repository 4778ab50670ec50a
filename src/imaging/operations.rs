//! Pixel operations.
//!
//! Each function takes a container by reference and returns a new one; the
//! input is never modified. Operations that are a no-op for their arguments
//! return a clone that shares the input's pixel buffer, so callers can detect
//! the pass-through with [`ImageContainer::same_instance`].
//!
//! Multi-channel images are processed per channel except where noted.

use super::calculations::{
    RotationFrame, box_kernel, clip_to_bounds, gaussian_kernel, region_to_pixels,
};
use super::container::{ImageContainer, Pixels};
use super::params::Region;
use image::{GrayImage, Luma, Rgb};
use imageproc::filter::separable_filter_equal;
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};

/// Extract the sub-rectangle `region`, clipped to the image.
///
/// A rectangle with no area left after clipping is a degenerate selection:
/// it is logged and the input is returned unchanged.
pub fn crop(image: &ImageContainer, region: Region) -> ImageContainer {
    let rect = region_to_pixels(region, image.width(), image.height());
    let Some((x, y, w, h)) = clip_to_bounds(rect, image.width(), image.height()) else {
        log::warn!(
            "Ignoring empty crop {:?} on {}x{} image",
            rect,
            image.width(),
            image.height()
        );
        return image.clone();
    };
    if (x, y, w, h) == (0, 0, image.width(), image.height()) {
        return image.clone();
    }
    let pixels = match image.pixels() {
        Pixels::Grey(img) => Pixels::Grey(image::imageops::crop_imm(img, x, y, w, h).to_image()),
        Pixels::Rgb(img) => Pixels::Rgb(image::imageops::crop_imm(img, x, y, w, h).to_image()),
    };
    image.with_pixels(pixels)
}

/// Rotate counter-clockwise by `angle` degrees onto an expanded canvas.
///
/// Uncovered canvas area is black. An angle of 0 returns the input.
pub fn rotate(image: &ImageContainer, angle: f64) -> ImageContainer {
    if angle == 0.0 {
        return image.clone();
    }
    let frame = RotationFrame::new(image.width() as f64, image.height() as f64, angle);
    let Some(projection) = Projection::from_matrix(frame.as_projective()) else {
        log::warn!("Rotation by {angle} is not invertible, leaving image unchanged");
        return image.clone();
    };
    let pixels = match image.pixels() {
        Pixels::Grey(img) => {
            let mut out = GrayImage::new(frame.width, frame.height);
            warp_into(img, &projection, Interpolation::Bilinear, Luma([0]), &mut out);
            Pixels::Grey(out)
        }
        Pixels::Rgb(img) => {
            let mut out = image::RgbImage::new(frame.width, frame.height);
            warp_into(img, &projection, Interpolation::Bilinear, Rgb([0, 0, 0]), &mut out);
            Pixels::Rgb(out)
        }
    };
    image.with_pixels(pixels)
}

/// Binarize: samples above `value` become 255, the rest 0.
pub fn threshold(image: &ImageContainer, value: u8) -> ImageContainer {
    map_samples(image, |p| if p > value { 255 } else { 0 })
}

/// `p → 255 − p` on every sample.
pub fn invert(image: &ImageContainer) -> ImageContainer {
    map_samples(image, |p| 255 - p)
}

/// Collapse RGB to one channel using the ITU-R BT.601 luma weights.
pub fn greyscale(image: &ImageContainer) -> ImageContainer {
    match image.pixels() {
        Pixels::Grey(_) => image.clone(),
        Pixels::Rgb(img) => image.with_pixels(Pixels::Grey(luma(img))),
    }
}

fn luma(img: &image::RgbImage) -> GrayImage {
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let Rgb([r, g, b]) = *img.get_pixel(x, y);
        // 14-bit fixed point of 0.299, 0.587, 0.114
        let v = (r as u32 * 4899 + g as u32 * 9617 + b as u32 * 1868 + (1 << 13)) >> 14;
        Luma([v as u8])
    })
}

/// Grow bright regions: max over a `(2r+1)²` square, `iterations` times.
pub fn dilate(image: &ImageContainer, radius: u32, iterations: u32) -> ImageContainer {
    morph(image, radius, iterations, u8::max)
}

/// Shrink bright regions: min over a `(2r+1)²` square, `iterations` times.
pub fn erode(image: &ImageContainer, radius: u32, iterations: u32) -> ImageContainer {
    morph(image, radius, iterations, u8::min)
}

/// Erode then dilate, removing bright specks smaller than the window.
pub fn opening(image: &ImageContainer, radius: u32, iterations: u32) -> ImageContainer {
    dilate(&erode(image, radius, iterations), radius, iterations)
}

/// Dilate then erode, filling dark gaps smaller than the window.
pub fn closing(image: &ImageContainer, radius: u32, iterations: u32) -> ImageContainer {
    erode(&dilate(image, radius, iterations), radius, iterations)
}

/// Gaussian blur with a `2r+1` kernel and `sigma = 0.3(r − 1) + 0.8`.
pub fn gaussian_blur(image: &ImageContainer, radius: u32) -> ImageContainer {
    if radius < 1 {
        return image.clone();
    }
    let kernel = gaussian_kernel(radius);
    let pixels = match image.pixels() {
        Pixels::Grey(img) => Pixels::Grey(separable_filter_equal(img, &kernel)),
        Pixels::Rgb(img) => Pixels::Rgb(separable_filter_equal(img, &kernel)),
    };
    image.with_pixels(pixels)
}

/// Threshold each pixel against the mean of its `(2r+1)²` neighbourhood minus `c`.
///
/// The neighbourhood mean is a box average when `use_mean` is set and a
/// Gaussian-weighted average otherwise. Colour input is converted to
/// greyscale first. The result is always single-channel.
pub fn adaptive_threshold(
    image: &ImageContainer,
    use_mean: bool,
    radius: u32,
    c: f64,
) -> ImageContainer {
    let grey = match image.pixels() {
        Pixels::Grey(img) => img.clone(),
        Pixels::Rgb(img) => luma(img),
    };
    let kernel = if use_mean {
        box_kernel(radius)
    } else {
        gaussian_kernel(radius)
    };
    let mean = local_mean(&grey, &kernel);
    let width = grey.width() as usize;
    let out = GrayImage::from_fn(grey.width(), grey.height(), |x, y| {
        let src = grey.get_pixel(x, y)[0] as f64;
        let m = mean[y as usize * width + x as usize].round() as f64;
        Luma([if src > m - c { 255 } else { 0 }])
    });
    image.with_pixels(Pixels::Grey(out))
}

/// Separable weighted average with edge samples replicated.
fn local_mean(grey: &GrayImage, kernel: &[f32]) -> Vec<f32> {
    let (w, h) = (grey.width() as i64, grey.height() as i64);
    let r = (kernel.len() / 2) as i64;
    let src = grey.as_raw();
    let mut rows = vec![0f32; src.len()];
    for y in 0..h {
        for x in 0..w {
            rows[(y * w + x) as usize] = (-r..=r)
                .map(|k| {
                    let sx = (x + k).clamp(0, w - 1);
                    src[(y * w + sx) as usize] as f32 * kernel[(k + r) as usize]
                })
                .sum();
        }
    }
    let mut out = vec![0f32; src.len()];
    for y in 0..h {
        for x in 0..w {
            out[(y * w + x) as usize] = (-r..=r)
                .map(|k| {
                    let sy = (y + k).clamp(0, h - 1);
                    rows[(sy * w + x) as usize] * kernel[(k + r) as usize]
                })
                .sum();
        }
    }
    out
}

fn map_samples(image: &ImageContainer, f: impl Fn(u8) -> u8) -> ImageContainer {
    let mut pixels = image.pixels().clone();
    let samples: &mut [u8] = match &mut pixels {
        Pixels::Grey(img) => &mut **img,
        Pixels::Rgb(img) => &mut **img,
    };
    for p in samples.iter_mut() {
        *p = f(*p);
    }
    image.with_pixels(pixels)
}

fn morph(
    image: &ImageContainer,
    radius: u32,
    iterations: u32,
    pick: fn(u8, u8) -> u8,
) -> ImageContainer {
    if radius < 1 || iterations < 1 {
        return image.clone();
    }
    let (w, h, c) = (
        image.width() as usize,
        image.height() as usize,
        image.channels() as usize,
    );
    let mut pixels = image.pixels().clone();
    let samples: &mut [u8] = match &mut pixels {
        Pixels::Grey(img) => &mut **img,
        Pixels::Rgb(img) => &mut **img,
    };
    let mut scratch = vec![0u8; samples.len()];
    let r = radius as usize;
    for _ in 0..iterations {
        extremum_pass(samples, &mut scratch, (w, h, c), r, Axis::Horizontal, pick);
        extremum_pass(&scratch, samples, (w, h, c), r, Axis::Vertical, pick);
    }
    image.with_pixels(pixels)
}

#[derive(Clone, Copy)]
enum Axis {
    Horizontal,
    Vertical,
}

/// One 1-D pass of a min/max filter. The window is clipped at the borders,
/// so out-of-image samples never win.
fn extremum_pass(
    src: &[u8],
    dst: &mut [u8],
    (w, h, c): (usize, usize, usize),
    r: usize,
    axis: Axis,
    pick: fn(u8, u8) -> u8,
) {
    for y in 0..h {
        for x in 0..w {
            let (lo, hi, fixed) = match axis {
                Axis::Horizontal => (x.saturating_sub(r), (x + r).min(w - 1), y),
                Axis::Vertical => (y.saturating_sub(r), (y + r).min(h - 1), x),
            };
            for ch in 0..c {
                let at = |i: usize| match axis {
                    Axis::Horizontal => (fixed * w + i) * c + ch,
                    Axis::Vertical => (i * w + fixed) * c + ch,
                };
                let mut v = src[at(lo)];
                for i in lo + 1..=hi {
                    v = pick(v, src[at(i)]);
                }
                dst[(y * w + x) * c + ch] = v;
            }
        }
    }
}
