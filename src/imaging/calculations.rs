//! Pure calculation functions for image geometry and filter kernels.
//!
//! All functions here are pure and testable without any I/O or images.

use super::params::Region;

/// Resolve a [`Region`] to absolute pixel units for an image of the given size.
///
/// Fractional values are scaled by width/height and truncated, matching how a
/// slice `[y:y+h, x:x+w]` would be computed from them.
///
/// # Examples
/// ```
/// # use camera_ocr::imaging::{Region, region_to_pixels};
/// let r = Region::Fractional { x: 0.25, y: 0.5, w: 0.5, h: 0.25 };
/// assert_eq!(region_to_pixels(r, 400, 200), (100, 100, 200, 50));
/// ```
pub fn region_to_pixels(region: Region, width: u32, height: u32) -> (i64, i64, i64, i64) {
    match region {
        Region::Absolute { x, y, w, h } => (x, y, w, h),
        Region::Fractional { x, y, w, h } => {
            let (fw, fh) = (width as f64, height as f64);
            (
                (fw * x) as i64,
                (fh * y) as i64,
                (fw * w) as i64,
                (fh * h) as i64,
            )
        }
    }
}

/// Clip an `(x, y, w, h)` pixel rectangle to an image, returning the
/// in-bounds `(x, y, w, h)` or `None` when nothing remains.
pub fn clip_to_bounds(
    rect: (i64, i64, i64, i64),
    width: u32,
    height: u32,
) -> Option<(u32, u32, u32, u32)> {
    let (x, y, w, h) = rect;
    if w <= 0 || h <= 0 {
        return None;
    }
    let x0 = x.clamp(0, width as i64);
    let y0 = y.clamp(0, height as i64);
    let x1 = (x + w).clamp(0, width as i64);
    let y1 = (y + h).clamp(0, height as i64);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some((x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32))
}

/// Normalize an angle in degrees from `[-180, 180]` to `[0, 360)`.
pub fn normalize_angle(angle: f64) -> f64 {
    if angle < 0.0 { angle + 360.0 } else { angle }
}

/// An affine rotation about the image center onto an expanded canvas.
///
/// The canvas grows so the rotated rectangle fits entirely:
/// `new_w = h·|sin θ| + w·|cos θ|`, `new_h = h·|cos θ| + w·|sin θ|` (truncated),
/// and the matrix is re-centered so content sits in the middle of the new canvas.
/// Positive angles rotate counter-clockwise on screen (y axis pointing down).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationFrame {
    /// Row-major 2x3 affine matrix mapping source to destination coordinates.
    pub matrix: [[f64; 3]; 2],
    pub width: u32,
    pub height: u32,
}

impl RotationFrame {
    pub fn new(width: f64, height: f64, angle: f64) -> Self {
        let angle = normalize_angle(angle);
        let (cx, cy) = (width * 0.5, height * 0.5);
        let (sin, cos) = angle.to_radians().sin_cos();

        let mut matrix = [
            [cos, sin, (1.0 - cos) * cx - sin * cy],
            [-sin, cos, sin * cx + (1.0 - cos) * cy],
        ];

        let new_w = (height * sin.abs() + width * cos.abs()) as u32;
        let new_h = (height * cos.abs() + width * sin.abs()) as u32;

        matrix[0][2] += new_w as f64 * 0.5 - cx;
        matrix[1][2] += new_h as f64 * 0.5 - cy;

        Self {
            matrix,
            width: new_w,
            height: new_h,
        }
    }

    /// Map a source point into the rotated canvas.
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let m = &self.matrix;
        (
            m[0][0] * x + m[0][1] * y + m[0][2],
            m[1][0] * x + m[1][1] * y + m[1][2],
        )
    }

    /// The matrix as a row-major 3x3 projective matrix.
    pub fn as_projective(&self) -> [f32; 9] {
        let m = &self.matrix;
        [
            m[0][0] as f32,
            m[0][1] as f32,
            m[0][2] as f32,
            m[1][0] as f32,
            m[1][1] as f32,
            m[1][2] as f32,
            0.0,
            0.0,
            1.0,
        ]
    }
}

/// Side length of a square kernel or window for a radius: `2·radius + 1`.
pub fn kernel_side(radius: u32) -> usize {
    2 * radius as usize + 1
}

/// Gaussian sigma derived from the kernel radius: `0.3·(radius − 1) + 0.8`.
pub fn gaussian_sigma(radius: u32) -> f64 {
    0.3 * (radius as f64 - 1.0) + 0.8
}

/// Normalized 1-D Gaussian kernel of side `2·radius + 1`.
pub fn gaussian_kernel(radius: u32) -> Vec<f32> {
    let sigma = gaussian_sigma(radius);
    let r = radius as i64;
    let weights: Vec<f64> = (-r..=r)
        .map(|i| (-(i * i) as f64 / (2.0 * sigma * sigma)).exp())
        .collect();
    let sum: f64 = weights.iter().sum();
    weights.iter().map(|w| (w / sum) as f32).collect()
}

/// Normalized 1-D box kernel of side `2·radius + 1`.
pub fn box_kernel(radius: u32) -> Vec<f32> {
    let side = kernel_side(radius);
    vec![1.0 / side as f32; side]
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // region tests
    // =========================================================================

    #[test]
    fn fractional_region_scales_by_dimensions() {
        let r = Region::Fractional {
            x: 0.1,
            y: 0.2,
            w: 0.5,
            h: 0.5,
        };
        assert_eq!(region_to_pixels(r, 100, 50), (10, 10, 50, 25));
    }

    #[test]
    fn absolute_region_passes_through() {
        let r = Region::Absolute {
            x: 3,
            y: 4,
            w: 5,
            h: 6,
        };
        assert_eq!(region_to_pixels(r, 1, 1), (3, 4, 5, 6));
    }

    #[test]
    fn clip_keeps_in_bounds_rect() {
        assert_eq!(clip_to_bounds((10, 10, 20, 20), 100, 100), Some((10, 10, 20, 20)));
    }

    #[test]
    fn clip_truncates_overhang() {
        assert_eq!(clip_to_bounds((90, -5, 20, 20), 100, 100), Some((90, 0, 10, 15)));
    }

    #[test]
    fn clip_rejects_degenerate_and_outside() {
        assert_eq!(clip_to_bounds((0, 0, 0, 10), 100, 100), None);
        assert_eq!(clip_to_bounds((0, 0, -4, 10), 100, 100), None);
        assert_eq!(clip_to_bounds((200, 0, 10, 10), 100, 100), None);
    }

    // =========================================================================
    // rotation frame tests
    // =========================================================================

    #[test]
    fn negative_angles_normalize() {
        assert_eq!(normalize_angle(-90.0), 270.0);
        assert_eq!(normalize_angle(45.0), 45.0);
    }

    #[test]
    fn rotation_90_swaps_dimensions() {
        let frame = RotationFrame::new(400.0, 300.0, 90.0);
        assert_eq!((frame.width, frame.height), (300, 400));
    }

    #[test]
    fn rotation_45_expands_canvas() {
        let frame = RotationFrame::new(400.0, 300.0, 45.0);
        assert_eq!((frame.width, frame.height), (494, 494));
    }

    #[test]
    fn rotation_minus_30_matches_330() {
        let a = RotationFrame::new(400.0, 300.0, -30.0);
        let b = RotationFrame::new(400.0, 300.0, 330.0);
        assert_eq!((a.width, a.height), (496, 459));
        assert_eq!(a, b);
    }

    #[test]
    fn rotation_keeps_center_in_center() {
        let frame = RotationFrame::new(400.0, 300.0, 30.0);
        let (x, y) = frame.apply(200.0, 150.0);
        assert!((x - frame.width as f64 / 2.0).abs() < 1e-9);
        assert!((y - frame.height as f64 / 2.0).abs() < 1e-9);
    }

    // =========================================================================
    // kernel tests
    // =========================================================================

    #[test]
    fn kernel_side_is_odd() {
        assert_eq!(kernel_side(0), 1);
        assert_eq!(kernel_side(1), 3);
        assert_eq!(kernel_side(3), 7);
    }

    #[test]
    fn gaussian_sigma_formula() {
        assert!((gaussian_sigma(1) - 0.8).abs() < 1e-12);
        assert!((gaussian_sigma(3) - 1.4).abs() < 1e-12);
    }

    #[test]
    fn gaussian_kernel_is_normalized_and_symmetric() {
        let k = gaussian_kernel(2);
        assert_eq!(k.len(), 5);
        let sum: f32 = k.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert_eq!(k[0], k[4]);
        assert!(k[2] > k[1]);
    }

    #[test]
    fn box_kernel_is_uniform() {
        let k = box_kernel(1);
        assert_eq!(k, vec![1.0 / 3.0; 3]);
    }
}
