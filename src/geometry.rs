//! Mapping selections on a rotated, zoomed preview back to the camera frame.
//!
//! The preview shows the current zoom window of the camera frame, rotated by
//! the display angle onto an expanded canvas (see [`RotationFrame`]). A
//! rectangle the user drags on that canvas is converted by [`rotate_zoom`]
//! into a fractional rectangle of the unrotated window, and [`ZoomHistory`]
//! nests it inside the window to get coordinates in the full frame.
//!
//! Zoom windows are always fractions of the *original* frame, so they can be
//! used directly as `zoom` pipeline parameters or sent to a camera.

use crate::imaging::{Region, RotationFrame};
use serde::{Deserialize, Serialize};

type Point = (f64, f64);

/// A rectangle drawn on the preview canvas, in canvas pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Selection {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Selection {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }
}

/// A fractional `(x, y, w, h)` window of the camera frame.
///
/// Serialized as a four-element array.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct ZoomWindow {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl ZoomWindow {
    pub const FULL: ZoomWindow = ZoomWindow {
        x: 0.0,
        y: 0.0,
        w: 1.0,
        h: 1.0,
    };

    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    pub fn is_full(&self) -> bool {
        *self == Self::FULL
    }
}

impl From<[f64; 4]> for ZoomWindow {
    fn from([x, y, w, h]: [f64; 4]) -> Self {
        Self { x, y, w, h }
    }
}

impl From<ZoomWindow> for [f64; 4] {
    fn from(z: ZoomWindow) -> Self {
        [z.x, z.y, z.w, z.h]
    }
}

impl From<ZoomWindow> for Region {
    fn from(z: ZoomWindow) -> Self {
        Region::Fractional {
            x: z.x,
            y: z.y,
            w: z.w,
            h: z.h,
        }
    }
}

/// Result of [`rotate_zoom`]: the window as fractions of the unrotated
/// content, and that content's size measured along the rotated edges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotatedZoom {
    pub window: ZoomWindow,
    pub width: f64,
    pub height: f64,
}

/// Corners of the selection rotated about its own center, ordered
/// top-left, top-right, bottom-right, bottom-left as seen unrotated.
fn rotate_selection(angle: f64, s: Selection) -> [Point; 4] {
    let axis_swap = angle.abs() > 45.0 && angle.abs() < 135.0;
    let theta = if axis_swap { angle - 90.0 } else { angle };

    let (sin, cos) = (-theta).to_radians().sin_cos();
    let (cx, cy) = (s.x + s.w * 0.5, s.y + s.h * 0.5);
    let turn = |(px, py): Point| {
        (
            (px - cx) * cos - (py - cy) * sin + cx,
            (px - cx) * sin + (py - cy) * cos + cy,
        )
    };

    let c = [
        turn((s.x, s.y)),
        turn((s.x + s.w, s.y)),
        turn((s.x + s.w, s.y + s.h)),
        turn((s.x, s.y + s.h)),
    ];
    if axis_swap { [c[3], c[0], c[1], c[2]] } else { c }
}

/// Corners of a `width` x `height` image after rotation onto the expanded canvas.
fn image_corners(angle: f64, width: f64, height: f64) -> [Point; 4] {
    let corners = [(0.0, 0.0), (width, 0.0), (width, height), (0.0, height)];
    if angle == 0.0 {
        return corners;
    }
    let frame = RotationFrame::new(width, height, angle);
    corners.map(|(x, y)| frame.apply(x, y))
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

/// Intersection of line `a1–a2` with line `b1–b2`; `None` when parallel.
fn intersection(a1: Point, a2: Point, b1: Point, b2: Point) -> Option<Point> {
    let line_a = cross([a1.0, a1.1, 1.0], [a2.0, a2.1, 1.0]);
    let line_b = cross([b1.0, b1.1, 1.0], [b2.0, b2.1, 1.0]);
    let [x, y, z] = cross(line_a, line_b);
    if z == 0.0 {
        return None;
    }
    Some((x / z, y / z))
}

/// Convert a selection on a canvas rotated by `angle` degrees into a
/// fractional window of the unrotated `width` x `height` content.
///
/// `angle` is the display rotation in `[-180, 180]`; angles above 180 are
/// treated as their negative equivalent. Returns `None` when the selection
/// misses the content entirely or collapses to nothing, and for non-finite
/// input.
pub fn rotate_zoom(
    angle: f64,
    selection: Selection,
    width: u32,
    height: u32,
) -> Option<RotatedZoom> {
    let Selection { x, y, w, h } = selection;
    if ![angle, x, y, w, h].iter().all(|v| v.is_finite()) {
        log::debug!("Ignoring non-finite selection {selection:?} at {angle} degrees");
        return None;
    }
    let angle = if angle > 180.0 { angle - 360.0 } else { angle };
    let rect = rotate_selection(angle, selection);
    let corners = image_corners(angle, width as f64, height as f64);

    let inter_top = intersection(corners[0], corners[1], rect[0], rect[3])?;
    let inter_bottom = intersection(corners[2], corners[3], rect[0], rect[3])?;

    let (x, y, w, h) = if (-45.0..=45.0).contains(&angle) {
        (
            inter_top.0 - corners[0].0,
            rect[0].1 - inter_top.1,
            rect[1].0.min(corners[1].0) - rect[0].0,
            rect[3].1.min(inter_bottom.1) - rect[0].1,
        )
    } else if angle > 45.0 && angle < 135.0 {
        (
            corners[0].1 - inter_top.1,
            rect[0].0 - inter_top.0,
            rect[0].1.min(corners[0].1) - rect[1].1,
            rect[3].0.min(inter_bottom.0) - rect[0].0,
        )
    } else if angle < -45.0 && angle > -135.0 {
        (
            inter_top.1 - corners[0].1,
            inter_top.0 - rect[0].0,
            rect[1].1.min(corners[1].1) - rect[0].1,
            rect[0].0 - rect[3].0.max(inter_bottom.0),
        )
    } else {
        (
            corners[0].0 - inter_top.0,
            inter_top.1 - rect[0].1,
            rect[0].0 - rect[1].0.max(corners[1].0),
            rect[0].1 - rect[3].1.max(corners[3].1),
        )
    };

    let edge = |a: Point, b: Point| (b.0 - a.0).hypot(b.1 - a.1);
    let width = edge(corners[0], corners[1]);
    let height = edge(corners[0], corners[3]);

    let (x, w) = if x < 0.0 { (0.0, x + w) } else { (x, w) };
    let (y, h) = if y < 0.0 { (0.0, y + h) } else { (y, h) };

    let window = [x / width, y / height, w / width, h / height];
    if !window.iter().all(|v| v.is_finite()) {
        return None;
    }
    if w < 0.0 || h < 0.0 || y > height || x > width {
        log::debug!("Selection {selection:?} at {angle} degrees lies outside the image");
        return None;
    }

    Some(RotatedZoom {
        window: ZoomWindow::new(window[0], window[1], window[2], window[3]),
        width,
        height,
    })
}

/// Direction keys for nudging the current zoom window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanDirection {
    Up,
    Down,
    Left,
    Right,
}

/// Stack of nested zoom windows, most recent last.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZoomHistory {
    stack: Vec<ZoomWindow>,
}

impl ZoomHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a window restored from saved parameters.
    pub fn starting_at(window: ZoomWindow) -> Self {
        Self {
            stack: vec![window],
        }
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn current(&self) -> Option<ZoomWindow> {
        self.stack.last().copied()
    }

    /// The active window, or the full frame when nothing is zoomed.
    pub fn window(&self) -> ZoomWindow {
        self.current().unwrap_or(ZoomWindow::FULL)
    }

    /// Pixel size of the zoomed content for an original frame size.
    pub fn frame_size(&self, original_width: u32, original_height: u32) -> (u32, u32) {
        match self.current() {
            Some(z) => (
                (z.w * original_width as f64) as u32,
                (z.h * original_height as f64) as u32,
            ),
            None => (original_width, original_height),
        }
    }

    /// Express a window of the current zoomed content in original-frame fractions.
    pub fn compose(
        &self,
        zoom: &RotatedZoom,
        original_width: u32,
        original_height: u32,
    ) -> ZoomWindow {
        let z = zoom.window;
        match self.current() {
            Some(outer) => ZoomWindow::new(
                z.x * zoom.width / original_width as f64 + outer.x,
                z.y * zoom.height / original_height as f64 + outer.y,
                z.w * outer.w,
                z.h * outer.h,
            ),
            None => z,
        }
    }

    /// Zoom into a selection drawn on the preview. Returns the new window,
    /// or `None` (history unchanged) when the selection misses the image.
    pub fn select(
        &mut self,
        angle: f64,
        selection: Selection,
        original_width: u32,
        original_height: u32,
    ) -> Option<ZoomWindow> {
        let (width, height) = self.frame_size(original_width, original_height);
        let zoom = rotate_zoom(angle, selection, width, height)?;
        let window = self.compose(&zoom, original_width, original_height);
        self.stack.push(window);
        Some(window)
    }

    pub fn push(&mut self, window: ZoomWindow) {
        self.stack.push(window);
    }

    /// Drop the current window and return the one now active.
    pub fn undo(&mut self) -> ZoomWindow {
        self.stack.pop();
        self.window()
    }

    /// Forget every window and return the full frame.
    pub fn reset(&mut self) -> ZoomWindow {
        self.stack.clear();
        ZoomWindow::FULL
    }

    /// Shift the current window by up to `delta`, staying inside the frame.
    ///
    /// The shifted window is pushed so it can be undone. Returns `None` when
    /// nothing is zoomed or the window is already against that edge.
    pub fn pan(&mut self, direction: PanDirection, delta: f64) -> Option<ZoomWindow> {
        let z = self.current()?;
        let (dx, dy) = match direction {
            PanDirection::Up => (0.0, delta.min(1.0 - z.h - z.y)),
            PanDirection::Down => (0.0, -delta.min(z.y)),
            PanDirection::Left => (delta.min(1.0 - z.w - z.x), 0.0),
            PanDirection::Right => (-delta.min(z.x), 0.0),
        };
        if dx == 0.0 && dy == 0.0 {
            return None;
        }
        let moved = ZoomWindow::new(z.x + dx, z.y + dy, z.w, z.h);
        self.stack.push(moved);
        Some(moved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(actual: ZoomWindow, expected: [f64; 4]) {
        let got: [f64; 4] = actual.into();
        for (a, e) in got.iter().zip(expected) {
            assert!((a - e).abs() < 1e-9, "got {got:?}, expected {expected:?}");
        }
    }

    fn zoom(angle: f64, x: f64, y: f64, w: f64, h: f64) -> Option<RotatedZoom> {
        rotate_zoom(angle, Selection::new(x, y, w, h), 400, 300)
    }

    // =========================================================================
    // rotate_zoom
    // =========================================================================

    #[test]
    fn non_finite_input_is_empty() {
        assert_eq!(zoom(f64::NAN, 100.0, 50.0, 200.0, 100.0), None);
        assert_eq!(zoom(f64::INFINITY, 100.0, 50.0, 200.0, 100.0), None);
        assert_eq!(zoom(f64::NEG_INFINITY, 100.0, 50.0, 200.0, 100.0), None);
        assert_eq!(zoom(0.0, f64::NAN, 50.0, 200.0, 100.0), None);
        assert_eq!(zoom(30.0, 100.0, 50.0, f64::INFINITY, 100.0), None);
    }

    #[test]
    fn empty_content_is_empty() {
        assert_eq!(rotate_zoom(0.0, Selection::new(0.0, 0.0, 10.0, 10.0), 0, 0), None);
    }

    #[test]
    fn zero_angle_is_plain_normalization() {
        let z = zoom(0.0, 100.0, 50.0, 200.0, 100.0).unwrap();
        approx(z.window, [0.25, 50.0 / 300.0, 0.5, 100.0 / 300.0]);
        assert_eq!((z.width, z.height), (400.0, 300.0));
    }

    #[test]
    fn zero_angle_clips_overhang_on_far_edges() {
        let z = zoom(0.0, 350.0, 250.0, 100.0, 100.0).unwrap();
        approx(z.window, [0.875, 250.0 / 300.0, 0.125, 50.0 / 300.0]);
    }

    #[test]
    fn zero_angle_clamps_negative_origin() {
        let z = zoom(0.0, -50.0, -50.0, 100.0, 100.0).unwrap();
        approx(z.window, [0.0, 0.0, 0.125, 50.0 / 300.0]);
    }

    #[test]
    fn small_positive_and_negative_angles() {
        let z = zoom(10.0, 150.0, 120.0, 80.0, 60.0).unwrap();
        approx(
            z.window,
            [
                0.32759158633049124,
                0.2716617202133897,
                0.19696155060244158,
                0.1969615506024417,
            ],
        );
        let z = zoom(30.0, 100.0, 100.0, 50.0, 50.0).unwrap();
        approx(
            z.window,
            [0.26138568252503425, 0.0, 0.10825317547305488, 0.06639627776511266],
        );
        let z = zoom(-30.0, 150.0, 150.0, 40.0, 40.0).unwrap();
        approx(
            z.window,
            [
                0.17905079229652987,
                0.3391109774652338,
                0.08660254037844384,
                0.1154700538379251,
            ],
        );
    }

    #[test]
    fn quarter_turns_use_their_own_branches() {
        let z = zoom(90.0, 50.0, 100.0, 100.0, 50.0).unwrap();
        approx(z.window, [0.625, 50.0 / 300.0, 0.125, 100.0 / 300.0]);
        let z = zoom(-90.0, 50.0, 100.0, 100.0, 50.0).unwrap();
        approx(z.window, [0.25, 0.5, 0.125, 100.0 / 300.0]);
        let z = zoom(180.0, 100.0, 100.0, 50.0, 50.0).unwrap();
        approx(z.window, [0.625, 0.5, 0.125, 50.0 / 300.0]);
    }

    #[test]
    fn measured_size_follows_rotated_edges() {
        let z = zoom(30.0, 100.0, 100.0, 50.0, 50.0).unwrap();
        assert!((z.width - 400.0).abs() < 1e-9);
        assert!((z.height - 300.0).abs() < 1e-9);
    }

    #[test]
    fn selection_outside_the_image_is_empty() {
        assert!(zoom(30.0, 5000.0, 5000.0, 10.0, 10.0).is_none());
        assert!(zoom(60.0, 5000.0, 5000.0, 10.0, 10.0).is_none());
    }

    #[test]
    fn angle_above_180_matches_negative() {
        let a = zoom(330.0, 150.0, 150.0, 40.0, 40.0).unwrap();
        let b = zoom(-30.0, 150.0, 150.0, 40.0, 40.0).unwrap();
        assert_eq!(a, b);
    }

    // =========================================================================
    // ZoomHistory
    // =========================================================================

    #[test]
    fn nested_zoom_composes() {
        let mut history = ZoomHistory::new();
        let first = history
            .select(0.0, Selection::new(100.0, 75.0, 200.0, 150.0), 400, 300)
            .unwrap();
        approx(first, [0.25, 0.25, 0.5, 0.5]);
        assert_eq!(history.frame_size(400, 300), (200, 150));

        let second = history
            .select(0.0, Selection::new(50.0, 37.5, 100.0, 75.0), 400, 300)
            .unwrap();
        approx(second, [0.375, 0.375, 0.25, 0.25]);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn missed_selection_leaves_history_alone() {
        let mut history = ZoomHistory::new();
        assert!(history
            .select(60.0, Selection::new(5000.0, 5000.0, 10.0, 10.0), 400, 300)
            .is_none());
        assert!(history.is_empty());
    }

    #[test]
    fn undo_and_reset() {
        let mut history = ZoomHistory::new();
        history.push(ZoomWindow::new(0.1, 0.1, 0.5, 0.5));
        history.push(ZoomWindow::new(0.2, 0.2, 0.25, 0.25));
        assert_eq!(history.undo(), ZoomWindow::new(0.1, 0.1, 0.5, 0.5));
        assert_eq!(history.undo(), ZoomWindow::FULL);
        assert_eq!(history.undo(), ZoomWindow::FULL);

        history.push(ZoomWindow::new(0.1, 0.1, 0.5, 0.5));
        assert!(history.reset().is_full());
        assert!(history.is_empty());
    }

    #[test]
    fn pan_is_clamped_to_the_frame() {
        let mut history = ZoomHistory::starting_at(ZoomWindow::new(0.0, 0.25, 0.5, 0.5));
        assert_eq!(history.pan(PanDirection::Right, 0.125), None);
        approx(
            history.pan(PanDirection::Up, 0.125).unwrap(),
            [0.0, 0.375, 0.5, 0.5],
        );
        approx(
            history.pan(PanDirection::Up, 0.125).unwrap(),
            [0.0, 0.5, 0.5, 0.5],
        );
        assert_eq!(history.pan(PanDirection::Up, 0.125), None);
        approx(
            history.pan(PanDirection::Left, 0.125).unwrap(),
            [0.125, 0.5, 0.5, 0.5],
        );
        approx(
            history.pan(PanDirection::Down, 0.125).unwrap(),
            [0.125, 0.375, 0.5, 0.5],
        );
        assert_eq!(history.len(), 5);
        assert_eq!(history.undo(), ZoomWindow::new(0.125, 0.5, 0.5, 0.5));
    }

    #[test]
    fn pan_without_zoom_does_nothing() {
        let mut history = ZoomHistory::new();
        assert_eq!(history.pan(PanDirection::Left, 0.1), None);
    }

    #[test]
    fn zoom_window_serializes_as_array() {
        let json = serde_json::to_string(&ZoomWindow::new(0.25, 0.5, 0.5, 0.25)).unwrap();
        assert_eq!(json, "[0.25,0.5,0.5,0.25]");
        let z: ZoomWindow = serde_json::from_str("[0, 0, 1, 1]").unwrap();
        assert!(z.is_full());
    }
}
