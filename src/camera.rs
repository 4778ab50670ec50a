//! The camera surface.
//!
//! A [`Camera`] captures frames, exposes its settings as an explicit typed
//! record, and can run recognition on a frame. The zoom window is device
//! state: once set it applies to every capture until it is reset.
//!
//! The transport to a remote device is not part of this crate; anything that
//! can implement the trait (a network client, a local sensor) plugs in.
//! [`StillCamera`] is the local implementation used by the CLI and tests. It
//! re-reads an image file on every capture, which makes a photo of a meter,
//! or a file a separate process keeps overwriting, behave like a live camera.

use crate::engine::{self, EngineError, Recognize, Recognizer};
use crate::geometry::ZoomWindow;
use crate::imaging::operations;
use crate::imaging::{ImageContainer, ImageError, Pixels, Quality, RasterFormat, Task};
use image::imageops;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Capture failed: {0}")]
    Capture(#[from] ImageError),
    #[error("Invalid camera settings: {0}")]
    Settings(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Exposure program of the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExposureMode {
    Off,
    #[default]
    Auto,
    Night,
    NightPreview,
    Backlight,
    Spotlight,
    Sports,
    Snow,
    Beach,
    VeryLong,
    FixedFps,
    AntiShake,
    Fireworks,
}

/// Camera settings.
///
/// Serialized as a flat map, which is also the shape
/// [`Camera::update_settings`] accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CameraSettings {
    /// Active sub-region of the full frame, fractional.
    pub zoom: ZoomWindow,
    /// JPEG quality of encoded captures.
    pub quality: Quality,
    /// Clockwise rotation of the sensor image: 0, 90, 180 or 270.
    pub rotation: u16,
    /// Output size before zooming, `None` for native.
    pub resolution: Option<[u32; 2]>,
    /// 0 is automatic, otherwise up to 1600.
    pub iso: u32,
    pub exposure_mode: ExposureMode,
    /// 0-100, 50 is neutral.
    pub brightness: u8,
    /// -100 to 100, 0 is neutral.
    pub contrast: i8,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            zoom: ZoomWindow::FULL,
            quality: Quality::default(),
            rotation: 0,
            resolution: None,
            iso: 0,
            exposure_mode: ExposureMode::Auto,
            brightness: 50,
            contrast: 0,
        }
    }
}

impl CameraSettings {
    pub fn validate(&self) -> Result<(), CameraError> {
        let invalid = |msg: String| Err(CameraError::Settings(msg));
        if !matches!(self.rotation, 0 | 90 | 180 | 270) {
            return invalid(format!(
                "rotation must be 0, 90, 180 or 270, got {}",
                self.rotation
            ));
        }
        if self.iso > 1600 {
            return invalid(format!("iso must be 0-1600, got {}", self.iso));
        }
        if self.brightness > 100 {
            return invalid(format!("brightness must be 0-100, got {}", self.brightness));
        }
        if !(-100..=100).contains(&self.contrast) {
            return invalid(format!("contrast must be -100 to 100, got {}", self.contrast));
        }
        if !(1..=100).contains(&self.quality.value()) {
            return invalid(format!("quality must be 1-100, got {}", self.quality.value()));
        }
        if let Some([w, h]) = self.resolution {
            if w == 0 || h == 0 {
                return invalid(format!("resolution must be non-zero, got {w}x{h}"));
            }
        }
        let ZoomWindow { x, y, w, h } = self.zoom;
        let fractional = |v: f64| (0.0..=1.0).contains(&v);
        if !(fractional(x) && fractional(y) && w > 0.0 && h > 0.0)
            || x + w > 1.0 + f64::EPSILON
            || y + h > 1.0 + f64::EPSILON
        {
            return invalid(format!("zoom must lie within [0, 1], got {x}, {y}, {w}, {h}"));
        }
        Ok(())
    }

    /// Overlay `updates` on these settings.
    ///
    /// Unknown keys and out-of-range values are rejected, leaving `self`
    /// untouched.
    pub fn merged(&self, updates: Map<String, Value>) -> Result<Self, CameraError> {
        let Value::Object(mut current) = serde_json::to_value(self)
            .map_err(|e| CameraError::Settings(e.to_string()))?
        else {
            return Err(CameraError::Settings("settings are not a map".into()));
        };
        current.extend(updates);
        let merged: CameraSettings = serde_json::from_value(Value::Object(current))
            .map_err(|e| CameraError::Settings(e.to_string()))?;
        merged.validate()?;
        Ok(merged)
    }
}

/// A source of frames with recognition attached.
pub trait Camera {
    /// Take a picture. The current zoom window is already applied.
    fn capture(&self) -> Result<ImageContainer, CameraError>;

    fn settings(&self) -> CameraSettings;

    /// Change some settings. Keys are the field names of [`CameraSettings`].
    fn update_settings(&mut self, updates: Map<String, Value>) -> Result<(), CameraError>;

    /// Engine used by [`Camera::apply`].
    fn engine(&self) -> &dyn Recognize;

    /// Set the zoom window; it stays in effect until changed again.
    fn set_zoom(&mut self, window: ZoomWindow) -> Result<(), CameraError> {
        let mut updates = Map::new();
        updates.insert(
            "zoom".to_string(),
            serde_json::to_value(window).map_err(|e| CameraError::Settings(e.to_string()))?,
        );
        self.update_settings(updates)
    }

    fn reset_zoom(&mut self) -> Result<(), CameraError> {
        self.set_zoom(ZoomWindow::FULL)
    }

    /// Capture encoded with the configured quality.
    fn capture_bytes(&self) -> Result<Vec<u8>, CameraError> {
        let quality = self.settings().quality;
        Ok(self.capture()?.to_bytes_with(quality)?)
    }

    /// Recognize text on `image`, or on a fresh capture when `None`.
    ///
    /// Returns the text and the processed image.
    fn apply(
        &self,
        image: Option<&ImageContainer>,
        tasks: &[Task],
        recognizer: &Recognizer,
    ) -> Result<(String, ImageContainer), CameraError> {
        let captured;
        let image = match image {
            Some(image) => image,
            None => {
                captured = self.capture()?;
                &captured
            }
        };
        Ok(engine::apply(image, tasks, recognizer, self.engine())?)
    }
}

/// A camera backed by an image file.
pub struct StillCamera {
    source: PathBuf,
    settings: CameraSettings,
    engine: Arc<dyn Recognize>,
}

impl StillCamera {
    pub fn new(source: &Path, engine: Arc<dyn Recognize>) -> Self {
        Self {
            source: source.to_path_buf(),
            settings: CameraSettings::default(),
            engine,
        }
    }

    pub fn with_settings(mut self, settings: CameraSettings) -> Result<Self, CameraError> {
        settings.validate()?;
        self.settings = settings;
        Ok(self)
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Sensor-side processing: orientation, resolution, brightness, contrast.
    /// Exposure mode and ISO have no effect on a still image.
    fn develop(&self, frame: &ImageContainer) -> ImageContainer {
        let s = &self.settings;
        let mut img = frame.to_native();
        img = match s.rotation {
            90 => img.rotate90(),
            180 => img.rotate180(),
            270 => img.rotate270(),
            _ => img,
        };
        if let Some([w, h]) = s.resolution {
            if (w, h) != (img.width(), img.height()) {
                img = img.resize_exact(w, h, imageops::FilterType::Triangle);
            }
        }
        if s.brightness != 50 {
            img = img.brighten((i32::from(s.brightness) - 50) * 255 / 50);
        }
        if s.contrast != 0 {
            img = img.adjust_contrast(f32::from(s.contrast));
        }
        frame.with_pixels(Pixels::from_dynamic(img))
    }
}

impl Camera for StillCamera {
    fn capture(&self) -> Result<ImageContainer, CameraError> {
        let frame = ImageContainer::decode(self.source.as_path())?;
        let defaults = CameraSettings::default();
        let s = &self.settings;
        let frame = if (s.rotation, s.resolution, s.brightness, s.contrast)
            == (defaults.rotation, defaults.resolution, defaults.brightness, defaults.contrast)
        {
            frame
        } else {
            self.develop(&frame)
        };
        let frame = if s.zoom.is_full() {
            frame
        } else {
            operations::crop(&frame, s.zoom.into())
        };
        log::debug!(
            "Captured {}x{} from {}",
            frame.width(),
            frame.height(),
            self.source.display()
        );
        Ok(frame.with_format(RasterFormat::Jpeg))
    }

    fn settings(&self) -> CameraSettings {
        self.settings.clone()
    }

    fn update_settings(&mut self, updates: Map<String, Value>) -> Result<(), CameraError> {
        let keys: Vec<&String> = updates.keys().collect();
        log::debug!("Updating camera settings {keys:?}");
        self.settings = self.settings.merged(updates)?;
        Ok(())
    }

    fn engine(&self) -> &dyn Recognize {
        self.engine.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::MockEngine;
    use crate::imaging::Quality;
    use crate::test_helpers::gradient_rgb;
    use serde_json::json;
    use tempfile::TempDir;

    fn still(tmp: &TempDir, w: u32, h: u32) -> (StillCamera, Arc<MockEngine>) {
        let path = tmp.path().join("frame.png");
        ImageContainer::new(gradient_rgb(w, h), RasterFormat::Png)
            .save(&path, Quality::default())
            .unwrap();
        let engine = Arc::new(MockEngine::replying(vec![Ok("0815".into())]));
        (StillCamera::new(&path, engine.clone()), engine)
    }

    fn updates(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    // =========================================================================
    // settings
    // =========================================================================

    #[test]
    fn settings_serialize_flat_with_zoom_array() {
        let value = serde_json::to_value(CameraSettings::default()).unwrap();
        assert_eq!(value["zoom"], json!([0.0, 0.0, 1.0, 1.0]));
        assert_eq!(value["quality"], 85);
        assert_eq!(value["exposure_mode"], "auto");
    }

    #[test]
    fn merged_overlays_known_keys() {
        let merged = CameraSettings::default()
            .merged(updates(json!({"iso": 400, "exposure_mode": "night", "contrast": -20})))
            .unwrap();
        assert_eq!(merged.iso, 400);
        assert_eq!(merged.exposure_mode, ExposureMode::Night);
        assert_eq!(merged.contrast, -20);
        assert_eq!(merged.brightness, 50);
    }

    #[test]
    fn merged_rejects_unknown_keys_and_bad_values() {
        let base = CameraSettings::default();
        assert!(base.merged(updates(json!({"shutter": 1}))).is_err());
        assert!(base.merged(updates(json!({"rotation": 45}))).is_err());
        assert!(base.merged(updates(json!({"iso": 3200}))).is_err());
        assert!(base.merged(updates(json!({"zoom": [0.5, 0.5, 0.75, 0.25]}))).is_err());
        assert!(base.merged(updates(json!({"resolution": [0, 480]}))).is_err());
    }

    #[test]
    fn failed_update_keeps_previous_settings() {
        let tmp = TempDir::new().unwrap();
        let (mut camera, _) = still(&tmp, 10, 10);
        camera.update_settings(updates(json!({"iso": 100}))).unwrap();
        assert!(camera.update_settings(updates(json!({"iso": 100, "flash": true}))).is_err());
        assert_eq!(camera.settings().iso, 100);
    }

    // =========================================================================
    // capture
    // =========================================================================

    #[test]
    fn capture_rereads_source_each_time() {
        let tmp = TempDir::new().unwrap();
        let (camera, _) = still(&tmp, 20, 10);
        assert_eq!(camera.capture().unwrap().width(), 20);

        ImageContainer::new(gradient_rgb(8, 6), RasterFormat::Png)
            .save(camera.source(), Quality::default())
            .unwrap();
        let frame = camera.capture().unwrap();
        assert_eq!((frame.width(), frame.height()), (8, 6));
        assert_eq!(frame.format(), RasterFormat::Jpeg);
    }

    #[test]
    fn zoom_persists_until_reset() {
        let tmp = TempDir::new().unwrap();
        let (mut camera, _) = still(&tmp, 40, 20);
        camera.set_zoom(ZoomWindow::new(0.25, 0.5, 0.5, 0.5)).unwrap();

        for _ in 0..2 {
            let frame = camera.capture().unwrap();
            assert_eq!((frame.width(), frame.height()), (20, 10));
        }

        camera.reset_zoom().unwrap();
        let frame = camera.capture().unwrap();
        assert_eq!((frame.width(), frame.height()), (40, 20));
    }

    #[test]
    fn rotation_and_resolution_apply_before_zoom() {
        let tmp = TempDir::new().unwrap();
        let (mut camera, _) = still(&tmp, 40, 20);
        camera
            .update_settings(updates(json!({"rotation": 90, "zoom": [0.0, 0.0, 1.0, 0.5]})))
            .unwrap();
        let frame = camera.capture().unwrap();
        assert_eq!((frame.width(), frame.height()), (20, 20));

        camera
            .update_settings(updates(json!({"rotation": 0, "resolution": [10, 10]})))
            .unwrap();
        let frame = camera.capture().unwrap();
        assert_eq!((frame.width(), frame.height()), (10, 5));
    }

    #[test]
    fn capture_bytes_is_jpeg() {
        let tmp = TempDir::new().unwrap();
        let (camera, _) = still(&tmp, 16, 16);
        let bytes = camera.capture_bytes().unwrap();
        assert_eq!(RasterFormat::sniff(&bytes), Some(RasterFormat::Jpeg));
    }

    #[test]
    fn missing_source_is_a_capture_error() {
        let engine = Arc::new(MockEngine::default());
        let camera = StillCamera::new(Path::new("/nonexistent/frame.jpg"), engine);
        assert!(matches!(camera.capture(), Err(CameraError::Capture(_))));
    }

    // =========================================================================
    // apply
    // =========================================================================

    #[test]
    fn apply_without_image_captures_first() {
        let tmp = TempDir::new().unwrap();
        let (mut camera, engine) = still(&tmp, 40, 20);
        camera.set_zoom(ZoomWindow::new(0.0, 0.0, 0.5, 0.5)).unwrap();

        let tasks = vec![Task::bare("greyscale")];
        let (text, processed) = camera
            .apply(None, &tasks, &Recognizer::default())
            .unwrap();

        assert_eq!(text, "0815");
        assert_eq!((processed.width(), processed.height()), (20, 10));
        let calls = engine.get_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].channels, 1);
    }

    #[test]
    fn apply_uses_the_given_image() {
        let tmp = TempDir::new().unwrap();
        let (camera, engine) = still(&tmp, 40, 20);
        let image = ImageContainer::new(gradient_rgb(6, 4), RasterFormat::Png);
        let (_, processed) = camera.apply(Some(&image), &[], &Recognizer::default()).unwrap();
        assert_eq!((processed.width(), processed.height()), (6, 4));
        assert_eq!(engine.get_calls()[0].width, 6);
    }
}
