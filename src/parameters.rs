//! Persisted OCR parameters.
//!
//! A parameters file records, per named ROI, the processing tasks and the
//! recognizer to run, plus the camera settings they were tuned with:
//!
//! ```json
//! {
//!   "rois": {
//!     "display": {
//!       "tasks": [["crop", [120, 80, 300, 90]], ["greyscale"], ["threshold", 214]],
//!       "algorithm": "ssocr",
//!       "num_digits": 6
//!     }
//!   },
//!   "camera": { "zoom": [0.25, 0.25, 0.5, 0.5], "iso": 200 }
//! }
//! ```
//!
//! A [`ParameterStore`] tracks whether anything changed since it was loaded,
//! and only writes when it did.

use crate::camera::{CameraError, CameraSettings};
use crate::engine::{self, EngineError, Recognize, Recognizer};
use crate::imaging::{ImageContainer, Task};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParametersError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid parameters file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("No ROI named {0:?}")]
    UnknownRoi(String),
    #[error("An ROI named {0:?} already exists")]
    DuplicateName(String),
    #[error(transparent)]
    Camera(#[from] CameraError),
}

/// Everything needed to recognize one ROI.
///
/// Stored flat: `tasks`, `algorithm`, then the algorithm's options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRoi", into = "RawRoi")]
pub struct RoiParameters {
    pub tasks: Vec<Task>,
    pub recognizer: Recognizer,
}

impl RoiParameters {
    pub fn new(tasks: Vec<Task>, recognizer: Recognizer) -> Self {
        Self { tasks, recognizer }
    }

    /// Process `image` with this ROI's tasks and recognize it.
    pub fn apply<E: Recognize + ?Sized>(
        &self,
        image: &ImageContainer,
        engine: &E,
    ) -> Result<(String, ImageContainer), EngineError> {
        engine::apply(image, &self.tasks, &self.recognizer, engine)
    }
}

#[derive(Serialize, Deserialize)]
struct RawRoi {
    #[serde(default)]
    tasks: Vec<Task>,
    #[serde(default = "default_algorithm")]
    algorithm: String,
    #[serde(flatten)]
    options: Map<String, Value>,
}

fn default_algorithm() -> String {
    engine::tesseract::NAME.to_string()
}

impl TryFrom<RawRoi> for RoiParameters {
    type Error = serde_json::Error;

    fn try_from(raw: RawRoi) -> Result<Self, Self::Error> {
        Ok(Self {
            tasks: raw.tasks,
            recognizer: Recognizer::from_parts(&raw.algorithm, raw.options)?,
        })
    }
}

impl From<RoiParameters> for RawRoi {
    fn from(params: RoiParameters) -> Self {
        let algorithm = params.recognizer.algorithm().to_string();
        let mut options = match serde_json::to_value(&params.recognizer) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        options.remove("algorithm");
        RawRoi {
            tasks: params.tasks,
            algorithm,
            options,
        }
    }
}

/// Contents of a parameters file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Parameters {
    pub rois: BTreeMap<String, RoiParameters>,
    pub camera: CameraSettings,
}

impl Parameters {
    /// Read a parameters file. Camera settings out of range are rejected here
    /// rather than on the first capture.
    pub fn load(path: &Path) -> Result<Self, ParametersError> {
        let content = fs::read_to_string(path)?;
        let params: Self = serde_json::from_str(&content)?;
        params.camera.validate()?;
        Ok(params)
    }

    /// Recognize every ROI on `image`, in parallel. Results are in name order;
    /// one ROI failing does not stop the others.
    pub fn recognize_all<E: Recognize + ?Sized>(
        &self,
        image: &ImageContainer,
        engine: &E,
    ) -> Vec<RoiOutcome> {
        self.rois
            .par_iter()
            .map(|(name, roi)| RoiOutcome {
                name: name.clone(),
                text: roi.apply(image, engine).map(|(text, _)| text),
            })
            .collect()
    }
}

/// Result of recognizing one ROI.
#[derive(Debug)]
pub struct RoiOutcome {
    pub name: String,
    pub text: Result<String, EngineError>,
}

/// Parameters being edited, with change tracking.
#[derive(Debug, Clone, Default)]
pub struct ParameterStore {
    params: Parameters,
    modified: bool,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a file written by an earlier session.
    pub fn load(path: &Path) -> Result<Self, ParametersError> {
        let params = Parameters::load(path)?;
        log::info!("Loaded {} ROI(s) from {}", params.rois.len(), path.display());
        Ok(Self {
            params,
            modified: false,
        })
    }

    pub fn parameters(&self) -> &Parameters {
        &self.params
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn get(&self, name: &str) -> Option<&RoiParameters> {
        self.params.rois.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params.rois.keys().map(String::as_str)
    }

    /// Store the parameters of ROI `name`, replacing any earlier ones.
    pub fn cache(&mut self, name: &str, roi: RoiParameters) {
        if self.params.rois.get(name) != Some(&roi) {
            self.params.rois.insert(name.to_string(), roi);
            self.modified = true;
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<RoiParameters> {
        let removed = self.params.rois.remove(name);
        if removed.is_some() {
            self.modified = true;
        }
        removed
    }

    pub fn rename(&mut self, from: &str, to: &str) -> Result<(), ParametersError> {
        if from == to {
            return Ok(());
        }
        if self.params.rois.contains_key(to) {
            return Err(ParametersError::DuplicateName(to.to_string()));
        }
        let roi = self
            .params
            .rois
            .remove(from)
            .ok_or_else(|| ParametersError::UnknownRoi(from.to_string()))?;
        self.params.rois.insert(to.to_string(), roi);
        self.modified = true;
        Ok(())
    }

    pub fn set_camera(&mut self, settings: CameraSettings) {
        if self.params.camera != settings {
            self.params.camera = settings;
            self.modified = true;
        }
    }

    /// Write the file if anything changed. Returns whether it was written.
    pub fn save_if_modified(&mut self, path: &Path) -> Result<bool, ParametersError> {
        if !self.modified {
            log::debug!("Parameters unchanged, not writing {}", path.display());
            return Ok(false);
        }
        self.save(path)?;
        Ok(true)
    }

    pub fn save(&mut self, path: &Path) -> Result<(), ParametersError> {
        let json = serde_json::to_string_pretty(&self.params)?;
        fs::write(path, json)?;
        self.modified = false;
        log::info!(
            "Saved {} ROI(s) to {}",
            self.params.rois.len(),
            path.display()
        );
        Ok(())
    }
}
