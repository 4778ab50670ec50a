//! Recognition engines.
//!
//! An engine turns a processed image into text. Two are supported, both run as
//! external executables:
//!
//! - [`Tesseract`](tesseract::Tesseract): general OCR (`algorithm = "tesseract"`)
//! - [`Ssocr`](ssocr::Ssocr): seven-segment displays (`algorithm = "ssocr"`)
//!
//! A [`Recognizer`] names the engine and carries its options; it is what ROI
//! parameters store. [`Engines`] holds the configured executables and is built
//! once at startup. Anything implementing [`Recognize`] can stand in for it,
//! which is how the dispatch queue and the tests drive recognition.

pub mod command;
pub mod ssocr;
pub mod tesseract;

use crate::imaging::{ImageContainer, ImageError, Pipeline, Task};
use serde::{Deserialize, Serialize};
use ssocr::{Ssocr, SsocrOptions};
use std::path::{Path, PathBuf};
use tesseract::{Tesseract, TesseractOptions};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{engine} is not available: {message}")]
    Unavailable { engine: String, message: String },
    #[error("{engine} failed: {message}")]
    Runtime { engine: String, message: String },
    #[error("{engine} did not finish within {seconds} seconds")]
    Timeout { engine: String, seconds: f64 },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Image(#[from] ImageError),
}

impl EngineError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, EngineError::Unavailable { .. })
    }
}

/// Which engine to run, with its options.
///
/// Serialized flat with an `algorithm` tag:
/// `{"algorithm": "ssocr", "num_digits": 6}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "lowercase")]
pub enum Recognizer {
    Tesseract(TesseractOptions),
    Ssocr(SsocrOptions),
}

impl Default for Recognizer {
    fn default() -> Self {
        Recognizer::Tesseract(TesseractOptions::default())
    }
}

impl Recognizer {
    pub fn algorithm(&self) -> &'static str {
        match self {
            Recognizer::Tesseract(_) => tesseract::NAME,
            Recognizer::Ssocr(_) => ssocr::NAME,
        }
    }

    /// Build from an algorithm name and a JSON object of options.
    pub fn from_parts(
        algorithm: &str,
        options: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self, serde_json::Error> {
        let mut object = options;
        object.insert(
            "algorithm".to_string(),
            serde_json::Value::String(algorithm.to_string()),
        );
        serde_json::from_value(serde_json::Value::Object(object))
    }
}

/// Something that can read text from an image.
///
/// Implementations must be shareable across threads: the dispatch queue calls
/// them from its worker and `run` calls them from rayon.
pub trait Recognize: Send + Sync {
    fn recognize(
        &self,
        image: &ImageContainer,
        recognizer: &Recognizer,
    ) -> Result<String, EngineError>;
}

/// The configured engine executables.
#[derive(Debug, Clone, Default)]
pub struct Engines {
    pub tesseract: Tesseract,
    pub ssocr: Ssocr,
}

impl Engines {
    pub fn new(tesseract: &Path, ssocr: &Path) -> Self {
        Self {
            tesseract: Tesseract::new(tesseract),
            ssocr: Ssocr::new(ssocr),
        }
    }

    pub fn from_config(config: &crate::config::EnginesConfig) -> Self {
        Self::new(&config.tesseract.executable, &config.ssocr.executable)
    }

    /// Probe every engine. A missing engine is reported, not an error.
    pub fn report(&self) -> Vec<EngineReport> {
        let describe = |e: EngineError| e.to_string();
        vec![
            EngineReport {
                name: tesseract::NAME,
                executable: self.tesseract.executable().to_path_buf(),
                version: self.tesseract.version().map_err(describe),
                languages: Some(self.tesseract.languages().map_err(describe)),
            },
            EngineReport {
                name: ssocr::NAME,
                executable: self.ssocr.executable().to_path_buf(),
                version: self.ssocr.version().map_err(describe),
                languages: None,
            },
        ]
    }
}

/// Installed version of one engine, or why it could not be determined.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineReport {
    pub name: &'static str,
    pub executable: PathBuf,
    pub version: Result<String, String>,
    /// Only engines with language packs report them.
    pub languages: Option<Result<Vec<String>, String>>,
}

impl Recognize for Engines {
    fn recognize(
        &self,
        image: &ImageContainer,
        recognizer: &Recognizer,
    ) -> Result<String, EngineError> {
        match recognizer {
            Recognizer::Tesseract(options) => self.tesseract.recognize(image, options),
            Recognizer::Ssocr(options) => self.ssocr.recognize(image, options),
        }
    }
}

/// Run `tasks` over `image`, then recognize the result.
///
/// Returns the text together with the processed image.
pub fn apply<E: Recognize + ?Sized>(
    image: &ImageContainer,
    tasks: &[Task],
    recognizer: &Recognizer,
    engine: &E,
) -> Result<(String, ImageContainer), EngineError> {
    let processed = Pipeline::compile(tasks)?.run(image, false);
    let text = engine.recognize(&processed, recognizer)?;
    Ok((text, processed))
}
