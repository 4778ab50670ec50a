//! The Tesseract general-purpose OCR engine.
//!
//! The image is sent as PNG on stdin (`tesseract stdin stdout ...`).

use super::EngineError;
use super::command::{Invocation, resolve_executable};
use crate::imaging::{ImageContainer, RasterFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const NAME: &str = "tesseract";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TesseractOptions {
    /// Language code(s), `+`-separated (`eng`, `eng+deu`).
    pub language: String,
    /// Page segmentation mode (0-13).
    pub psm: u8,
    /// OCR engine mode (0-3).
    pub oem: u8,
    /// Restrict recognition to these characters.
    pub whitelist: Option<String>,
    /// Seconds before the process is killed; 0 waits forever.
    pub timeout: f64,
    /// Unix niceness for the process; 0 keeps the current priority.
    pub nice: i32,
    /// Extra command-line arguments, whitespace separated.
    pub config: String,
}

impl Default for TesseractOptions {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            psm: 3,
            oem: 3,
            whitelist: None,
            timeout: 0.0,
            nice: 0,
            config: String::new(),
        }
    }
}

impl TesseractOptions {
    fn arguments(&self) -> Vec<String> {
        let mut args = vec![
            "stdin".to_string(),
            "stdout".to_string(),
            "-l".to_string(),
            self.language.clone(),
            "--psm".to_string(),
            self.psm.to_string(),
            "--oem".to_string(),
            self.oem.to_string(),
        ];
        if let Some(whitelist) = &self.whitelist {
            args.push("-c".to_string());
            args.push(format!("tessedit_char_whitelist={whitelist}"));
        }
        args.extend(self.config.split_whitespace().map(str::to_string));
        args
    }

    fn timeout(&self) -> Option<Duration> {
        (self.timeout > 0.0).then(|| Duration::from_secs_f64(self.timeout))
    }
}

/// Handle on a Tesseract executable.
#[derive(Debug, Clone)]
pub struct Tesseract {
    executable: PathBuf,
}

impl Default for Tesseract {
    fn default() -> Self {
        Self::new(Path::new(NAME))
    }
}

impl Tesseract {
    pub fn new(executable: &Path) -> Self {
        Self {
            executable: resolve_executable(executable, NAME),
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn recognize(
        &self,
        image: &ImageContainer,
        options: &TesseractOptions,
    ) -> Result<String, EngineError> {
        let png = image.with_format(RasterFormat::Png).to_bytes()?;
        let output = Invocation::new(NAME, &self.executable)
            .args(options.arguments())
            .stdin(png)
            .timeout(options.timeout())
            .nice(options.nice)
            .run()?;
        if !output.status.success() {
            return Err(EngineError::Runtime {
                engine: NAME.to_string(),
                message: output.stderr.trim().to_string(),
            });
        }
        Ok(output.stdout.trim_end().to_string())
    }

    /// Version number, e.g. `5.3.0`.
    pub fn version(&self) -> Result<String, EngineError> {
        let output = Invocation::new(NAME, &self.executable)
            .arg("--version")
            .run()?;
        // Older releases print the banner on stderr.
        let text = if output.stdout.trim().is_empty() {
            &output.stderr
        } else {
            &output.stdout
        };
        parse_version(text).ok_or_else(|| EngineError::Runtime {
            engine: NAME.to_string(),
            message: format!("unexpected --version output: {text:?}"),
        })
    }

    /// Installed language packs.
    pub fn languages(&self) -> Result<Vec<String>, EngineError> {
        let output = Invocation::new(NAME, &self.executable)
            .arg("--list-langs")
            .run()?;
        if !output.status.success() {
            return Err(EngineError::Runtime {
                engine: NAME.to_string(),
                message: output.stderr.trim().to_string(),
            });
        }
        Ok(parse_languages(&output.stdout))
    }
}

fn parse_version(text: &str) -> Option<String> {
    let first = text.lines().next()?;
    let version = first.split_whitespace().nth(1)?;
    Some(version.trim_start_matches('v').to_string())
}

fn parse_languages(text: &str) -> Vec<String> {
    text.lines()
        .skip_while(|line| !line.starts_with("List of available languages"))
        .skip(1)
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
