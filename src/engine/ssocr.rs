//! The ssocr seven-segment display engine.
//!
//! ssocr reads the image from stdin (`-`). It links imlib2, which prints
//! harmless `TIFFReadDirectory: Warning` lines on stderr for some TIFF tags;
//! those are logged and dropped. Any other stderr output is a failure.

use super::EngineError;
use super::command::{Invocation, resolve_executable};
use crate::imaging::{ImageContainer, RasterFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const NAME: &str = "ssocr";

const BENIGN_STDERR: &str = "TIFFReadDirectory: Warning";

/// Text colour; the background is the opposite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Colour {
    #[default]
    Black,
    White,
}

/// How ssocr computes luminance from RGB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Luminance {
    Rec601,
    #[default]
    Rec709,
    Linear,
    Minimum,
    Maximum,
    Red,
    Green,
    Blue,
}

/// Characters ssocr may report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Charset {
    /// `0123456789`
    Digits,
    /// digits plus `.-`
    Decimal,
    /// decimal plus `abcdef`
    Hex,
    /// hex plus `hlnprtu`
    #[default]
    Full,
}

impl Colour {
    pub fn as_str(self) -> &'static str {
        match self {
            Colour::Black => "black",
            Colour::White => "white",
        }
    }
}

impl Luminance {
    pub fn as_str(self) -> &'static str {
        match self {
            Luminance::Rec601 => "rec601",
            Luminance::Rec709 => "rec709",
            Luminance::Linear => "linear",
            Luminance::Minimum => "minimum",
            Luminance::Maximum => "maximum",
            Luminance::Red => "red",
            Luminance::Green => "green",
            Luminance::Blue => "blue",
        }
    }
}

impl Charset {
    pub fn as_str(self) -> &'static str {
        match self {
            Charset::Digits => "digits",
            Charset::Decimal => "decimal",
            Charset::Hex => "hex",
            Charset::Full => "full",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SsocrOptions {
    /// Black/white threshold in percent.
    pub threshold: f64,
    /// Use `threshold` as is instead of adjusting it to the image.
    pub absolute_threshold: bool,
    /// Find the threshold iteratively, starting from `threshold`.
    pub iter_threshold: bool,
    /// Pixels needed to recognize a segment.
    pub needed_pixels: u32,
    /// Pixels ignored when searching digit boundaries.
    pub ignored_pixels: u32,
    /// Number of digits, -1 to detect.
    pub num_digits: i32,
    /// Minimum height/width ratio of a `1`.
    pub one_ratio: f64,
    /// Minimum width/height ratio of a `-`.
    pub minus_ratio: f64,
    /// Prepend ssocr's debug output to the text.
    pub debug: bool,
    pub foreground: Colour,
    pub luminance: Luminance,
    pub as_hex: bool,
    /// Recognize decimal points but leave them out of the text.
    pub omit_decimal_point: bool,
    pub charset: Charset,
}

impl Default for SsocrOptions {
    fn default() -> Self {
        Self {
            threshold: 50.0,
            absolute_threshold: true,
            iter_threshold: false,
            needed_pixels: 1,
            ignored_pixels: 0,
            num_digits: -1,
            one_ratio: 3.0,
            minus_ratio: 2.0,
            debug: false,
            foreground: Colour::Black,
            luminance: Luminance::Rec709,
            as_hex: false,
            omit_decimal_point: false,
            charset: Charset::Full,
        }
    }
}

impl SsocrOptions {
    fn arguments(&self) -> Vec<String> {
        let mut args = vec![
            format!("-t{}", self.threshold),
            format!("-n{}", self.needed_pixels),
            format!("-i{}", self.ignored_pixels),
            format!("-d{}", self.num_digits),
            format!("-r{}", self.one_ratio),
            format!("-m{}", self.minus_ratio),
            format!("-f{}", self.foreground.as_str()),
            format!("-l{}", self.luminance.as_str()),
            format!("-c{}", self.charset.as_str()),
        ];
        let flags = [
            (self.absolute_threshold, "-a"),
            (self.iter_threshold, "-T"),
            (self.debug, "-P"),
            (self.as_hex, "-X"),
            (self.omit_decimal_point, "-C"),
        ];
        args.extend(
            flags
                .iter()
                .filter(|(on, _)| *on)
                .map(|(_, flag)| flag.to_string()),
        );
        args.push("-".to_string());
        args
    }
}

/// Handle on an ssocr executable.
#[derive(Debug, Clone)]
pub struct Ssocr {
    executable: PathBuf,
}

impl Default for Ssocr {
    fn default() -> Self {
        Self::new(Path::new(NAME))
    }
}

impl Ssocr {
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
        options: &SsocrOptions,
    ) -> Result<String, EngineError> {
        let png = image.with_format(RasterFormat::Png).to_bytes()?;
        let output = Invocation::new(NAME, &self.executable)
            .args(options.arguments())
            .stdin(png)
            .run()?;
        if !output.status.success() {
            log::warn!("ssocr exited with {}", output.status);
        }
        interpret(&output.stdout, &output.stderr, options.debug)
    }

    /// Version number, e.g. `2.23.1`.
    pub fn version(&self) -> Result<String, EngineError> {
        let output = Invocation::new(NAME, &self.executable)
            .arg("--version")
            .run()?;
        output
            .stdout
            .lines()
            .next()
            .and_then(|line| line.split_whitespace().last())
            .map(str::to_string)
            .ok_or_else(|| EngineError::Runtime {
                engine: NAME.to_string(),
                message: format!("unexpected --version output: {:?}", output.stdout),
            })
    }
}

fn interpret(stdout: &str, stderr: &str, debug: bool) -> Result<String, EngineError> {
    if debug {
        return Ok(format!("{stderr}{}", stdout.trim_end()));
    }
    for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
        if line.starts_with(BENIGN_STDERR) {
            log::debug!("ignoring ssocr warning: {line}");
        } else {
            return Err(EngineError::Runtime {
                engine: NAME.to_string(),
                message: stderr.trim().to_string(),
            });
        }
    }
    Ok(stdout.trim_end().to_string())
}
