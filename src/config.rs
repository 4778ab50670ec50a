//! Tool configuration.
//!
//! Handles loading, validating, and merging `config.toml`. User values are
//! merged over the stock defaults, so a config file only needs the keys it
//! wants to change. Unknown keys are rejected.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [engines.tesseract]
//! executable = "tesseract"  # Name on PATH, full path, or install directory
//!
//! [engines.ssocr]
//! executable = "ssocr"
//!
//! [images]
//! jpeg_quality = 85         # Quality for JPEG re-encoding (1-100)
//!
//! [dispatch]
//! shutdown_timeout_ms = 10000 # How long to wait for a busy worker on close
//!
//! [processing]
//! max_processes = 4         # Max parallel ROIs for `run` (omit for auto = CPU cores)
//! ```
//!
//! The executables end up in an [`Engines`](crate::engine::Engines) built once
//! at startup; nothing reads them from global state.

use crate::imaging::Quality;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Configuration loaded from `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Where the recognition engines live.
    pub engines: EnginesConfig,
    /// Image encoding settings.
    pub images: ImagesConfig,
    /// Interactive recognition queue settings.
    pub dispatch: DispatchConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl Config {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.images.jpeg_quality) {
            return Err(ConfigError::Validation(
                "images.jpeg_quality must be 1-100".into(),
            ));
        }
        for (name, engine) in [
            ("tesseract", &self.engines.tesseract),
            ("ssocr", &self.engines.ssocr),
        ] {
            if engine.executable.as_os_str().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "engines.{name}.executable must not be empty"
                )));
            }
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Executable locations for each engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnginesConfig {
    pub tesseract: EngineConfig,
    pub ssocr: EngineConfig,
}

impl Default for EnginesConfig {
    fn default() -> Self {
        Self {
            tesseract: EngineConfig::named("tesseract"),
            ssocr: EngineConfig::named("ssocr"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Program name looked up on PATH, a full path, or a directory holding it.
    pub executable: PathBuf,
}

impl EngineConfig {
    fn named(name: &str) -> Self {
        Self {
            executable: PathBuf::from(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImagesConfig {
    /// JPEG encoding quality (1 = worst, 100 = best).
    pub jpeg_quality: u32,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self { jpeg_quality: 85 }
    }
}

impl ImagesConfig {
    pub fn quality(&self) -> Quality {
        Quality::new(self.jpeg_quality)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchConfig {
    /// Milliseconds to wait for the worker to exit when a queue shuts down.
    pub shutdown_timeout_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout_ms: 10_000,
        }
    }
}

impl DispatchConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of ROIs recognized at once.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Threads for recognizing ROIs in parallel: `max_processes` when set, but
/// never more than the machine reports.
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let available = std::thread::available_parallelism().map_or(1, |n| n.get());
    match config.max_processes {
        Some(cap) => cap.clamp(1, available),
        None => available,
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the base layer that user overrides are merged on top of.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(Config::default())?)
}

/// Lay a user `config.toml` over the stock values.
///
/// Sections combine key by key at any depth, so `[engines.ssocr]` alone
/// keeps the stock `[engines.tesseract]`. A non-table user value wins.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut stock), toml::Value::Table(user)) => {
            for (key, value) in user {
                let value = match stock.remove(&key) {
                    Some(existing) => merge_toml(existing, value),
                    None => value,
                };
                stock.insert(key, value);
            }
            toml::Value::Table(stock)
        }
        (_, user) => user,
    }
}

/// Merge an optional overlay onto the defaults, then deserialize and validate.
pub fn resolve_config(overlay: Option<toml::Value>) -> Result<Config, ConfigError> {
    let base = stock_defaults_value()?;
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: Config = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load a config file.
///
/// `None` means "no config file": the stock defaults are used. A path that
/// does not exist is an error, since the user asked for it explicitly.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let overlay = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            Some(toml::from_str::<toml::Value>(&content)?)
        }
        None => None,
    };
    resolve_config(overlay)
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Camera OCR Configuration
# ========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Recognition engines
# ---------------------------------------------------------------------------
# Each executable may be a program name looked up on PATH, a full path to
# the program, or the directory it is installed in.
[engines.tesseract]
executable = "tesseract"

[engines.ssocr]
executable = "ssocr"

# ---------------------------------------------------------------------------
# Image encoding
# ---------------------------------------------------------------------------
[images]
# JPEG quality used when an image is re-encoded (1 = worst, 100 = best).
jpeg_quality = 85

# ---------------------------------------------------------------------------
# Interactive recognition
# ---------------------------------------------------------------------------
[dispatch]
# Milliseconds to wait for a running recognition when a preview closes.
shutdown_timeout_ms = 10000

# ---------------------------------------------------------------------------
# Parallel processing
# ---------------------------------------------------------------------------
[processing]
# Maximum number of ROIs recognized at once by `run`.
# Omit to use all CPU cores. Values above the core count are clamped.
# max_processes = 4
"##
}
