//! # Camera OCR
//!
//! Reads digits and text off images from a camera: a meter, a lab
//! instrument's seven-segment display, a label. Each region of interest (ROI)
//! gets its own ordered list of image-processing tasks and a recognition
//! engine; the processed image is handed to the engine and the text comes back
//! together with the image that was recognized.
//!
//! # Data Flow
//!
//! ```text
//! capture / file / base64  →  ImageContainer
//!                          →  Pipeline (crop, rotate, threshold, ...)
//!                          →  engine (tesseract | ssocr)  →  text
//! ```
//!
//! Interactive previews wrap the last step in a [`dispatch::DispatchQueue`]
//! so that dragging an ROI only ever recognizes the newest frame. Zooming on a
//! rotated preview goes through [`geometry`], which maps the on-screen
//! selection back into the camera's full frame.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`imaging`] | Image container, task pipeline, pixel operations |
//! | [`geometry`] | Rotated-selection to zoom-window mapping, nested zoom history |
//! | [`engine`] | Recognition engines run as external programs |
//! | [`dispatch`] | Single-flight, coalescing recognition queue |
//! | [`camera`] | Camera surface: capture, typed settings, persistent zoom |
//! | [`parameters`] | Per-ROI parameters file with change tracking |
//! | [`config`] | `config.toml` loading, validation, merging |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## One Image Representation
//!
//! Every input (path, bytes, base64, decoded image) is converted once, at
//! ingress, into an [`imaging::ImageContainer`]: 8-bit grey or RGB pixels plus
//! the raster format to re-encode with. Operations never branch on where an
//! image came from.
//!
//! ## Closed Operation Registry
//!
//! Task names resolve against a fixed table in [`imaging::pipeline`]. An
//! unknown name or a bad argument is an error when the pipeline is compiled,
//! before any pixel is touched.
//!
//! ## Engines as Configured Values
//!
//! Engine executables come from `config.toml` and are stored in an
//! [`engine::Engines`] built at startup, then passed to whatever recognizes.
//! Tests substitute any [`engine::Recognize`] implementation.

pub mod camera;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod geometry;
pub mod imaging;
pub mod output;
pub mod parameters;

#[cfg(test)]
pub(crate) mod test_helpers;
