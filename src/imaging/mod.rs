//! Image handling: the canonical container and the transform pipeline.
//!
//! | Concern | Crate / function |
//! |---|---|
//! | **Decode / encode** (BMP, JPEG, PNG, TIFF) | `image` codecs, Base64 via `base64` |
//! | **Crop** | `image::imageops::crop_imm` |
//! | **Rotate** | `imageproc::geometric_transformations::warp_into` (bilinear) |
//! | **Gaussian blur** | `imageproc::filter::separable_filter_equal` |
//! | **Threshold, invert, greyscale, morphology, adaptive threshold** | in-crate |
//!
//! The module is split into:
//! - **Container**: [`ImageContainer`], ingress from any [`ImageSource`] and egress to bytes/Base64
//! - **Parameters**: [`Task`], [`Param`], [`Region`] and friends
//! - **Calculations**: pure geometry and kernel math (unit testable)
//! - **Operations**: the individual pixel operations
//! - **Pipeline**: operation registry, argument binding and [`process`]

mod calculations;
pub mod container;
mod error;
pub mod operations;
mod params;
pub mod pipeline;

pub use calculations::{RotationFrame, normalize_angle, region_to_pixels};
pub use container::{ImageContainer, ImageSource, Pixels, RasterFormat};
pub use error::ImageError;
pub use params::{Param, Quality, Region, Task, TaskValue};
pub use pipeline::{Pipeline, Transform, process};
