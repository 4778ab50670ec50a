//! The canonical image container.
//!
//! Every image entering the crate is decoded once into an [`ImageContainer`]:
//! an 8-bit single-channel or RGB raster plus a [`RasterFormat`] tag. Pipeline
//! stages work on the raster only; the tag is carried through untouched and is
//! consulted again only when the image is encoded at egress.
//!
//! ## Ingress
//!
//! | Source | Format tag |
//! |---|---|
//! | [`ImageSource::Path`] | file extension, else byte signature, else default |
//! | [`ImageSource::Text`] | as a path if the file exists, otherwise Base64 bytes |
//! | [`ImageSource::Bytes`] | declared format, else byte signature, else default |
//! | [`ImageSource::Native`] | default |
//! | [`ImageSource::Container`] | unchanged (same instance) |
//!
//! The pixel buffer lives behind an `Arc`, so cloning a container is cheap and
//! [`ImageContainer::same_instance`] can tell a pass-through from a copy.

use super::error::ImageError;
use super::params::Quality;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GrayImage, ImageFormat, ImageReader, RgbImage};
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Raster formats a container can be tagged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RasterFormat {
    Bmp,
    /// Cameras deliver JPEG, so untagged sources are assumed to be JPEG.
    #[default]
    Jpeg,
    Png,
    Tiff,
}

const EXTENSIONS: &[(&str, RasterFormat)] = &[
    ("bmp", RasterFormat::Bmp),
    ("dib", RasterFormat::Bmp),
    ("jpg", RasterFormat::Jpeg),
    ("jpeg", RasterFormat::Jpeg),
    ("jpe", RasterFormat::Jpeg),
    ("jfif", RasterFormat::Jpeg),
    ("png", RasterFormat::Png),
    ("tif", RasterFormat::Tiff),
    ("tiff", RasterFormat::Tiff),
];

const SIGNATURES: &[(&[u8], RasterFormat)] = &[
    (b"BM", RasterFormat::Bmp),
    (&[0xFF, 0xD8, 0xFF], RasterFormat::Jpeg),
    (
        &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A],
        RasterFormat::Png,
    ),
    (&[0x49, 0x49, 0x2A, 0x00], RasterFormat::Tiff),
    (&[0x4D, 0x4D, 0x00, 0x2A], RasterFormat::Tiff),
];

impl RasterFormat {
    /// Look up a format by file extension (case-insensitive, no dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        EXTENSIONS
            .iter()
            .find(|(e, _)| e.eq_ignore_ascii_case(ext))
            .map(|(_, f)| *f)
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Identify a format from the leading magic bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        SIGNATURES
            .iter()
            .find(|(magic, _)| bytes.starts_with(magic))
            .map(|(_, f)| *f)
    }

    pub fn extension(self) -> &'static str {
        match self {
            RasterFormat::Bmp => "bmp",
            RasterFormat::Jpeg => "jpg",
            RasterFormat::Png => "png",
            RasterFormat::Tiff => "tif",
        }
    }

    pub fn image_format(self) -> ImageFormat {
        match self {
            RasterFormat::Bmp => ImageFormat::Bmp,
            RasterFormat::Jpeg => ImageFormat::Jpeg,
            RasterFormat::Png => ImageFormat::Png,
            RasterFormat::Tiff => ImageFormat::Tiff,
        }
    }

    pub fn is_lossy(self) -> bool {
        self == RasterFormat::Jpeg
    }
}

/// Raw pixel storage: single channel or channel-last R,G,B.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pixels {
    Grey(GrayImage),
    Rgb(RgbImage),
}

impl Pixels {
    /// Canonicalize any decoded image to 8-bit grey or RGB. Alpha is dropped.
    pub fn from_dynamic(img: DynamicImage) -> Self {
        match img {
            DynamicImage::ImageLuma8(grey) => Pixels::Grey(grey),
            DynamicImage::ImageRgb8(rgb) => Pixels::Rgb(rgb),
            img if !img.color().has_color() => Pixels::Grey(img.to_luma8()),
            img => Pixels::Rgb(img.to_rgb8()),
        }
    }

    pub fn width(&self) -> u32 {
        match self {
            Pixels::Grey(img) => img.width(),
            Pixels::Rgb(img) => img.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            Pixels::Grey(img) => img.height(),
            Pixels::Rgb(img) => img.height(),
        }
    }

    pub fn channels(&self) -> u8 {
        match self {
            Pixels::Grey(_) => 1,
            Pixels::Rgb(_) => 3,
        }
    }

    /// Row-major samples, channel-last.
    pub fn as_raw(&self) -> &[u8] {
        match self {
            Pixels::Grey(img) => img.as_raw(),
            Pixels::Rgb(img) => img.as_raw(),
        }
    }

    pub fn to_dynamic(&self) -> DynamicImage {
        match self {
            Pixels::Grey(img) => DynamicImage::ImageLuma8(img.clone()),
            Pixels::Rgb(img) => DynamicImage::ImageRgb8(img.clone()),
        }
    }
}

/// Everything [`ImageContainer::decode`] accepts.
#[derive(Debug, Clone)]
pub enum ImageSource {
    Path(PathBuf),
    /// A filesystem path or a Base64 string (optionally a `data:` URI).
    Text(String),
    Bytes {
        data: Vec<u8>,
        format: Option<RasterFormat>,
    },
    Native(DynamicImage),
    Container(ImageContainer),
}

impl From<PathBuf> for ImageSource {
    fn from(path: PathBuf) -> Self {
        ImageSource::Path(path)
    }
}

impl From<&Path> for ImageSource {
    fn from(path: &Path) -> Self {
        ImageSource::Path(path.to_path_buf())
    }
}

impl From<String> for ImageSource {
    fn from(text: String) -> Self {
        ImageSource::Text(text)
    }
}

impl From<&str> for ImageSource {
    fn from(text: &str) -> Self {
        ImageSource::Text(text.to_string())
    }
}

impl From<Vec<u8>> for ImageSource {
    fn from(data: Vec<u8>) -> Self {
        ImageSource::Bytes { data, format: None }
    }
}

impl From<&[u8]> for ImageSource {
    fn from(data: &[u8]) -> Self {
        ImageSource::Bytes {
            data: data.to_vec(),
            format: None,
        }
    }
}

impl From<DynamicImage> for ImageSource {
    fn from(img: DynamicImage) -> Self {
        ImageSource::Native(img)
    }
}

impl From<ImageContainer> for ImageSource {
    fn from(container: ImageContainer) -> Self {
        ImageSource::Container(container)
    }
}

/// A decoded raster with the format it should be re-encoded as.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageContainer {
    pixels: Arc<Pixels>,
    format: RasterFormat,
}

impl ImageContainer {
    pub fn new(pixels: Pixels, format: RasterFormat) -> Self {
        Self {
            pixels: Arc::new(pixels),
            format,
        }
    }

    /// Decode any supported source into a container.
    pub fn decode(source: impl Into<ImageSource>) -> Result<Self, ImageError> {
        match source.into() {
            ImageSource::Container(container) => Ok(container),
            ImageSource::Native(img) => Ok(Self::new(
                Pixels::from_dynamic(img),
                RasterFormat::default(),
            )),
            ImageSource::Path(path) => Self::decode_path(&path),
            ImageSource::Bytes { data, format } => Self::decode_bytes(&data, format),
            ImageSource::Text(text) => {
                let path = Path::new(&text);
                if path.is_file() {
                    Self::decode_path(path)
                } else {
                    let data = decode_base64(&text)?;
                    Self::decode_bytes(&data, None)
                }
            }
        }
    }

    /// Decode everything readable from a stream.
    pub fn decode_reader(mut reader: impl Read) -> Result<Self, ImageError> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Self::decode_bytes(&data, None)
    }

    /// Wrap an in-memory pixel array (`channels` is 1 or 3, row-major, channel-last).
    pub fn from_raw(
        width: u32,
        height: u32,
        channels: u8,
        data: Vec<u8>,
        format: Option<RasterFormat>,
    ) -> Result<Self, ImageError> {
        let pixels = match channels {
            1 => GrayImage::from_raw(width, height, data).map(Pixels::Grey),
            3 => RgbImage::from_raw(width, height, data).map(Pixels::Rgb),
            other => {
                return Err(ImageError::InvalidInput(format!(
                    "unsupported channel count {other}"
                )));
            }
        };
        let pixels = pixels.ok_or_else(|| {
            ImageError::InvalidInput(format!(
                "pixel buffer does not match {width}x{height}x{channels}"
            ))
        })?;
        Ok(Self::new(pixels, format.unwrap_or_default()))
    }

    fn decode_path(path: &Path) -> Result<Self, ImageError> {
        let data = std::fs::read(path)?;
        let format = RasterFormat::from_path(path);
        Self::decode_bytes(&data, format).map_err(|e| match e {
            ImageError::InvalidInput(msg) => {
                ImageError::InvalidInput(format!("{}: {msg}", path.display()))
            }
            other => other,
        })
    }

    fn decode_bytes(data: &[u8], declared: Option<RasterFormat>) -> Result<Self, ImageError> {
        let format = declared
            .or_else(|| RasterFormat::sniff(data))
            .unwrap_or_default();
        let img = ImageReader::new(Cursor::new(data))
            .with_guessed_format()?
            .decode()
            .map_err(|e| ImageError::InvalidInput(format!("cannot decode image: {e}")))?;
        Ok(Self::new(Pixels::from_dynamic(img), format))
    }

    pub fn pixels(&self) -> &Pixels {
        &self.pixels
    }

    pub fn format(&self) -> RasterFormat {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn channels(&self) -> u8 {
        self.pixels.channels()
    }

    pub fn is_greyscale(&self) -> bool {
        matches!(*self.pixels, Pixels::Grey(_))
    }

    /// A new container holding `pixels`, keeping this container's format tag.
    pub fn with_pixels(&self, pixels: Pixels) -> Self {
        Self::new(pixels, self.format)
    }

    /// The same pixels under a different format tag.
    pub fn with_format(&self, format: RasterFormat) -> Self {
        Self {
            pixels: Arc::clone(&self.pixels),
            format,
        }
    }

    /// Whether both containers share one pixel buffer.
    pub fn same_instance(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.pixels, &other.pixels) && self.format == other.format
    }

    pub fn to_native(&self) -> DynamicImage {
        self.pixels.to_dynamic()
    }

    /// Encode with the stored format tag at the default quality.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ImageError> {
        self.to_bytes_with(Quality::default())
    }

    /// Encode with the stored format tag; `quality` applies to JPEG only.
    pub fn to_bytes_with(&self, quality: Quality) -> Result<Vec<u8>, ImageError> {
        encode(&self.to_native(), self.format, quality)
    }

    pub fn to_base64(&self) -> Result<String, ImageError> {
        Ok(BASE64.encode(self.to_bytes()?))
    }

    pub fn to_base64_with(&self, quality: Quality) -> Result<String, ImageError> {
        Ok(BASE64.encode(self.to_bytes_with(quality)?))
    }

    /// Write to `path`, choosing the format from its extension or the stored tag.
    pub fn save(&self, path: &Path, quality: Quality) -> Result<(), ImageError> {
        let format = RasterFormat::from_path(path).unwrap_or(self.format);
        let bytes = encode(&self.to_native(), format, quality)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

fn encode(
    img: &DynamicImage,
    format: RasterFormat,
    quality: Quality,
) -> Result<Vec<u8>, ImageError> {
    let mut buf = Vec::new();
    match format {
        RasterFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut buf, quality.value());
            img.write_with_encoder(encoder)
                .map_err(|e| ImageError::Encode(format!("JPEG encode failed: {e}")))?;
        }
        other => {
            img.write_to(&mut Cursor::new(&mut buf), other.image_format())
                .map_err(|e| ImageError::Encode(format!("{other:?} encode failed: {e}")))?;
        }
    }
    Ok(buf)
}

fn decode_base64(text: &str) -> Result<Vec<u8>, ImageError> {
    let text = text.trim();
    let payload = match text.strip_prefix("data:") {
        Some(uri) => uri.split_once(',').map_or(uri, |(_, data)| data),
        None => text,
    };
    let data = BASE64
        .decode(payload)
        .map_err(|_| ImageError::InvalidInput("Invalid path or base64 string".into()))?;
    if data.is_empty() {
        return Err(ImageError::InvalidInput(
            "Invalid path or base64 string".into(),
        ));
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{gradient_grey, gradient_rgb};

    /// Largest per-sample change one JPEG re-encode at unchanged quality may cause.
    const JPEG_REENCODE_TOLERANCE: u8 = 8;

    fn png_bytes(container: &ImageContainer) -> Vec<u8> {
        container.with_format(RasterFormat::Png).to_bytes().unwrap()
    }

    // =========================================================================
    // format inference
    // =========================================================================

    #[test]
    fn sniff_recognizes_magic_prefixes() {
        assert_eq!(RasterFormat::sniff(b"BM\x00\x00"), Some(RasterFormat::Bmp));
        assert_eq!(
            RasterFormat::sniff(&[0xFF, 0xD8, 0xFF, 0xE0]),
            Some(RasterFormat::Jpeg)
        );
        assert_eq!(
            RasterFormat::sniff(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0]),
            Some(RasterFormat::Png)
        );
        assert_eq!(
            RasterFormat::sniff(&[0x49, 0x49, 0x2A, 0x00]),
            Some(RasterFormat::Tiff)
        );
        assert_eq!(RasterFormat::sniff(b"GIF89a"), None);
    }

    #[test]
    fn extension_lookup_is_case_insensitive() {
        assert_eq!(RasterFormat::from_extension("JPG"), Some(RasterFormat::Jpeg));
        assert_eq!(RasterFormat::from_extension("tiff"), Some(RasterFormat::Tiff));
        assert_eq!(RasterFormat::from_extension("webp"), None);
    }

    #[test]
    fn bytes_are_tagged_by_signature() {
        let png = png_bytes(&ImageContainer::new(gradient_rgb(8, 6), RasterFormat::Jpeg));
        let decoded = ImageContainer::decode(png).unwrap();
        assert_eq!(decoded.format(), RasterFormat::Png);
    }

    #[test]
    fn declared_format_wins_over_signature() {
        let png = png_bytes(&ImageContainer::new(gradient_rgb(8, 6), RasterFormat::Jpeg));
        let decoded = ImageContainer::decode(ImageSource::Bytes {
            data: png,
            format: Some(RasterFormat::Tiff),
        })
        .unwrap();
        assert_eq!(decoded.format(), RasterFormat::Tiff);
    }

    #[test]
    fn native_and_raw_sources_get_default_tag() {
        let native = DynamicImage::ImageRgb8(RgbImage::new(4, 4));
        assert_eq!(
            ImageContainer::decode(native).unwrap().format(),
            RasterFormat::Jpeg
        );
        let raw = ImageContainer::from_raw(2, 2, 1, vec![0, 1, 2, 3], None).unwrap();
        assert_eq!(raw.format(), RasterFormat::Jpeg);
        assert!(raw.is_greyscale());
    }

    #[test]
    fn raw_buffer_size_mismatch_is_invalid() {
        let err = ImageContainer::from_raw(4, 4, 3, vec![0; 10], None).unwrap_err();
        assert!(err.is_invalid_input());
        let err = ImageContainer::from_raw(1, 1, 2, vec![0; 2], None).unwrap_err();
        assert!(err.is_invalid_input());
    }

    // =========================================================================
    // round trips
    // =========================================================================

    #[test]
    fn lossless_formats_round_trip_through_files() {
        let tmp = tempfile::TempDir::new().unwrap();
        let original = ImageContainer::new(gradient_rgb(32, 24), RasterFormat::Png);
        for format in [RasterFormat::Png, RasterFormat::Tiff, RasterFormat::Bmp] {
            let path = tmp.path().join(format!("img.{}", format.extension()));
            std::fs::write(&path, original.with_format(format).to_bytes().unwrap()).unwrap();

            let decoded = ImageContainer::decode(path.as_path()).unwrap();
            assert_eq!(decoded.format(), format);
            assert_eq!(decoded.pixels(), original.pixels(), "{format:?}");
        }
    }

    #[test]
    fn greyscale_stays_single_channel_through_png() {
        let grey = ImageContainer::new(gradient_grey(16, 16), RasterFormat::Png);
        let decoded = ImageContainer::decode(grey.to_bytes().unwrap()).unwrap();
        assert!(decoded.is_greyscale());
        assert_eq!(decoded.pixels(), grey.pixels());
    }

    #[test]
    fn base64_text_round_trips() {
        let original = ImageContainer::new(gradient_rgb(10, 10), RasterFormat::Png);
        let text = original.to_base64().unwrap();
        let decoded = ImageContainer::decode(text.as_str()).unwrap();
        assert_eq!(decoded.pixels(), original.pixels());

        let uri = format!("data:image/png;base64,{text}");
        let decoded = ImageContainer::decode(uri).unwrap();
        assert_eq!(decoded.pixels(), original.pixels());
    }

    #[test]
    fn path_given_as_text_is_read_from_disk() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("frame.png");
        let original = ImageContainer::new(gradient_rgb(5, 7), RasterFormat::Png);
        original.save(&path, Quality::default()).unwrap();

        let decoded = ImageContainer::decode(path.to_string_lossy().to_string()).unwrap();
        assert_eq!(decoded.pixels(), original.pixels());
    }

    #[test]
    fn reader_and_native_round_trip() {
        let original = ImageContainer::new(gradient_rgb(9, 4), RasterFormat::Png);
        let bytes = original.to_bytes().unwrap();
        let decoded = ImageContainer::decode_reader(bytes.as_slice()).unwrap();
        assert_eq!(decoded.pixels(), original.pixels());

        let native = ImageContainer::decode(original.to_native()).unwrap();
        assert_eq!(native.pixels(), original.pixels());
    }

    #[test]
    fn jpeg_single_reencode_keeps_pixels() {
        let quality = Quality::new(90);
        let source = ImageContainer::new(gradient_rgb(32, 32), RasterFormat::Jpeg);
        let first = ImageContainer::decode(source.to_bytes_with(quality).unwrap()).unwrap();
        let second = ImageContainer::decode(first.to_bytes_with(quality).unwrap()).unwrap();

        assert_eq!(second.format(), RasterFormat::Jpeg);
        assert_eq!((second.width(), second.height()), (32, 32));
        let before = first.pixels().as_raw();
        let after = second.pixels().as_raw();
        assert_eq!(before.len(), after.len());
        let worst = before
            .iter()
            .zip(after)
            .map(|(a, b)| a.abs_diff(*b))
            .max()
            .unwrap();
        assert!(worst <= JPEG_REENCODE_TOLERANCE, "max sample drift {worst}");
    }

    #[test]
    fn jpeg_reencode_of_noise_drifts_little_on_average() {
        // Noise re-quantizes visibly per sample, so only the average is bounded.
        let pixels: Vec<u8> = (0..32u32 * 32 * 3)
            .map(|i| (i.wrapping_mul(2_654_435_761) >> 24) as u8)
            .collect();
        let noisy = Pixels::Rgb(RgbImage::from_raw(32, 32, pixels).unwrap());
        let quality = Quality::new(90);
        let source = ImageContainer::new(noisy, RasterFormat::Jpeg);
        let first = ImageContainer::decode(source.to_bytes_with(quality).unwrap()).unwrap();
        let second = ImageContainer::decode(first.to_bytes_with(quality).unwrap()).unwrap();
        let mean: f64 = first
            .pixels()
            .as_raw()
            .iter()
            .zip(second.pixels().as_raw())
            .map(|(a, b)| f64::from(a.abs_diff(*b)))
            .sum::<f64>()
            / first.pixels().as_raw().len() as f64;
        assert!(mean <= f64::from(JPEG_REENCODE_TOLERANCE), "mean drift {mean}");
    }

    // =========================================================================
    // identity and errors
    // =========================================================================

    #[test]
    fn decoding_a_container_returns_the_same_instance() {
        let original = ImageContainer::new(gradient_rgb(4, 4), RasterFormat::Bmp);
        let again = ImageContainer::decode(original.clone()).unwrap();
        assert!(again.same_instance(&original));

        let copy = ImageContainer::new(gradient_rgb(4, 4), RasterFormat::Bmp);
        assert!(!copy.same_instance(&original));
        assert_eq!(copy, original);
    }

    #[test]
    fn garbage_text_is_invalid_input() {
        let err = ImageContainer::decode("definitely not base64 !!").unwrap_err();
        assert!(err.is_invalid_input());
        assert!(err.to_string().contains("Invalid path or base64 string"));
    }

    #[test]
    fn undecodable_bytes_are_invalid_input() {
        let err = ImageContainer::decode(vec![0x89, b'P', b'N', b'G', 0, 0]).unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[test]
    fn missing_path_is_io_error() {
        let err = ImageContainer::decode(Path::new("/nonexistent/frame.png")).unwrap_err();
        assert!(matches!(err, ImageError::Io(_)));
    }
}
