//! # Image Processing Module
//!
//! Questo modulo implementa la capability di compressione: decodifica
//! l'immagine in memoria, limita il lato lungo e la ricodifica entro un
//! budget di byte.
//!
//! ## Formati
//!
//! | Formato | Input | Output | Libreria |
//! |---------|-------|--------|----------|
//! | JPEG    | ✅    | ✅     | `image` (qualità configurabile) |
//! | PNG     | ✅    | ✅     | `image` (lossless) |
//! | WebP    | ✅    | ✅     | `image` in lettura, `webp` (libwebp, lossy) in scrittura |
//! | GIF     | ✅    | ❌     | `image` (solo primo frame) |
//!
//! ## Pipeline per file
//!
//! 1. **Decodifica** (`spawn_blocking`): input corrotti o vuoti falliscono qui
//! 2. **Resize**: se il lato lungo supera `max_longest_edge`, ridimensiona mantenendo l'aspect ratio
//! 3. **Encoding iterativo**: parte da `initial_quality`, scende di 10 fino a
//!    `min_quality`, poi riduce le dimensioni del 20% per tentativo, al massimo
//!    `max_iterations` tentativi
//! 4. Se nessun tentativo rientra nel budget viene restituito il più piccolo
//!
//! Il progresso riportato al chiamante va da 0 a 100 per il file corrente:
//! 10 dopo la decodifica, 20 dopo il resize, poi lineare sui tentativi.
//!
//! ## Esempio
//!
//! ```rust,no_run
//! # async fn demo(bytes: bytes::Bytes) -> Result<(), image_batch_optimizer::error::CompressionError> {
//! use image_batch_optimizer::{CompressionConfig, image_processor::{Compressor, ImageProcessor}};
//!
//! let processor = ImageProcessor::new();
//! let mut on_progress = |p: f64| println!("{p:.0}%");
//! let webp = processor.compress(bytes, &CompressionConfig::default(), &mut on_progress).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::{CompressionConfig, OutputFormat, WEBP_MAX_DIMENSION};
use crate::error::CompressionError;
use async_trait::async_trait;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use serde::Serialize;
use std::io::Cursor;
use std::sync::Arc;
use tracing::{debug, warn};

/// Quality decrement between two lossy encode attempts
const QUALITY_STEP: u8 = 10;

/// Dimension factor applied once quality cannot go lower
const DOWNSCALE_FACTOR: f64 = 0.8;

/// Compression capability: one file in, one encoded file out.
///
/// `progress` receives values in [0, 100] for the file being compressed.
#[async_trait]
pub trait Compressor: Send + Sync {
    async fn compress(
        &self,
        content: Bytes,
        config: &CompressionConfig,
        progress: &mut (dyn FnMut(f64) + Send),
    ) -> Result<Bytes, CompressionError>;
}

/// Dimensions and format of a decoded image, for previews
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewImage {
    pub width: u32,
    pub height: u32,
    pub format: String,
}

/// In-memory image compressor
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageProcessor;

impl ImageProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Reads format and dimensions without decoding pixel data
    pub fn probe(content: &[u8]) -> Result<PreviewImage, CompressionError> {
        let reader = image::io::Reader::new(Cursor::new(content))
            .with_guessed_format()
            .map_err(|e| CompressionError::Decode(e.to_string()))?;
        let format = reader
            .format()
            .map(|f| format!("{:?}", f).to_lowercase())
            .ok_or_else(|| CompressionError::Decode("unrecognised image format".to_string()))?;
        let (width, height) = reader
            .into_dimensions()
            .map_err(|e| CompressionError::Decode(e.to_string()))?;

        Ok(PreviewImage {
            width,
            height,
            format,
        })
    }

    /// Decodes an image from memory
    pub fn decode(content: &[u8]) -> Result<DynamicImage, CompressionError> {
        let image =
            image::load_from_memory(content).map_err(|e| CompressionError::Decode(e.to_string()))?;
        if image.width() == 0 || image.height() == 0 {
            return Err(CompressionError::EmptyImage);
        }
        Ok(image)
    }

    /// Dimensions fitting `width x height` inside a square of `max_edge`,
    /// keeping the aspect ratio. Never upscales.
    pub fn fit_within(width: u32, height: u32, max_edge: u32) -> (u32, u32) {
        let longest = width.max(height);
        if longest <= max_edge {
            return (width, height);
        }
        Self::scaled(width, height, max_edge as f64 / longest as f64)
    }

    fn scaled(width: u32, height: u32, factor: f64) -> (u32, u32) {
        let w = ((width as f64) * factor).round().max(1.0) as u32;
        let h = ((height as f64) * factor).round().max(1.0) as u32;
        (w, h)
    }

    fn resize_to(image: &DynamicImage, width: u32, height: u32) -> DynamicImage {
        if image.dimensions() == (width, height) {
            image.clone()
        } else {
            image.resize_exact(width, height, FilterType::Lanczos3)
        }
    }

    /// Encodes an image in the given format
    pub fn encode(
        image: &DynamicImage,
        format: OutputFormat,
        quality: u8,
    ) -> Result<Vec<u8>, CompressionError> {
        match format {
            OutputFormat::Webp => {
                if image.width() > WEBP_MAX_DIMENSION || image.height() > WEBP_MAX_DIMENSION {
                    return Err(CompressionError::Encode {
                        format: "webp",
                        reason: format!(
                            "{}x{} exceeds the WebP limit of {} px per edge",
                            image.width(),
                            image.height(),
                            WEBP_MAX_DIMENSION
                        ),
                    });
                }
                let image = match image {
                    DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => image.clone(),
                    other => DynamicImage::ImageRgba8(other.to_rgba8()),
                };
                let encoder = webp::Encoder::from_image(&image).map_err(|reason| {
                    CompressionError::Encode {
                        format: "webp",
                        reason: reason.to_string(),
                    }
                })?;
                let encoded = encoder
                    .encode_simple(false, quality as f32)
                    .map_err(|e| CompressionError::Encode {
                        format: "webp",
                        reason: format!("{:?}", e),
                    })?;
                // WebPMemory is !Send: copy it out before leaving this thread
                Ok(encoded.to_vec())
            }
            OutputFormat::Jpeg => {
                let rgb = image.to_rgb8();
                let mut buffer = Vec::new();
                JpegEncoder::new_with_quality(&mut buffer, quality)
                    .encode(rgb.as_raw(), rgb.width(), rgb.height(), image::ExtendedColorType::Rgb8)
                    .map_err(|e| CompressionError::Encode {
                        format: "jpeg",
                        reason: e.to_string(),
                    })?;
                Ok(buffer)
            }
            OutputFormat::Png => {
                let mut buffer = Vec::new();
                image
                    .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
                    .map_err(|e| CompressionError::Encode {
                        format: "png",
                        reason: e.to_string(),
                    })?;
                Ok(buffer)
            }
        }
    }
}

/// Sequence of (quality, scale) settings tried until the budget is met
#[derive(Debug, Clone, Copy, PartialEq)]
struct EncodeAttempt {
    quality: u8,
    scale: f64,
}

impl EncodeAttempt {
    fn first(config: &CompressionConfig) -> Self {
        Self {
            quality: config.initial_quality,
            scale: 1.0,
        }
    }

    fn next(self, config: &CompressionConfig) -> Self {
        if config.output_format.is_lossy() && self.quality > config.min_quality {
            Self {
                quality: self.quality.saturating_sub(QUALITY_STEP).max(config.min_quality),
                scale: self.scale,
            }
        } else {
            Self {
                quality: self.quality,
                scale: self.scale * DOWNSCALE_FACTOR,
            }
        }
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, CompressionError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, CompressionError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CompressionError::Aborted(e.to_string()))?
}

#[async_trait]
impl Compressor for ImageProcessor {
    async fn compress(
        &self,
        content: Bytes,
        config: &CompressionConfig,
        progress: &mut (dyn FnMut(f64) + Send),
    ) -> Result<Bytes, CompressionError> {
        progress(0.0);

        let decoded = run_blocking(move || Self::decode(&content)).await?;
        progress(10.0);

        let max_edge = config.max_longest_edge;
        let bounded = run_blocking(move || {
            let (w, h) = Self::fit_within(decoded.width(), decoded.height(), max_edge);
            Ok(Self::resize_to(&decoded, w, h))
        })
        .await?;
        let base = Arc::new(bounded);
        let (base_w, base_h) = base.dimensions();
        progress(20.0);

        let format = config.output_format;
        let iterations = config.max_iterations.max(1);
        let mut attempt = EncodeAttempt::first(config);
        let mut smallest: Option<Vec<u8>> = None;

        for round in 1..=iterations {
            let image = Arc::clone(&base);
            let (w, h) = ImageProcessor::scaled(base_w, base_h, attempt.scale);
            let quality = attempt.quality;
            let encoded = run_blocking(move || {
                let resized = Self::resize_to(&image, w, h);
                Self::encode(&resized, format, quality)
            })
            .await?;

            debug!(
                "Encode attempt {}/{}: {}x{} q{} -> {} bytes",
                round,
                iterations,
                w,
                h,
                quality,
                encoded.len()
            );

            let fits = encoded.len() as u64 <= config.max_output_bytes;
            if smallest.as_ref().map_or(true, |s| encoded.len() < s.len()) {
                smallest = Some(encoded);
            }
            if fits {
                break;
            }

            progress(20.0 + 80.0 * round as f64 / iterations as f64);
            attempt = attempt.next(config);
        }

        let output = smallest.ok_or_else(|| CompressionError::Encode {
            format: format.extension(),
            reason: "no encode attempt produced output".to_string(),
        })?;
        if output.len() as u64 > config.max_output_bytes {
            warn!(
                "Could not reach {} bytes after {} attempts, keeping {} bytes",
                config.max_output_bytes,
                iterations,
                output.len()
            );
        }

        progress(100.0);
        Ok(Bytes::from(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb, Rgba};

    /// Noisy RGB image so that encoders cannot shrink it to nothing
    fn noisy_png(width: u32, height: u32) -> Bytes {
        let mut seed: u32 = 0x1234_5678;
        let img = ImageBuffer::from_fn(width, height, |_, _| {
            seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let b = seed.to_be_bytes();
            Rgb([b[0], b[1], b[2]])
        });
        let mut buffer = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        Bytes::from(buffer)
    }

    fn transparent_png(width: u32, height: u32) -> Bytes {
        let img = ImageBuffer::from_pixel(width, height, Rgba([10u8, 20, 30, 128]));
        let mut buffer = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        Bytes::from(buffer)
    }

    fn config(format: OutputFormat, max_edge: u32, max_bytes: u64) -> CompressionConfig {
        CompressionConfig {
            max_output_bytes: max_bytes,
            max_longest_edge: max_edge,
            output_format: format,
            ..Default::default()
        }
    }

    #[test]
    fn test_fit_within() {
        assert_eq!(ImageProcessor::fit_within(4000, 3000, 1920), (1920, 1440));
        assert_eq!(ImageProcessor::fit_within(3000, 4000, 1920), (1440, 1920));
        assert_eq!(ImageProcessor::fit_within(800, 600, 1920), (800, 600));
        assert_eq!(ImageProcessor::fit_within(10_000, 1, 100), (100, 1));
    }

    #[test]
    fn test_attempt_sequence() {
        let cfg = CompressionConfig {
            initial_quality: 50,
            min_quality: 30,
            ..Default::default()
        };
        let a = EncodeAttempt::first(&cfg);
        let b = a.next(&cfg);
        let c = b.next(&cfg);
        let d = c.next(&cfg);
        assert_eq!((a.quality, a.scale), (50, 1.0));
        assert_eq!((b.quality, b.scale), (40, 1.0));
        assert_eq!((c.quality, c.scale), (30, 1.0));
        assert_eq!(d.quality, 30);
        assert!((d.scale - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_png_attempts_only_downscale() {
        let cfg = CompressionConfig {
            output_format: OutputFormat::Png,
            ..Default::default()
        };
        let next = EncodeAttempt::first(&cfg).next(&cfg);
        assert_eq!(next.quality, cfg.initial_quality);
        assert!((next.scale - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_probe() {
        let preview = ImageProcessor::probe(&noisy_png(40, 20)).unwrap();
        assert_eq!(preview.width, 40);
        assert_eq!(preview.height, 20);
        assert_eq!(preview.format, "png");
        assert!(ImageProcessor::probe(b"definitely not an image").is_err());
    }

    #[tokio::test]
    async fn test_compress_to_webp_bounds_dimensions() {
        let processor = ImageProcessor::new();
        let mut seen = Vec::new();
        let mut on_progress = |p: f64| seen.push(p);

        let output = processor
            .compress(noisy_png(300, 150), &config(OutputFormat::Webp, 100, 1024 * 1024), &mut on_progress)
            .await
            .unwrap();

        assert_eq!(&output[0..4], b"RIFF");
        assert_eq!(&output[8..12], b"WEBP");
        let decoded = image::load_from_memory(&output).unwrap();
        assert_eq!(decoded.dimensions(), (100, 50));

        assert_eq!(seen.first(), Some(&0.0));
        assert_eq!(seen.last(), Some(&100.0));
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_compress_webp_with_alpha() {
        let processor = ImageProcessor::new();
        let output = processor
            .compress(transparent_png(32, 32), &config(OutputFormat::Webp, 1920, 1024 * 1024), &mut |_: f64| {})
            .await
            .unwrap();
        assert_eq!(&output[8..12], b"WEBP");
    }

    #[tokio::test]
    async fn test_compress_to_jpeg_and_png() {
        let processor = ImageProcessor::new();

        let jpeg = processor
            .compress(noisy_png(64, 64), &config(OutputFormat::Jpeg, 1920, 1024 * 1024), &mut |_: f64| {})
            .await
            .unwrap();
        assert_eq!(&jpeg[0..2], &[0xFF, 0xD8]);

        let png = processor
            .compress(noisy_png(64, 64), &config(OutputFormat::Png, 32, 1024 * 1024), &mut |_: f64| {})
            .await
            .unwrap();
        assert_eq!(&png[0..4], b"\x89PNG");
        assert_eq!(image::load_from_memory(&png).unwrap().dimensions(), (32, 32));
    }

    #[tokio::test]
    async fn test_tight_budget_shrinks_output() {
        let processor = ImageProcessor::new();
        let source = noisy_png(256, 256);

        let relaxed = processor
            .compress(source.clone(), &config(OutputFormat::Jpeg, 1920, u64::MAX), &mut |_: f64| {})
            .await
            .unwrap();
        let tight = processor
            .compress(source, &config(OutputFormat::Jpeg, 1920, 2 * 1024), &mut |_: f64| {})
            .await
            .unwrap();

        assert!(tight.len() < relaxed.len());
    }

    #[test]
    fn test_webp_over_edge_limit_is_an_error() {
        let wide = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(
            WEBP_MAX_DIMENSION + 1,
            1,
            Rgb([0u8, 0, 0]),
        ));
        let result = ImageProcessor::encode(&wide, OutputFormat::Webp, 80);
        assert!(matches!(result, Err(CompressionError::Encode { format: "webp", .. })));
    }

    #[tokio::test]
    async fn test_oversized_webp_run_fails_instead_of_panicking() {
        let processor = ImageProcessor::new();
        let cfg = CompressionConfig {
            max_longest_edge: 20_000,
            max_iterations: 1,
            ..Default::default()
        };
        let result = processor
            .compress(noisy_png(WEBP_MAX_DIMENSION + 10, 2), &cfg, &mut |_: f64| {})
            .await;
        assert!(matches!(result, Err(CompressionError::Encode { format: "webp", .. })));
    }

    #[tokio::test]
    async fn test_corrupt_input_is_rejected() {
        let processor = ImageProcessor::new();
        let result = processor
            .compress(Bytes::from_static(b"\x89PNG\r\n\x1a\ngarbage"), &CompressionConfig::default(), &mut |_: f64| {})
            .await;
        assert!(matches!(result, Err(CompressionError::Decode(_))));
    }

    #[tokio::test]
    async fn test_zero_byte_input_is_rejected_by_decoder() {
        let processor = ImageProcessor::new();
        let result = processor
            .compress(Bytes::new(), &CompressionConfig::default(), &mut |_: f64| {})
            .await;
        assert!(matches!(result, Err(CompressionError::Decode(_))));
    }
}
