//! Frame validation, resizing and JPEG encoding.

use async_trait::async_trait;
use image::{
    codecs::jpeg::JpegEncoder,
    imageops::{self, FilterType},
    DynamicImage, ImageBuffer, Rgba, RgbaImage,
};
use proctorcam_types::{config::CaptureConfig, frame::Frame, ProctorError, Result};
use tracing::debug;

pub mod darkness;

pub use darkness::{black_pixel_percentage, check_darkness, BLACK_CHANNEL_THRESHOLD};

pub const JPEG_CONTENT_TYPE: &str = "image/jpeg";

/// Compressed snapshot ready for upload.
#[derive(Debug, Clone)]
pub struct EncodedSnapshot {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub content_type: &'static str,
}

impl EncodedSnapshot {
    pub fn size_mb(&self) -> f64 {
        self.bytes.len() as f64 / (1024.0 * 1024.0)
    }
}

#[async_trait]
pub trait SnapshotEncoder: Send + Sync {
    /// Resize and compress a frame that already passed validation.
    async fn encode(&self, frame: Frame) -> Result<EncodedSnapshot>;
}

/// Box-downscales to a fixed size and encodes JPEG off the async runtime.
#[derive(Debug, Clone)]
pub struct JpegSnapshotEncoder {
    target_width: u32,
    target_height: u32,
    quality: f32,
}

impl JpegSnapshotEncoder {
    pub fn new(target_width: u32, target_height: u32, quality: f32) -> Self {
        Self {
            target_width,
            target_height,
            quality,
        }
    }

    pub fn from_config(config: &CaptureConfig) -> Self {
        Self::new(
            config.target_width,
            config.target_height,
            config.jpeg_quality,
        )
    }

    pub fn encode_blocking(&self, frame: &Frame) -> Result<EncodedSnapshot> {
        let resized = resize_frame(frame, self.target_width, self.target_height)?;
        let bytes = encode_jpeg(&resized, self.quality)?;
        Ok(EncodedSnapshot {
            bytes,
            width: resized.width(),
            height: resized.height(),
            content_type: JPEG_CONTENT_TYPE,
        })
    }
}

#[async_trait]
impl SnapshotEncoder for JpegSnapshotEncoder {
    async fn encode(&self, frame: Frame) -> Result<EncodedSnapshot> {
        let encoder = self.clone();
        let snapshot = tokio::task::spawn_blocking(move || encoder.encode_blocking(&frame))
            .await
            .map_err(|err| vision_error(format!("encode task failed: {err}")))??;
        debug!(
            "Encoded snapshot {}x{} ({:.2} MB)",
            snapshot.width,
            snapshot.height,
            snapshot.size_mb()
        );
        Ok(snapshot)
    }
}

/// Scale `frame` to exactly `width` x `height`.
///
/// Pure downscales use area sampling; anything that enlarges an axis
/// falls back to a triangle filter.
pub fn resize_frame(frame: &Frame, width: u32, height: u32) -> Result<RgbaImage> {
    if width == 0 || height == 0 {
        return Err(vision_error(format!(
            "invalid resize target {}x{}",
            width, height
        )));
    }
    let Some(buffer) =
        ImageBuffer::<Rgba<u8>, _>::from_raw(frame.width, frame.height, frame.data.clone())
    else {
        return Err(vision_error(format!(
            "frame buffer does not match {}x{}",
            frame.width, frame.height
        )));
    };
    if frame.width == width && frame.height == height {
        return Ok(buffer);
    }
    if width <= frame.width && height <= frame.height {
        Ok(imageops::thumbnail(&buffer, width, height))
    } else {
        Ok(imageops::resize(&buffer, width, height, FilterType::Triangle))
    }
}

/// Map a `(0, 1]` quality factor onto the encoder's 1..=100 scale.
pub fn jpeg_quality_percent(quality: f32) -> u8 {
    (quality * 100.0).round().clamp(1.0, 100.0) as u8
}

pub fn encode_jpeg(image: &RgbaImage, quality: f32) -> Result<Vec<u8>> {
    // JPEG has no alpha channel.
    let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
    let mut bytes = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut bytes, jpeg_quality_percent(quality));
    encoder
        .encode_image(&rgb)
        .map_err(|err| ProctorError::Encoding(format!("jpeg encode failed: {err}")))?;
    Ok(bytes)
}

pub fn vision_error(message: impl Into<String>) -> ProctorError {
    ProctorError::Encoding(message.into())
}
