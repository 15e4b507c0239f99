//! Page image preparation for prompt attachments.
//!
//! Images are only ever downscaled, to fit within the configured target
//! box with their aspect ratio preserved.
//! The original encoding is kept when the model accepts it.

use std::sync::Arc;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageOutputFormat};
use thiserror::Error;

use crate::llm::{ImageAttachment, ImageFormat};
use crate::storage::{ObjectStore, StorageError};

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to encode image: {0}")]
    Encode(String),

    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),
}

/// Turns a stored page image into a prompt attachment.
pub trait ImagePreparer: Send + Sync {
    fn prepare_image(
        &self,
        uri: &str,
        target_width: Option<u32>,
        target_height: Option<u32>,
    ) -> Result<ImageAttachment, ImageError>;
}

/// Loads page images from an object store and resizes them in memory.
pub struct StoreImagePreparer {
    store: Arc<dyn ObjectStore>,
}

impl StoreImagePreparer {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

impl ImagePreparer for StoreImagePreparer {
    fn prepare_image(
        &self,
        uri: &str,
        target_width: Option<u32>,
        target_height: Option<u32>,
    ) -> Result<ImageAttachment, ImageError> {
        let bytes = self.store.get_bytes(uri)?;
        let bytes = resize_image(bytes, target_width, target_height)?;
        let format = detect_format(&bytes)?;
        Ok(ImageAttachment::new(format, bytes))
    }
}

/// Detect an attachment-compatible format from magic bytes.
pub fn detect_format(bytes: &[u8]) -> Result<ImageFormat, ImageError> {
    let guessed = image::guess_format(bytes).map_err(|e| ImageError::Decode(e.to_string()))?;
    match guessed {
        image::ImageFormat::Jpeg => Ok(ImageFormat::Jpeg),
        image::ImageFormat::Png => Ok(ImageFormat::Png),
        image::ImageFormat::Gif => Ok(ImageFormat::Gif),
        image::ImageFormat::WebP => Ok(ImageFormat::Webp),
        other => Err(ImageError::UnsupportedFormat(format!("{other:?}"))),
    }
}

/// Fit `(width, height)` inside the target box. `None` when already inside.
fn fitted_dimensions(width: u32, height: u32, target_w: u32, target_h: u32) -> Option<(u32, u32)> {
    if width == 0 || height == 0 {
        return None;
    }
    let scale = (target_w as f64 / width as f64).min(target_h as f64 / height as f64);
    if scale >= 1.0 {
        return None;
    }
    let new_w = ((width as f64 * scale) as u32).max(1);
    let new_h = ((height as f64 * scale) as u32).max(1);
    Some((new_w, new_h))
}

/// Downscale to fit within the target box. Returns the input unchanged when
/// either dimension is unset or the image already fits.
pub fn resize_image(
    bytes: Vec<u8>,
    target_width: Option<u32>,
    target_height: Option<u32>,
) -> Result<Vec<u8>, ImageError> {
    let (Some(target_w), Some(target_h)) = (target_width, target_height) else {
        return Ok(bytes);
    };

    let original_format = image::guess_format(&bytes).ok();
    let img = image::load_from_memory(&bytes).map_err(|e| ImageError::Decode(e.to_string()))?;
    let (width, height) = img.dimensions();

    let Some((new_w, new_h)) = fitted_dimensions(width, height, target_w, target_h) else {
        tracing::debug!(width, height, target_w, target_h, "Image already fits, keeping original");
        return Ok(bytes);
    };

    tracing::info!(
        from = %format!("{width}x{height}"),
        to = %format!("{new_w}x{new_h}"),
        "Resizing page image"
    );
    let resized = img.resize_exact(new_w, new_h, FilterType::Lanczos3);

    let (output, encoded) = match original_format {
        Some(image::ImageFormat::Png) => (ImageOutputFormat::Png, resized),
        Some(image::ImageFormat::Gif) => (ImageOutputFormat::Gif, resized),
        _ => (
            ImageOutputFormat::Jpeg(95),
            DynamicImage::ImageRgb8(resized.to_rgb8()),
        ),
    };

    let mut out = Vec::new();
    encoded
        .write_to(&mut out, output)
        .map_err(|e| ImageError::Encode(e.to_string()))?;
    Ok(out)
}
