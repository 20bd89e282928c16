use crate::error::{Error, Result};
use crate::models::DownscaleTransform;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::RgbImage;
use std::path::Path;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Decodes an upload into 8-bit RGB, dropping any alpha channel.
pub fn decode(bytes: &[u8]) -> Result<RgbImage> {
    let img = image::load_from_memory(bytes).map_err(|e| Error::Decode(format!("{e}")))?;
    let rgb = img.to_rgb8();
    if rgb.width() == 0 || rgb.height() == 0 {
        return Err(Error::Decode("Image has no pixels".into()));
    }
    Ok(rgb)
}

pub fn downscale(image: &RgbImage, transform: &DownscaleTransform) -> RgbImage {
    if transform.is_identity() {
        return image.clone();
    }
    imageops::resize(
        image,
        transform.target_width,
        transform.target_height,
        FilterType::Lanczos3,
    )
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100));
    image
        .write_with_encoder(encoder)
        .map_err(|e| Error::Encode(format!("{e}")))?;
    Ok(bytes)
}
