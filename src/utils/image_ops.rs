use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;

use crate::core::errors::{ImagingError, ImagingResult};

/// Decode an uploaded file. `what` names the form field for error messages.
pub fn decode_upload(bytes: &[u8], what: &'static str) -> ImagingResult<DynamicImage> {
    if bytes.is_empty() {
        return Err(ImagingError::EmptyUpload(what));
    }
    Ok(image::load_from_memory(bytes)?)
}

/// Decode an upload on the blocking pool.
///
/// Image decoding is CPU-intensive, especially for large scans.
pub async fn decode_upload_async(bytes: Vec<u8>, what: &'static str) -> ImagingResult<DynamicImage> {
    tokio::task::spawn_blocking(move || decode_upload(&bytes, what))
        .await
        .map_err(|e| ImagingError::TaskJoinFailed(e.to_string()))?
}

/// Decode an upload and normalize it to 8-bit RGB, the single in-memory
/// layout the OCR path works on.
pub async fn decode_rgb_upload_async(bytes: Vec<u8>, what: &'static str) -> ImagingResult<DynamicImage> {
    tokio::task::spawn_blocking(move || {
        let image = decode_upload(&bytes, what)?;
        Ok(match image {
            DynamicImage::ImageRgb8(_) => image,
            other => DynamicImage::ImageRgb8(other.to_rgb8()),
        })
    })
    .await
    .map_err(|e| ImagingError::TaskJoinFailed(e.to_string()))?
}

pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>> {
    let mut png_bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut png_bytes), ImageFormat::Png)
        .context("Failed to encode image as PNG")?;
    Ok(png_bytes)
}

/// Encode to PNG and base64 in one blocking task.
///
/// PNG encoding is CPU-intensive and can block the async runtime if done synchronously.
pub async fn encode_png_base64_async(img: DynamicImage) -> Result<String> {
    tokio::task::spawn_blocking(move || encode_png(&img).map(|bytes| STANDARD.encode(bytes)))
        .await
        .context("Failed to spawn blocking task for PNG encoding")?
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn png_bytes() -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 3, Rgba([255, 0, 0, 128])));
        encode_png(&img).unwrap()
    }

    #[tokio::test]
    async fn test_decode_upload_async() {
        let decoded = decode_upload_async(png_bytes(), "image").await.unwrap();
        assert_eq!((decoded.width(), decoded.height()), (4, 3));
    }

    #[tokio::test]
    async fn test_rgb_upload_drops_alpha() {
        let decoded = decode_rgb_upload_async(png_bytes(), "image").await.unwrap();
        assert!(matches!(decoded, DynamicImage::ImageRgb8(_)));
        assert_eq!(decoded.to_rgb8().get_pixel(0, 0).0, [255, 0, 0]);
    }

    #[test]
    fn test_empty_and_garbage_uploads() {
        assert!(matches!(decode_upload(&[], "mask"), Err(ImagingError::EmptyUpload("mask"))));
        assert!(matches!(
            decode_upload(b"not an image", "image"),
            Err(ImagingError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_png_base64_round_trip() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 255])));
        let encoded = encode_png_base64_async(img).await.unwrap();
        let bytes = STANDARD.decode(encoded).unwrap();
        assert_eq!(image::load_from_memory(&bytes).unwrap().width(), 2);
    }
}
