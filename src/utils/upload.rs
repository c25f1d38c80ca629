use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use tracing::{debug, warn};

use crate::error::StylistError;
use crate::llm::media::detect_mime_type;

pub const VISION_JPEG_QUALITY: u8 = 85;

/// An upload ready for the vision call.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub bytes: Vec<u8>,
    /// False when the payload could not be decoded and is sent as uploaded.
    pub decoded: bool,
}

/// Rejects empty, oversized and non-image uploads.
pub fn validate_upload(bytes: &[u8], max_size_mb: usize) -> Result<String, StylistError> {
    if bytes.is_empty() {
        return Err(StylistError::Validation("image is empty".to_string()));
    }
    let limit = max_size_mb.saturating_mul(1024 * 1024);
    if bytes.len() > limit {
        return Err(StylistError::Validation(format!(
            "image is {} bytes, above the {max_size_mb} MB limit",
            bytes.len()
        )));
    }
    match detect_mime_type(bytes) {
        Some(mime) if mime.starts_with("image/") => Ok(mime),
        Some(mime) => Err(StylistError::Validation(format!(
            "expected an image upload, got {mime}"
        ))),
        None => Err(StylistError::Validation(
            "could not determine the upload type".to_string(),
        )),
    }
}

fn encode_jpeg(image: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut cursor = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut cursor, VISION_JPEG_QUALITY);
    DynamicImage::ImageRgb8(image.to_rgb8()).write_with_encoder(encoder)?;
    Ok(cursor.into_inner())
}

/// Converts to RGB, bounds the long edge and re-encodes as JPEG.
/// Payloads that fail to decode are passed through unchanged.
pub fn prepare_for_vision(bytes: &[u8], max_dimension: u32) -> PreparedImage {
    let passthrough = || PreparedImage {
        bytes: bytes.to_vec(),
        decoded: false,
    };

    let decoded = match image::load_from_memory(bytes) {
        Ok(decoded) => decoded,
        Err(err) => {
            warn!("Uploaded image could not be decoded, sending raw bytes: {err}");
            return passthrough();
        }
    };

    let resized = if decoded.width() > max_dimension || decoded.height() > max_dimension {
        debug!(
            "Downscaling upload from {}x{} to fit {max_dimension}px",
            decoded.width(),
            decoded.height()
        );
        decoded.resize(max_dimension, max_dimension, FilterType::Lanczos3)
    } else {
        decoded
    };

    match encode_jpeg(&resized) {
        Ok(encoded) => PreparedImage {
            bytes: encoded,
            decoded: true,
        },
        Err(err) => {
            warn!("Failed to re-encode upload as JPEG, sending raw bytes: {err}");
            passthrough()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::png::PngEncoder;
    use image::{Rgb, RgbImage};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([12, 34, 56])))
            .write_with_encoder(PngEncoder::new(&mut bytes))
            .unwrap();
        bytes
    }

    #[test]
    fn rejects_empty_and_non_image_uploads() {
        assert!(matches!(
            validate_upload(&[], 20),
            Err(StylistError::Validation(_))
        ));
        assert!(matches!(
            validate_upload(b"just some text", 20),
            Err(StylistError::Validation(_))
        ));
        assert_eq!(validate_upload(&png(4, 4), 20).unwrap(), "image/png");
    }

    #[test]
    fn rejects_oversized_uploads() {
        let mut bytes = png(4, 4);
        bytes.resize(1024 * 1024 + 1, 0);
        assert!(validate_upload(&bytes, 1).is_err());
    }

    #[test]
    fn large_images_are_bounded_and_jpeg_encoded() {
        let prepared = prepare_for_vision(&png(2048, 512), 1024);
        assert!(prepared.decoded);
        assert_eq!(
            detect_mime_type(&prepared.bytes).as_deref(),
            Some("image/jpeg")
        );
        let decoded = image::load_from_memory(&prepared.bytes).unwrap();
        assert_eq!(decoded.width(), 1024);
        assert_eq!(decoded.height(), 256);
    }

    #[test]
    fn undecodable_payloads_pass_through() {
        let bytes = b"\xff\xd8\xff\xe0 truncated jpeg".to_vec();
        let prepared = prepare_for_vision(&bytes, 1024);
        assert!(!prepared.decoded);
        assert_eq!(prepared.bytes, bytes);
    }
}
