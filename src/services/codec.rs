//! Lossless encoding and decoding of image assets
//!
//! Keeps format conversion out of the pipeline stages so the validator, the
//! remover call and the archive packager all share one codec path.

use crate::{
    config::LosslessFormat,
    error::{BgBatchError, Result},
    types::ImageAsset,
};
use std::io::Cursor;

/// Service for converting between [`ImageAsset`] and encoded bytes
pub struct ImageCodec;

impl ImageCodec {
    /// Encode an asset in a lossless format, keeping its color mode
    ///
    /// # Errors
    /// Encoder failure (for example a format that cannot hold the color mode)
    ///
    /// # Examples
    /// ```rust
    /// use bgremove_batch::{services::ImageCodec, ImageAsset, LosslessFormat};
    /// use image::RgbaImage;
    ///
    /// let asset = ImageAsset::from_rgba(RgbaImage::new(4, 4));
    /// let png = ImageCodec::encode(&asset, LosslessFormat::Png)?;
    /// assert!(png.starts_with(&[0x89, b'P', b'N', b'G']));
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn encode(asset: &ImageAsset, format: LosslessFormat) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        asset
            .as_dynamic()
            .write_to(&mut Cursor::new(&mut buffer), format.image_format())
            .map_err(|e| {
                BgBatchError::processing(format!(
                    "Failed to encode {}x{} image as {}: {e}",
                    asset.width(),
                    asset.height(),
                    format.extension()
                ))
            })?;
        Ok(buffer)
    }

    /// Encode as PNG, the format handed to background removers
    ///
    /// # Errors
    /// Encoder failure
    pub fn encode_png(asset: &ImageAsset) -> Result<Vec<u8>> {
        Self::encode(asset, LosslessFormat::Png)
    }

    /// Decode bytes of any enabled format into an asset
    ///
    /// # Errors
    /// Empty input, unknown format or corrupt data
    pub fn decode(bytes: &[u8]) -> Result<ImageAsset> {
        if bytes.is_empty() {
            return Err(BgBatchError::processing("Cannot decode an empty byte buffer"));
        }
        let image = image::load_from_memory(bytes).map_err(|e| {
            BgBatchError::processing(format!("Failed to decode image from bytes: {e}"))
        })?;
        Ok(ImageAsset::from_dynamic(image))
    }

    /// Check if a filename has an extension the decoder understands
    #[must_use]
    pub fn is_supported_extension(filename: &str) -> bool {
        std::path::Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                let ext_lower = ext.to_lowercase();
                matches!(ext_lower.as_str(), "jpg" | "jpeg" | "png" | "tif" | "tiff")
                    || (cfg!(feature = "webp-support") && ext_lower == "webp")
            })
    }
}
