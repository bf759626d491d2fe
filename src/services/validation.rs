//! Upload validation: size ceiling, decoding and color normalization

use crate::{
    error::ItemFailure,
    services::ImageCodec,
    types::{ImageAsset, UploadItem, ValidationStatus},
};

/// Validates uploads and turns them into opaque RGB assets
#[derive(Debug, Clone, Copy)]
pub struct ImageValidator {
    max_bytes: u64,
}

impl ImageValidator {
    #[must_use]
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }

    #[must_use]
    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Check size, decode, and normalize to opaque RGB
    ///
    /// Alpha and palette inputs are flattened by dropping alpha, for
    /// foregrounds and backgrounds alike.
    ///
    /// # Errors
    /// - [`ItemFailure::TooLarge`] when the effective size exceeds the ceiling
    /// - [`ItemFailure::Undecodable`] when the bytes are not an image
    pub fn validate(&self, item: &UploadItem) -> Result<ImageAsset, ItemFailure> {
        let size = item.effective_size();
        if size > self.max_bytes {
            log::debug!(
                "Rejecting '{}': {} bytes exceeds {} byte limit",
                item.filename,
                size,
                self.max_bytes
            );
            return Err(ItemFailure::TooLarge {
                size,
                limit: self.max_bytes,
            });
        }

        let asset = ImageCodec::decode(&item.bytes).map_err(|e| {
            log::debug!("Rejecting '{}': {}", item.filename, e);
            ItemFailure::undecodable(e.to_string())
        })?;

        Ok(asset.into_rgb())
    }

    /// Validate and record the outcome on the item
    pub fn validate_in_place(&self, item: &mut UploadItem) -> Result<ImageAsset, ItemFailure> {
        let result = self.validate(item);
        item.status = match &result {
            Ok(_) => ValidationStatus::Valid,
            Err(ItemFailure::TooLarge { .. }) => ValidationStatus::RejectedTooLarge,
            Err(_) => ValidationStatus::RejectedUndecodable,
        };
        result
    }
}

impl Default for ImageValidator {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MAX_UPLOAD_BYTES)
    }
}
