//! Core types for batch background removal

use crate::{config::LosslessFormat, error::ItemFailure, error::Result, services::ImageCodec};
use chrono::{DateTime, Utc};
use image::{DynamicImage, RgbImage, RgbaImage};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pixel layout of an [`ImageAsset`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    /// Opaque, 3 bytes per pixel
    Rgb,
    /// Alpha-carrying, 4 bytes per pixel
    Rgba,
}

impl ColorMode {
    #[must_use]
    pub fn channels(self) -> usize {
        match self {
            Self::Rgb => 3,
            Self::Rgba => 4,
        }
    }
}

/// Decoded raster image held as 8-bit RGB or RGBA
#[derive(Debug, Clone, PartialEq)]
pub struct ImageAsset {
    image: DynamicImage,
}

impl ImageAsset {
    /// Wrap an opaque RGB buffer
    #[must_use]
    pub fn from_rgb(image: RgbImage) -> Self {
        Self {
            image: DynamicImage::ImageRgb8(image),
        }
    }

    /// Wrap an alpha-carrying RGBA buffer
    #[must_use]
    pub fn from_rgba(image: RgbaImage) -> Self {
        Self {
            image: DynamicImage::ImageRgba8(image),
        }
    }

    /// Convert any decoded image, keeping alpha when the source has it
    ///
    /// Grayscale, palette-expanded and 16-bit sources become 8-bit RGB or RGBA.
    #[must_use]
    pub fn from_dynamic(image: DynamicImage) -> Self {
        match image {
            DynamicImage::ImageRgb8(rgb) => Self::from_rgb(rgb),
            DynamicImage::ImageRgba8(rgba) => Self::from_rgba(rgba),
            other if other.color().has_alpha() => Self::from_rgba(other.to_rgba8()),
            other => Self::from_rgb(other.to_rgb8()),
        }
    }

    /// Build from raw interleaved pixel data
    ///
    /// # Errors
    /// Buffer length does not match `width * height * channels`
    pub fn from_raw(mode: ColorMode, width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * mode.channels();
        if pixels.len() != expected {
            return Err(crate::error::BgBatchError::processing(format!(
                "Pixel buffer has {} bytes, expected {expected} for {width}x{height} {mode:?}",
                pixels.len()
            )));
        }
        let asset = match mode {
            ColorMode::Rgb => RgbImage::from_raw(width, height, pixels).map(Self::from_rgb),
            ColorMode::Rgba => RgbaImage::from_raw(width, height, pixels).map(Self::from_rgba),
        };
        asset.ok_or_else(|| crate::error::BgBatchError::internal("Pixel buffer rejected"))
    }

    #[must_use]
    pub fn mode(&self) -> ColorMode {
        if matches!(self.image, DynamicImage::ImageRgba8(_)) {
            ColorMode::Rgba
        } else {
            ColorMode::Rgb
        }
    }

    #[must_use]
    pub fn has_alpha(&self) -> bool {
        self.mode() == ColorMode::Rgba
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }

    /// Raw interleaved pixel bytes in the asset's color mode
    #[must_use]
    pub fn pixels(&self) -> &[u8] {
        self.image.as_bytes()
    }

    /// Borrow the underlying `image` crate representation
    #[must_use]
    pub fn as_dynamic(&self) -> &DynamicImage {
        &self.image
    }

    /// RGBA copy; opaque sources get alpha 255
    #[must_use]
    pub fn to_rgba(&self) -> RgbaImage {
        self.image.to_rgba8()
    }

    /// Coerce to alpha-carrying mode
    #[must_use]
    pub fn into_rgba(self) -> Self {
        match self.image {
            DynamicImage::ImageRgba8(_) => self,
            other => Self::from_rgba(other.to_rgba8()),
        }
    }

    /// Coerce to opaque mode by dropping alpha
    #[must_use]
    pub fn into_rgb(self) -> Self {
        match self.image {
            DynamicImage::ImageRgb8(_) => self,
            other => Self::from_rgb(other.to_rgb8()),
        }
    }

    /// Encode losslessly
    ///
    /// # Errors
    /// Encoder failure
    pub fn encode(&self, format: LosslessFormat) -> Result<Vec<u8>> {
        ImageCodec::encode(self, format)
    }

    /// Decode any supported format
    ///
    /// # Errors
    /// Bytes are not a decodable image
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        ImageCodec::decode(bytes)
    }
}

/// Result of validating an upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    /// Not yet validated
    Pending,
    Valid,
    RejectedTooLarge,
    RejectedUndecodable,
}

/// User-supplied file: name, bytes and validation status
#[derive(Debug, Clone)]
pub struct UploadItem {
    /// Name as supplied by the user; may be duplicated or contain path components
    pub filename: String,
    /// Raw file contents
    pub bytes: Vec<u8>,
    /// Size reported by the transport, if any
    pub declared_size: Option<u64>,
    /// Outcome of the last validation
    pub status: ValidationStatus,
}

impl UploadItem {
    pub fn new<S: Into<String>>(filename: S, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
            declared_size: None,
            status: ValidationStatus::Pending,
        }
    }

    #[must_use]
    pub fn with_declared_size(mut self, size: u64) -> Self {
        self.declared_size = Some(size);
        self
    }

    /// Size checked against the ceiling: the larger of declared and actual
    #[must_use]
    pub fn effective_size(&self) -> u64 {
        let actual = self.bytes.len() as u64;
        self.declared_size.map_or(actual, |declared| declared.max(actual))
    }
}

/// Timing breakdown for a single item
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingTimings {
    pub validation_ms: u64,
    pub removal_ms: u64,
    pub compositing_ms: u64,
    pub total_ms: u64,
}

/// Outcome for one upload
#[derive(Debug, Clone)]
pub enum ItemOutcome {
    /// Background removed; compositing may or may not have succeeded
    Processed {
        /// Background-removed image (alpha-carrying)
        foreground: ImageAsset,
        /// Foreground blended onto its background (opaque), if one was applied
        composited: Option<ImageAsset>,
        /// Index into the background set that was assigned to this item
        background_index: Option<usize>,
        /// Why `composited` is `None` despite a background being assigned
        composite_error: Option<ItemFailure>,
    },
    /// Item could not be processed
    Failed { reason: ItemFailure },
}

impl ItemOutcome {
    #[must_use]
    pub fn is_processed(&self) -> bool {
        matches!(self, Self::Processed { .. })
    }

    #[must_use]
    pub fn failure(&self) -> Option<&ItemFailure> {
        match self {
            Self::Failed { reason } => Some(reason),
            Self::Processed { .. } => None,
        }
    }

    #[must_use]
    pub fn foreground(&self) -> Option<&ImageAsset> {
        match self {
            Self::Processed { foreground, .. } => Some(foreground),
            Self::Failed { .. } => None,
        }
    }

    #[must_use]
    pub fn composited(&self) -> Option<&ImageAsset> {
        match self {
            Self::Processed { composited, .. } => composited.as_ref(),
            Self::Failed { .. } => None,
        }
    }

    #[must_use]
    pub fn background_index(&self) -> Option<usize> {
        match self {
            Self::Processed {
                background_index, ..
            } => *background_index,
            Self::Failed { .. } => None,
        }
    }
}

/// One position in a batch result
#[derive(Debug, Clone)]
pub struct BatchItem {
    /// Position in the original upload order
    pub index: usize,
    pub filename: String,
    /// `Pending` when the item was cancelled before validation
    pub validation: ValidationStatus,
    pub outcome: ItemOutcome,
    pub timings: ProcessingTimings,
}

/// Ordered outcomes of a batch; `items[i]` belongs to upload `i`
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub batch_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub items: Vec<BatchItem>,
    pub total_ms: u64,
}

impl BatchResult {
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BatchItem> {
        self.items.iter()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&BatchItem> {
        self.items.get(index)
    }

    #[must_use]
    pub fn processed_count(&self) -> usize {
        self.items.iter().filter(|item| item.outcome.is_processed()).count()
    }

    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.len() - self.processed_count()
    }

    /// Processed items as `(image, original filename)` pairs for the archive packager
    #[must_use]
    pub fn archive_entries(&self) -> Vec<(&ImageAsset, &str)> {
        self.items
            .iter()
            .filter_map(|item| {
                item.outcome
                    .foreground()
                    .map(|image| (image, item.filename.as_str()))
            })
            .collect()
    }

    /// Composited images as `(image, original filename)` pairs
    #[must_use]
    pub fn composite_entries(&self) -> Vec<(&ImageAsset, &str)> {
        self.items
            .iter()
            .filter_map(|item| {
                item.outcome
                    .composited()
                    .map(|image| (image, item.filename.as_str()))
            })
            .collect()
    }

    /// Serializable report of the batch
    #[must_use]
    pub fn summary(&self) -> BatchSummary {
        let items = self
            .items
            .iter()
            .map(|item| {
                let (status, failure, composite_error) = match &item.outcome {
                    ItemOutcome::Processed {
                        composite_error, ..
                    } => ("processed", None, composite_error.clone()),
                    ItemOutcome::Failed { reason } => ("failed", Some(reason.clone()), None),
                };
                ItemSummary {
                    index: item.index,
                    filename: item.filename.clone(),
                    validation: item.validation,
                    status: status.to_string(),
                    failure,
                    background_index: item.outcome.background_index(),
                    composited: item.outcome.composited().is_some(),
                    composite_error,
                    dimensions: item.outcome.foreground().map(ImageAsset::dimensions),
                    timings: item.timings.clone(),
                }
            })
            .collect();

        BatchSummary {
            batch_id: self.batch_id,
            started_at: self.started_at,
            total_items: self.len(),
            processed: self.processed_count(),
            failed: self.failed_count(),
            total_ms: self.total_ms,
            items,
        }
    }
}

/// Per-item entry of a [`BatchSummary`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSummary {
    pub index: usize,
    pub filename: String,
    pub validation: ValidationStatus,
    pub status: String,
    pub failure: Option<ItemFailure>,
    pub background_index: Option<usize>,
    pub composited: bool,
    pub composite_error: Option<ItemFailure>,
    pub dimensions: Option<(u32, u32)>,
    pub timings: ProcessingTimings,
}

/// JSON-friendly report of a batch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub batch_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub total_items: usize,
    pub processed: usize,
    pub failed: usize,
    pub total_ms: u64,
    pub items: Vec<ItemSummary>,
}
