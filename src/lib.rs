#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # Batch Background Removal
//!
//! Upload handling, compositing and packaging around a pluggable background
//! remover. The segmentation model itself is a black box behind the
//! [`BackgroundRemover`] trait: encoded image in, encoded image with alpha out.
//!
//! ## Pipeline
//!
//! 1. **Validation**: size ceiling (10 MiB default), decoding, normalization to opaque RGB
//! 2. **Removal**: the remover runs on a blocking thread with an optional timeout
//! 3. **Compositing**: the cut-out is blended "over" a cyclically assigned background
//! 4. **Packaging**: processed images are zipped as `<stem>_no_bg.png`
//!
//! A failing item is recorded as `Failed` in its own slot; the batch always
//! returns one entry per upload, in upload order.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bgremove_batch::{
//!     backends::OnnxRemover, ArchivePackager, BatchConfig, BatchProcessor, UploadItem,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let remover = Arc::new(OnnxRemover::from_model_path("u2net.onnx")?);
//! let processor = BatchProcessor::new(BatchConfig::default(), remover)?;
//!
//! let uploads = vec![
//!     UploadItem::new("a.jpg", std::fs::read("a.jpg")?),
//!     UploadItem::new("b.png", std::fs::read("b.png")?),
//! ];
//! let backgrounds = processor.prepare_backgrounds(vec![
//!     UploadItem::new("beach.jpg", std::fs::read("beach.jpg")?),
//! ]);
//!
//! let result = processor.process(uploads, &backgrounds).await;
//! let archive = ArchivePackager::default().package_result(&result)?;
//! std::fs::write("results.zip", archive)?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `onnx` (default): ONNX Runtime remover with CUDA and `CoreML` support
//! - `cli` (default): Command-line interface, progress bars and tracing setup
//! - `webp-support` (default): WebP decoding and lossless WebP output
//! - `tracing-json`, `tracing-files`: extra log outputs for the CLI
//!
//! ### Library-Only Usage
//!
//! ```toml
//! [dependencies]
//! bgremove-batch = { version = "0.1", default-features = false }
//! ```

pub mod archive;
pub mod background;
pub mod backends;
pub mod batch;
#[cfg(feature = "cli")]
pub mod cli;
pub mod compositor;
pub mod config;
pub mod error;
pub mod remover;
pub mod services;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;

use std::sync::Arc;
use tokio::io::AsyncRead;

// Public API exports
pub use archive::{derive_entry_name, ArchivePackager};
pub use background::{BackgroundEntry, BackgroundSet};
pub use batch::BatchProcessor;
pub use compositor::Compositor;
pub use config::{
    ArchiveConfig, BatchConfig, BatchConfigBuilder, ExecutionProvider, LosslessFormat,
    ResizeFilter,
};
pub use error::{BgBatchError, ItemFailure, Result};
pub use remover::BackgroundRemover;
pub use services::{
    ConsoleProgressReporter, ImageCodec, ImageIOService, ImageValidator, NoOpProgressReporter,
    ProcessingStage, ProgressReporter,
};
pub use types::{
    BatchItem, BatchResult, BatchSummary, ColorMode, ImageAsset, ItemOutcome, ItemSummary,
    ProcessingTimings, UploadItem, ValidationStatus,
};

#[cfg(feature = "cli")]
pub use tracing_config::{
    events, spans, TracingConfig, TracingFormat, TracingGuard, TracingOutput,
};

/// Remove the background from a single encoded image
///
/// Validates the bytes with the configured ceiling, runs the remover and
/// returns the alpha-carrying result. No compositing is applied.
///
/// # Errors
/// - Invalid configuration
/// - [`BgBatchError::Item`] with the reason the image could not be processed
///
/// # Examples
/// ```rust
/// use bgremove_batch::{backends::MockRemover, remove_background_from_bytes, BatchConfig, ImageAsset};
/// use image::RgbImage;
/// use std::sync::Arc;
///
/// # async fn example() -> bgremove_batch::Result<()> {
/// let png = ImageAsset::from_rgb(RgbImage::new(16, 16)).encode(Default::default())?;
/// let cut = remove_background_from_bytes(&png, Arc::new(MockRemover::circle()), &BatchConfig::default()).await?;
/// assert!(cut.has_alpha());
/// # Ok(())
/// # }
/// ```
pub async fn remove_background_from_bytes(
    image_bytes: &[u8],
    remover: Arc<dyn BackgroundRemover>,
    config: &BatchConfig,
) -> Result<ImageAsset> {
    let processor = BatchProcessor::new(config.clone(), remover)?;
    let upload = UploadItem::new("upload", image_bytes.to_vec());
    Ok(processor.remove_single(&upload).await?)
}

/// Remove the background from an async reader stream
///
/// # Errors
/// Stream read failure, or any error of [`remove_background_from_bytes`]
pub async fn remove_background_from_reader<R: AsyncRead + Unpin>(
    mut reader: R,
    remover: Arc<dyn BackgroundRemover>,
    config: &BatchConfig,
) -> Result<ImageAsset> {
    let mut buffer = Vec::new();
    tokio::io::AsyncReadExt::read_to_end(&mut reader, &mut buffer)
        .await
        .map_err(|e| BgBatchError::processing(format!("Failed to read from stream: {}", e)))?;

    remove_background_from_bytes(&buffer, remover, config).await
}

/// Process a batch in one call with a fresh [`BatchProcessor`]
///
/// # Errors
/// Invalid configuration
pub async fn process_batch(
    uploads: Vec<UploadItem>,
    backgrounds: Vec<UploadItem>,
    remover: Arc<dyn BackgroundRemover>,
    config: &BatchConfig,
) -> Result<BatchResult> {
    let processor = BatchProcessor::new(config.clone(), remover)?;
    let backgrounds = processor.prepare_backgrounds(backgrounds);
    Ok(processor.process(uploads, &backgrounds).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{MockMatte, MockRemover};
    use image::{Rgb, RgbImage};

    fn png(width: u32, height: u32) -> Vec<u8> {
        ImageAsset::from_rgb(RgbImage::from_pixel(width, height, Rgb([9, 9, 9])))
            .encode(LosslessFormat::Png)
            .unwrap()
    }

    #[tokio::test]
    async fn test_single_image_flow() {
        let cut = remove_background_from_bytes(
            &png(6, 4),
            Arc::new(MockRemover::new(MockMatte::Opaque)),
            &BatchConfig::default(),
        )
        .await
        .unwrap();
        assert_eq!(cut.dimensions(), (6, 4));
        assert_eq!(cut.mode(), ColorMode::Rgba);
    }

    #[tokio::test]
    async fn test_single_image_failure_names_reason() {
        let err = remove_background_from_bytes(
            &png(2, 2),
            Arc::new(MockRemover::new(MockMatte::Empty)),
            &BatchConfig::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BgBatchError::Item(ItemFailure::RemovalFailed(_))));
    }

    #[tokio::test]
    async fn test_reader_flow() {
        let bytes = png(3, 3);
        let cut = remove_background_from_reader(
            std::io::Cursor::new(bytes),
            Arc::new(MockRemover::circle()),
            &BatchConfig::default(),
        )
        .await
        .unwrap();
        assert_eq!(cut.dimensions(), (3, 3));
    }

    #[tokio::test]
    async fn test_process_batch_convenience() {
        let result = process_batch(
            vec![UploadItem::new("a.png", png(4, 4))],
            vec![UploadItem::new("bg.png", png(8, 8))],
            Arc::new(MockRemover::circle()),
            &BatchConfig::default(),
        )
        .await
        .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.get(0).unwrap().outcome.composited().unwrap().dimensions(), (4, 4));
    }
}
