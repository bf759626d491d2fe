//! File-system I/O for uploads and results
//!
//! Keeps disk access out of the pipeline so the orchestrator works purely on
//! in-memory uploads.

use crate::{
    config::LosslessFormat,
    error::{BgBatchError, Result},
    services::ImageCodec,
    types::{ImageAsset, UploadItem},
};
use std::path::Path;

/// Service for reading uploads from disk and writing results back
pub struct ImageIOService;

impl ImageIOService {
    /// Read a file into an [`UploadItem`]
    ///
    /// The upload's filename is the path's final component and its declared
    /// size comes from file metadata. Files above `max_bytes` are not read;
    /// the returned item carries only the declared size so the validator
    /// rejects it as too large.
    ///
    /// # Errors
    /// File missing or unreadable
    ///
    /// # Examples
    /// ```rust,no_run
    /// use bgremove_batch::services::ImageIOService;
    ///
    /// let upload = ImageIOService::read_upload("photos/cat.jpg", 10 * 1024 * 1024)?;
    /// assert_eq!(upload.filename, "cat.jpg");
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn read_upload<P: AsRef<Path>>(path: P, max_bytes: u64) -> Result<UploadItem> {
        let path_ref = path.as_ref();
        let metadata = std::fs::metadata(path_ref)
            .map_err(|e| BgBatchError::file_io_error("read metadata of", path_ref, &e))?;

        let filename = path_ref
            .file_name()
            .map_or_else(|| path_ref.display().to_string(), |name| name.to_string_lossy().into_owned());

        let bytes = if metadata.len() > max_bytes {
            log::warn!(
                "{} is {} bytes, above the {} byte limit; skipping read",
                path_ref.display(),
                metadata.len(),
                max_bytes
            );
            Vec::new()
        } else {
            std::fs::read(path_ref)
                .map_err(|e| BgBatchError::file_io_error("read upload", path_ref, &e))?
        };

        Ok(UploadItem::new(filename, bytes).with_declared_size(metadata.len()))
    }

    /// Encode an asset and write it, creating parent directories
    ///
    /// # Errors
    /// Encoding failure or file-system error
    pub fn save_asset<P: AsRef<Path>>(
        asset: &ImageAsset,
        path: P,
        format: LosslessFormat,
    ) -> Result<()> {
        let path_ref = path.as_ref();

        if let Some(parent) = path_ref.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    BgBatchError::file_io_error("create output directory", parent, &e)
                })?;
            }
        }

        let bytes = ImageCodec::encode(asset, format)?;
        std::fs::write(path_ref, bytes)
            .map_err(|e| BgBatchError::file_io_error("write image", path_ref, &e))?;

        log::debug!(
            "Saved {}x{} {:?} image to {}",
            asset.width(),
            asset.height(),
            asset.mode(),
            path_ref.display()
        );
        Ok(())
    }

    /// Write raw bytes (archives, reports), creating parent directories
    ///
    /// # Errors
    /// File-system error
    pub fn write_bytes<P: AsRef<Path>>(bytes: &[u8], path: P) -> Result<()> {
        let path_ref = path.as_ref();
        if let Some(parent) = path_ref.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    BgBatchError::file_io_error("create output directory", parent, &e)
                })?;
            }
        }
        std::fs::write(path_ref, bytes)
            .map_err(|e| BgBatchError::file_io_error("write file", path_ref, &e))
    }
}
