//! Configuration types for batch background removal

use crate::error::{BgBatchError, Result};
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default upload size ceiling (10 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Default suffix appended to archive entry stems
pub const DEFAULT_ARCHIVE_SUFFIX: &str = "_no_bg";

/// Device hint handed to the background remover
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon GPU acceleration
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

impl std::str::FromStr for ExecutionProvider {
    type Err = BgBatchError;

    /// Parse `auto`, `cpu`, `cuda` or `coreml`; an `onnx:` prefix is accepted
    fn from_str(s: &str) -> Result<Self> {
        let value = s.trim().to_lowercase();
        let provider = value.strip_prefix("onnx:").unwrap_or(&value);
        match provider {
            "auto" | "onnx" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" | "gpu" => Ok(Self::Cuda),
            "coreml" => Ok(Self::CoreMl),
            other => Err(BgBatchError::invalid_config(format!(
                "Unknown execution provider '{other}'. Expected one of: auto, cpu, cuda, coreml"
            ))),
        }
    }
}

/// Lossless output formats used for remover I/O, per-item output and archive entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LosslessFormat {
    /// PNG with alpha channel transparency
    #[default]
    Png,
    /// TIFF with alpha channel transparency
    Tiff,
    /// Lossless WebP with alpha channel transparency
    #[cfg(feature = "webp-support")]
    WebP,
}

impl LosslessFormat {
    /// File extension without the dot
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Tiff => "tiff",
            #[cfg(feature = "webp-support")]
            Self::WebP => "webp",
        }
    }

    /// Matching `image` crate format
    #[must_use]
    pub fn image_format(self) -> image::ImageFormat {
        match self {
            Self::Png => image::ImageFormat::Png,
            Self::Tiff => image::ImageFormat::Tiff,
            #[cfg(feature = "webp-support")]
            Self::WebP => image::ImageFormat::WebP,
        }
    }
}

/// Resampling filter used when a background is resized to the foreground
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResizeFilter {
    Nearest,
    Triangle,
    CatmullRom,
    Gaussian,
    #[default]
    Lanczos3,
}

impl From<ResizeFilter> for FilterType {
    fn from(filter: ResizeFilter) -> Self {
        match filter {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Triangle => FilterType::Triangle,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
            ResizeFilter::Gaussian => FilterType::Gaussian,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Archive packaging options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Suffix appended to each entry's stem (`a.jpg` -> `a_no_bg.png`)
    pub suffix: String,

    /// Lossless format of archive entries
    pub format: LosslessFormat,

    /// Number colliding entry names `_1`, `_2`, ... instead of letting the last write win
    pub deduplicate_names: bool,

    /// Also store composited images as `<stem>_composited.<ext>`
    pub include_composites: bool,

    /// Deflate level (0-9, None = library default)
    pub compression_level: Option<i64>,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            suffix: DEFAULT_ARCHIVE_SUFFIX.to_string(),
            format: LosslessFormat::Png,
            deduplicate_names: true,
            include_composites: false,
            compression_level: None,
        }
    }
}

/// Configuration for a batch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Upload size ceiling in bytes, applied to foregrounds and backgrounds
    pub max_upload_bytes: u64,

    /// Device hint passed to the remover
    pub execution_provider: ExecutionProvider,

    /// Per-item remover timeout in milliseconds (None = wait indefinitely)
    pub removal_timeout_ms: Option<u64>,

    /// Number of items processed concurrently (1 = strictly sequential)
    pub max_concurrency: usize,

    /// Filter used to resample backgrounds
    pub resize_filter: ResizeFilter,

    /// Archive packaging options
    pub archive: ArchiveConfig,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            execution_provider: ExecutionProvider::default(),
            removal_timeout_ms: None,
            max_concurrency: 1,
            resize_filter: ResizeFilter::default(),
            archive: ArchiveConfig::default(),
        }
    }
}

impl BatchConfig {
    /// Create a new configuration builder
    ///
    /// ```rust
    /// use bgremove_batch::{BatchConfig, ExecutionProvider};
    ///
    /// let config = BatchConfig::builder()
    ///     .execution_provider(ExecutionProvider::Cpu)
    ///     .max_concurrency(2)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.max_concurrency, 2);
    /// ```
    #[must_use]
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder::default()
    }

    /// Load a configuration from a JSON file; missing fields take defaults
    ///
    /// # Errors
    /// - File cannot be read
    /// - File is not valid JSON for this structure
    /// - Loaded values fail [`BatchConfig::validate`]
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let content = std::fs::read_to_string(path_ref)
            .map_err(|e| BgBatchError::file_io_error("read config file", path_ref, &e))?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            BgBatchError::invalid_config(format!(
                "Failed to parse config file '{}': {e}",
                path_ref.display()
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Remover timeout as a `Duration`
    #[must_use]
    pub fn removal_timeout(&self) -> Option<Duration> {
        self.removal_timeout_ms.map(Duration::from_millis)
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - Zero upload ceiling
    /// - Concurrency outside 1-256
    /// - Zero timeout
    /// - Compression level outside 0-9
    /// - Empty archive suffix
    pub fn validate(&self) -> Result<()> {
        if self.max_upload_bytes == 0 {
            return Err(BgBatchError::config_value_error(
                "max upload bytes",
                self.max_upload_bytes,
                "> 0",
                Some(DEFAULT_MAX_UPLOAD_BYTES),
            ));
        }

        if self.max_concurrency == 0 || self.max_concurrency > 256 {
            return Err(BgBatchError::config_value_error(
                "max concurrency",
                self.max_concurrency,
                "1-256",
                Some(1),
            ));
        }

        if self.removal_timeout_ms == Some(0) {
            return Err(BgBatchError::invalid_config(
                "Removal timeout must be greater than zero (omit it to disable the timeout)",
            ));
        }

        if let Some(level) = self.archive.compression_level {
            if !(0..=9).contains(&level) {
                return Err(BgBatchError::config_value_error(
                    "compression level",
                    level,
                    "0-9",
                    Some(6),
                ));
            }
        }

        if self.archive.suffix.is_empty() {
            return Err(BgBatchError::invalid_config("Archive suffix must not be empty"));
        }

        Ok(())
    }
}

/// Builder for `BatchConfig`
#[derive(Debug, Default)]
pub struct BatchConfigBuilder {
    config: BatchConfig,
}

impl BatchConfigBuilder {
    #[must_use]
    pub fn max_upload_bytes(mut self, bytes: u64) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.execution_provider = provider;
        self
    }

    #[must_use]
    pub fn removal_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.removal_timeout_ms = timeout.map(|t| t.as_millis() as u64);
        self
    }

    #[must_use]
    pub fn max_concurrency(mut self, concurrency: usize) -> Self {
        self.config.max_concurrency = concurrency;
        self
    }

    #[must_use]
    pub fn resize_filter(mut self, filter: ResizeFilter) -> Self {
        self.config.resize_filter = filter;
        self
    }

    #[must_use]
    pub fn archive(mut self, archive: ArchiveConfig) -> Self {
        self.config.archive = archive;
        self
    }

    #[must_use]
    pub fn archive_format(mut self, format: LosslessFormat) -> Self {
        self.config.archive.format = format;
        self
    }

    #[must_use]
    pub fn deduplicate_names(mut self, deduplicate: bool) -> Self {
        self.config.archive.deduplicate_names = deduplicate;
        self
    }

    #[must_use]
    pub fn include_composites(mut self, include: bool) -> Self {
        self.config.archive.include_composites = include;
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    /// Any failure reported by [`BatchConfig::validate`]
    pub fn build(self) -> Result<BatchConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
