//! Batch background removal CLI
//!
//! Reads uploads and backgrounds from disk, runs them through the batch
//! processor and writes per-item images, a JSON report and a zip archive.

use super::{config::CliConfigBuilder, progress::IndicatifProgressReporter};
use crate::{
    archive::{derive_entry_name, disambiguate_name, ArchivePackager, COMPOSITE_SUFFIX},
    backends::OnnxRemover,
    batch::BatchProcessor,
    config::{BatchConfig, LosslessFormat},
    services::{
        ConsoleProgressReporter, ImageCodec, ImageIOService, ProcessingStage, ProgressReporter,
    },
    tracing_config::{events, spans, TracingConfig, TracingFormat, TracingGuard},
    types::{BatchResult, UploadItem},
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{info, warn};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Batch background removal with optional replacement backgrounds
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "bgremove-batch")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Input image files or directories, processed in the given order
    #[arg(value_name = "INPUT", required_unless_present = "show_providers")]
    pub input: Vec<String>,

    /// Background image file or directory (repeatable; assigned cyclically)
    #[arg(short, long = "background", value_name = "BACKGROUND")]
    pub backgrounds: Vec<String>,

    /// Directory for per-item results (`<stem>_no_bg.<ext>`, `<stem>_composited.<ext>`)
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Write all background-removed images into this zip archive
    #[arg(short, long, value_name = "ZIP")]
    pub archive: Option<PathBuf>,

    /// Write a JSON report of the batch
    #[arg(long, value_name = "JSON")]
    pub report: Option<PathBuf>,

    /// JSON configuration file; command-line flags override its values
    #[arg(short, long, value_name = "JSON")]
    pub config: Option<PathBuf>,

    /// ONNX model file [default: $U2NET_HOME/u2net.onnx or ~/.u2net/u2net.onnx]
    #[arg(short, long, value_name = "MODEL")]
    pub model: Option<PathBuf>,

    /// Square input size of the model
    #[arg(long, value_name = "PIXELS")]
    pub model_input_size: Option<u32>,

    /// Execution provider (auto, cpu, cuda, coreml; `onnx:` prefix accepted)
    #[arg(short, long)]
    pub execution_provider: Option<String>,

    /// Lossless output format for per-item files and archive entries
    #[arg(short, long, value_enum)]
    pub format: Option<CliOutputFormat>,

    /// Upload size ceiling in MiB
    #[arg(long, value_name = "MIB")]
    pub max_size_mb: Option<f64>,

    /// Per-item background removal timeout in seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<f64>,

    /// Number of items processed concurrently
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Process directories recursively
    #[arg(short, long)]
    pub recursive: bool,

    /// Filename pattern for directory inputs (e.g., "*.jpg")
    #[arg(long)]
    pub pattern: Option<String>,

    /// Let later archive entries replace earlier ones with the same name
    #[arg(long)]
    pub keep_duplicate_names: bool,

    /// Also store composited images in the archive
    #[arg(long)]
    pub include_composites: bool,

    /// Show execution provider diagnostics and exit
    #[arg(long)]
    pub show_providers: bool,

    /// Show detailed per-stage progress
    #[arg(long)]
    pub progress: bool,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
pub enum CliOutputFormat {
    Png,
    Tiff,
    #[cfg(feature = "webp-support")]
    Webp,
}

impl From<CliOutputFormat> for LosslessFormat {
    fn from(format: CliOutputFormat) -> Self {
        match format {
            CliOutputFormat::Png => LosslessFormat::Png,
            CliOutputFormat::Tiff => LosslessFormat::Tiff,
            #[cfg(feature = "webp-support")]
            CliOutputFormat::Webp => LosslessFormat::WebP,
        }
    }
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();
    let session_id = uuid::Uuid::new_v4().to_string();
    let _tracing_guard = init_tracing(cli.verbose, &session_id).context("Failed to initialize tracing")?;

    if cli.show_providers {
        show_provider_diagnostics();
        return Ok(());
    }

    CliConfigBuilder::validate_cli(&cli).context("Invalid CLI arguments")?;
    let config = CliConfigBuilder::from_cli(&cli).context("Failed to build configuration")?;

    let remover = OnnxRemover::new(CliConfigBuilder::remover_config(&cli))
        .context("Failed to create ONNX background remover")?;
    let _session = spans::session(&session_id, "onnx", &config.execution_provider.to_string()).entered();

    events::progress("Starting batch background removal", "🚀");
    info!(
        "Provider: {}, concurrency: {}, timeout: {}",
        config.execution_provider,
        config.max_concurrency,
        config
            .removal_timeout()
            .map_or_else(|| "none".to_string(), |t| format!("{:.1}s", t.as_secs_f64()))
    );

    let upload_paths = collect_input_files(&cli.input, cli.recursive, cli.pattern.as_deref())?;
    let background_paths = collect_input_files(&cli.backgrounds, cli.recursive, cli.pattern.as_deref())?;
    if upload_paths.is_empty() {
        events::warning_with_recommendation(
            "No supported image files found in the provided inputs",
            "pass image files directly, or use --recursive / --pattern for directories",
        );
        return Ok(());
    }

    let (uploads, background_uploads) = {
        let _span = spans::input_collection(upload_paths.len(), background_paths.len()).entered();
        (
            read_uploads(&upload_paths, config.max_upload_bytes)?,
            read_uploads(&background_paths, config.max_upload_bytes)?,
        )
    };
    info!(
        "Found {} image(s) and {} background(s) to process",
        uploads.len(),
        background_uploads.len()
    );

    let reporter: Arc<dyn ProgressReporter> = if uploads.len() > 1 || cli.progress {
        Arc::new(IndicatifProgressReporter::new(uploads.len(), cli.progress))
    } else {
        Arc::new(ConsoleProgressReporter::new(cli.verbose > 0))
    };
    let processor = BatchProcessor::new(config.clone(), Arc::new(remover))
        .context("Failed to create batch processor")?
        .with_progress_reporter(Arc::clone(&reporter));

    let cancellation = processor.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted: remaining items will be marked as cancelled");
            cancellation.cancel();
        }
    });

    let start_time = Instant::now();
    let backgrounds = processor.prepare_backgrounds(background_uploads);
    if !backgrounds.is_empty() && backgrounds.usable_count() < backgrounds.len() {
        warn!(
            "Only {} of {} backgrounds could be decoded; items assigned to the others stay uncomposited",
            backgrounds.usable_count(),
            backgrounds.len()
        );
    }
    let result = processor.process(uploads, &backgrounds).await;
    events::performance_metric("batch", result.total_ms);

    if let Some(output_dir) = &cli.output_dir {
        let _span = spans::output_writing(output_dir).entered();
        let written = write_item_outputs(&result, output_dir, &config.archive.suffix, config.archive.format)?;
        info!("Wrote {written} file(s) to {}", output_dir.display());
    }

    if let Some(report_path) = &cli.report {
        let json = serde_json::to_vec_pretty(&result.summary()).context("Failed to serialize report")?;
        ImageIOService::write_bytes(&json, report_path)
            .with_context(|| format!("Failed to write report to {}", report_path.display()))?;
        info!("Report written to {}", report_path.display());
    }

    let archive_outcome = match &cli.archive {
        Some(archive_path) => {
            let _span = spans::archive(archive_path).entered();
            write_archive(&result, &config, archive_path, reporter.as_ref())
        },
        None => Ok(()),
    };

    print_summary(&result, start_time);

    if let Err(e) = archive_outcome {
        events::error_with_context(&format!("{e:#}"), "archive");
        return Err(e.context("Per-item results were kept, but the archive could not be written"));
    }
    if result.processed_count() == 0 {
        anyhow::bail!("No image could be processed ({} failed)", result.failed_count());
    }
    Ok(())
}

/// Initialize tracing based on verbosity level
fn init_tracing(verbose_count: u8, session_id: &str) -> Result<TracingGuard> {
    let guard = TracingConfig::new()
        .with_verbosity(verbose_count)
        .with_format(TracingFormat::Console)
        .with_session_id(session_id)
        .init()
        .context("Failed to initialize tracing subscriber")?;
    tracing::debug!(verbosity = verbose_count, "Tracing initialized");
    Ok(guard)
}

/// Display execution provider diagnostics
fn show_provider_diagnostics() {
    println!("🔍 Execution Provider Diagnostics");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let cpu_count = std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1);
    println!("💻 System: {cpu_count} CPU cores detected");

    println!("\n🚀 Execution Providers:");
    for (name, available, description) in OnnxRemover::list_providers() {
        let status = if available { "✅ Available" } else { "❌ Not Available" };
        println!("  • {name}: {status} - {description}");
    }

    println!("\n💡 Usage Examples:");
    println!("  --execution-provider auto    # Auto-select best provider (default)");
    println!("  --execution-provider coreml  # Use Apple CoreML (macOS)");
    println!("  --execution-provider cuda    # Use NVIDIA CUDA");
    println!("  --execution-provider cpu     # Force CPU execution");
}

/// Expand inputs into image paths
///
/// Explicit files keep their command-line order; the contents of each
/// directory are sorted and inserted where the directory was named.
fn collect_input_files(inputs: &[String], recursive: bool, pattern: Option<&str>) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        let path = PathBuf::from(input);
        if path.is_file() {
            files.push(path);
        } else if path.is_dir() {
            let mut dir_files = find_image_files(&path, recursive, pattern)?;
            dir_files.sort();
            files.extend(dir_files);
        } else {
            anyhow::bail!(
                "Input path does not exist or is not accessible: {}",
                path.display()
            );
        }
    }
    Ok(files)
}

/// Find all image files in a directory
fn find_image_files(dir: &Path, recursive: bool, pattern: Option<&str>) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    if recursive {
        for entry in walkdir::WalkDir::new(dir) {
            let entry = entry?;
            if entry.file_type().is_file() {
                let path = entry.path();
                if is_image_file(path) && matches_pattern(path, pattern) {
                    files.push(path.to_path_buf());
                }
            }
        }
    } else {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                let path = entry.path();
                if is_image_file(&path) && matches_pattern(&path, pattern) {
                    files.push(path);
                }
            }
        }
    }

    Ok(files)
}

/// Check if file is an image based on extension
fn is_image_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(ImageCodec::is_supported_extension)
}

/// Check if file matches the given pattern
fn matches_pattern(path: &Path, pattern: Option<&str>) -> bool {
    match pattern {
        Some(pat) => path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|filename| {
                glob::Pattern::new(pat)
                    .map(|p| p.matches(filename))
                    .unwrap_or(false)
            }),
        None => true,
    }
}

fn read_uploads(paths: &[PathBuf], max_bytes: u64) -> Result<Vec<UploadItem>> {
    paths
        .iter()
        .map(|path| {
            ImageIOService::read_upload(path, max_bytes)
                .with_context(|| format!("Failed to read {}", path.display()))
        })
        .collect()
}

/// Reserve a file name, numbered the same way as archive entries
fn unique_output_name(
    filename: &str,
    suffix: &str,
    extension: &str,
    taken: &mut HashSet<String>,
) -> String {
    let name = disambiguate_name(
        &derive_entry_name(filename, suffix, extension),
        extension,
        |candidate| taken.contains(candidate),
    );
    taken.insert(name.clone());
    name
}

/// Write each processed item (and its composite) to `output_dir`
fn write_item_outputs(
    result: &BatchResult,
    output_dir: &Path,
    suffix: &str,
    format: LosslessFormat,
) -> Result<usize> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory: {}", output_dir.display()))?;

    let extension = format.extension();
    let mut taken = HashSet::new();
    let mut written = 0;
    for item in result.iter() {
        let Some(foreground) = item.outcome.foreground() else {
            continue;
        };
        let name = unique_output_name(&item.filename, suffix, extension, &mut taken);
        ImageIOService::save_asset(foreground, output_dir.join(&name), format)
            .with_context(|| format!("Failed to write {name}"))?;
        written += 1;

        if let Some(composited) = item.outcome.composited() {
            let name = unique_output_name(&item.filename, COMPOSITE_SUFFIX, extension, &mut taken);
            ImageIOService::save_asset(composited, output_dir.join(&name), format)
                .with_context(|| format!("Failed to write {name}"))?;
            written += 1;
        }
    }
    Ok(written)
}

fn write_archive(
    result: &BatchResult,
    config: &BatchConfig,
    path: &Path,
    reporter: &dyn ProgressReporter,
) -> Result<()> {
    reporter.report_stage(ProcessingStage::ArchivePackaging, &path.display().to_string());
    let packager = ArchivePackager::new(config.archive.clone());
    let archive = packager.package_result(result)?;
    ImageIOService::write_bytes(&archive, path)
        .with_context(|| format!("Failed to write archive to {}", path.display()))?;
    info!("📦 Archive written to {} ({} bytes)", path.display(), archive.len());
    Ok(())
}

fn print_summary(result: &BatchResult, start_time: Instant) {
    let total = start_time.elapsed();
    info!("📊 Batch processing summary:");
    info!("  ├─ Items processed: {}", result.processed_count());
    info!("  ├─ Items failed: {}", result.failed_count());
    info!(
        "  ├─ Composited: {}",
        result.iter().filter(|item| item.outcome.composited().is_some()).count()
    );
    info!("  └─ Total time: {:.2}s", total.as_secs_f64());

    for item in result.iter() {
        if let Some(reason) = item.outcome.failure() {
            warn!("  • #{} {}: {reason}", item.index, item.filename);
        }
    }
}
