//! Progress reporting service
//!
//! This module separates progress reporting concerns from the batch pipeline,
//! allowing different frontends to implement their own progress handling.

use crate::{error::ItemFailure, types::BatchSummary};
use instant::Instant;

/// Progress stages of a batch run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    /// Preparing backgrounds and workers
    BatchInitialization,
    /// Checking size and decoding an upload
    Validation,
    /// Waiting for the background remover
    BackgroundRemoval,
    /// Blending onto the assigned background
    Compositing,
    /// Item finished (processed or failed)
    ItemCompleted,
    /// All items finished
    BatchFinalization,
    /// Writing the download archive
    ArchivePackaging,
}

impl ProcessingStage {
    /// Get a human-readable description of the processing stage
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            ProcessingStage::BatchInitialization => "Initializing batch",
            ProcessingStage::Validation => "Validating upload",
            ProcessingStage::BackgroundRemoval => "Removing background",
            ProcessingStage::Compositing => "Compositing onto background",
            ProcessingStage::ItemCompleted => "Item completed",
            ProcessingStage::BatchFinalization => "Finalizing batch",
            ProcessingStage::ArchivePackaging => "Packaging archive",
        }
    }

    /// Typical progress percentage within a single item
    #[must_use]
    pub fn progress_percentage(&self) -> u8 {
        match self {
            ProcessingStage::BatchInitialization => 0,
            ProcessingStage::Validation => 10,
            ProcessingStage::BackgroundRemoval => 50,
            ProcessingStage::Compositing => 90,
            ProcessingStage::ItemCompleted | ProcessingStage::BatchFinalization => 100,
            ProcessingStage::ArchivePackaging => 95,
        }
    }
}

/// Stage change for one item
#[derive(Debug, Clone)]
pub struct ItemProgressUpdate {
    /// Position of the item in the upload order
    pub index: usize,
    /// Filename as uploaded
    pub filename: String,
    pub stage: ProcessingStage,
    /// Progress percentage (0-100)
    pub progress: u8,
    /// Elapsed time since the batch started (milliseconds)
    pub elapsed_ms: u64,
}

impl ItemProgressUpdate {
    #[must_use]
    pub fn new(index: usize, filename: &str, stage: ProcessingStage, start_time: Instant) -> Self {
        Self {
            index,
            filename: filename.to_string(),
            progress: stage.progress_percentage(),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
            stage,
        }
    }
}

/// Statistics for batch processing operations
#[derive(Debug, Clone, Default)]
pub struct BatchProcessingStats {
    /// Number of items finished (processed or failed)
    pub items_completed: usize,
    /// Total number of items to process
    pub items_total: usize,
    /// Number of items that failed processing
    pub items_failed: usize,
    /// Name of the item that just finished
    pub current_item_name: String,
    /// Processing rate in items per second
    pub processing_rate: f64,
    /// Estimated time remaining in seconds
    pub eta_seconds: Option<u64>,
}

impl BatchProcessingStats {
    /// Compute rate and ETA from counts and elapsed seconds
    #[must_use]
    pub fn compute(
        items_completed: usize,
        items_total: usize,
        items_failed: usize,
        current_item_name: String,
        elapsed_seconds: f64,
    ) -> Self {
        let processing_rate = if elapsed_seconds > 0.0 && items_completed > 0 {
            items_completed as f64 / elapsed_seconds
        } else {
            0.0
        };
        let remaining = items_total.saturating_sub(items_completed);
        let eta_seconds = if processing_rate > 0.0 {
            Some((remaining as f64 / processing_rate) as u64)
        } else {
            None
        };

        Self {
            items_completed,
            items_total,
            items_failed,
            current_item_name,
            processing_rate,
            eta_seconds,
        }
    }

    /// Overall completion percentage
    #[must_use]
    pub fn percentage(&self) -> u8 {
        if self.items_total == 0 {
            return 100;
        }
        ((self.items_completed * 100) / self.items_total).min(100) as u8
    }
}

/// Trait for reporting progress during batch processing
pub trait ProgressReporter: Send + Sync {
    /// Report a stage change of one item
    fn report_item(&self, update: ItemProgressUpdate);

    /// Report that an item finished, with batch-wide statistics
    fn report_batch(&self, stats: BatchProcessingStats);

    /// Report a per-item failure
    fn report_failure(&self, index: usize, filename: &str, reason: &ItemFailure);

    /// Report a batch-wide stage: initialization, finalization or archive packaging
    fn report_stage(&self, _stage: ProcessingStage, _detail: &str) {}

    /// Report batch completion
    fn report_completion(&self, _summary: &BatchSummary) {}
}

/// No-op progress reporter that discards all progress updates
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_item(&self, _update: ItemProgressUpdate) {}

    fn report_batch(&self, _stats: BatchProcessingStats) {}

    fn report_failure(&self, _index: usize, _filename: &str, _reason: &ItemFailure) {}
}

/// Console progress reporter that logs progress through the `log` facade
pub struct ConsoleProgressReporter {
    verbose: bool,
}

impl ConsoleProgressReporter {
    /// Create a new console progress reporter
    ///
    /// # Arguments
    /// * `verbose` - Whether to log every stage change instead of only item completions
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report_item(&self, update: ItemProgressUpdate) {
        if self.verbose {
            log::info!(
                "[#{} {}] {} ({}ms elapsed)",
                update.index,
                update.filename,
                update.stage.description(),
                update.elapsed_ms
            );
        }
    }

    fn report_batch(&self, stats: BatchProcessingStats) {
        match stats.eta_seconds {
            Some(eta) if self.verbose => log::info!(
                "[{}%] {}/{} done, {} failed ({:.2} items/s, ~{}s remaining)",
                stats.percentage(),
                stats.items_completed,
                stats.items_total,
                stats.items_failed,
                stats.processing_rate,
                eta
            ),
            _ => log::info!(
                "[{}%] {}/{} done ({})",
                stats.percentage(),
                stats.items_completed,
                stats.items_total,
                stats.current_item_name
            ),
        }
    }

    fn report_failure(&self, index: usize, filename: &str, reason: &ItemFailure) {
        log::error!("❌ Item #{index} ({filename}) failed: {reason}");
    }

    fn report_stage(&self, stage: ProcessingStage, detail: &str) {
        if self.verbose {
            log::info!("{} ({detail})", stage.description());
        } else {
            log::debug!("{} ({detail})", stage.description());
        }
    }

    fn report_completion(&self, summary: &BatchSummary) {
        log::info!(
            "✅ Batch {} completed in {}ms: {} processed, {} failed",
            summary.batch_id,
            summary.total_ms,
            summary.processed,
            summary.failed
        );
    }
}
