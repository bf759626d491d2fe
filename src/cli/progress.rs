//! Progress bar reporter for the CLI

use crate::{
    error::ItemFailure,
    services::{BatchProcessingStats, ItemProgressUpdate, ProcessingStage, ProgressReporter},
    types::BatchSummary,
};
use indicatif::{ProgressBar, ProgressStyle};

/// Drives an `indicatif` bar from batch progress events
pub struct IndicatifProgressReporter {
    bar: ProgressBar,
    detailed: bool,
}

impl IndicatifProgressReporter {
    /// Create a bar for `total` items
    ///
    /// With `detailed`, every stage change is shown in the bar message;
    /// otherwise only completed items are.
    #[must_use]
    pub fn new(total: usize, detailed: bool) -> Self {
        let bar = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("#>-"));
        }
        Self { bar, detailed }
    }

    /// Hidden bar, for tests and non-interactive runs
    #[must_use]
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
            detailed: false,
        }
    }

    #[must_use]
    pub fn position(&self) -> u64 {
        self.bar.position()
    }
}

impl ProgressReporter for IndicatifProgressReporter {
    fn report_item(&self, update: ItemProgressUpdate) {
        if self.detailed && update.stage != ProcessingStage::ItemCompleted {
            self.bar
                .set_message(format!("{} {}", update.stage.description(), update.filename));
        }
    }

    fn report_batch(&self, stats: BatchProcessingStats) {
        self.bar.set_position(stats.items_completed as u64);
        let message = match stats.eta_seconds {
            Some(eta) if self.detailed => format!(
                "{} ({} failed, {:.2}/s, ~{eta}s left)",
                stats.current_item_name, stats.items_failed, stats.processing_rate
            ),
            _ => stats.current_item_name,
        };
        self.bar.set_message(message);
    }

    fn report_failure(&self, index: usize, filename: &str, reason: &ItemFailure) {
        self.bar
            .println(format!("❌ #{index} {filename}: {reason}"));
    }

    fn report_stage(&self, stage: ProcessingStage, detail: &str) {
        match stage {
            ProcessingStage::ArchivePackaging => {
                self.bar.println(format!("📦 {} {detail}", stage.description()));
            },
            _ if self.detailed => self.bar.set_message(stage.description()),
            _ => {},
        }
    }

    fn report_completion(&self, summary: &BatchSummary) {
        self.bar.finish_with_message(format!(
            "Completed! Processed: {}, Failed: {}",
            summary.processed, summary.failed
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bar_follows_completed_items() {
        let reporter = IndicatifProgressReporter::hidden();
        reporter.report_batch(BatchProcessingStats::compute(2, 5, 0, "b.jpg".into(), 1.0));
        assert_eq!(reporter.position(), 2);
        reporter.report_failure(2, "c.jpg", &ItemFailure::Cancelled);
        reporter.report_batch(BatchProcessingStats::compute(3, 5, 1, "c.jpg".into(), 2.0));
        assert_eq!(reporter.position(), 3);
    }
}
