//! Batch orchestration
//!
//! [`BatchProcessor`] drives every upload through validation, background
//! removal and optional compositing. Each item's failure is recorded in its own
//! slot of the [`BatchResult`]; nothing a single item does can abort the batch
//! or shift the position of another item.

use crate::{
    background::BackgroundSet,
    compositor::Compositor,
    config::BatchConfig,
    error::{ItemFailure, Result},
    remover::BackgroundRemover,
    services::{
        BatchProcessingStats, ImageCodec, ImageValidator, ItemProgressUpdate,
        NoOpProgressReporter, ProcessingStage, ProgressReporter,
    },
    types::{BatchItem, BatchResult, ImageAsset, ItemOutcome, ProcessingTimings, UploadItem},
};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use instant::Instant;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use tokio_util::sync::CancellationToken;
use tracing::{info_span, Instrument};
use uuid::Uuid;

/// Batch-wide counters shared by in-flight items
struct BatchTracker {
    total: usize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    start: Instant,
}

impl BatchTracker {
    fn new(total: usize) -> Self {
        Self {
            total,
            completed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            start: Instant::now(),
        }
    }

    fn finish(&self, filename: &str, failed: bool) -> BatchProcessingStats {
        let completed = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        let failed_total = if failed {
            self.failed.fetch_add(1, Ordering::SeqCst) + 1
        } else {
            self.failed.load(Ordering::SeqCst)
        };
        BatchProcessingStats::compute(
            completed,
            self.total,
            failed_total,
            filename.to_string(),
            self.start.elapsed().as_secs_f64(),
        )
    }
}

/// Runs batches of uploads through a [`BackgroundRemover`]
///
/// # Examples
/// ```rust
/// use bgremove_batch::{
///     backends::MockRemover, BackgroundSet, BatchConfig, BatchProcessor, UploadItem,
/// };
/// use std::sync::Arc;
///
/// # async fn example(photo: Vec<u8>) -> bgremove_batch::Result<()> {
/// let processor = BatchProcessor::new(BatchConfig::default(), Arc::new(MockRemover::circle()))?;
/// let result = processor
///     .process(vec![UploadItem::new("cat.jpg", photo)], &BackgroundSet::empty())
///     .await;
/// assert_eq!(result.len(), 1);
/// # Ok(())
/// # }
/// ```
pub struct BatchProcessor {
    config: BatchConfig,
    remover: Arc<dyn BackgroundRemover>,
    validator: ImageValidator,
    compositor: Compositor,
    progress: Arc<dyn ProgressReporter>,
    cancellation: CancellationToken,
}

impl BatchProcessor {
    /// Create a processor for a validated configuration
    ///
    /// # Errors
    /// Invalid configuration values
    pub fn new(config: BatchConfig, remover: Arc<dyn BackgroundRemover>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            validator: ImageValidator::new(config.max_upload_bytes),
            compositor: Compositor::new(config.resize_filter),
            config,
            remover,
            progress: Arc::new(NoOpProgressReporter),
            cancellation: CancellationToken::new(),
        })
    }

    #[must_use]
    pub fn with_progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress = reporter;
        self
    }

    /// Use an externally owned cancellation token
    #[must_use]
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Token that cancels items which have not started yet
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    #[must_use]
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    #[must_use]
    pub fn validator(&self) -> &ImageValidator {
        &self.validator
    }

    /// Validate background uploads with this processor's size ceiling
    #[must_use]
    pub fn prepare_backgrounds(&self, uploads: Vec<UploadItem>) -> BackgroundSet {
        BackgroundSet::from_uploads(uploads, &self.validator)
    }

    /// Process uploads in order, pairing item `i` with background `i mod len`
    ///
    /// The result has exactly one entry per upload, in upload order, even when
    /// items run concurrently or the batch is cancelled part way.
    pub async fn process(&self, uploads: Vec<UploadItem>, backgrounds: &BackgroundSet) -> BatchResult {
        let batch_id = Uuid::new_v4();
        let started_at = Utc::now();
        let tracker = BatchTracker::new(uploads.len());

        let span = info_span!(
            "batch",
            batch_id = %batch_id,
            items = uploads.len(),
            backgrounds = backgrounds.len(),
            remover = self.remover.name()
        );

        async {
            log::info!(
                "🎯 Starting batch {batch_id}: {} item(s), {} background(s), concurrency {}",
                uploads.len(),
                backgrounds.len(),
                self.config.max_concurrency
            );
            self.progress
                .report_stage(ProcessingStage::BatchInitialization, &batch_id.to_string());
            if !backgrounds.is_empty() && backgrounds.len() < uploads.len() {
                log::info!(
                    "{} background(s) for {} item(s); backgrounds are reused cyclically",
                    backgrounds.len(),
                    uploads.len()
                );
            }

            let items: Vec<BatchItem> = stream::iter(uploads.into_iter().enumerate())
                .map(|(index, upload)| self.process_item(index, upload, backgrounds, &tracker))
                .buffered(self.config.max_concurrency)
                .collect()
                .await;

            let result = BatchResult {
                batch_id,
                started_at,
                items,
                total_ms: tracker.start.elapsed().as_millis() as u64,
            };

            log::info!(
                "✅ Batch {batch_id} finished in {}ms: {} processed, {} failed",
                result.total_ms,
                result.processed_count(),
                result.failed_count()
            );
            self.progress
                .report_stage(ProcessingStage::BatchFinalization, &batch_id.to_string());
            self.progress.report_completion(&result.summary());
            result
        }
        .instrument(span)
        .await
    }

    async fn process_item(
        &self,
        index: usize,
        mut upload: UploadItem,
        backgrounds: &BackgroundSet,
        tracker: &BatchTracker,
    ) -> BatchItem {
        let span = info_span!("item", index, filename = %upload.filename);
        let item_start = Instant::now();

        let (outcome, mut timings) = self
            .run_item(index, &mut upload, backgrounds, tracker.start)
            .instrument(span)
            .await;
        timings.total_ms = item_start.elapsed().as_millis() as u64;

        if let ItemOutcome::Failed { reason } = &outcome {
            log::warn!("Item #{index} '{}' failed: {reason}", upload.filename);
            self.progress.report_failure(index, &upload.filename, reason);
        }
        self.progress.report_item(ItemProgressUpdate::new(
            index,
            &upload.filename,
            ProcessingStage::ItemCompleted,
            tracker.start,
        ));
        self.progress
            .report_batch(tracker.finish(&upload.filename, !outcome.is_processed()));

        BatchItem {
            index,
            filename: upload.filename,
            validation: upload.status,
            outcome,
            timings,
        }
    }

    async fn run_item(
        &self,
        index: usize,
        upload: &mut UploadItem,
        backgrounds: &BackgroundSet,
        batch_start: Instant,
    ) -> (ItemOutcome, ProcessingTimings) {
        let mut timings = ProcessingTimings::default();
        let filename = upload.filename.clone();
        let report = |stage| {
            self.progress
                .report_item(ItemProgressUpdate::new(index, &filename, stage, batch_start));
        };

        if self.cancellation.is_cancelled() {
            return (
                ItemOutcome::Failed {
                    reason: ItemFailure::Cancelled,
                },
                timings,
            );
        }

        report(ProcessingStage::Validation);
        let stage_start = Instant::now();
        let validated = self.validator.validate_in_place(upload);
        timings.validation_ms = stage_start.elapsed().as_millis() as u64;
        let asset = match validated {
            Ok(asset) => asset,
            Err(reason) => return (ItemOutcome::Failed { reason }, timings),
        };

        report(ProcessingStage::BackgroundRemoval);
        let stage_start = Instant::now();
        let removed = self.remove_background(&asset).await;
        timings.removal_ms = stage_start.elapsed().as_millis() as u64;
        let foreground = match removed {
            Ok(foreground) => foreground,
            Err(reason) => return (ItemOutcome::Failed { reason }, timings),
        };

        let Some((background_index, entry)) = backgrounds.select(index) else {
            return (
                ItemOutcome::Processed {
                    foreground,
                    composited: None,
                    background_index: None,
                    composite_error: None,
                },
                timings,
            );
        };

        report(ProcessingStage::Compositing);
        let stage_start = Instant::now();
        let composited = match &entry.image {
            Ok(background) => self.compositor.composite(&foreground, background),
            Err(reason) => Err(ItemFailure::composite_failed(format!(
                "background '{}' is unusable: {reason}",
                entry.filename
            ))),
        };
        timings.compositing_ms = stage_start.elapsed().as_millis() as u64;

        let (composited, composite_error) = match composited {
            Ok(image) => (Some(image), None),
            Err(reason) => {
                log::warn!(
                    "Item #{index} '{filename}' keeps its cut-out without a composite: {reason}"
                );
                (None, Some(reason))
            },
        };

        (
            ItemOutcome::Processed {
                foreground,
                composited,
                background_index: Some(background_index),
                composite_error,
            },
            timings,
        )
    }

    /// Validate one upload and remove its background, without compositing
    ///
    /// # Errors
    /// Any per-item failure, including cancellation
    pub async fn remove_single(&self, upload: &UploadItem) -> std::result::Result<ImageAsset, ItemFailure> {
        if self.cancellation.is_cancelled() {
            return Err(ItemFailure::Cancelled);
        }
        let asset = self.validator.validate(upload)?;
        self.remove_background(&asset).await
    }

    /// Encode, call the remover on a blocking thread, and decode its answer
    async fn remove_background(&self, asset: &ImageAsset) -> std::result::Result<ImageAsset, ItemFailure> {
        let encoded = ImageCodec::encode_png(asset)
            .map_err(|e| ItemFailure::removal_failed(format!("could not encode input: {e}")))?;

        let remover = Arc::clone(&self.remover);
        let device = self.config.execution_provider;
        let task = tokio::task::spawn_blocking(move || remover.remove(&encoded, device));

        let joined = match self.config.removal_timeout() {
            Some(limit) => match tokio::time::timeout(limit, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    return Err(ItemFailure::Timeout {
                        limit_ms: limit.as_millis() as u64,
                    })
                },
            },
            None => task.await,
        };

        let output = joined
            .map_err(|e| ItemFailure::removal_failed(format!("remover task aborted: {e}")))?
            .map_err(|e| ItemFailure::removal_failed(e.to_string()))?;

        if output.is_empty() {
            return Err(ItemFailure::removal_failed("remover returned empty output"));
        }

        let decoded = ImageCodec::decode(&output)
            .map_err(|e| ItemFailure::removal_failed(format!("remover output is not an image: {e}")))?;
        if !decoded.has_alpha() {
            log::warn!(
                "{} remover returned an image without alpha; treating it as fully opaque",
                self.remover.name()
            );
        }
        Ok(decoded.into_rgba())
    }
}
