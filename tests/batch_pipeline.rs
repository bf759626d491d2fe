//! End-to-end batch processing through the public API
//!
//! Exercises ordering, cyclic background assignment, per-item failure
//! isolation and the JSON report with the mock remover.

mod common;

use bgremove_batch::{
    backends::{MockMatte, MockRemover},
    BackgroundRemover, BatchConfig, BatchProcessor, BatchSummary, ColorMode, ExecutionProvider,
    ImageAsset, ItemFailure, LosslessFormat,
};
use common::{assert_close, corrupted_upload, gradient_upload, solid_upload};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn processor_with(remover: MockRemover, config: BatchConfig) -> BatchProcessor {
    BatchProcessor::new(config, Arc::new(remover)).unwrap()
}

#[tokio::test]
async fn test_backgrounds_are_assigned_cyclically() {
    let processor = processor_with(MockRemover::circle(), BatchConfig::default());
    let uploads = (0..5)
        .map(|i| solid_upload(&format!("img{i}.png"), 10 + i, 8, [200, 10, 10]))
        .collect();
    let backgrounds = processor.prepare_backgrounds(vec![
        solid_upload("bg0.png", 30, 30, [0, 0, 255]),
        solid_upload("bg1.png", 5, 5, [0, 255, 0]),
        solid_upload("bg2.png", 64, 16, [255, 255, 255]),
    ]);

    let result = processor.process(uploads, &backgrounds).await;

    let assigned: Vec<_> = result.iter().map(|item| item.outcome.background_index()).collect();
    assert_eq!(assigned, vec![Some(0), Some(1), Some(2), Some(0), Some(1)]);

    for (i, item) in result.iter().enumerate() {
        let composited = item.outcome.composited().unwrap();
        assert_eq!(composited.dimensions(), (10 + i as u32, 8));
        assert_eq!(composited.mode(), ColorMode::Rgb);
    }
}

#[tokio::test]
async fn test_corrupted_item_fails_alone() {
    let processor = processor_with(MockRemover::circle(), BatchConfig::default());
    let uploads = vec![
        solid_upload("a.png", 4, 4, [1, 2, 3]),
        solid_upload("b.png", 4, 4, [1, 2, 3]),
        corrupted_upload("c.png"),
        solid_upload("d.png", 4, 4, [1, 2, 3]),
    ];

    let result = processor.process(uploads, &processor.prepare_backgrounds(Vec::new())).await;

    assert_eq!(result.len(), 4);
    let names: Vec<_> = result.iter().map(|item| item.filename.as_str()).collect();
    assert_eq!(names, vec!["a.png", "b.png", "c.png", "d.png"]);
    assert!(matches!(
        result.get(2).unwrap().outcome.failure(),
        Some(ItemFailure::Undecodable(_))
    ));
    assert_eq!(result.processed_count(), 3);
    assert_eq!(result.failed_count(), 1);
}

#[tokio::test]
async fn test_oversized_upload_is_rejected_before_removal() {
    let remover = MockRemover::circle();
    let processor = processor_with(remover.clone(), BatchConfig::default());
    let oversized = solid_upload("huge.png", 2, 2, [0, 0, 0]).with_declared_size(10 * 1024 * 1024 + 1);

    let result = processor
        .process(vec![oversized], &processor.prepare_backgrounds(Vec::new()))
        .await;

    assert!(matches!(
        result.get(0).unwrap().outcome.failure(),
        Some(ItemFailure::TooLarge { limit, .. }) if *limit == 10 * 1024 * 1024
    ));
    assert_eq!(remover.call_count(), 0);
}

#[tokio::test]
async fn test_opaque_matte_keeps_foreground_pixels() {
    let processor = processor_with(MockRemover::new(MockMatte::Opaque), BatchConfig::default());
    let upload = gradient_upload("g.png", 12, 9);
    let original = ImageAsset::decode(&upload.bytes).unwrap();
    let backgrounds = processor.prepare_backgrounds(vec![solid_upload("bg.png", 3, 3, [9, 9, 9])]);

    let result = processor.process(vec![upload], &backgrounds).await;
    let outcome = &result.get(0).unwrap().outcome;

    let foreground = outcome.foreground().unwrap().to_rgba();
    let composited = outcome.composited().unwrap();
    for ((fg, orig), comp) in foreground
        .pixels()
        .zip(original.to_rgba().pixels())
        .zip(composited.pixels().chunks_exact(3))
    {
        assert_eq!(fg.0[..3], orig.0[..3]);
        assert_eq!(fg.0[3], 255);
        assert_eq!(comp, &orig.0[..3]);
    }
}

#[tokio::test]
async fn test_transparent_matte_reveals_background() {
    let processor = processor_with(MockRemover::new(MockMatte::Transparent), BatchConfig::default());
    let backgrounds = processor.prepare_backgrounds(vec![solid_upload("bg.png", 40, 40, [10, 120, 240])]);

    let result = processor
        .process(vec![solid_upload("a.png", 7, 5, [255, 0, 0])], &backgrounds)
        .await;
    let composited = result.get(0).unwrap().outcome.composited().unwrap();

    assert_eq!(composited.dimensions(), (7, 5));
    for pixel in composited.pixels().chunks_exact(3) {
        assert_close(pixel[0], 10);
        assert_close(pixel[1], 120);
        assert_close(pixel[2], 240);
    }
}

#[tokio::test]
async fn test_foreground_survives_lossless_round_trip() {
    let processor = processor_with(MockRemover::circle(), BatchConfig::default());
    let result = processor
        .process(vec![gradient_upload("g.png", 16, 16)], &processor.prepare_backgrounds(Vec::new()))
        .await;
    let foreground = result.get(0).unwrap().outcome.foreground().unwrap();

    for format in [LosslessFormat::Png, LosslessFormat::Tiff] {
        let decoded = ImageAsset::decode(&foreground.encode(format).unwrap()).unwrap();
        assert_eq!(decoded.mode(), ColorMode::Rgba, "{format:?}");
        assert_eq!(decoded.pixels(), foreground.pixels(), "{format:?}");
    }
}

#[tokio::test]
async fn test_concurrent_batch_preserves_order() {
    let config = BatchConfig::builder().max_concurrency(4).build().unwrap();
    let remover = MockRemover::circle().with_delay(Duration::from_millis(15));
    let processor = processor_with(remover.clone(), config);
    let uploads = (0..8)
        .map(|i| solid_upload(&format!("item{i}.png"), 3 + i, 3, [50, 50, 50]))
        .collect();

    let result = processor.process(uploads, &processor.prepare_backgrounds(Vec::new())).await;

    assert_eq!(remover.call_count(), 8);
    for (i, item) in result.iter().enumerate() {
        assert_eq!(item.index, i);
        assert_eq!(item.filename, format!("item{i}.png"));
        assert_eq!(item.outcome.foreground().unwrap().width(), 3 + i as u32);
    }
}

/// Sleeps on its first call only
struct SlowFirstCall {
    inner: MockRemover,
    calls: AtomicUsize,
    delay: Duration,
}

impl BackgroundRemover for SlowFirstCall {
    fn remove(&self, encoded_png: &[u8], device: ExecutionProvider) -> bgremove_batch::Result<Vec<u8>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            std::thread::sleep(self.delay);
        }
        self.inner.remove(encoded_png, device)
    }
}

#[tokio::test]
async fn test_timeout_only_affects_slow_items() {
    let config = BatchConfig::builder()
        .removal_timeout(Some(Duration::from_millis(50)))
        .build()
        .unwrap();
    let remover = SlowFirstCall {
        inner: MockRemover::circle(),
        calls: AtomicUsize::new(0),
        delay: Duration::from_millis(400),
    };
    let processor = BatchProcessor::new(config, Arc::new(remover)).unwrap();

    let result = processor
        .process(
            vec![
                solid_upload("slow.png", 2, 2, [0, 0, 0]),
                solid_upload("fast.png", 3, 2, [0, 0, 0]),
            ],
            &processor.prepare_backgrounds(Vec::new()),
        )
        .await;

    assert_eq!(result.len(), 2);
    assert_eq!(
        result.get(0).unwrap().outcome.failure(),
        Some(&ItemFailure::Timeout { limit_ms: 50 })
    );
    let fast = result.get(1).unwrap();
    assert!(fast.outcome.is_processed());
    assert_eq!(fast.outcome.foreground().unwrap().dimensions(), (3, 2));
}

#[tokio::test]
async fn test_device_hint_reaches_remover() {
    let config = BatchConfig::builder()
        .execution_provider(ExecutionProvider::Cpu)
        .build()
        .unwrap();
    let remover = MockRemover::circle();
    let processor = processor_with(remover.clone(), config);

    processor
        .process(
            vec![solid_upload("a.png", 2, 2, [0, 0, 0]), solid_upload("b.png", 2, 2, [0, 0, 0])],
            &processor.prepare_backgrounds(Vec::new()),
        )
        .await;

    assert_eq!(
        remover.call_history(),
        vec![ExecutionProvider::Cpu; 2]
    );
}

#[tokio::test]
async fn test_cancellation_marks_remaining_items() {
    let processor = processor_with(MockRemover::circle(), BatchConfig::default());
    processor.cancellation_token().cancel();

    let result = processor
        .process(
            vec![solid_upload("a.png", 2, 2, [0, 0, 0]), corrupted_upload("b.png")],
            &processor.prepare_backgrounds(Vec::new()),
        )
        .await;

    assert_eq!(result.len(), 2);
    assert_eq!(result.failed_count(), 2);
    assert!(result
        .iter()
        .all(|item| item.outcome.failure() == Some(&ItemFailure::Cancelled)));
}

#[tokio::test]
async fn test_summary_serializes_to_json() {
    let processor = processor_with(MockRemover::circle(), BatchConfig::default());
    let backgrounds = processor.prepare_backgrounds(vec![solid_upload("bg.png", 4, 4, [0, 0, 0])]);
    let result = processor
        .process(
            vec![solid_upload("a.png", 6, 3, [1, 1, 1]), corrupted_upload("b.png")],
            &backgrounds,
        )
        .await;

    let json = serde_json::to_string(&result.summary()).unwrap();
    let summary: BatchSummary = serde_json::from_str(&json).unwrap();

    assert_eq!(summary, result.summary());
    assert_eq!(summary.total_items, 2);
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.items[0].dimensions, Some((6, 3)));
    assert!(summary.items[0].composited);
    assert_eq!(summary.items[1].status, "failed");

    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["items"][1]["failure"]["kind"], "undecodable");
}
