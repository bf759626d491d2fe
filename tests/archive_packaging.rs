//! Packaging batch results into zip archives

mod common;

use bgremove_batch::{
    backends::MockRemover, ArchiveConfig, ArchivePackager, BatchConfig, BatchProcessor,
    BatchResult, ColorMode, ImageAsset, ImageIOService, LosslessFormat, UploadItem,
};
use common::{corrupted_upload, gradient_upload, solid_upload};
use std::io::{Cursor, Read};
use std::sync::Arc;
use tempfile::TempDir;

async fn run_batch(uploads: Vec<UploadItem>, backgrounds: Vec<UploadItem>) -> BatchResult {
    let processor = BatchProcessor::new(BatchConfig::default(), Arc::new(MockRemover::circle())).unwrap();
    let backgrounds = processor.prepare_backgrounds(backgrounds);
    processor.process(uploads, &backgrounds).await
}

fn entry_names(archive: &[u8]) -> Vec<String> {
    let zip = zip::ZipArchive::new(Cursor::new(archive)).unwrap();
    let mut names: Vec<String> = zip.file_names().map(str::to_string).collect();
    names.sort();
    names
}

fn read_entry(archive: &[u8], name: &str) -> ImageAsset {
    let mut zip = zip::ZipArchive::new(Cursor::new(archive)).unwrap();
    let mut bytes = Vec::new();
    zip.by_name(name).unwrap().read_to_end(&mut bytes).unwrap();
    ImageAsset::decode(&bytes).unwrap()
}

#[tokio::test]
async fn test_archive_holds_one_entry_per_processed_item() {
    let result = run_batch(
        vec![gradient_upload("a.jpg", 9, 7), gradient_upload("b.png", 5, 11)],
        Vec::new(),
    )
    .await;

    let archive = ArchivePackager::default().package_result(&result).unwrap();

    assert_eq!(entry_names(&archive), vec!["a_no_bg.png", "b_no_bg.png"]);
    let a = read_entry(&archive, "a_no_bg.png");
    assert_eq!(a.mode(), ColorMode::Rgba);
    assert_eq!(a.dimensions(), (9, 7));
    assert_eq!(a.pixels(), result.get(0).unwrap().outcome.foreground().unwrap().pixels());
}

#[tokio::test]
async fn test_failed_items_are_left_out() {
    let result = run_batch(
        vec![
            solid_upload("one.png", 3, 3, [5, 5, 5]),
            corrupted_upload("two.png"),
            solid_upload("three.png", 3, 3, [5, 5, 5]),
        ],
        Vec::new(),
    )
    .await;

    let archive = ArchivePackager::default().package_result(&result).unwrap();
    assert_eq!(entry_names(&archive), vec!["one_no_bg.png", "three_no_bg.png"]);
}

#[tokio::test]
async fn test_composites_included_on_request() {
    let result = run_batch(
        vec![solid_upload("photo.jpg", 6, 4, [200, 0, 0])],
        vec![solid_upload("beach.png", 20, 20, [0, 0, 200])],
    )
    .await;

    let packager = ArchivePackager::new(ArchiveConfig {
        include_composites: true,
        ..ArchiveConfig::default()
    });
    let archive = packager.package_result(&result).unwrap();

    assert_eq!(
        entry_names(&archive),
        vec!["photo_composited.png", "photo_no_bg.png"]
    );
    let composite = read_entry(&archive, "photo_composited.png");
    assert_eq!(composite.mode(), ColorMode::Rgb);
    assert_eq!(composite.dimensions(), (6, 4));
}

#[tokio::test]
async fn test_same_stem_uploads_get_distinct_entries() {
    let result = run_batch(
        vec![
            solid_upload("cat.jpg", 2, 2, [1, 1, 1]),
            solid_upload("cat.png", 3, 3, [1, 1, 1]),
        ],
        Vec::new(),
    )
    .await;

    let archive = ArchivePackager::default().package_result(&result).unwrap();

    assert_eq!(entry_names(&archive), vec!["cat_no_bg.png", "cat_no_bg_1.png"]);
    assert_eq!(read_entry(&archive, "cat_no_bg.png").dimensions(), (2, 2));
    assert_eq!(read_entry(&archive, "cat_no_bg_1.png").dimensions(), (3, 3));
}

#[tokio::test]
async fn test_tiff_archive_written_to_disk() {
    let temp_dir = TempDir::new().unwrap();
    let result = run_batch(vec![gradient_upload("scan.png", 8, 8)], Vec::new()).await;

    let packager = ArchivePackager::new(ArchiveConfig {
        format: LosslessFormat::Tiff,
        compression_level: Some(9),
        ..ArchiveConfig::default()
    });
    let archive = packager.package_result(&result).unwrap();
    let path = temp_dir.path().join("nested").join("out.zip");
    ImageIOService::write_bytes(&archive, &path).unwrap();

    let on_disk = std::fs::read(&path).unwrap();
    assert_eq!(entry_names(&on_disk), vec!["scan_no_bg.tiff"]);
    assert_eq!(read_entry(&on_disk, "scan_no_bg.tiff").dimensions(), (8, 8));
}
