//! Zip packaging of processed images for bulk download

use crate::{
    config::ArchiveConfig,
    error::{BgBatchError, Result},
    services::ImageCodec,
    types::{BatchResult, ImageAsset},
};
use std::io::{Cursor, Write};
use tracing::instrument;
use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

/// Suffix of composited entries when they are included
pub const COMPOSITE_SUFFIX: &str = "_composited";

/// Stem used when a filename has none
const FALLBACK_STEM: &str = "image";

/// Derive `<stem><suffix>.<ext>` from a user-supplied filename
///
/// Directory components (`/` and `\`) and the final extension are dropped so
/// entries never escape the archive root.
///
/// ```rust
/// use bgremove_batch::archive::derive_entry_name;
///
/// assert_eq!(derive_entry_name("a.jpg", "_no_bg", "png"), "a_no_bg.png");
/// assert_eq!(derive_entry_name("../../etc/passwd", "_no_bg", "png"), "passwd_no_bg.png");
/// ```
#[must_use]
pub fn derive_entry_name(filename: &str, suffix: &str, extension: &str) -> String {
    let base = filename
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(filename)
        .trim();
    let stem = match base.rfind('.') {
        Some(pos) if pos > 0 => &base[..pos],
        _ => base,
    };
    let stem = if stem.is_empty() || stem.chars().all(|c| c == '.') {
        FALLBACK_STEM
    } else {
        stem
    };
    format!("{stem}{suffix}.{extension}")
}

/// First of `name`, `<stem>_1.<ext>`, `<stem>_2.<ext>`, ... that `is_taken` rejects
///
/// ```rust
/// use bgremove_batch::archive::disambiguate_name;
///
/// let taken = ["cat_no_bg.png", "cat_no_bg_1.png"];
/// let name = disambiguate_name("cat_no_bg.png", "png", |c| taken.contains(&c));
/// assert_eq!(name, "cat_no_bg_2.png");
/// ```
#[must_use]
pub fn disambiguate_name(name: &str, extension: &str, is_taken: impl Fn(&str) -> bool) -> String {
    if !is_taken(name) {
        return name.to_string();
    }
    let stem = name
        .strip_suffix(extension)
        .and_then(|s| s.strip_suffix('.'))
        .unwrap_or(name);
    (1..)
        .map(|n| format!("{stem}_{n}.{extension}"))
        .find(|candidate| !is_taken(candidate))
        .unwrap_or_else(|| format!("{stem}_dup.{extension}"))
}

/// Writes processed images into a single zip archive
#[derive(Debug, Clone, Default)]
pub struct ArchivePackager {
    config: ArchiveConfig,
}

impl ArchivePackager {
    #[must_use]
    pub fn new(config: ArchiveConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    /// Package `(image, original filename)` pairs
    ///
    /// Each entry is encoded in the configured lossless format and named
    /// `<stem><suffix>.<ext>`. Colliding names get `_1`, `_2`, ... appended
    /// when deduplication is on; otherwise the later entry replaces the
    /// earlier one.
    ///
    /// # Errors
    /// [`BgBatchError::Archive`] when an entry cannot be encoded or written
    pub fn package(&self, entries: &[(&ImageAsset, &str)]) -> Result<Vec<u8>> {
        self.package_with_composites(entries, &[])
    }

    /// Package a batch: every processed foreground, plus composites when enabled
    ///
    /// # Errors
    /// [`BgBatchError::Archive`] when an entry cannot be encoded or written
    pub fn package_result(&self, result: &BatchResult) -> Result<Vec<u8>> {
        let composites = if self.config.include_composites {
            result.composite_entries()
        } else {
            Vec::new()
        };
        self.package_with_composites(&result.archive_entries(), &composites)
    }

    #[instrument(skip_all, fields(entries = foregrounds.len(), composites = composites.len()))]
    fn package_with_composites(
        &self,
        foregrounds: &[(&ImageAsset, &str)],
        composites: &[(&ImageAsset, &str)],
    ) -> Result<Vec<u8>> {
        let extension = self.config.format.extension();
        let named = foregrounds
            .iter()
            .map(|(image, filename)| {
                (*image, derive_entry_name(filename, &self.config.suffix, extension))
            })
            .chain(composites.iter().map(|(image, filename)| {
                (*image, derive_entry_name(filename, COMPOSITE_SUFFIX, extension))
            }));

        let mut files: Vec<(String, Vec<u8>)> = Vec::new();
        for (image, name) in named {
            let bytes = ImageCodec::encode(image, self.config.format)
                .map_err(|e| BgBatchError::archive(format!("could not encode {name}: {e}")))?;

            match files.iter().position(|(existing, _)| *existing == name) {
                Some(pos) if !self.config.deduplicate_names => {
                    log::debug!("Entry {name} replaced by a later item with the same name");
                    files[pos].1 = bytes;
                },
                Some(_) => {
                    let unique = disambiguate_name(&name, extension, |candidate| {
                        files.iter().any(|(existing, _)| existing == candidate)
                    });
                    log::debug!("Entry {name} already present, storing as {unique}");
                    files.push((unique, bytes));
                },
                None => files.push((name, bytes)),
            }
        }

        let archive = self.write_zip(&files)?;
        log::info!("📦 Packaged {} entries into a {} byte archive", files.len(), archive.len());
        Ok(archive)
    }

    fn write_zip(&self, files: &[(String, Vec<u8>)]) -> Result<Vec<u8>> {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(self.config.compression_level);

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, bytes) in files {
            writer
                .start_file(name.as_str(), options)
                .map_err(|e| BgBatchError::archive(format!("could not start entry {name}: {e}")))?;
            writer
                .write_all(bytes)
                .map_err(|e| BgBatchError::archive(format!("could not write entry {name}: {e}")))?;
        }

        let cursor = writer
            .finish()
            .map_err(|e| BgBatchError::archive(format!("could not finalize archive: {e}")))?;
        Ok(cursor.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use std::io::Read;

    fn asset(alpha: u8) -> ImageAsset {
        ImageAsset::from_rgba(RgbaImage::from_pixel(3, 2, Rgba([10, 20, 30, alpha])))
    }

    fn entry_names(archive: &[u8]) -> Vec<String> {
        let zip = zip::ZipArchive::new(Cursor::new(archive)).unwrap();
        zip.file_names().map(str::to_string).collect::<Vec<_>>()
    }

    fn read_entry(archive: &[u8], name: &str) -> ImageAsset {
        let mut zip = zip::ZipArchive::new(Cursor::new(archive)).unwrap();
        let mut bytes = Vec::new();
        zip.by_name(name).unwrap().read_to_end(&mut bytes).unwrap();
        ImageCodec::decode(&bytes).unwrap()
    }

    #[test]
    fn test_derive_entry_name() {
        assert_eq!(derive_entry_name("b.png", "_no_bg", "png"), "b_no_bg.png");
        assert_eq!(derive_entry_name("photo.final.JPG", "_no_bg", "png"), "photo.final_no_bg.png");
        assert_eq!(derive_entry_name("C:\\Users\\me\\cat.jpeg", "_no_bg", "png"), "cat_no_bg.png");
        assert_eq!(derive_entry_name("noext", "_x", "tiff"), "noext_x.tiff");
        assert_eq!(derive_entry_name("", "_no_bg", "png"), "image_no_bg.png");
        assert_eq!(derive_entry_name("dir/", "_no_bg", "png"), "image_no_bg.png");
        assert_eq!(derive_entry_name("..", "_no_bg", "png"), "image_no_bg.png");
        assert_eq!(derive_entry_name(".hidden", "_no_bg", "png"), ".hidden_no_bg.png");
    }

    #[test]
    fn test_package_contains_exact_entries() {
        let (a, b) = (asset(255), asset(0));
        let archive = ArchivePackager::default()
            .package(&[(&a, "a.jpg"), (&b, "b.png")])
            .unwrap();

        let mut names = entry_names(&archive);
        names.sort();
        assert_eq!(names, vec!["a_no_bg.png", "b_no_bg.png"]);
        assert_eq!(read_entry(&archive, "b_no_bg.png"), b);
    }

    #[test]
    fn test_duplicate_names_are_disambiguated() {
        let (first, second, third) = (asset(1), asset(2), asset(3));
        let archive = ArchivePackager::default()
            .package(&[(&first, "x.jpg"), (&second, "dir/x.png"), (&third, "x.jpeg")])
            .unwrap();

        let mut names = entry_names(&archive);
        names.sort();
        assert_eq!(names, vec!["x_no_bg.png", "x_no_bg_1.png", "x_no_bg_2.png"]);
        assert_eq!(read_entry(&archive, "x_no_bg.png"), first);
        assert_eq!(read_entry(&archive, "x_no_bg_2.png"), third);
    }

    #[test]
    fn test_last_write_wins_without_dedup() {
        let packager = ArchivePackager::new(ArchiveConfig {
            deduplicate_names: false,
            ..ArchiveConfig::default()
        });
        let (first, second) = (asset(1), asset(2));
        let archive = packager
            .package(&[(&first, "x.jpg"), (&second, "x.png")])
            .unwrap();

        assert_eq!(entry_names(&archive), vec!["x_no_bg.png"]);
        assert_eq!(read_entry(&archive, "x_no_bg.png"), second);
    }

    #[test]
    fn test_custom_suffix_format_and_level() {
        let packager = ArchivePackager::new(ArchiveConfig {
            suffix: "_cut".to_string(),
            format: crate::config::LosslessFormat::Tiff,
            compression_level: Some(9),
            ..ArchiveConfig::default()
        });
        let image = asset(128);
        let archive = packager.package(&[(&image, "p.jpg")]).unwrap();
        assert_eq!(entry_names(&archive), vec!["p_cut.tiff"]);
        assert_eq!(read_entry(&archive, "p_cut.tiff"), image);
    }

    #[test]
    fn test_empty_archive_is_valid() {
        let archive = ArchivePackager::default().package(&[]).unwrap();
        assert!(entry_names(&archive).is_empty());
    }
}
