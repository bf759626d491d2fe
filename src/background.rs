//! Background set with cyclic assignment

use crate::{
    error::ItemFailure,
    services::ImageValidator,
    types::{ImageAsset, UploadItem},
};

/// Ordered, possibly empty list of backgrounds
///
/// Each background is validated once when the set is built, with the same
/// ceiling and color normalization as foregrounds. Item `i` is assigned
/// background `i mod len`.
#[derive(Debug, Clone, Default)]
pub struct BackgroundSet {
    entries: Vec<BackgroundEntry>,
}

/// One background with its validation outcome
#[derive(Debug, Clone)]
pub struct BackgroundEntry {
    pub filename: String,
    pub image: Result<ImageAsset, ItemFailure>,
}

impl BackgroundSet {
    /// An empty set; no compositing happens
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Validate background uploads in order
    #[must_use]
    pub fn from_uploads(uploads: Vec<UploadItem>, validator: &ImageValidator) -> Self {
        let entries = uploads
            .into_iter()
            .map(|upload| {
                let image = validator.validate(&upload);
                if let Err(reason) = &image {
                    log::warn!("Background '{}' is unusable: {reason}", upload.filename);
                }
                BackgroundEntry {
                    filename: upload.filename,
                    image,
                }
            })
            .collect();
        Self { entries }
    }

    /// Wrap already decoded backgrounds
    #[must_use]
    pub fn from_assets<I, S>(assets: I) -> Self
    where
        I: IntoIterator<Item = (S, ImageAsset)>,
        S: Into<String>,
    {
        let entries = assets
            .into_iter()
            .map(|(filename, asset)| BackgroundEntry {
                filename: filename.into(),
                image: Ok(asset.into_rgb()),
            })
            .collect();
        Self { entries }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of backgrounds that passed validation
    #[must_use]
    pub fn usable_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.image.is_ok()).count()
    }

    /// Background index assigned to item `item_index`, `None` for an empty set
    #[must_use]
    pub fn index_for(&self, item_index: usize) -> Option<usize> {
        if self.entries.is_empty() {
            None
        } else {
            Some(item_index % self.entries.len())
        }
    }

    /// Background assigned to item `item_index` with its index
    #[must_use]
    pub fn select(&self, item_index: usize) -> Option<(usize, &BackgroundEntry)> {
        let index = self.index_for(item_index)?;
        self.entries.get(index).map(|entry| (index, entry))
    }

    pub fn iter(&self) -> impl Iterator<Item = &BackgroundEntry> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LosslessFormat;
    use image::{Rgba, RgbaImage};

    fn png(name: &str) -> UploadItem {
        let asset = ImageAsset::from_rgba(RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 4])));
        UploadItem::new(name, asset.encode(LosslessFormat::Png).unwrap())
    }

    #[test]
    fn test_cyclic_assignment() {
        let set = BackgroundSet::from_uploads(
            vec![png("x.png"), png("y.png"), png("z.png")],
            &ImageValidator::default(),
        );
        let indices: Vec<usize> = (0..5).filter_map(|i| set.index_for(i)).collect();
        assert_eq!(indices, vec![0, 1, 2, 0, 1]);

        let (index, entry) = set.select(4).unwrap();
        assert_eq!(index, 1);
        assert_eq!(entry.filename, "y.png");
    }

    #[test]
    fn test_empty_set_selects_nothing() {
        let set = BackgroundSet::empty();
        assert!(set.is_empty());
        assert!(set.select(0).is_none());
        assert!(set.index_for(7).is_none());
    }

    #[test]
    fn test_invalid_backgrounds_keep_their_slot() {
        let set = BackgroundSet::from_uploads(
            vec![png("ok.png"), UploadItem::new("bad.png", vec![0, 1])],
            &ImageValidator::default(),
        );
        assert_eq!(set.len(), 2);
        assert_eq!(set.usable_count(), 1);

        let (index, entry) = set.select(3).unwrap();
        assert_eq!(index, 1);
        assert!(matches!(entry.image, Err(ItemFailure::Undecodable(_))));
    }

    #[test]
    fn test_backgrounds_are_normalized_to_rgb() {
        let set = BackgroundSet::from_uploads(vec![png("a.png")], &ImageValidator::default());
        let (_, entry) = set.select(0).unwrap();
        assert!(!entry.image.as_ref().unwrap().has_alpha());

        let from_assets = BackgroundSet::from_assets([(
            "b",
            ImageAsset::from_rgba(RgbaImage::new(1, 1)),
        )]);
        assert!(!from_assets.select(0).unwrap().1.image.as_ref().unwrap().has_alpha());
    }
}
