//! Alpha compositing of background-removed foregrounds onto backgrounds

use crate::{config::ResizeFilter, error::ItemFailure, types::ImageAsset};
use image::{Rgb, RgbImage, Rgba, RgbaImage};
use tracing::instrument;

/// Blends a foreground with alpha onto a background of any mode
#[derive(Debug, Clone, Copy, Default)]
pub struct Compositor {
    filter: ResizeFilter,
}

impl Compositor {
    #[must_use]
    pub fn new(filter: ResizeFilter) -> Self {
        Self { filter }
    }

    #[must_use]
    pub fn filter(&self) -> ResizeFilter {
        self.filter
    }

    /// Composite `foreground` over `background`
    ///
    /// Both operands are coerced to RGBA. The background is resampled to the
    /// foreground's exact dimensions when they differ. The result is opaque RGB
    /// with the foreground's dimensions.
    ///
    /// # Errors
    /// [`ItemFailure::CompositeFailed`] when either operand has no pixels
    #[instrument(
        skip_all,
        fields(
            foreground = %format!("{}x{}", foreground.width(), foreground.height()),
            background = %format!("{}x{}", background.width(), background.height())
        )
    )]
    pub fn composite(
        &self,
        foreground: &ImageAsset,
        background: &ImageAsset,
    ) -> Result<ImageAsset, ItemFailure> {
        let (width, height) = foreground.dimensions();
        if width == 0 || height == 0 {
            return Err(ItemFailure::composite_failed(format!(
                "foreground has no pixels ({width}x{height})"
            )));
        }
        if background.width() == 0 || background.height() == 0 {
            return Err(ItemFailure::composite_failed(format!(
                "background has no pixels ({}x{})",
                background.width(),
                background.height()
            )));
        }

        let fg = foreground.to_rgba();
        let bg = if background.dimensions() == (width, height) {
            background.to_rgba()
        } else {
            log::debug!(
                "Resizing background {}x{} -> {width}x{height} ({:?})",
                background.width(),
                background.height(),
                self.filter
            );
            image::imageops::resize(&background.to_rgba(), width, height, self.filter.into())
        };

        Ok(ImageAsset::from_rgb(Self::blend_over(&fg, &bg)))
    }

    /// Straight-alpha "over" blend, flattened by dropping the result alpha
    ///
    /// With an opaque background this is `fg * a + bg * (1 - a)` per channel.
    fn blend_over(fg: &RgbaImage, bg: &RgbaImage) -> RgbImage {
        RgbImage::from_fn(fg.width(), fg.height(), |x, y| {
            let Rgba(f) = *fg.get_pixel(x, y);
            let Rgba(b) = *bg.get_pixel(x, y);
            Rgb(blend_pixel(f, b))
        })
    }
}

fn blend_pixel(fg: [u8; 4], bg: [u8; 4]) -> [u8; 3] {
    let fa = f32::from(fg[3]) / 255.0;
    let ba = f32::from(bg[3]) / 255.0;
    let out_a = fa + ba * (1.0 - fa);
    if out_a <= f32::EPSILON {
        return [0, 0, 0];
    }

    let mut out = [0u8; 3];
    for (channel, value) in out.iter_mut().enumerate() {
        let blended = (f32::from(fg[channel]) * fa + f32::from(bg[channel]) * ba * (1.0 - fa)) / out_a;
        *value = blended.round().clamp(0.0, 255.0) as u8;
    }
    out
}
