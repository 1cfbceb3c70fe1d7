// Region extraction: clamp user selections to the image and crop them
//
// Each selection is handled on its own. A selection that collapses to an
// empty rectangle yields an `ExtractionError` for that id only; the output
// always has one entry per input, in input order.

use image::{DynamicImage, GenericImageView};
use tracing::{debug, warn};

use crate::core::errors::ExtractionError;
use crate::core::types::Selection;
use crate::orchestration::batch::{run_batch, Isolate};

/// Selection rectangle after clamping to the image bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClampedRect {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl ClampedRect {
    pub fn width(&self) -> u32 {
        self.right - self.left
    }

    pub fn height(&self) -> u32 {
        self.bottom - self.top
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}

/// Cropped region correlated with the selection it came from
#[derive(Debug, Clone)]
pub struct RegionCrop {
    pub id: String,
    pub rect: ClampedRect,
    pub crop: Result<DynamicImage, ExtractionError>,
}

/// Pixel coordinate from a user number: fractional parts are truncated,
/// negative and NaN inputs become 0, huge values saturate.
fn to_pixel(value: f64) -> u64 {
    if value.is_nan() || value <= 0.0 {
        0
    } else {
        value.trunc().min(u32::MAX as f64) as u64
    }
}

/// Clamp one selection into `[0, image_width] x [0, image_height]`.
///
/// `left`/`top` are clamped into `[0, dim - 1]` first, then the far edges are
/// clamped into `[left, image_width]` / `[top, image_height]`.
pub fn clamp_selection(selection: &Selection, image_width: u32, image_height: u32) -> ClampedRect {
    let max_left = u64::from(image_width.saturating_sub(1));
    let max_top = u64::from(image_height.saturating_sub(1));

    let left = to_pixel(selection.left).min(max_left);
    let top = to_pixel(selection.top).min(max_top);

    let right = (left + to_pixel(selection.width)).clamp(left, u64::from(image_width).max(left));
    let bottom = (top + to_pixel(selection.height)).clamp(top, u64::from(image_height).max(top));

    ClampedRect {
        left: left as u32,
        top: top as u32,
        right: right as u32,
        bottom: bottom as u32,
    }
}

/// Crop every selection out of `image`, isolating failures per selection
pub fn extract(image: &DynamicImage, selections: &[Selection]) -> Vec<RegionCrop> {
    let (image_width, image_height) = image.dimensions();

    let rects: Vec<ClampedRect> = selections
        .iter()
        .map(|selection| clamp_selection(selection, image_width, image_height))
        .collect();

    let crops = run_batch::<Isolate, _, _, _, _>(selections.iter().zip(&rects), |(selection, rect)| {
        if rect.is_empty() {
            warn!(
                "Skipping invalid selection {} with clamped size {}x{}",
                selection.id,
                rect.width(),
                rect.height()
            );
            return Err(ExtractionError::InvalidSelectionSize);
        }

        debug!(
            "Cropping selection {}: left={}, top={}, width={}, height={}",
            selection.id,
            rect.left,
            rect.top,
            rect.width(),
            rect.height()
        );
        Ok(image.crop_imm(rect.left, rect.top, rect.width(), rect.height()))
    });

    selections
        .iter()
        .zip(rects)
        .zip(crops)
        .map(|((selection, rect), crop)| RegionCrop {
            id: selection.id.clone(),
            rect,
            crop,
        })
        .collect()
}
