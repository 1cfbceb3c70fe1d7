// Geometry normalization: align mask to image, pad both to a fixed stride

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Pixel};
use tracing::debug;

use crate::core::errors::{ImagingError, ImagingResult};
use crate::core::types::{ColorImage, Mask};

/// Stride required by the LaMa downsampling stack
pub const DEFAULT_PAD_STRIDE: u32 = 8;

/// Image and mask padded to a stride, plus the size needed for crop-back.
///
/// Lives for a single inference call.
#[derive(Debug, Clone)]
pub struct PaddedPair {
    pub image: ColorImage,
    pub mask: Mask,
    pub original_width: u32,
    pub original_height: u32,
}

impl PaddedPair {
    pub fn padded_dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// Rows/columns to append so that `dim` becomes a multiple of `stride`
pub fn pad_amount(dim: u32, stride: u32) -> u32 {
    (stride - dim % stride) % stride
}

/// Mirror an out-of-range index back into `0..len`, repeating the edge pixel
/// (`fedcba|abcdef|fedcba`). Periodic, so pads longer than the source work.
fn reflect_index(index: u32, len: u32) -> u32 {
    let period = 2 * len;
    let m = index % period;
    if m < len {
        m
    } else {
        period - 1 - m
    }
}

/// Pad the bottom and right edges by reflection up to the next multiple of
/// `stride`. Returns a new buffer; the source is untouched.
pub fn pad_to_stride<P>(
    src: &ImageBuffer<P, Vec<P::Subpixel>>,
    stride: u32,
) -> ImageBuffer<P, Vec<P::Subpixel>>
where
    P: Pixel,
{
    let (width, height) = src.dimensions();
    let padded_width = width + pad_amount(width, stride);
    let padded_height = height + pad_amount(height, stride);

    if padded_width == width && padded_height == height {
        return src.clone();
    }

    ImageBuffer::from_fn(padded_width, padded_height, |x, y| {
        *src.get_pixel(reflect_index(x, width), reflect_index(y, height))
    })
}

/// Bring `mask` to the resolution of `image`, then pad both to `stride`.
///
/// The mask is resized with nearest-neighbor sampling only, so it stays
/// binary. Neither input is modified.
pub fn normalize(image: &ColorImage, mask: &Mask, stride: u32) -> ImagingResult<PaddedPair> {
    if stride == 0 {
        return Err(ImagingError::InvalidStride(stride));
    }

    let (width, height) = image.dimensions();
    let mismatch = || ImagingError::DimensionMismatch {
        image_width: width,
        image_height: height,
        mask_width: mask.width(),
        mask_height: mask.height(),
    };

    if width == 0 || height == 0 || mask.width() == 0 || mask.height() == 0 {
        return Err(mismatch());
    }

    let aligned_mask = if mask.dimensions() != (width, height) {
        debug!(
            "Resizing mask from {}x{} to {}x{}",
            mask.width(),
            mask.height(),
            width,
            height
        );
        let resized = imageops::resize(mask.as_gray(), width, height, FilterType::Nearest);
        Mask::from_gray(&resized)
    } else {
        mask.clone()
    };

    if aligned_mask.dimensions() != (width, height) {
        return Err(mismatch());
    }

    let padded_image = ColorImage::new(pad_to_stride(image.pixels(), stride), image.order());
    let padded_mask = Mask::from_gray(&pad_to_stride(aligned_mask.as_gray(), stride));

    debug!(
        "Padded {}x{} -> {}x{} (stride {})",
        width,
        height,
        padded_image.width(),
        padded_image.height(),
        stride
    );

    Ok(PaddedPair {
        image: padded_image,
        mask: padded_mask,
        original_width: width,
        original_height: height,
    })
}
