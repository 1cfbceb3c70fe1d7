// Tensor codec: HWC u8 pixels <-> NCHW f32 tensors in [0, 1]

use ndarray::{Array4, ArrayView4};

use crate::core::errors::{ImagingError, ImagingResult};
use crate::core::types::{ChannelOrder, ColorImage, Mask};

/// Encode a color image as `[1, 3, H, W]`, channels kept in the image's order.
pub fn encode_image(image: &ColorImage) -> Array4<f32> {
    let (width, height) = image.dimensions();
    let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

    for (x, y, pixel) in image.pixels().enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        tensor[[0, 0, y, x]] = pixel[0] as f32 / 255.0;
        tensor[[0, 1, y, x]] = pixel[1] as f32 / 255.0;
        tensor[[0, 2, y, x]] = pixel[2] as f32 / 255.0;
    }

    tensor
}

/// Encode a mask as `[1, 1, H, W]` with every value exactly 0.0 or 1.0
pub fn encode_mask(mask: &Mask) -> Array4<f32> {
    let (width, height) = mask.dimensions();
    let mut tensor = Array4::<f32>::zeros((1, 1, height as usize, width as usize));

    for (x, y, pixel) in mask.as_gray().enumerate_pixels() {
        if pixel[0] > 0 {
            tensor[[0, 0, y as usize, x as usize]] = 1.0;
        }
    }

    tensor
}

fn to_u8(value: f32) -> u8 {
    (value * 255.0).clamp(0.0, 255.0).round() as u8
}

/// Decode a `[1, 3, H, W]` model output back to pixels and crop away the
/// stride padding: only `[0..original_height, 0..original_width]` survives.
pub fn decode(
    tensor: ArrayView4<'_, f32>,
    original_height: u32,
    original_width: u32,
    order: ChannelOrder,
) -> ImagingResult<ColorImage> {
    let shape = tensor.shape().to_vec();
    if shape[0] != 1 || shape[1] != 3 {
        return Err(ImagingError::TensorShape {
            actual: shape,
            expected: "[1, 3, H, W]".to_string(),
        });
    }

    if (shape[2] as u64) < original_height as u64 || (shape[3] as u64) < original_width as u64 {
        return Err(ImagingError::CropOutOfBounds {
            shape,
            height: original_height,
            width: original_width,
        });
    }

    let pixels = image::RgbImage::from_fn(original_width, original_height, |x, y| {
        let (x, y) = (x as usize, y as usize);
        image::Rgb([
            to_u8(tensor[[0, 0, y, x]]),
            to_u8(tensor[[0, 1, y, x]]),
            to_u8(tensor[[0, 2, y, x]]),
        ])
    });

    Ok(ColorImage::new(pixels, order))
}

/// Rebuild an owned `[N, C, H, W]` tensor from a flat model output
pub fn tensor_from_raw(shape: &[usize], data: Vec<f32>) -> ImagingResult<Array4<f32>> {
    let dims: [usize; 4] = shape.try_into().map_err(|_| ImagingError::TensorShape {
        actual: shape.to_vec(),
        expected: "4 dimensions".to_string(),
    })?;
    Array4::from_shape_vec(dims, data).map_err(|_| ImagingError::TensorShape {
        actual: shape.to_vec(),
        expected: "data length matching the shape".to_string(),
    })
}
