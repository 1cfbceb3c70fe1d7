// Image-space transformations between user uploads and fixed-stride models

pub mod geometry;
pub mod region_extractor;
pub mod tensor_codec;

pub use geometry::{normalize, pad_to_stride, PaddedPair, DEFAULT_PAD_STRIDE};
pub use region_extractor::{clamp_selection, extract, ClampedRect, RegionCrop};
pub use tensor_codec::{decode, encode_image, encode_mask};
