pub mod image_ops;
pub mod metrics;

pub use image_ops::{
    decode_rgb_upload_async, decode_upload, decode_upload_async, encode_png,
    encode_png_base64_async,
};
pub use metrics::Metrics;
