// Data model shared by the inpainting, OCR and translation pipelines

use axum::http::StatusCode;
use image::{DynamicImage, GrayImage, Luma, RgbImage};
use serde::{Deserialize, Serialize};

use crate::core::errors::{InpaintError, ValidationError};

/// Order of the three color channels inside a pixel.
///
/// Models are trained on one order or the other, so the tag travels with the
/// pixels instead of living in a convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelOrder {
    Rgb,
    Bgr,
}

impl ChannelOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelOrder::Rgb => "RGB",
            ChannelOrder::Bgr => "BGR",
        }
    }
}

/// Three-channel 8-bit image tagged with its channel order
#[derive(Debug, Clone, PartialEq)]
pub struct ColorImage {
    pixels: RgbImage,
    order: ChannelOrder,
}

impl ColorImage {
    pub fn new(pixels: RgbImage, order: ChannelOrder) -> Self {
        Self { pixels, order }
    }

    /// Canonical conversion for decoded uploads: alpha is dropped, grayscale
    /// is expanded, the result is RGB.
    pub fn from_dynamic(img: &DynamicImage) -> Self {
        Self::new(img.to_rgb8(), ChannelOrder::Rgb)
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn order(&self) -> ChannelOrder {
        self.order
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    pub fn into_pixels(self) -> RgbImage {
        self.pixels
    }

    /// Return a copy whose channels are laid out in `order`.
    pub fn to_order(&self, order: ChannelOrder) -> ColorImage {
        if order == self.order {
            return self.clone();
        }
        let mut swapped = self.pixels.clone();
        for pixel in swapped.pixels_mut() {
            pixel.0.swap(0, 2);
        }
        ColorImage::new(swapped, order)
    }

    /// Pixels in RGB order, ready for encoding to a file format
    pub fn into_rgb(self) -> RgbImage {
        match self.order {
            ChannelOrder::Rgb => self.pixels,
            ChannelOrder::Bgr => self.to_order(ChannelOrder::Rgb).pixels,
        }
    }
}

/// Binary inpainting mask: 0 keeps a pixel, 255 marks it for inpainting.
///
/// The only constructors threshold their input, so every pixel of a `Mask`
/// is exactly 0 or 255.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask(GrayImage);

impl Mask {
    /// Values strictly above this become 255
    pub const THRESHOLD: u8 = 127;

    /// Normalize an uploaded mask of any color type.
    ///
    /// Color masks are averaged across R, G and B (alpha ignored) before
    /// thresholding; grayscale masks are thresholded directly.
    pub fn from_dynamic(img: &DynamicImage) -> Self {
        let gray = match img {
            DynamicImage::ImageLuma8(gray) => gray.clone(),
            other if !other.color().has_color() => other.to_luma8(),
            other => {
                let rgb = other.to_rgb8();
                GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
                    let [r, g, b] = rgb.get_pixel(x, y).0;
                    let mean = (u16::from(r) + u16::from(g) + u16::from(b)) / 3;
                    Luma([mean as u8])
                })
            }
        };
        Self::from_gray(&gray)
    }

    pub fn from_gray(gray: &GrayImage) -> Self {
        let mut binary = gray.clone();
        for pixel in binary.pixels_mut() {
            pixel.0[0] = if pixel.0[0] > Self::THRESHOLD { 255 } else { 0 };
        }
        Self(binary)
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.0.dimensions()
    }

    pub fn as_gray(&self) -> &GrayImage {
        &self.0
    }

    /// Number of pixels marked for inpainting
    pub fn coverage(&self) -> usize {
        self.0.pixels().filter(|p| p.0[0] == 255).count()
    }
}

/// User-specified rectangular region of interest, in image pixels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Selection {
    /// Reject negative or non-finite geometry before any model work
    pub fn validate(&self) -> Result<(), ValidationError> {
        let fields = [
            ("left", self.left),
            ("top", self.top),
            ("width", self.width),
            ("height", self.height),
        ];
        for (field, value) in fields {
            if !value.is_finite() {
                return Err(ValidationError::NonFiniteField {
                    id: self.id.clone(),
                    field,
                });
            }
            if value < 0.0 {
                return Err(ValidationError::NegativeField {
                    id: self.id.clone(),
                    field,
                    value,
                });
            }
        }
        Ok(())
    }
}

/// Parse the `selections` form field: a JSON array of selections, each
/// validated before any image work happens.
pub fn parse_selections(raw: &str) -> Result<Vec<Selection>, ValidationError> {
    let selections: Vec<Selection> = serde_json::from_str(raw)?;
    for selection in &selections {
        selection.validate()?;
    }
    Ok(selections)
}

/// Clients sometimes send numeric ids; they are kept as opaque strings.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "selection id must be a string or number, got {}",
            other
        ))),
    }
}

/// OCR result for one selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrItem {
    pub id: String,
    pub text: String,
}

/// Text to translate, correlated by `id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationItem {
    pub id: String,
    pub text: String,
}

/// Translation of one `TranslationItem`, correlated by `id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslatedItem {
    pub id: String,
    pub original: String,
    pub translated: String,
}

/// Response body of `POST /inpaint`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InpaintResponse {
    pub success: bool,
    pub message: String,
    pub image: Option<String>,
    pub format: Option<String>,
}

impl InpaintResponse {
    pub fn completed(image_base64: String, format: &str) -> Self {
        Self {
            success: true,
            message: "Inpainting completed successfully".to_string(),
            image: Some(image_base64),
            format: Some(format.to_string()),
        }
    }

    pub fn failed(message: String) -> Self {
        Self {
            success: false,
            message,
            image: None,
            format: None,
        }
    }

    /// Failure body paired with the status its error class calls for:
    /// 503 for an unavailable model, 400 for unusable input, 500 otherwise.
    pub fn from_error(error: &InpaintError) -> (StatusCode, Self) {
        (error.status_code(), Self::failed(error.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, Rgba, RgbaImage};

    #[test]
    fn test_mask_from_rgb_averages_then_thresholds() {
        let mut rgb = RgbImage::new(3, 1);
        rgb.put_pixel(0, 0, Rgb([255, 255, 255]));
        rgb.put_pixel(1, 0, Rgb([255, 0, 0])); // mean 85
        rgb.put_pixel(2, 0, Rgb([200, 200, 0])); // mean 133
        let mask = Mask::from_dynamic(&DynamicImage::ImageRgb8(rgb));

        let values: Vec<u8> = mask.as_gray().pixels().map(|p| p.0[0]).collect();
        assert_eq!(values, vec![255, 0, 255]);
    }

    #[test]
    fn test_mask_ignores_alpha() {
        let rgba = RgbaImage::from_pixel(2, 2, Rgba([255, 255, 255, 0]));
        let mask = Mask::from_dynamic(&DynamicImage::ImageRgba8(rgba));
        assert_eq!(mask.coverage(), 4);
    }

    #[test]
    fn test_mask_normalization_is_idempotent() {
        let gray = GrayImage::from_fn(4, 4, |x, y| Luma([((x * 70 + y * 13) % 256) as u8]));
        let once = Mask::from_gray(&gray);
        let twice = Mask::from_gray(once.as_gray());
        assert_eq!(once, twice);
        assert!(once.as_gray().pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
    }

    #[test]
    fn test_channel_swap_round_trip() {
        let rgb = RgbImage::from_pixel(1, 1, Rgb([10, 20, 30]));
        let image = ColorImage::new(rgb, ChannelOrder::Rgb);

        let bgr = image.to_order(ChannelOrder::Bgr);
        assert_eq!(bgr.order(), ChannelOrder::Bgr);
        assert_eq!(bgr.pixels().get_pixel(0, 0).0, [30, 20, 10]);
        assert_eq!(bgr.into_rgb().get_pixel(0, 0).0, [10, 20, 30]);
    }

    #[test]
    fn test_selection_validation() {
        let mut selection = Selection {
            id: "a".to_string(),
            left: 0.0,
            top: 5.0,
            width: 10.0,
            height: 0.0,
        };
        assert!(selection.validate().is_ok());

        selection.left = -1.0;
        assert!(matches!(
            selection.validate(),
            Err(ValidationError::NegativeField { field: "left", .. })
        ));

        selection.left = f64::NAN;
        assert!(matches!(
            selection.validate(),
            Err(ValidationError::NonFiniteField { field: "left", .. })
        ));
    }

    #[test]
    fn test_parse_selections() {
        let parsed = parse_selections(
            r#"[{"id":"a","left":1,"top":2,"width":3.5,"height":4},{"id":7,"left":0,"top":0,"width":0,"height":0}]"#,
        )
        .unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].width, 3.5);
        assert_eq!(parsed[1].id, "7");

        assert!(matches!(
            parse_selections("not json"),
            Err(ValidationError::MalformedSelections(_))
        ));
        assert!(matches!(
            parse_selections(r#"[{"id":"a","left":0,"top":-3,"width":1,"height":1}]"#),
            Err(ValidationError::NegativeField { field: "top", .. })
        ));
        assert!(parse_selections(r#"[{"id":null,"left":0,"top":0,"width":1,"height":1}]"#).is_err());
    }
}
