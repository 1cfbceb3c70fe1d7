// OCR Service Module - Local CJK OCR for Japanese text recognition
// ONNX CRNN model with CTC greedy decoding

use anyhow::{Context, Result};
use image::{DynamicImage, GenericImageView};
use ndarray::Array4;
use ort::{session::Session, value::Value};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// OCR model input dimensions
const TARGET_HEIGHT: u32 = 60;
const MIN_WIDTH: u32 = 10;

/// Crops smaller than this on either side are not worth recognizing
const MIN_CROP_SIDE: u32 = 10;
/// Mean luminance above this means the crop is (almost) blank paper
const BLANK_LUMINANCE: f64 = 240.0;

/// Recognizes the text of one cropped region.
///
/// `Ok(None)` means no text was found; the caller decides how to report it.
pub trait OcrModel: Send + Sync {
    fn recognize(&self, crop: &DynamicImage) -> Result<Option<String>>;
}

/// Cheap rejection before inference: tiny crops and near-white crops hold no text
pub fn is_recognizable(crop: &DynamicImage) -> bool {
    let (w, h) = crop.dimensions();
    if w < MIN_CROP_SIDE || h < MIN_CROP_SIDE {
        debug!("Crop {}x{} too small for OCR", w, h);
        return false;
    }

    let gray = crop.to_luma8();
    let total: u64 = gray.pixels().map(|p| u64::from(p[0])).sum();
    let mean = total as f64 / (u64::from(w) * u64::from(h)) as f64;
    if mean > BLANK_LUMINANCE {
        debug!("Crop mean luminance {:.1} looks blank, skipping OCR", mean);
        return false;
    }

    true
}

/// OCR Service for local Japanese text recognition
pub struct OcrService {
    session: Mutex<Session>,
    backend: String,
    vocab: HashMap<usize, String>,
    blank_index: usize,
}

impl OcrService {
    /// Load `ocr/ocr.onnx` and `ocr/cjk_vocab.txt` from `models_dir`
    pub fn new(models_dir: &Path, forced_backend: Option<&str>) -> Result<Self> {
        let model_path = models_dir.join("ocr").join("ocr.onnx");
        let vocab_path = models_dir.join("ocr").join("cjk_vocab.txt");

        if !vocab_path.exists() {
            anyhow::bail!(
                "OCR vocabulary not found at: {}. Local OCR feature is unavailable.",
                vocab_path.display()
            );
        }

        let (backend, session) = crate::services::onnx_builder::build_session(
            &model_path,
            "OCR",
            forced_backend,
        )?;

        let content =
            std::fs::read_to_string(&vocab_path).context("Failed to read vocabulary file")?;
        let vocab = parse_vocabulary(&content);
        let blank_index = vocab.len().saturating_sub(1);

        info!(
            "OCR service initialized on {}: vocab_size={}, blank_index={}",
            backend,
            vocab.len(),
            blank_index
        );

        Ok(Self {
            session: Mutex::new(session),
            backend,
            vocab,
            blank_index,
        })
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    /// Preprocess image region for OCR
    /// - Resize to target height (60px) maintaining aspect ratio
    /// - Normalize RGB to [0, 1] float32 in [1, 3, H, W] format
    fn preprocess_image(&self, image: &DynamicImage) -> (Array4<f32>, i32) {
        let (w, h) = image.dimensions();

        let scale = TARGET_HEIGHT as f32 / h as f32;
        let new_w = ((w as f32 * scale) as u32).max(MIN_WIDTH);

        let rgb = image
            .resize_exact(new_w, TARGET_HEIGHT, image::imageops::FilterType::Lanczos3)
            .to_rgb8();

        let mut tensor = Array4::<f32>::zeros((1, 3, TARGET_HEIGHT as usize, new_w as usize));
        for (x, y, pixel) in rgb.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            tensor[[0, 0, y, x]] = pixel[0] as f32 / 255.0;
            tensor[[0, 1, y, x]] = pixel[1] as f32 / 255.0;
            tensor[[0, 2, y, x]] = pixel[2] as f32 / 255.0;
        }

        // seq_length = width / 4 (LSTM stride)
        let seq_length = (new_w / 4) as i32;

        (tensor, seq_length)
    }

    /// CTC greedy decode: collapse repeats, drop blanks
    fn ctc_decode(&self, logits: &[f32], seq_len: usize, vocab_size: usize) -> (String, f32) {
        let mut text = String::new();
        let mut confidences = Vec::new();
        let mut prev_idx: Option<usize> = None;

        for step in logits.chunks_exact(vocab_size).take(seq_len) {
            let (best_idx, best_val) = step
                .iter()
                .copied()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |best, (i, v)| if v > best.1 { (i, v) } else { best });

            if best_idx != self.blank_index && Some(best_idx) != prev_idx {
                text.push_str(self.vocab.get(&best_idx).map(String::as_str).unwrap_or("?"));
                // log prob -> confidence
                confidences.push(best_val.exp().min(1.0));
            }

            prev_idx = Some(best_idx);
        }

        let avg_confidence = if confidences.is_empty() {
            0.0
        } else {
            confidences.iter().sum::<f32>() / confidences.len() as f32
        };

        (text, avg_confidence)
    }

    /// Run OCR on a single image region.
    /// Returns (recognized_text, confidence)
    pub fn recognize_with_confidence(&self, image: &DynamicImage) -> Result<(String, f32)> {
        let (tensor, seq_length) = self.preprocess_image(image);

        let shape_arr: [usize; 4] = tensor
            .shape()
            .try_into()
            .context("OCR input tensor must have 4 dimensions")?;
        let (data_flat, _offset) = tensor.into_raw_vec_and_offset();

        let data_value = Value::from_array((shape_arr, data_flat))?;
        let seq_lengths_value = Value::from_array(([1usize], vec![seq_length]))?;

        // Extract data while the session is held, then release
        let (dims, logits) = {
            let mut session = self.session.lock();
            let outputs = session.run(ort::inputs![
                "data" => data_value,
                "seq_lengths" => seq_lengths_value
            ])?;

            let (shape, logits_data) = if let Some(output) = outputs.get("output") {
                output.try_extract_tensor::<f32>()?
            } else {
                let first_key = outputs.keys().next().context("No outputs from OCR model")?;
                outputs[first_key].try_extract_tensor::<f32>()?
            };

            let dims: Vec<usize> = shape.iter().map(|&x| x as usize).collect();
            (dims, logits_data.to_vec())
        };

        let (seq_len, vocab_size) = match dims.as_slice() {
            [s, 1, v] => (*s, *v), // [S, 1, V]
            [1, s, v] => (*s, *v), // [1, S, V]
            [s, v] => (*s, *v),
            _ => anyhow::bail!("Unexpected logits shape: {:?}", dims),
        };
        if vocab_size == 0 {
            anyhow::bail!("OCR model produced an empty vocabulary axis");
        }

        let (text, confidence) = self.ctc_decode(&logits, seq_len, vocab_size);

        debug!("OCR result: '{}' (confidence: {:.2})", text, confidence);
        Ok((text, confidence))
    }
}

impl OcrModel for OcrService {
    fn recognize(&self, crop: &DynamicImage) -> Result<Option<String>> {
        if !is_recognizable(crop) {
            return Ok(None);
        }

        let (text, _confidence) = self.recognize_with_confidence(crop)?;
        let text = text.trim();
        Ok((!text.is_empty()).then(|| text.to_string()))
    }
}

/// Parse a vocabulary file (format: `index\tchar`) on top of the default
/// printable ASCII mapping.
fn parse_vocabulary(content: &str) -> HashMap<usize, String> {
    let mut vocab: HashMap<usize, String> = (32..127usize)
        .map(|i| (i, (i as u8 as char).to_string()))
        .collect();
    vocab.insert(0, " ".to_string());

    for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let Some((idx_str, char_str)) = line.split_once('\t') else {
            continue;
        };
        let Ok(idx) = idx_str.parse::<usize>() else {
            continue;
        };

        match char_str {
            "<blank>" => continue,
            "<space>" => vocab.insert(idx, " ".to_string()),
            other => vocab.insert(idx, other.to_string()),
        };
    }

    debug!("Loaded {} vocabulary entries", vocab.len());
    vocab
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn test_vocab_parsing() {
        let vocab = parse_vocabulary("0\t<space>\n33\t!\n97\ta\n12345\t漢\n99\t<blank>\nbogus\n");
        assert_eq!(vocab.get(&0).map(String::as_str), Some(" "));
        assert_eq!(vocab.get(&12345).map(String::as_str), Some("漢"));
        // Default ASCII mapping is kept for <blank> lines
        assert_eq!(vocab.get(&99).map(String::as_str), Some("c"));
    }

    #[test]
    fn test_tiny_crop_is_not_recognizable() {
        let crop = DynamicImage::ImageLuma8(GrayImage::new(9, 40));
        assert!(!is_recognizable(&crop));
    }

    #[test]
    fn test_blank_crop_is_not_recognizable() {
        let white = DynamicImage::ImageLuma8(GrayImage::from_pixel(20, 20, Luma([250])));
        assert!(!is_recognizable(&white));

        let mut inked = GrayImage::from_pixel(20, 20, Luma([250]));
        for x in 0..20 {
            for y in 5..15 {
                inked.put_pixel(x, y, Luma([0]));
            }
        }
        assert!(is_recognizable(&DynamicImage::ImageLuma8(inked)));
    }
}
