// Error types for the inpainting, OCR and translation pipelines
//
// Each enum maps onto one of three classes, surfaced through `status_code()`:
// - validation errors: rejected before any model work (400)
// - per-item errors: recovered inline by the batch orchestrators
// - systemic errors: the whole call fails (5xx)

use axum::http::StatusCode;
use thiserror::Error;

/// Geometry and tensor conversion errors
#[derive(Debug, Error)]
pub enum ImagingError {
    #[error("Mask dimensions {mask_width}x{mask_height} do not match image dimensions {image_width}x{image_height}")]
    DimensionMismatch {
        image_width: u32,
        image_height: u32,
        mask_width: u32,
        mask_height: u32,
    },

    #[error("Pad stride must be > 0, got {0}")]
    InvalidStride(u32),

    #[error("Unexpected tensor shape {actual:?} (expected {expected})")]
    TensorShape {
        actual: Vec<usize>,
        expected: String,
    },

    #[error("Tensor of shape {shape:?} cannot be cropped to {height}x{width}")]
    CropOutOfBounds {
        shape: Vec<usize>,
        height: u32,
        width: u32,
    },

    #[error("Image decoding failed: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Empty {0} upload")]
    EmptyUpload(&'static str),

    #[error("Image task aborted: {0}")]
    TaskJoinFailed(String),
}

impl ImagingError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ImagingError::DimensionMismatch { .. }
            | ImagingError::Decode(_)
            | ImagingError::EmptyUpload(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Request validation errors (client side, no model work performed)
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid selections JSON: {0}")]
    MalformedSelections(#[from] serde_json::Error),

    #[error("Selection '{id}': field '{field}' must be >= 0, got {value}")]
    NegativeField {
        id: String,
        field: &'static str,
        value: f64,
    },

    #[error("Selection '{id}': field '{field}' must be a finite number")]
    NonFiniteField { id: String, field: &'static str },

    #[error("Missing required form field '{0}'")]
    MissingField(&'static str),
}

/// Per-selection extraction failure; never aborts sibling selections
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("Invalid selection size")]
    InvalidSelectionSize,
}

/// Inpainting failure carrying the original cause; no partial image exists
#[derive(Debug, Error)]
pub enum InpaintError {
    #[error("Inpainting failed: {0}")]
    Imaging(#[from] ImagingError),

    #[error("Inpainting failed: {0:#}")]
    Model(#[source] anyhow::Error),

    #[error("Inpainting model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Inpainting task aborted: {0}")]
    TaskJoinFailed(String),
}

impl InpaintError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            InpaintError::Imaging(e) => e.status_code(),
            InpaintError::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Systemic OCR failures; per-item failures are encoded inline instead
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("OCR task aborted: {0}")]
    TaskJoinFailed(String),
}

impl OcrError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            OcrError::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            OcrError::TaskJoinFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Translation relay and backend errors. All of them fail the whole batch.
#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("Nothing to translate: request contained no items")]
    EmptyBatch,

    #[error("Too many texts in one batch: {count} (backend accepts at most {max})")]
    BatchTooLarge { count: usize, max: usize },

    #[error("Translation backend not configured (set DEEPL_API_KEY)")]
    NotConfigured,

    #[error("Translation backend error: {status} - {body}")]
    Backend { status: u16, body: String },

    #[error("Translation request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Translation backend returned {actual} translations for {expected} texts")]
    CardinalityMismatch { expected: usize, actual: usize },

    #[error("Invalid translation response: {0}")]
    InvalidResponse(String),

    #[error("Circuit breaker is open, translation backend is unavailable")]
    CircuitOpen,
}

impl TranslationError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            TranslationError::EmptyBatch | TranslationError::BatchTooLarge { .. } => {
                StatusCode::BAD_REQUEST
            }
            TranslationError::CircuitOpen => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Pad stride must be > 0, got {0}")]
    InvalidPadStride(u32),

    #[error("Max upload size must be > 0")]
    InvalidUploadLimit,

    #[error("Language code for {0} must not be empty")]
    EmptyLanguage(&'static str),

    #[error("Invalid translation config: {0}")]
    InvalidTranslationConfig(String),

    #[error("Environment variable parsing failed: {0}")]
    EnvVarError(String),
}

pub type ImagingResult<T> = Result<T, ImagingError>;
pub type InpaintResult<T> = Result<T, InpaintError>;
pub type TranslationResult<T> = Result<T, TranslationError>;
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert_eq!(
            ImagingError::DimensionMismatch {
                image_width: 4,
                image_height: 4,
                mask_width: 2,
                mask_height: 2
            }
            .status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            TranslationError::EmptyBatch.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            TranslationError::BatchTooLarge { count: 51, max: 50 }.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            TranslationError::CardinalityMismatch {
                expected: 2,
                actual: 1
            }
            .status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            OcrError::ModelUnavailable("missing weights".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_inpaint_error_keeps_cause() {
        let err = InpaintError::Model(anyhow::anyhow!("session run failed"));
        assert!(err.to_string().contains("session run failed"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_backend_error_text_is_verbatim() {
        let err = TranslationError::Backend {
            status: 456,
            body: "Quota exceeded".into(),
        };
        assert_eq!(err.to_string(), "Translation backend error: 456 - Quota exceeded");
    }
}
