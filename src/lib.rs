// Library exports for the panel inpainting, OCR and translation service

pub mod core;
pub mod middleware;
pub mod orchestration;
pub mod processing;
pub mod services;
pub mod utils;

pub use core::{
    config::Config,
    errors::{ConfigError, ImagingError, InpaintError, OcrError, TranslationError, ValidationError},
    types::{ChannelOrder, ColorImage, InpaintResponse, Mask, OcrItem, Selection, TranslatedItem, TranslationItem},
};

pub use middleware::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

pub use orchestration::{InpaintOrchestrator, OcrOrchestrator, TranslationRelay};

pub use services::{DeeplClient, InpaintModel, LamaInpainter, ModelSlot, OcrModel, OcrService, TranslationBackend};

pub use utils::Metrics;
