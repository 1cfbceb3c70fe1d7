pub mod config;
pub mod errors;
pub mod types;

// Re-export commonly used items for convenience
pub use config::Config;
pub use errors::{
    ConfigError, ExtractionError, ImagingError, InpaintError, OcrError, TranslationError,
    ValidationError,
};
pub use types::{
    parse_selections, ChannelOrder, ColorImage, InpaintResponse, Mask, OcrItem, Selection,
    TranslatedItem, TranslationItem,
};
