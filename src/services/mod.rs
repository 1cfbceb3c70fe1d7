pub mod inpainting;
pub mod model_slot;
pub mod ocr;
pub mod onnx_builder;
pub mod translation;

pub use inpainting::{InpaintModel, LamaInpainter};
pub use model_slot::ModelSlot;
pub use ocr::{OcrModel, OcrService};
pub use translation::{DeeplClient, TranslationBackend};
