pub mod batch;
pub mod inpaint_orchestrator;
pub mod ocr_orchestrator;
pub mod translation_relay;

pub use batch::{run_batch, Atomic, FailurePolicy, Isolate};
pub use inpaint_orchestrator::InpaintOrchestrator;
pub use ocr_orchestrator::{OcrOrchestrator, NO_TEXT_DETECTED};
pub use translation_relay::{TranslationRelay, TRANSLATION_ERROR_TEXT};
