pub mod deepl;

use async_trait::async_trait;

use crate::core::errors::TranslationResult;

pub use deepl::DeeplClient;

/// Remote machine translation service.
///
/// One call per batch. The returned list must line up with `texts`; an entry
/// is `None` when the backend answered but gave no text for that position.
///
/// Backends may cap the batch size (DeepL takes at most 50 `text` fields per
/// request); an oversized batch is rejected before anything is sent.
#[async_trait]
pub trait TranslationBackend: Send + Sync {
    async fn translate_batch(&self, texts: &[String]) -> TranslationResult<Vec<Option<String>>>;
}
