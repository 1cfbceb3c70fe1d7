// Translation Relay: one backend call per batch, correlated by position
//
// The batch is atomic: if the backend fails or its answer cannot be lined
// up with the request, the caller gets an error and no partial list.

use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::core::errors::{TranslationError, TranslationResult};
use crate::core::types::{TranslatedItem, TranslationItem};
use crate::orchestration::batch::{run_batch, Atomic};
use crate::services::translation::TranslationBackend;

/// Stand-in for a position the backend answered without text
pub const TRANSLATION_ERROR_TEXT: &str = "Translation error";

pub struct TranslationRelay {
    backend: Arc<dyn TranslationBackend>,
}

impl TranslationRelay {
    pub fn new(backend: Arc<dyn TranslationBackend>) -> Self {
        Self { backend }
    }

    #[instrument(skip(self, items), fields(items = items.len()))]
    pub async fn translate_batch(&self, items: &[TranslationItem]) -> TranslationResult<Vec<TranslatedItem>> {
        if items.is_empty() {
            return Err(TranslationError::EmptyBatch);
        }

        let texts: Vec<String> = items.iter().map(|item| item.text.clone()).collect();
        let translations = self.backend.translate_batch(&texts).await?;

        let expected = items.len();
        let actual = translations.len();
        let mismatch = || TranslationError::CardinalityMismatch { expected, actual };

        let mut translations = translations.into_iter();
        let results = run_batch::<Atomic, _, _, _, _>(items, |item| -> TranslationResult<TranslatedItem> {
            let translated = translations.next().ok_or_else(mismatch)?;
            Ok(TranslatedItem {
                id: item.id.clone(),
                original: item.text.clone(),
                translated: translated.unwrap_or_else(|| {
                    warn!("No translation returned for item {}", item.id);
                    TRANSLATION_ERROR_TEXT.to_string()
                }),
            })
        })?;

        if translations.next().is_some() {
            return Err(mismatch());
        }

        info!("Translated {} items", results.len());
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Replays a canned answer and records every call
    struct Scripted {
        answer: Mutex<Option<TranslationResult<Vec<Option<String>>>>>,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl Scripted {
        fn new(answer: TranslationResult<Vec<Option<String>>>) -> Arc<Self> {
            Arc::new(Self {
                answer: Mutex::new(Some(answer)),
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TranslationBackend for Scripted {
        async fn translate_batch(&self, texts: &[String]) -> TranslationResult<Vec<Option<String>>> {
            self.calls.lock().push(texts.to_vec());
            self.answer
                .lock()
                .take()
                .unwrap_or(Err(TranslationError::InvalidResponse("called twice".into())))
        }
    }

    fn item(id: &str, text: &str) -> TranslationItem {
        TranslationItem {
            id: id.to_string(),
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn test_single_item() {
        let backend = Scripted::new(Ok(vec![Some("Hello".to_string())]));
        let relay = TranslationRelay::new(backend.clone());

        let results = relay.translate_batch(&[item("a", "こんにちは")]).await.unwrap();
        assert_eq!(
            results,
            vec![TranslatedItem {
                id: "a".into(),
                original: "こんにちは".into(),
                translated: "Hello".into(),
            }]
        );
        assert_eq!(*backend.calls.lock(), vec![vec!["こんにちは".to_string()]]);
    }

    #[tokio::test]
    async fn test_one_call_for_whole_batch_in_order() {
        let backend = Scripted::new(Ok(vec![
            Some("One".to_string()),
            None,
            Some("Three".to_string()),
        ]));
        let relay = TranslationRelay::new(backend.clone());

        let results = relay
            .translate_batch(&[item("1", "一"), item("2", "二"), item("3", "三")])
            .await
            .unwrap();

        let pairs: Vec<(&str, &str)> = results
            .iter()
            .map(|r| (r.id.as_str(), r.translated.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![("1", "One"), ("2", TRANSLATION_ERROR_TEXT), ("3", "Three")]
        );
        assert_eq!(backend.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_short_answer_fails_whole_batch() {
        let backend = Scripted::new(Ok(vec![Some("One".to_string())]));
        let relay = TranslationRelay::new(backend);

        let err = relay
            .translate_batch(&[item("1", "一"), item("2", "二")])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TranslationError::CardinalityMismatch { expected: 2, actual: 1 }
        ));
    }

    #[tokio::test]
    async fn test_long_answer_fails_whole_batch() {
        let backend = Scripted::new(Ok(vec![Some("One".to_string()), Some("Two".to_string())]));
        let relay = TranslationRelay::new(backend);

        let err = relay.translate_batch(&[item("1", "一")]).await.unwrap_err();
        assert!(matches!(
            err,
            TranslationError::CardinalityMismatch { expected: 1, actual: 2 }
        ));
    }

    #[tokio::test]
    async fn test_backend_error_is_surfaced_verbatim() {
        let backend = Scripted::new(Err(TranslationError::Backend {
            status: 403,
            body: "Authorization failure".into(),
        }));
        let relay = TranslationRelay::new(backend);

        let err = relay.translate_batch(&[item("1", "一")]).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Translation backend error: 403 - Authorization failure"
        );
    }

    #[tokio::test]
    async fn test_empty_batch_never_reaches_backend() {
        let backend = Scripted::new(Ok(vec![]));
        let relay = TranslationRelay::new(backend.clone());

        let err = relay.translate_batch(&[]).await.unwrap_err();
        assert!(matches!(err, TranslationError::EmptyBatch));
        assert!(backend.calls.lock().is_empty());
    }
}
