// DeepL client: one form-encoded POST per batch, repeated `text` fields
// keep the input order.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

use crate::core::config::TranslationConfig;
use crate::core::errors::{TranslationError, TranslationResult};
use crate::middleware::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use crate::services::translation::TranslationBackend;
use crate::utils::metrics::Metrics;

const INITIAL_RETRY_DELAY_MS: u64 = 500;
const MAX_RETRY_DELAY_MS: u64 = 8000;

/// DeepL rejects requests carrying more `text` fields than this
pub const MAX_TEXTS_PER_REQUEST: usize = 50;

#[derive(Debug, Deserialize)]
struct DeeplResponse {
    #[serde(default)]
    translations: Vec<DeeplTranslation>,
}

#[derive(Debug, Deserialize)]
struct DeeplTranslation {
    #[serde(default)]
    text: Option<String>,
}

/// Pull the per-position texts out of a DeepL response body
fn parse_response(body: &str) -> TranslationResult<Vec<Option<String>>> {
    let parsed: DeeplResponse = serde_json::from_str(body)
        .map_err(|e| TranslationError::InvalidResponse(e.to_string()))?;
    Ok(parsed.translations.into_iter().map(|t| t.text).collect())
}

fn retry_delay(attempt: u32) -> Duration {
    let base = INITIAL_RETRY_DELAY_MS
        .saturating_mul(1 << attempt.min(16))
        .min(MAX_RETRY_DELAY_MS);
    let jitter = rand::random::<u64>() % 250;
    Duration::from_millis(base + jitter)
}

pub struct DeeplClient {
    api_key: Option<String>,
    api_url: String,
    source_lang: String,
    target_lang: String,
    max_retries: u32,
    http_client: reqwest::Client,
    circuit_breaker: CircuitBreaker,
    metrics: Option<Metrics>,
}

impl DeeplClient {
    pub fn new(config: &TranslationConfig, metrics: Option<Metrics>) -> TranslationResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        if config.api_key.is_none() {
            warn!("DEEPL_API_KEY not set, /translate will fail until it is configured");
        }

        Ok(Self {
            api_key: config.api_key.clone(),
            api_url: config.api_url.clone(),
            source_lang: config.source_lang.clone(),
            target_lang: config.target_lang.clone(),
            max_retries: config.max_retries,
            http_client,
            circuit_breaker: CircuitBreaker::new("deepl", CircuitBreakerConfig::default()),
            metrics,
        })
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.circuit_breaker
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn record_outcome(&self, success: bool, started: Instant, texts: usize) {
        if success {
            self.circuit_breaker.record_success();
        } else {
            let was_open = self.circuit_breaker.state() == CircuitState::Open;
            self.circuit_breaker.record_failure();
            if !was_open && self.circuit_breaker.state() == CircuitState::Open {
                if let Some(m) = &self.metrics {
                    m.record_circuit_breaker_trip();
                }
            }
        }

        if let Some(m) = &self.metrics {
            m.record_api_call(success, started.elapsed(), texts);
        }
    }

    /// Send the form with retries on timeouts, connection errors, 429 and 5xx.
    /// Returns the successful response body.
    async fn send_with_retries(&self, api_key: &str, form: &[(&str, &str)]) -> TranslationResult<String> {
        let mut attempt = 0;
        loop {
            let result = self
                .http_client
                .post(&self.api_url)
                .header("Authorization", format!("DeepL-Auth-Key {}", api_key))
                .form(form)
                .send()
                .await;

            let response = match result {
                Ok(response) => response,
                Err(e) => {
                    let retryable = e.is_timeout() || e.is_connect();
                    error!(
                        "DeepL: request failed (attempt {}): {} (retryable: {})",
                        attempt + 1,
                        e,
                        retryable
                    );
                    if retryable && attempt < self.max_retries {
                        tokio::time::sleep(retry_delay(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(TranslationError::Transport(e));
                }
            };

            let status = response.status();
            if status.is_success() {
                return Ok(response.text().await?);
            }

            let body = response.text().await.unwrap_or_default();
            let retryable = status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS;
            if retryable && attempt < self.max_retries {
                warn!(
                    "DeepL: {} on attempt {}/{}, retrying",
                    status,
                    attempt + 1,
                    self.max_retries + 1
                );
                tokio::time::sleep(retry_delay(attempt)).await;
                attempt += 1;
                continue;
            }

            return Err(TranslationError::Backend {
                status: status.as_u16(),
                body,
            });
        }
    }
}

#[async_trait]
impl TranslationBackend for DeeplClient {
    #[instrument(skip(self, texts), fields(texts = texts.len()))]
    async fn translate_batch(&self, texts: &[String]) -> TranslationResult<Vec<Option<String>>> {
        let api_key = self.api_key.as_deref().ok_or(TranslationError::NotConfigured)?;

        if texts.len() > MAX_TEXTS_PER_REQUEST {
            return Err(TranslationError::BatchTooLarge {
                count: texts.len(),
                max: MAX_TEXTS_PER_REQUEST,
            });
        }

        if !self.circuit_breaker.allow_request() {
            warn!("DeepL circuit open, failing fast");
            return Err(TranslationError::CircuitOpen);
        }

        let mut form: Vec<(&str, &str)> = texts.iter().map(|t| ("text", t.as_str())).collect();
        form.push(("target_lang", self.target_lang.as_str()));
        form.push(("source_lang", self.source_lang.as_str()));

        info!(
            "DeepL: translating {} texts {} -> {}",
            texts.len(),
            self.source_lang,
            self.target_lang
        );

        let started = Instant::now();
        let outcome = match self.send_with_retries(api_key, &form).await {
            Ok(body) => parse_response(&body),
            Err(e) => Err(e),
        };

        self.record_outcome(outcome.is_ok(), started, texts.len());

        let translations = outcome?;
        debug!(
            "DeepL: {} translations in {:.2}s",
            translations.len(),
            started.elapsed().as_secs_f64()
        );
        Ok(translations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use axum::extract::State;
    use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::Router;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;

    /// Scripted stand-in for the DeepL endpoint. Records the auth header and
    /// raw form body of every request and answers with the next queued reply.
    #[derive(Clone, Default)]
    struct FakeDeepl {
        replies: Arc<Mutex<VecDeque<(u16, &'static str)>>>,
        seen: Arc<Mutex<Vec<(String, String)>>>,
    }

    async fn fake_translate(
        State(fake): State<FakeDeepl>,
        headers: HeaderMap,
        body: String,
    ) -> (StatusCode, String) {
        let auth = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        fake.seen.lock().push((auth, body));

        let (status, reply) = fake
            .replies
            .lock()
            .pop_front()
            .unwrap_or((500, "no reply scripted"));
        (StatusCode::from_u16(status).unwrap(), reply.to_string())
    }

    async fn client_for(replies: Vec<(u16, &'static str)>, max_retries: u32) -> (DeeplClient, FakeDeepl) {
        let fake = FakeDeepl::default();
        fake.replies.lock().extend(replies);

        let app = Router::new()
            .route("/v2/translate", post(fake_translate))
            .with_state(fake.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let mut config = Config::for_tests().translation;
        config.api_key = Some("k".to_string());
        config.api_url = format!("http://{}/v2/translate", addr);
        config.max_retries = max_retries;

        (DeeplClient::new(&config, None).unwrap(), fake)
    }

    fn texts(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_parse_response_keeps_order_and_gaps() {
        let body = r#"{"translations":[{"detected_source_language":"JA","text":"Hello"},{},{"text":"Bye"}]}"#;
        assert_eq!(
            parse_response(body).unwrap(),
            vec![Some("Hello".to_string()), None, Some("Bye".to_string())]
        );
    }

    #[test]
    fn test_parse_response_without_translations_is_empty() {
        assert!(parse_response("{}").unwrap().is_empty());
        assert!(matches!(
            parse_response("<html>"),
            Err(TranslationError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_retry_delay_is_capped() {
        assert!(retry_delay(0) >= Duration::from_millis(INITIAL_RETRY_DELAY_MS));
        assert!(retry_delay(30) < Duration::from_millis(MAX_RETRY_DELAY_MS + 250));
    }

    #[tokio::test]
    async fn test_missing_key_is_not_configured() {
        let mut config = Config::for_tests().translation;
        config.api_key = None;
        let client = DeeplClient::new(&config, None).unwrap();

        assert!(!client.is_configured());
        let err = client.translate_batch(&["こんにちは".to_string()]).await.unwrap_err();
        assert!(matches!(err, TranslationError::NotConfigured));
    }

    #[tokio::test]
    async fn test_open_circuit_fails_fast() {
        let mut config = Config::for_tests().translation;
        config.api_key = Some("test-key".to_string());
        let client = DeeplClient::new(&config, None).unwrap();

        for _ in 0..CircuitBreakerConfig::default().failure_threshold {
            client.circuit_breaker().record_failure();
        }
        let err = client.translate_batch(&["テスト".to_string()]).await.unwrap_err();
        assert!(matches!(err, TranslationError::CircuitOpen));
    }

    #[tokio::test]
    async fn test_request_carries_texts_in_order_and_auth_header() {
        let (client, fake) = client_for(
            vec![(200, r#"{"translations":[{"text":"A"},{"text":"B"},{"text":"C"}]}"#)],
            0,
        )
        .await;

        let translations = client.translate_batch(&texts(&["a", "b", "c"])).await.unwrap();
        assert_eq!(
            translations,
            vec![Some("A".to_string()), Some("B".to_string()), Some("C".to_string())]
        );

        let seen = fake.seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "DeepL-Auth-Key k");
        assert_eq!(seen[0].1, "text=a&text=b&text=c&target_lang=EN&source_lang=JA");
    }

    #[tokio::test]
    async fn test_non_success_status_keeps_backend_body() {
        let (client, fake) = client_for(vec![(456, "Quota exceeded")], 2).await;

        let err = client.translate_batch(&texts(&["a"])).await.unwrap_err();
        match err {
            TranslationError::Backend { status, body } => {
                assert_eq!(status, 456);
                assert_eq!(body, "Quota exceeded");
            }
            other => panic!("expected backend error, got {other:?}"),
        }
        // 4xx other than 429 is not retried
        assert_eq!(fake.seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let (client, fake) = client_for(
            vec![
                (503, "busy"),
                (200, r#"{"translations":[{"text":"Hello"}]}"#),
            ],
            1,
        )
        .await;

        let translations = client.translate_batch(&texts(&["こんにちは"])).await.unwrap();
        assert_eq!(translations, vec![Some("Hello".to_string())]);
        assert_eq!(fake.seen.lock().len(), 2);
        assert_eq!(client.circuit_breaker().state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_oversized_batch_is_rejected_before_sending() {
        let (client, fake) = client_for(vec![], 0).await;
        let batch = vec!["x".to_string(); MAX_TEXTS_PER_REQUEST + 1];

        let err = client.translate_batch(&batch).await.unwrap_err();
        assert!(matches!(
            err,
            TranslationError::BatchTooLarge { count, max } if count == MAX_TEXTS_PER_REQUEST + 1 && max == MAX_TEXTS_PER_REQUEST
        ));
        assert!(fake.seen.lock().is_empty());
    }
}
