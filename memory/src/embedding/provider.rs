//! HTTP-backed multimodal embedding provider (C3, §4.3).
//!
//! The provider is treated as a black box: `POST {base_url}/embed/text` and
//! `POST {base_url}/embed/image` each return `{"embedding": [f32; D]}`. This
//! client owns everything the spec assigns to C3 — per-modality rate
//! limiting, retry with backoff+jitter, a circuit breaker, dimension
//! assertion, and an LRU cache for repeated text lookups.

use async_trait::async_trait;
use base64::Engine;
use config::EmbeddingConfig;
use errors::EmbeddingError;
use lru::LruCache;
use mk_core::traits::EmbeddingProvider as EmbeddingProviderTrait;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::circuit_breaker::{CircuitBreakerConfig, EmbeddingCircuitBreaker};
use crate::rate_limiter::TokenBucket;

const TEXT_CACHE_SIZE: usize = 2000;

#[derive(Serialize)]
struct TextEmbedRequest<'a> {
    text: &'a str
}

#[derive(Serialize)]
struct ImageEmbedRequest {
    image_base64: String
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>
}

pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    call_timeout: Duration,
    max_retries: u32,
    text_limiter: TokenBucket,
    image_limiter: TokenBucket,
    breaker: EmbeddingCircuitBreaker,
    text_cache: Arc<RwLock<LruCache<String, Vec<f32>>>>,
    /// Set from the first real response; `dimension()` reports this once
    /// known, falling back to the configured value before then (§4.3).
    observed_dimension: AtomicUsize
}

impl HttpEmbeddingProvider {
    #[must_use]
    pub fn new(cfg: &EmbeddingConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: cfg.provider_base_url.clone(),
            api_key: cfg.provider_key.clone(),
            call_timeout: Duration::from_secs(cfg.embedding_call_timeout_secs),
            max_retries: cfg.max_retries,
            text_limiter: TokenBucket::new(cfg.text_rate_per_sec),
            image_limiter: TokenBucket::new(cfg.image_rate_per_sec),
            breaker: EmbeddingCircuitBreaker::new(CircuitBreakerConfig::default()),
            text_cache: Arc::new(RwLock::new(LruCache::new(
                NonZeroUsize::new(TEXT_CACHE_SIZE).expect("nonzero cache size")
            ))),
            observed_dimension: AtomicUsize::new(cfg.embedding_dim)
        }
    }

    async fn call(&self, path: &str, body: &[u8]) -> Result<Vec<f32>, EmbeddingError> {
        if !self.breaker.is_allowed().await {
            return Err(EmbeddingError::CircuitOpen { retry_after_ms: self.breaker.retry_after_ms() });
        }

        let mut attempt = 0u32;
        loop {
            let outcome = self.call_once(path, body).await;
            match outcome {
                Ok(vec) => {
                    self.breaker.record_success().await;
                    let expected = self.observed_dimension.load(Ordering::SeqCst);
                    if attempt == 0 && expected != vec.len() {
                        self.observed_dimension.store(vec.len(), Ordering::SeqCst);
                    } else if vec.len() != self.observed_dimension.load(Ordering::SeqCst) {
                        return Err(EmbeddingError::DimensionMismatch {
                            expected: self.observed_dimension.load(Ordering::SeqCst),
                            got: vec.len()
                        });
                    }
                    return Ok(vec);
                }
                Err(e) => {
                    self.breaker.record_failure(&e.to_string()).await;
                    if !e.is_retryable() || attempt >= self.max_retries {
                        return Err(e);
                    }
                    tokio::time::sleep(e.backoff_duration(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn call_once(&self, path: &str, body: &[u8]) -> Result<Vec<f32>, EmbeddingError> {
        let url = format!("{}{path}", self.base_url);
        let request = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .body(body.to_vec())
            .timeout(self.call_timeout);

        let response = tokio::time::timeout(self.call_timeout, request.send())
            .await
            .map_err(|_| EmbeddingError::Timeout { timeout_ms: self.call_timeout.as_millis() as u64 })?
            .map_err(|e| EmbeddingError::Network { reason: e.to_string() })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_ms = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(|secs| secs * 1000)
                .unwrap_or(1000);
            return Err(EmbeddingError::RateLimited { retry_after_ms });
        }
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::ProviderStatus { status: status.as_u16(), body: body_text });
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Network { reason: format!("malformed response: {e}") })?;
        Ok(parsed.embedding)
    }
}

#[async_trait]
impl EmbeddingProviderTrait for HttpEmbeddingProvider {
    type Error = EmbeddingError;

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, Self::Error> {
        if let Some(cached) = self.text_cache.write().await.get(text) {
            return Ok(cached.clone());
        }

        self.text_limiter.acquire().await;
        let body = serde_json::to_vec(&TextEmbedRequest { text })
            .map_err(|e| EmbeddingError::Network { reason: e.to_string() })?;
        let embedding = self.call("/embed/text", &body).await?;

        self.text_cache.write().await.put(text.to_string(), embedding.clone());
        Ok(embedding)
    }

    async fn embed_image(&self, bytes: &[u8]) -> Result<Vec<f32>, Self::Error> {
        self.image_limiter.acquire().await;
        let image_base64 = base64::engine::general_purpose::STANDARD.encode(bytes);
        let body = serde_json::to_vec(&ImageEmbedRequest { image_base64 })
            .map_err(|e| EmbeddingError::Network { reason: e.to_string() })?;
        self.call("/embed/image", &body).await
    }

    fn dimension(&self) -> usize {
        self.observed_dimension.load(Ordering::SeqCst)
    }

    /// Goes straight through `call`, bypassing `text_cache`, so a prior
    /// successful embed can't mask a provider that's gone down since.
    async fn health(&self) -> Result<(), Self::Error> {
        let body = serde_json::to_vec(&TextEmbedRequest { text: "" })
            .map_err(|e| EmbeddingError::Network { reason: e.to_string() })?;
        self.call("/embed/text", &body).await?;
        Ok(())
    }
}
