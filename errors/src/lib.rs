//! Error taxonomy for the media indexing and retrieval engine.
//!
//! Each layer gets its own `thiserror` enum with named fields; `ApiError` is
//! the union the HTTP layer actually matches on to pick a status code. Lower
//! layers (`StorageError`, `EmbeddingError`, `VectorIndexError`) fold into
//! `ApiError::Dependency` via `#[from]` so handlers can just use `?`.

use std::time::Duration;
use thiserror::Error;

pub mod http;
pub use http::ErrorResponse;

/// Content store (C1) and metadata registry (C2) errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("i/o error at {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("record not found: {gmid}")]
    NotFound { gmid: String },

    #[error("compare-and-set lost: {gmid} expected {expected}, found {actual}")]
    CasConflict {
        gmid: String,
        expected: String,
        actual: String
    },

    #[error("registry query failed: {reason}")]
    Query { reason: String },

    #[error("migration failed: {reason}")]
    Migration { reason: String }
}

/// C3 embedding provider errors. `is_retryable` and `backoff_duration` drive
/// the pipeline's retry loop without the caller needing to inspect variants.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("rate limited by provider: retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("provider request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("provider returned {status}: {body}")]
    ProviderStatus { status: u16, body: String },

    #[error("provider unreachable: {reason}")]
    Network { reason: String },

    #[error("provider returned a vector of dimension {got}, expected {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("circuit breaker open, next probe at {retry_after_ms}ms")]
    CircuitOpen { retry_after_ms: u64 }
}

impl EmbeddingError {
    /// Network hiccups, timeouts, rate limiting, 5xx and the circuit probe
    /// window are all worth retrying; malformed responses are not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            EmbeddingError::RateLimited { .. }
            | EmbeddingError::Timeout { .. }
            | EmbeddingError::Network { .. }
            | EmbeddingError::CircuitOpen { .. } => true,
            EmbeddingError::ProviderStatus { status, .. } => *status >= 500,
            EmbeddingError::DimensionMismatch { .. } => false
        }
    }

    #[must_use]
    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        match self {
            EmbeddingError::RateLimited { retry_after_ms } => Duration::from_millis(*retry_after_ms),
            EmbeddingError::CircuitOpen { retry_after_ms } => Duration::from_millis(*retry_after_ms),
            _ => exponential_backoff_with_jitter(attempt)
        }
    }
}

/// `base * 2^attempt` capped at 30s, plus up to 20% jitter so a thundering
/// herd of retries doesn't re-synchronize on the same deadline.
#[must_use]
pub fn exponential_backoff_with_jitter(attempt: u32) -> Duration {
    const BASE_MS: u64 = 200;
    const CAP_MS: u64 = 30_000;
    let exp = BASE_MS.saturating_mul(1u64 << attempt.min(16));
    let capped = exp.min(CAP_MS);
    let jitter = (capped as f64 * 0.2 * f64::from(rand::random::<f32>())) as u64;
    Duration::from_millis(capped + jitter)
}

/// C4 vector index errors.
#[derive(Debug, Error)]
pub enum VectorIndexError {
    #[error("collection unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("dimension mismatch: collection is {existing}, request is {requested}")]
    DimensionMismatch { existing: usize, requested: usize },

    #[error("point not found: {gmid}")]
    NotFound { gmid: String },

    #[error("query failed: {reason}")]
    Query { reason: String }
}

/// The union of application-level failures, already shaped around the HTTP
/// status they map to (§7). Handlers construct this directly for request
/// validation failures, or get it for free via `#[from]` for lower layers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("unauthorized: {reason}")]
    Unauthorized { reason: String },

    #[error("not found: {gmid}")]
    NotFound { gmid: String },

    #[error("conflict: {reason}")]
    Conflict { reason: String },

    #[error("payload too large: {size_bytes} bytes exceeds {max_bytes}")]
    PayloadTooLarge { size_bytes: u64, max_bytes: u64 },

    #[error("unsupported media type: {content_type}")]
    UnsupportedMediaType { content_type: String },

    #[error("rate limited: retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("dependency failure: {0}")]
    Dependency(#[from] DependencyError),

    #[error("internal error: {reason}")]
    Internal { reason: String }
}

/// Wraps the three backend error types into a single `source` for
/// `ApiError::Dependency`, so the HTTP layer doesn't need to know about
/// storage, embedding and vector-index errors individually.
#[derive(Debug, Error)]
pub enum DependencyError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    VectorIndex(#[from] VectorIndexError)
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        if let StorageError::NotFound { ref gmid } = e {
            return ApiError::NotFound { gmid: gmid.clone() };
        }
        ApiError::Dependency(DependencyError::Storage(e))
    }
}

impl From<EmbeddingError> for ApiError {
    fn from(e: EmbeddingError) -> Self {
        if let EmbeddingError::RateLimited { retry_after_ms } = e {
            return ApiError::RateLimited { retry_after_ms };
        }
        ApiError::Dependency(DependencyError::Embedding(e))
    }
}

impl From<VectorIndexError> for ApiError {
    fn from(e: VectorIndexError) -> Self {
        if let VectorIndexError::NotFound { ref gmid } = e {
            return ApiError::NotFound { gmid: gmid.clone() };
        }
        ApiError::Dependency(DependencyError::VectorIndex(e))
    }
}
