//! Configuration structures for the media indexing and retrieval engine.
//!
//! All structures use `serde` for serialization and `validator` for range
//! checks, loaded once at startup into an immutable value (§9: avoid
//! singletons, thread a small app-context struct through handlers instead).

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Top-level configuration, aggregating the per-component knobs from §4.7.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub content: ContentConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub ingestion: IngestionConfig,

    #[serde(default)]
    pub vector_db: VectorDbConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub server: ServerConfig
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            content: ContentConfig::default(),
            embedding: EmbeddingConfig::default(),
            search: SearchConfig::default(),
            ingestion: IngestionConfig::default(),
            vector_db: VectorDbConfig::default(),
            auth: AuthConfig::default(),
            server: ServerConfig::default()
        }
    }
}

impl AppConfig {
    pub fn validate_all(&self) -> Result<(), validator::ValidationErrors> {
        self.validate()?;
        self.content.validate()?;
        self.embedding.validate()?;
        self.search.validate()?;
        self.ingestion.validate()?;
        self.vector_db.validate()?;
        self.auth.validate()?;
        self.server.validate()?;
        Ok(())
    }
}

/// Content store settings (C1).
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct ContentConfig {
    /// Root directory for originals, thumbnails and the registry file.
    #[serde(default = "default_content_root")]
    pub content_root: String,

    /// Upload size cap in bytes.
    #[serde(default = "default_max_file_size")]
    #[validate(range(min = 1))]
    pub max_file_size: u64
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            content_root: default_content_root(),
            max_file_size: default_max_file_size()
        }
    }
}

fn default_content_root() -> String {
    "/media".to_string()
}

fn default_max_file_size() -> u64 {
    500 * 1024 * 1024
}

/// Embedding client settings (C3).
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct EmbeddingConfig {
    /// Declared vector dimension; discovered from the first real response
    /// at startup if the provider disagrees and `fix_dimension_on_mismatch`
    /// permits rebuilding the collection.
    #[serde(default = "default_embedding_dim")]
    #[validate(range(min = 1))]
    pub embedding_dim: usize,

    #[serde(default = "default_text_rate")]
    #[validate(range(min = 1))]
    pub text_rate_per_sec: u32,

    #[serde(default = "default_image_rate")]
    #[validate(range(min = 1))]
    pub image_rate_per_sec: u32,

    #[serde(default = "default_call_timeout_secs")]
    #[validate(range(min = 1))]
    pub embedding_call_timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Provider API key, read from `EMBEDDING_PROVIDER_KEY`. Not serialized
    /// back out in any diagnostic dump.
    #[serde(default)]
    pub provider_key: String,

    #[serde(default = "default_provider_base_url")]
    pub provider_base_url: String
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            embedding_dim: default_embedding_dim(),
            text_rate_per_sec: default_text_rate(),
            image_rate_per_sec: default_image_rate(),
            embedding_call_timeout_secs: default_call_timeout_secs(),
            max_retries: default_max_retries(),
            provider_key: String::new(),
            provider_base_url: default_provider_base_url()
        }
    }
}

fn default_embedding_dim() -> usize {
    1024
}
fn default_text_rate() -> u32 {
    10
}
fn default_image_rate() -> u32 {
    5
}
fn default_call_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_provider_base_url() -> String {
    "http://localhost:9000".to_string()
}

/// Search threshold knobs (C6).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Validate, PartialEq)]
pub struct SearchConfig {
    #[serde(default = "default_text_to_text_threshold")]
    #[validate(range(min = -1.0, max = 1.0))]
    pub text_to_text_threshold: f32,

    #[serde(default = "default_text_to_image_threshold")]
    #[validate(range(min = -1.0, max = 1.0))]
    pub text_to_image_threshold: f32,

    #[serde(default = "default_image_search_threshold")]
    #[validate(range(min = -1.0, max = 1.0))]
    pub image_search_threshold: f32,

    /// Default/clamped result count per query.
    #[serde(default = "default_search_limit")]
    #[validate(range(min = 1, max = 100))]
    pub default_limit: usize
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            text_to_text_threshold: default_text_to_text_threshold(),
            text_to_image_threshold: default_text_to_image_threshold(),
            image_search_threshold: default_image_search_threshold(),
            default_limit: default_search_limit()
        }
    }
}

fn default_text_to_text_threshold() -> f32 {
    0.8
}
fn default_text_to_image_threshold() -> f32 {
    0.2
}
fn default_image_search_threshold() -> f32 {
    0.5
}
fn default_search_limit() -> usize {
    20
}

/// Ingestion pipeline settings (C5).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Validate, PartialEq)]
pub struct IngestionConfig {
    #[serde(default = "default_worker_count")]
    #[validate(range(min = 1))]
    pub worker_count: usize,

    #[serde(default = "default_max_embedding_attempts")]
    #[validate(range(min = 1))]
    pub max_embedding_attempts: u32,

    /// Bounded-channel depth for the ingestion queue (§5 backpressure).
    #[serde(default = "default_queue_capacity")]
    #[validate(range(min = 1))]
    pub queue_capacity: usize
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            max_embedding_attempts: default_max_embedding_attempts(),
            queue_capacity: default_queue_capacity()
        }
    }
}

fn default_worker_count() -> usize {
    4
}
fn default_max_embedding_attempts() -> u32 {
    5
}
fn default_queue_capacity() -> usize {
    1024
}

/// Vector database connection and dimension-migration settings (C4).
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct VectorDbConfig {
    #[serde(default = "default_vector_db_url")]
    pub url: String,

    #[serde(default = "default_collection_name")]
    pub collection_name: String,

    /// If true, a dimension mismatch at startup drops and recreates the
    /// collection. Destructive; off by default (§9).
    #[serde(default)]
    pub fix_dimension_on_mismatch: bool,

    /// If true, refuse to start when the vector DB is unreachable at boot
    /// (exit code 3, §6).
    #[serde(default = "default_true")]
    pub require_index_on_start: bool
}

impl Default for VectorDbConfig {
    fn default() -> Self {
        Self {
            url: default_vector_db_url(),
            collection_name: default_collection_name(),
            fix_dimension_on_mismatch: false,
            require_index_on_start: true
        }
    }
}

fn default_vector_db_url() -> String {
    "http://localhost:6334".to_string()
}
fn default_collection_name() -> String {
    "media_embeddings".to_string()
}
fn default_true() -> bool {
    true
}

/// Single-account auth settings (ambient, §6).
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct AuthConfig {
    #[serde(default)]
    pub jwt_secret: String,

    #[serde(default = "default_username")]
    pub default_user: String,

    #[serde(default)]
    pub default_password: String,

    #[serde(default = "default_token_ttl_secs")]
    #[validate(range(min = 1))]
    pub token_ttl_secs: u64
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            default_user: default_username(),
            default_password: String::new(),
            token_ttl_secs: default_token_ttl_secs()
        }
    }
}

fn default_username() -> String {
    "admin".to_string()
}
fn default_token_ttl_secs() -> u64 {
    3600
}

/// HTTP listener settings (ambient, hosts C1-C6 behind the API in §6).
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: default_host(), port: default_port() }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
