//! # Configuration
//!
//! Startup configuration for the media indexing and retrieval engine.
//!
//! - Configuration structures for every component (C1-C7)
//! - Environment variable loading (12-factor app principles)
//! - Validation via the `validator` crate

pub mod config;
pub mod loader;

pub use config::{
    AppConfig, AuthConfig, ContentConfig, EmbeddingConfig, IngestionConfig, SearchConfig,
    ServerConfig, VectorDbConfig
};
pub use loader::load_from_env;
pub use validator::Validate;
