//! Environment variable loader.
//!
//! Recognizes exactly the variables named in §6: `CONTENT_ROOT`,
//! `VECTOR_DB_URL`, `EMBEDDING_PROVIDER_KEY`, `JWT_SECRET`,
//! `TEXT_TO_TEXT_THRESHOLD`, `TEXT_TO_IMAGE_THRESHOLD`,
//! `IMAGE_SEARCH_THRESHOLD`, `WORKER_COUNT`, `DEFAULT_USER`,
//! `DEFAULT_PASSWORD`, plus `HOST`/`PORT` for the HTTP listener.
//! Everything else keeps its default.

use crate::config::AppConfig;
use std::env;

/// Loads configuration by overlaying recognized environment variables onto
/// `AppConfig::default()`. Does not validate; call `validate_all()` after.
pub fn load_from_env() -> AppConfig {
    let mut config = AppConfig::default();

    if let Ok(root) = env::var("CONTENT_ROOT") {
        config.content.content_root = root;
    }
    if let Ok(url) = env::var("VECTOR_DB_URL") {
        config.vector_db.url = url;
    }
    if let Ok(key) = env::var("EMBEDDING_PROVIDER_KEY") {
        config.embedding.provider_key = key;
    }
    if let Ok(secret) = env::var("JWT_SECRET") {
        config.auth.jwt_secret = secret;
    }
    if let Some(v) = parse_env::<f32>("TEXT_TO_TEXT_THRESHOLD") {
        config.search.text_to_text_threshold = v;
    }
    if let Some(v) = parse_env::<f32>("TEXT_TO_IMAGE_THRESHOLD") {
        config.search.text_to_image_threshold = v;
    }
    if let Some(v) = parse_env::<f32>("IMAGE_SEARCH_THRESHOLD") {
        config.search.image_search_threshold = v;
    }
    if let Some(v) = parse_env::<usize>("WORKER_COUNT") {
        config.ingestion.worker_count = v;
    }
    if let Ok(user) = env::var("DEFAULT_USER") {
        config.auth.default_user = user;
    }
    if let Ok(password) = env::var("DEFAULT_PASSWORD") {
        config.auth.default_password = password;
    }
    if let Ok(host) = env::var("HOST") {
        config.server.host = host;
    }
    if let Some(v) = parse_env::<u16>("PORT") {
        config.server.port = v;
    }

    config
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.parse::<T>().ok())
}
