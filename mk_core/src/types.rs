use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::gmid::Gmid;

/// Schema version stamped onto every vector point payload, bumped whenever
/// the payload shape changes in a way old readers can't tolerate.
pub const PAYLOAD_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Photo,
    Video
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaType::Photo => write!(f, "photo"),
            MediaType::Video => write!(f, "video")
        }
    }
}

impl FromStr for MediaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "photo" => Ok(MediaType::Photo),
            "video" => Ok(MediaType::Video),
            other => Err(format!("unknown media type: {other}"))
        }
    }
}

impl MediaType {
    /// Classifies a media type from a lowercased file extension (no dot).
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" | "png" | "heic" | "webp" => Some(MediaType::Photo),
            "mp4" | "mov" | "hevc" | "avi" => Some(MediaType::Video),
            _ => None
        }
    }

    /// The directory this media type's originals are stored under.
    #[must_use]
    pub fn directory(&self) -> &'static str {
        match self {
            MediaType::Photo => "photos",
            MediaType::Video => "videos"
        }
    }
}

/// The ingestion state machine (§4.2). `transition` on the registry is the
/// sole mutation point; this enum only knows what moves are legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum IndexState {
    Pending,
    ThumbnailReady,
    EmbeddingInFlight,
    Indexed,
    Failed
}

impl fmt::Display for IndexState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IndexState::Pending => "pending",
            IndexState::ThumbnailReady => "thumbnail_ready",
            IndexState::EmbeddingInFlight => "embedding_in_flight",
            IndexState::Indexed => "indexed",
            IndexState::Failed => "failed"
        };
        write!(f, "{s}")
    }
}

impl FromStr for IndexState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(IndexState::Pending),
            "thumbnail_ready" => Ok(IndexState::ThumbnailReady),
            "embedding_in_flight" => Ok(IndexState::EmbeddingInFlight),
            "indexed" => Ok(IndexState::Indexed),
            "failed" => Ok(IndexState::Failed),
            other => Err(format!("unknown index state: {other}"))
        }
    }
}

impl IndexState {
    /// Whether `self -> to` is a legal edge in the diagram in §4.2.
    /// `Indexed -> ThumbnailReady` covers both the retry-after-upsert-failure
    /// path and the description-edit re-embed path.
    #[must_use]
    pub fn can_transition_to(&self, to: IndexState) -> bool {
        use IndexState::*;
        matches!(
            (self, to),
            (Pending, ThumbnailReady)
                | (Pending, Failed)
                | (ThumbnailReady, EmbeddingInFlight)
                | (EmbeddingInFlight, Indexed)
                | (EmbeddingInFlight, ThumbnailReady)
                | (EmbeddingInFlight, Failed)
                | (Indexed, ThumbnailReady)
        )
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, IndexState::Indexed | IndexState::Failed)
    }
}

/// Which named vector a query or point slot addresses (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum NamedVector {
    TextEmbedding,
    ImageEmbedding
}

impl NamedVector {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            NamedVector::TextEmbedding => "text_embedding",
            NamedVector::ImageEmbedding => "image_embedding"
        }
    }
}

impl fmt::Display for NamedVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The metadata registry's source-of-truth record for one uploaded file
/// (§3, C2). Mutated only by the ingestion pipeline's CAS transitions and
/// by the description-edit API.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MediaRecord {
    pub gmid: Gmid,
    pub original_name: String,
    pub stored_path: String,
    pub thumbnail_path: String,
    pub media_type: MediaType,
    pub size_bytes: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration_ms: Option<u64>,
    pub upload_time: DateTime<Utc>,
    pub description: String,
    pub index_state: IndexState,
    pub index_attempts: u32,
    pub last_error: Option<String>
}

impl MediaRecord {
    /// The vector point payload is the record minus the indexing-internal
    /// fields, plus a schema version tag (§3).
    #[must_use]
    pub fn to_payload(&self) -> VectorPayload {
        VectorPayload {
            gmid: self.gmid.clone(),
            original_name: self.original_name.clone(),
            stored_path: self.stored_path.clone(),
            thumbnail_path: self.thumbnail_path.clone(),
            media_type: self.media_type,
            size_bytes: self.size_bytes,
            width: self.width,
            height: self.height,
            duration_ms: self.duration_ms,
            upload_time: self.upload_time,
            description: self.description.clone(),
            schema_version: PAYLOAD_SCHEMA_VERSION
        }
    }
}

/// The payload carried on a vector point (§3). Does not carry `index_state`,
/// `index_attempts` or `last_error` — those are ingestion-internal and live
/// only in the registry.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct VectorPayload {
    pub gmid: Gmid,
    pub original_name: String,
    pub stored_path: String,
    pub thumbnail_path: String,
    pub media_type: MediaType,
    pub size_bytes: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration_ms: Option<u64>,
    pub upload_time: DateTime<Utc>,
    pub description: String,
    pub schema_version: u32
}

impl VectorPayload {
    /// Round-trips through `serde_json::Value` for backends whose wire
    /// format is a generic payload map.
    pub fn to_json_map(&self) -> HashMap<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map.into_iter().collect(),
            _ => HashMap::new()
        }
    }

    pub fn from_json_map(
        map: &HashMap<String, serde_json::Value>
    ) -> Result<Self, serde_json::Error> {
        serde_json::from_value(serde_json::Value::Object(map.clone().into_iter().collect()))
    }
}

/// One ranked hit from any of the three search modes (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchHit {
    pub gmid: Gmid,
    pub score: f32,
    pub payload: VectorPayload
}

/// The uniform response shape for all three query modes (§4.6). Thresholds
/// are server-enforced: `threshold_used` reflects what actually gated the
/// results, never a client-supplied value.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchResponse {
    pub success: bool,
    pub query: String,
    pub results: Vec<SearchHit>,
    pub total: usize,
    pub took_seconds: f64,
    pub threshold_used: f32
}
