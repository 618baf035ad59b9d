//! # Media Core
//!
//! Shared types and traits for the media indexing and retrieval engine:
//! the global media id scheme, the media record and vector point shapes,
//! and the trait seams that the content store, registry, embedding client
//! and vector index are built against.

pub mod gmid;
pub mod traits;
pub mod types;

pub use gmid::{Gmid, GmidError};
pub use traits::{ContentStore, EmbeddingProvider, MetadataRegistry, StoredVectors, VectorIndex};
pub use types::{
    IndexState, MediaRecord, MediaType, NamedVector, SearchHit, SearchResponse, VectorPayload,
    PAYLOAD_SCHEMA_VERSION
};
