//! The vector index backend (C4). Qdrant is the only supported backend —
//! the spec treats the vector database as a single remote service, not a
//! pluggable abstraction (§9).

pub mod qdrant;

pub use qdrant::QdrantVectorIndex;
