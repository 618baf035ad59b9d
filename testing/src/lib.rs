//! Shared test fixtures for the media indexing and retrieval engine.
//!
//! A single shared Qdrant testcontainer (ports 6333/6334) for integration
//! tests that need a real vector index, plus small helpers (content-root
//! tempdirs, unique ids) used across crates' test suites.

mod fixtures;

pub use fixtures::*;
