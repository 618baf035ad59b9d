//! # Storage
//!
//! Concrete backends for the content store (C1) and metadata registry (C2):
//! a date-partitioned filesystem layout and a SQLite-backed registry with
//! compare-and-set state transitions.

pub mod content_store;
pub mod registry;

pub use content_store::FsContentStore;
pub use registry::SqliteRegistry;
