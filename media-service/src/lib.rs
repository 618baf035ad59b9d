//! # Media Service
//!
//! The HTTP surface that hosts C1-C6 behind the API in spec §6: upload,
//! browse, edit, delete and the three search modes, fronted by a
//! single-account JWT bearer auth layer.

pub mod auth;
pub mod handlers;
pub mod metrics;
pub mod routes;
pub mod server;
pub mod state;
pub mod thumbnail;

#[cfg(test)]
mod test_support;

pub use state::AppState;
