//! Prometheus metrics endpoint (ambient, §6): installs the recorder the
//! ingestion pipeline's `metrics::histogram!`/`metrics::counter!` calls
//! write into, and exposes it for scraping.

use axum::response::IntoResponse;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Installs the global Prometheus recorder. Must run once before the
/// server starts accepting traffic; calling it twice would panic on the
/// second `set_global_recorder`, so `server::run` only calls this once per
/// process.
pub fn install_recorder() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install the Prometheus recorder")
}

pub async fn scrape(handle: axum::extract::State<PrometheusHandle>) -> impl IntoResponse {
    handle.0.render()
}
