//! Server lifecycle (ambient, hosts §6's HTTP surface over C1-C6).

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;

use config::AppConfig;

use crate::state::{AppState, BootstrapError};

pub struct MediaServer {
    state: Arc<AppState>
}

impl MediaServer {
    pub async fn new(config: AppConfig) -> Result<Self, BootstrapError> {
        let state = AppState::bootstrap(config).await?;
        Ok(Self { state })
    }

    /// Runs the HTTP server until a shutdown signal arrives, then aborts
    /// the ingestion worker pool (§5: cancellation is tolerated, the next
    /// startup's reconciliation scan recovers anything left mid-flight).
    pub async fn run(self) -> anyhow::Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.state.config.server.host, self.state.config.server.port)
            .parse()?;

        let prometheus_handle = crate::metrics::install_recorder();
        let router = crate::routes::create_router(self.state.clone(), prometheus_handle);

        let listener = TcpListener::bind(&addr).await?;
        tracing::info!(%addr, "media service starting");

        axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await?;

        self.state.shutdown_workers().await;
        tracing::info!("media service stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
        () = terminate => tracing::info!("received terminate signal, shutting down"),
    }
}

/// Entry point used by `main.rs`: initializes tracing, loads configuration
/// from the environment, maps bootstrap failures to the exit codes in §6
/// (0 normal, 1 config invalid, 2 content root inaccessible, 3 vector DB
/// unreachable), and runs the server.
pub async fn run_from_env() -> ! {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = config::load_from_env();
    let server = match MediaServer::new(config).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "startup failed");
            std::process::exit(exit_code_for(&e));
        }
    };

    if let Err(e) = server.run().await {
        tracing::error!(error = %e, "server exited with an error");
        std::process::exit(1);
    }
    std::process::exit(0);
}

fn exit_code_for(error: &BootstrapError) -> i32 {
    match error {
        BootstrapError::Config(_) => 1,
        BootstrapError::ContentRoot(_) => 2,
        BootstrapError::VectorDb(_) => 3,
        BootstrapError::Registry(_) => 3
    }
}
