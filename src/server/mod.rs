//! HTTP surface
//!
//! Maps the wrapper operations onto axum routes and owns server startup:
//! environment-provided configuration, models directory creation, the eager
//! default-model load attempt, and graceful shutdown.

mod api;
mod error;
mod handlers;
mod state;

pub use api::create_router;
pub use error::ServerError;
pub use state::AppState;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use crate::adapter::TaskKind;
use crate::backend;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub models_dir: String,
    pub max_upload_size: usize,
    pub default_model_path: Option<String>,
    pub default_task: TaskKind,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("API_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            models_dir: std::env::var("MODELS_DIR").unwrap_or_else(|_| "models".to_string()),
            max_upload_size: std::env::var("MAX_UPLOAD_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(100 * 1024 * 1024), // 100MB
            default_model_path: std::env::var("TABSERVE_MODEL_PATH")
                .ok()
                .filter(|p| !p.is_empty()),
            default_task: TaskKind::parse(
                &std::env::var("TABSERVE_MODEL_TASK").unwrap_or_default(),
            ),
        }
    }
}

/// Start the server with the given configuration
pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let start_time = chrono::Utc::now();

    std::fs::create_dir_all(&config.models_dir)?;
    info!(
        models_dir = %config.models_dir,
        started_at = %start_time.to_rfc3339(),
        "Initialized models directory"
    );

    let state = Arc::new(AppState::new(config.clone(), backend::adapter()));

    // Eager attempt at the configured default model; a failure is recorded
    // on the registry and must not prevent startup.
    if config.default_model_path.is_some() && state.registry.get(&state.adapter).await.is_none() {
        info!("No default model loaded at startup, continuing without one");
    }

    let app = create_router(Arc::clone(&state));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        address = %addr,
        max_upload_size_mb = config.max_upload_size / 1024 / 1024,
        pid = std::process::id(),
        "Server listening and ready to accept connections"
    );
    info!(url = %format!("http://{}/health", addr), "Health endpoint available");

    let shutdown_signal = async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C signal handler");
        let stop_time = chrono::Utc::now();
        let uptime = stop_time.signed_duration_since(start_time);
        info!(
            stopped_at = %stop_time.to_rfc3339(),
            uptime_secs = uptime.num_seconds(),
            "Shutdown signal received, stopping server gracefully"
        );
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("Server shut down cleanly");
    Ok(())
}
