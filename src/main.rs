//! Tabserve - Main Entry Point

use clap::Parser;
use tabserve::adapter::TaskKind;
use tabserve::server::{run_server, ServerConfig};

/// HTTP serving wrapper for serialized tabular ML models
#[derive(Parser)]
#[command(name = "tabserve", version)]
struct Cli {
    /// Bind address (overrides API_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Port (overrides API_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Model artifact to load at startup (overrides TABSERVE_MODEL_PATH)
    #[arg(short, long)]
    model: Option<String>,

    /// Task kind for the startup model: classification or regression
    #[arg(short, long)]
    task: Option<String>,

    /// Directory for uploaded model files (overrides MODELS_DIR)
    #[arg(long)]
    models_dir: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tabserve=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let mut config = ServerConfig::default();
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(model) = cli.model {
        config.default_model_path = Some(model);
    }
    if let Some(task) = cli.task {
        config.default_task = TaskKind::parse(&task);
    }
    if let Some(models_dir) = cli.models_dir {
        config.models_dir = models_dir;
    }

    run_server(config).await
}
