//! Application state management

use std::path::PathBuf;

use crate::adapter::Adapter;
use crate::registry::ModelRegistry;

use super::ServerConfig;

/// State shared across handlers: the configuration, the adapter over the
/// external bindings, and the single-slot model registry. Handlers receive
/// it via axum `State`; tests build one around fake bindings.
pub struct AppState {
    pub config: ServerConfig,
    pub adapter: Adapter,
    pub registry: ModelRegistry,
}

impl AppState {
    pub fn new(config: ServerConfig, adapter: Adapter) -> Self {
        let registry = ModelRegistry::new(
            config.default_model_path.clone().map(PathBuf::from),
            config.default_task,
        );
        Self {
            config,
            adapter,
            registry,
        }
    }
}
