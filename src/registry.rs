//! Single-slot model registry
//!
//! Holds zero or one loaded model plus its metadata behind one mutex. The
//! slot can be populated lazily from a default path captured at
//! construction; a failed lazy load leaves the slot empty and records the
//! error text instead of surfacing it.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::adapter::{Adapter, Metadata, ModelHandle, TaskKind};

#[derive(Default)]
struct Slot {
    model: Option<Arc<dyn ModelHandle>>,
    metadata: Option<Metadata>,
    last_load_error: Option<String>,
}

/// Process-wide holder of the currently loaded model.
pub struct ModelRegistry {
    slot: Mutex<Slot>,
    default_path: Option<PathBuf>,
    default_task: TaskKind,
}

impl ModelRegistry {
    pub fn new(default_path: Option<PathBuf>, default_task: TaskKind) -> Self {
        Self {
            slot: Mutex::new(Slot::default()),
            default_path,
            default_task,
        }
    }

    /// Atomically replace the slot contents. The previous handle is dropped;
    /// no cleanup hook runs on it.
    pub async fn set(&self, model: Arc<dyn ModelHandle>, metadata: Metadata) {
        let mut slot = self.slot.lock().await;
        slot.model = Some(model);
        slot.metadata = Some(metadata);
        slot.last_load_error = None;
    }

    /// Current slot contents, attempting one lazy load from the default path
    /// if the slot is empty. Lazy-load failures are swallowed: the slot stays
    /// empty and the error text is kept for diagnostics.
    ///
    /// The lock covers the load, so a slow load blocks other registry users
    /// for its duration.
    pub async fn get(&self, adapter: &Adapter) -> Option<(Arc<dyn ModelHandle>, Metadata)> {
        let mut slot = self.slot.lock().await;
        if slot.model.is_none() {
            if let Some(path) = &self.default_path {
                match adapter.load(path, self.default_task) {
                    Ok(handle) => {
                        info!(path = %path.display(), task = %self.default_task, "Loaded default model");
                        slot.metadata = Some(adapter.describe(handle.as_ref()));
                        slot.model = Some(handle);
                        slot.last_load_error = None;
                    }
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "Default model load failed, registry stays empty");
                        slot.last_load_error = Some(err.to_string());
                    }
                }
            }
        }
        match (&slot.model, &slot.metadata) {
            (Some(model), Some(metadata)) => Some((Arc::clone(model), metadata.clone())),
            _ => None,
        }
    }

    /// Error text of the most recent swallowed lazy-load failure, if any.
    pub async fn last_load_error(&self) -> Option<String> {
        self.slot.lock().await.last_load_error.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{AttrValue, TaskModule};
    use crate::error::{AdapterError, Result};
    use polars::prelude::*;
    use std::path::Path;

    struct FakeModel;

    impl ModelHandle for FakeModel {
        fn class_name(&self) -> &str {
            "FakeModel"
        }
        fn attribute(&self, _name: &str) -> Option<AttrValue> {
            None
        }
        fn predict(&self, frame: &DataFrame) -> Result<Series> {
            Ok(Series::new("Label".into(), vec![0i64; frame.height()]))
        }
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    fn loading_adapter() -> Adapter {
        fn fake_load(_path: &Path) -> Result<Arc<dyn ModelHandle>> {
            Ok(Arc::new(FakeModel))
        }
        Adapter::new(
            TaskModule {
                load: Some(fake_load),
                ..TaskModule::default()
            },
            TaskModule::default(),
        )
    }

    fn failing_adapter() -> Adapter {
        fn failing_load(path: &Path) -> Result<Arc<dyn ModelHandle>> {
            Err(AdapterError::Backend(format!(
                "no such artifact: {}",
                path.display()
            )))
        }
        Adapter::new(
            TaskModule {
                load: Some(failing_load),
                ..TaskModule::default()
            },
            TaskModule::default(),
        )
    }

    #[tokio::test]
    async fn test_empty_without_default_path() {
        let registry = ModelRegistry::new(None, TaskKind::Classification);
        assert!(registry.get(&loading_adapter()).await.is_none());
        assert!(registry.last_load_error().await.is_none());
    }

    #[tokio::test]
    async fn test_lazy_load_populates_slot() {
        let registry = ModelRegistry::new(
            Some(PathBuf::from("models/foo")),
            TaskKind::Classification,
        );
        let (model, metadata) = registry.get(&loading_adapter()).await.unwrap();
        assert_eq!(model.class_name(), "FakeModel");
        assert_eq!(metadata["class"], "FakeModel");
    }

    #[tokio::test]
    async fn test_lazy_load_failure_is_swallowed_but_recorded() {
        let registry = ModelRegistry::new(
            Some(PathBuf::from("models/missing")),
            TaskKind::Classification,
        );
        assert!(registry.get(&failing_adapter()).await.is_none());
        let err = registry.last_load_error().await.unwrap();
        assert!(err.contains("models/missing"));
    }

    #[tokio::test]
    async fn test_set_replaces_and_clears_error() {
        let registry = ModelRegistry::new(
            Some(PathBuf::from("models/missing")),
            TaskKind::Classification,
        );
        registry.get(&failing_adapter()).await;
        assert!(registry.last_load_error().await.is_some());

        let adapter = loading_adapter();
        let handle: Arc<dyn ModelHandle> = Arc::new(FakeModel);
        let metadata = adapter.describe(handle.as_ref());
        registry.set(handle, metadata).await;

        assert!(registry.last_load_error().await.is_none());
        let (model, _) = registry.get(&failing_adapter()).await.unwrap();
        assert_eq!(model.class_name(), "FakeModel");
    }
}
