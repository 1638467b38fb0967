//! Uniform load/predict/save/describe operations over external model bindings
//!
//! The concrete entry points of the external library differ by task kind and
//! by version. Instead of probing at call time, each task kind gets a
//! [`TaskModule`] capability record populated once at startup; the [`Adapter`]
//! resolves operations against those records and isolates the instability
//! from the HTTP layer.

use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use polars::prelude::*;
use serde_json::json;

use crate::error::{AdapterError, Result};

/// Sentinel stored for attributes that exist but cannot be serialized.
pub const UNSERIALIZABLE: &str = "<unserializable>";

/// Attribute names probed by [`Adapter::describe`], besides `class`.
const MODEL_ATTRIBUTES: [&str; 4] = ["_name", "model_type", "estimator", "meta"];

/// Model metadata as served by `/metadata`. Insertion order is preserved.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Which family of external routines to target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskKind {
    #[default]
    Classification,
    Regression,
}

impl TaskKind {
    /// Parse a task string. Anything starting with `class` (or nothing at
    /// all) selects classification; `reg...` selects regression; unrecognized
    /// values fall back to the classification default.
    pub fn parse(task: &str) -> Self {
        let task = task.trim().to_ascii_lowercase();
        if task.starts_with("reg") {
            TaskKind::Regression
        } else {
            TaskKind::Classification
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Classification => write!(f, "classification"),
            TaskKind::Regression => write!(f, "regression"),
        }
    }
}

/// Result of a defensive attribute lookup on a model handle.
#[derive(Debug, Clone)]
pub enum AttrValue {
    Readable(serde_json::Value),
    Unreadable,
}

/// Opaque reference to a loaded predictor.
///
/// The registry owns exactly one of these at a time. Backends implement the
/// trait for whatever their load routine returns; tests implement it for
/// fakes.
pub trait ModelHandle: Send + Sync {
    /// Class name reported under the `class` metadata key.
    fn class_name(&self) -> &str;

    /// Look up one of the fixed metadata attributes. `None` means the
    /// attribute is absent and gets omitted from metadata.
    fn attribute(&self, name: &str) -> Option<AttrValue>;

    /// Bare prediction capability: one label value per input row.
    fn predict(&self, frame: &DataFrame) -> Result<Series>;

    fn as_any(&self) -> &dyn Any;
}

impl std::fmt::Debug for dyn ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("class", &self.class_name())
            .finish()
    }
}

pub type LoadFn = fn(&Path) -> Result<Arc<dyn ModelHandle>>;
pub type PredictFn = fn(&dyn ModelHandle, &DataFrame) -> Result<DataFrame>;
pub type SaveFn = fn(&dyn ModelHandle, &Path) -> Result<PathBuf>;

/// Capability record for one task kind.
///
/// Slots are `None` when the underlying bindings do not expose the
/// operation. `predict_positional` is the alternate call convention tried
/// when `predict_full` fails with a signature mismatch.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskModule {
    pub load: Option<LoadFn>,
    pub predict_full: Option<PredictFn>,
    pub predict_positional: Option<PredictFn>,
    pub save: Option<SaveFn>,
}

/// Translation layer between generic model verbs and the external library.
pub struct Adapter {
    classification: TaskModule,
    regression: TaskModule,
}

impl Adapter {
    pub fn new(classification: TaskModule, regression: TaskModule) -> Self {
        Self {
            classification,
            regression,
        }
    }

    fn module(&self, task: TaskKind) -> &TaskModule {
        match task {
            TaskKind::Classification => &self.classification,
            TaskKind::Regression => &self.regression,
        }
    }

    /// Load a serialized model artifact.
    ///
    /// The path is handed to the bindings as-is; existence checks are the
    /// external library's business and its failures surface verbatim.
    pub fn load(&self, path: &Path, task: TaskKind) -> Result<Arc<dyn ModelHandle>> {
        let load = self.module(task).load.ok_or_else(|| {
            AdapterError::Configuration(format!("{task} bindings have no load capability"))
        })?;
        load(path)
    }

    /// Run inference, preferring module-level "predict with full output"
    /// capabilities (classification first, then regression), retrying the
    /// positional convention on a signature mismatch, and finally falling
    /// back to the handle's bare predict wrapped as a `Label` column.
    pub fn predict(&self, handle: &dyn ModelHandle, frame: &DataFrame) -> Result<DataFrame> {
        for module in [&self.classification, &self.regression] {
            let Some(predict_full) = module.predict_full else {
                continue;
            };
            return match predict_full(handle, frame) {
                Err(AdapterError::Signature(detail)) => match module.predict_positional {
                    Some(positional) => positional(handle, frame),
                    None => Err(AdapterError::Signature(detail)),
                },
                other => other,
            };
        }

        let labels = handle.predict(frame)?;
        let frame = DataFrame::new(vec![labels.with_name("Label".into()).into()])?;
        Ok(frame)
    }

    /// Save the model through the task kind's bindings; returns the artifact
    /// reference the library reports (typically a path).
    pub fn save(&self, handle: &dyn ModelHandle, path: &Path, task: TaskKind) -> Result<PathBuf> {
        let save = self.module(task).save.ok_or_else(|| {
            AdapterError::Configuration(format!("{task} bindings have no save capability"))
        })?;
        save(handle, path)
    }

    /// Extract minimal metadata from a handle. Never fails: unreadable
    /// attributes become the [`UNSERIALIZABLE`] sentinel, absent ones are
    /// omitted.
    pub fn describe(&self, handle: &dyn ModelHandle) -> Metadata {
        let mut meta = Metadata::new();
        meta.insert("class".to_string(), json!(handle.class_name()));
        for name in MODEL_ATTRIBUTES {
            match handle.attribute(name) {
                Some(AttrValue::Readable(value)) => {
                    meta.insert(name.to_string(), value);
                }
                Some(AttrValue::Unreadable) => {
                    meta.insert(name.to_string(), json!(UNSERIALIZABLE));
                }
                None => {}
            }
        }
        meta
    }
}
