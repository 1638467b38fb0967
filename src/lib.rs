//! Tabserve - HTTP serving wrapper for serialized tabular ML models
//!
//! Loads a model produced by an external AutoML/training pipeline, accepts
//! tabular JSON input, returns predictions, and reports minimal metadata.
//! The hard work (training, model selection, inference) is delegated to the
//! external library behind a narrow adapter seam.
//!
//! # Modules
//!
//! - [`adapter`] - Generic load/predict/save/describe over capability records
//! - [`backend`] - ONNX Runtime bindings populating those records
//! - [`registry`] - Single-slot holder of the currently loaded model
//! - [`tabular`] - JSON ⇄ DataFrame bridge
//! - [`server`] - REST API (health, metadata, predict, load, upload)

pub mod adapter;
pub mod backend;
pub mod error;
pub mod registry;
pub mod server;
pub mod tabular;

pub use adapter::{Adapter, Metadata, ModelHandle, TaskKind, TaskModule};
pub use error::{AdapterError, Result};
pub use registry::ModelRegistry;
