//! HTTP request handlers

use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::adapter::TaskKind;
use crate::tabular;

use super::error::{Result, ServerError};
use super::state::AppState;

pub async fn health_check() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

/// Model metadata if loaded. An empty registry reports `loaded: false`,
/// plus the text of the last swallowed auto-load failure when one was
/// recorded.
pub async fn get_metadata(State(state): State<Arc<AppState>>) -> Json<Value> {
    match state.registry.get(&state.adapter).await {
        Some((_, metadata)) => Json(json!({"loaded": true, "metadata": metadata})),
        None => {
            let mut body = json!({"loaded": false});
            if let Some(err) = state.registry.last_load_error().await {
                body["last_load_error"] = json!(err);
            }
            Json(body)
        }
    }
}

#[derive(Deserialize)]
pub struct PredictRequest {
    pub data: Value,
}

pub async fn predict(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PredictRequest>,
) -> Result<Json<Value>> {
    let Some((model, _)) = state.registry.get(&state.adapter).await else {
        return Err(ServerError::BadRequest(
            "No model loaded. Use /load or set TABSERVE_MODEL_PATH".to_string(),
        ));
    };

    let frame = tabular::frame_from_json(&request.data)
        .map_err(|e| ServerError::BadRequest(e.to_string()))?;
    let result = state.adapter.predict(model.as_ref(), &frame)?;
    let predictions = tabular::frame_to_records(&result)?;
    Ok(Json(json!({"predictions": predictions})))
}

#[derive(Deserialize)]
pub struct LoadRequest {
    pub path: Option<String>,
    pub task: Option<String>,
}

/// Load a model from a server-side path:
/// `{"path": "models/iris_model", "task": "classification"}`
pub async fn load_model(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoadRequest>,
) -> Result<Json<Value>> {
    let Some(path) = request.path.filter(|p| !p.is_empty()) else {
        return Err(ServerError::BadRequest("'path' is required".to_string()));
    };
    let task = TaskKind::parse(request.task.as_deref().unwrap_or(""));

    let handle = state
        .adapter
        .load(Path::new(&path), task)
        .map_err(|e| ServerError::Internal(e.to_string()))?;
    let metadata = state.adapter.describe(handle.as_ref());
    state.registry.set(handle, metadata).await;

    info!(path = %path, task = %task, "Model loaded");
    Ok(Json(json!({"loaded": true, "path": path})))
}

/// Upload a model file and load it. The file is saved unmodified under the
/// models directory, keyed by its original filename (last write wins); the
/// load is tried with the saved path as-is, then with the extension
/// stripped.
pub async fn upload_model(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<Value>> {
    let mut task = TaskKind::Classification;
    let mut saved: Option<(String, std::path::PathBuf)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(e.to_string()))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "task" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ServerError::BadRequest(e.to_string()))?;
                task = TaskKind::parse(&text);
            }
            "file" => {
                // Artifact names come from the client; a file part without
                // one is rejected rather than given an invented name.
                let Some(filename) = field
                    .file_name()
                    .and_then(|n| Path::new(n).file_name())
                    .map(|f| f.to_string_lossy().to_string())
                else {
                    return Err(ServerError::BadRequest(
                        "file field has no filename".to_string(),
                    ));
                };
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ServerError::BadRequest(e.to_string()))?;

                let dest = Path::new(&state.config.models_dir).join(&filename);
                tokio::fs::write(&dest, &bytes)
                    .await
                    .map_err(|e| ServerError::Internal(format!("failed to save file: {e}")))?;
                info!(filename = %filename, bytes = bytes.len(), "Saved uploaded model file");
                saved = Some((filename, dest));
            }
            _ => {}
        }
    }

    let Some((filename, dest)) = saved else {
        return Err(ServerError::BadRequest("No file uploaded".to_string()));
    };

    let handle = match state.adapter.load(&dest, task) {
        Ok(handle) => handle,
        // Some formats expect the path without its extension.
        Err(_) => state
            .adapter
            .load(&dest.with_extension(""), task)
            .map_err(|e| ServerError::Internal(format!("failed to load uploaded model: {e}")))?,
    };
    let metadata = state.adapter.describe(handle.as_ref());
    state.registry.set(handle, metadata).await;

    info!(filename = %filename, task = %task, "Uploaded model loaded");
    Ok(Json(json!({"uploaded": true, "filename": filename})))
}
