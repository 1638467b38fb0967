//! ONNX Runtime bindings
//!
//! Production capability records for the adapter: model artifacts are `.onnx`
//! files executed through `ort`. Classification models are expected to emit a
//! label output plus probabilities (a float tensor or the
//! `seq(map(int64,float))` shape tree-ensemble exporters produce); regression
//! models a single float output.

use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use ort::memory::Allocator;
use ort::session::{builder::GraphOptimizationLevel, Session, SessionOutputs};
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType, DynValue, Tensor};
use polars::prelude::*;
use serde_json::json;
use tracing::info;

use crate::adapter::{Adapter, AttrValue, ModelHandle, TaskKind, TaskModule};
use crate::error::{AdapterError, Result};

/// Adapter wired to the ONNX Runtime bindings for both task kinds.
pub fn adapter() -> Adapter {
    Adapter::new(classification_module(), regression_module())
}

/// Capability record for classification models.
pub fn classification_module() -> TaskModule {
    TaskModule {
        load: Some(load_classification),
        predict_full: Some(predict_classification),
        predict_positional: None,
        save: Some(save_artifact),
    }
}

/// Capability record for regression models.
pub fn regression_module() -> TaskModule {
    TaskModule {
        load: Some(load_regression),
        predict_full: Some(predict_regression),
        predict_positional: None,
        save: Some(save_artifact),
    }
}

/// A loaded ONNX model.
///
/// The session runs `&mut`, so it sits behind a lock; metadata attributes are
/// captured at load time so `describe` stays infallible.
pub struct OrtModel {
    name: String,
    source: PathBuf,
    task: TaskKind,
    input_name: String,
    session: Mutex<Session>,
    estimator: Option<AttrValue>,
}

impl fmt::Debug for OrtModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrtModel")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("task", &self.task)
            .field("input_name", &self.input_name)
            .finish()
    }
}

fn backend_err(err: impl fmt::Display) -> AdapterError {
    AdapterError::Backend(err.to_string())
}

fn ensure_runtime() -> Result<()> {
    static INIT: OnceLock<()> = OnceLock::new();
    init_once(&INIT, || {
        ort::init().commit().map(|_| ()).map_err(backend_err)
    })
}

/// Run `init` until it succeeds once; only the success is cached, so a
/// failed attempt is retried on the next call.
fn init_once(cell: &OnceLock<()>, init: impl FnOnce() -> Result<()>) -> Result<()> {
    if cell.get().is_some() {
        return Ok(());
    }
    init()?;
    let _ = cell.set(());
    Ok(())
}

fn load_classification(path: &Path) -> Result<Arc<dyn ModelHandle>> {
    load_session(path, TaskKind::Classification)
}

fn load_regression(path: &Path) -> Result<Arc<dyn ModelHandle>> {
    load_session(path, TaskKind::Regression)
}

fn load_session(path: &Path, task: TaskKind) -> Result<Arc<dyn ModelHandle>> {
    ensure_runtime()?;

    let session = Session::builder()
        .map_err(backend_err)?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(backend_err)?
        .commit_from_file(path)
        .map_err(|e| AdapterError::Backend(format!("failed to load model from {}: {e}", path.display())))?;

    let input_name = session
        .inputs
        .first()
        .map(|i| i.name.clone())
        .unwrap_or_else(|| "float_input".to_string());

    let estimator = match session.metadata() {
        Ok(metadata) => metadata
            .producer()
            .ok()
            .filter(|p| !p.is_empty())
            .map(|p| AttrValue::Readable(json!(p))),
        Err(_) => Some(AttrValue::Unreadable),
    };

    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    info!(model = %name, path = %path.display(), input = %input_name, task = %task, "Loaded ONNX model");

    Ok(Arc::new(OrtModel {
        name,
        source: path.to_path_buf(),
        task,
        input_name,
        session: Mutex::new(session),
        estimator,
    }))
}

impl OrtModel {
    /// Run the session on the frame's feature matrix and hand the outputs to
    /// `extract` while the session lock is held.
    fn with_outputs<T>(
        &self,
        frame: &DataFrame,
        extract: impl FnOnce(&SessionOutputs) -> Result<T>,
    ) -> Result<T> {
        let (shape, data) = feature_matrix(frame)?;
        let tensor = Tensor::from_array((shape, data)).map_err(backend_err)?;
        let mut session = self
            .session
            .lock()
            .map_err(|_| AdapterError::Backend("model session lock poisoned".to_string()))?;
        let outputs = session
            .run(ort::inputs![&self.input_name => tensor])
            .map_err(backend_err)?;
        extract(&outputs)
    }
}

impl ModelHandle for OrtModel {
    fn class_name(&self) -> &str {
        "OnnxSession"
    }

    fn attribute(&self, name: &str) -> Option<AttrValue> {
        match name {
            "_name" => Some(AttrValue::Readable(json!(self.name))),
            "model_type" => Some(AttrValue::Readable(json!(self.task.to_string()))),
            "estimator" => self.estimator.clone(),
            "meta" => Some(AttrValue::Readable(json!({
                "format": "onnx",
                "source": self.source.display().to_string(),
            }))),
            _ => None,
        }
    }

    fn predict(&self, frame: &DataFrame) -> Result<Series> {
        let rows = frame.height();
        self.with_outputs(frame, |outputs| label_series(outputs, rows))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn downcast(handle: &dyn ModelHandle) -> Result<&OrtModel> {
    handle.as_any().downcast_ref::<OrtModel>().ok_or_else(|| {
        AdapterError::Backend("model handle was not produced by the onnx bindings".to_string())
    })
}

fn predict_classification(handle: &dyn ModelHandle, frame: &DataFrame) -> Result<DataFrame> {
    let model = downcast(handle)?;
    let rows = frame.height();
    model.with_outputs(frame, |outputs| {
        let labels = label_series(outputs, rows)?;
        let scores = score_series(outputs, rows)?;
        Ok(DataFrame::new(vec![
            labels.with_name("Label".into()).into(),
            scores.with_name("Score".into()).into(),
        ])?)
    })
}

fn predict_regression(handle: &dyn ModelHandle, frame: &DataFrame) -> Result<DataFrame> {
    let model = downcast(handle)?;
    let rows = frame.height();
    model.with_outputs(frame, |outputs| {
        let (_, value) = outputs
            .iter()
            .next()
            .ok_or_else(|| AdapterError::Backend("model produced no outputs".to_string()))?;
        let labels = series_from_tensor(&value, rows)?;
        Ok(DataFrame::new(vec![labels.with_name("Label".into()).into()])?)
    })
}

/// Saving an ONNX model is copying its artifact bytes.
fn save_artifact(handle: &dyn ModelHandle, path: &Path) -> Result<PathBuf> {
    let model = downcast(handle)?;
    std::fs::copy(&model.source, path)?;
    Ok(path.to_path_buf())
}

/// Row-major f32 matrix of the frame's columns, cast as needed.
fn feature_matrix(frame: &DataFrame) -> Result<(Vec<i64>, Vec<f32>)> {
    let height = frame.height();
    let width = frame.width();

    let mut casts = Vec::with_capacity(width);
    for col in frame.get_columns() {
        casts.push(col.cast(&DataType::Float32)?);
    }

    let mut data = Vec::with_capacity(height * width);
    for row in 0..height {
        for cast in &casts {
            let value = cast.f32()?.get(row).unwrap_or(f32::NAN);
            data.push(value);
        }
    }
    Ok((vec![height as i64, width as i64], data))
}

/// Label column: the output named like `label` if present, else the first
/// output. Integer and float tensors are both accepted.
fn label_series(outputs: &SessionOutputs, rows: usize) -> Result<Series> {
    for (name, value) in outputs.iter() {
        if name.to_ascii_lowercase().contains("label") {
            return series_from_tensor(&value, rows);
        }
    }
    let (_, value) = outputs
        .iter()
        .next()
        .ok_or_else(|| AdapterError::Backend("model produced no outputs".to_string()))?;
    series_from_tensor(&value, rows)
}

fn series_from_tensor(value: &DynValue, rows: usize) -> Result<Series> {
    if let Ok((_, data)) = value.try_extract_tensor::<i64>() {
        return tensor_column(data, rows).map(|v| Series::new("Label".into(), v));
    }
    if let Ok((_, data)) = value.try_extract_tensor::<f32>() {
        let values: Vec<f64> = tensor_column(data, rows)?
            .into_iter()
            .map(f64::from)
            .collect();
        return Ok(Series::new("Label".into(), values));
    }
    Err(AdapterError::Backend(
        "model output is neither an int64 nor a float32 tensor".to_string(),
    ))
}

fn tensor_column<T: Copy>(data: &[T], rows: usize) -> Result<Vec<T>> {
    if data.len() < rows {
        return Err(AdapterError::Backend(format!(
            "model produced {} values for {} input rows",
            data.len(),
            rows
        )));
    }
    // Shape [n] or [n, 1]; stride past per-row extras if the exporter padded.
    let stride = data.len() / rows.max(1);
    Ok((0..rows).map(|i| data[i * stride.max(1)]).collect())
}

/// Score column: max class probability per row, from a float tensor or a
/// `seq(map(int64,float))` output.
fn score_series(outputs: &SessionOutputs, rows: usize) -> Result<Series> {
    for (name, value) in outputs.iter() {
        if name.to_ascii_lowercase().contains("label") {
            continue;
        }
        if let Ok((shape, data)) = value.try_extract_tensor::<f32>() {
            return Ok(Series::new(
                "Score".into(),
                probabilities_from_tensor(shape, data, rows)?,
            ));
        }
        let dtype = value.dtype();
        if DynSequenceValueType::can_downcast(&dtype) {
            return scores_from_sequence(&value, rows);
        }
    }
    Err(AdapterError::Backend(
        "classification model produced no probability output".to_string(),
    ))
}

fn probabilities_from_tensor(
    shape: &ort::tensor::Shape,
    data: &[f32],
    rows: usize,
) -> Result<Vec<f64>> {
    let dims: Vec<i64> = shape.iter().copied().collect();
    let classes = match dims.as_slice() {
        [_, k] if *k > 0 => *k as usize,
        _ => 1,
    };
    if data.len() < rows * classes {
        return Err(AdapterError::Backend(format!(
            "probability tensor has {} values for {} input rows",
            data.len(),
            rows
        )));
    }
    Ok((0..rows)
        .map(|row| {
            data[row * classes..row * classes + classes]
                .iter()
                .copied()
                .fold(f32::MIN, f32::max) as f64
        })
        .collect())
}

fn scores_from_sequence(value: &DynValue, rows: usize) -> Result<Series> {
    let allocator = Allocator::default();
    let sequence = value
        .downcast_ref::<DynSequenceValueType>()
        .map_err(backend_err)?;
    let maps = sequence
        .try_extract_sequence::<DynMapValueType>(&allocator)
        .map_err(backend_err)?;
    if maps.len() < rows {
        return Err(AdapterError::Backend(format!(
            "probability sequence has {} entries for {} input rows",
            maps.len(),
            rows
        )));
    }

    let mut scores = Vec::with_capacity(rows);
    for map_value in maps.iter().take(rows) {
        let pairs = map_value
            .try_extract_key_values::<i64, f32>()
            .map_err(backend_err)?;
        let best = pairs
            .iter()
            .map(|(_, prob)| *prob)
            .fold(f32::MIN, f32::max);
        scores.push(best as f64);
    }
    Ok(Series::new("Score".into(), scores))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_matrix_is_row_major() {
        let frame = df!("a" => [1i64, 2], "b" => [10.0f64, 20.0]).unwrap();
        let (shape, data) = feature_matrix(&frame).unwrap();
        assert_eq!(shape, vec![2, 2]);
        assert_eq!(data, vec![1.0, 10.0, 2.0, 20.0]);
    }

    #[test]
    fn test_tensor_column_strides_past_padding() {
        // Shape [3, 1] flattened
        assert_eq!(tensor_column(&[1i64, 2, 3], 3).unwrap(), vec![1, 2, 3]);
        // Shape [2, 2]: take the first value per row
        assert_eq!(tensor_column(&[1i64, 9, 2, 9], 2).unwrap(), vec![1, 2]);
        assert!(tensor_column(&[1i64], 3).is_err());
    }

    #[test]
    fn test_init_once_retries_after_failure() {
        use std::cell::Cell;

        let cell = OnceLock::new();
        let attempts = Cell::new(0u32);
        let attempts = &attempts;
        let flaky = |ok: bool| {
            move || {
                attempts.set(attempts.get() + 1);
                if ok {
                    Ok(())
                } else {
                    Err(AdapterError::Backend("runtime unavailable".to_string()))
                }
            }
        };

        // A failure is not cached: the next call tries again.
        assert!(init_once(&cell, flaky(false)).is_err());
        assert!(init_once(&cell, flaky(true)).is_ok());
        assert_eq!(attempts.get(), 2);

        // The success is cached: no further attempts.
        assert!(init_once(&cell, flaky(false)).is_ok());
        assert_eq!(attempts.get(), 2);
    }

    #[test]
    fn test_modules_expose_all_capabilities() {
        for module in [classification_module(), regression_module()] {
            assert!(module.load.is_some());
            assert!(module.predict_full.is_some());
            assert!(module.save.is_some());
        }
    }
}
