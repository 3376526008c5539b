//! ONNX Runtime backend
//!
//! Any regressor exported to ONNX with a `[1, 9]` float input and a single
//! scalar output. ONNX graphs carry no tree statistics, so attribution goes
//! through [`CoalitionExplainer`] against a background row read from a JSON
//! sidecar: `{"background": [9 numbers in feature order]}`.

use std::fs;
use std::path::Path;

use ndarray::Array2;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use parking_lot::Mutex;
use serde::Deserialize;

use super::{CoalitionExplainer, ModelError, RowPredictor};
use crate::error::LoadError;
use crate::features::{FeatureVector, FEATURE_COUNT};

pub type OnnxModel = CoalitionExplainer<OnnxSession>;

/// Session + resolved output name. Running needs `&mut Session`.
pub struct OnnxSession {
    session: Mutex<Session>,
    output_name: String,
}

#[derive(Debug, Deserialize)]
struct BackgroundFile {
    background: Vec<f64>,
}

impl OnnxSession {
    pub fn load(model_path: &Path) -> Result<Self, LoadError> {
        let onnx_error = |stage: &str, e: String| {
            LoadError::UnsupportedModel(format!("{} ({}): {}", stage, model_path.display(), e))
        };

        if !model_path.exists() {
            return Err(LoadError::Io {
                path: model_path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "model not found"),
            });
        }

        let session = Session::builder()
            .map_err(|e| onnx_error("session builder", e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| onnx_error("optimization level", e.to_string()))?
            .commit_from_file(model_path)
            .map_err(|e| onnx_error("load", e.to_string()))?;

        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| LoadError::UnsupportedModel("ONNX graph defines no output".to_string()))?;

        log::info!("ONNX model loaded, output '{}'", output_name);

        Ok(Self {
            session: Mutex::new(session),
            output_name,
        })
    }
}

impl RowPredictor for OnnxSession {
    fn predict_row(&self, row: &[f64; FEATURE_COUNT]) -> Result<f64, ModelError> {
        let input: Vec<f32> = row.iter().map(|v| *v as f32).collect();
        let input_array = Array2::<f32>::from_shape_vec((1, FEATURE_COUNT), input)
            .map_err(|e| ModelError::Evaluation(format!("Array error: {}", e)))?;
        let input_tensor = Value::from_array(input_array)
            .map_err(|e| ModelError::Evaluation(format!("Tensor error: {}", e)))?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![input_tensor])
            .map_err(|e| ModelError::Evaluation(format!("Inference failed: {}", e)))?;

        let output = outputs
            .get(&self.output_name)
            .ok_or_else(|| ModelError::Evaluation("No output".to_string()))?;
        let (_, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| ModelError::Evaluation(format!("Extract error: {}", e)))?;

        match data {
            [value] => Ok(*value as f64),
            other => Err(ModelError::OutputShape { actual: other.len() }),
        }
    }
}

fn read_background(path: &Path) -> Result<FeatureVector, LoadError> {
    let data = fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let file: BackgroundFile = serde_json::from_slice(&data).map_err(|source| LoadError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    let values: [f64; FEATURE_COUNT] = file.background.as_slice().try_into().map_err(|_| {
        LoadError::MalformedModel(format!(
            "background row in {} has {} values, expected {}",
            path.display(),
            file.background.len(),
            FEATURE_COUNT
        ))
    })?;
    Ok(FeatureVector::from_values(values))
}

pub fn load(model_path: &Path, background_path: &Path) -> Result<OnnxModel, LoadError> {
    let session = OnnxSession::load(model_path)?;
    let background = read_background(background_path)?;
    let description = format!("ONNX graph {}", model_path.display());
    Ok(CoalitionExplainer::new(session, background, description))
}
