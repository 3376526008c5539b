//! Model Module - price regressor + per-feature attribution
//!
//! - `tree` - native tree ensemble with exact TreeSHAP
//! - `xgboost` - XGBoost JSON loader producing a tree ensemble
//! - `coalition` - exact Shapley values for predict-only models
//! - `onnx` - ONNX Runtime backend (feature `onnx`)
//!
//! Backends are interchangeable behind [`PriceModel`]; the pipeline never
//! knows which one it talks to.

mod shap;

pub mod coalition;
pub mod tree;
pub mod xgboost;

#[cfg(feature = "onnx")]
pub mod onnx;

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::LoadError;
use crate::features::{FeatureVector, FEATURE_COUNT};

pub use coalition::{CoalitionExplainer, RowPredictor};
pub use tree::{RegressionTree, TreeEnsemble};

// ============================================================================
// CAPABILITY
// ============================================================================

/// A trained regressor that can also explain its own output
pub trait PriceModel: Send + Sync {
    fn info(&self) -> ModelInfo;

    /// Single-row prediction
    fn predict(&self, features: &FeatureVector) -> Result<f64, ModelError>;

    /// Per-feature contributions against the model's baseline output
    fn attribute(&self, features: &FeatureVector) -> Result<Attribution, ModelError>;
}

/// Additive explanation: `base_value + Σ values ≈ prediction`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Attribution {
    /// Expected model output
    pub base_value: f64,
    /// Contributions in FEATURE_LAYOUT order
    pub values: [f64; FEATURE_COUNT],
}

impl Attribution {
    /// Output reconstructed from the attribution
    pub fn total(&self) -> f64 {
        self.base_value + self.values.iter().sum::<f64>()
    }
}

/// Shown on the health endpoint
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub kind: String,
    pub description: String,
    pub loaded_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model evaluation failed: {0}")]
    Evaluation(String),

    #[error("Model returned {actual} outputs, expected 1")]
    OutputShape { actual: usize },
}

// ============================================================================
// LOADING
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelFormat {
    XgboostJson,
    Onnx,
}

impl fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelFormat::XgboostJson => write!(f, "xgboost-json"),
            ModelFormat::Onnx => write!(f, "onnx"),
        }
    }
}

impl FromStr for ModelFormat {
    type Err = LoadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "xgboost-json" | "xgboost" | "json" => Ok(ModelFormat::XgboostJson),
            "onnx" => Ok(ModelFormat::Onnx),
            other => Err(LoadError::UnsupportedModel(format!(
                "unknown model format '{}' (expected xgboost-json or onnx)",
                other
            ))),
        }
    }
}

/// Load the trained model. `background` is only read by predict-only backends.
pub fn load(
    format: ModelFormat,
    path: &Path,
    background: Option<&Path>,
) -> Result<Arc<dyn PriceModel>, LoadError> {
    log::info!("Loading {} model from: {}", format, path.display());

    match (format, background) {
        (ModelFormat::XgboostJson, _) => {
            let ensemble = xgboost::load(path)?;
            Ok(Arc::new(ensemble))
        }
        #[cfg(feature = "onnx")]
        (ModelFormat::Onnx, background) => {
            let background = background.ok_or_else(|| {
                LoadError::UnsupportedModel("ONNX models need a background row file".to_string())
            })?;
            let model = onnx::load(path, background)?;
            Ok(Arc::new(model))
        }
        #[cfg(not(feature = "onnx"))]
        (ModelFormat::Onnx, _background) => Err(LoadError::UnsupportedModel(
            "ONNX support was not compiled in (enable the `onnx` feature)".to_string(),
        )),
    }
}
