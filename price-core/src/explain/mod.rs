//! Explain Module - turning an attribution into something a person reads
//!
//! - `summary` - plain-text factor list
//! - `chart` - waterfall chart rasterisation
//! - `artifact` - JPEG encoding + write-once artifact storage

pub mod artifact;
pub mod chart;
pub mod summary;

use serde::Serialize;

use crate::encoding::{CategoricalField, EncoderTable};
use crate::features::{FeatureVector, FEATURE_LAYOUT};
use crate::model::Attribution;

pub use artifact::{encode_jpeg, ArtifactError, ArtifactStore, FsArtifactStore};
pub use chart::{ChartError, ChartFont, ChartRenderer};
pub use summary::describe;

/// One feature's share of the prediction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contribution {
    pub feature: &'static str,
    /// Value fed to the model (category code for categoricals)
    pub value: f64,
    /// Decoded category for categorical features
    pub label: Option<String>,
    /// Attribution; positive pushes the price up
    pub shap: f64,
}

impl Contribution {
    pub fn increases_price(&self) -> bool {
        self.shap > 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Explanation {
    pub base_value: f64,
    pub prediction: f64,
    /// In FEATURE_LAYOUT order
    pub contributions: Vec<Contribution>,
}

impl Explanation {
    pub fn new(
        features: &FeatureVector,
        attribution: &Attribution,
        prediction: f64,
        encoders: &EncoderTable,
    ) -> Self {
        let contributions = FEATURE_LAYOUT
            .iter()
            .zip(features.as_array())
            .zip(&attribution.values)
            .map(|((&feature, &value), &shap)| {
                let label = CategoricalField::from_column(feature)
                    .and_then(|field| encoders.decode(field, value as i64))
                    .map(str::to_string);
                Contribution { feature, value, label, shap }
            })
            .collect();

        Self {
            base_value: attribution.base_value,
            prediction,
            contributions,
        }
    }

    /// Largest absolute contribution first
    pub fn by_magnitude(&self) -> Vec<&Contribution> {
        let mut sorted: Vec<&Contribution> = self.contributions.iter().collect();
        sorted.sort_by(|a, b| b.shap.abs().total_cmp(&a.shap.abs()));
        sorted
    }
}
