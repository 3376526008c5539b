//! Feature Vector - the single model input row
//!
//! Values are stored in [`FEATURE_LAYOUT`] order. Attribution results are
//! positionally keyed to the same order.

use serde::{Deserialize, Serialize};

use super::layout::{
    self, FEATURE_COUNT, FEATURE_LAYOUT, FEATURE_VERSION,
};
use crate::encoding::EncodedCategories;
use crate::pipeline::PredictionRequest;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Feature layout version
    pub version: u8,
    /// Feature values in order defined by FEATURE_LAYOUT
    pub values: [f64; FEATURE_COUNT],
}

impl FeatureVector {
    pub fn from_values(values: [f64; FEATURE_COUNT]) -> Self {
        Self {
            version: FEATURE_VERSION,
            values,
        }
    }

    /// Build the model row from a validated request, its category codes and
    /// the derived Price_per_sqm.
    pub fn assemble(request: &PredictionRequest, codes: &EncodedCategories, price_per_sqm: f64) -> Self {
        let mut values = [0.0f64; FEATURE_COUNT];
        values[layout::TYPE] = codes.property_type as f64;
        values[layout::BEDROOMS] = request.bedrooms as f64;
        values[layout::BATHROOMS] = request.bathrooms as f64;
        values[layout::AREA] = request.area;
        values[layout::FURNISHED] = codes.furnished as f64;
        values[layout::LEVEL] = request.level as f64;
        values[layout::DELIVERY_TERM] = codes.delivery_term as f64;
        values[layout::CITY] = codes.city as f64;
        values[layout::PRICE_PER_SQM] = price_per_sqm;
        Self::from_values(values)
    }

    pub fn as_array(&self) -> &[f64; FEATURE_COUNT] {
        &self.values
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.values.get(index).copied()
    }

    /// (name, value) pairs in column order
    pub fn named(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        FEATURE_LAYOUT.iter().copied().zip(self.values.iter().copied())
    }

    /// JSON form for debug logging
    pub fn to_log_entry(&self) -> serde_json::Value {
        serde_json::json!({
            "feature_version": self.version,
            "layout_hash": layout::layout_hash(),
            "named_values": self
                .named()
                .map(|(name, value)| (name.to_string(), value))
                .collect::<std::collections::BTreeMap<_, _>>(),
        })
    }
}
