//! Inbound request schema and numeric validation

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationErrors};

use crate::error::PipelineError;

/// Property attributes submitted by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct PredictionRequest {
    pub city: String,
    pub property_type: String,
    pub furnished: String,
    pub delivery_term: String,

    #[validate(range(min = 0, message = "Bedrooms must be non-negative"))]
    pub bedrooms: i64,

    #[validate(range(min = 0, message = "Bathrooms must be non-negative"))]
    pub bathrooms: i64,

    #[validate(range(exclusive_min = 0.0, message = "Area must be positive"))]
    pub area: f64,

    #[validate(range(min = 0, message = "Level must be non-negative"))]
    pub level: i64,
}

/// Order in which violations are reported
const FIELD_ORDER: [&str; 4] = ["bedrooms", "bathrooms", "area", "level"];

impl PredictionRequest {
    /// Reject out-of-range numerics before anything touches the model.
    pub fn check(&self) -> Result<(), PipelineError> {
        // NaN slips through range comparisons
        if !self.area.is_finite() {
            return Err(PipelineError::InvalidInput("Area must be positive".to_string()));
        }

        self.validate()
            .map_err(|errors| PipelineError::InvalidInput(describe(&errors)))
    }
}

fn describe(errors: &ValidationErrors) -> String {
    let mut messages: Vec<(usize, String)> = Vec::new();

    for (field, field_errors) in errors.field_errors() {
        let field: &str = field.as_ref();
        let rank = FIELD_ORDER
            .iter()
            .position(|f| *f == field)
            .unwrap_or(FIELD_ORDER.len());

        for error in field_errors.iter() {
            let message = error
                .message
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| format!("{} is out of range", field));
            messages.push((rank, message));
        }
    }

    messages.sort();
    messages
        .into_iter()
        .map(|(_, m)| m)
        .collect::<Vec<_>>()
        .join("; ")
}
