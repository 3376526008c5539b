//! Error taxonomy
//!
//! Every pipeline failure is classified as caused by the caller, caused by
//! an inconsistent deployment, or unclassified. The HTTP layer maps the
//! class to a status code.

use std::path::PathBuf;

use thiserror::Error;

use crate::explain::{ArtifactError, ChartError};
use crate::features::layout::LayoutMismatchError;
use crate::model::ModelError;

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Who is responsible for a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Fixable by the caller
    Client,
    /// Artifact set or model is inconsistent
    Server,
    /// Anything else; the message is kept for diagnostics
    Unclassified,
}

/// Per-request failure of one pipeline stage
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Invalid {field}: '{value}'. Valid options: {}", .options.join(", "))]
    UnknownCategory {
        field: String,
        value: String,
        options: Vec<String>,
    },

    #[error("No data for city code {code} (decoded: {city}). Valid cities: {}", .valid_cities.join(", "))]
    UnknownCity {
        code: i64,
        city: String,
        valid_cities: Vec<String>,
    },

    #[error("LabelEncoder for {0} not found")]
    MissingEncoder(String),

    #[error("Cannot compute Price_per_sqm: invalid data in reference dataset")]
    CorruptReference,

    #[error("Predicted price is negative ({0}), which is invalid")]
    NegativePrediction(f64),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Chart(#[from] ChartError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

impl PipelineError {
    pub fn class(&self) -> ErrorClass {
        match self {
            PipelineError::InvalidInput(_)
            | PipelineError::UnknownCategory { .. }
            | PipelineError::UnknownCity { .. } => ErrorClass::Client,
            PipelineError::MissingEncoder(_)
            | PipelineError::CorruptReference
            | PipelineError::NegativePrediction(_) => ErrorClass::Server,
            PipelineError::Model(_) | PipelineError::Chart(_) | PipelineError::Artifact(_) => {
                ErrorClass::Unclassified
            }
        }
    }

    /// Values that would have avoided a client failure, when there is such a set
    pub fn valid_options(&self) -> Option<&[String]> {
        match self {
            PipelineError::UnknownCategory { options, .. } => Some(options),
            PipelineError::UnknownCity { valid_cities, .. } => Some(valid_cities),
            _ => None,
        }
    }
}

/// Fatal problem with one of the startup artifacts
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Missing file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Malformed CSV in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Column '{column}' missing in {path}")]
    MissingColumn { path: PathBuf, column: String },

    #[error("Invalid City code '{value}' in {path} at record {record}")]
    InvalidCityCode {
        path: PathBuf,
        record: usize,
        value: String,
    },

    #[error("Unsupported model: {0}")]
    UnsupportedModel(String),

    #[error("Malformed model: {0}")]
    MalformedModel(String),

    #[error(transparent)]
    Layout(#[from] LayoutMismatchError),
}
