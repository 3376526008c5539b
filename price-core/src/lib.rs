//! Price Core - property price prediction with per-feature explanations
//!
//! ## Modules
//! - `pipeline` - request → prediction + explanation
//! - `encoding` - categorical label encoders
//! - `reference` - historical Price_per_sqm aggregates
//! - `features` - model input layout and row assembly
//! - `model` - regressors and attribution backends
//! - `explain` - text summary, waterfall chart, artifact storage
//! - `error` - failure taxonomy

pub mod encoding;
pub mod error;
pub mod explain;
pub mod features;
pub mod model;
pub mod pipeline;
pub mod reference;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{ErrorClass, LoadError, PipelineError};
pub use pipeline::{PredictionRequest, PredictionResponse, PricePipeline};
