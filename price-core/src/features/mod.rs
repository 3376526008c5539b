//! Features Module - model input schema
//!
//! - `layout` - authoritative column order + version/hash
//! - `vector` - the assembled single-row input

pub mod layout;
pub mod vector;

pub use layout::{feature_name, LayoutInfo, FEATURE_COUNT, FEATURE_LAYOUT};
pub use vector::FeatureVector;
