//! Feature Layout - Centralized Feature Definition
//!
//! **This file controls the model input schema.**
//!
//! The regression model was trained on these columns in exactly this order
//! and attribution values are keyed by position, so:
//! 1. Add feature → increment FEATURE_VERSION
//! 2. Change order → increment FEATURE_VERSION
//! 3. Remove feature → increment FEATURE_VERSION

use crc32fast::Hasher;
use serde::{Deserialize, Serialize};

// ============================================================================
// FEATURE VERSION
// ============================================================================

/// Current feature layout version
pub const FEATURE_VERSION: u8 = 1;

// ============================================================================
// FEATURE LAYOUT (Authoritative source)
// ============================================================================

/// Column names in the exact order the model expects them
pub const FEATURE_LAYOUT: &[&str] = &[
    "Type",          // 0: property type code
    "Bedrooms",      // 1
    "Bathrooms",     // 2
    "Area",          // 3: square metres
    "Furnished",     // 4: furnished code
    "Level",         // 5: floor level
    "Delivery_Term", // 6: delivery term code
    "City",          // 7: city code
    "Price_per_sqm", // 8: derived from the reference dataset
];

/// Total number of features
/// IMPORTANT: Must match FEATURE_LAYOUT.len()!
pub const FEATURE_COUNT: usize = 9;

pub const TYPE: usize = 0;
pub const BEDROOMS: usize = 1;
pub const BATHROOMS: usize = 2;
pub const AREA: usize = 3;
pub const FURNISHED: usize = 4;
pub const LEVEL: usize = 5;
pub const DELIVERY_TERM: usize = 6;
pub const CITY: usize = 7;
pub const PRICE_PER_SQM: usize = 8;

// ============================================================================
// LAYOUT HASH
// ============================================================================

/// CRC32 over the version byte and the ordered column names
pub fn compute_layout_hash() -> u32 {
    let mut hasher = Hasher::new();

    hasher.update(&[FEATURE_VERSION]);

    for name in FEATURE_LAYOUT {
        hasher.update(name.as_bytes());
        hasher.update(&[0]); // Separator
    }

    hasher.finalize()
}

pub fn layout_hash() -> u32 {
    compute_layout_hash()
}

// ============================================================================
// LAYOUT INFO
// ============================================================================

/// Layout summary reported by the health endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutInfo {
    pub version: u8,
    pub hash: u32,
    pub feature_count: usize,
    pub feature_names: Vec<String>,
}

impl LayoutInfo {
    pub fn current() -> Self {
        Self {
            version: FEATURE_VERSION,
            hash: layout_hash(),
            feature_count: FEATURE_COUNT,
            feature_names: FEATURE_LAYOUT.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Default for LayoutInfo {
    fn default() -> Self {
        Self::current()
    }
}

// ============================================================================
// LAYOUT VALIDATION
// ============================================================================

/// A model declared a different column order than [`FEATURE_LAYOUT`]
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutMismatchError {
    pub expected: Vec<String>,
    pub actual: Vec<String>,
}

impl std::fmt::Display for LayoutMismatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Feature layout mismatch: expected [{}], got [{}]",
            self.expected.join(", "),
            self.actual.join(", ")
        )
    }
}

impl std::error::Error for LayoutMismatchError {}

/// Check a model's declared feature names against the current layout.
/// An empty list means the model carries no names and is accepted.
pub fn validate_feature_names(names: &[String]) -> Result<(), LayoutMismatchError> {
    if names.is_empty() {
        return Ok(());
    }

    let matches = names.len() == FEATURE_COUNT
        && names.iter().zip(FEATURE_LAYOUT.iter()).all(|(a, b)| a == b);

    if matches {
        Ok(())
    } else {
        Err(LayoutMismatchError {
            expected: FEATURE_LAYOUT.iter().map(|s| s.to_string()).collect(),
            actual: names.to_vec(),
        })
    }
}

// ============================================================================
// FEATURE NAME LOOKUP
// ============================================================================

/// Get feature name by index
pub fn feature_name(index: usize) -> Option<&'static str> {
    FEATURE_LAYOUT.get(index).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_count() {
        assert_eq!(FEATURE_COUNT, 9);
        assert_eq!(FEATURE_LAYOUT.len(), FEATURE_COUNT);
    }

    #[test]
    fn test_training_column_order() {
        assert_eq!(
            FEATURE_LAYOUT,
            &[
                "Type", "Bedrooms", "Bathrooms", "Area", "Furnished",
                "Level", "Delivery_Term", "City", "Price_per_sqm",
            ]
        );
        assert_eq!(feature_name(CITY), Some("City"));
        assert_eq!(feature_name(PRICE_PER_SQM), Some("Price_per_sqm"));
        assert_eq!(feature_name(DELIVERY_TERM), Some("Delivery_Term"));
    }

    #[test]
    fn test_layout_hash_consistency() {
        assert_eq!(compute_layout_hash(), compute_layout_hash());
        assert_ne!(layout_hash(), 0);
    }

    #[test]
    fn test_validate_feature_names() {
        let names: Vec<String> = FEATURE_LAYOUT.iter().map(|s| s.to_string()).collect();
        assert!(validate_feature_names(&names).is_ok());
        assert!(validate_feature_names(&[]).is_ok());

        let mut swapped = names.clone();
        swapped.swap(TYPE, CITY);
        let err = validate_feature_names(&swapped).unwrap_err();
        assert_eq!(err.actual[0], "City");

        assert!(validate_feature_names(&names[..8]).is_err());
    }

    #[test]
    fn test_feature_lookup_unknown() {
        assert_eq!(feature_name(100), None);
    }

    #[test]
    fn test_layout_info() {
        let info = LayoutInfo::current();
        assert_eq!(info.version, FEATURE_VERSION);
        assert_eq!(info.feature_count, FEATURE_COUNT);
        assert_eq!(info.feature_names.len(), FEATURE_COUNT);
    }
}
