//! Categorical Encoder Adapter
//!
//! Maps human-readable category strings to the integer codes the model was
//! trained on. A category's code is its position in the field's list, the
//! same convention label encoders use for their `classes_`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{LoadError, PipelineError};
use crate::pipeline::PredictionRequest;

/// The four categorical model inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CategoricalField {
    City,
    Type,
    Furnished,
    DeliveryTerm,
}

impl CategoricalField {
    /// Encoding order; the first failing field is the one reported
    pub const ALL: [CategoricalField; 4] = [
        CategoricalField::City,
        CategoricalField::Type,
        CategoricalField::Furnished,
        CategoricalField::DeliveryTerm,
    ];

    /// Column name used by the encoder table and the model
    pub fn column(&self) -> &'static str {
        match self {
            CategoricalField::City => "City",
            CategoricalField::Type => "Type",
            CategoricalField::Furnished => "Furnished",
            CategoricalField::DeliveryTerm => "Delivery_Term",
        }
    }

    pub fn from_column(column: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.column() == column)
    }

    fn submitted<'a>(&self, request: &'a PredictionRequest) -> &'a str {
        match self {
            CategoricalField::City => &request.city,
            CategoricalField::Type => &request.property_type,
            CategoricalField::Furnished => &request.furnished,
            CategoricalField::DeliveryTerm => &request.delivery_term,
        }
    }
}

/// Integer codes for one request, covering all four fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedCategories {
    pub city: i64,
    pub property_type: i64,
    pub furnished: i64,
    pub delivery_term: i64,
}

impl EncodedCategories {
    pub fn get(&self, field: CategoricalField) -> i64 {
        match field {
            CategoricalField::City => self.city,
            CategoricalField::Type => self.property_type,
            CategoricalField::Furnished => self.furnished,
            CategoricalField::DeliveryTerm => self.delivery_term,
        }
    }

    /// Field name → code
    pub fn as_map(&self) -> BTreeMap<&'static str, i64> {
        CategoricalField::ALL
            .iter()
            .map(|f| (f.column(), self.get(*f)))
            .collect()
    }
}

/// Fixed category ↔ code mapping, loaded once and shared read-only
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncoderTable {
    classes: BTreeMap<String, Vec<String>>,
}

impl EncoderTable {
    pub fn new(classes: BTreeMap<String, Vec<String>>) -> Self {
        Self { classes }
    }

    /// Load `{"City": [...], "Type": [...], ...}` from disk
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let data = fs::read(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let table: EncoderTable = serde_json::from_slice(&data).map_err(|source| LoadError::Json {
            path: path.to_path_buf(),
            source,
        })?;

        for field in CategoricalField::ALL {
            match table.classes(field) {
                Some(classes) => log::info!(
                    "Encoder {}: {} categories",
                    field.column(),
                    classes.len()
                ),
                None => log::warn!(
                    "Encoder table {} has no entry for {}; requests will fail",
                    path.display(),
                    field.column()
                ),
            }
        }

        Ok(table)
    }

    /// Valid categories for a field, in code order
    pub fn classes(&self, field: CategoricalField) -> Option<&[String]> {
        self.classes.get(field.column()).map(|c| c.as_slice())
    }

    /// Encode one submitted value.
    ///
    /// A field without a table entry means the deployed artifacts are
    /// inconsistent, which is a server error rather than a caller error.
    pub fn encode(&self, field: CategoricalField, value: &str) -> Result<i64, PipelineError> {
        let classes = self
            .classes(field)
            .ok_or_else(|| PipelineError::MissingEncoder(field.column().to_string()))?;

        classes
            .iter()
            .position(|c| c == value)
            .map(|code| code as i64)
            .ok_or_else(|| PipelineError::UnknownCategory {
                field: field.column().to_string(),
                value: value.to_string(),
                options: classes.to_vec(),
            })
    }

    /// Reverse lookup used when rendering explanations
    pub fn decode(&self, field: CategoricalField, code: i64) -> Option<&str> {
        let index = usize::try_from(code).ok()?;
        self.classes(field)?.get(index).map(|s| s.as_str())
    }

    pub fn encode_request(&self, request: &PredictionRequest) -> Result<EncodedCategories, PipelineError> {
        let mut codes = [0i64; 4];
        for (slot, field) in codes.iter_mut().zip(CategoricalField::ALL) {
            *slot = self.encode(field, field.submitted(request))?;
        }

        Ok(EncodedCategories {
            city: codes[0],
            property_type: codes[1],
            furnished: codes[2],
            delivery_term: codes[3],
        })
    }

    /// Every valid city name, as listed by the encoder
    pub fn valid_cities(&self) -> Vec<String> {
        self.classes(CategoricalField::City)
            .map(|c| c.to_vec())
            .unwrap_or_default()
    }
}
