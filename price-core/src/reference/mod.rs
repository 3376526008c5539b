//! Reference dataset: historical Price_per_sqm by encoded city
//!
//! Used only for aggregate lookups. Missing values (empty cells, `nan`) are
//! skipped by both the city mean and the global median.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use crate::encoding::EncoderTable;
use crate::error::{LoadError, PipelineError};

pub const CITY_COLUMN: &str = "City";
pub const PRICE_PER_SQM_COLUMN: &str = "Price_per_sqm";

/// One historical record; other CSV columns are ignored
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceRecord {
    pub city: i64,
    /// NaN when the cell was empty or not a number
    pub price_per_sqm: f64,
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(rename = "City")]
    city: String,
    #[serde(rename = "Price_per_sqm")]
    price_per_sqm: Option<String>,
}

/// Outcome of the per-city mean lookup
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CityMean {
    /// No record carries this city code
    NoRecords,
    /// Mean over the city's non-missing values
    Mean { value: f64, rows: usize },
}

#[derive(Debug, Clone, Default)]
pub struct ReferenceDataset {
    records: Vec<ReferenceRecord>,
}

impl ReferenceDataset {
    pub fn from_records(records: Vec<ReferenceRecord>) -> Self {
        Self { records }
    }

    /// Load from a CSV file with at least `City` and `Price_per_sqm` columns
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let file = File::open(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let dataset = Self::from_reader(file, path)?;

        log::info!(
            "Reference dataset loaded: {} records from {}",
            dataset.len(),
            path.display()
        );
        Ok(dataset)
    }

    pub fn from_reader<R: Read>(reader: R, origin: &Path) -> Result<Self, LoadError> {
        let csv_err = |source| LoadError::Csv {
            path: origin.to_path_buf(),
            source,
        };

        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

        let headers = reader.headers().map_err(csv_err)?.clone();
        for column in [CITY_COLUMN, PRICE_PER_SQM_COLUMN] {
            if !headers.iter().any(|h| h == column) {
                return Err(LoadError::MissingColumn {
                    path: origin.to_path_buf(),
                    column: column.to_string(),
                });
            }
        }

        let mut records = Vec::new();
        for (index, row) in reader.deserialize::<RawRecord>().enumerate() {
            let row = row.map_err(csv_err)?;
            let city = parse_city_code(&row.city).ok_or_else(|| LoadError::InvalidCityCode {
                path: origin.to_path_buf(),
                record: index + 1,
                value: row.city.clone(),
            })?;
            let price_per_sqm = row
                .price_per_sqm
                .as_deref()
                .and_then(|v| v.parse::<f64>().ok())
                .unwrap_or(f64::NAN);

            records.push(ReferenceRecord { city, price_per_sqm });
        }

        Ok(Self { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ReferenceRecord] {
        &self.records
    }

    /// Mean Price_per_sqm over the records of one encoded city
    pub fn city_mean(&self, city_code: i64) -> CityMean {
        let mut rows = 0usize;
        let mut sum = 0.0f64;
        let mut present = 0usize;

        for record in self.records.iter().filter(|r| r.city == city_code) {
            rows += 1;
            if !record.price_per_sqm.is_nan() {
                sum += record.price_per_sqm;
                present += 1;
            }
        }

        if rows == 0 {
            return CityMean::NoRecords;
        }

        let value = if present == 0 { f64::NAN } else { sum / present as f64 };
        CityMean::Mean { value, rows }
    }

    /// Median Price_per_sqm across the whole dataset; NaN when nothing is present
    pub fn global_median(&self) -> f64 {
        let mut values: Vec<f64> = self
            .records
            .iter()
            .map(|r| r.price_per_sqm)
            .filter(|v| !v.is_nan())
            .collect();

        if values.is_empty() {
            return f64::NAN;
        }

        values.sort_by(|a, b| a.total_cmp(b));
        let mid = values.len() / 2;
        if values.len() % 2 == 0 {
            (values[mid - 1] + values[mid]) / 2.0
        } else {
            values[mid]
        }
    }

    /// Derive the Price_per_sqm feature for a city.
    ///
    /// Unknown city → client error listing the encoder's cities. A city whose
    /// mean is not finite falls back to the global median, logged at WARN so
    /// upstream data-quality issues stay visible. A non-finite median means
    /// the reference data itself is corrupt.
    pub fn resolve_price_per_sqm(
        &self,
        city_code: i64,
        city: &str,
        encoders: &EncoderTable,
    ) -> Result<f64, PipelineError> {
        match self.city_mean(city_code) {
            CityMean::NoRecords => Err(PipelineError::UnknownCity {
                code: city_code,
                city: city.to_string(),
                valid_cities: encoders.valid_cities(),
            }),
            CityMean::Mean { value, .. } if value.is_finite() => Ok(value),
            CityMean::Mean { rows, .. } => {
                let median = self.global_median();
                if !median.is_finite() {
                    return Err(PipelineError::CorruptReference);
                }
                log::warn!(
                    "City '{}' (code {}) has {} reference rows but no finite Price_per_sqm mean; \
                     falling back to global median {:.2}",
                    city,
                    city_code,
                    rows,
                    median
                );
                Ok(median)
            }
        }
    }
}

/// Accepts `3` as well as `3.0`, which is how float-typed columns round-trip
fn parse_city_code(raw: &str) -> Option<i64> {
    if let Ok(code) = raw.parse::<i64>() {
        return Some(code);
    }
    let value = raw.parse::<f64>().ok()?;
    if value.is_finite() && value.fract() == 0.0 {
        Some(value as i64)
    } else {
        None
    }
}
