//! Configuration module

use std::env;
use std::path::PathBuf;

use price_core::explain::artifact::DEFAULT_JPEG_QUALITY;
use price_core::model::ModelFormat;
use price_core::LoadError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind address
    pub host: String,

    /// Server port
    pub port: u16,

    /// Trained model file
    pub model_path: PathBuf,

    /// `xgboost-json` or `onnx`
    pub model_format: String,

    /// Background row for predict-only (ONNX) models
    pub model_background_path: PathBuf,

    /// Category lists per categorical field
    pub encoders_path: PathBuf,

    /// Historical dataset with City and Price_per_sqm columns
    pub reference_data_path: PathBuf,

    /// Where explanation charts are written and served from
    pub static_dir: PathBuf,

    /// URL prefix the static directory is mounted under
    pub static_url_prefix: String,

    /// TrueType font overriding the bundled chart font
    pub chart_font_path: Option<PathBuf>,

    /// JPEG quality, 1-100
    pub jpeg_quality: u8,

    pub log_format: LogFormat,

    /// Environment (development, production)
    pub environment: String,
}

#[cfg(feature = "onnx")]
const DEFAULT_MODEL_FORMAT: &str = "onnx";
#[cfg(not(feature = "onnx"))]
const DEFAULT_MODEL_FORMAT: &str = "xgboost-json";

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Leading slash, no trailing slash; the root is not a valid mount point
fn normalize_prefix(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/static".to_string()
    } else {
        format!("/{}", trimmed)
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            host: var_or("HOST", "0.0.0.0"),

            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8000),

            model_path: var_or("MODEL_PATH", "model.json").into(),

            model_format: var_or("MODEL_FORMAT", DEFAULT_MODEL_FORMAT),

            model_background_path: var_or("MODEL_BACKGROUND_PATH", "model_background.json").into(),

            encoders_path: var_or("ENCODERS_PATH", "encoders.json").into(),

            reference_data_path: var_or("REFERENCE_DATA_PATH", "cleaned_data.csv").into(),

            static_dir: var_or("STATIC_DIR", "static").into(),

            static_url_prefix: normalize_prefix(&var_or("STATIC_URL_PREFIX", "/static")),

            chart_font_path: env::var("CHART_FONT_PATH")
                .ok()
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),

            jpeg_quality: env::var("JPEG_QUALITY")
                .ok()
                .and_then(|q| q.parse::<i64>().ok())
                .map(|q| q.clamp(1, 100) as u8)
                .unwrap_or(DEFAULT_JPEG_QUALITY),

            log_format: match var_or("LOG_FORMAT", "pretty").to_ascii_lowercase().as_str() {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },

            environment: var_or("ENVIRONMENT", "development"),
        }
    }

    pub fn model_format(&self) -> Result<ModelFormat, LoadError> {
        self.model_format.parse()
    }
}
