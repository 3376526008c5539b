//! Property price prediction API
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      PRICE SERVER                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌────────────┐   ┌──────────────────────────────────────┐  │
//! │  │  API       │   │  PricePipeline (blocking pool)       │  │
//! │  │  (Axum)    │──▶│  validate → encode → Price_per_sqm   │  │
//! │  │            │   │  → predict → attribute → chart/text  │  │
//! │  └─────┬──────┘   └──────────────────┬───────────────────┘  │
//! │        │ /static                     ▼                      │
//! │        └──────────────────────▶ static/*.jpeg               │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod error;
mod handlers;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use price_core::encoding::EncoderTable;
use price_core::explain::{chart, ChartRenderer, FsArtifactStore};
use price_core::model;
use price_core::reference::ReferenceDataset;
use price_core::PricePipeline;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::{Config, LogFormat};
pub use error::{AppError, AppResult};

const DEFAULT_LOG_FILTER: &str = "price_server=debug,price_core=info,tower_http=debug";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    init_tracing(config.log_format);

    tracing::info!("Price server starting ({})...", config.environment);

    if let Err(e) = run(config).await {
        tracing::error!("Fatal: {:#}", e);
        return Err(e);
    }
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);

    // `init` also installs the `log` bridge so price-core records show up
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let pipeline = load_pipeline(&config)?;

    let state = AppState {
        pipeline: Arc::new(pipeline),
    };

    let app = create_router(state, &config.static_dir, &config.static_url_prefix);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", config.host, config.port))?;
    tracing::info!("🚀 Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

/// Load every startup artifact; any failure here is fatal
fn load_pipeline(config: &Config) -> anyhow::Result<PricePipeline> {
    let format = config.model_format().context("Invalid MODEL_FORMAT")?;
    let model = model::load(format, &config.model_path, Some(&config.model_background_path))
        .with_context(|| format!("Failed to load model from {}", config.model_path.display()))?;
    tracing::info!("Model ready: {}", model.info().description);

    let encoders = EncoderTable::load(&config.encoders_path).with_context(|| {
        format!("Failed to load encoders from {}", config.encoders_path.display())
    })?;

    let reference = ReferenceDataset::load(&config.reference_data_path).with_context(|| {
        format!(
            "Failed to load reference data from {}",
            config.reference_data_path.display()
        )
    })?;
    if reference.is_empty() {
        tracing::warn!("Reference dataset is empty; every city lookup will fail");
    }

    let font = match &config.chart_font_path {
        Some(path) => Some(chart::load_font(path).context("Failed to load CHART_FONT_PATH")?),
        None => {
            tracing::debug!("CHART_FONT_PATH not set; using the bundled chart font");
            None
        }
    };

    let artifacts = FsArtifactStore::new(&config.static_dir, &config.static_url_prefix)
        .with_context(|| format!("Failed to prepare {}", config.static_dir.display()))?;

    Ok(PricePipeline::new(
        model,
        Arc::new(encoders),
        Arc::new(reference),
        Arc::new(artifacts),
    )
    .with_renderer(ChartRenderer::new(font))
    .with_jpeg_quality(config.jpeg_quality))
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<PricePipeline>,
}

/// Create the main router with all routes
fn create_router(state: AppState, static_dir: &Path, static_url_prefix: &str) -> Router {
    Router::new()
        .route("/health", get(handlers::health::check))
        .route("/predict", post(handlers::predict::predict))
        .nest_service(static_url_prefix, ServeDir::new(static_dir))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
