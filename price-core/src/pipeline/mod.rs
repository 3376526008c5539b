//! Prediction pipeline
//!
//! One request flows linearly through validation, categorical encoding,
//! feature assembly, prediction and explanation. Any stage failure aborts
//! the call; nothing is retried and no partial response is produced.

mod request;

use std::sync::Arc;

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::encoding::EncoderTable;
use crate::error::{PipelineError, PipelineResult};
use crate::explain::artifact::DEFAULT_JPEG_QUALITY;
use crate::explain::{describe, encode_jpeg, ArtifactStore, ChartRenderer, Explanation};
use crate::features::FeatureVector;
use crate::model::PriceModel;
use crate::reference::ReferenceDataset;

pub use request::PredictionRequest;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub predicted_price: f64,
    pub image_url: String,
    pub factors_description: String,
}

/// Read-only state shared by every request
pub struct PricePipeline {
    model: Arc<dyn PriceModel>,
    encoders: Arc<EncoderTable>,
    reference: Arc<ReferenceDataset>,
    renderer: ChartRenderer,
    artifacts: Arc<dyn ArtifactStore>,
    jpeg_quality: u8,
}

impl PricePipeline {
    pub fn new(
        model: Arc<dyn PriceModel>,
        encoders: Arc<EncoderTable>,
        reference: Arc<ReferenceDataset>,
        artifacts: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            model,
            encoders,
            reference,
            renderer: ChartRenderer::default(),
            artifacts,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }

    pub fn with_renderer(mut self, renderer: ChartRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    pub fn model(&self) -> &dyn PriceModel {
        self.model.as_ref()
    }

    /// Validation + encoding + Price_per_sqm derivation
    pub fn features(&self, request: &PredictionRequest) -> PipelineResult<FeatureVector> {
        request.check()?;

        let codes = self.encoders.encode_request(request)?;
        log::debug!("Encoded categories: {:?}", codes.as_map());

        let price_per_sqm = self
            .reference
            .resolve_price_per_sqm(codes.city, &request.city, &self.encoders)?;
        log::debug!("Price_per_sqm for {}: {:.2}", request.city, price_per_sqm);

        let features = FeatureVector::assemble(request, &codes, price_per_sqm);
        log::debug!("Feature vector: {}", features.to_log_entry());
        Ok(features)
    }

    pub fn predict(&self, request: &PredictionRequest) -> PipelineResult<PredictionResponse> {
        let features = self.features(request)?;

        let predicted_price = self.model.predict(&features)?;
        log::debug!("Raw prediction: {:.2}", predicted_price);
        if predicted_price < 0.0 {
            return Err(PipelineError::NegativePrediction(predicted_price));
        }

        let attribution = self.model.attribute(&features)?;
        let explanation = Explanation::new(&features, &attribution, predicted_price, &self.encoders);

        let chart = self.renderer.render(&explanation)?;
        let jpeg = encode_jpeg(&DynamicImage::ImageRgb8(chart), self.jpeg_quality)?;
        let image_url = self.artifacts.put(Uuid::new_v4(), &jpeg)?;

        let factors_description = describe(&explanation);

        log::info!(
            "Predicted {:.2} for {} {} ({} m²), chart at {}",
            predicted_price,
            request.property_type,
            request.city,
            request.area,
            image_url
        );

        Ok(PredictionResponse {
            predicted_price,
            image_url,
            factors_description,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::error::ErrorClass;
    use crate::model::{Attribution, ModelError, ModelInfo};
    use crate::testing;

    /// Constant-output model that counts how often it is invoked
    struct FixedModel {
        output: f64,
        calls: AtomicUsize,
    }

    impl FixedModel {
        fn new(output: f64) -> Self {
            Self { output, calls: AtomicUsize::new(0) }
        }
    }

    impl PriceModel for FixedModel {
        fn info(&self) -> ModelInfo {
            ModelInfo {
                kind: "fixed".to_string(),
                description: "constant".to_string(),
                loaded_at: chrono::Utc::now(),
            }
        }

        fn predict(&self, _: &FeatureVector) -> Result<f64, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.output)
        }

        fn attribute(&self, _: &FeatureVector) -> Result<Attribution, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Attribution { base_value: self.output, values: [0.0; 9] })
        }
    }

    fn pipeline_with(model: Arc<dyn PriceModel>, dir: &std::path::Path) -> PricePipeline {
        let store = crate::explain::FsArtifactStore::new(dir, "/static").unwrap();
        PricePipeline::new(
            model,
            Arc::new(testing::encoder_table()),
            Arc::new(testing::reference_dataset()),
            Arc::new(store),
        )
        .with_renderer(ChartRenderer::default().with_size(300, 150))
    }

    #[test]
    fn test_end_to_end_cairo() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = testing::pipeline(dir.path());

        let response = pipeline.predict(&testing::cairo_request()).unwrap();

        assert!((response.predicted_price - 1_800_000.0).abs() < 1e-6);

        let file = response
            .image_url
            .strip_prefix("/static/shap_explanation_")
            .and_then(|rest| rest.strip_suffix(".jpeg"))
            .unwrap();
        assert!(Uuid::parse_str(file).is_ok());
        let on_disk = std::fs::read(dir.path().join(format!("shap_explanation_{}.jpeg", file))).unwrap();
        assert_eq!(&on_disk[..2], &[0xFF, 0xD8]);

        let lines: Vec<&str> = response.factors_description.lines().collect();
        assert_eq!(lines[0], "Factors influencing the predicted price:");
        assert_eq!(lines.len(), 10);
        for line in &lines[1..] {
            assert!(line.contains("increased price by") || line.contains("decreased price by"));
            let magnitude = line
                .rsplit("price by ")
                .next()
                .and_then(|rest| rest.strip_suffix(" units."))
                .unwrap();
            assert_eq!(magnitude.split('.').nth(1).map(str::len), Some(2), "{}", line);
        }
        assert!(lines.contains(&"- Area: Value = 150, increased price by 200000.00 units."));
        assert!(lines.contains(&"- City: Value = 1 (Cairo), decreased price by 30000.00 units."));
    }

    #[test]
    fn test_each_call_writes_a_new_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = testing::pipeline(dir.path());

        let a = pipeline.predict(&testing::cairo_request()).unwrap();
        let b = pipeline.predict(&testing::cairo_request()).unwrap();

        assert_ne!(a.image_url, b.image_url);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_unknown_city_lists_valid_cities_without_predicting() {
        let dir = tempfile::tempdir().unwrap();
        let model = Arc::new(FixedModel::new(100.0));
        let pipeline = pipeline_with(model.clone(), dir.path());

        let request = PredictionRequest {
            city: "Atlantis".to_string(),
            ..testing::cairo_request()
        };
        let err = pipeline.predict(&request).unwrap_err();

        assert_eq!(err.class(), ErrorClass::Client);
        let cities = err.valid_options().unwrap();
        assert_eq!(cities, ["Alexandria", "Cairo", "Giza"]);
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_city_without_reference_rows() {
        let dir = tempfile::tempdir().unwrap();
        let model = Arc::new(FixedModel::new(100.0));
        let pipeline = pipeline_with(model.clone(), dir.path());

        let request = PredictionRequest {
            city: "Giza".to_string(),
            ..testing::cairo_request()
        };
        let err = pipeline.predict(&request).unwrap_err();

        assert!(matches!(err, PipelineError::UnknownCity { code: 2, .. }));
        assert!(err.to_string().starts_with("No data for city code 2 (decoded: Giza)"));
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_invalid_numerics_never_reach_the_model() {
        let dir = tempfile::tempdir().unwrap();
        let model = Arc::new(FixedModel::new(100.0));
        let pipeline = pipeline_with(model.clone(), dir.path());

        let request = PredictionRequest {
            bedrooms: -1,
            area: 0.0,
            ..testing::cairo_request()
        };
        let err = pipeline.predict(&request).unwrap_err();

        assert_eq!(err.class(), ErrorClass::Client);
        assert_eq!(err.to_string(), "Bedrooms must be non-negative; Area must be positive");
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_negative_prediction_is_server_error() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline_with(Arc::new(FixedModel::new(-5.0)), dir.path());

        let err = pipeline.predict(&testing::cairo_request()).unwrap_err();

        assert!(matches!(err, PipelineError::NegativePrediction(v) if v == -5.0));
        assert_eq!(err.class(), ErrorClass::Server);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_zero_prediction_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline_with(Arc::new(FixedModel::new(0.0)), dir.path());
        let response = pipeline.predict(&testing::cairo_request()).unwrap();
        assert_eq!(response.predicted_price, 0.0);
    }

    #[test]
    fn test_feature_assembly_uses_city_mean() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = testing::pipeline(dir.path());

        let features = pipeline.features(&testing::cairo_request()).unwrap();
        assert_eq!(features, testing::cairo_features());
    }
}
