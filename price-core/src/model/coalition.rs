//! Coalition Explainer - exact Shapley values for predict-only models
//!
//! With nine features every coalition can be enumerated: 2⁹ = 512 model
//! evaluations per explanation. Features outside a coalition take the value
//! of a single background row, so the baseline is `f(background)` and the
//! attribution is exact for that reference point.

use chrono::{DateTime, Utc};

use super::{Attribution, ModelError, ModelInfo, PriceModel};
use crate::features::{FeatureVector, FEATURE_COUNT};

const COALITIONS: usize = 1 << FEATURE_COUNT;

/// Anything that maps one feature row to a price
pub trait RowPredictor: Send + Sync {
    fn predict_row(&self, row: &[f64; FEATURE_COUNT]) -> Result<f64, ModelError>;
}

impl<F> RowPredictor for F
where
    F: Fn(&[f64; FEATURE_COUNT]) -> f64 + Send + Sync,
{
    fn predict_row(&self, row: &[f64; FEATURE_COUNT]) -> Result<f64, ModelError> {
        Ok(self(row))
    }
}

pub struct CoalitionExplainer<P> {
    predictor: P,
    background: FeatureVector,
    description: String,
    loaded_at: DateTime<Utc>,
}

impl<P: RowPredictor> CoalitionExplainer<P> {
    pub fn new(predictor: P, background: FeatureVector, description: impl Into<String>) -> Self {
        Self {
            predictor,
            background,
            description: description.into(),
            loaded_at: Utc::now(),
        }
    }

    fn checked(&self, row: &[f64; FEATURE_COUNT]) -> Result<f64, ModelError> {
        let value = self.predictor.predict_row(row)?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(ModelError::Evaluation(format!("model produced {}", value)))
        }
    }

    /// Model output for every coalition; bit i set means feature i comes from `x`
    fn coalition_values(&self, x: &[f64; FEATURE_COUNT]) -> Result<Vec<f64>, ModelError> {
        let background = self.background.as_array();
        (0..COALITIONS)
            .map(|mask| {
                let mut row = *background;
                for (i, slot) in row.iter_mut().enumerate() {
                    if mask & (1 << i) != 0 {
                        *slot = x[i];
                    }
                }
                self.checked(&row)
            })
            .collect()
    }
}

/// |S|! (n - |S| - 1)! / n! for every coalition size
fn shapley_weights() -> [f64; FEATURE_COUNT] {
    let factorial = |k: usize| (1..=k).map(|v| v as f64).product::<f64>();
    let n_fact = factorial(FEATURE_COUNT);
    let mut weights = [0.0; FEATURE_COUNT];
    for (size, w) in weights.iter_mut().enumerate() {
        *w = factorial(size) * factorial(FEATURE_COUNT - size - 1) / n_fact;
    }
    weights
}

impl<P: RowPredictor> PriceModel for CoalitionExplainer<P> {
    fn info(&self) -> ModelInfo {
        ModelInfo {
            kind: "coalition".to_string(),
            description: format!("{}, exact coalition Shapley attribution", self.description),
            loaded_at: self.loaded_at,
        }
    }

    fn predict(&self, features: &FeatureVector) -> Result<f64, ModelError> {
        self.checked(features.as_array())
    }

    fn attribute(&self, features: &FeatureVector) -> Result<Attribution, ModelError> {
        let v = self.coalition_values(features.as_array())?;
        let weights = shapley_weights();

        let mut values = [0.0f64; FEATURE_COUNT];
        for (i, phi) in values.iter_mut().enumerate() {
            let bit = 1usize << i;
            for mask in (0..COALITIONS).filter(|m| m & bit == 0) {
                let size = mask.count_ones() as usize;
                *phi += weights[size] * (v[mask | bit] - v[mask]);
            }
        }

        Ok(Attribution {
            base_value: v[0],
            values,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn linear(row: &[f64; FEATURE_COUNT]) -> f64 {
        1000.0 + 2.0 * row[3] + 50.0 * row[1] - 10.0 * row[7]
    }

    #[test]
    fn test_weights_sum_to_one_per_feature() {
        // Σ_S w(|S|) over subsets of the other 8 features
        let weights = shapley_weights();
        let total: f64 = (0..FEATURE_COUNT)
            .map(|s| {
                let n = FEATURE_COUNT - 1;
                let choose = (0..s).fold(1.0, |acc, k| acc * (n - k) as f64 / (k + 1) as f64);
                choose * weights[s]
            })
            .sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_linear_model_attribution_is_coefficient_times_delta() {
        let background = FeatureVector::from_values([0.0, 2.0, 1.0, 100.0, 0.0, 1.0, 0.0, 1.0, 9000.0]);
        let explainer = CoalitionExplainer::new(linear, background, "linear");

        let x = FeatureVector::from_values([1.0, 3.0, 2.0, 150.0, 1.0, 4.0, 0.0, 2.0, 13000.0]);
        let attribution = explainer.attribute(&x).unwrap();

        assert!((attribution.base_value - linear(background.as_array())).abs() < 1e-9);
        assert!((attribution.values[3] - 100.0).abs() < 1e-9);
        assert!((attribution.values[1] - 50.0).abs() < 1e-9);
        assert!((attribution.values[7] + 10.0).abs() < 1e-9);
        assert!(attribution.values[8].abs() < 1e-9);
        assert!((attribution.total() - explainer.predict(&x).unwrap()).abs() < 1e-9);
    }

    #[test]
    fn test_interaction_split_evenly() {
        let product = |row: &[f64; FEATURE_COUNT]| row[0] * row[1];
        let explainer = CoalitionExplainer::new(product, FeatureVector::from_values([0.0; FEATURE_COUNT]), "product");

        let mut x = [0.0; FEATURE_COUNT];
        x[0] = 2.0;
        x[1] = 3.0;
        let attribution = explainer.attribute(&FeatureVector::from_values(x)).unwrap();

        assert!((attribution.values[0] - 3.0).abs() < 1e-9);
        assert!((attribution.values[1] - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_evaluates_every_coalition_once() {
        let calls = AtomicUsize::new(0);
        let counting = |row: &[f64; FEATURE_COUNT]| {
            calls.fetch_add(1, Ordering::SeqCst);
            row.iter().sum::<f64>()
        };
        let explainer = CoalitionExplainer::new(counting, FeatureVector::from_values([0.0; FEATURE_COUNT]), "sum");

        explainer.attribute(&FeatureVector::from_values([1.0; FEATURE_COUNT])).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), COALITIONS);
    }

    #[test]
    fn test_non_finite_output_is_an_error() {
        let broken = |_: &[f64; FEATURE_COUNT]| f64::NAN;
        let explainer = CoalitionExplainer::new(broken, FeatureVector::from_values([0.0; FEATURE_COUNT]), "nan");
        assert!(matches!(
            explainer.predict(&FeatureVector::from_values([1.0; FEATURE_COUNT])),
            Err(ModelError::Evaluation(_))
        ));
    }
}
