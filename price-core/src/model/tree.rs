//! Tree ensemble regressor with exact TreeSHAP attribution.

use chrono::{DateTime, Utc};

use super::shap::tree_shap;
use super::{Attribution, ModelError, ModelInfo, PriceModel};
use crate::error::LoadError;
use crate::features::{FeatureVector, FEATURE_COUNT};

/// One node in array form; children are indices into the same tree
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Node {
    /// -1 for leaves
    pub left: i32,
    pub right: i32,
    pub feature: u32,
    pub threshold: f32,
    /// Direction taken for a missing (NaN) value
    pub default_left: bool,
    /// Leaf output
    pub value: f64,
    /// Training weight that reached this node (sum of hessians)
    pub cover: f64,
}

impl Node {
    pub fn is_leaf(&self) -> bool {
        self.left < 0
    }
}

#[derive(Debug, Clone)]
pub struct RegressionTree {
    nodes: Vec<Node>,
    depth: usize,
    expected_value: f64,
}

impl RegressionTree {
    /// Validate node structure: children must exist and come after their
    /// parent (which rules out cycles), split features must be part of the
    /// layout and every split needs a positive cover for attribution.
    pub fn new(nodes: Vec<Node>) -> Result<Self, LoadError> {
        if nodes.is_empty() {
            return Err(LoadError::MalformedModel("empty tree".to_string()));
        }

        for (index, node) in nodes.iter().enumerate() {
            if node.is_leaf() {
                continue;
            }
            for child in [node.left, node.right] {
                if child <= index as i32 || child as usize >= nodes.len() {
                    return Err(LoadError::MalformedModel(format!(
                        "node {} has invalid child {}",
                        index, child
                    )));
                }
            }
            if node.feature as usize >= FEATURE_COUNT {
                return Err(LoadError::MalformedModel(format!(
                    "node {} splits on feature {} but the model takes {} features",
                    index, node.feature, FEATURE_COUNT
                )));
            }
            if !(node.cover > 0.0) {
                return Err(LoadError::MalformedModel(format!(
                    "node {} has no cover statistics; attribution needs them",
                    index
                )));
            }
        }

        let depth = subtree_depth(&nodes, 0);
        let expected_value = subtree_expectation(&nodes, 0);
        Ok(Self { nodes, depth, expected_value })
    }

    pub(crate) fn node(&self, index: usize) -> &Node {
        &self.nodes[index]
    }

    pub(crate) fn cover(&self, index: usize) -> f64 {
        self.nodes[index].cover
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Cover-weighted mean leaf value
    pub fn expected_value(&self) -> f64 {
        self.expected_value
    }

    /// Split decision, compared in f32 like the training library does
    pub(crate) fn goes_left(&self, index: usize, row: &[f64; FEATURE_COUNT]) -> bool {
        let node = &self.nodes[index];
        let value = row[node.feature as usize];
        if value.is_nan() {
            node.default_left
        } else {
            (value as f32) < node.threshold
        }
    }

    pub fn predict_row(&self, row: &[f64; FEATURE_COUNT]) -> f64 {
        let mut index = 0usize;
        loop {
            let node = &self.nodes[index];
            if node.is_leaf() {
                return node.value;
            }
            index = if self.goes_left(index, row) {
                node.left as usize
            } else {
                node.right as usize
            };
        }
    }
}

fn subtree_depth(nodes: &[Node], index: usize) -> usize {
    let node = &nodes[index];
    if node.is_leaf() {
        1
    } else {
        1 + subtree_depth(nodes, node.left as usize).max(subtree_depth(nodes, node.right as usize))
    }
}

fn subtree_expectation(nodes: &[Node], index: usize) -> f64 {
    let node = &nodes[index];
    if node.is_leaf() {
        return node.value;
    }
    let left = &nodes[node.left as usize];
    let right = &nodes[node.right as usize];
    let total = left.cover + right.cover;
    if total <= 0.0 {
        return 0.5
            * (subtree_expectation(nodes, node.left as usize)
                + subtree_expectation(nodes, node.right as usize));
    }
    (left.cover * subtree_expectation(nodes, node.left as usize)
        + right.cover * subtree_expectation(nodes, node.right as usize))
        / total
}

/// Additive ensemble: `base_score + Σ weight_t · tree_t(x)`
#[derive(Debug, Clone)]
pub struct TreeEnsemble {
    base_score: f64,
    trees: Vec<RegressionTree>,
    weights: Vec<f64>,
    objective: String,
    loaded_at: DateTime<Utc>,
}

impl TreeEnsemble {
    pub fn new(
        base_score: f64,
        trees: Vec<RegressionTree>,
        weights: Vec<f64>,
        objective: impl Into<String>,
    ) -> Result<Self, LoadError> {
        if trees.len() != weights.len() {
            return Err(LoadError::MalformedModel(format!(
                "{} trees but {} tree weights",
                trees.len(),
                weights.len()
            )));
        }
        Ok(Self {
            base_score,
            trees,
            weights,
            objective: objective.into(),
            loaded_at: Utc::now(),
        })
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn base_score(&self) -> f64 {
        self.base_score
    }

    /// Model output averaged over the training distribution (node covers)
    pub fn expected_value(&self) -> f64 {
        self.base_score
            + self
                .trees
                .iter()
                .zip(&self.weights)
                .map(|(tree, w)| w * tree.expected_value())
                .sum::<f64>()
    }

    fn predict_row(&self, row: &[f64; FEATURE_COUNT]) -> f64 {
        self.base_score
            + self
                .trees
                .iter()
                .zip(&self.weights)
                .map(|(tree, w)| w * tree.predict_row(row))
                .sum::<f64>()
    }
}

impl PriceModel for TreeEnsemble {
    fn info(&self) -> ModelInfo {
        ModelInfo {
            kind: "tree-ensemble".to_string(),
            description: format!(
                "{} trees, objective {}, TreeSHAP attribution",
                self.trees.len(),
                self.objective
            ),
            loaded_at: self.loaded_at,
        }
    }

    fn predict(&self, features: &FeatureVector) -> Result<f64, ModelError> {
        let value = self.predict_row(features.as_array());
        if value.is_finite() {
            Ok(value)
        } else {
            Err(ModelError::Evaluation(format!("model produced {}", value)))
        }
    }

    fn attribute(&self, features: &FeatureVector) -> Result<Attribution, ModelError> {
        let mut values = [0.0f64; FEATURE_COUNT];
        for (tree, weight) in self.trees.iter().zip(&self.weights) {
            tree_shap(tree, features.as_array(), *weight, &mut values);
        }
        Ok(Attribution {
            base_value: self.expected_value(),
            values,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    fn leaf(value: f64, cover: f64) -> Node {
        Node { left: -1, right: -1, feature: 0, threshold: 0.0, default_left: false, value, cover }
    }

    #[test]
    fn test_rejects_malformed_trees() {
        assert!(RegressionTree::new(vec![]).is_err());

        let backwards = vec![
            Node { left: 0, right: 2, feature: 0, threshold: 1.0, default_left: true, value: 0.0, cover: 2.0 },
            leaf(1.0, 1.0),
            leaf(2.0, 1.0),
        ];
        assert!(RegressionTree::new(backwards).is_err());

        let bad_feature = vec![
            Node { left: 1, right: 2, feature: 12, threshold: 1.0, default_left: true, value: 0.0, cover: 2.0 },
            leaf(1.0, 1.0),
            leaf(2.0, 1.0),
        ];
        assert!(RegressionTree::new(bad_feature).is_err());

        let no_cover = vec![
            Node { left: 1, right: 2, feature: 1, threshold: 1.0, default_left: true, value: 0.0, cover: 0.0 },
            leaf(1.0, 0.0),
            leaf(2.0, 0.0),
        ];
        assert!(RegressionTree::new(no_cover).is_err());
    }

    #[test]
    fn test_missing_value_follows_default_direction() {
        let tree = RegressionTree::new(vec![
            Node { left: 1, right: 2, feature: 3, threshold: 100.0, default_left: false, value: 0.0, cover: 2.0 },
            leaf(1.0, 1.0),
            leaf(2.0, 1.0),
        ])
        .unwrap();

        let mut row = [0.0; FEATURE_COUNT];
        row[3] = f64::NAN;
        assert_eq!(tree.predict_row(&row), 2.0);
        row[3] = 99.0;
        assert_eq!(tree.predict_row(&row), 1.0);
        row[3] = 100.0;
        assert_eq!(tree.predict_row(&row), 2.0);
    }

    #[test]
    fn test_fixture_prediction_and_expectation() {
        let model = testing::tree_model();
        let features = testing::cairo_features();

        assert_eq!(model.n_trees(), 2);
        assert!((model.expected_value() - 1_240_000.0).abs() < 1e-6);
        assert!((model.predict(&features).unwrap() - 1_800_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_attribution_sums_to_prediction() {
        let model = testing::tree_model();

        for features in [testing::cairo_features(), testing::small_cheap_features()] {
            let prediction = model.predict(&features).unwrap();
            let attribution = model.attribute(&features).unwrap();
            assert!(
                (attribution.total() - prediction).abs() < 1e-6,
                "{} vs {}",
                attribution.total(),
                prediction
            );
        }
    }

    #[test]
    fn test_fixture_attribution_values() {
        let model = testing::tree_model();
        let attribution = model.attribute(&testing::cairo_features()).unwrap();

        // Area carries all of tree 0, City and Price_per_sqm share tree 1
        assert!((attribution.values[3] - 200_000.0).abs() < 1e-6);
        assert!((attribution.values[8] - 390_000.0).abs() < 1e-6);
        assert!((attribution.values[7] + 30_000.0).abs() < 1e-6);
        for i in [0, 1, 2, 4, 5, 6] {
            assert_eq!(attribution.values[i], 0.0);
        }
    }

    #[test]
    fn test_tree_weights_scale_output_and_attribution() {
        let tree = RegressionTree::new(vec![
            Node { left: 1, right: 2, feature: 0, threshold: 0.5, default_left: true, value: 0.0, cover: 2.0 },
            leaf(-1.0, 1.0),
            leaf(1.0, 1.0),
        ])
        .unwrap();
        let model = TreeEnsemble::new(10.0, vec![tree], vec![0.5], "reg:squarederror").unwrap();

        let features = FeatureVector::from_values([1.0; FEATURE_COUNT]);
        assert_eq!(model.predict(&features).unwrap(), 10.5);

        let attribution = model.attribute(&features).unwrap();
        assert_eq!(attribution.base_value, 10.0);
        assert!((attribution.values[0] - 0.5).abs() < 1e-12);
    }
}
