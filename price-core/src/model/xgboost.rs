//! XGBoost JSON model loader.
//!
//! Parses the subset of the XGBoost JSON format (`Booster.save_model("*.json")`)
//! needed to evaluate and explain a single-target regression ensemble. These
//! are foreign types used only for parsing; [`into_ensemble`] converts them to
//! the native [`TreeEnsemble`].

use std::fs;
use std::path::Path;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::tree::{Node, RegressionTree, TreeEnsemble};
use crate::error::LoadError;
use crate::features::layout::{validate_feature_names, FEATURE_COUNT};

/// Objectives whose output transform is the identity, so the raw margin is the price
const IDENTITY_OBJECTIVES: &[&str] = &[
    "reg:squarederror",
    "reg:squaredlogerror",
    "reg:absoluteerror",
    "reg:pseudohubererror",
    "reg:quantileerror",
];

// =============================================================================
// Custom deserializers for XGBoost-specific formats
// =============================================================================

/// Numbers appear as JSON numbers, strings (`"5E-1"`) or bracketed strings
/// (`"[5E-1]"`, XGBoost 3.x) depending on the writer version.
fn number_from_value(value: Value) -> Result<f64, String> {
    let mut cur = value;
    loop {
        match cur {
            Value::Number(n) => return n.as_f64().ok_or_else(|| "invalid number".to_string()),
            Value::String(s) => {
                let t = s.trim();
                if let Ok(f) = t.parse::<f64>() {
                    return Ok(f);
                }
                if t.starts_with('[') && t.ends_with(']') {
                    cur = serde_json::from_str::<Value>(t)
                        .map_err(|e| format!("cannot parse number from '{}': {}", s, e))?;
                    continue;
                }
                return Err(format!("cannot parse number from '{}'", s));
            }
            Value::Array(arr) => match arr.into_iter().next() {
                Some(first) => cur = first,
                None => return Err("empty array".to_string()),
            },
            _ => return Err("expected number, string or array".to_string()),
        }
    }
}

fn deserialize_number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as SerdeError;

    let value = Value::deserialize(deserializer)?;
    number_from_value(value).map_err(SerdeError::custom)
}

fn deserialize_optional_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as SerdeError;

    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        value => number_from_value(value).map(Some).map_err(SerdeError::custom),
    }
}

/// `default_left` is written as 0/1 ints by current versions and as bools by some older ones
fn deserialize_bool_vec<'de, D>(deserializer: D) -> Result<Vec<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as SerdeError;

    let values = Vec::<Value>::deserialize(deserializer)?;
    values
        .into_iter()
        .map(|v| match v {
            Value::Bool(b) => Ok(b),
            Value::Number(n) => Ok(n.as_f64().map(|f| f != 0.0).unwrap_or(false)),
            Value::String(s) => match s.trim() {
                "1" | "true" => Ok(true),
                "0" | "false" => Ok(false),
                other => Err(SerdeError::custom(format!("cannot parse bool from '{}'", other))),
            },
            _ => Err(SerdeError::custom("unsupported type for bool")),
        })
        .collect()
}

// =============================================================================
// Foreign model definitions
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct XgbModel {
    pub learner: Learner,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Learner {
    #[serde(default)]
    pub feature_names: Vec<String>,
    pub gradient_booster: GradientBooster,
    pub learner_model_param: LearnerModelParam,
    pub objective: ObjectiveDef,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LearnerModelParam {
    #[serde(deserialize_with = "deserialize_number")]
    pub base_score: f64,
    #[serde(default, deserialize_with = "deserialize_optional_number")]
    pub num_feature: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_optional_number")]
    pub num_target: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObjectiveDef {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "name", rename_all = "lowercase")]
pub enum GradientBooster {
    Gbtree {
        model: ModelTrees,
    },
    Dart {
        gbtree: DartTrees,
        weight_drop: Vec<f64>,
    },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DartTrees {
    pub model: ModelTrees,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelTrees {
    pub trees: Vec<XgbTree>,
    #[serde(default)]
    pub tree_info: Vec<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct XgbTree {
    pub left_children: Vec<i32>,
    pub right_children: Vec<i32>,
    pub split_indices: Vec<i64>,
    /// Threshold for splits, output value for leaves
    pub split_conditions: Vec<f32>,
    pub sum_hessian: Vec<f64>,
    #[serde(default, deserialize_with = "deserialize_bool_vec")]
    pub default_left: Vec<bool>,
    #[serde(default)]
    pub split_type: Vec<i32>,
}

// =============================================================================
// Loading & conversion
// =============================================================================

pub fn load(path: &Path) -> Result<TreeEnsemble, LoadError> {
    let data = fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let model: XgbModel = serde_json::from_slice(&data).map_err(|source| LoadError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    into_ensemble(model)
}

pub fn from_json_str(json: &str) -> Result<TreeEnsemble, LoadError> {
    let model: XgbModel = serde_json::from_str(json).map_err(|source| LoadError::Json {
        path: "<memory>".into(),
        source,
    })?;
    into_ensemble(model)
}

pub fn into_ensemble(model: XgbModel) -> Result<TreeEnsemble, LoadError> {
    let learner = model.learner;

    if !IDENTITY_OBJECTIVES.contains(&learner.objective.name.as_str()) {
        return Err(LoadError::UnsupportedModel(format!(
            "objective '{}' is not a plain regression objective",
            learner.objective.name
        )));
    }

    if let Some(targets) = learner.learner_model_param.num_target {
        if targets > 1.0 {
            return Err(LoadError::UnsupportedModel(format!(
                "{} targets; only single-target models are supported",
                targets
            )));
        }
    }

    if let Some(n) = learner.learner_model_param.num_feature {
        if n != 0.0 && n != FEATURE_COUNT as f64 {
            return Err(LoadError::UnsupportedModel(format!(
                "model expects {} features, the feature layout has {}",
                n, FEATURE_COUNT
            )));
        }
    }

    validate_feature_names(&learner.feature_names)?;

    let (trees, weights) = match learner.gradient_booster {
        GradientBooster::Gbtree { model } => {
            let weights = vec![1.0; model.trees.len()];
            (model, weights)
        }
        GradientBooster::Dart { gbtree, weight_drop } => (gbtree.model, weight_drop),
        GradientBooster::Unsupported => {
            return Err(LoadError::UnsupportedModel(
                "only gbtree and dart boosters can be explained".to_string(),
            ))
        }
    };

    if trees.tree_info.iter().any(|group| *group != 0) {
        return Err(LoadError::UnsupportedModel(
            "multi-output tree groups are not supported".to_string(),
        ));
    }

    let converted = trees
        .trees
        .iter()
        .enumerate()
        .map(|(i, tree)| convert_tree(i, tree))
        .collect::<Result<Vec<_>, _>>()?;

    log::info!(
        "XGBoost model: {} trees, objective {}, base_score {}",
        converted.len(),
        learner.objective.name,
        learner.learner_model_param.base_score
    );

    TreeEnsemble::new(
        learner.learner_model_param.base_score,
        converted,
        weights,
        learner.objective.name,
    )
}

fn convert_tree(tree_index: usize, tree: &XgbTree) -> Result<RegressionTree, LoadError> {
    let n = tree.left_children.len();
    let malformed = |what: &str| {
        LoadError::MalformedModel(format!("tree {}: {} has wrong length", tree_index, what))
    };

    if tree.right_children.len() != n {
        return Err(malformed("right_children"));
    }
    if tree.split_indices.len() != n {
        return Err(malformed("split_indices"));
    }
    if tree.split_conditions.len() != n {
        return Err(malformed("split_conditions"));
    }
    if tree.sum_hessian.len() != n {
        return Err(malformed("sum_hessian"));
    }
    if !tree.default_left.is_empty() && tree.default_left.len() != n {
        return Err(malformed("default_left"));
    }
    if tree.split_type.iter().any(|t| *t != 0) {
        return Err(LoadError::UnsupportedModel(format!(
            "tree {} uses categorical splits",
            tree_index
        )));
    }

    let nodes = (0..n)
        .map(|i| -> Result<Node, LoadError> {
            let is_leaf = tree.left_children[i] < 0;
            let feature = if is_leaf {
                0
            } else {
                u32::try_from(tree.split_indices[i]).map_err(|_| {
                    LoadError::MalformedModel(format!(
                        "tree {}: node {} has split index {}",
                        tree_index, i, tree.split_indices[i]
                    ))
                })?
            };

            Ok(Node {
                left: tree.left_children[i],
                right: tree.right_children[i],
                feature,
                threshold: tree.split_conditions[i],
                default_left: tree.default_left.get(i).copied().unwrap_or(true),
                value: if is_leaf { tree.split_conditions[i] as f64 } else { 0.0 },
                cover: tree.sum_hessian[i],
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    RegressionTree::new(nodes).map_err(|e| match e {
        LoadError::MalformedModel(msg) => {
            LoadError::MalformedModel(format!("tree {}: {}", tree_index, msg))
        }
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PriceModel;
    use crate::testing;

    fn with_learner(edit: impl FnOnce(&mut Value)) -> String {
        let mut value: Value = serde_json::from_str(testing::MODEL_JSON).unwrap();
        edit(&mut value["learner"]);
        value.to_string()
    }

    #[test]
    fn test_parse_fixture() {
        let model = from_json_str(testing::MODEL_JSON).unwrap();
        assert_eq!(model.n_trees(), 2);
        assert_eq!(model.base_score(), 1_000_000.0);
        assert!(model.info().description.contains("reg:squarederror"));
    }

    #[test]
    fn test_base_score_formats() {
        for raw in [
            Value::String("1E6".into()),
            Value::String("[1E6]".into()),
            serde_json::json!(1000000.0),
            serde_json::json!([1000000.0]),
        ] {
            let json = with_learner(|l| l["learner_model_param"]["base_score"] = raw.clone());
            let model = from_json_str(&json).unwrap();
            assert_eq!(model.base_score(), 1_000_000.0, "{:?}", raw);
        }
    }

    #[test]
    fn test_default_left_accepts_bools() {
        let json = with_learner(|l| {
            l["gradient_booster"]["model"]["trees"][0]["default_left"] = serde_json::json!([true, false, false]);
        });
        assert!(from_json_str(&json).is_ok());
    }

    #[test]
    fn test_rejects_unsupported_objective() {
        let json = with_learner(|l| l["objective"]["name"] = "binary:logistic".into());
        assert!(matches!(from_json_str(&json), Err(LoadError::UnsupportedModel(_))));
    }

    #[test]
    fn test_rejects_reordered_feature_names() {
        let json = with_learner(|l| {
            l["feature_names"] = serde_json::json!([
                "City", "Bedrooms", "Bathrooms", "Area", "Furnished",
                "Level", "Delivery_Term", "Type", "Price_per_sqm"
            ]);
        });
        assert!(matches!(from_json_str(&json), Err(LoadError::Layout(_))));
    }

    #[test]
    fn test_rejects_wrong_feature_count() {
        let json = with_learner(|l| l["learner_model_param"]["num_feature"] = "12".into());
        assert!(matches!(from_json_str(&json), Err(LoadError::UnsupportedModel(_))));
    }

    #[test]
    fn test_rejects_linear_booster() {
        let json = with_learner(|l| {
            l["gradient_booster"] = serde_json::json!({"name": "gblinear", "model": {"weights": [0.1]}});
        });
        assert!(matches!(from_json_str(&json), Err(LoadError::UnsupportedModel(_))));
    }

    #[test]
    fn test_rejects_categorical_splits() {
        let json = with_learner(|l| {
            l["gradient_booster"]["model"]["trees"][0]["split_type"] = serde_json::json!([1, 0, 0]);
        });
        assert!(matches!(from_json_str(&json), Err(LoadError::UnsupportedModel(_))));
    }

    #[test]
    fn test_rejects_inconsistent_arrays() {
        let json = with_learner(|l| {
            l["gradient_booster"]["model"]["trees"][1]["sum_hessian"] = serde_json::json!([100.0]);
        });
        assert!(matches!(from_json_str(&json), Err(LoadError::MalformedModel(_))));
    }

    #[test]
    fn test_dart_weights_applied() {
        let json = with_learner(|l| {
            let trees = l["gradient_booster"]["model"].clone();
            l["gradient_booster"] = serde_json::json!({
                "name": "dart",
                "gbtree": {"name": "gbtree", "model": trees},
                "weight_drop": [0.5, 1.0]
            });
        });
        let model = from_json_str(&json).unwrap();
        let prediction = model.predict(&testing::cairo_features()).unwrap();
        // 1e6 + 0.5 * 300k + 500k
        assert!((prediction - 1_650_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_leaf_values_come_from_split_conditions() {
        // base_weights before eta scaling, as written for pruned or shrunk trees
        let json = with_learner(|l| {
            let trees = &mut l["gradient_booster"]["model"]["trees"];
            trees[0]["base_weights"] = serde_json::json!([0.0, -2_000_000.0, 3_000_000.0]);
            trees[1]["base_weights"] = serde_json::json!([0.0, 0.0, 5_000_000.0, -1_000_000.0, 500_000.0]);
        });
        let model = from_json_str(&json).unwrap();

        let prediction = model.predict(&testing::cairo_features()).unwrap();
        assert!((prediction - 1_800_000.0).abs() < 1e-6);

        let attribution = model.attribute(&testing::cairo_features()).unwrap();
        assert!((attribution.total() - prediction).abs() < 1e-6);
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, testing::MODEL_JSON).unwrap();
        assert_eq!(load(&path).unwrap().n_trees(), 2);
        assert!(matches!(load(&dir.path().join("absent.json")), Err(LoadError::Io { .. })));
    }
}
