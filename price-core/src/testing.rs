//! Shared fixtures for unit tests here and in dependent crates
//!
//! A tiny but complete artifact set: three cities, a two-tree XGBoost model
//! and a reference dataset with no rows for Giza.
//!
//! Fixture model, in feature-layout indices:
//! - tree 0: `Area < 120 ? -200000 (cover 40) : 300000 (cover 60)`
//! - tree 1: `Price_per_sqm < 10000 ? (City < 1.5 ? -100000 (30) : 50000 (40)) : 500000 (30)`
//! - base_score 1e6, so E[f(X)] = 1 240 000 and the Cairo request predicts 1 800 000.

use std::path::Path;
use std::sync::Arc;

use crate::encoding::EncoderTable;
use crate::explain::{ChartRenderer, FsArtifactStore};
use crate::features::FeatureVector;
use crate::model::{xgboost, TreeEnsemble};
use crate::pipeline::{PredictionRequest, PricePipeline};
use crate::reference::ReferenceDataset;

pub const ENCODERS_JSON: &str = r#"{
  "City": ["Alexandria", "Cairo", "Giza"],
  "Type": ["Apartment", "Chalet", "Villa"],
  "Furnished": ["No", "Yes"],
  "Delivery_Term": ["Ready", "Under Construction"]
}"#;

pub const REFERENCE_CSV: &str = "\
Type,Bedrooms,Bathrooms,Area,Furnished,Level,Delivery_Term,City,Price,Price_per_sqm
0,3,2,150,1,4,0,1,1800000,12000
2,4,3,200,0,1,1,1,2800000,14000
0,2,1,100,0,2,0,0,900000,9000
1,3,2,120,1,0,0,0,1140000,9500
0,2,1,80,0,3,1,0,,
";

pub const MODEL_JSON: &str = r#"{
  "learner": {
    "attributes": {},
    "feature_names": ["Type", "Bedrooms", "Bathrooms", "Area", "Furnished", "Level", "Delivery_Term", "City", "Price_per_sqm"],
    "feature_types": ["int", "int", "int", "float", "int", "int", "int", "int", "float"],
    "gradient_booster": {
      "name": "gbtree",
      "model": {
        "gbtree_model_param": {"num_parallel_tree": "1", "num_trees": "2"},
        "iteration_indptr": [0, 1, 2],
        "tree_info": [0, 0],
        "trees": [
          {
            "base_weights": [0.0, -200000.0, 300000.0],
            "categories": [],
            "categories_nodes": [],
            "categories_segments": [],
            "categories_sizes": [],
            "default_left": [0, 0, 0],
            "id": 0,
            "left_children": [1, -1, -1],
            "loss_changes": [6.0E12, 0.0, 0.0],
            "parents": [2147483647, 0, 0],
            "right_children": [2, -1, -1],
            "split_conditions": [120.0, -200000.0, 300000.0],
            "split_indices": [3, 0, 0],
            "split_type": [0, 0, 0],
            "sum_hessian": [100.0, 40.0, 60.0],
            "tree_param": {"num_deleted": "0", "num_feature": "9", "num_nodes": "3", "size_leaf_vector": "1"}
          },
          {
            "base_weights": [0.0, 0.0, 500000.0, -100000.0, 50000.0],
            "categories": [],
            "categories_nodes": [],
            "categories_segments": [],
            "categories_sizes": [],
            "default_left": [0, 1, 0, 0, 0],
            "id": 1,
            "left_children": [1, 3, -1, -1, -1],
            "loss_changes": [1.1E13, 1.7E11, 0.0, 0.0, 0.0],
            "parents": [2147483647, 0, 0, 1, 1],
            "right_children": [2, 4, -1, -1, -1],
            "split_conditions": [10000.0, 1.5, 500000.0, -100000.0, 50000.0],
            "split_indices": [8, 7, 0, 0, 0],
            "split_type": [0, 0, 0, 0, 0],
            "sum_hessian": [100.0, 70.0, 30.0, 30.0, 40.0],
            "tree_param": {"num_deleted": "0", "num_feature": "9", "num_nodes": "5", "size_leaf_vector": "1"}
          }
        ]
      }
    },
    "learner_model_param": {
      "base_score": "1E6",
      "boost_from_average": "1",
      "num_class": "0",
      "num_feature": "9",
      "num_target": "1"
    },
    "objective": {
      "name": "reg:squarederror",
      "reg_loss_param": {"scale_pos_weight": "1"}
    }
  },
  "version": [2, 0, 3]
}"#;

pub fn encoder_table() -> EncoderTable {
    serde_json::from_str(ENCODERS_JSON).expect("fixture encoders parse")
}

pub fn reference_dataset() -> ReferenceDataset {
    ReferenceDataset::from_reader(REFERENCE_CSV.as_bytes(), Path::new("cleaned_data.csv"))
        .expect("fixture reference data parses")
}

pub fn tree_model() -> TreeEnsemble {
    xgboost::from_json_str(MODEL_JSON).expect("fixture model parses")
}

/// 150 m² furnished, ready apartment in Cairo
pub fn cairo_request() -> PredictionRequest {
    PredictionRequest {
        city: "Cairo".to_string(),
        property_type: "Apartment".to_string(),
        furnished: "Yes".to_string(),
        delivery_term: "Ready".to_string(),
        bedrooms: 3,
        bathrooms: 2,
        area: 150.0,
        level: 4,
    }
}

/// What the pipeline assembles for [`cairo_request`]
pub fn cairo_features() -> FeatureVector {
    FeatureVector::from_values([0.0, 3.0, 2.0, 150.0, 1.0, 4.0, 0.0, 1.0, 13000.0])
}

/// Lands in the low leaf of both trees
pub fn small_cheap_features() -> FeatureVector {
    FeatureVector::from_values([0.0, 2.0, 1.0, 100.0, 0.0, 2.0, 0.0, 1.0, 8000.0])
}

/// Full pipeline over the fixtures, writing charts into `static_dir`
pub fn pipeline(static_dir: &Path) -> PricePipeline {
    let store = FsArtifactStore::new(static_dir, "/static").expect("artifact dir");
    PricePipeline::new(
        Arc::new(tree_model()),
        Arc::new(encoder_table()),
        Arc::new(reference_dataset()),
        Arc::new(store),
    )
    .with_renderer(ChartRenderer::default().with_size(400, 200))
}
