//! Click/order propensity from gradient-boosted oblivious trees.
//!
//! Models are read from CatBoost's JSON export. Only float-feature splits are
//! supported, which covers the single lexical-similarity feature the ranking
//! pipeline feeds in.

use std::{path::Path, sync::Arc};

use ndarray::{ArrayView1, ArrayView2};
use serde::Deserialize;

use crate::error::{Error, Result};

/// A scalar regressor over rows of a feature matrix.
pub trait Regressor: Send + Sync {
   fn predict_row(&self, row: ArrayView1<'_, f32>) -> f32;

   /// Number of feature columns the model reads.
   fn n_features(&self) -> usize;

   fn predict(&self, features: ArrayView2<'_, f32>) -> Result<Vec<f32>> {
      if features.ncols() < self.n_features() {
         return Err(Error::ShapeMismatch {
            op:       "propensity features",
            expected: self.n_features(),
            actual:   features.ncols(),
         });
      }
      Ok(features.outer_iter().map(|row| self.predict_row(row)).collect())
   }
}

#[derive(Debug, Clone, Deserialize)]
struct Split {
   border:              f32,
   float_feature_index: usize,
}

#[derive(Debug, Clone, Deserialize)]
struct Tree {
   splits:      Vec<Split>,
   leaf_values: Vec<f32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Bias {
   Scalar(f32),
   PerDimension(Vec<f32>),
}

#[derive(Debug, Deserialize)]
struct ModelFile {
   oblivious_trees: Vec<Tree>,
   #[serde(default)]
   scale_and_bias:  Option<(f32, Bias)>,
}

/// Symmetric decision trees: every level of a tree tests the same split, so
/// the leaf is addressed by the bit pattern of split outcomes.
#[derive(Debug, Clone)]
pub struct ObliviousEnsemble {
   trees:      Vec<Tree>,
   scale:      f32,
   bias:       f32,
   n_features: usize,
}

impl ObliviousEnsemble {
   pub fn from_json(json: &str) -> Result<Self> {
      let file: ModelFile = serde_json::from_str(json)?;

      for (i, tree) in file.oblivious_trees.iter().enumerate() {
         let leaves = 1usize
            .checked_shl(tree.splits.len() as u32)
            .ok_or_else(|| Error::ModelLoad(format!("tree {i} is too deep")))?;
         if tree.leaf_values.len() != leaves {
            return Err(Error::ModelLoad(format!(
               "tree {i} has {} leaf values for depth {}",
               tree.leaf_values.len(),
               tree.splits.len()
            )));
         }
      }

      let (scale, bias) = match file.scale_and_bias {
         None => (1.0, 0.0),
         Some((scale, Bias::Scalar(b))) => (scale, b),
         Some((scale, Bias::PerDimension(b))) => (scale, b.first().copied().unwrap_or(0.0)),
      };

      let n_features = file
         .oblivious_trees
         .iter()
         .flat_map(|t| t.splits.iter().map(|s| s.float_feature_index + 1))
         .max()
         .unwrap_or(0);

      Ok(Self { trees: file.oblivious_trees, scale, bias, n_features })
   }

   pub fn load(path: &Path) -> Result<Self> {
      let json = std::fs::read_to_string(path)?;
      let model = Self::from_json(&json)?;
      tracing::info!("loaded {} trees from {}", model.trees.len(), path.display());
      Ok(model)
   }

   pub fn n_trees(&self) -> usize {
      self.trees.len()
   }
}

impl Regressor for ObliviousEnsemble {
   fn predict_row(&self, row: ArrayView1<'_, f32>) -> f32 {
      let raw: f32 = self
         .trees
         .iter()
         .map(|tree| {
            let leaf = tree.splits.iter().enumerate().fold(0usize, |acc, (depth, split)| {
               let value = row.get(split.float_feature_index).copied().unwrap_or(0.0);
               if value > split.border { acc | (1 << depth) } else { acc }
            });
            tree.leaf_values[leaf]
         })
         .sum();
      self.scale.mul_add(raw, self.bias)
   }

   fn n_features(&self) -> usize {
      self.n_features
   }
}

/// Paired click and order regressors over the same feature rows.
#[derive(Clone)]
pub struct PropensityEstimator {
   click: Arc<dyn Regressor>,
   order: Arc<dyn Regressor>,
}

impl PropensityEstimator {
   pub fn new(click: Arc<dyn Regressor>, order: Arc<dyn Regressor>) -> Self {
      Self { click, order }
   }

   /// Loads both models, or `None` when either file is absent.
   pub fn load(click: &Path, order: &Path) -> Result<Option<Self>> {
      if !click.exists() || !order.exists() {
         tracing::warn!(
            "propensity models missing ({}, {}); lexical mode disabled",
            click.display(),
            order.display()
         );
         return Ok(None);
      }
      Ok(Some(Self::new(
         Arc::new(ObliviousEnsemble::load(click)?),
         Arc::new(ObliviousEnsemble::load(order)?),
      )))
   }

   /// `(click_scores, order_scores)`, one per feature row.
   pub fn estimate(&self, features: ArrayView2<'_, f32>) -> Result<(Vec<f32>, Vec<f32>)> {
      let (click, order) =
         rayon::join(|| self.click.predict(features), || self.order.predict(features));
      Ok((click?, order?))
   }

   pub fn is_ready(&self) -> bool {
      true
   }
}
