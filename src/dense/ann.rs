//! Nearest-neighbor search over unit-normalized embedding rows.

use std::sync::Arc;

use hnsw_rs::{hnsw::Hnsw, prelude::DistCosine};
use ndarray::{Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{config::AnnConfig, fusion};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnKind {
   /// Exact inner-product scan.
   Flat,
   Hnsw,
}

/// `(row, inner product)` pairs, best first.
pub trait AnnIndex: Send + Sync {
   fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)>;
   fn len(&self) -> usize;
   fn kind(&self) -> AnnKind;

   fn is_empty(&self) -> bool {
      self.len() == 0
   }
}

pub struct FlatIndex {
   matrix: Arc<Array2<f32>>,
}

impl FlatIndex {
   pub const fn new(matrix: Arc<Array2<f32>>) -> Self {
      Self { matrix }
   }
}

impl AnnIndex for FlatIndex {
   fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
      if query.len() != self.matrix.ncols() {
         return Vec::new();
      }
      let q = ArrayView1::from(query);
      let scores: Vec<(usize, f32)> = (0..self.matrix.nrows())
         .into_par_iter()
         .map(|row| (row, self.matrix.row(row).dot(&q)))
         .collect();
      fusion::top_k_scored(scores, k)
   }

   fn len(&self) -> usize {
      self.matrix.nrows()
   }

   fn kind(&self) -> AnnKind {
      AnnKind::Flat
   }
}

/// Approximate search with a navigable small-world graph. On unit vectors the
/// cosine distance is `1 - dot`, so scores are reported as `1 - distance`.
pub struct HnswIndex {
   graph:     Hnsw<'static, f32, DistCosine>,
   rows:      usize,
   ef_search: usize,
}

const MAX_LAYER: usize = 16;

impl HnswIndex {
   pub fn build(matrix: &Array2<f32>, config: &AnnConfig) -> Self {
      let rows = matrix.nrows();
      let graph = Hnsw::<f32, DistCosine>::new(
         config.max_connections.max(2),
         rows.max(1),
         MAX_LAYER,
         config.ef_construction.max(1),
         DistCosine {},
      );

      let data: Vec<(Vec<f32>, usize)> =
         matrix.outer_iter().enumerate().map(|(i, row)| (row.to_vec(), i)).collect();
      let refs: Vec<(&Vec<f32>, usize)> = data.iter().map(|(v, i)| (v, *i)).collect();
      graph.parallel_insert(&refs);

      tracing::info!("built hnsw graph over {} rows", rows);
      Self { graph, rows, ef_search: config.ef_search }
   }
}

impl AnnIndex for HnswIndex {
   fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
      if k == 0 || self.rows == 0 {
         return Vec::new();
      }
      let ef = self.ef_search.max(k);
      let hits = self
         .graph
         .search(query, k, ef)
         .into_iter()
         .map(|n| (n.d_id, 1.0 - n.distance));
      // graph order is by distance only; re-sort for deterministic ties
      fusion::top_k_scored(hits, k)
   }

   fn len(&self) -> usize {
      self.rows
   }

   fn kind(&self) -> AnnKind {
      AnnKind::Hnsw
   }
}

pub fn build(matrix: Arc<Array2<f32>>, config: &AnnConfig) -> Box<dyn AnnIndex> {
   match config.kind {
      AnnKind::Flat => Box::new(FlatIndex::new(matrix)),
      AnnKind::Hnsw => Box::new(HnswIndex::build(&matrix, config)),
   }
}
