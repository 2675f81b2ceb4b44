//! `ColBERT` late-interaction scoring with `MaxSim`.

use std::path::Path;

use candle_core::{D, Tensor};
use candle_nn::{Linear, Module};
use ndarray::Array2;

use crate::{
   config::COLBERT_DIM,
   embed::BertBackbone,
   error::{Error, Result},
   rerank::{Reranker, RerankerKind},
};

/// Computes `MaxSim` score between query and document token matrices.
///
/// For each query token, finds the maximum dot product with any document token
/// and sums these maxima.
pub fn max_sim(query: &Array2<f32>, doc: &Array2<f32>) -> f32 {
   if query.is_empty() || doc.is_empty() || query.ncols() != doc.ncols() {
      return 0.0;
   }

   query
      .outer_iter()
      .map(|q_row| {
         doc.outer_iter()
            .map(|d_row| q_row.dot(&d_row))
            .fold(f32::NEG_INFINITY, f32::max)
      })
      .sum()
}

/// Token-level encoder whose document scores are `MaxSim` against the query.
pub struct LateInteraction {
   backbone:   BertBackbone,
   projection: Option<Linear>,
   batch_size: usize,
}

impl LateInteraction {
   pub fn load(model_id: &str, cache_dir: &Path, max_len: usize, batch_size: usize) -> Result<Self> {
      let (backbone, vb) = BertBackbone::load(model_id, cache_dir, max_len)?;
      let projection =
         match candle_nn::linear_no_bias(backbone.hidden_size(), COLBERT_DIM, vb.pp("linear")) {
            Ok(linear) => Some(linear),
            Err(e) => {
               tracing::warn!("{} has no projection head ({}); using raw token states", model_id, e);
               None
            },
         };
      Ok(Self { backbone, projection, batch_size: batch_size.max(1) })
   }

   /// L2-normalized token embeddings of every text, padding removed.
   fn token_embeddings(&self, texts: &[&str]) -> Result<Vec<Array2<f32>>> {
      let batch = self.backbone.tokenize(texts.to_vec())?;
      let mut states = self.backbone.forward(&batch)?;
      if let Some(projection) = &self.projection {
         states = projection.forward(&states)?;
      }

      let norms = states.sqr()?.sum_keepdim(D::Minus1)?.sqrt()?.clamp(1e-12f32, f32::MAX)?;
      let states: Tensor = states.broadcast_div(&norms)?;
      let dim = states.dim(D::Minus1)?;
      let rows: Vec<Vec<Vec<f32>>> = states.to_vec3()?;

      rows
         .into_iter()
         .zip(&batch.lengths)
         .map(|(tokens, &len)| {
            let data: Vec<f32> = tokens.into_iter().take(len).flatten().collect();
            Array2::from_shape_vec((len, dim), data)
               .map_err(|e| Error::Rerank(format!("token matrix: {e}")))
         })
         .collect()
   }
}

#[async_trait::async_trait]
impl Reranker for LateInteraction {
   async fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f32>> {
      if documents.is_empty() {
         return Ok(Vec::new());
      }
      let query_tokens = self
         .token_embeddings(&[query])?
         .pop()
         .ok_or_else(|| Error::Rerank("query produced no tokens".to_string()))?;

      let mut scores = Vec::with_capacity(documents.len());
      for chunk in documents.chunks(self.batch_size) {
         let texts: Vec<&str> = chunk.iter().map(String::as_str).collect();
         for doc in self.token_embeddings(&texts)? {
            scores.push(max_sim(&query_tokens, &doc));
         }
      }
      Ok(scores)
   }

   fn kind(&self) -> RerankerKind {
      RerankerKind::Colbert
   }

   fn is_ready(&self) -> bool {
      true
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   fn matrix(data: Vec<f32>, dim: usize) -> Array2<f32> {
      let rows = data.len() / dim;
      Array2::from_shape_vec((rows, dim), data).unwrap()
   }

   #[test]
   fn test_max_sim() {
      let query = matrix(vec![1.0, 0.0, 0.0, 1.0], 2);
      let doc = matrix(vec![1.0, 0.0, 0.0, 1.0], 2);
      let score = max_sim(&query, &doc);
      assert!((score - 2.0).abs() < 1e-6);
   }

   #[test]
   fn test_max_sim_picks_best_doc_token() {
      let query = matrix(vec![0.8, 0.6], 2);
      let doc = matrix(vec![0.0, 1.0, 1.0, 0.0, -1.0, 0.0], 2);
      // best is [1, 0] with dot 0.8
      assert!((max_sim(&query, &doc) - 0.8).abs() < 1e-6);
   }

   #[test]
   fn test_max_sim_empty_or_mismatched() {
      let query = matrix(vec![1.0, 0.0], 2);
      assert_eq!(max_sim(&query, &Array2::zeros((0, 2))), 0.0);
      assert_eq!(max_sim(&query, &matrix(vec![1.0, 0.0, 0.0], 3)), 0.0);
   }

   #[test]
   fn test_max_sim_prefers_covering_document() {
      let query = matrix(vec![1.0, 0.0, 0.0, 1.0], 2);
      let partial = matrix(vec![1.0, 0.0], 2);
      let full = matrix(vec![0.0, 1.0, 1.0, 0.0], 2);
      assert!(max_sim(&query, &full) > max_sim(&query, &partial));
   }
}
