//! Sentence embedding for the dense recall engine.
//!
//! The BERT loading and batching here is shared with the cross-encoder and
//! late-interaction rerankers.

pub mod candle;

use std::sync::Arc;

pub use candle::{BertBackbone, CandleEncoder};

use crate::error::{Error, Result};

/// Turns text into unit-length vectors of a fixed dimension.
#[async_trait::async_trait]
pub trait Encoder: Send + Sync {
   /// Encodes a batch of texts, one vector per input, in input order.
   async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

   /// Encodes a single (already normalized) query.
   async fn encode_query(&self, text: &str) -> Result<Vec<f32>> {
      self
         .encode(&[text.to_string()])
         .await?
         .pop()
         .ok_or_else(|| Error::Embedding("encoder returned no vector".to_string()))
   }

   /// Output dimension.
   fn dim(&self) -> usize;

   /// Returns whether the model is loaded and can serve requests
   fn is_ready(&self) -> bool;
}

#[async_trait::async_trait]
impl<T: Encoder + ?Sized> Encoder for Arc<T> {
   async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
      (**self).encode(texts).await
   }

   async fn encode_query(&self, text: &str) -> Result<Vec<f32>> {
      (**self).encode_query(text).await
   }

   fn dim(&self) -> usize {
      (**self).dim()
   }

   fn is_ready(&self) -> bool {
      (**self).is_ready()
   }
}

pub fn normalize_l2(vec: &mut [f32]) {
   let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
   if norm > 0.0 {
      for x in vec.iter_mut() {
         *x /= norm;
      }
   }
}
