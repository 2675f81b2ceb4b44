use std::path::Path;

use candle_core::Tensor;
use candle_nn::{Linear, Module, VarBuilder};

use crate::{
   embed::BertBackbone,
   error::{Error, Result},
   rerank::{Reranker, RerankerKind},
};

/// Sequence-pair classifier: `[CLS] query [SEP] doc [SEP]` through BERT, the
/// pooler and a single-logit head.
pub struct CrossEncoder {
   backbone:   BertBackbone,
   pooler:     Linear,
   classifier: Linear,
   batch_size: usize,
}

impl CrossEncoder {
   pub fn load(model_id: &str, cache_dir: &Path, max_len: usize, batch_size: usize) -> Result<Self> {
      let (backbone, vb) = BertBackbone::load(model_id, cache_dir, max_len)?;
      let hidden = backbone.hidden_size();

      let pooler = Self::load_pooler(&vb, hidden)?;
      let classifier = candle_nn::linear(hidden, 1, vb.pp("classifier"))
         .map_err(|e| Error::ModelLoad(format!("failed to load classifier head: {e}")))?;

      Ok(Self { backbone, pooler, classifier, batch_size: batch_size.max(1) })
   }

   fn load_pooler(vb: &VarBuilder<'static>, hidden: usize) -> Result<Linear> {
      candle_nn::linear(hidden, hidden, vb.pp("bert.pooler.dense"))
         .or_else(|_| candle_nn::linear(hidden, hidden, vb.pp("pooler.dense")))
         .map_err(|e| Error::ModelLoad(format!("failed to load pooler: {e}")))
   }

   fn score_chunk(&self, query: &str, documents: &[String]) -> Result<Vec<f32>> {
      let pairs: Vec<(&str, &str)> = documents.iter().map(|d| (query, d.as_str())).collect();
      let batch = self.backbone.tokenize(pairs)?;
      let hidden = self.backbone.forward(&batch)?;

      let cls = hidden.narrow(1, 0, 1)?.squeeze(1)?;
      let pooled = self.pooler.forward(&cls)?.tanh()?;
      let logits: Tensor = self.classifier.forward(&pooled)?.squeeze(1)?;
      Ok(logits.to_vec1()?)
   }
}

#[async_trait::async_trait]
impl Reranker for CrossEncoder {
   async fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f32>> {
      let mut scores = Vec::with_capacity(documents.len());
      for chunk in documents.chunks(self.batch_size) {
         scores.extend(self.score_chunk(query, chunk)?);
      }
      Ok(scores)
   }

   fn kind(&self) -> RerankerKind {
      RerankerKind::CrossEncoder
   }

   fn is_ready(&self) -> bool {
      true
   }
}
