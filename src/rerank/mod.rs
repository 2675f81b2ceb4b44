//! Query/document relevance scoring for the semantic pipeline.

pub mod colbert;
pub mod cross;

use std::{fmt, path::Path, sync::Arc};

pub use colbert::LateInteraction;
pub use cross::CrossEncoder;
use serde::{Deserialize, Serialize};

use crate::{config::RerankerConfig, error::Result, types::PLACEHOLDER_TITLE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RerankerKind {
   #[serde(alias = "crossencoder")]
   CrossEncoder,
   Colbert,
}

impl fmt::Display for RerankerKind {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(match self {
         Self::CrossEncoder => "cross_encoder",
         Self::Colbert => "colbert",
      })
   }
}

/// Scores each document against the raw query. The output has exactly one
/// entry per document, in document order.
#[async_trait::async_trait]
pub trait Reranker: Send + Sync {
   async fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f32>>;

   fn kind(&self) -> RerankerKind;

   /// Returns whether the reranker model is loaded and ready
   fn is_ready(&self) -> bool;
}

#[async_trait::async_trait]
impl<T: Reranker + ?Sized> Reranker for Arc<T> {
   async fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f32>> {
      (**self).score(query, documents).await
   }

   fn kind(&self) -> RerankerKind {
      (**self).kind()
   }

   fn is_ready(&self) -> bool {
      (**self).is_ready()
   }
}

/// Loads the configured reranker implementation.
pub fn load(config: &RerankerConfig, cache_dir: &Path, batch_size: usize) -> Result<Arc<dyn Reranker>> {
   Ok(match config.kind {
      RerankerKind::CrossEncoder => {
         Arc::new(CrossEncoder::load(&config.cross_model, cache_dir, config.max_len, batch_size)?)
      },
      RerankerKind::Colbert => Arc::new(LateInteraction::load(
         &config.colbert_model,
         cache_dir,
         config.max_len,
         batch_size,
      )?),
   })
}

/// Text a reranker sees for a product: title (unless it is the placeholder),
/// level-2 category and leaf category (unless it repeats level 2).
pub fn doc_text(title: &str, level2: &str, leaf: &str) -> String {
   let (title, level2, leaf) = (title.trim(), level2.trim(), leaf.trim());
   let mut parts = Vec::with_capacity(3);
   if !title.is_empty() && title != PLACEHOLDER_TITLE {
      parts.push(title);
   }
   if !level2.is_empty() {
      parts.push(level2);
   }
   if !leaf.is_empty() && leaf != level2 {
      parts.push(leaf);
   }

   if parts.is_empty() { PLACEHOLDER_TITLE.to_string() } else { parts.join(" ") }
}
