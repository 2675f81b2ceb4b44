//! Embedding recall: encode the query, search the ANN index, map rows to ids.

pub mod ann;

use std::{collections::HashSet, path::Path, sync::Arc};

use moka::future::Cache;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::{
   config::AnnConfig,
   dense::ann::AnnIndex,
   embed::{Encoder, normalize_l2},
   error::{Error, Result},
   types::{Candidate, Query},
};

const ARTIFACT_VERSION: u32 = 1;

/// Unit-normalized `M x D` embedding rows with the product id of every row.
pub struct EmbeddingIndex {
   matrix: Arc<Array2<f32>>,
   ids:    Vec<String>,
   ann:    Box<dyn AnnIndex>,
}

#[derive(Serialize, Deserialize)]
struct EmbeddingArtifact {
   version: u32,
   dim:     usize,
   ids:     Vec<String>,
   data:    Vec<f32>,
}

impl EmbeddingIndex {
   /// Normalizes every row and builds the configured ANN structure.
   pub fn new(mut matrix: Array2<f32>, ids: Vec<String>, ann: &AnnConfig) -> Result<Self> {
      if matrix.nrows() != ids.len() {
         return Err(Error::ShapeMismatch {
            op:       "embedding index",
            expected: ids.len(),
            actual:   matrix.nrows(),
         });
      }
      let mut seen = HashSet::with_capacity(ids.len());
      if let Some(dup) = ids.iter().find(|id| !seen.insert(id.as_str())) {
         return Err(Error::InvalidIndex(format!("duplicate product id '{dup}'")));
      }

      for mut row in matrix.rows_mut() {
         if let Some(slice) = row.as_slice_mut() {
            normalize_l2(slice);
         }
      }

      let matrix = Arc::new(matrix);
      let ann = ann::build(Arc::clone(&matrix), ann);
      Ok(Self { matrix, ids, ann })
   }

   pub fn from_rows(rows: Vec<Vec<f32>>, ids: Vec<String>, ann: &AnnConfig) -> Result<Self> {
      let dim = rows.first().map_or(0, Vec::len);
      if let Some(bad) = rows.iter().find(|r| r.len() != dim) {
         return Err(Error::ShapeMismatch { op: "embedding rows", expected: dim, actual: bad.len() });
      }
      let n = rows.len();
      let data: Vec<f32> = rows.into_iter().flatten().collect();
      let matrix = Array2::from_shape_vec((n, dim), data)
         .map_err(|e| Error::InvalidIndex(format!("embedding matrix: {e}")))?;
      Self::new(matrix, ids, ann)
   }

   pub fn len(&self) -> usize {
      self.ids.len()
   }

   pub fn is_empty(&self) -> bool {
      self.ids.is_empty()
   }

   pub fn dim(&self) -> usize {
      self.matrix.ncols()
   }

   pub fn ids(&self) -> &[String] {
      &self.ids
   }

   pub fn ann(&self) -> &dyn AnnIndex {
      self.ann.as_ref()
   }

   pub fn search(&self, query: &[f32], k: usize) -> Vec<Candidate> {
      self
         .ann
         .search(query, k)
         .into_iter()
         .filter_map(|(row, score)| self.ids.get(row).map(|id| Candidate::recalled(id.clone(), score)))
         .collect()
   }

   pub fn save(&self, path: &Path) -> Result<()> {
      if let Some(parent) = path.parent() {
         std::fs::create_dir_all(parent)?;
      }
      let artifact = EmbeddingArtifact {
         version: ARTIFACT_VERSION,
         dim:     self.dim(),
         ids:     self.ids.clone(),
         data:    self.matrix.iter().copied().collect(),
      };
      std::fs::write(path, postcard::to_allocvec(&artifact)?)?;
      Ok(())
   }

   pub fn load(path: &Path, ann: &AnnConfig) -> Result<Self> {
      let bytes = std::fs::read(path)?;
      let artifact: EmbeddingArtifact = postcard::from_bytes(&bytes)?;
      if artifact.version != ARTIFACT_VERSION {
         return Err(Error::InvalidIndex(format!(
            "embedding artifact version {} (expected {ARTIFACT_VERSION})",
            artifact.version
         )));
      }
      let matrix = Array2::from_shape_vec((artifact.ids.len(), artifact.dim), artifact.data)
         .map_err(|e| Error::InvalidIndex(format!("embedding matrix: {e}")))?;
      Self::new(matrix, artifact.ids, ann)
   }
}

/// Encoder plus embedding index, with a bounded cache of encoded queries.
pub struct DenseEngine {
   encoder: Arc<dyn Encoder>,
   index:   EmbeddingIndex,
   cache:   Cache<String, Arc<Vec<f32>>>,
}

impl DenseEngine {
   pub fn new(encoder: Arc<dyn Encoder>, index: EmbeddingIndex, cache_size: u64) -> Result<Self> {
      if encoder.dim() != index.dim() && !index.is_empty() {
         return Err(Error::ShapeMismatch {
            op:       "dense engine",
            expected: index.dim(),
            actual:   encoder.dim(),
         });
      }
      Ok(Self { encoder, index, cache: Cache::new(cache_size) })
   }

   pub fn is_ready(&self) -> bool {
      self.encoder.is_ready()
   }

   pub const fn index(&self) -> &EmbeddingIndex {
      &self.index
   }

   async fn query_vector(&self, query: &Query) -> Result<Arc<Vec<f32>>> {
      let key = query.normalized().to_string();
      let encoder = Arc::clone(&self.encoder);
      self
         .cache
         .try_get_with(key.clone(), async move {
            let mut vec = encoder.encode_query(&key).await?;
            normalize_l2(&mut vec);
            Ok::<_, Error>(Arc::new(vec))
         })
         .await
         .map_err(|e| Arc::try_unwrap(e).unwrap_or_else(|e| Error::Embedding(e.to_string())))
   }

   /// `k` nearest products to the query; empty queries recall nothing.
   pub async fn recall(&self, query: &Query, k: usize) -> Result<Vec<Candidate>> {
      if query.is_empty() || k == 0 {
         return Ok(Vec::new());
      }
      if !self.is_ready() {
         return Err(Error::Embedding("encoder is not ready".to_string()));
      }
      let vector = self.query_vector(query).await?;
      Ok(self.index.search(&vector, k))
   }
}

#[cfg(test)]
pub(crate) mod tests {
   use std::sync::atomic::{AtomicUsize, Ordering};

   use tempfile::TempDir;

   use super::*;
   use crate::dense::ann::AnnKind;

   /// Maps a handful of known words onto fixed axes.
   pub struct KeywordEncoder {
      pub calls: AtomicUsize,
   }

   impl KeywordEncoder {
      pub const AXES: [&'static str; 3] = ["elbise", "ceket", "ayakkabı"];

      pub fn new() -> Self {
         Self { calls: AtomicUsize::new(0) }
      }
   }

   #[async_trait::async_trait]
   impl Encoder for KeywordEncoder {
      async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
         self.calls.fetch_add(1, Ordering::SeqCst);
         Ok(texts
            .iter()
            .map(|t| {
               let t = t.to_lowercase();
               let mut v: Vec<f32> =
                  Self::AXES.iter().map(|a| if t.contains(a) { 1.0 } else { 0.0 }).collect();
               v.push(0.01);
               normalize_l2(&mut v);
               v
            })
            .collect())
      }

      fn dim(&self) -> usize {
         Self::AXES.len() + 1
      }

      fn is_ready(&self) -> bool {
         true
      }
   }

   fn engine(kind: AnnKind) -> DenseEngine {
      let rows = vec![
         vec![0.0, 1.0, 0.0, 0.0],
         vec![1.0, 0.0, 0.0, 0.0],
         vec![0.8, 0.0, 0.6, 0.0],
         vec![0.0, 0.0, 1.0, 0.0],
      ];
      let ids = ["ceket-1", "elbise-1", "elbise-2", "ayakkabi-1"].map(String::from).to_vec();
      let index = EmbeddingIndex::from_rows(rows, ids, &AnnConfig { kind, ..AnnConfig::default() })
         .unwrap();
      DenseEngine::new(Arc::new(KeywordEncoder::new()), index, 64).unwrap()
   }

   #[tokio::test]
   async fn recall_maps_rows_to_ids() {
      let engine = engine(AnnKind::Flat);
      let hits = engine.recall(&Query::new("Yazlık ELBISE"), 2).await.unwrap();
      let ids: Vec<_> = hits.iter().map(|c| c.id.as_str()).collect();
      assert_eq!(ids, ["elbise-1", "elbise-2"]);
      assert!(hits[0].recall_score > hits[1].recall_score);
   }

   #[tokio::test]
   async fn hnsw_agrees_with_flat_on_top_hit() {
      let flat = engine(AnnKind::Flat);
      let hnsw = engine(AnnKind::Hnsw);
      let q = Query::new("ceket");
      let a = flat.recall(&q, 1).await.unwrap();
      let b = hnsw.recall(&q, 1).await.unwrap();
      assert_eq!(a[0].id, "ceket-1");
      assert_eq!(a[0].id, b[0].id);
   }

   #[tokio::test]
   async fn empty_query_skips_encoder() {
      let encoder = Arc::new(KeywordEncoder::new());
      let index = EmbeddingIndex::from_rows(
         vec![vec![1.0, 0.0, 0.0, 0.0]],
         vec!["p".into()],
         &AnnConfig::default(),
      )
      .unwrap();
      let engine = DenseEngine::new(encoder.clone(), index, 8).unwrap();
      assert!(engine.recall(&Query::new(" -- "), 5).await.unwrap().is_empty());
      assert_eq!(encoder.calls.load(Ordering::SeqCst), 0);
   }

   #[tokio::test]
   async fn repeated_queries_hit_the_cache() {
      let encoder = Arc::new(KeywordEncoder::new());
      let index = EmbeddingIndex::from_rows(
         vec![vec![1.0, 0.0, 0.0, 0.0]],
         vec!["p".into()],
         &AnnConfig::default(),
      )
      .unwrap();
      let engine = DenseEngine::new(encoder.clone(), index, 8).unwrap();
      engine.recall(&Query::new("elbise"), 1).await.unwrap();
      engine.recall(&Query::new("ELBISE!"), 1).await.unwrap();
      assert_eq!(encoder.calls.load(Ordering::SeqCst), 1);
   }

   #[test]
   fn construction_normalizes_and_validates() {
      let index = EmbeddingIndex::from_rows(
         vec![vec![3.0, 4.0]],
         vec!["p".into()],
         &AnnConfig::default(),
      )
      .unwrap();
      let hits = index.search(&[0.6, 0.8], 1);
      assert!((hits[0].recall_score - 1.0).abs() < 1e-6);

      let mismatch = EmbeddingIndex::from_rows(
         vec![vec![1.0, 0.0]],
         vec!["a".into(), "b".into()],
         &AnnConfig::default(),
      );
      assert!(matches!(mismatch, Err(Error::ShapeMismatch { .. })));

      let dup = EmbeddingIndex::from_rows(
         vec![vec![1.0, 0.0], vec![0.0, 1.0]],
         vec!["a".into(), "a".into()],
         &AnnConfig::default(),
      );
      assert!(matches!(dup, Err(Error::InvalidIndex(_))));
   }

   #[test]
   fn encoder_dimension_must_match_index() {
      let index = EmbeddingIndex::from_rows(
         vec![vec![1.0, 0.0]],
         vec!["p".into()],
         &AnnConfig::default(),
      )
      .unwrap();
      assert!(DenseEngine::new(Arc::new(KeywordEncoder::new()), index, 8).is_err());
   }

   #[test]
   fn artifact_round_trip() {
      let dir = TempDir::new().unwrap();
      let path = dir.path().join("embeddings.bin");
      let index = EmbeddingIndex::from_rows(
         vec![vec![1.0, 0.0], vec![0.0, 2.0]],
         vec!["a".into(), "b".into()],
         &AnnConfig::default(),
      )
      .unwrap();
      index.save(&path).unwrap();

      let loaded = EmbeddingIndex::load(&path, &AnnConfig::default()).unwrap();
      assert_eq!(loaded.ids(), index.ids());
      assert_eq!(loaded.dim(), 2);
      assert_eq!(loaded.search(&[0.0, 1.0], 1)[0].id, "b");
   }
}
