//! Sparse TF-IDF recall over the full product corpus.

pub mod vectorizer;

use std::{collections::HashMap, path::Path};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
pub use vectorizer::{FitOptions, SparseVec, Vocabulary};

use crate::{
   error::{Error, Result},
   fusion,
   types::{Candidate, Query},
};

const ARTIFACT_VERSION: u32 = 1;

/// Row-compressed sparse matrix of document vectors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SparseMatrix {
   indptr:  Vec<usize>,
   indices: Vec<u32>,
   values:  Vec<f32>,
}

impl SparseMatrix {
   pub fn from_rows<R: AsRef<[(u32, f32)]>>(rows: &[R]) -> Self {
      let nnz = rows.iter().map(|r| r.as_ref().len()).sum();
      let mut matrix = Self {
         indptr:  Vec::with_capacity(rows.len() + 1),
         indices: Vec::with_capacity(nnz),
         values:  Vec::with_capacity(nnz),
      };
      matrix.indptr.push(0);
      for row in rows {
         let mut row = row.as_ref().to_vec();
         row.sort_unstable_by_key(|(dim, _)| *dim);
         for (dim, weight) in row {
            matrix.indices.push(dim);
            matrix.values.push(weight);
         }
         matrix.indptr.push(matrix.indices.len());
      }
      matrix
   }

   pub fn nrows(&self) -> usize {
      self.indptr.len().saturating_sub(1)
   }

   pub fn row(&self, i: usize) -> impl Iterator<Item = (u32, f32)> + '_ {
      let (start, end) = (self.indptr[i], self.indptr[i + 1]);
      self.indices[start..end]
         .iter()
         .copied()
         .zip(self.values[start..end].iter().copied())
   }

   fn row_norm(&self, i: usize) -> f32 {
      self.row(i).map(|(_, w)| w * w).sum::<f32>().sqrt()
   }

   fn validate(&self, dims: usize) -> Result<()> {
      let structurally_sound = !self.indptr.is_empty()
         && self.indptr[0] == 0
         && self.indptr.windows(2).all(|w| w[0] <= w[1])
         && self.indptr.last() == Some(&self.indices.len())
         && self.indices.len() == self.values.len();
      if !structurally_sound {
         return Err(Error::InvalidIndex("malformed sparse matrix".to_string()));
      }
      if let Some(dim) = self.indices.iter().find(|d| **d as usize >= dims) {
         return Err(Error::InvalidIndex(format!(
            "dimension {dim} outside vocabulary of {dims} terms"
         )));
      }
      let unsorted = self.indptr.windows(2).position(|w| {
         self.indices[w[0]..w[1]].windows(2).any(|pair| pair[0] >= pair[1])
      });
      if let Some(row) = unsorted {
         return Err(Error::InvalidIndex(format!(
            "row {row} dimensions are not strictly increasing"
         )));
      }
      Ok(())
   }

   fn row_dot(&self, i: usize, query: &[(u32, f32)]) -> f32 {
      let (start, end) = (self.indptr[i], self.indptr[i + 1]);
      vectorizer::sparse_dot(&self.indices[start..end], &self.values[start..end], query)
   }
}

/// Vocabulary, document vectors and the product ids they belong to. Row `i`
/// of the matrix always describes `ids[i]`.
#[derive(Debug, Clone)]
pub struct CorpusIndex {
   vocabulary: Vocabulary,
   vectors:    SparseMatrix,
   row_norms:  Vec<f32>,
   ids:        Vec<String>,
   id_to_row:  HashMap<String, usize>,
}

#[derive(Serialize, Deserialize)]
struct CorpusArtifact {
   version:    u32,
   vocabulary: Vocabulary,
   vectors:    SparseMatrix,
   ids:        Vec<String>,
}

impl CorpusIndex {
   pub fn new(vocabulary: Vocabulary, vectors: SparseMatrix, ids: Vec<String>) -> Result<Self> {
      if vectors.nrows() != ids.len() {
         return Err(Error::ShapeMismatch {
            op:       "corpus index",
            expected: ids.len(),
            actual:   vectors.nrows(),
         });
      }
      vectors.validate(vocabulary.len())?;

      let mut id_to_row = HashMap::with_capacity(ids.len());
      for (row, id) in ids.iter().enumerate() {
         if id_to_row.insert(id.clone(), row).is_some() {
            return Err(Error::InvalidIndex(format!("duplicate product id '{id}'")));
         }
      }

      let row_norms = (0..vectors.nrows()).map(|row| vectors.row_norm(row)).collect();
      Ok(Self { vocabulary, vectors, row_norms, ids, id_to_row })
   }

   fn cosine(&self, row: usize, query: &[(u32, f32)], query_norm: f32) -> f32 {
      let row_norm = self.row_norms[row];
      if row_norm == 0.0 || query_norm == 0.0 {
         return 0.0;
      }
      self.vectors.row_dot(row, query) / (row_norm * query_norm)
   }

   /// Fits a vocabulary over `(id, text)` documents and indexes them.
   pub fn fit<I, S>(documents: I, options: FitOptions) -> Result<Self>
   where
      I: IntoIterator<Item = (String, S)>,
      S: Into<String>,
   {
      let (ids, texts): (Vec<String>, Vec<String>) =
         documents.into_iter().map(|(id, text)| (id, text.into())).unzip();
      let (vocabulary, rows) = vectorizer::fit(&texts, options)?;
      Self::new(vocabulary, SparseMatrix::from_rows(&rows), ids)
   }

   pub fn len(&self) -> usize {
      self.ids.len()
   }

   pub fn is_empty(&self) -> bool {
      self.ids.is_empty()
   }

   pub fn vocabulary(&self) -> &Vocabulary {
      &self.vocabulary
   }

   pub fn ids(&self) -> &[String] {
      &self.ids
   }

   pub fn row_of(&self, id: &str) -> Option<usize> {
      self.id_to_row.get(id).copied()
   }

   pub fn save(&self, path: &Path) -> Result<()> {
      if let Some(parent) = path.parent() {
         std::fs::create_dir_all(parent)?;
      }
      let artifact = CorpusArtifact {
         version:    ARTIFACT_VERSION,
         vocabulary: self.vocabulary.clone(),
         vectors:    self.vectors.clone(),
         ids:        self.ids.clone(),
      };
      std::fs::write(path, postcard::to_allocvec(&artifact)?)?;
      Ok(())
   }

   pub fn load(path: &Path) -> Result<Self> {
      let bytes = std::fs::read(path)?;
      let artifact: CorpusArtifact = postcard::from_bytes(&bytes)?;
      if artifact.version != ARTIFACT_VERSION {
         return Err(Error::InvalidIndex(format!(
            "lexical artifact version {} (expected {ARTIFACT_VERSION})",
            artifact.version
         )));
      }
      Self::new(artifact.vocabulary.validated()?, artifact.vectors, artifact.ids)
   }
}

/// Cosine-similarity recall over a [`CorpusIndex`].
pub struct LexicalEngine {
   index: CorpusIndex,
}

impl LexicalEngine {
   pub const fn new(index: CorpusIndex) -> Self {
      Self { index }
   }

   pub const fn index(&self) -> &CorpusIndex {
      &self.index
   }

   pub const fn is_ready(&self) -> bool {
      true
   }

   fn query_vector(&self, query: &Query) -> Option<(SparseVec, f32)> {
      if query.is_empty() {
         return None;
      }
      let vec = self.index.vocabulary.transform(query.normalized());
      let norm = vec.iter().map(|(_, w)| w * w).sum::<f32>().sqrt();
      Some((vec, norm))
   }

   /// The `k` most similar documents, best first; ties keep corpus order.
   pub fn recall(&self, query: &Query, k: usize) -> Vec<Candidate> {
      let Some((qv, q_norm)) = self.query_vector(query) else {
         return Vec::new();
      };
      if k == 0 || q_norm == 0.0 {
         // nothing in vocabulary: every similarity is zero
         return self
            .index
            .ids
            .iter()
            .take(k)
            .map(|id| Candidate::recalled(id.clone(), 0.0))
            .collect();
      }

      let sims: Vec<(usize, f32)> = (0..self.index.len())
         .into_par_iter()
         .map(|row| (row, self.index.cosine(row, &qv, q_norm)))
         .collect();

      fusion::top_k_scored(sims, k)
         .into_iter()
         .map(|(row, score)| Candidate::recalled(self.index.ids[row].clone(), score))
         .collect()
   }

   /// Similarity between the query and one product; 0 for unknown ids.
   pub fn similarity(&self, query: &Query, id: &str) -> f32 {
      self.similarities(query, &[id])[0]
   }

   /// Vectorizes the query once and scores each id against its own row.
   pub fn similarities<S: AsRef<str>>(&self, query: &Query, ids: &[S]) -> Vec<f32> {
      let Some((qv, q_norm)) = self.query_vector(query) else {
         return vec![0.0; ids.len()];
      };
      ids.iter()
         .map(|id| {
            self
               .index
               .row_of(id.as_ref())
               .map_or(0.0, |row| self.index.cosine(row, &qv, q_norm))
         })
         .collect()
   }
}

#[cfg(test)]
mod tests {
   use tempfile::TempDir;

   use super::*;

   /// Vocabulary `[mavi, elbise, pantolon]` with unit idf and rows whose
   /// cosine to "mavi elbise" equals each target similarity.
   fn engine_with_similarities(ids: &[&str], sims: &[f32]) -> LexicalEngine {
      let vocab = Vocabulary::new(
         vec!["mavi".into(), "elbise".into(), "pantolon".into()],
         vec![1.0, 1.0, 1.0],
         1,
      )
      .unwrap();
      let rows: Vec<Vec<(u32, f32)>> = sims
         .iter()
         .map(|&s| {
            let x = s / std::f32::consts::SQRT_2;
            vec![(0, x), (1, x), (2, (1.0 - s * s).sqrt())]
         })
         .collect();
      let index = CorpusIndex::new(
         vocab,
         SparseMatrix::from_rows(&rows),
         ids.iter().map(|s| (*s).to_string()).collect(),
      )
      .unwrap();
      LexicalEngine::new(index)
   }

   #[test]
   fn recall_returns_top_k_in_score_order() {
      let engine = engine_with_similarities(&["A", "B", "C"], &[0.9, 0.1, 0.5]);
      let hits = engine.recall(&Query::new("mavi elbise"), 2);

      let ids: Vec<_> = hits.iter().map(|c| c.id.as_str()).collect();
      assert_eq!(ids, ["A", "C"]);
      assert!((hits[0].recall_score - 0.9).abs() < 1e-5);
      assert!((hits[1].recall_score - 0.5).abs() < 1e-5);
   }

   #[test]
   fn ties_keep_corpus_order() {
      let engine = engine_with_similarities(&["A", "B", "C", "D"], &[0.3, 0.7, 0.7, 0.3]);
      let hits = engine.recall(&Query::new("mavi elbise"), 4);
      let ids: Vec<_> = hits.iter().map(|c| c.id.as_str()).collect();
      assert_eq!(ids, ["B", "C", "A", "D"]);
   }

   #[test]
   fn empty_query_recalls_nothing() {
      let engine = engine_with_similarities(&["A"], &[0.9]);
      assert!(engine.recall(&Query::new("  ?! "), 10).is_empty());
      assert_eq!(engine.similarities(&Query::new(""), &["A", "B"]), vec![0.0, 0.0]);
   }

   #[test]
   fn out_of_vocabulary_query_scores_zero() {
      let engine = engine_with_similarities(&["A", "B"], &[0.9, 0.2]);
      let hits = engine.recall(&Query::new("ayakkabı"), 5);
      assert_eq!(hits.len(), 2);
      assert!(hits.iter().all(|c| c.recall_score == 0.0));
   }

   #[test]
   fn similarity_matches_recall_and_defaults_unknown_ids() {
      let engine = engine_with_similarities(&["A", "B", "C"], &[0.9, 0.1, 0.5]);
      let q = Query::new("Mavi Elbise");
      assert!((engine.similarity(&q, "C") - 0.5).abs() < 1e-5);
      let sims = engine.similarities(&q, &["B", "missing", "A"]);
      assert!((sims[0] - 0.1).abs() < 1e-5);
      assert_eq!(sims[1], 0.0);
      assert!((sims[2] - 0.9).abs() < 1e-5);
   }

   #[test]
   fn construction_enforces_row_id_alignment() {
      let vocab = Vocabulary::new(vec!["mavi".into()], vec![1.0], 1).unwrap();
      let rows = vec![vec![(0u32, 1.0f32)]];
      let err = CorpusIndex::new(
         vocab.clone(),
         SparseMatrix::from_rows(&rows),
         vec!["A".into(), "B".into()],
      );
      assert!(matches!(err, Err(Error::ShapeMismatch { .. })));

      let dup = CorpusIndex::new(
         vocab.clone(),
         SparseMatrix::from_rows(&[vec![(0u32, 1.0f32)], vec![(0, 1.0)]]),
         vec!["A".into(), "A".into()],
      );
      assert!(matches!(dup, Err(Error::InvalidIndex(_))));

      let out_of_range =
         CorpusIndex::new(vocab, SparseMatrix::from_rows(&[vec![(4u32, 1.0f32)]]), vec![
            "A".into(),
         ]);
      assert!(matches!(out_of_range, Err(Error::InvalidIndex(_))));
   }

   #[test]
   fn fit_then_recall_finds_matching_products() {
      let index = CorpusIndex::fit(
         vec![
            ("p1".to_string(), "Mavi Yazlık Elbise"),
            ("p2".to_string(), "Siyah Deri Ceket"),
            ("p3".to_string(), "Mavi Kot Pantolon"),
         ],
         FitOptions::default(),
      )
      .unwrap();
      let engine = LexicalEngine::new(index);

      let hits = engine.recall(&Query::new("mavi elbise"), 2);
      assert_eq!(hits[0].id, "p1");
      assert_eq!(hits[1].id, "p3");
      assert!(hits[0].recall_score > hits[1].recall_score);
   }

   #[test]
   fn artifact_round_trip_preserves_lookup() {
      let dir = TempDir::new().unwrap();
      let path = dir.path().join("lexical.bin");
      let index = CorpusIndex::fit(
         vec![("p1".to_string(), "mavi elbise"), ("p2".to_string(), "siyah ceket")],
         FitOptions::default(),
      )
      .unwrap();
      index.save(&path).unwrap();

      let loaded = CorpusIndex::load(&path).unwrap();
      assert_eq!(loaded.ids(), index.ids());
      assert_eq!(loaded.row_of("p2"), Some(1));
      assert_eq!(loaded.vocabulary().dimension("ceket"), index.vocabulary().dimension("ceket"));
   }

   #[test]
   fn rows_must_have_increasing_dimensions() {
      let vocab = Vocabulary::new(vec!["mavi".into(), "elbise".into()], vec![1.0, 1.0], 1).unwrap();
      let unsorted = SparseMatrix { indptr: vec![0, 1, 3], indices: vec![0, 1, 0], values: vec![1.0; 3] };
      let err = CorpusIndex::new(vocab.clone(), unsorted, vec!["A".into(), "B".into()]);
      assert!(matches!(err, Err(Error::InvalidIndex(msg)) if msg.contains("row 1")));

      let repeated = SparseMatrix { indptr: vec![0, 2], indices: vec![1, 1], values: vec![0.5; 2] };
      let err = CorpusIndex::new(vocab, repeated, vec!["A".into()]);
      assert!(matches!(err, Err(Error::InvalidIndex(_))));
   }

   #[test]
   fn load_rejects_idf_shorter_than_vocabulary() {
      #[derive(Serialize)]
      struct RawVocabulary {
         terms:     Vec<String>,
         idf:       Vec<f32>,
         ngram_max: u8,
      }
      #[derive(Serialize)]
      struct RawArtifact {
         version:    u32,
         vocabulary: RawVocabulary,
         vectors:    SparseMatrix,
         ids:        Vec<String>,
      }

      let dir = TempDir::new().unwrap();
      let path = dir.path().join("lexical.bin");
      let artifact = RawArtifact {
         version:    ARTIFACT_VERSION,
         vocabulary: RawVocabulary {
            terms:     vec!["mavi".into(), "elbise".into()],
            idf:       vec![1.0],
            ngram_max: 1,
         },
         vectors:    SparseMatrix::from_rows(&[vec![(1u32, 1.0f32)]]),
         ids:        vec!["p1".into()],
      };
      std::fs::write(&path, postcard::to_allocvec(&artifact).unwrap()).unwrap();

      let err = CorpusIndex::load(&path);
      assert!(matches!(err, Err(Error::ShapeMismatch { op: "vocabulary", expected: 2, actual: 1 })));
   }

   #[test]
   fn cosine_uses_row_norms() {
      let vocab = Vocabulary::new(vec!["mavi".into(), "elbise".into()], vec![1.0, 1.0], 1).unwrap();
      let rows = vec![vec![(0u32, 3.0f32), (1, 4.0)], vec![]];
      let index = CorpusIndex::new(vocab, SparseMatrix::from_rows(&rows), vec!["A".into(), "B".into()])
         .unwrap();
      let engine = LexicalEngine::new(index);
      let sims = engine.similarities(&Query::new("elbise"), &["A", "B"]);
      assert!((sims[0] - 0.8).abs() < 1e-6);
      assert_eq!(sims[1], 0.0);
   }
}
