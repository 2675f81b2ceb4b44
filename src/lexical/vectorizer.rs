//! TF-IDF term weighting over a fixed vocabulary.

use std::{
   cmp::Ordering,
   collections::{BTreeMap, HashMap},
};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::{
   error::{Error, Result},
   normalize::{normalize, tokens},
};

/// Sparse vector as `(dimension, weight)` pairs sorted by dimension.
pub type SparseVec = SmallVec<[(u32, f32); 16]>;

const MIN_TOKEN_CHARS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitOptions {
   /// Terms appearing in fewer documents are dropped.
   pub min_df:    usize,
   /// Largest word n-gram, 1 or 2.
   pub ngram_max: u8,
}

impl Default for FitOptions {
   fn default() -> Self {
      Self { min_df: 1, ngram_max: 1 }
   }
}

/// Term → dimension mapping plus the idf weight of every dimension.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vocabulary {
   terms:     Vec<String>,
   idf:       Vec<f32>,
   ngram_max: u8,
   #[serde(skip)]
   lookup:    HashMap<String, u32>,
}

impl Vocabulary {
   pub fn new(terms: Vec<String>, idf: Vec<f32>, ngram_max: u8) -> Result<Self> {
      if terms.len() != idf.len() {
         return Err(Error::ShapeMismatch {
            op:       "vocabulary",
            expected: terms.len(),
            actual:   idf.len(),
         });
      }
      let mut vocab = Self { terms, idf, ngram_max: ngram_max.clamp(1, 2), lookup: HashMap::new() };
      vocab.rebuild_lookup()?;
      Ok(vocab)
   }

   /// Re-checks a deserialized vocabulary and rebuilds its term lookup.
   pub(crate) fn validated(self) -> Result<Self> {
      Self::new(self.terms, self.idf, self.ngram_max)
   }

   fn rebuild_lookup(&mut self) -> Result<()> {
      self.lookup = HashMap::with_capacity(self.terms.len());
      for (dim, term) in self.terms.iter().enumerate() {
         if self.lookup.insert(term.clone(), dim as u32).is_some() {
            return Err(Error::InvalidIndex(format!("duplicate vocabulary term '{term}'")));
         }
      }
      Ok(())
   }

   pub fn len(&self) -> usize {
      self.terms.len()
   }

   pub fn is_empty(&self) -> bool {
      self.terms.is_empty()
   }

   pub fn dimension(&self, term: &str) -> Option<u32> {
      self.lookup.get(term).copied()
   }

   /// Vectorizes already-normalized text. Out-of-vocabulary terms are
   /// skipped; the result is L2 normalized unless it is empty.
   pub fn transform(&self, normalized: &str) -> SparseVec {
      let mut counts: BTreeMap<u32, f32> = BTreeMap::new();
      for term in analyze(normalized, self.ngram_max) {
         if let Some(dim) = self.dimension(&term) {
            *counts.entry(dim).or_default() += 1.0;
         }
      }

      let mut vec: SparseVec = counts
         .into_iter()
         .map(|(dim, tf)| (dim, tf * self.idf[dim as usize]))
         .collect();
      l2_normalize(&mut vec);
      vec
   }
}

/// Token n-grams of normalized text, single characters excluded.
pub fn analyze(normalized: &str, ngram_max: u8) -> Vec<String> {
   let words: Vec<&str> = tokens(normalized)
      .filter(|t| t.chars().count() >= MIN_TOKEN_CHARS)
      .collect();

   let mut out: Vec<String> = words.iter().map(|w| (*w).to_string()).collect();
   if ngram_max >= 2 {
      out.extend(words.windows(2).map(|pair| format!("{} {}", pair[0], pair[1])));
   }
   out
}

pub fn l2_normalize(vec: &mut [(u32, f32)]) {
   let norm = vec.iter().map(|(_, w)| w * w).sum::<f32>().sqrt();
   if norm > 0.0 {
      for (_, w) in vec.iter_mut() {
         *w /= norm;
      }
   }
}

/// Dot product of a row given as parallel `dims`/`weights` slices with a
/// sparse vector. Both sides must be sorted by dimension.
pub fn sparse_dot(dims: &[u32], weights: &[f32], other: &[(u32, f32)]) -> f32 {
   let (mut i, mut j, mut acc) = (0, 0, 0.0f32);
   while i < dims.len() && j < other.len() {
      match dims[i].cmp(&other[j].0) {
         Ordering::Less => i += 1,
         Ordering::Greater => j += 1,
         Ordering::Equal => {
            acc += weights[i] * other[j].1;
            i += 1;
            j += 1;
         },
      }
   }
   acc
}

/// Learns a vocabulary with smoothed idf `ln((1 + n) / (1 + df)) + 1` and
/// returns it alongside the weighted, normalized document rows.
pub fn fit(texts: &[String], options: FitOptions) -> Result<(Vocabulary, Vec<SparseVec>)> {
   let ngram_max = options.ngram_max.clamp(1, 2);
   let analyzed: Vec<Vec<String>> = texts
      .par_iter()
      .map(|text| analyze(&normalize(text), ngram_max))
      .collect();

   let mut df: BTreeMap<&str, usize> = BTreeMap::new();
   for doc in &analyzed {
      let mut seen: Vec<&str> = doc.iter().map(String::as_str).collect();
      seen.sort_unstable();
      seen.dedup();
      for term in seen {
         *df.entry(term).or_default() += 1;
      }
   }

   let n = texts.len() as f32;
   let (terms, idf): (Vec<String>, Vec<f32>) = df
      .into_iter()
      .filter(|(_, count)| *count >= options.min_df.max(1))
      .map(|(term, count)| (term.to_string(), ((1.0 + n) / (1.0 + count as f32)).ln() + 1.0))
      .unzip();

   let vocab = Vocabulary::new(terms, idf, ngram_max)?;

   let rows = analyzed
      .par_iter()
      .map(|doc| {
         let mut counts: BTreeMap<u32, f32> = BTreeMap::new();
         for term in doc {
            if let Some(dim) = vocab.dimension(term) {
               *counts.entry(dim).or_default() += 1.0;
            }
         }
         let mut row: SparseVec = counts
            .into_iter()
            .map(|(dim, tf)| (dim, tf * vocab.idf[dim as usize]))
            .collect();
         l2_normalize(&mut row);
         row
      })
      .collect();

   Ok((vocab, rows))
}
