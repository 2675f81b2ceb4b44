//! Optional query rewriting applied before a search enters the pipeline.

use std::collections::BTreeMap;

use crate::normalize::normalize;

/// Corrected query text with the rewriter's confidence in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Rewrite {
   pub text:       String,
   pub confidence: f32,
}

impl Rewrite {
   pub fn unchanged(text: &str) -> Self {
      Self { text: text.to_string(), confidence: 1.0 }
   }

   pub fn changed(&self, raw: &str) -> bool {
      self.text != raw
   }
}

pub trait QueryRewriter: Send + Sync {
   fn rewrite(&self, raw: &str) -> Rewrite;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl QueryRewriter for Passthrough {
   fn rewrite(&self, raw: &str) -> Rewrite {
      Rewrite::unchanged(raw)
   }
}

/// Token-level replacement table keyed by normalized tokens. Confidence is
/// the mean similarity between each replaced token and its correction.
#[derive(Debug, Clone, Default)]
pub struct CorrectionTable {
   entries: BTreeMap<String, String>,
}

impl CorrectionTable {
   pub fn new(entries: &BTreeMap<String, String>) -> Self {
      Self {
         entries: entries
            .iter()
            .map(|(from, to)| (normalize(from), to.trim().to_string()))
            .filter(|(from, to)| !from.is_empty() && !to.is_empty())
            .collect(),
      }
   }

   pub fn is_empty(&self) -> bool {
      self.entries.is_empty()
   }
}

impl QueryRewriter for CorrectionTable {
   fn rewrite(&self, raw: &str) -> Rewrite {
      let mut changed = false;
      let mut similarity = 0.0;
      let mut replaced = 0usize;

      let words: Vec<&str> = raw
         .split_whitespace()
         .map(|word| match self.entries.get(&normalize(word)) {
            Some(to) if normalize(to) != normalize(word) => {
               changed = true;
               replaced += 1;
               similarity += char_similarity(&normalize(word), &normalize(to));
               to.as_str()
            },
            _ => word,
         })
         .collect();

      if !changed {
         return Rewrite::unchanged(raw);
      }
      Rewrite { text: words.join(" "), confidence: similarity / replaced as f32 }
   }
}

/// `1 - levenshtein(a, b) / max(len)` over chars.
fn char_similarity(a: &str, b: &str) -> f32 {
   let a: Vec<char> = a.chars().collect();
   let b: Vec<char> = b.chars().collect();
   let longest = a.len().max(b.len());
   if longest == 0 {
      return 1.0;
   }

   let mut prev: Vec<usize> = (0..=b.len()).collect();
   let mut curr = vec![0; b.len() + 1];
   for (i, ca) in a.iter().enumerate() {
      curr[0] = i + 1;
      for (j, cb) in b.iter().enumerate() {
         let substitution = prev[j] + usize::from(ca != cb);
         curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
      }
      std::mem::swap(&mut prev, &mut curr);
   }
   1.0 - prev[b.len()] as f32 / longest as f32
}
