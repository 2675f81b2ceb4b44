//! Score normalization, weighted signal fusion and stable top-K selection.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const EPSILON: f64 = 1e-12;

/// A pair of non-negative weights normalized to sum to one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "(f32, f32)", into = "(f32, f32)")]
pub struct FusionWeights {
   first:  f32,
   second: f32,
}

impl FusionWeights {
   pub fn new(first: f32, second: f32) -> Result<Self> {
      let valid = first.is_finite() && second.is_finite() && first >= 0.0 && second >= 0.0;
      let total = first + second;
      if !valid || total <= 0.0 {
         return Err(Error::InvalidWeights(first, second));
      }
      Ok(Self { first: first / total, second: second / total })
   }

   /// All weight on the first signal.
   pub const fn only_first() -> Self {
      Self { first: 1.0, second: 0.0 }
   }

   pub const fn first(&self) -> f32 {
      self.first
   }

   pub const fn second(&self) -> f32 {
      self.second
   }
}

impl TryFrom<(f32, f32)> for FusionWeights {
   type Error = Error;

   fn try_from((first, second): (f32, f32)) -> Result<Self> {
      Self::new(first, second)
   }
}

impl From<FusionWeights> for (f32, f32) {
   fn from(w: FusionWeights) -> Self {
      (w.first, w.second)
   }
}

/// Min-max scales `scores` into `[0, 1]`.
///
/// A constant array carries no ranking information and maps to all zeros, as
/// do non-finite entries (which are also ignored when finding the range).
pub fn minmax(scores: &[f32]) -> Vec<f32> {
   let (min, max) = scores
      .iter()
      .filter(|s| s.is_finite())
      .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &s| {
         (lo.min(s as f64), hi.max(s as f64))
      });

   if max <= min {
      return vec![0.0; scores.len()];
   }

   let range = max - min + EPSILON;
   scores
      .iter()
      .map(|&s| if s.is_finite() { ((s as f64 - min) / range) as f32 } else { 0.0 })
      .collect()
}

/// Weighted sum of the min-max normalized signals.
pub fn fuse(first: &[f32], second: &[f32], weights: FusionWeights) -> Result<Vec<f32>> {
   if first.len() != second.len() {
      return Err(Error::ShapeMismatch {
         op:       "fuse",
         expected: first.len(),
         actual:   second.len(),
      });
   }

   let a = minmax(first);
   let b = minmax(second);
   Ok(a
      .iter()
      .zip(&b)
      .map(|(x, y)| weights.first().mul_add(*x, weights.second() * y))
      .collect())
}

/// Descending score order with ascending index as the tie-break. NaN ranks
/// below every real score.
pub fn rank_cmp(a: (usize, f32), b: (usize, f32)) -> Ordering {
   let key = |s: f32| if s.is_nan() { f32::NEG_INFINITY } else { s };
   key(b.1).total_cmp(&key(a.1)).then_with(|| a.0.cmp(&b.0))
}

/// Indices of the `k` largest scores, best first, stable on exact ties.
pub fn select_top_k(scores: &[f32], k: usize) -> Vec<usize> {
   top_k_scored(scores.iter().copied().enumerate(), k)
      .into_iter()
      .map(|(i, _)| i)
      .collect()
}

/// Top-`k` `(index, score)` pairs from an arbitrary scored sequence.
pub fn top_k_scored(scored: impl IntoIterator<Item = (usize, f32)>, k: usize) -> Vec<(usize, f32)> {
   let mut all: Vec<(usize, f32)> = scored.into_iter().collect();
   let k = k.min(all.len());
   if k == 0 {
      return Vec::new();
   }

   if k < all.len() {
      all.select_nth_unstable_by(k - 1, |a, b| rank_cmp(*a, *b));
      all.truncate(k);
   }
   all.sort_unstable_by(|a, b| rank_cmp(*a, *b));
   all
}

/// Fuses two signals and returns the selected indices with their fused
/// scores.
pub fn fuse_top_k(
   first: &[f32],
   second: &[f32],
   weights: FusionWeights,
   k: usize,
) -> Result<(Vec<usize>, Vec<f32>)> {
   let fused = fuse(first, second, weights)?;
   let indices = select_top_k(&fused, k);
   let scores = indices.iter().map(|&i| fused[i]).collect();
   Ok((indices, scores))
}

/// `(min, max)` of the finite entries, for logging.
pub fn score_range(scores: &[f32]) -> Option<(f32, f32)> {
   scores
      .iter()
      .filter(|s| s.is_finite())
      .fold(None, |acc, &s| match acc {
         None => Some((s, s)),
         Some((lo, hi)) => Some((lo.min(s), hi.max(s))),
      })
}

#[cfg(test)]
mod tests {
   use proptest::prelude::*;

   use super::*;

   #[test]
   fn minmax_constant_is_zero() {
      assert_eq!(minmax(&[3.0, 3.0, 3.0]), vec![0.0, 0.0, 0.0]);
      assert_eq!(minmax(&[7.5]), vec![0.0]);
      assert!(minmax(&[]).is_empty());
   }

   #[test]
   fn minmax_scales_to_unit_range() {
      let out = minmax(&[2.0, 4.0, 3.0]);
      assert!(out[0].abs() < 1e-6);
      assert!((out[1] - 1.0).abs() < 1e-6);
      assert!((out[2] - 0.5).abs() < 1e-6);
   }

   #[test]
   fn minmax_zeroes_non_finite() {
      let out = minmax(&[1.0, f32::NAN, 3.0, f32::INFINITY]);
      assert!(out[0].abs() < 1e-6);
      assert_eq!(out[1], 0.0);
      assert!((out[2] - 1.0).abs() < 1e-6);
      assert_eq!(out[3], 0.0);
   }

   #[test]
   fn click_order_fusion_prefers_order_signal() {
      let weights = FusionWeights::new(0.3, 0.7).unwrap();
      let fused = fuse(&[0.2, 0.8], &[0.6, 0.4], weights).unwrap();
      assert!((fused[0] - 0.7).abs() < 1e-5);
      assert!((fused[1] - 0.3).abs() < 1e-5);
      assert_eq!(select_top_k(&fused, 2), vec![0, 1]);
   }

   #[test]
   fn fuse_rejects_length_mismatch() {
      let weights = FusionWeights::new(0.5, 0.5).unwrap();
      assert!(matches!(
         fuse(&[1.0, 2.0], &[1.0], weights),
         Err(Error::ShapeMismatch { expected: 2, actual: 1, .. })
      ));
   }

   #[test]
   fn weights_normalize_and_validate() {
      let w = FusionWeights::new(2.0, 6.0).unwrap();
      assert!((w.first() - 0.25).abs() < 1e-6);
      assert!((w.second() - 0.75).abs() < 1e-6);
      assert!(FusionWeights::new(-0.1, 1.0).is_err());
      assert!(FusionWeights::new(0.0, 0.0).is_err());
      assert!(FusionWeights::new(f32::NAN, 1.0).is_err());
   }

   #[test]
   fn weights_deserialize_from_pair() {
      let w: FusionWeights = serde_json::from_str("[0.8, 0.2]").unwrap();
      assert!((w.first() - 0.8).abs() < 1e-6);
      assert!(serde_json::from_str::<FusionWeights>("[-1.0, 0.2]").is_err());
   }

   #[test]
   fn top_k_is_stable_on_ties() {
      assert_eq!(select_top_k(&[0.5, 0.9, 0.5, 0.9, 0.1], 3), vec![1, 3, 0]);
   }

   #[test]
   fn top_k_clips_and_handles_nan() {
      assert_eq!(select_top_k(&[0.1, f32::NAN, 0.3], 10), vec![2, 0, 1]);
      assert!(select_top_k(&[0.1, 0.2], 0).is_empty());
   }

   #[test]
   fn fuse_top_k_returns_fused_scores() {
      let weights = FusionWeights::new(0.8, 0.2).unwrap();
      let (idx, scores) = fuse_top_k(&[0.0, 1.0, 0.5], &[1.0, 0.0, 0.5], weights, 2).unwrap();
      assert_eq!(idx, vec![1, 2]);
      assert!((scores[0] - 0.8).abs() < 1e-5);
      assert!((scores[1] - 0.5).abs() < 1e-5);
   }

   #[test]
   fn score_range_ignores_nan() {
      assert_eq!(score_range(&[f32::NAN, 2.0, -1.0]), Some((-1.0, 2.0)));
      assert_eq!(score_range(&[]), None);
   }

   proptest! {
      #[test]
      fn minmax_stays_in_unit_interval(v in prop::collection::vec(-1e6f32..1e6, 0..64)) {
         for x in minmax(&v) {
            prop_assert!((0.0..=1.0).contains(&x));
         }
      }

      #[test]
      fn minmax_of_constant_is_zero(x in -1e6f32..1e6, n in 1usize..32) {
         prop_assert!(minmax(&vec![x; n]).iter().all(|&y| y == 0.0));
      }

      #[test]
      fn top_k_sorted_bounded_and_stable(
         v in prop::collection::vec(prop::sample::select(vec![0.0f32, 0.25, 0.5, 1.0]), 0..48),
         k in 0usize..64,
      ) {
         let idx = select_top_k(&v, k);
         prop_assert!(idx.len() <= k);
         prop_assert_eq!(idx.len(), k.min(v.len()));
         for pair in idx.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            prop_assert!(v[a] > v[b] || (v[a] == v[b] && a < b));
         }
      }
   }
}
