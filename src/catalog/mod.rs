//! Immutable product catalog: display attributes, joins and attribute search.

pub mod loader;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Candidate, PLACEHOLDER_TITLE, ProductRecord, ProductRow};

/// Stand-in title some catalog rows carry instead of a real one.
const FILLER_TITLE: &str = "Lorem Ipsum";

/// Level 2 categories listed under each level 1 group.
pub const GROUP_SUBCATEGORIES: usize = 15;

/// Rounded percentage saved, when the product is actually discounted.
pub fn discount_percentage(original: f64, selling: f64) -> Option<f64> {
   (original > selling && selling > 0.0)
      .then(|| (100.0 * (original - selling) / original * 10.0).round() / 10.0)
}

impl ProductRow {
   pub fn from_record(record: &ProductRecord) -> Self {
      let title = match (
         record.title.as_str(),
         record.level2_category.as_str(),
         record.leaf_category.as_str(),
      ) {
         (FILLER_TITLE, "", "") => PLACEHOLDER_TITLE.to_string(),
         (FILLER_TITLE, level2, leaf) => format!("{level2} - {leaf}"),
         (title, ..) => title.to_string(),
      };
      Self {
         id: record.id.clone(),
         title,
         image_url: record.image_url.clone(),
         level1_category: record.level1_category.clone(),
         level2_category: record.level2_category.clone(),
         leaf_category: record.leaf_category.clone(),
         original_price: record.original_price,
         selling_price: record.selling_price,
         discounted_price: record.discounted_price,
         rating_avg: record.rating_avg,
         review_count: record.review_count,
         rating_count: record.rating_count,
         merchant_count: record.merchant_count,
         discount_percentage: discount_percentage(record.original_price, record.selling_price),
         score: None,
         lexical_similarity: None,
      }
   }

   /// Row for an id the catalog does not know.
   pub fn missing(id: impl Into<String>) -> Self {
      Self {
         id:                  id.into(),
         title:               PLACEHOLDER_TITLE.to_string(),
         image_url:           String::new(),
         level1_category:     String::new(),
         level2_category:     String::new(),
         leaf_category:       String::new(),
         original_price:      0.0,
         selling_price:       0.0,
         discounted_price:    0.0,
         rating_avg:          None,
         review_count:        0,
         rating_count:        0,
         merchant_count:      0.0,
         discount_percentage: None,
         score:               None,
         lexical_similarity:  None,
      }
   }
}

/// Structured constraints for attribute search. Unset fields do not filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogFilter {
   pub level1:        Option<String>,
   pub level2:        Option<String>,
   /// Any-of match on level 2; takes precedence over `level2` when non-empty.
   pub level2_any:    Vec<String>,
   /// Case-insensitive substring of the leaf category.
   pub leaf_contains: Option<String>,
   pub min_price:     Option<f64>,
   pub max_price:     Option<f64>,
   /// Unrated products count as 0.
   pub min_rating:    Option<f32>,
   pub min_reviews:   Option<u32>,
}

impl CatalogFilter {
   fn accepts(&self, record: &ProductRecord) -> bool {
      if self.level1.as_ref().is_some_and(|l1| record.level1_category != *l1) {
         return false;
      }
      if !self.level2_any.is_empty() {
         if !self.level2_any.iter().any(|l2| record.level2_category == *l2) {
            return false;
         }
      } else if self.level2.as_ref().is_some_and(|l2| record.level2_category != *l2) {
         return false;
      }
      let leaf_matches = |leaf: &String| {
         record.leaf_category.to_lowercase().contains(&leaf.to_lowercase())
      };
      if self.leaf_contains.as_ref().is_some_and(|leaf| !leaf_matches(leaf)) {
         return false;
      }
      if self.min_price.is_some_and(|p| record.selling_price < p)
         || self.max_price.is_some_and(|p| record.selling_price > p)
      {
         return false;
      }
      if self.min_rating.is_some_and(|r| record.rating_avg.unwrap_or(0.0) < r) {
         return false;
      }
      !self.min_reviews.is_some_and(|n| record.review_count < n)
   }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
   pub name:  String,
   pub count: usize,
}

/// A level 1 category with its most populated level 2 children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryGroup {
   pub name:          String,
   pub count:         usize,
   pub subcategories: Vec<CategoryCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopularCategory {
   pub name:       String,
   pub count:      usize,
   /// Mean over rated products only.
   pub avg_rating: Option<f32>,
   pub avg_price:  f64,
}

/// Counts sorted by count descending, then name.
fn ranked_counts(counts: HashMap<&str, usize>) -> Vec<CategoryCount> {
   let mut ranked: Vec<CategoryCount> = counts
      .into_iter()
      .map(|(name, count)| CategoryCount { name: name.to_string(), count })
      .collect();
   ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
   ranked
}

#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
   records:   Vec<ProductRecord>,
   id_to_row: HashMap<String, usize>,
   loaded_at: DateTime<Utc>,
}

impl CatalogSnapshot {
   /// Indexes records by id. A repeated id keeps its first row.
   pub fn new(records: Vec<ProductRecord>) -> Self {
      let mut id_to_row = HashMap::with_capacity(records.len());
      let mut duplicates = 0usize;
      for (row, record) in records.iter().enumerate() {
         if id_to_row.contains_key(&record.id) {
            duplicates += 1;
         } else {
            id_to_row.insert(record.id.clone(), row);
         }
      }
      if duplicates > 0 {
         tracing::warn!("catalog has {} duplicate product ids; keeping first rows", duplicates);
      }
      Self { records, id_to_row, loaded_at: Utc::now() }
   }

   pub fn len(&self) -> usize {
      self.records.len()
   }

   pub fn is_empty(&self) -> bool {
      self.records.is_empty()
   }

   pub const fn loaded_at(&self) -> DateTime<Utc> {
      self.loaded_at
   }

   pub fn records(&self) -> &[ProductRecord] {
      &self.records
   }

   pub fn get(&self, id: &str) -> Option<&ProductRecord> {
      self.id_to_row.get(id).map(|&row| &self.records[row])
   }

   /// Rows in catalog order, skipping repeated ids.
   fn unique_records(&self) -> impl Iterator<Item = &ProductRecord> {
      self
         .records
         .iter()
         .enumerate()
         .filter(|(row, r)| self.id_to_row.get(&r.id) == Some(row))
         .map(|(_, r)| r)
   }

   /// Level 1 categories by product count, each with its top level 2
   /// children. A group's count covers all of its products.
   pub fn categories(&self) -> Vec<CategoryGroup> {
      let mut level1: HashMap<&str, usize> = HashMap::new();
      let mut level2: HashMap<&str, HashMap<&str, usize>> = HashMap::new();
      for record in self.unique_records() {
         *level1.entry(record.level1_category.as_str()).or_default() += 1;
         *level2
            .entry(record.level1_category.as_str())
            .or_default()
            .entry(record.level2_category.as_str())
            .or_default() += 1;
      }

      ranked_counts(level1)
         .into_iter()
         .map(|CategoryCount { name, count }| {
            let mut subcategories =
               level2.remove(name.as_str()).map(ranked_counts).unwrap_or_default();
            subcategories.truncate(GROUP_SUBCATEGORIES);
            CategoryGroup { name, count, subcategories }
         })
         .collect()
   }

   /// The `limit` most populated level 2 categories with their mean rating
   /// and mean original price.
   pub fn popular_categories(&self, limit: usize) -> Vec<PopularCategory> {
      #[derive(Default)]
      struct Totals {
         count:  usize,
         rated:  usize,
         rating: f64,
         price:  f64,
      }

      let mut totals: HashMap<&str, Totals> = HashMap::new();
      for record in self.unique_records() {
         let entry = totals.entry(record.level2_category.as_str()).or_default();
         entry.count += 1;
         entry.price += record.original_price;
         if let Some(rating) = record.rating_avg.filter(|r| r.is_finite()) {
            entry.rated += 1;
            entry.rating += f64::from(rating);
         }
      }

      let counts = totals.iter().map(|(name, t)| (*name, t.count)).collect();
      ranked_counts(counts)
         .into_iter()
         .take(limit)
         .filter_map(|CategoryCount { name, count }| {
            let t = totals.get(name.as_str())?;
            Some(PopularCategory {
               avg_rating: (t.rated > 0).then(|| (t.rating / t.rated as f64) as f32),
               avg_price: t.price / count as f64,
               name,
               count,
            })
         })
         .collect()
   }

   /// Left join of ids onto catalog rows, preserving input order.
   pub fn join_ids<S: AsRef<str>>(&self, ids: &[S]) -> Vec<ProductRow> {
      ids.iter()
         .map(|id| {
            let id = id.as_ref();
            self.get(id).map_or_else(|| ProductRow::missing(id), ProductRow::from_record)
         })
         .collect()
   }

   /// Joins ranked candidates, carrying their fused score onto each row.
   pub fn join(&self, candidates: &[Candidate]) -> Vec<ProductRow> {
      let ids: Vec<&str> = candidates.iter().map(|c| c.id.as_str()).collect();
      self
         .join_ids(&ids)
         .into_iter()
         .zip(candidates)
         .map(|(mut row, candidate)| {
            row.score = Some(candidate.fused_score);
            row
         })
         .collect()
   }

   /// Case-insensitive substring search over title and category levels,
   /// ordered by rating, then review count, then catalog order. A blank query
   /// matches everything the filter admits.
   pub fn search(&self, raw_query: &str, filter: &CatalogFilter, limit: usize) -> Vec<ProductRow> {
      let needle = raw_query.trim().to_lowercase();
      let mut hits: Vec<&ProductRecord> = self
         .unique_records()
         .filter(|r| filter.accepts(r))
         .filter(|r| {
            needle.is_empty()
               || [&r.title, &r.level1_category, &r.level2_category, &r.leaf_category]
                  .iter()
                  .any(|field| field.to_lowercase().contains(&needle))
         })
         .collect();

      // stable sort keeps catalog order on full ties
      hits.sort_by(|a, b| {
         let rating = |r: &ProductRecord| r.rating_avg.filter(|x| x.is_finite()).unwrap_or(0.0);
         rating(b)
            .total_cmp(&rating(a))
            .then_with(|| b.review_count.cmp(&a.review_count))
      });

      hits.into_iter().take(limit).map(ProductRow::from_record).collect()
   }
}
