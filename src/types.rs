use std::fmt;

use serde::{Deserialize, Serialize};

use crate::normalize::normalize;

/// Placeholder the catalog uses for products without a usable title.
pub const PLACEHOLDER_TITLE: &str = "Ürün";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
   raw:        String,
   normalized: String,
}

impl Query {
   pub fn new(raw: impl Into<String>) -> Self {
      let raw = raw.into();
      let normalized = normalize(&raw);
      Self { raw, normalized }
   }

   pub fn raw(&self) -> &str {
      &self.raw
   }

   pub fn normalized(&self) -> &str {
      &self.normalized
   }

   pub fn is_empty(&self) -> bool {
      self.normalized.is_empty()
   }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
   pub id:           String,
   pub recall_score: f32,
   pub rerank_score: Option<f32>,
   pub fused_score:  f32,
}

impl Candidate {
   pub fn recalled(id: impl Into<String>, recall_score: f32) -> Self {
      Self { id: id.into(), recall_score, rerank_score: None, fused_score: 0.0 }
   }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
   Lexical,
   Semantic,
   CatalogOnly,
}

impl Mode {
   pub const fn as_str(self) -> &'static str {
      match self {
         Self::Lexical => "lexical",
         Self::Semantic => "semantic",
         Self::CatalogOnly => "catalog_only",
      }
   }
}

impl fmt::Display for Mode {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(self.as_str())
   }
}

impl std::str::FromStr for Mode {
   type Err = String;

   fn from_str(s: &str) -> Result<Self, Self::Err> {
      match s.to_ascii_lowercase().as_str() {
         "lexical" | "ml" => Ok(Self::Lexical),
         "semantic" | "hybrid" => Ok(Self::Semantic),
         "catalog_only" | "catalog" | "db" => Ok(Self::CatalogOnly),
         other => Err(format!("unknown mode '{other}'")),
      }
   }
}

/// Which signal combination actually produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineUsed {
   Lexical,
   Semantic,
   SemanticReranked,
   /// Semantic request served from lexical recall because dense recall was
   /// missing or failed.
   SemanticLexicalFallback,
   CatalogOnly,
}

impl fmt::Display for EngineUsed {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(match self {
         Self::Lexical => "lexical",
         Self::Semantic => "semantic",
         Self::SemanticReranked => "semantic_reranked",
         Self::SemanticLexicalFallback => "semantic_lexical_fallback",
         Self::CatalogOnly => "catalog_only",
      })
   }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
   pub id:               String,
   pub title:            String,
   pub image_url:        String,
   pub level1_category:  String,
   pub level2_category:  String,
   pub leaf_category:    String,
   pub original_price:   f64,
   pub selling_price:    f64,
   pub discounted_price: f64,
   pub rating_avg:       Option<f32>,
   pub review_count:     u32,
   pub rating_count:     u32,
   pub merchant_count:   f32,
}

impl ProductRecord {
   /// Text the lexical index and the dense encoder see for this product.
   pub fn search_text(&self) -> String {
      [
         self.title.as_str(),
         self.level1_category.as_str(),
         self.level2_category.as_str(),
         self.leaf_category.as_str(),
      ]
      .iter()
      .filter(|s| !s.is_empty() && **s != PLACEHOLDER_TITLE)
      .copied()
      .collect::<Vec<_>>()
      .join(" ")
   }
}

/// A ranked, catalog-joined result row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRow {
   pub id:                  String,
   pub title:               String,
   pub image_url:           String,
   pub level1_category:     String,
   pub level2_category:     String,
   pub leaf_category:       String,
   pub original_price:      f64,
   pub selling_price:       f64,
   pub discounted_price:    f64,
   pub rating_avg:          Option<f32>,
   pub review_count:        u32,
   pub rating_count:        u32,
   pub merchant_count:      f32,
   #[serde(skip_serializing_if = "Option::is_none")]
   pub discount_percentage: Option<f64>,
   #[serde(skip_serializing_if = "Option::is_none")]
   pub score:               Option<f32>,
   #[serde(skip_serializing_if = "Option::is_none")]
   pub lexical_similarity:  Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
   pub rows:        Vec<ProductRow>,
   pub engine_used: EngineUsed,
}

impl SearchResponse {
   pub const fn empty(engine_used: EngineUsed) -> Self {
      Self { rows: Vec::new(), engine_used }
   }
}
