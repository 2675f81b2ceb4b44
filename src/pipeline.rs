//! Mode dispatch over an immutable, atomically swappable pipeline context.

use std::sync::Arc;

use ndarray::Array2;
use parking_lot::RwLock;
use tracing::Instrument;
use uuid::Uuid;

use crate::{
   catalog::{CatalogFilter, CatalogSnapshot},
   config::Config,
   dense::DenseEngine,
   error::{Error, Result},
   fusion::{self, FusionWeights},
   lexical::LexicalEngine,
   propensity::PropensityEstimator,
   rerank::{self, Reranker},
   types::{Candidate, EngineUsed, Mode, PLACEHOLDER_TITLE, Query, SearchResponse},
};

/// Per-mode recall depths, limits and fusion weights.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineSettings {
   pub lexical_depth:    usize,
   pub semantic_depth:   usize,
   pub default_limit:    usize,
   pub max_limit:        usize,
   /// (click, order)
   pub lexical_weights:  FusionWeights,
   /// (rerank, recall)
   pub semantic_weights: FusionWeights,
}

impl Default for PipelineSettings {
   fn default() -> Self {
      Self::from(&Config::default())
   }
}

impl From<&Config> for PipelineSettings {
   fn from(config: &Config) -> Self {
      Self {
         lexical_depth:    config.lexical.recall_depth,
         semantic_depth:   config.semantic.recall_depth,
         default_limit:    config.default_limit,
         max_limit:        config.max_limit,
         lexical_weights:  config.lexical.weights,
         semantic_weights: config.semantic.weights,
      }
   }
}

impl PipelineSettings {
   pub fn limit(&self, requested: Option<usize>) -> usize {
      requested.unwrap_or(self.default_limit).min(self.max_limit)
   }
}

/// Everything a request reads. Built once, never mutated; replaced wholesale
/// through [`ContextHandle::publish`].
pub struct PipelineContext {
   catalog:    Arc<CatalogSnapshot>,
   lexical:    Option<Arc<LexicalEngine>>,
   propensity: Option<Arc<PropensityEstimator>>,
   dense:      Option<Arc<DenseEngine>>,
   reranker:   Option<Arc<dyn Reranker>>,
   settings:   PipelineSettings,
}

pub struct ContextBuilder {
   ctx: PipelineContext,
}

impl ContextBuilder {
   pub fn lexical(mut self, engine: impl Into<Option<Arc<LexicalEngine>>>) -> Self {
      self.ctx.lexical = engine.into();
      self
   }

   pub fn propensity(mut self, estimator: impl Into<Option<Arc<PropensityEstimator>>>) -> Self {
      self.ctx.propensity = estimator.into();
      self
   }

   pub fn dense(mut self, engine: impl Into<Option<Arc<DenseEngine>>>) -> Self {
      self.ctx.dense = engine.into();
      self
   }

   pub fn reranker(mut self, reranker: Option<Arc<dyn Reranker>>) -> Self {
      self.ctx.reranker = reranker;
      self
   }

   pub const fn settings(mut self, settings: PipelineSettings) -> Self {
      self.ctx.settings = settings;
      self
   }

   pub fn build(self) -> PipelineContext {
      self.ctx
   }
}

/// Readiness and size of every component, for status reporting.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ContextStatus {
   pub catalog_rows:      usize,
   pub catalog_loaded_at: chrono::DateTime<chrono::Utc>,
   pub lexical_rows:      Option<usize>,
   pub lexical_terms:     Option<usize>,
   pub propensity:        bool,
   pub dense_rows:        Option<usize>,
   pub dense_ready:       bool,
   pub reranker:          Option<String>,
}

impl PipelineContext {
   pub fn builder(catalog: Arc<CatalogSnapshot>) -> ContextBuilder {
      ContextBuilder {
         ctx: Self {
            catalog,
            lexical: None,
            propensity: None,
            dense: None,
            reranker: None,
            settings: PipelineSettings::default(),
         },
      }
   }

   pub fn catalog(&self) -> &Arc<CatalogSnapshot> {
      &self.catalog
   }

   pub fn status(&self) -> ContextStatus {
      ContextStatus {
         catalog_rows:      self.catalog.len(),
         catalog_loaded_at: self.catalog.loaded_at(),
         lexical_rows:      self.lexical.as_ref().map(|l| l.index().len()),
         lexical_terms:     self.lexical.as_ref().map(|l| l.index().vocabulary().len()),
         propensity:        self.propensity.as_ref().is_some_and(|p| p.is_ready()),
         dense_rows:        self.dense.as_ref().map(|d| d.index().len()),
         dense_ready:       self.dense.as_ref().is_some_and(|d| d.is_ready()),
         reranker:          self
            .reranker
            .as_ref()
            .filter(|r| r.is_ready())
            .map(|r| r.kind().to_string()),
      }
   }

   /// Runs one search. Missing components for the chosen mode yield
   /// [`Error::ModelUnavailable`]; a missing reranker only degrades.
   pub async fn run(&self, query: &str, mode: Mode, limit: Option<usize>) -> Result<SearchResponse> {
      self.run_filtered(query, mode, limit, &CatalogFilter::default()).await
   }

   /// Like [`Self::run`]; `filter` applies to `catalog_only` mode.
   pub async fn run_filtered(
      &self,
      query: &str,
      mode: Mode,
      limit: Option<usize>,
      filter: &CatalogFilter,
   ) -> Result<SearchResponse> {
      let span = tracing::info_span!("search", request_id = %Uuid::new_v4(), %mode);
      async move {
         let limit = self.settings.limit(limit);
         let response = match mode {
            Mode::Lexical => self.lexical_search(&Query::new(query), limit)?,
            Mode::Semantic => self.semantic_search(&Query::new(query), limit).await?,
            Mode::CatalogOnly => SearchResponse {
               rows:        self.catalog.search(query, filter, limit),
               engine_used: EngineUsed::CatalogOnly,
            },
         };
         tracing::info!("{} rows via {}", response.rows.len(), response.engine_used);
         Ok(response)
      }
      .instrument(span)
      .await
   }

   fn lexical_search(&self, query: &Query, limit: usize) -> Result<SearchResponse> {
      let lexical = self
         .lexical
         .as_ref()
         .filter(|l| l.is_ready())
         .ok_or(Error::unavailable(Mode::Lexical, "lexical engine"))?;
      let propensity = self
         .propensity
         .as_ref()
         .filter(|p| p.is_ready())
         .ok_or(Error::unavailable(Mode::Lexical, "propensity estimator"))?;

      if query.is_empty() || limit == 0 {
         return Ok(SearchResponse::empty(EngineUsed::Lexical));
      }

      let candidates = lexical.recall(query, self.settings.lexical_depth);
      if candidates.is_empty() {
         return Ok(SearchResponse::empty(EngineUsed::Lexical));
      }

      let ids: Vec<&str> = candidates.iter().map(|c| c.id.as_str()).collect();
      let similarity = lexical.similarities(query, &ids);
      let features = Array2::from_shape_fn((similarity.len(), 1), |(row, _)| similarity[row]);

      let (click, order) = propensity.estimate(features.view())?;
      tracing::debug!(
         candidates = candidates.len(),
         click = ?fusion::score_range(&click),
         order = ?fusion::score_range(&order),
         "propensity scored"
      );

      let (selected, fused) = fusion::fuse_top_k(&click, &order, self.settings.lexical_weights, limit)?;
      let rows = self
         .catalog
         .join(&ranked(&candidates, &selected, &fused))
         .into_iter()
         .zip(&selected)
         .map(|(mut row, &i)| {
            row.lexical_similarity = Some(similarity[i]);
            row
         })
         .collect();
      Ok(SearchResponse { rows, engine_used: EngineUsed::Lexical })
   }

   /// Dense recall, optionally reranked. When dense recall is missing or
   /// fails, lexical recall serves the request instead.
   async fn semantic_search(&self, query: &Query, limit: usize) -> Result<SearchResponse> {
      let failure = match self.dense.as_ref().filter(|d| d.is_ready()) {
         Some(dense) => match dense.recall(query, self.settings.semantic_depth).await {
            Ok(candidates) => return self.rank_semantic(query, candidates, limit).await,
            Err(e) => {
               tracing::warn!("dense recall failed: {}", e);
               Some(e)
            },
         },
         None => None,
      };
      self.lexical_fallback(query, limit, failure)
   }

   async fn rank_semantic(
      &self,
      query: &Query,
      mut candidates: Vec<Candidate>,
      limit: usize,
   ) -> Result<SearchResponse> {
      if candidates.is_empty() || limit == 0 {
         return Ok(SearchResponse::empty(EngineUsed::Semantic));
      }

      let recall: Vec<f32> = candidates.iter().map(|c| c.recall_score).collect();
      tracing::debug!(candidates = candidates.len(), recall = ?fusion::score_range(&recall), "dense recalled");

      let (engine_used, selected, fused) = match self.rerank_scores(query, &candidates).await {
         Some(scores) => {
            for (candidate, &score) in candidates.iter_mut().zip(&scores) {
               candidate.rerank_score = Some(score);
            }
            let (selected, fused) =
               fusion::fuse_top_k(&scores, &recall, self.settings.semantic_weights, limit)?;
            (EngineUsed::SemanticReranked, selected, fused)
         },
         None => {
            let (selected, fused) =
               fusion::fuse_top_k(&recall, &recall, FusionWeights::only_first(), limit)?;
            (EngineUsed::Semantic, selected, fused)
         },
      };

      let rows = self.catalog.join(&ranked(&candidates, &selected, &fused));
      Ok(SearchResponse { rows, engine_used })
   }

   /// Recall-only ranking over lexical candidates. `cause` is the dense
   /// failure, if any, reported when no lexical engine is ready either.
   fn lexical_fallback(
      &self,
      query: &Query,
      limit: usize,
      cause: Option<Error>,
   ) -> Result<SearchResponse> {
      let Some(lexical) = self.lexical.as_ref().filter(|l| l.is_ready()) else {
         return Err(Error::ModelUnavailable {
            mode:      Mode::Semantic,
            component: "dense engine",
            cause:     cause.map(Box::new),
         });
      };
      tracing::warn!("dense recall unavailable; using lexical recall for semantic mode");

      if query.is_empty() || limit == 0 {
         return Ok(SearchResponse::empty(EngineUsed::SemanticLexicalFallback));
      }
      let candidates = lexical.recall(query, self.settings.semantic_depth);
      if candidates.is_empty() {
         return Ok(SearchResponse::empty(EngineUsed::SemanticLexicalFallback));
      }

      let recall: Vec<f32> = candidates.iter().map(|c| c.recall_score).collect();
      let (selected, fused) =
         fusion::fuse_top_k(&recall, &recall, FusionWeights::only_first(), limit)?;

      let rows = self
         .catalog
         .join(&ranked(&candidates, &selected, &fused))
         .into_iter()
         .zip(&selected)
         .map(|(mut row, &i)| {
            row.lexical_similarity = Some(recall[i]);
            row
         })
         .collect();
      Ok(SearchResponse { rows, engine_used: EngineUsed::SemanticLexicalFallback })
   }

   /// Reranker scores aligned to `candidates`, or `None` when the reranker is
   /// absent, failing or returns the wrong number of scores.
   async fn rerank_scores(&self, query: &Query, candidates: &[Candidate]) -> Option<Vec<f32>> {
      let reranker = self.reranker.as_ref().filter(|r| r.is_ready())?;

      let documents: Vec<String> = candidates
         .iter()
         .map(|c| match self.catalog.get(&c.id) {
            Some(r) => rerank::doc_text(&r.title, &r.level2_category, &r.leaf_category),
            None => PLACEHOLDER_TITLE.to_string(),
         })
         .collect();

      match reranker.score(query.raw(), &documents).await {
         Ok(scores) if scores.len() == documents.len() => {
            tracing::debug!(kind = %reranker.kind(), rerank = ?fusion::score_range(&scores), "reranked");
            Some(scores)
         },
         Ok(scores) => {
            tracing::warn!(
               "reranker returned {} scores for {} documents; using recall only",
               scores.len(),
               documents.len()
            );
            None
         },
         Err(e) => {
            tracing::warn!("reranker failed: {}; using recall only", e);
            None
         },
      }
   }
}

/// Selected candidates in ranking order, carrying their fused scores.
fn ranked(candidates: &[Candidate], selected: &[usize], fused: &[f32]) -> Vec<Candidate> {
   selected
      .iter()
      .zip(fused)
      .map(|(&i, &score)| Candidate { fused_score: score, ..candidates[i].clone() })
      .collect()
}

/// Shared slot holding the current context. Readers take a cheap `Arc` clone
/// and never observe a partially built context.
pub struct ContextHandle {
   current: RwLock<Arc<PipelineContext>>,
}

impl ContextHandle {
   pub fn new(ctx: PipelineContext) -> Self {
      Self { current: RwLock::new(Arc::new(ctx)) }
   }

   pub fn snapshot(&self) -> Arc<PipelineContext> {
      Arc::clone(&self.current.read())
   }

   /// Swaps in a new context and returns the previous one.
   pub fn publish(&self, ctx: PipelineContext) -> Arc<PipelineContext> {
      let next = Arc::new(ctx);
      let previous = std::mem::replace(&mut *self.current.write(), next);
      tracing::info!("published new pipeline context");
      previous
   }

   pub async fn run(&self, query: &str, mode: Mode, limit: Option<usize>) -> Result<SearchResponse> {
      let ctx = self.snapshot();
      ctx.run(query, mode, limit).await
   }
}

#[cfg(test)]
mod tests {
   use ndarray::ArrayView1;

   use super::*;
   use crate::{
      catalog::tests::snapshot,
      config::AnnConfig,
      dense::{EmbeddingIndex, tests::KeywordEncoder},
      embed::Encoder,
      lexical::{CorpusIndex, FitOptions},
      propensity::{Regressor, tests::Buckets},
      rerank::RerankerKind,
   };

   struct Identity;

   impl Regressor for Identity {
      fn predict_row(&self, row: ArrayView1<'_, f32>) -> f32 {
         row[0]
      }

      fn n_features(&self) -> usize {
         1
      }
   }

   enum Script {
      Keyword(&'static str),
      Fail,
      Short,
   }

   struct ScriptedReranker(Script);

   #[async_trait::async_trait]
   impl Reranker for ScriptedReranker {
      async fn score(&self, _query: &str, documents: &[String]) -> Result<Vec<f32>> {
         match self.0 {
            Script::Keyword(k) => {
               Ok(documents.iter().map(|d| if d.contains(k) { 1.0 } else { 0.0 }).collect())
            },
            Script::Fail => Err(Error::Rerank("model crashed".to_string())),
            Script::Short => Ok(vec![1.0]),
         }
      }

      fn kind(&self) -> RerankerKind {
         RerankerKind::CrossEncoder
      }

      fn is_ready(&self) -> bool {
         true
      }
   }

   fn lexical_engine(catalog: &CatalogSnapshot) -> Arc<LexicalEngine> {
      let docs = catalog.records().iter().map(|r| (r.id.clone(), r.search_text()));
      Arc::new(LexicalEngine::new(CorpusIndex::fit(docs, FitOptions::default()).unwrap()))
   }

   fn dense_engine() -> Arc<DenseEngine> {
      let rows = vec![
         vec![1.0, 0.0, 0.0, 0.0],
         vec![0.0, 1.0, 0.0, 0.0],
         vec![0.8, 0.0, 0.6, 0.0],
         vec![0.0, 0.0, 1.0, 0.0],
      ];
      let ids = ["p1", "p2", "p3", "p4"].map(String::from).to_vec();
      let index = EmbeddingIndex::from_rows(rows, ids, &AnnConfig::default()).unwrap();
      Arc::new(DenseEngine::new(Arc::new(KeywordEncoder::new()), index, 16).unwrap())
   }

   fn full_context(reranker: Option<Script>) -> PipelineContext {
      let catalog = Arc::new(snapshot());
      PipelineContext::builder(Arc::clone(&catalog))
         .lexical(lexical_engine(&catalog))
         .propensity(Arc::new(PropensityEstimator::new(Arc::new(Identity), Arc::new(Identity))))
         .dense(dense_engine())
         .reranker(reranker.map(|s| Arc::new(ScriptedReranker(s)) as Arc<dyn Reranker>))
         .build()
   }

   fn ids(response: &SearchResponse) -> Vec<&str> {
      response.rows.iter().map(|r| r.id.as_str()).collect()
   }

   #[tokio::test]
   async fn lexical_mode_ranks_by_fused_propensity() {
      let ctx = full_context(None);
      let response = ctx.run("Mavi Elbise", Mode::Lexical, Some(3)).await.unwrap();

      assert_eq!(response.engine_used, EngineUsed::Lexical);
      assert_eq!(response.rows.len(), 3);
      assert_eq!(response.rows[0].id, "p1");
      let scores: Vec<f32> = response.rows.iter().map(|r| r.score.unwrap()).collect();
      assert!(scores.windows(2).all(|w| w[0] >= w[1]));
      assert!(response.rows.iter().all(|r| r.lexical_similarity.is_some()));
      assert!((scores[0] - 1.0).abs() < 1e-5);
   }

   #[tokio::test]
   async fn lexical_mode_uses_click_order_weights() {
      let catalog = Arc::new(snapshot());
      let ctx = PipelineContext::builder(Arc::clone(&catalog))
         .lexical(lexical_engine(&catalog))
         .propensity(Arc::new(PropensityEstimator::new(
            Arc::new(Buckets(vec![0.0, 1.0])),
            Arc::new(Identity),
         )))
         .build();
      let response = ctx.run("kırmızı elbise", Mode::Lexical, None).await.unwrap();
      assert_eq!(response.rows[0].id, "p3");
   }

   #[tokio::test]
   async fn lexical_mode_requires_propensity() {
      let catalog = Arc::new(snapshot());
      let ctx = PipelineContext::builder(Arc::clone(&catalog)).lexical(lexical_engine(&catalog)).build();
      let err = ctx.run("elbise", Mode::Lexical, None).await.unwrap_err();
      assert!(matches!(
         err,
         Error::ModelUnavailable { mode: Mode::Lexical, component: "propensity estimator", .. }
      ));
      assert!(err.is_unavailable());
   }

   #[tokio::test]
   async fn semantic_without_reranker_uses_recall_only() {
      let ctx = full_context(None);
      let response = ctx.run("elbise", Mode::Semantic, None).await.unwrap();
      assert_eq!(response.engine_used, EngineUsed::Semantic);
      assert_eq!(ids(&response), ["p1", "p3", "p2", "p4"]);
      assert!((response.rows[0].score.unwrap() - 1.0).abs() < 1e-5);
   }

   #[tokio::test]
   async fn semantic_with_reranker_fuses_both_signals() {
      let ctx = full_context(Some(Script::Keyword("Kırmızı")));
      let response = ctx.run("elbise", Mode::Semantic, Some(2)).await.unwrap();
      assert_eq!(response.engine_used, EngineUsed::SemanticReranked);
      assert_eq!(ids(&response), ["p3", "p1"]);
      assert!((response.rows[0].score.unwrap() - 0.96).abs() < 1e-3);
      assert!((response.rows[1].score.unwrap() - 0.2).abs() < 1e-3);
   }

   #[tokio::test]
   async fn failing_or_short_reranker_falls_back() {
      for script in [Script::Fail, Script::Short] {
         let ctx = full_context(Some(script));
         let response = ctx.run("elbise", Mode::Semantic, None).await.unwrap();
         assert_eq!(response.engine_used, EngineUsed::Semantic);
         assert_eq!(ids(&response)[0], "p1");
      }
   }

   struct FailingEncoder;

   #[async_trait::async_trait]
   impl Encoder for FailingEncoder {
      async fn encode(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
         Err(Error::Embedding("gpu oom".to_string()))
      }

      fn dim(&self) -> usize {
         4
      }

      fn is_ready(&self) -> bool {
         true
      }
   }

   fn failing_dense_engine() -> Arc<DenseEngine> {
      let index = EmbeddingIndex::from_rows(
         vec![vec![1.0, 0.0, 0.0, 0.0]],
         vec!["p1".into()],
         &AnnConfig::default(),
      )
      .unwrap();
      Arc::new(DenseEngine::new(Arc::new(FailingEncoder), index, 16).unwrap())
   }

   #[tokio::test]
   async fn semantic_without_any_recall_engine_is_unavailable() {
      let ctx = PipelineContext::builder(Arc::new(snapshot())).build();
      let err = ctx.run("elbise", Mode::Semantic, None).await.unwrap_err();
      assert!(matches!(
         err,
         Error::ModelUnavailable { mode: Mode::Semantic, component: "dense engine", cause: None }
      ));
   }

   #[tokio::test]
   async fn semantic_without_dense_engine_uses_lexical_recall() {
      let catalog = Arc::new(snapshot());
      let ctx = PipelineContext::builder(Arc::clone(&catalog)).lexical(lexical_engine(&catalog)).build();

      let response = ctx.run("kırmızı elbise", Mode::Semantic, Some(3)).await.unwrap();
      assert_eq!(response.engine_used, EngineUsed::SemanticLexicalFallback);
      assert_eq!(response.rows[0].id, "p3");
      assert!((response.rows[0].score.unwrap() - 1.0).abs() < 1e-5);
      let scores: Vec<f32> = response.rows.iter().map(|r| r.score.unwrap()).collect();
      assert!(scores.windows(2).all(|w| w[0] >= w[1]));
      assert!(response.rows.iter().all(|r| r.lexical_similarity.is_some()));
   }

   #[tokio::test]
   async fn dense_encoder_failure_falls_back_to_lexical_recall() {
      let catalog = Arc::new(snapshot());
      let ctx = PipelineContext::builder(Arc::clone(&catalog))
         .lexical(lexical_engine(&catalog))
         .dense(failing_dense_engine())
         .build();

      let response = ctx.run("ceket", Mode::Semantic, None).await.unwrap();
      assert_eq!(response.engine_used, EngineUsed::SemanticLexicalFallback);
      assert_eq!(response.rows[0].id, "p2");
   }

   #[tokio::test]
   async fn dense_encoder_failure_without_lexical_keeps_cause() {
      let ctx = PipelineContext::builder(Arc::new(snapshot())).dense(failing_dense_engine()).build();

      let err = ctx.run("ceket", Mode::Semantic, None).await.unwrap_err();
      assert!(err.is_unavailable());
      assert!(err.to_string().contains("gpu oom"), "{err}");
      let Error::ModelUnavailable { cause: Some(cause), .. } = err else {
         panic!("expected a dense failure cause");
      };
      assert!(matches!(*cause, Error::Embedding(_)));
   }

   #[tokio::test]
   async fn empty_query_is_empty_not_error() {
      let ctx = full_context(None);
      for mode in [Mode::Lexical, Mode::Semantic] {
         let response = ctx.run("  ?? ", mode, None).await.unwrap();
         assert!(response.rows.is_empty());
      }
   }

   #[tokio::test]
   async fn catalog_only_browses_and_filters() {
      let ctx = full_context(None);
      let response = ctx.run("", Mode::CatalogOnly, Some(2)).await.unwrap();
      assert_eq!(response.engine_used, EngineUsed::CatalogOnly);
      assert_eq!(ids(&response), ["p3", "p4"]);

      let filter = CatalogFilter { level2: Some("Ceket".into()), ..CatalogFilter::default() };
      let response = ctx.run_filtered("deri", Mode::CatalogOnly, None, &filter).await.unwrap();
      assert_eq!(ids(&response), ["p2"]);
      assert!(response.rows[0].score.is_none());
   }

   #[tokio::test]
   async fn limit_is_capped_by_settings() {
      let catalog = Arc::new(snapshot());
      let settings = PipelineSettings { max_limit: 1, ..PipelineSettings::default() };
      let ctx = PipelineContext::builder(catalog).settings(settings).build();
      let response = ctx.run("", Mode::CatalogOnly, Some(100)).await.unwrap();
      assert_eq!(response.rows.len(), 1);
   }

   #[tokio::test]
   async fn publish_keeps_in_flight_snapshots() {
      let handle = ContextHandle::new(PipelineContext::builder(Arc::new(snapshot())).build());
      let before = handle.snapshot();
      assert!(handle.run("elbise", Mode::Semantic, None).await.is_err());

      let previous = handle.publish(full_context(None));
      assert!(Arc::ptr_eq(&before, &previous));
      assert!(before.status().dense_rows.is_none());

      let response = handle.run("elbise", Mode::Semantic, None).await.unwrap();
      assert_eq!(response.engine_used, EngineUsed::Semantic);
   }

   #[test]
   fn status_reports_components() {
      let status = full_context(Some(Script::Fail)).status();
      assert_eq!(status.catalog_rows, 5);
      assert_eq!(status.lexical_rows, Some(5));
      assert!(status.propensity);
      assert_eq!(status.dense_rows, Some(4));
      assert_eq!(status.reranker.as_deref(), Some("cross_encoder"));
   }
}
