//! Building pipeline contexts from configuration: startup, refresh and index
//! construction.

use std::sync::Arc;

use crate::{
   catalog::{CatalogSnapshot, loader},
   config::Config,
   dense::{DenseEngine, EmbeddingIndex},
   embed::{CandleEncoder, Encoder},
   error::Result,
   lexical::{CorpusIndex, LexicalEngine},
   pipeline::{ContextHandle, PipelineContext, PipelineSettings},
   propensity::PropensityEstimator,
   rerank::{self, Reranker},
   types::Mode,
};

/// Models are loaded once per process and shared by every context built
/// afterwards. A model that fails to load disables its component.
#[derive(Clone, Default)]
pub struct Models {
   pub encoder:    Option<Arc<dyn Encoder>>,
   pub reranker:   Option<Arc<dyn Reranker>>,
   pub propensity: Option<Arc<PropensityEstimator>>,
}

impl Models {
   pub fn load(config: &Config) -> Self {
      let cache_dir = config.model_dir();

      let encoder = match CandleEncoder::load(&config.dense_model, &cache_dir, config.batch_size()) {
         Ok(encoder) => Some(Arc::new(encoder) as Arc<dyn Encoder>),
         Err(e) => {
            tracing::warn!("dense encoder unavailable: {}", e);
            None
         },
      };

      let reranker = if config.reranker.enabled {
         rerank::load(&config.reranker, &cache_dir, config.batch_size())
            .inspect_err(|e| tracing::warn!("{} reranker unavailable: {}", config.reranker.kind, e))
            .ok()
      } else {
         None
      };

      Self { encoder, reranker, propensity: Self::load_propensity(config) }
   }

   /// Loads only what `mode` can use.
   pub fn for_mode(config: &Config, mode: Mode) -> Self {
      match mode {
         Mode::Semantic => Self::load(config),
         Mode::Lexical => Self { propensity: Self::load_propensity(config), ..Self::default() },
         Mode::CatalogOnly => Self::default(),
      }
   }

   pub fn load_propensity(config: &Config) -> Option<Arc<PropensityEstimator>> {
      match PropensityEstimator::load(&config.click_model_path(), &config.order_model_path()) {
         Ok(estimator) => estimator.map(Arc::new),
         Err(e) => {
            tracing::warn!("propensity models failed to load: {}", e);
            None
         },
      }
   }
}

/// Text indexed for a product in both recall engines.
fn documents(catalog: &CatalogSnapshot) -> impl Iterator<Item = (String, String)> + '_ {
   catalog.records().iter().map(|r| (r.id.clone(), r.search_text()))
}

pub fn fit_lexical(config: &Config, catalog: &CatalogSnapshot) -> Result<CorpusIndex> {
   let index = CorpusIndex::fit(documents(catalog), config.lexical.fit)?;
   tracing::info!(
      "fitted lexical index: {} documents, {} terms",
      index.len(),
      index.vocabulary().len()
   );
   Ok(index)
}

/// Encodes every catalog product, reporting progress after each batch.
pub async fn encode_catalog(
   config: &Config,
   catalog: &CatalogSnapshot,
   encoder: &dyn Encoder,
   mut on_batch: impl FnMut(usize) + Send,
) -> Result<EmbeddingIndex> {
   let (ids, texts): (Vec<String>, Vec<String>) = documents(catalog).unzip();
   let mut rows = Vec::with_capacity(texts.len());
   for chunk in texts.chunks(config.batch_size()) {
      rows.extend(encoder.encode(chunk).await?);
      on_batch(chunk.len());
   }
   EmbeddingIndex::from_rows(rows, ids, &config.ann)
}

/// Loads the catalog and index artifacts into a new context around `models`.
/// The catalog is mandatory; a missing lexical artifact is fitted in memory
/// and a missing embedding artifact leaves semantic mode unavailable.
pub fn build_context(config: &Config, models: &Models) -> Result<PipelineContext> {
   let catalog = Arc::new(loader::load_csv(&config.catalog_path())?);

   let lexical_path = config.lexical_artifact();
   let corpus = if lexical_path.exists() {
      CorpusIndex::load(&lexical_path)?
   } else {
      tracing::info!("no lexical artifact at {}; fitting from catalog", lexical_path.display());
      fit_lexical(config, &catalog)?
   };

   let embedding_path = config.embedding_artifact();
   let dense = match &models.encoder {
      Some(encoder) if embedding_path.exists() => {
         let index = EmbeddingIndex::load(&embedding_path, &config.ann)?;
         tracing::info!("loaded {} embeddings ({:?} index)", index.len(), index.ann().kind());
         Some(Arc::new(DenseEngine::new(Arc::clone(encoder), index, config.query_cache)?))
      },
      Some(_) => {
         tracing::warn!(
            "no embedding artifact at {}; run 'prodrank build-index'",
            embedding_path.display()
         );
         None
      },
      None => None,
   };

   Ok(PipelineContext::builder(catalog)
      .lexical(Arc::new(LexicalEngine::new(corpus)))
      .propensity(models.propensity.clone())
      .dense(dense)
      .reranker(models.reranker.clone())
      .settings(PipelineSettings::from(config))
      .build())
}

/// Rebuilds the context from disk, reusing loaded models, and publishes it.
/// On failure the current context stays in place.
pub fn refresh(config: &Config, models: &Models, handle: &ContextHandle) -> Result<()> {
   let ctx = build_context(config, models)?;
   let rows = ctx.catalog().len();
   handle.publish(ctx);
   tracing::info!("refreshed pipeline context ({} products)", rows);
   Ok(())
}
