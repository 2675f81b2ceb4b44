use std::{
   collections::BTreeMap,
   path::{Path, PathBuf},
};

use directories::BaseDirs;
use figment::{
   Figment,
   providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::{
   dense::ann::AnnKind,
   error::Result,
   fusion::FusionWeights,
   lexical::FitOptions,
   rerank::RerankerKind,
};

pub const DENSE_MODEL: &str = "sentence-transformers/paraphrase-multilingual-MiniLM-L12-v2";
pub const CROSS_ENCODER_MODEL: &str = "cross-encoder/ms-marco-MiniLM-L-6-v2";
pub const COLBERT_MODEL: &str = "colbert-ir/colbertv2.0";

pub const COLBERT_DIM: usize = 128;

pub const DEFAULT_BATCH_SIZE: usize = 64;
pub const MAX_BATCH_SIZE: usize = 256;

pub const MAX_THREADS: usize = 8;

const ENV_PREFIX: &str = "PRODRANK_";
const CONFIG_ENV: &str = "PRODRANK_CONFIG";

pub fn default_threads() -> usize {
   num_cpus::get().saturating_sub(1).clamp(1, MAX_THREADS)
}

pub fn default_data_dir() -> PathBuf {
   BaseDirs::new().map_or_else(
      || PathBuf::from(".prodrank"),
      |dirs| dirs.home_dir().join(".prodrank"),
   )
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
   /// Root for relative paths, the model cache and the default config file.
   pub data_dir:      PathBuf,
   pub catalog:       PathBuf,
   pub artifacts_dir: PathBuf,
   pub click_model:   PathBuf,
   pub order_model:   PathBuf,
   pub dense_model:   String,
   pub threads:       usize,
   pub batch_size:    usize,
   /// Entries kept in the query embedding cache.
   pub query_cache:   u64,
   pub default_limit: usize,
   pub max_limit:     usize,
   pub lexical:       LexicalConfig,
   pub semantic:      SemanticConfig,
   pub reranker:      RerankerConfig,
   pub ann:           AnnConfig,
   pub rewrite:       RewriteConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LexicalConfig {
   pub recall_depth: usize,
   /// Weights for (click, order) propensity.
   pub weights:      FusionWeights,
   pub fit:          FitOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticConfig {
   pub recall_depth: usize,
   /// Weights for (rerank, recall).
   pub weights:      FusionWeights,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankerConfig {
   pub enabled:       bool,
   pub kind:          RerankerKind,
   pub cross_model:   String,
   pub colbert_model: String,
   pub max_len:       usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnConfig {
   pub kind:            AnnKind,
   pub max_connections: usize,
   pub ef_construction: usize,
   pub ef_search:       usize,
}

/// Query corrections applied by the CLI before searching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteConfig {
   /// Rewrites below this confidence are discarded.
   pub min_confidence: f32,
   pub corrections:    BTreeMap<String, String>,
}

impl Default for Config {
   fn default() -> Self {
      Self {
         data_dir:      default_data_dir(),
         catalog:       PathBuf::from("catalog.csv"),
         artifacts_dir: PathBuf::from("artifacts"),
         click_model:   PathBuf::from("models/click.json"),
         order_model:   PathBuf::from("models/order.json"),
         dense_model:   DENSE_MODEL.to_string(),
         threads:       default_threads(),
         batch_size:    DEFAULT_BATCH_SIZE,
         query_cache:   10_000,
         default_limit: 50,
         max_limit:     200,
         lexical:       LexicalConfig::default(),
         semantic:      SemanticConfig::default(),
         reranker:      RerankerConfig::default(),
         ann:           AnnConfig::default(),
         rewrite:       RewriteConfig::default(),
      }
   }
}

impl Default for LexicalConfig {
   fn default() -> Self {
      Self {
         recall_depth: 200,
         weights:      FusionWeights::new(0.3, 0.7).unwrap_or(FusionWeights::only_first()),
         fit:          FitOptions::default(),
      }
   }
}

impl Default for SemanticConfig {
   fn default() -> Self {
      Self {
         recall_depth: 400,
         weights:      FusionWeights::new(0.8, 0.2).unwrap_or(FusionWeights::only_first()),
      }
   }
}

impl Default for RerankerConfig {
   fn default() -> Self {
      Self {
         enabled:       true,
         kind:          RerankerKind::CrossEncoder,
         cross_model:   CROSS_ENCODER_MODEL.to_string(),
         colbert_model: COLBERT_MODEL.to_string(),
         max_len:       256,
      }
   }
}

impl Default for AnnConfig {
   fn default() -> Self {
      Self { kind: AnnKind::Flat, max_connections: 24, ef_construction: 200, ef_search: 64 }
   }
}

impl Default for RewriteConfig {
   fn default() -> Self {
      Self { min_confidence: 0.6, corrections: BTreeMap::new() }
   }
}

impl Config {
   /// Merges defaults, the TOML file and `PRODRANK_*` variables, in that
   /// order. Nested keys use `__`, e.g. `PRODRANK_SEMANTIC__RECALL_DEPTH`.
   pub fn load(explicit: Option<&Path>) -> Result<Self> {
      let path = explicit
         .map(Path::to_path_buf)
         .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
         .unwrap_or_else(|| default_data_dir().join("config.toml"));
      Self::figment(&path).extract().map_err(Into::into)
   }

   pub fn figment(path: &Path) -> Figment {
      Figment::from(Serialized::defaults(Self::default()))
         .merge(Toml::file(path))
         .merge(Env::prefixed(ENV_PREFIX).ignore(&["config"]).split("__"))
   }

   fn resolve(&self, path: &Path) -> PathBuf {
      if path.is_absolute() { path.to_path_buf() } else { self.data_dir.join(path) }
   }

   pub fn catalog_path(&self) -> PathBuf {
      self.resolve(&self.catalog)
   }

   pub fn artifacts_path(&self) -> PathBuf {
      self.resolve(&self.artifacts_dir)
   }

   pub fn lexical_artifact(&self) -> PathBuf {
      self.artifacts_path().join("lexical.bin")
   }

   pub fn embedding_artifact(&self) -> PathBuf {
      self.artifacts_path().join("embeddings.bin")
   }

   pub fn click_model_path(&self) -> PathBuf {
      self.resolve(&self.click_model)
   }

   pub fn order_model_path(&self) -> PathBuf {
      self.resolve(&self.order_model)
   }

   pub fn model_dir(&self) -> PathBuf {
      self.data_dir.join("models")
   }

   pub fn threads(&self) -> usize {
      self.threads.clamp(1, MAX_THREADS)
   }

   pub fn batch_size(&self) -> usize {
      self.batch_size.clamp(1, MAX_BATCH_SIZE)
   }
}

#[cfg(test)]
mod tests {
   use figment::Jail;

   use super::*;

   #[test]
   fn defaults_match_documented_values() {
      let config = Config::default();
      assert_eq!(config.lexical.recall_depth, 200);
      assert_eq!(config.semantic.recall_depth, 400);
      assert_eq!(config.default_limit, 50);
      assert!((config.lexical.weights.first() - 0.3).abs() < 1e-6);
      assert!((config.semantic.weights.first() - 0.8).abs() < 1e-6);
      assert_eq!(config.reranker.kind, RerankerKind::CrossEncoder);
   }

   #[test]
   fn relative_paths_resolve_under_data_dir() {
      let config = Config { data_dir: PathBuf::from("/srv/prodrank"), ..Config::default() };
      assert_eq!(config.catalog_path(), PathBuf::from("/srv/prodrank/catalog.csv"));
      assert_eq!(
         config.lexical_artifact(),
         PathBuf::from("/srv/prodrank/artifacts/lexical.bin")
      );

      let config = Config { catalog: PathBuf::from("/data/products.csv"), ..config };
      assert_eq!(config.catalog_path(), PathBuf::from("/data/products.csv"));
   }

   #[test]
   fn file_and_env_layers_override_defaults() {
      Jail::expect_with(|jail| {
         jail.create_file(
            "prodrank.toml",
            r#"
               default_limit = 20

               [semantic]
               recall_depth = 100
               weights = [0.6, 0.4]

               [reranker]
               kind = "colbert"

               [rewrite.corrections]
               telfon = "telefon"
            "#,
         )?;
         jail.set_env("PRODRANK_DEFAULT_LIMIT", "30");
         jail.set_env("PRODRANK_ANN__KIND", "hnsw");

         let config: Config = Config::figment(Path::new("prodrank.toml")).extract()?;
         assert_eq!(config.default_limit, 30);
         assert_eq!(config.semantic.recall_depth, 100);
         assert!((config.semantic.weights.second() - 0.4).abs() < 1e-6);
         assert_eq!(config.reranker.kind, RerankerKind::Colbert);
         assert_eq!(config.ann.kind, AnnKind::Hnsw);
         assert_eq!(config.lexical.recall_depth, 200);
         assert_eq!(config.rewrite.corrections["telfon"], "telefon");
         Ok(())
      });
   }

   #[test]
   fn invalid_weights_are_rejected() {
      Jail::expect_with(|jail| {
         jail.create_file("bad.toml", "[lexical]\nweights = [-1.0, 0.5]\n")?;
         assert!(Config::figment(Path::new("bad.toml")).extract::<Config>().is_err());
         Ok(())
      });
   }
}
