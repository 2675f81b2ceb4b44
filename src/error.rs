use std::path::PathBuf;

use crate::types::Mode;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
   #[error("io error: {0}")]
   Io(#[from] std::io::Error),

   #[error("json error: {0}")]
   Json(#[from] serde_json::Error),

   #[error("artifact encoding error: {0}")]
   Postcard(#[from] postcard::Error),

   #[error("arrow error: {0}")]
   Arrow(#[from] arrow_schema::ArrowError),

   #[error("tensor error: {0}")]
   Candle(#[from] candle_core::Error),

   #[error("configuration error: {0}")]
   Config(#[from] Box<figment::Error>),

   #[error("model load failed: {0}")]
   ModelLoad(String),

   #[error("encoding failed: {0}")]
   Embedding(String),

   #[error("reranker failed: {0}")]
   Rerank(String),

   #[error("invalid index: {0}")]
   InvalidIndex(String),

   #[error("catalog file not found: {}", .0.display())]
   CatalogMissing(PathBuf),

   #[error("invalid catalog: {0}")]
   InvalidCatalog(String),

   #[error("shape mismatch in {op}: expected {expected}, got {actual}")]
   ShapeMismatch { op: &'static str, expected: usize, actual: usize },

   #[error("invalid fusion weights ({0}, {1})")]
   InvalidWeights(f32, f32),

   #[error("{mode} mode unavailable: {component} {}", unavailable_reason(.cause.as_deref()))]
   ModelUnavailable {
      mode:      Mode,
      component: &'static str,
      #[source]
      cause:     Option<Box<Error>>,
   },
}

fn unavailable_reason(cause: Option<&Error>) -> String {
   cause.map_or_else(|| "is not ready".to_string(), |e| format!("failed: {e}"))
}

impl From<figment::Error> for Error {
   fn from(err: figment::Error) -> Self {
      Self::Config(Box::new(err))
   }
}

impl Error {
   pub const fn unavailable(mode: Mode, component: &'static str) -> Self {
      Self::ModelUnavailable { mode, component, cause: None }
   }

   /// Whether this failure means a required component is missing rather than a
   /// broken request.
   pub const fn is_unavailable(&self) -> bool {
      matches!(self, Self::ModelUnavailable { .. })
   }
}
