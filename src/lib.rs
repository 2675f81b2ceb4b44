pub mod catalog;
pub mod config;
pub mod dense;
pub mod embed;
pub mod error;
pub mod fusion;
pub mod lexical;
pub mod load;
pub mod normalize;
pub mod pipeline;
pub mod propensity;
pub mod rerank;
pub mod rewrite;
pub mod types;

pub use error::{Error, Result};
pub use pipeline::{ContextHandle, PipelineContext};
pub use types::{EngineUsed, Mode, ProductRow, Query, SearchResponse};
