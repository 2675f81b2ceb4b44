use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use prodrank::{Mode, catalog::CatalogFilter, config::Config};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "prodrank", version, about = "Multi-signal product search ranking")]
struct Cli {
   /// Configuration file (defaults to ~/.prodrank/config.toml)
   #[arg(long, global = true, env = "PRODRANK_CONFIG")]
   config: Option<PathBuf>,

   #[command(subcommand)]
   command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
   /// Search the catalog
   Search {
      query: String,

      /// lexical, semantic or catalog_only
      #[arg(short, long, default_value = "semantic")]
      mode: Mode,

      #[arg(short = 'n', long)]
      limit: Option<usize>,

      #[arg(long)]
      json: bool,

      /// Show fused scores
      #[arg(long)]
      scores: bool,

      /// Skip configured query corrections
      #[arg(long)]
      no_rewrite: bool,

      #[command(flatten)]
      filter: FilterArgs,
   },
   /// Fit the lexical index and encode the embedding index
   BuildIndex {
      /// Skip the embedding index
      #[arg(long)]
      lexical_only: bool,
   },
   /// List catalog categories with product counts
   Categories {
      /// Only the N most populated level 2 categories
      #[arg(long, value_name = "N")]
      popular: Option<usize>,

      #[arg(long)]
      json: bool,
   },
   /// Show component readiness and index sizes
   Status {
      #[arg(long)]
      json: bool,
   },
   /// Print the effective configuration as TOML
   Config,
}

/// Attribute constraints for `catalog_only` searches.
#[derive(Args)]
struct FilterArgs {
   #[arg(long)]
   level1:      Option<String>,
   /// Repeat to match any of several level 2 categories
   #[arg(long)]
   level2:      Vec<String>,
   #[arg(long)]
   leaf:        Option<String>,
   #[arg(long)]
   min_price:   Option<f64>,
   #[arg(long)]
   max_price:   Option<f64>,
   #[arg(long)]
   min_rating:  Option<f32>,
   #[arg(long)]
   min_reviews: Option<u32>,
}

impl From<FilterArgs> for CatalogFilter {
   fn from(args: FilterArgs) -> Self {
      Self {
         level1:        args.level1,
         level2:        None,
         level2_any:    args.level2,
         leaf_contains: args.leaf,
         min_price:     args.min_price,
         max_price:     args.max_price,
         min_rating:    args.min_rating,
         min_reviews:   args.min_reviews,
      }
   }
}

#[tokio::main]
async fn main() -> Result<()> {
   tracing_subscriber::fmt()
      .with_env_filter(
         EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("prodrank=info")),
      )
      .with_writer(std::io::stderr)
      .init();

   let cli = Cli::parse();
   let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;

   rayon::ThreadPoolBuilder::new()
      .num_threads(config.threads())
      .build_global()
      .context("failed to initialize thread pool")?;

   match cli.command {
      Cmd::Search { query, mode, limit, json, scores, no_rewrite, filter } => {
         let options = commands::search::SearchOptions { json, scores, rewrite: !no_rewrite };
         commands::search::execute(&config, query, mode, limit, filter.into(), options).await
      },
      Cmd::BuildIndex { lexical_only } => commands::build::execute(&config, lexical_only).await,
      Cmd::Categories { popular, json } => commands::categories::execute(&config, popular, json),
      Cmd::Status { json } => commands::status::execute(&config, json),
      Cmd::Config => commands::config::execute(&config),
   }
}
