use std::time::Instant;

use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use prodrank::{catalog::loader, config::Config, embed::CandleEncoder, load};

pub async fn execute(config: &Config, lexical_only: bool) -> Result<()> {
   let started = Instant::now();
   let catalog = loader::load_csv(&config.catalog_path()).context("failed to load catalog")?;
   println!("{} {} products", style("Catalog:").bold(), catalog.len());

   let corpus = load::fit_lexical(config, &catalog).context("failed to fit lexical index")?;
   let lexical_path = config.lexical_artifact();
   corpus
      .save(&lexical_path)
      .with_context(|| format!("failed to write {}", lexical_path.display()))?;
   println!(
      "{} Lexical index: {} terms → {}",
      style("✓").green(),
      corpus.vocabulary().len(),
      lexical_path.display()
   );

   if lexical_only {
      return Ok(());
   }

   let encoder = CandleEncoder::load(&config.dense_model, &config.model_dir(), config.batch_size())
      .context("failed to load dense encoder")?;

   let pb = ProgressBar::new(catalog.len() as u64);
   pb.set_style(
      ProgressStyle::default_bar()
         .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
         .progress_chars("=>-"),
   );
   pb.set_message("encoding products");

   let index = load::encode_catalog(config, &catalog, &encoder, |n| pb.inc(n as u64))
      .await
      .context("failed to encode catalog")?;
   pb.finish_and_clear();

   let embedding_path = config.embedding_artifact();
   index
      .save(&embedding_path)
      .with_context(|| format!("failed to write {}", embedding_path.display()))?;
   println!(
      "{} Embedding index: {} × {} → {}",
      style("✓").green(),
      index.len(),
      index.dim(),
      embedding_path.display()
   );

   println!("{}", style(format!("Done in {:.1}s", started.elapsed().as_secs_f32())).dim());
   Ok(())
}
