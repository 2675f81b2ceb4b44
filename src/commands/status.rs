use anyhow::{Context, Result};
use console::style;
use prodrank::{
   config::Config,
   load::{self, Models},
};

fn line(ready: bool, name: &str, detail: &str) {
   let dot = if ready { style("●").green() } else { style("●").red() };
   println!("  {} {} {}", dot, name, style(format!("({detail})")).dim());
}

pub fn execute(config: &Config, json: bool) -> Result<()> {
   let models = Models::load(config);
   let ctx = load::build_context(config, &models).context("failed to build pipeline context")?;
   let status = ctx.status();

   if json {
      println!("{}", serde_json::to_string(&status)?);
      return Ok(());
   }

   println!("{}", style("Components:").bold());
   println!();
   line(
      true,
      "catalog",
      &format!(
         "{} products, loaded {}",
         status.catalog_rows,
         status.catalog_loaded_at.format("%Y-%m-%d %H:%M:%S UTC")
      ),
   );
   match (status.lexical_rows, status.lexical_terms) {
      (Some(rows), Some(terms)) => line(true, "lexical index", &format!("{rows} rows, {terms} terms")),
      _ => line(false, "lexical index", "missing"),
   }
   line(
      status.propensity,
      "propensity models",
      if status.propensity { "ready" } else { "missing" },
   );
   match status.dense_rows {
      Some(rows) => line(status.dense_ready, "embedding index", &format!("{rows} rows")),
      None => line(false, "embedding index", "missing; run 'prodrank build-index'"),
   }
   match &status.reranker {
      Some(kind) => line(true, "reranker", kind),
      None => line(false, "reranker", "disabled or unavailable"),
   }

   Ok(())
}
