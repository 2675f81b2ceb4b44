use anyhow::{Context, Result, bail};
use console::style;
use prodrank::{
   EngineUsed, Mode, ProductRow,
   catalog::CatalogFilter,
   config::Config,
   load::{self, Models},
   rewrite::{CorrectionTable, Passthrough, QueryRewriter},
};
use serde::Serialize;

#[derive(Default, Debug, Clone, Copy)]
pub struct SearchOptions {
   pub json:    bool,
   pub scores:  bool,
   pub rewrite: bool,
}

#[derive(Debug, Serialize)]
struct JsonOutput<'a> {
   query:       &'a str,
   #[serde(skip_serializing_if = "Option::is_none")]
   corrected:   Option<&'a str>,
   engine_used: EngineUsed,
   results:     &'a [ProductRow],
}

pub async fn execute(
   config: &Config,
   query: String,
   mode: Mode,
   limit: Option<usize>,
   filter: CatalogFilter,
   options: SearchOptions,
) -> Result<()> {
   let effective = if options.rewrite { rewrite_query(config, &query) } else { query.clone() };

   let models = Models::for_mode(config, mode);
   let ctx = load::build_context(config, &models).context("failed to build pipeline context")?;

   let response = match ctx.run_filtered(&effective, mode, limit, &filter).await {
      Ok(response) => response,
      Err(e) if e.is_unavailable() => {
         bail!("{e}\nhint: run 'prodrank build-index' or check 'prodrank status'")
      },
      Err(e) => return Err(e).context("search failed"),
   };

   if options.json {
      let output = JsonOutput {
         query:       &query,
         corrected:   (effective != query).then_some(effective.as_str()),
         engine_used: response.engine_used,
         results:     &response.rows,
      };
      println!("{}", serde_json::to_string(&output)?);
      return Ok(());
   }

   if effective != query {
      println!("{} {}", style("Showing results for").dim(), style(&effective).bold());
   }
   if response.rows.is_empty() {
      println!("No results found for '{}'", effective);
      return Ok(());
   }

   println!(
      "{} {}\n",
      style(format!("{} results", response.rows.len())).bold(),
      style(format!("via {}", response.engine_used)).dim()
   );
   for (rank, row) in response.rows.iter().enumerate() {
      format_row(rank + 1, row, options.scores);
   }

   Ok(())
}

/// Applies the configured corrections when they are confident enough.
fn rewrite_query(config: &Config, raw: &str) -> String {
   let table = CorrectionTable::new(&config.rewrite.corrections);
   let rewriter: Box<dyn QueryRewriter> =
      if table.is_empty() { Box::new(Passthrough) } else { Box::new(table) };

   let rewrite = rewriter.rewrite(raw);
   if !rewrite.changed(raw) {
      return raw.to_string();
   }
   if rewrite.confidence < config.rewrite.min_confidence {
      tracing::debug!(confidence = rewrite.confidence, "discarded rewrite '{}'", rewrite.text);
      return raw.to_string();
   }
   tracing::info!("rewrote '{}' to '{}' ({:.2})", raw, rewrite.text, rewrite.confidence);
   rewrite.text
}

fn format_row(rank: usize, row: &ProductRow, scores: bool) {
   let mut header = format!("{:>3}. {}", rank, style(&row.title).bold());
   if scores && let Some(score) = row.score {
      header.push_str(&format!(" {}", style(format!("({score:.3})")).dim()));
   }
   println!("{header}");

   let path: Vec<&str> = [&row.level1_category, &row.level2_category, &row.leaf_category]
      .into_iter()
      .map(String::as_str)
      .filter(|s| !s.is_empty())
      .collect();
   if !path.is_empty() {
      println!("     {}", style(path.join(" › ")).dim());
   }

   let mut details = format!("     {:.2} TL", row.selling_price);
   if let Some(discount) = row.discount_percentage.filter(|d| *d > 0.0) {
      details.push_str(&format!(" {}", style(format!("-{discount:.0}%")).green()));
   }
   if let Some(rating) = row.rating_avg {
      details.push_str(&format!(
         "  {} {}",
         style(format!("★ {rating:.1}")).yellow(),
         style(format!("({} reviews)", row.review_count)).dim()
      ));
   }
   if scores && let Some(similarity) = row.lexical_similarity {
      details.push_str(&format!("  {}", style(format!("sim {similarity:.3}")).dim()));
   }
   println!("{details}\n     {}\n", style(&row.id).dim());
}
