use anyhow::{Context, Result};
use console::style;
use prodrank::{catalog::loader, config::Config};
use serde_json::json;

pub fn execute(config: &Config, popular: Option<usize>, json: bool) -> Result<()> {
   let catalog = loader::load_csv(&config.catalog_path()).context("failed to load catalog")?;

   if let Some(limit) = popular {
      let categories = catalog.popular_categories(limit);
      if json {
         println!("{}", serde_json::to_string(&categories)?);
         return Ok(());
      }
      for category in &categories {
         let rating = category.avg_rating.map_or_else(|| "-".to_string(), |r| format!("★ {r:.1}"));
         println!(
            "  {} {} {}",
            style(&category.name).bold(),
            style(format!("({} products)", category.count)).dim(),
            style(format!("{rating}  ~{:.2} TL", category.avg_price)).dim()
         );
      }
      return Ok(());
   }

   let groups = catalog.categories();
   if json {
      let output = json!({ "groups": groups, "total_products": catalog.len() });
      println!("{}", serde_json::to_string(&output)?);
      return Ok(());
   }

   println!("{} {} products", style("Catalog:").bold(), catalog.len());
   for group in &groups {
      println!();
      println!("{} {}", style(&group.name).bold(), style(format!("({})", group.count)).dim());
      for sub in &group.subcategories {
         println!("  {} {}", sub.name, style(format!("({})", sub.count)).dim());
      }
   }
   Ok(())
}
