use anyhow::{Context, Result};
use prodrank::config::Config;

pub fn execute(config: &Config) -> Result<()> {
   let rendered = toml::to_string_pretty(config).context("failed to render configuration")?;
   print!("{rendered}");
   Ok(())
}
