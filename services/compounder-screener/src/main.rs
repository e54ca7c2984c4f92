//! Compounder Screener - ranks quality compounders from cached fundamentals.
//!
//! Configuration comes from `~/.compounder/config.json` plus `COMPOUNDER_*`
//! environment overrides. Logs go to stderr; the result is printed to stdout
//! as JSON.

use anyhow::{Context, Result};
use compounder_common::logging::init_logging;
use compounder_common::Config;
use compounder_screener::ScreenerService;

#[tokio::main]
async fn main() -> Result<()> {
    let startup_start = std::time::Instant::now();

    let config = Config::load_with_env()?;
    config.validate().context("Invalid configuration")?;

    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    tracing::info!("Compounder Screener v{}", env!("CARGO_PKG_VERSION"));

    let service = ScreenerService::new(config);
    let result = service.run().await?;

    tracing::info!(
        duration_ms = startup_start.elapsed().as_millis() as u64,
        qualified = result.qualified,
        "Screen complete"
    );

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
