//! Paper VSS server - HTTP API for semantic paper search.
//!
//! Configuration is read from `paper-vss.toml` (or the path in
//! `PAPER_VSS_CONFIG`) and `PAPER_VSS__*` environment variables; a `.env` file
//! in the working directory is loaded first.

use anyhow::Context;
use paper_vss::config::AppConfig;
use std::path::PathBuf;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config_path = std::env::var_os("PAPER_VSS_CONFIG").map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref()).context("Failed to load configuration")?;

    paper_vss::server::start_server(config).await?;

    Ok(())
}
