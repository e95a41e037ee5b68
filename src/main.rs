use anyhow::Result;
use clap::Parser;

use event_scout::{AppConfig, DiscoveryMode, DiscoveryRequest};

/// Find upcoming conventions, book fairs and author events in a US state.
#[derive(Debug, Parser)]
#[command(name = "event-scout", version)]
struct Cli {
    /// Two-letter state code, e.g. ID or CA.
    state: String,

    /// Skip the cache and run a live discovery pass.
    #[arg(long)]
    refresh: bool,

    /// Free-text description of the reader, used to score relevance.
    #[arg(long)]
    profile: Option<String>,

    /// `search` (default) or `answer`.
    #[arg(long)]
    mode: Option<DiscoveryMode>,

    /// Do not read or write the local cache.
    #[arg(long)]
    no_cache: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    event_scout::init_tracing();
    let cli = Cli::parse();

    let mut config = AppConfig::load();
    if let Some(mode) = cli.mode {
        config.mode = mode;
    }
    if cli.no_cache {
        config.cache_enabled = false;
    }

    let request = DiscoveryRequest {
        state: cli.state,
        force_refresh: cli.refresh,
        user_profile: cli.profile,
    };

    match event_scout::discover(config, &request).await {
        Ok(response) => {
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        Err(err) => {
            println!("{}", serde_json::to_string_pretty(&err.body())?);
            tracing::error!("discovery failed ({}): {err}", err.status());
            std::process::exit(if err.status() < 500 { 2 } else { 1 });
        }
    }
}
