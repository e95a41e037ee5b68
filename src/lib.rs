pub mod config;
pub mod dates;
pub mod db;
pub mod diagnostic;
pub mod extraction;
pub mod models;
pub mod normalize;
pub mod oracle;
pub mod pipeline;
pub mod relevance;
pub mod states;
mod utils;

use tracing_subscriber::EnvFilter;

pub use config::{AppConfig, DiscoveryMode};
pub use models::{DiscoveryRequest, DiscoveryResponse, ErrorBody, EventItem, RawEventCandidate};
pub use pipeline::{DiscoveryError, Pipeline};

/// Logs go to stderr so stdout stays clean for JSON output.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("event_scout=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub async fn discover(
    config: AppConfig,
    request: &DiscoveryRequest,
) -> Result<DiscoveryResponse, DiscoveryError> {
    let pipeline = Pipeline::from_config(config).await?;
    pipeline.discover(request).await
}
