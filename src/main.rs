mod api;
mod config;
mod error;
mod metrics;

use anyhow::Result;
use api::MeterClient;
use config::Config;
use dotenv::dotenv;
use error::MetricsError;
use log::{error, info, warn};
use metrics::{DeviceCache, MetricsEngine};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists
    dotenv().ok();

    // Initialize logging
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = Config::from_env();
    info!(
        "Starting usage predictor against meter API at: {}",
        config.api_url
    );
    if !config.has_credentials() {
        warn!("no credentials configured; relying on stored tokens");
    }

    let client = MeterClient::new(&config)?;
    let cache = Arc::new(DeviceCache::default());
    let engine = MetricsEngine::new(client, cache, config.debug);

    match engine.build().await {
        Ok(report) => {
            info!("reporting metrics for {} devices", report.devices.len());
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Err(err @ MetricsError::Transient { .. }) => {
            // Retry policy is the caller's: rerun after a short delay.
            warn!("report build failed: {}", err);
            std::process::exit(2);
        }
        Err(err) => {
            error!("{}", err);
            std::process::exit(1);
        }
    }
}
