//! Satellite GHI nowcast pipeline service.
//!
//! Every cycle the service:
//! - walks the remote archive back from now to the latest day with data
//! - downloads the newest window of grid files, validated and cropped
//! - prunes local slots down to the retained window
//! - assembles the model input tensor and invokes the forecaster
//! - atomically replaces the single "latest forecast" file

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use forecast::{Forecaster, HttpForecaster, PersistenceForecaster, ScalerPair};
use nowcaster::catalog::CatalogClient;
use nowcaster::config::{ForecasterKind, PipelineConfig};
use nowcaster::cycle::CycleDriver;
use nowcaster::fetch::{FetchConfig, Fetcher};

#[derive(Parser, Debug)]
#[command(name = "nowcaster")]
#[command(about = "Satellite irradiance nowcast pipeline")]
struct Args {
    /// Run a single cycle and exit (vs continuous polling)
    #[arg(long)]
    once: bool,

    /// Pipeline configuration file
    #[arg(long, env = "NOWCAST_CONFIG", default_value = "config/pipeline.yaml")]
    config: PathBuf,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Initialize tracing
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting GHI nowcast pipeline");

    let config = PipelineConfig::load(&args.config)?;
    let (username, password) = config.source.credentials()?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.fetch.request_timeout_secs))
        .connect_timeout(Duration::from_secs(30))
        .build()
        .context("Failed to create HTTP client")?;

    let scalers = match &config.forecaster.scalers {
        Some(path) => ScalerPair::from_path(path)
            .with_context(|| format!("failed to load scalers from {:?}", path))?,
        None => ScalerPair::identity(),
    };

    let forecaster: Arc<dyn Forecaster> = match config.forecaster.kind {
        ForecasterKind::Http => {
            let endpoint = config
                .forecaster
                .endpoint
                .clone()
                .context("forecaster.endpoint is required for kind=http")?;
            info!(endpoint = %endpoint, "using HTTP forecaster");
            Arc::new(HttpForecaster::new(client.clone(), endpoint))
        }
        ForecasterKind::Persistence => {
            info!("using persistence forecaster");
            Arc::new(PersistenceForecaster)
        }
    };

    let catalog = CatalogClient::new(
        client.clone(),
        config.source.base_url.clone(),
        username.clone(),
        password.clone(),
        config.source.lookback_hours,
    );
    let fetcher = Fetcher::new(
        client,
        FetchConfig {
            max_retries: config.fetch.max_retries,
            retry_delay: Duration::from_secs(config.fetch.retry_delay_secs),
        },
        username,
        password,
        config.domain.bbox(),
        config.source.variable.clone(),
    );
    let driver = CycleDriver::new(
        catalog,
        fetcher,
        forecaster,
        scalers,
        config.storage.clone(),
        config.output.clone(),
    );

    if args.once {
        info!("Running single cycle");
        let outcome = driver.run_cycle(Utc::now()).await?;
        info!(outcome = ?outcome, "cycle complete");
        return Ok(());
    }

    let interval = Duration::from_secs(config.schedule.interval_minutes * 60);
    info!(
        interval_minutes = config.schedule.interval_minutes,
        "starting continuous polling"
    );
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match driver.run_cycle(Utc::now()).await {
                    Ok(outcome) => info!(outcome = ?outcome, "cycle complete"),
                    Err(e) => error!(error = %e, "cycle failed"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
        }
    }

    Ok(())
}
