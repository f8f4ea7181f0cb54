//! One pipeline cycle: acquire the newest slots, assemble the input
//! window, invoke the forecaster, persist the latest forecast.
//!
//! Cycles share no state with each other beyond the slot files on disk;
//! a cycle that aborts leaves the previous forecast file untouched.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use forecast::{assemble, forecast_valid_time, Forecaster, ScalerPair, WindowError, WINDOW_LEN};
use netcdf_grid::GridData;
use tokio::fs;
use tracing::{error, info, instrument, warn};

use crate::catalog::CatalogClient;
use crate::config::{OutputConfig, StorageConfig};
use crate::fetch::{FetchOutcome, Fetcher};
use crate::retention;

/// Why a cycle ended without invoking the forecaster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// The catalog lookback found no archive day with data.
    CatalogExhausted,
    /// Fewer than a full window of usable slots on disk.
    InsufficientInputs,
    /// A full window exists but its grids do not line up.
    WindowUnusable,
}

/// Terminal state of one cycle.
#[derive(Debug)]
pub enum CycleOutcome {
    /// Forecast written; `valid_time` is the instant it predicts.
    Done {
        output: PathBuf,
        valid_time: DateTime<Utc>,
    },
    /// Skipped before forecasting; no output was touched.
    Aborted(AbortReason),
    /// Forecaster invocation failed; the previous output survives.
    ForecastFailed,
}

pub struct CycleDriver {
    catalog: CatalogClient,
    fetcher: Fetcher,
    forecaster: Arc<dyn Forecaster>,
    scalers: ScalerPair,
    storage: StorageConfig,
    output: OutputConfig,
}

impl CycleDriver {
    pub fn new(
        catalog: CatalogClient,
        fetcher: Fetcher,
        forecaster: Arc<dyn Forecaster>,
        scalers: ScalerPair,
        storage: StorageConfig,
        output: OutputConfig,
    ) -> Self {
        Self {
            catalog,
            fetcher,
            forecaster,
            scalers,
            storage,
            output,
        }
    }

    /// Run one full cycle as of `now`.
    #[instrument(skip(self), fields(now = %now))]
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleOutcome> {
        if !self.acquire(now).await? {
            return Ok(CycleOutcome::Aborted(AbortReason::CatalogExhausted));
        }
        self.nowcast().await
    }

    /// Acquisition phase: locate the latest archive day and fetch its
    /// newest window of files. Returns false when the lookback found
    /// nothing at all; individual fetch failures only degrade the cycle.
    pub async fn acquire(&self, now: DateTime<Utc>) -> Result<bool> {
        let Some(listing) = self.catalog.find_latest(now).await? else {
            return Ok(false);
        };

        let start = listing.files.len().saturating_sub(WINDOW_LEN);
        let mut failed = 0usize;
        for name in &listing.files[start..] {
            let url = self
                .catalog
                .file_url(listing.year, listing.month, listing.day, name);
            match self
                .fetcher
                .fetch(&url, name, &self.storage.data_dir)
                .await
            {
                Ok(FetchOutcome::Failed) => failed += 1,
                Ok(_) => {}
                Err(e) => {
                    warn!(file = %name, error = %e, "fetch error");
                    failed += 1;
                }
            }
        }
        if failed > 0 {
            warn!(failed, "acquisition degraded, relying on retained slots");
        }
        Ok(true)
    }

    /// Forecast phase: retain, assemble, predict, persist. Operates purely
    /// on the slot files currently on disk.
    pub async fn nowcast(&self) -> Result<CycleOutcome> {
        let kept = retention::retain(&self.storage.data_dir, self.storage.keep).await?;
        if kept.len() < WINDOW_LEN {
            warn!(
                available = kept.len(),
                needed = WINDOW_LEN,
                "not enough slots for a window"
            );
            return Ok(CycleOutcome::Aborted(AbortReason::InsufficientInputs));
        }

        let mut grids = Vec::with_capacity(WINDOW_LEN);
        for path in &kept[kept.len() - WINDOW_LEN..] {
            match GridData::from_path(path) {
                Ok(grid) => grids.push(grid),
                Err(e) => warn!(path = %path.display(), error = %e, "unreadable slot, skipping"),
            }
        }

        let window = match assemble(grids) {
            Ok(w) => w,
            Err(WindowError::InsufficientInputs { expected, actual }) => {
                warn!(expected, actual, "window assembly short of inputs");
                return Ok(CycleOutcome::Aborted(AbortReason::InsufficientInputs));
            }
            Err(e) => {
                error!(error = %e, "window assembly failed");
                return Ok(CycleOutcome::Aborted(AbortReason::WindowUnusable));
            }
        };

        let mut scaled = window.clone();
        self.scalers.input.apply_slice(&mut scaled.data);
        let mut field = match self.forecaster.predict(&scaled).await {
            Ok(p) => p,
            Err(e) => {
                error!(error = %e, "forecast invocation failed");
                return Ok(CycleOutcome::ForecastFailed);
            }
        };
        self.scalers.output.invert_slice(&mut field);

        let valid_time = forecast_valid_time(window.last_time());
        let output = self.persist(&window, field, valid_time).await?;
        info!(
            output = %output.display(),
            valid_time = %valid_time,
            "forecast persisted"
        );
        Ok(CycleOutcome::Done { output, valid_time })
    }

    /// Write the forecast grid, replacing the previous latest atomically.
    async fn persist(
        &self,
        window: &forecast::WindowTensor,
        field: Vec<f32>,
        valid_time: DateTime<Utc>,
    ) -> Result<PathBuf> {
        let grid = GridData::new(
            self.output.variable.clone(),
            vec![valid_time],
            window.lats.clone(),
            window.lons.clone(),
            field,
        )
        .context("forecast output does not match the window grid shape")?;

        let path = self.output.path.clone();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("failed to create {:?}", parent))?;
            }
        }
        let staged = path.with_extension("tmp");
        fs::write(&staged, grid.to_bytes())
            .await
            .with_context(|| format!("failed to write {:?}", staged))?;
        if let Err(e) = fs::rename(&staged, &path).await {
            fs::remove_file(&staged).await.ok();
            return Err(e)
                .with_context(|| format!("failed to move forecast into place at {:?}", path));
        }
        Ok(path)
    }
}
