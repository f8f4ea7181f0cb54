//! Pipeline configuration loaded from a YAML file.
//!
//! Credentials never live in the file itself; the source section names the
//! environment variables they are read from.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use nowcast_common::BoundingBox;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub source: SourceConfig,
    pub domain: DomainConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub forecaster: ForecasterConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

/// Remote archive hosting the day-indexed directory listing.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Base URL; day listings live at `<base_url>/YYYY/MM/DD/`.
    pub base_url: String,

    /// Product variable expected inside the downloaded grids.
    #[serde(default = "default_variable")]
    pub variable: String,

    /// Environment variable holding the basic-auth username.
    #[serde(default = "default_username_env")]
    pub username_env: String,

    /// Environment variable holding the basic-auth password.
    #[serde(default = "default_password_env")]
    pub password_env: String,

    /// How many hourly steps to walk back looking for a day with data.
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: u32,
}

impl SourceConfig {
    /// Resolve basic-auth credentials from the configured environment variables.
    pub fn credentials(&self) -> Result<(String, String)> {
        let username = std::env::var(&self.username_env)
            .with_context(|| format!("missing credential env var {}", self.username_env))?;
        let password = std::env::var(&self.password_env)
            .with_context(|| format!("missing credential env var {}", self.password_env))?;
        Ok((username, password))
    }
}

/// Geographic crop applied to every downloaded grid.
#[derive(Debug, Clone, Deserialize)]
pub struct DomainConfig {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl DomainConfig {
    pub fn bbox(&self) -> BoundingBox {
        BoundingBox::new(self.lat_min, self.lat_max, self.lon_min, self.lon_max)
    }
}

/// Where cropped slot files live and how many survive retention.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Number of most-recent slot files kept on disk.
    #[serde(default = "default_keep")]
    pub keep: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            keep: default_keep(),
        }
    }
}

/// Download resilience knobs.
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Fixed pause between download attempts, in seconds.
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Destination of the single "latest forecast" file.
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_path")]
    pub path: PathBuf,

    /// Variable name written into the forecast grid.
    #[serde(default = "default_output_variable")]
    pub variable: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_output_path(),
            variable: default_output_variable(),
        }
    }
}

/// Which forecaster backs the cycle and how predictions are scaled.
#[derive(Debug, Clone, Deserialize)]
pub struct ForecasterConfig {
    #[serde(default)]
    pub kind: ForecasterKind,

    /// Required when `kind: http`.
    pub endpoint: Option<String>,

    /// Optional JSON file with the input/output affine scalers.
    pub scalers: Option<PathBuf>,
}

impl Default for ForecasterConfig {
    fn default() -> Self {
        Self {
            kind: ForecasterKind::default(),
            endpoint: None,
            scalers: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForecasterKind {
    /// POST the window tensor to a model-serving endpoint.
    Http,
    /// Repeat the latest observation; useful without a model server.
    #[default]
    Persistence,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval_minutes(),
        }
    }
}

impl PipelineConfig {
    /// Load and validate configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading configuration from {:?}", path);
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config: Self = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        self.domain
            .bbox()
            .validate()
            .context("invalid domain bounding box")?;
        anyhow::ensure!(self.storage.keep > 0, "storage.keep must be at least 1");
        anyhow::ensure!(
            self.schedule.interval_minutes > 0,
            "schedule.interval_minutes must be at least 1"
        );
        if self.forecaster.kind == ForecasterKind::Http {
            anyhow::ensure!(
                self.forecaster.endpoint.is_some(),
                "forecaster.endpoint is required when forecaster.kind is http"
            );
        }
        Ok(())
    }
}

fn default_variable() -> String {
    "DSSF_TOT".to_string()
}

fn default_username_env() -> String {
    "NOWCAST_SOURCE_USER".to_string()
}

fn default_password_env() -> String {
    "NOWCAST_SOURCE_PASSWORD".to_string()
}

fn default_lookback_hours() -> u32 {
    12
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data/slots")
}

fn default_keep() -> usize {
    4
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_secs() -> u64 {
    2
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_output_path() -> PathBuf {
    PathBuf::from("outputs/forecast_latest.nc")
}

fn default_output_variable() -> String {
    "DSSF_FORECAST".to_string()
}

fn default_interval_minutes() -> u64 {
    15
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
source:
  base_url: "https://archive.example.com/products/DSSF"
domain:
  lat_min: -30.0
  lat_max: -20.0
  lon_min: -70.0
  lon_max: -60.0
"#;

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config: PipelineConfig = serde_yaml::from_str(MINIMAL).unwrap();
        config.validate().unwrap();

        assert_eq!(config.source.variable, "DSSF_TOT");
        assert_eq!(config.source.lookback_hours, 12);
        assert_eq!(config.storage.keep, 4);
        assert_eq!(config.fetch.max_retries, 3);
        assert_eq!(config.fetch.retry_delay_secs, 2);
        assert_eq!(config.forecaster.kind, ForecasterKind::Persistence);
        assert_eq!(config.schedule.interval_minutes, 15);
        assert_eq!(config.output.variable, "DSSF_FORECAST");
    }

    #[test]
    fn test_http_forecaster_requires_endpoint() {
        let yaml = format!("{}\nforecaster:\n  kind: http\n", MINIMAL);
        let config: PipelineConfig = serde_yaml::from_str(&yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inverted_domain_rejected() {
        let yaml = MINIMAL.replace("lat_max: -20.0", "lat_max: -40.0");
        let config: PipelineConfig = serde_yaml::from_str(&yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_full_config_parses() {
        let yaml = r#"
source:
  base_url: "https://archive.example.com/products/DSSF"
  variable: "DSSF_TOT"
  username_env: "ARCHIVE_USER"
  password_env: "ARCHIVE_PASSWORD"
  lookback_hours: 6
domain:
  lat_min: -30.0
  lat_max: -20.0
  lon_min: -70.0
  lon_max: -60.0
storage:
  data_dir: "/var/lib/nowcast/slots"
  keep: 8
fetch:
  max_retries: 5
  retry_delay_secs: 1
  request_timeout_secs: 60
output:
  path: "/var/lib/nowcast/forecast_latest.nc"
  variable: "GHI_FORECAST"
forecaster:
  kind: http
  endpoint: "http://model:8501/v1/predict"
  scalers: "/etc/nowcast/scalers.json"
schedule:
  interval_minutes: 30
"#;
        let config: PipelineConfig = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.source.lookback_hours, 6);
        assert_eq!(config.storage.keep, 8);
        assert_eq!(config.forecaster.kind, ForecasterKind::Http);
        assert_eq!(
            config.forecaster.endpoint.as_deref(),
            Some("http://model:8501/v1/predict")
        );
    }
}
