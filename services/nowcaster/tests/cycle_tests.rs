//! End-to-end cycle tests against a stub archive.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{Path as AxumPath, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use chrono::{TimeZone, Utc};

use forecast::{
    ForecastError, Forecaster, PersistenceForecaster, ScalerPair, WindowTensor,
};
use netcdf_grid::GridData;
use nowcast_common::BoundingBox;
use nowcaster::catalog::CatalogClient;
use nowcaster::config::{OutputConfig, StorageConfig};
use nowcaster::cycle::{AbortReason, CycleDriver, CycleOutcome};
use nowcaster::fetch::{FetchConfig, Fetcher};
use test_utils::{base_time, constant_grid, slot_filename, write_slot_series};

struct Archive {
    /// Filename and encoded bytes per archive entry.
    files: Vec<(String, Vec<u8>)>,
}

async fn listing(State(archive): State<Arc<Archive>>) -> Html<String> {
    let links: String = archive
        .files
        .iter()
        .map(|(name, _)| format!("<a href=\"{name}\">{name}</a>\n"))
        .collect();
    Html(format!("<html><body>{links}</body></html>"))
}

async fn file(
    State(archive): State<Arc<Archive>>,
    AxumPath(name): AxumPath<String>,
) -> Response {
    match archive.files.iter().find(|(n, _)| *n == name) {
        Some((_, bytes)) => bytes.clone().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Serve four consecutive slots for 2025-01-01 starting at 12:00 UTC,
/// valued 1.0 through 4.0.
async fn spawn_archive() -> (String, Arc<Archive>) {
    let files = (0..4)
        .map(|k| {
            let time = base_time() + chrono::Duration::minutes(15 * k);
            let grid = constant_grid(time, 6, 8, (k + 1) as f32);
            (slot_filename(time), grid.to_bytes())
        })
        .collect();
    let archive = Arc::new(Archive { files });

    let router = Router::new()
        .route("/2025/01/01/", get(listing))
        .route("/2025/01/01/:name", get(file))
        .with_state(archive.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (format!("http://{}", addr), archive)
}

fn driver(
    base_url: &str,
    data_dir: std::path::PathBuf,
    output_path: std::path::PathBuf,
    forecaster: Arc<dyn Forecaster>,
    scalers: ScalerPair,
) -> CycleDriver {
    let client = reqwest::Client::new();
    let catalog = CatalogClient::new(
        client.clone(),
        base_url.to_string(),
        "user".to_string(),
        "secret".to_string(),
        12,
    );
    let fetcher = Fetcher::new(
        client,
        FetchConfig {
            max_retries: 3,
            retry_delay: Duration::from_millis(10),
        },
        "user".to_string(),
        "secret".to_string(),
        BoundingBox::new(-90.0, 0.0, -180.0, 0.0),
        "DSSF_TOT".to_string(),
    );
    CycleDriver::new(
        catalog,
        fetcher,
        forecaster,
        scalers,
        StorageConfig { data_dir, keep: 4 },
        OutputConfig {
            path: output_path,
            variable: "DSSF_FORECAST".to_string(),
        },
    )
}

#[tokio::test]
async fn test_full_cycle_persists_latest_forecast() {
    let (base_url, _archive) = spawn_archive().await;
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("slots");
    let output_path = dir.path().join("out").join("forecast_latest.nc");

    let driver = driver(
        &base_url,
        data_dir.clone(),
        output_path.clone(),
        Arc::new(PersistenceForecaster),
        ScalerPair::identity(),
    );

    let now = Utc.with_ymd_and_hms(2025, 1, 1, 13, 0, 0).unwrap();
    let outcome = driver.run_cycle(now).await.unwrap();

    let CycleOutcome::Done { output, valid_time } = outcome else {
        panic!("expected a completed cycle, got {:?}", outcome);
    };
    assert_eq!(output, output_path);
    // One slot interval past the newest input at 12:45.
    assert_eq!(valid_time, Utc.with_ymd_and_hms(2025, 1, 1, 13, 0, 0).unwrap());

    let forecast = GridData::from_path(&output_path).unwrap();
    assert_eq!(forecast.variable, "DSSF_FORECAST");
    assert_eq!(forecast.times, vec![valid_time]);
    // Persistence repeats the newest field, which was all 4.0.
    assert!(forecast.values.iter().all(|&v| v == 4.0));
    assert!(!forecast.lat_descending());

    // All four slots landed on disk and nothing extra.
    let slots: Vec<_> = std::fs::read_dir(&data_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(slots.len(), 4);
    assert!(slots.iter().all(|n| n.ends_with(".nc")));
}

#[tokio::test]
async fn test_cycle_applies_scalers_around_prediction() {
    let (base_url, _archive) = spawn_archive().await;
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("slots");
    let output_path = dir.path().join("forecast_latest.nc");

    // Input normalizes by 1/1000; the output scaler maps physical units at
    // half that rate, so a persisted 4.0 becomes 4.0 * 0.001 / 0.002 = 2.0.
    let scalers = ScalerPair {
        input: forecast::AffineScaler {
            scale: 0.001,
            offset: 0.0,
        },
        output: forecast::AffineScaler {
            scale: 0.002,
            offset: 0.0,
        },
    };
    let driver = driver(
        &base_url,
        data_dir,
        output_path.clone(),
        Arc::new(PersistenceForecaster),
        scalers,
    );

    let now = Utc.with_ymd_and_hms(2025, 1, 1, 13, 0, 0).unwrap();
    let outcome = driver.run_cycle(now).await.unwrap();
    assert!(matches!(outcome, CycleOutcome::Done { .. }));

    let forecast = GridData::from_path(&output_path).unwrap();
    assert!(forecast.values.iter().all(|&v| (v - 2.0).abs() < 1e-4));
}

#[tokio::test]
async fn test_cycle_aborts_without_a_full_window() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("slots");
    std::fs::create_dir_all(&data_dir).unwrap();
    write_slot_series(&data_dir, base_time(), 3);

    // The catalog is never contacted by the forecast phase.
    let driver = driver(
        "http://127.0.0.1:1",
        data_dir,
        dir.path().join("forecast_latest.nc"),
        Arc::new(PersistenceForecaster),
        ScalerPair::identity(),
    );

    let outcome = driver.nowcast().await.unwrap();
    assert!(matches!(
        outcome,
        CycleOutcome::Aborted(AbortReason::InsufficientInputs)
    ));
    assert!(!dir.path().join("forecast_latest.nc").exists());
}

#[tokio::test]
async fn test_persist_failure_removes_staged_file() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("slots");
    std::fs::create_dir_all(&data_dir).unwrap();
    write_slot_series(&data_dir, base_time(), 4);

    // A directory squatting on the output path makes the final rename fail.
    let output_path = dir.path().join("forecast_latest.nc");
    std::fs::create_dir_all(&output_path).unwrap();

    let driver = driver(
        "http://127.0.0.1:1",
        data_dir,
        output_path.clone(),
        Arc::new(PersistenceForecaster),
        ScalerPair::identity(),
    );

    assert!(driver.nowcast().await.is_err());
    assert!(!dir.path().join("forecast_latest.tmp").exists());
}

struct FailingForecaster;

#[async_trait]
impl Forecaster for FailingForecaster {
    async fn predict(&self, _window: &WindowTensor) -> Result<Vec<f32>, ForecastError> {
        Err(ForecastError::Status(503))
    }
}

#[tokio::test]
async fn test_forecast_failure_preserves_previous_output() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("slots");
    std::fs::create_dir_all(&data_dir).unwrap();
    write_slot_series(&data_dir, base_time(), 4);

    let output_path = dir.path().join("forecast_latest.nc");
    std::fs::write(&output_path, b"previous forecast").unwrap();

    let driver = driver(
        "http://127.0.0.1:1",
        data_dir,
        output_path.clone(),
        Arc::new(FailingForecaster),
        ScalerPair::identity(),
    );

    let outcome = driver.nowcast().await.unwrap();
    assert!(matches!(outcome, CycleOutcome::ForecastFailed));
    assert_eq!(std::fs::read(&output_path).unwrap(), b"previous forecast");
}
