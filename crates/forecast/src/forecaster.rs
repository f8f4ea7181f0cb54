//! The forecaster seam.
//!
//! The pretrained spatio-temporal model is an opaque external artifact; the
//! pipeline only depends on this trait, constructed once at startup and
//! injected into the cycle driver. Production runs talk to an inference
//! sidecar over HTTP; tests and degraded deployments use the persistence
//! baseline.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use nowcast_common::SLOT_INTERVAL_MINUTES;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::window::WindowTensor;

/// The instant a forecast made from `last_input` is valid for.
pub fn forecast_valid_time(last_input: DateTime<Utc>) -> DateTime<Utc> {
    last_input + Duration::minutes(SLOT_INTERVAL_MINUTES)
}

#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("forecast request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("forecast endpoint returned status {0}")]
    Status(u16),

    #[error("forecast output has {actual} values, expected {expected}")]
    OutputShape { expected: usize, actual: usize },
}

/// A single-timestep-ahead grid forecaster.
///
/// `predict` maps a normalized `(4, H, W, 1)` window to the next `(H, W)`
/// field in the same normalized range; scaling either side of the call is
/// the caller's concern.
#[async_trait]
pub trait Forecaster: Send + Sync {
    async fn predict(&self, window: &WindowTensor) -> Result<Vec<f32>, ForecastError>;
}

/// Baseline forecaster: the next field equals the most recent input field.
///
/// Doubles as the test stand-in for the external model.
pub struct PersistenceForecaster;

#[async_trait]
impl Forecaster for PersistenceForecaster {
    async fn predict(&self, window: &WindowTensor) -> Result<Vec<f32>, ForecastError> {
        Ok(window.last_step().to_vec())
    }
}

#[derive(Serialize)]
struct PredictRequest<'a> {
    /// Batch-of-one tensor shape: (1, time, lat, lon, channel).
    shape: [usize; 5],
    data: &'a [f32],
}

#[derive(Deserialize)]
struct PredictResponse {
    data: Vec<f32>,
}

/// Forecaster backed by an HTTP inference endpoint.
pub struct HttpForecaster {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpForecaster {
    pub fn new(client: reqwest::Client, endpoint: String) -> Self {
        Self { client, endpoint }
    }
}

#[async_trait]
impl Forecaster for HttpForecaster {
    #[instrument(skip(self, window), fields(endpoint = %self.endpoint))]
    async fn predict(&self, window: &WindowTensor) -> Result<Vec<f32>, ForecastError> {
        let [steps, height, width, channels] = window.shape();
        let request = PredictRequest {
            shape: [1, steps, height, width, channels],
            data: &window.data,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ForecastError::Status(response.status().as_u16()));
        }

        let body: PredictResponse = response.json().await?;
        let expected = height * width;
        if body.data.len() != expected {
            return Err(ForecastError::OutputShape {
                expected,
                actual: body.data.len(),
            });
        }

        debug!(cells = expected, "received forecast field");
        Ok(body.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::WINDOW_LEN;
    use chrono::TimeZone;

    fn window() -> WindowTensor {
        let base = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let times = (0..WINDOW_LEN as i64)
            .map(|k| base + Duration::minutes(15 * k))
            .collect();
        let mut data = vec![0.0f32; WINDOW_LEN * 4];
        for (t, chunk) in data.chunks_mut(4).enumerate() {
            chunk.fill(t as f32);
        }
        WindowTensor {
            variable: "DSSF_TOT".to_string(),
            times,
            lats: vec![-23.0, -22.0],
            lons: vec![-70.0, -69.0],
            data,
        }
    }

    #[tokio::test]
    async fn test_persistence_returns_last_step() {
        let prediction = PersistenceForecaster.predict(&window()).await.unwrap();
        assert_eq!(prediction, vec![3.0; 4]);
    }

    #[test]
    fn test_forecast_valid_time_is_fifteen_minutes_ahead() {
        let last = Utc.with_ymd_and_hms(2025, 1, 1, 12, 45, 0).unwrap();
        assert_eq!(
            forecast_valid_time(last),
            Utc.with_ymd_and_hms(2025, 1, 1, 13, 0, 0).unwrap()
        );
    }
}
