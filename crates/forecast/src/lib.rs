//! Window assembly and forecaster interface for the GHI nowcast pipeline.

pub mod forecaster;
pub mod scaling;
pub mod window;

pub use forecaster::{
    forecast_valid_time, ForecastError, Forecaster, HttpForecaster, PersistenceForecaster,
};
pub use scaling::{AffineScaler, ScalerPair, ScalingError};
pub use window::{assemble, WindowError, WindowTensor, WINDOW_LEN};
