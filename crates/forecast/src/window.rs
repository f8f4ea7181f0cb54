//! Fixed-size temporal window assembly.
//!
//! Turns four validated single-timestep grids into the `(4, H, W, 1)`
//! float32 tensor the forecaster expects: latitude normalized ascending,
//! timesteps ordered by acquisition time, and every missing cell repaired
//! by 1-D linear interpolation along latitude then longitude, with linear
//! extrapolation at the grid edges so no boundary holes remain.

use chrono::{DateTime, Utc};
use netcdf_grid::GridData;
use thiserror::Error;
use tracing::debug;

/// Number of timesteps in a model input window.
pub const WINDOW_LEN: usize = 4;

/// Model-ready input tensor with shape `(WINDOW_LEN, H, W, 1)`.
#[derive(Debug, Clone)]
pub struct WindowTensor {
    /// Name of the assembled variable.
    pub variable: String,
    /// Acquisition times, ascending, one per timestep.
    pub times: Vec<DateTime<Utc>>,
    /// Latitude coordinates, monotonically ascending.
    pub lats: Vec<f64>,
    /// Longitude coordinates.
    pub lons: Vec<f64>,
    /// Tensor values, row-major `(time, lat, lon, channel=1)`; all finite.
    pub data: Vec<f32>,
}

impl WindowTensor {
    pub fn height(&self) -> usize {
        self.lats.len()
    }

    pub fn width(&self) -> usize {
        self.lons.len()
    }

    /// Tensor shape as `(time, lat, lon, channel)`.
    pub fn shape(&self) -> [usize; 4] {
        [WINDOW_LEN, self.height(), self.width(), 1]
    }

    /// The spatial field of the most recent timestep.
    pub fn last_step(&self) -> &[f32] {
        let plane = self.height() * self.width();
        &self.data[(WINDOW_LEN - 1) * plane..]
    }

    /// The acquisition time of the most recent timestep.
    pub fn last_time(&self) -> DateTime<Utc> {
        self.times[WINDOW_LEN - 1]
    }
}

#[derive(Debug, Error)]
pub enum WindowError {
    #[error("insufficient inputs: window needs {expected} grids, got {actual}")]
    InsufficientInputs { expected: usize, actual: usize },

    #[error("window grid holds {0} timesteps, expected exactly 1")]
    NotSingleTimestep(usize),

    #[error("variable mismatch in window: '{0}' vs '{1}'")]
    VariableMismatch(String, String),

    #[error("coordinate mismatch between window grids: {0}")]
    CoordinateMismatch(String),

    #[error("window still holds non-finite cells after interpolation")]
    NonFiniteOutput,
}

/// Merge exactly [`WINDOW_LEN`] single-timestep grids into a model input
/// tensor. Grids may arrive in any order and with either latitude
/// orientation.
pub fn assemble(mut grids: Vec<GridData>) -> Result<WindowTensor, WindowError> {
    if grids.len() != WINDOW_LEN {
        return Err(WindowError::InsufficientInputs {
            expected: WINDOW_LEN,
            actual: grids.len(),
        });
    }

    for grid in &mut grids {
        if grid.ntime() != 1 {
            return Err(WindowError::NotSingleTimestep(grid.ntime()));
        }
        grid.sort_lat_ascending();
    }

    grids.sort_by_key(|g| g.last_time());

    let first = &grids[0];
    for grid in &grids[1..] {
        if grid.variable != first.variable {
            return Err(WindowError::VariableMismatch(
                first.variable.clone(),
                grid.variable.clone(),
            ));
        }
        if grid.lats != first.lats || grid.lons != first.lons {
            return Err(WindowError::CoordinateMismatch(format!(
                "({}, {}) vs ({}, {})",
                first.nlat(),
                first.nlon(),
                grid.nlat(),
                grid.nlon()
            )));
        }
    }

    let height = first.nlat();
    let width = first.nlon();
    let lats = first.lats.clone();
    let lons = first.lons.clone();
    let variable = first.variable.clone();
    let times: Vec<DateTime<Utc>> = grids.iter().map(|g| g.last_time()).collect();

    let mut data = Vec::with_capacity(WINDOW_LEN * height * width);
    for grid in &grids {
        data.extend_from_slice(&grid.values);
    }

    let nan_before = data.iter().filter(|v| !v.is_finite()).count();
    for t in 0..WINDOW_LEN {
        let slice = &mut data[t * height * width..(t + 1) * height * width];
        fill_missing(slice, &lats, &lons);
    }

    if data.iter().any(|v| !v.is_finite()) {
        return Err(WindowError::NonFiniteOutput);
    }

    if nan_before > 0 {
        debug!(cells = nan_before, "interpolated missing window cells");
    }

    Ok(WindowTensor {
        variable,
        times,
        lats,
        lons,
        data,
    })
}

/// Repair NaN cells in one (lat, lon) slice: latitude pass first, then
/// longitude, both with edge extrapolation. Extrapolating at the edges
/// avoids boundary holes at the cost of some edge-effect error.
fn fill_missing(slice: &mut [f32], lats: &[f64], lons: &[f64]) {
    let height = lats.len();
    let width = lons.len();

    // Latitude pass: one lane per longitude column.
    let mut lane = vec![0.0f32; height];
    for j in 0..width {
        for i in 0..height {
            lane[i] = slice[i * width + j];
        }
        fill_lane(&mut lane, lats);
        for i in 0..height {
            slice[i * width + j] = lane[i];
        }
    }

    // Longitude pass over whatever the latitude pass could not reach
    // (columns with no finite values at all).
    for i in 0..height {
        let row = &mut slice[i * width..(i + 1) * width];
        fill_lane(row, lons);
    }
}

/// 1-D linear interpolation of NaN entries against coordinate values,
/// linearly extrapolating outside the finite span. Lanes with a single
/// finite value are filled constant; all-NaN lanes are left untouched.
fn fill_lane(vals: &mut [f32], coords: &[f64]) {
    let finite: Vec<usize> = (0..vals.len()).filter(|&i| vals[i].is_finite()).collect();

    if finite.is_empty() || finite.len() == vals.len() {
        return;
    }

    if finite.len() == 1 {
        let v = vals[finite[0]];
        for val in vals.iter_mut() {
            *val = v;
        }
        return;
    }

    for i in 0..vals.len() {
        if vals[i].is_finite() {
            continue;
        }
        let x = coords[i];

        // Pick the bracketing finite samples, or the outermost pair when
        // extrapolating past either end.
        let upper = finite.partition_point(|&f| coords[f] < x);
        let (a, b) = if upper == 0 {
            (finite[0], finite[1])
        } else if upper == finite.len() {
            (finite[finite.len() - 2], finite[finite.len() - 1])
        } else {
            (finite[upper - 1], finite[upper])
        };

        let (xa, xb) = (coords[a], coords[b]);
        let (ya, yb) = (vals[a] as f64, vals[b] as f64);
        let value = if xb == xa {
            ya
        } else {
            ya + (yb - ya) * (x - xa) / (xb - xa)
        };
        vals[i] = value as f32;
    }
}
