//! Generators for synthetic irradiance grids.
//!
//! These build predictable, verifiable single-timestep grids that can be
//! used across the test suite. Latitude runs north to south by default,
//! matching the source convention.

use chrono::{DateTime, Utc};
use netcdf_grid::GridData;

/// Evenly spaced coordinate axis from `start` stepping by `step`.
pub fn axis(start: f64, step: f64, count: usize) -> Vec<f64> {
    (0..count).map(|i| start + step * i as f64).collect()
}

/// Creates a grid holding a single constant value everywhere.
pub fn constant_grid(time: DateTime<Utc>, height: usize, width: usize, value: f32) -> GridData {
    GridData::new(
        "DSSF_TOT".to_string(),
        vec![time],
        axis(-20.0, -0.05, height),
        axis(-70.0, 0.05, width),
        vec![value; height * width],
    )
    .expect("valid synthetic grid")
}

/// Creates a grid with predictable values.
///
/// Each cell value is calculated as: `col * 1000 + row`, so reads and
/// reorderings can be verified by checking
/// `grid[row][col] == col * 1000 + row`.
pub fn indexed_grid(time: DateTime<Utc>, height: usize, width: usize) -> GridData {
    let mut values = Vec::with_capacity(height * width);
    for row in 0..height {
        for col in 0..width {
            values.push((col * 1000 + row) as f32);
        }
    }
    GridData::new(
        "DSSF_TOT".to_string(),
        vec![time],
        axis(-20.0, -0.05, height),
        axis(-70.0, 0.05, width),
        values,
    )
    .expect("valid synthetic grid")
}

/// Creates a grid with irradiance-like values in W/m^2.
///
/// Values form a smooth gradient from ~0 (north-west corner) to ~1000
/// (south-east corner), similar in range to a midday GHI field.
pub fn irradiance_grid(time: DateTime<Utc>, height: usize, width: usize) -> GridData {
    let mut values = Vec::with_capacity(height * width);
    for row in 0..height {
        for col in 0..width {
            let x_factor = col as f32 / width.max(1) as f32;
            let y_factor = row as f32 / height.max(1) as f32;
            values.push((x_factor * 500.0) + (y_factor * 500.0));
        }
    }
    GridData::new(
        "DSSF_TOT".to_string(),
        vec![time],
        axis(-20.0, -0.05, height),
        axis(-70.0, 0.05, width),
        values,
    )
    .expect("valid synthetic grid")
}

/// Punches a rectangular NaN block into an existing grid, strictly inside
/// the domain when the given bounds are interior.
pub fn punch_nan_block(
    grid: &mut GridData,
    row_start: usize,
    row_end: usize,
    col_start: usize,
    col_end: usize,
) {
    let width = grid.nlon();
    for row in row_start..row_end {
        for col in col_start..col_end {
            grid.values[row * width + col] = f32::NAN;
        }
    }
}
