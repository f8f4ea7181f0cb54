//! Grid file codec for satellite irradiance slots.
//!
//! This crate provides a pure Rust implementation of the NetCDF classic
//! format (CDF-1 write, CDF-1/CDF-2 read) for the single-variable
//! `(time, lat, lon)` grid files the pipeline downloads and produces.
//!
//! # Implementation notes
//!
//! Only the classic subset is implemented; NetCDF-4/HDF5 containers and
//! record (unlimited) dimensions are rejected with a clear error. The
//! source convention stores latitude descending (north to south); cropping
//! works on coordinate values so either orientation slices correctly, and
//! [`GridData::sort_lat_ascending`] normalizes orientation before any
//! model-facing use.

pub mod error;
mod reader;
mod writer;

use std::path::Path;

use chrono::{DateTime, Utc};
use nowcast_common::BoundingBox;

pub use error::{GridError, GridResult};

/// One or more timesteps of a 2D geospatial field with coordinate metadata.
///
/// Values are row-major over `(time, lat, lon)`; NaN marks missing cells.
#[derive(Debug, Clone, PartialEq)]
pub struct GridData {
    /// Name of the data variable (e.g. "DSSF_TOT").
    pub variable: String,
    /// Acquisition time per timestep, ascending in pipeline-written files.
    pub times: Vec<DateTime<Utc>>,
    /// Latitude coordinates in degrees north.
    pub lats: Vec<f64>,
    /// Longitude coordinates in degrees east.
    pub lons: Vec<f64>,
    /// Field values, row-major `(time, lat, lon)`.
    pub values: Vec<f32>,
}

impl GridData {
    /// Build a grid, validating that the value buffer matches the
    /// coordinate shape.
    pub fn new(
        variable: String,
        times: Vec<DateTime<Utc>>,
        lats: Vec<f64>,
        lons: Vec<f64>,
        values: Vec<f32>,
    ) -> GridResult<Self> {
        if times.is_empty() || lats.is_empty() || lons.is_empty() {
            return Err(GridError::ShapeMismatch(
                "empty coordinate axis".to_string(),
            ));
        }
        let expected = times.len() * lats.len() * lons.len();
        if values.len() != expected {
            return Err(GridError::ShapeMismatch(format!(
                "expected {} values for ({}, {}, {}), got {}",
                expected,
                times.len(),
                lats.len(),
                lons.len(),
                values.len()
            )));
        }
        Ok(Self {
            variable,
            times,
            lats,
            lons,
            values,
        })
    }

    pub fn ntime(&self) -> usize {
        self.times.len()
    }

    pub fn nlat(&self) -> usize {
        self.lats.len()
    }

    pub fn nlon(&self) -> usize {
        self.lons.len()
    }

    /// Value at (timestep, lat index, lon index).
    pub fn value(&self, t: usize, i: usize, j: usize) -> f32 {
        self.values[(t * self.nlat() + i) * self.nlon() + j]
    }

    /// The most recent acquisition time in the file.
    pub fn last_time(&self) -> DateTime<Utc> {
        *self.times.last().expect("validated non-empty")
    }

    /// Parse a grid from raw file bytes.
    pub fn from_bytes(data: &[u8]) -> GridResult<Self> {
        reader::parse(data)
    }

    /// Parse a grid file from disk.
    pub fn from_path<P: AsRef<Path>>(path: P) -> GridResult<Self> {
        let data = std::fs::read(path)?;
        Self::from_bytes(&data)
    }

    /// Encode as NetCDF classic bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        writer::encode(self)
    }

    /// Write to disk as NetCDF classic.
    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> GridResult<()> {
        std::fs::write(path, self.to_bytes())?;
        Ok(())
    }

    /// Whether the latitude axis runs north to south.
    pub fn lat_descending(&self) -> bool {
        self.lats.len() >= 2 && self.lats[0] > self.lats[self.lats.len() - 1]
    }

    /// Reorder the latitude axis to ascending, permuting data rows to match.
    pub fn sort_lat_ascending(&mut self) {
        let nlat = self.nlat();
        let nlon = self.nlon();

        let mut order: Vec<usize> = (0..nlat).collect();
        order.sort_by(|&a, &b| {
            self.lats[a]
                .partial_cmp(&self.lats[b])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        if order.iter().enumerate().all(|(i, &o)| i == o) {
            return;
        }

        self.lats = order.iter().map(|&i| self.lats[i]).collect();

        let mut sorted = Vec::with_capacity(self.values.len());
        for t in 0..self.ntime() {
            let slice = &self.values[t * nlat * nlon..(t + 1) * nlat * nlon];
            for &i in &order {
                sorted.extend_from_slice(&slice[i * nlon..(i + 1) * nlon]);
            }
        }
        self.values = sorted;
    }

    /// Extract the sub-grid whose coordinates fall inside `bbox` (edges
    /// included). Selection is by coordinate value, so a descending
    /// latitude axis crops correctly and keeps its orientation.
    pub fn crop(&self, bbox: &BoundingBox) -> GridResult<Self> {
        let lat_idx: Vec<usize> = (0..self.nlat())
            .filter(|&i| self.lats[i] >= bbox.lat_min && self.lats[i] <= bbox.lat_max)
            .collect();
        let lon_idx: Vec<usize> = (0..self.nlon())
            .filter(|&j| self.lons[j] >= bbox.lon_min && self.lons[j] <= bbox.lon_max)
            .collect();

        if lat_idx.is_empty() || lon_idx.is_empty() {
            return Err(GridError::EmptyCrop);
        }

        let mut values = Vec::with_capacity(self.ntime() * lat_idx.len() * lon_idx.len());
        for t in 0..self.ntime() {
            for &i in &lat_idx {
                for &j in &lon_idx {
                    values.push(self.value(t, i, j));
                }
            }
        }

        Self::new(
            self.variable.clone(),
            self.times.clone(),
            lat_idx.iter().map(|&i| self.lats[i]).collect(),
            lon_idx.iter().map(|&j| self.lons[j]).collect(),
            values,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_grid() -> GridData {
        // Descending latitude, matching the source convention.
        let times = vec![Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()];
        let lats = vec![-20.0, -21.0, -22.0, -23.0];
        let lons = vec![-70.0, -69.0, -68.0];
        let values: Vec<f32> = (0..12).map(|i| i as f32).collect();
        GridData::new("DSSF_TOT".to_string(), times, lats, lons, values).unwrap()
    }

    #[test]
    fn test_shape_validation() {
        let times = vec![Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()];
        let err = GridData::new(
            "x".to_string(),
            times,
            vec![0.0, 1.0],
            vec![0.0],
            vec![1.0; 5],
        )
        .unwrap_err();
        assert!(matches!(err, GridError::ShapeMismatch(_)));
    }

    #[test]
    fn test_roundtrip_preserves_coordinates_and_values() {
        let grid = sample_grid();
        let decoded = GridData::from_bytes(&grid.to_bytes()).unwrap();

        assert_eq!(decoded.variable, grid.variable);
        assert_eq!(decoded.times, grid.times);
        assert_eq!(decoded.lats, grid.lats);
        assert_eq!(decoded.lons, grid.lons);
        assert_eq!(decoded.values, grid.values);
    }

    #[test]
    fn test_roundtrip_nan_cells() {
        let mut grid = sample_grid();
        grid.values[5] = f32::NAN;

        let decoded = GridData::from_bytes(&grid.to_bytes()).unwrap();
        assert!(decoded.values[5].is_nan());
        assert!(decoded.values[4].is_finite());
    }

    #[test]
    fn test_crop_descending_latitude() {
        let grid = sample_grid();
        let bbox = BoundingBox::new(-22.0, -21.0, -70.0, -69.0);
        let cropped = grid.crop(&bbox).unwrap();

        // Orientation preserved: still north to south.
        assert_eq!(cropped.lats, vec![-21.0, -22.0]);
        assert_eq!(cropped.lons, vec![-70.0, -69.0]);
        // Row for lat=-21 is source row 1, lon cols 0..2.
        assert_eq!(cropped.value(0, 0, 0), 3.0);
        assert_eq!(cropped.value(0, 0, 1), 4.0);
        assert_eq!(cropped.value(0, 1, 0), 6.0);
    }

    #[test]
    fn test_crop_outside_domain() {
        let grid = sample_grid();
        let bbox = BoundingBox::new(10.0, 20.0, 10.0, 20.0);
        assert!(matches!(grid.crop(&bbox), Err(GridError::EmptyCrop)));
    }

    #[test]
    fn test_sort_lat_ascending() {
        let mut grid = sample_grid();
        assert!(grid.lat_descending());

        grid.sort_lat_ascending();
        assert!(!grid.lat_descending());
        assert_eq!(grid.lats, vec![-23.0, -22.0, -21.0, -20.0]);
        // The row that held lat=-23 (source row 3: values 9, 10, 11) is
        // now first.
        assert_eq!(grid.value(0, 0, 0), 9.0);
        assert_eq!(grid.value(0, 3, 2), 2.0);
    }

    #[test]
    fn test_sort_lat_ascending_noop_when_sorted() {
        let mut grid = sample_grid();
        grid.sort_lat_ascending();
        let snapshot = grid.clone();
        grid.sort_lat_ascending();
        assert_eq!(grid, snapshot);
    }
}
