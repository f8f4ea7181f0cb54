//! Fixture helpers for on-disk grid slots.
//!
//! Writes synthetic grids to disk with the source naming convention
//! (`..._YYYYMMDDHHMM.nc`) so retention and window tests exercise the same
//! filenames the pipeline sees in production.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, TimeZone, Utc};
use netcdf_grid::GridData;
use nowcast_common::SLOT_INTERVAL_MINUTES;

use crate::generators::constant_grid;

/// The filename a grid slot acquired at `time` is stored under.
pub fn slot_filename(time: DateTime<Utc>) -> String {
    format!(
        "NETCDF4_LSASAF_MSG_DSSF_MSG-Disk_{}.nc",
        time.format("%Y%m%d%H%M")
    )
}

/// A convenient fixed base time for slot fixtures: 2025-01-01 12:00 UTC.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
}

/// Write a grid under its slot filename; returns the file path.
pub fn write_slot(dir: &Path, grid: &GridData) -> PathBuf {
    let path = dir.join(slot_filename(grid.last_time()));
    grid.write_to(&path).expect("write fixture grid");
    path
}

/// Write `count` consecutive 15-minute constant-valued slots starting at
/// `start`, one file per slot, valued 1.0, 2.0, ... in slot order.
pub fn write_slot_series(dir: &Path, start: DateTime<Utc>, count: usize) -> Vec<PathBuf> {
    (0..count)
        .map(|k| {
            let time = start + Duration::minutes(SLOT_INTERVAL_MINUTES * k as i64);
            let grid = constant_grid(time, 6, 8, (k + 1) as f32);
            write_slot(dir, &grid)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_filename_embeds_timestamp() {
        let name = slot_filename(base_time());
        assert_eq!(name, "NETCDF4_LSASAF_MSG_DSSF_MSG-Disk_202501011200.nc");
        assert_eq!(
            nowcast_common::slot_timestamp(&name),
            Some(base_time())
        );
    }

    #[test]
    fn test_write_slot_series_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_slot_series(dir.path(), base_time(), 4);
        assert_eq!(paths.len(), 4);

        let last = GridData::from_path(&paths[3]).unwrap();
        assert_eq!(
            last.last_time(),
            base_time() + Duration::minutes(45)
        );
        assert!(last.values.iter().all(|&v| v == 4.0));
    }
}
