//! Acquisition-slot timing utilities.
//!
//! Source filenames embed the acquisition time as a run of 12 digits
//! (`YYYYMMDDHHMM`). Chronological ordering keys on that embedded stamp;
//! plain string order is only a fallback for names where no stamp parses.
//! Trusting lexical order alone breaks silently if the upstream naming
//! convention ever changes.

use chrono::{DateTime, NaiveDateTime, Utc};

/// Minutes between consecutive acquisition slots (and the forecast lead).
pub const SLOT_INTERVAL_MINUTES: i64 = 15;

/// Extract the acquisition timestamp embedded in a grid filename.
///
/// Scans for the first run of exactly 12 consecutive ASCII digits that
/// parses as a valid `YYYYMMDDHHMM` instant. Returns `None` when the name
/// carries no parseable stamp.
pub fn slot_timestamp(filename: &str) -> Option<DateTime<Utc>> {
    let bytes = filename.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if !bytes[i].is_ascii_digit() {
            i += 1;
            continue;
        }

        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }

        if i - start == 12 {
            let run = &filename[start..i];
            if let Ok(naive) = NaiveDateTime::parse_from_str(run, "%Y%m%d%H%M") {
                return Some(naive.and_utc());
            }
        }
    }

    None
}

/// Sort filenames chronologically by embedded slot timestamp.
///
/// Names without a parseable stamp sort before stamped ones, ordered among
/// themselves lexicographically. The sort is stable and deterministic.
pub fn sort_chronological<S: AsRef<str>>(names: &mut [S]) {
    names.sort_by(|a, b| {
        let ka = slot_timestamp(a.as_ref());
        let kb = slot_timestamp(b.as_ref());
        ka.cmp(&kb).then_with(|| a.as_ref().cmp(b.as_ref()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_slot_timestamp_lsasaf_name() {
        let ts = slot_timestamp("NETCDF4_LSASAF_MSG_DSSF_MSG-Disk_202501011215.nc").unwrap();
        assert_eq!(ts.year(), 2025);
        assert_eq!(ts.month(), 1);
        assert_eq!(ts.day(), 1);
        assert_eq!(ts.hour(), 12);
        assert_eq!(ts.minute(), 15);
    }

    #[test]
    fn test_slot_timestamp_rejects_short_runs() {
        assert!(slot_timestamp("grid_20250101.nc").is_none());
        assert!(slot_timestamp("no_digits_here.nc").is_none());
    }

    #[test]
    fn test_slot_timestamp_rejects_invalid_datetime() {
        // Month 13 is not a date, so the run does not count as a stamp.
        assert!(slot_timestamp("grid_202513011200.nc").is_none());
    }

    #[test]
    fn test_sort_chronological_beats_lexical_order() {
        // Lexically "b_..." > "a_..." but the stamps say otherwise.
        let mut names = vec![
            "b_202501011200.nc".to_string(),
            "a_202501011215.nc".to_string(),
        ];
        sort_chronological(&mut names);
        assert_eq!(names[0], "b_202501011200.nc");
        assert_eq!(names[1], "a_202501011215.nc");
    }

    #[test]
    fn test_sort_chronological_fallback_for_unstamped() {
        let mut names = vec![
            "zzz.nc".to_string(),
            "aaa.nc".to_string(),
            "grid_202501011200.nc".to_string(),
        ];
        sort_chronological(&mut names);
        assert_eq!(names[0], "aaa.nc");
        assert_eq!(names[1], "zzz.nc");
        assert_eq!(names[2], "grid_202501011200.nc");
    }
}
