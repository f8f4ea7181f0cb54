//! Client for the remote day-indexed archive listing.
//!
//! The archive exposes plain HTML directory indexes at
//! `<base_url>/YYYY/MM/DD/`. Discovery walks backwards one hour at a time
//! from "now" until a day with at least one `.nc` entry turns up.

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Duration, Utc};
use nowcast_common::sort_chronological;
use reqwest::Client;
use tracing::{debug, info, instrument, warn};

/// One day's worth of archive entries, chronologically sorted.
#[derive(Debug, Clone)]
pub struct DayListing {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub files: Vec<String>,
}

pub struct CatalogClient {
    client: Client,
    base_url: String,
    username: String,
    password: String,
    lookback_hours: u32,
}

impl CatalogClient {
    pub fn new(
        client: Client,
        base_url: String,
        username: String,
        password: String,
        lookback_hours: u32,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            username,
            password,
            lookback_hours,
        }
    }

    /// URL of the directory index for one archive day.
    pub fn day_url(&self, year: i32, month: u32, day: u32) -> String {
        format!("{}/{}/{:02}/{:02}/", self.base_url, year, month, day)
    }

    /// URL of a single file within an archive day.
    pub fn file_url(&self, year: i32, month: u32, day: u32, filename: &str) -> String {
        format!("{}{}", self.day_url(year, month, day), filename)
    }

    /// List `.nc` entries for one archive day, sorted chronologically.
    ///
    /// A non-success status means the day is absent (or not yet published)
    /// and yields an empty list rather than an error.
    #[instrument(skip(self))]
    pub async fn list_files(&self, year: i32, month: u32, day: u32) -> Result<Vec<String>> {
        let url = self.day_url(year, month, day);
        let response = self
            .client
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .with_context(|| format!("catalog request failed for {}", url))?;

        if !response.status().is_success() {
            debug!(status = %response.status(), url = %url, "no listing for day");
            return Ok(Vec::new());
        }

        let body = response
            .text()
            .await
            .with_context(|| format!("failed to read listing body for {}", url))?;

        let mut files = extract_nc_names(&body);
        sort_chronological(&mut files);
        debug!(count = files.len(), url = %url, "listed archive day");
        Ok(files)
    }

    /// Find the most recent archive day with data, probing hourly backwards
    /// from `now` for up to the configured lookback.
    pub async fn find_latest(&self, now: DateTime<Utc>) -> Result<Option<DayListing>> {
        for step in 0..self.lookback_hours {
            let probe = now - Duration::hours(i64::from(step));
            let (year, month, day) = (probe.year(), probe.month(), probe.day());
            let files = self.list_files(year, month, day).await?;
            if !files.is_empty() {
                info!(
                    year,
                    month,
                    day,
                    count = files.len(),
                    "found latest archive day"
                );
                return Ok(Some(DayListing {
                    year,
                    month,
                    day,
                    files,
                }));
            }
        }
        warn!(
            lookback_hours = self.lookback_hours,
            "no archive data within lookback window"
        );
        Ok(None)
    }
}

/// Extract `.nc` link names from an HTML directory index.
///
/// Matches the text between a `>` and the next `<` when it ends in `.nc`,
/// which covers the anchor bodies of the stock index pages.
fn extract_nc_names(body: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let mut rest = body;
    while let Some(open) = rest.find('>') {
        rest = &rest[open + 1..];
        let Some(close) = rest.find('<') else {
            break;
        };
        let candidate = rest[..close].trim();
        if candidate.ends_with(".nc") && !candidate.contains('/') {
            names.push(candidate.to_string());
        }
        rest = &rest[close..];
    }
    names.sort();
    names.dedup();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_nc_names_from_index_page() {
        let body = r#"
<html><body>
<a href="../">../</a>
<a href="grid_202505091130.nc">grid_202505091130.nc</a>  09-May-2025 11:42  4.1M
<a href="grid_202505091145.nc">grid_202505091145.nc</a>  09-May-2025 11:57  4.1M
<a href="grid_202505091130.nc.md5">grid_202505091130.nc.md5</a>
</body></html>
"#;
        let names = extract_nc_names(body);
        assert_eq!(
            names,
            vec!["grid_202505091130.nc", "grid_202505091145.nc"]
        );
    }

    #[test]
    fn test_extract_nc_names_dedupes_and_ignores_paths() {
        let body = concat!(
            "<a href=\"a.nc\">a.nc</a>",
            "<a href=\"a.nc\">a.nc</a>",
            "<td>sub/dir.nc</td>",
        );
        let names = extract_nc_names(body);
        assert_eq!(names, vec!["a.nc"]);
    }

    #[test]
    fn test_extract_nc_names_empty_listing() {
        assert!(extract_nc_names("<html><body>Index of /2025/05/10/</body></html>").is_empty());
    }
}
