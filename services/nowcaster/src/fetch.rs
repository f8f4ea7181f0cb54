//! Resilient single-file download with validation and crop-at-ingest.
//!
//! Bytes stream into a `.partial` temp file, are checked against the
//! declared remote size, parsed, cropped to the domain, and only then
//! renamed into place. A crash at any point leaves either nothing or a
//! complete file under the final name, never a torn one.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use futures::StreamExt;
use netcdf_grid::GridData;
use nowcast_common::BoundingBox;
use reqwest::{Client, StatusCode};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub max_retries: u32,
    /// Fixed pause between attempts.
    pub retry_delay: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
        }
    }
}

/// Outcome of fetching one remote file. A failure here degrades the cycle
/// but never aborts it; the cycle falls back to previously retained slots.
#[derive(Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Downloaded, validated, cropped, and persisted.
    Fetched(PathBuf),
    /// A file under the final name already exists from an earlier cycle.
    AlreadyPresent(PathBuf),
    /// Unavailable this cycle (hard rejection or retries exhausted).
    Failed,
}

impl FetchOutcome {
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Fetched(p) | Self::AlreadyPresent(p) => Some(p),
            Self::Failed => None,
        }
    }
}

enum Attempt {
    /// Server rejected the request outright; retrying will not help.
    Rejected(StatusCode),
    /// Download completed and the bytes parse as a grid.
    Valid(GridData),
}

pub struct Fetcher {
    client: Client,
    config: FetchConfig,
    username: String,
    password: String,
    crop: BoundingBox,
    /// Variable the source is expected to carry; a mismatch is logged but
    /// not rejected, downstream window assembly enforces consistency.
    variable: String,
}

impl Fetcher {
    pub fn new(
        client: Client,
        config: FetchConfig,
        username: String,
        password: String,
        crop: BoundingBox,
        variable: String,
    ) -> Self {
        Self {
            client,
            config,
            username,
            password,
            crop,
            variable,
        }
    }

    /// Fetch `url` into `dest_dir/filename`, cropped to the domain.
    ///
    /// Transient failures (stream errors, short reads, unparseable bytes)
    /// are retried up to `max_retries` with a fixed delay; a non-success
    /// response status fails immediately without retry.
    #[instrument(skip(self, dest_dir), fields(file = %filename))]
    pub async fn fetch(&self, url: &str, filename: &str, dest_dir: &Path) -> Result<FetchOutcome> {
        fs::create_dir_all(dest_dir)
            .await
            .with_context(|| format!("failed to create {:?}", dest_dir))?;

        let final_path = dest_dir.join(filename);
        if fs::try_exists(&final_path).await? {
            debug!("slot already on disk, skipping download");
            return Ok(FetchOutcome::AlreadyPresent(final_path));
        }

        let temp_path = dest_dir.join(format!("{}.partial", filename));
        let expected_size = self.remote_size(url).await;
        if expected_size.is_none() {
            warn!(url = %url, "remote size unavailable, skipping byte-count check");
        }

        for attempt in 1..=self.config.max_retries {
            if attempt > 1 {
                tokio::time::sleep(self.config.retry_delay).await;
            }
            match self.attempt(url, &temp_path, expected_size).await {
                Ok(Attempt::Rejected(status)) => {
                    warn!(status = %status, url = %url, "download rejected");
                    return Ok(FetchOutcome::Failed);
                }
                Ok(Attempt::Valid(grid)) => {
                    return self.persist(grid, filename, &final_path, dest_dir).await;
                }
                Err(e) => {
                    warn!(
                        attempt,
                        max_retries = self.config.max_retries,
                        error = %e,
                        "download attempt failed"
                    );
                }
            }
        }

        warn!(url = %url, "download retries exhausted");
        Ok(FetchOutcome::Failed)
    }

    /// Declared remote size from a metadata-only request, if the server
    /// reports one.
    async fn remote_size(&self, url: &str) -> Option<u64> {
        let response = self
            .client
            .head(url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        response.content_length()
    }

    /// One download attempt. Any `Err` is transient and worth retrying; the
    /// temp file is always removed before returning.
    async fn attempt(
        &self,
        url: &str,
        temp_path: &Path,
        expected_size: Option<u64>,
    ) -> Result<Attempt> {
        let response = self
            .client
            .get(url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .context("download request failed")?;

        let status = response.status();
        if !status.is_success() {
            return Ok(Attempt::Rejected(status));
        }

        let mut file = fs::File::create(temp_path)
            .await
            .with_context(|| format!("failed to create {:?}", temp_path))?;
        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    drop(file);
                    fs::remove_file(temp_path).await.ok();
                    return Err(e).context("download stream interrupted");
                }
            };
            written += chunk.len() as u64;
            if let Err(e) = file.write_all(&chunk).await {
                drop(file);
                fs::remove_file(temp_path).await.ok();
                return Err(e).context("failed writing download to disk");
            }
        }
        if let Err(e) = file.flush().await {
            drop(file);
            fs::remove_file(temp_path).await.ok();
            return Err(e).context("failed flushing download to disk");
        }
        drop(file);

        if let Some(expected) = expected_size {
            if written != expected {
                fs::remove_file(temp_path).await.ok();
                bail!("incomplete download: expected {} bytes, got {}", expected, written);
            }
        }

        let bytes = match fs::read(temp_path).await {
            Ok(b) => b,
            Err(e) => {
                fs::remove_file(temp_path).await.ok();
                return Err(e).context("failed reading downloaded bytes back");
            }
        };
        let grid = match GridData::from_bytes(&bytes) {
            Ok(g) => g,
            Err(e) => {
                fs::remove_file(temp_path).await.ok();
                return Err(e).context("downloaded file is not a readable grid");
            }
        };

        fs::remove_file(temp_path).await.ok();
        debug!(bytes = written, "download validated");
        Ok(Attempt::Valid(grid))
    }

    /// Crop to the domain and atomically move the result into place.
    async fn persist(
        &self,
        grid: GridData,
        filename: &str,
        final_path: &Path,
        dest_dir: &Path,
    ) -> Result<FetchOutcome> {
        if grid.variable != self.variable {
            warn!(
                got = %grid.variable,
                expected = %self.variable,
                "unexpected variable in downloaded grid"
            );
        }
        let cropped = match grid.crop(&self.crop) {
            Ok(g) => g,
            Err(e) => {
                warn!(error = %e, "grid does not cover the domain, discarding");
                return Ok(FetchOutcome::Failed);
            }
        };

        let staged = dest_dir.join(format!("{}.tmp", filename));
        fs::write(&staged, cropped.to_bytes())
            .await
            .with_context(|| format!("failed to write {:?}", staged))?;
        fs::rename(&staged, final_path)
            .await
            .with_context(|| format!("failed to move {:?} into place", staged))?;

        info!(
            path = %final_path.display(),
            nlat = cropped.nlat(),
            nlon = cropped.nlon(),
            "slot persisted"
        );
        Ok(FetchOutcome::Fetched(final_path.to_path_buf()))
    }
}
