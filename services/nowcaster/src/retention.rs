//! Local slot retention.
//!
//! Only `.nc` files count; `.partial` and `.tmp` staging files are ignored
//! (and cleaned up separately by the fetcher).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use nowcast_common::sort_chronological;
use tokio::fs;
use tracing::info;

/// Chronologically sorted slot files currently on disk, oldest first.
pub async fn list_slots(dir: &Path) -> Result<Vec<PathBuf>> {
    if !fs::try_exists(dir).await? {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    let mut entries = fs::read_dir(dir)
        .await
        .with_context(|| format!("failed to read {:?}", dir))?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(".nc") {
            names.push(name);
        }
    }
    sort_chronological(&mut names);
    Ok(names.into_iter().map(|n| dir.join(n)).collect())
}

/// Delete all but the `keep` most recent slot files in `dir`.
///
/// Returns the surviving paths, oldest first. Idempotent: running twice
/// deletes nothing the second time.
pub async fn retain(dir: &Path, keep: usize) -> Result<Vec<PathBuf>> {
    let mut slots = list_slots(dir).await?;
    let excess = slots.len().saturating_sub(keep);
    for path in slots.drain(..excess) {
        fs::remove_file(&path)
            .await
            .with_context(|| format!("failed to remove expired slot {:?}", path))?;
        info!(path = %path.display(), "removed expired slot");
    }
    Ok(slots)
}
