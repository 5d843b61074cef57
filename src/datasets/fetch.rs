//! Cached dataset downloads.
//!
//! Datasets are treated as append-only snapshots: a cached file is reused
//! without any freshness check, and refreshing requires deleting the cache
//! manually.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use futures_util::StreamExt;
use reqwest::Client;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::config::Config;
use crate::constants::{BASICS_DATASET_FILE, RATINGS_DATASET_FILE};

/// Ensure local cached copies of both datasets exist, downloading on first
/// use. Returns the (ratings, basics) paths.
pub async fn ensure_datasets(client: &Client, config: &Config) -> Result<(PathBuf, PathBuf)> {
    tokio::fs::create_dir_all(&config.dataset_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create dataset directory: {}",
                config.dataset_dir.display()
            )
        })?;

    let ratings_path = config.dataset_dir.join(RATINGS_DATASET_FILE);
    let basics_path = config.dataset_dir.join(BASICS_DATASET_FILE);

    ensure_dataset(client, &config.ratings_url, &ratings_path).await?;
    ensure_dataset(client, &config.basics_url, &basics_path).await?;

    Ok((ratings_path, basics_path))
}

/// Ensure a single dataset file exists locally and is complete.
///
/// Downloads stream to a `.tmp` sibling and are renamed into place only
/// after the write fully flushes, so an interrupted download never leaves a
/// partial file visible at the final path.
pub async fn ensure_dataset(client: &Client, url: &str, dest: &Path) -> Result<()> {
    if tokio::fs::try_exists(dest).await? {
        debug!(path = %dest.display(), "Dataset already cached");
        return Ok(());
    }

    info!(url = %url, path = %dest.display(), "Downloading dataset");
    download_file(client, url, dest).await?;
    info!(path = %dest.display(), "Dataset downloaded");

    Ok(())
}

async fn download_file(client: &Client, url: &str, dest: &Path) -> Result<()> {
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to request dataset: {url}"))?;

    if !response.status().is_success() {
        bail!("Download failed {url} ({})", response.status());
    }

    let mut tmp_os = dest.as_os_str().to_owned();
    tmp_os.push(".tmp");
    let tmp_path = PathBuf::from(tmp_os);

    let write_result = write_body_to_file(response, &tmp_path).await;

    if let Err(e) = write_result {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e);
    }

    tokio::fs::rename(&tmp_path, dest)
        .await
        .with_context(|| format!("Failed to move dataset into place: {}", dest.display()))?;

    Ok(())
}

async fn write_body_to_file(response: reqwest::Response, tmp_path: &Path) -> Result<()> {
    let mut file = File::create(tmp_path)
        .await
        .with_context(|| format!("Failed to create temp file: {}", tmp_path.display()))?;

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("Dataset download stream failed")?;
        file.write_all(&chunk)
            .await
            .context("Failed to write dataset chunk")?;
    }

    file.flush().await.context("Failed to flush dataset file")?;
    file.sync_all()
        .await
        .context("Failed to sync dataset file")?;

    Ok(())
}
