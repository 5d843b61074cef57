//! Dataset ingestion: cached downloads and streaming TSV scans.

pub mod basics;
pub mod fetch;
pub mod ranking;
pub mod ratings;

use std::cmp::Ordering;
use std::path::Path;

use anyhow::{Context, Result};
use async_compression::tokio::bufread::GzipDecoder;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};

/// Open a dataset file as a line stream, decompressing when the filename
/// ends in `.gz`.
pub(crate) async fn open_tsv_lines(
    path: &Path,
) -> Result<Lines<Box<dyn AsyncBufRead + Unpin + Send>>> {
    let file = File::open(path)
        .await
        .with_context(|| format!("Failed to open dataset file: {}", path.display()))?;

    let reader: Box<dyn AsyncBufRead + Unpin + Send> =
        if path.extension().is_some_and(|ext| ext == "gz") {
            Box::new(BufReader::new(GzipDecoder::new(BufReader::new(file))))
        } else {
            Box::new(BufReader::new(file))
        };

    Ok(reader.lines())
}

/// Ranking order shared by the scan and the final list build: rating
/// descending, ties broken by vote count descending.
pub(crate) fn rank_cmp(a_rating: f64, a_votes: i64, b_rating: f64, b_votes: i64) -> Ordering {
    b_rating
        .partial_cmp(&a_rating)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b_votes.cmp(&a_votes))
}
