//! Join pass over the basics dataset.
//!
//! A second streaming scan that attaches title, release year and runtime to
//! the candidates produced by the ratings scan. Description and poster are
//! deliberately left unset here so a later enrichment pass isn't pre-empted
//! by empty placeholders.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::debug;

use crate::constants::DATASET_SENTINEL;

use super::open_tsv_lines;
use super::ratings::CandidateIndex;

/// A candidate joined with its descriptive fields.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedCandidate {
    pub imdb_id: String,
    pub title: String,
    pub rating: f64,
    pub votes: i64,
    pub release_date: Option<NaiveDate>,
    pub duration_mins: Option<i64>,
}

/// One row of the basics dataset, parsed positionally at the point of
/// ingestion so downstream code never re-derives field meaning.
#[derive(Debug)]
struct TitleRecord<'a> {
    imdb_id: &'a str,
    title_type: &'a str,
    primary_title: Option<&'a str>,
    start_year: Option<&'a str>,
    runtime_mins: Option<&'a str>,
}

impl<'a> TitleRecord<'a> {
    /// Parse a tab-separated basics row. Returns `None` when the row has too
    /// few fields to be a valid record.
    fn parse(line: &'a str) -> Option<Self> {
        let parts: Vec<&str> = line.split('\t').collect();
        if parts.len() < 8 {
            return None;
        }

        Some(Self {
            imdb_id: parts[0],
            title_type: parts[1],
            primary_title: field(parts[2]),
            start_year: field(parts[5]),
            runtime_mins: field(parts[7]),
        })
    }
}

/// Map the dataset's missing-value sentinel (and empty strings) to `None`.
fn field(raw: &str) -> Option<&str> {
    if raw.is_empty() || raw == DATASET_SENTINEL {
        None
    } else {
        Some(raw)
    }
}

/// Scan the basics dataset, joining rows against the candidate index.
///
/// Rows are kept only when their identifier is a known candidate and their
/// category is `movie` (series and episodes are excluded even when present
/// in the ratings data).
pub async fn scan_basics(path: &Path, index: &CandidateIndex) -> Result<Vec<EnrichedCandidate>> {
    let mut lines = open_tsv_lines(path).await?;

    let mut enriched: Vec<EnrichedCandidate> = Vec::new();
    let mut is_first = true;
    let mut rows = 0u64;

    while let Some(line) = lines
        .next_line()
        .await
        .context("Failed to read basics dataset line")?
    {
        if is_first {
            is_first = false;
            continue; // header
        }
        rows += 1;

        let Some(record) = TitleRecord::parse(&line) else {
            continue;
        };
        if !index.contains(record.imdb_id) {
            continue;
        }
        if record.title_type != "movie" {
            continue;
        }
        let Some(candidate) = index.get(record.imdb_id) else {
            continue;
        };

        enriched.push(EnrichedCandidate {
            imdb_id: record.imdb_id.to_string(),
            title: record
                .primary_title
                .unwrap_or(record.imdb_id)
                .to_string(),
            rating: candidate.rating,
            votes: candidate.votes,
            release_date: record.start_year.and_then(parse_year_to_date),
            duration_mins: record.runtime_mins.and_then(|r| r.parse().ok()),
        });

        if rows % 500_000 == 0 {
            debug!(rows, enriched = enriched.len(), "Basics scan progress");
        }
    }

    debug!(rows, enriched = enriched.len(), "Basics scan complete");

    Ok(enriched)
}

/// Parse a release year into the first day of that year. Years outside a
/// plausible range are treated as missing.
fn parse_year_to_date(year_raw: &str) -> Option<NaiveDate> {
    let year: i32 = year_raw.parse().ok()?;
    if !(1800..=2100).contains(&year) {
        return None;
    }
    NaiveDate::from_ymd_opt(year, 1, 1)
}
