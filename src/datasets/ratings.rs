//! Streaming top-K scan over the ratings dataset.
//!
//! The scan never holds the full dataset in memory: candidates accumulate
//! in a buffer that is periodically sorted and truncated, bounding peak
//! memory to the high-water mark regardless of input size. Retention near
//! the trim boundary is approximate, which is acceptable because the final
//! published list is far smaller than the low-water mark.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use super::{open_tsv_lines, rank_cmp};

/// Buffer size that triggers a compaction at the next checkpoint.
pub const TRIM_HIGH_WATER: usize = 6000;

/// Buffer size after a compaction.
pub const TRIM_LOW_WATER: usize = 4000;

/// Rows between compaction checkpoints.
const TRIM_CHECK_INTERVAL: u64 = 50_000;

/// A ranked-list candidate surviving the relevance filter.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub imdb_id: String,
    pub rating: f64,
    pub votes: i64,
}

/// Candidate lookup handed to the join pass: O(1) membership tests plus
/// id-to-candidate recovery.
#[derive(Debug, Default)]
pub struct CandidateIndex {
    by_id: HashMap<String, Candidate>,
}

impl CandidateIndex {
    #[must_use]
    pub fn new(candidates: Vec<Candidate>) -> Self {
        let by_id = candidates
            .into_iter()
            .map(|c| (c.imdb_id.clone(), c))
            .collect();
        Self { by_id }
    }

    #[must_use]
    pub fn contains(&self, imdb_id: &str) -> bool {
        self.by_id.contains_key(imdb_id)
    }

    #[must_use]
    pub fn get(&self, imdb_id: &str) -> Option<&Candidate> {
        self.by_id.get(imdb_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// Scan the ratings dataset and return the trimmed candidate buffer.
///
/// The header row is skipped. Rows with unparsable numeric fields are
/// skipped silently; rows below `min_votes` fail the relevance filter and
/// are skipped regardless of rating.
pub async fn scan_ratings(path: &Path, min_votes: i64) -> Result<Vec<Candidate>> {
    let mut lines = open_tsv_lines(path).await?;

    let mut candidates: Vec<Candidate> = Vec::new();
    let mut is_first = true;
    let mut rows = 0u64;

    while let Some(line) = lines
        .next_line()
        .await
        .context("Failed to read ratings dataset line")?
    {
        if is_first {
            is_first = false;
            continue; // header
        }
        rows += 1;

        let mut fields = line.split('\t');
        let (Some(imdb_id), Some(rating_raw), Some(votes_raw)) =
            (fields.next(), fields.next(), fields.next())
        else {
            continue;
        };

        let Ok(rating) = rating_raw.parse::<f64>() else {
            continue;
        };
        let Ok(votes) = votes_raw.parse::<i64>() else {
            continue;
        };

        if imdb_id.is_empty() || !rating.is_finite() {
            continue;
        }
        if votes < min_votes {
            continue;
        }

        candidates.push(Candidate {
            imdb_id: imdb_id.to_string(),
            rating,
            votes,
        });

        if rows % TRIM_CHECK_INTERVAL == 0 && candidates.len() > TRIM_HIGH_WATER {
            trim_candidates(&mut candidates, TRIM_LOW_WATER);
            debug!(
                rows,
                candidates = candidates.len(),
                "Compacted candidate buffer"
            );
        }
    }

    trim_candidates(&mut candidates, TRIM_LOW_WATER);
    debug!(rows, candidates = candidates.len(), "Ratings scan complete");

    Ok(candidates)
}

/// Sort by ranking order and truncate to `max_size`. No-op when the buffer
/// already fits.
pub fn trim_candidates(candidates: &mut Vec<Candidate>, max_size: usize) {
    if candidates.len() <= max_size {
        return;
    }
    candidates.sort_unstable_by(|a, b| rank_cmp(a.rating, a.votes, b.rating, b.votes));
    candidates.truncate(max_size);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, rating: f64, votes: i64) -> Candidate {
        Candidate {
            imdb_id: id.to_string(),
            rating,
            votes,
        }
    }

    #[test]
    fn test_trim_orders_by_rating_then_votes() {
        let mut candidates = vec![
            candidate("tt1", 9.3, 500),
            candidate("tt2", 9.1, 10_000),
            candidate("tt3", 9.3, 800),
        ];
        trim_candidates(&mut candidates, 2);

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].imdb_id, "tt3");
        assert_eq!(candidates[1].imdb_id, "tt1");
    }

    #[test]
    fn test_trim_noop_when_under_limit() {
        let mut candidates = vec![candidate("tt2", 5.0, 100), candidate("tt1", 9.0, 100)];
        trim_candidates(&mut candidates, 10);

        // Untouched, including order
        assert_eq!(candidates[0].imdb_id, "tt2");
    }

    #[test]
    fn test_index_lookup() {
        let index = CandidateIndex::new(vec![candidate("tt1", 8.0, 100)]);
        assert!(index.contains("tt1"));
        assert!(!index.contains("tt2"));
        assert_eq!(index.get("tt1").unwrap().votes, 100);
    }
}
