//! Final ranked-list build: full sort, truncation, sanity floor.

use anyhow::{bail, Result};
use chrono::NaiveDate;

use super::basics::EnrichedCandidate;
use super::rank_cmp;

/// Published size of the primary ranked list.
pub const TOP_LIST_SIZE: usize = 250;

/// Minimum acceptable list size. Falling below this usually means a dataset
/// format change or a corrupted download, so the build stops rather than
/// silently publishing a near-empty list.
pub const RANKED_FLOOR: usize = 50;

/// A finished ranked entry. The vote count is an internal ranking signal and
/// is dropped here; it is not part of the published schema.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedTitle {
    pub imdb_id: String,
    pub title: String,
    pub rating: f64,
    pub release_date: Option<NaiveDate>,
    pub duration_mins: Option<i64>,
}

/// Sort enriched candidates by rating (votes as tie-break), truncate to
/// `limit` and strip the vote count.
///
/// # Errors
///
/// Fails when fewer than `floor` entries remain. The enclosing job may still
/// be retried by the queue in case the cause was transient.
pub fn build_ranked_list(
    mut enriched: Vec<EnrichedCandidate>,
    limit: usize,
    floor: usize,
) -> Result<Vec<RankedTitle>> {
    enriched.sort_unstable_by(|a, b| rank_cmp(a.rating, a.votes, b.rating, b.votes));
    enriched.truncate(limit);

    if enriched.len() < floor {
        bail!(
            "Ranked list build produced too few movies ({} < floor {}). Check dataset downloads.",
            enriched.len(),
            floor
        );
    }

    Ok(enriched
        .into_iter()
        .map(|c| RankedTitle {
            imdb_id: c.imdb_id,
            title: c.title,
            rating: c.rating,
            release_date: c.release_date,
            duration_mins: c.duration_mins,
        })
        .collect())
}
