//! Batch enrichment jobs: posters and descriptions.
//!
//! Both jobs share one shape: query the store for records missing the
//! target field, fan out bounded-concurrency lookups against TMDB, and
//! bulk-merge the non-empty results back. A single failed lookup degrades
//! to "no value" and never aborts the batch.

use std::time::Duration;

use anyhow::Result;
use serde_json::json;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::constants::{TOP250_LIST, UPSERT_CHUNK_SIZE};
use crate::db::{
    find_movies_missing_description, find_movies_missing_description_in_list,
    find_movies_missing_poster, set_movie_description, set_movie_poster, Database, Movie,
};
use crate::tmdb::TmdbClient;

use super::limiter::ConcurrencyLimiter;
use super::EnrichParams;

/// Fill in missing poster URLs from TMDB.
pub async fn enrich_posters(
    db: &Database,
    tmdb: &TmdbClient,
    params: &EnrichParams,
) -> Result<serde_json::Value> {
    info!("Enriching missing posters from TMDB");

    let image_base = tmdb.image_base_url().await;
    let missing = find_movies_missing_poster(db.pool(), params.max).await?;

    info!(
        missing = missing.len(),
        max = params.max,
        "Missing posters found"
    );
    if missing.is_empty() {
        return Ok(json!({ "processed": 0, "updated": 0 }));
    }

    let updates = fetch_batch(tmdb, &missing, params, move |tmdb, imdb_id| {
        let image_base = image_base.clone();
        async move { tmdb.poster_for_imdb_id(&imdb_id, &image_base).await }
    })
    .await;

    let mut updated = 0u64;
    for chunk in updates.chunks(UPSERT_CHUNK_SIZE) {
        for (imdb_id, poster_url) in chunk {
            updated += set_movie_poster(db.pool(), imdb_id, poster_url).await?;
        }
        debug!(chunk = chunk.len(), "Poster chunk written");
    }

    info!(
        processed = missing.len(),
        updated, "Poster enrichment complete"
    );

    Ok(json!({ "processed": missing.len(), "updated": updated }))
}

/// Fill in missing descriptions from TMDB overviews.
///
/// Movies already tagged into the primary list are preferred; only when
/// none of those are missing a description does the job fall back to the
/// rest of the catalog.
pub async fn enrich_descriptions(
    db: &Database,
    tmdb: &TmdbClient,
    params: &EnrichParams,
) -> Result<serde_json::Value> {
    info!("Enriching missing descriptions from TMDB");

    let mut missing =
        find_movies_missing_description_in_list(db.pool(), TOP250_LIST, params.max).await?;
    if missing.is_empty() {
        missing = find_movies_missing_description(db.pool(), params.max).await?;
    }

    info!(
        missing = missing.len(),
        max = params.max,
        "Missing descriptions found"
    );
    if missing.is_empty() {
        return Ok(json!({ "processed": 0, "updated": 0 }));
    }

    let updates = fetch_batch(tmdb, &missing, params, |tmdb, imdb_id| async move {
        tmdb.overview_for_imdb_id(&imdb_id).await
    })
    .await;

    let mut updated = 0u64;
    for chunk in updates.chunks(UPSERT_CHUNK_SIZE) {
        for (imdb_id, description) in chunk {
            updated += set_movie_description(db.pool(), imdb_id, description).await?;
        }
        debug!(chunk = chunk.len(), "Description chunk written");
    }

    info!(
        processed = missing.len(),
        updated, "Description enrichment complete"
    );

    Ok(json!({ "processed": missing.len(), "updated": updated }))
}

/// Run one bounded-concurrency lookup per movie and collect the non-empty
/// results.
///
/// At most `params.concurrency` lookups are in flight at once; task starts
/// are staggered by `delay_ms * (index % concurrency)` to avoid bursting
/// the external rate limit. A failed lookup logs a warning and yields no
/// value for that movie only.
async fn fetch_batch<F, Fut>(
    tmdb: &TmdbClient,
    movies: &[Movie],
    params: &EnrichParams,
    fetch: F,
) -> Vec<(String, String)>
where
    F: Fn(TmdbClient, String) -> Fut + Clone + Send + 'static,
    Fut: std::future::Future<Output = Result<String, crate::tmdb::TmdbError>> + Send + 'static,
{
    let concurrency = params.concurrency.max(1);
    let limiter = ConcurrencyLimiter::new(concurrency);

    let mut tasks = Vec::with_capacity(movies.len());
    for (idx, movie) in movies.iter().enumerate() {
        let imdb_id = movie.imdb_id.clone();
        let tmdb = tmdb.clone();
        let limiter = limiter.clone();
        let fetch = fetch.clone();
        let stagger = Duration::from_millis(params.delay_ms * (idx % concurrency) as u64);

        tasks.push(tokio::spawn(async move {
            let _permit = limiter.acquire().await;
            if !stagger.is_zero() {
                sleep(stagger).await;
            }

            match fetch(tmdb, imdb_id.clone()).await {
                Ok(value) => (imdb_id, value),
                Err(e) => {
                    warn!(imdb_id = %imdb_id, error = %e, "TMDB lookup failed");
                    (imdb_id, String::new())
                }
            }
        }));
    }

    let mut updates = Vec::new();
    for task in tasks {
        match task.await {
            Ok((imdb_id, value)) if !value.trim().is_empty() => updates.push((imdb_id, value)),
            Ok(_) => {}
            Err(e) => warn!("Enrichment task panicked: {e}"),
        }
    }

    updates
}
