//! Ranked-list sync jobs.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::Result;
use chrono::NaiveDate;
use serde_json::json;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::Config;
use crate::constants::{ANIME_TOP50_LIST, TOP250_LIST};
use crate::datasets::basics::scan_basics;
use crate::datasets::fetch::ensure_datasets;
use crate::datasets::ranking::{build_ranked_list, RankedTitle, RANKED_FLOOR, TOP_LIST_SIZE};
use crate::datasets::ratings::{scan_ratings, CandidateIndex};
use crate::db::{upsert_movies, Database, MovieUpsert};
use crate::tmdb::{TmdbClient, TmdbMovie};

use super::limiter::ConcurrencyLimiter;

/// Target size of the anime list.
const ANIME_LIST_SIZE: usize = 50;

/// Discover pages scanned before giving up on filling the anime list.
const ANIME_MAX_PAGES: u32 = 10;

/// Build the primary ranked list from the datasets and merge it into the
/// store under the `top250` tag.
pub async fn sync_top250(
    db: &Database,
    http: &reqwest::Client,
    config: &Config,
) -> Result<serde_json::Value> {
    let (ratings_path, basics_path) = ensure_datasets(http, config).await?;

    info!(min_votes = config.min_votes, "Building top250 from datasets");

    let candidates = scan_ratings(&ratings_path, config.min_votes).await?;
    let index = CandidateIndex::new(candidates);
    info!(candidates = index.len(), "Ratings pass done");

    let enriched = scan_basics(&basics_path, &index).await?;
    let ranked = build_ranked_list(enriched, TOP_LIST_SIZE, RANKED_FLOOR)?;
    let count = ranked.len();

    let movies: Vec<MovieUpsert> = ranked.into_iter().map(ranked_to_upsert).collect();
    let affected = upsert_movies(db.pool(), &movies, Some(TOP250_LIST)).await?;

    info!(count, affected, "Top250 sync complete");

    Ok(json!({ "count": count, "affected": affected }))
}

fn ranked_to_upsert(title: RankedTitle) -> MovieUpsert {
    MovieUpsert {
        imdb_id: title.imdb_id,
        title: title.title,
        rating: Some(title.rating),
        release_date: title.release_date.map(|d| d.to_string()),
        duration_mins: title.duration_mins,
        // Description and poster stay unset so enrichment is never
        // pre-empted by empty placeholders.
        poster_url: None,
        description: None,
    }
}

/// Build the secondary ranked list (top animated Japanese movies) from the
/// TMDB discover listing and merge it under the `anime-top50` tag.
pub async fn sync_anime_top50(db: &Database, tmdb: &TmdbClient) -> Result<serde_json::Value> {
    info!("Fetching top anime movies from TMDB");

    let image_base = tmdb.image_base_url().await;
    let limiter = ConcurrencyLimiter::new(3);

    let mut collected: Vec<MovieUpsert> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for page in 1..=ANIME_MAX_PAGES {
        if collected.len() >= ANIME_LIST_SIZE {
            break;
        }

        let results = tmdb.discover_anime_page(page).await?;
        if results.is_empty() {
            break;
        }

        // Cross-reference each discover entry to its IMDb id under the
        // shared concurrency bound, staggering task starts.
        let mut tasks = Vec::new();
        for (idx, movie) in results.into_iter().enumerate() {
            let tmdb = tmdb.clone();
            let limiter = limiter.clone();

            tasks.push(tokio::spawn(async move {
                let _permit = limiter.acquire().await;
                sleep(Duration::from_millis(80 * (idx % 3) as u64)).await;

                let tmdb_id = movie.id?;
                match tmdb.imdb_id_for_movie(tmdb_id).await {
                    Ok(Some(imdb_id)) => Some((imdb_id, movie)),
                    Ok(None) => None,
                    Err(e) => {
                        warn!(tmdb_id, error = %e, "External id lookup failed");
                        None
                    }
                }
            }));
        }

        for task in tasks {
            let Ok(Some((imdb_id, movie))) = task.await else {
                continue;
            };
            if !seen.insert(imdb_id.clone()) {
                continue;
            }
            collected.push(anime_to_upsert(imdb_id, &movie, tmdb, &image_base));
            if collected.len() >= ANIME_LIST_SIZE {
                break;
            }
        }

        info!(
            collected = collected.len(),
            page, "Anime collection progress"
        );
    }

    if collected.len() < 30 {
        warn!(
            collected = collected.len(),
            "Collected few anime movies with IMDb ids; discover filters may be too strict"
        );
    }

    collected.truncate(ANIME_LIST_SIZE);
    let count = collected.len();
    let affected = upsert_movies(db.pool(), &collected, Some(ANIME_TOP50_LIST)).await?;

    info!(count, affected, "Anime sync complete");

    Ok(json!({ "count": count, "affected": affected }))
}

fn anime_to_upsert(
    imdb_id: String,
    movie: &TmdbMovie,
    tmdb: &TmdbClient,
    image_base: &str,
) -> MovieUpsert {
    let title = movie
        .title
        .clone()
        .filter(|t| !t.is_empty())
        .or_else(|| movie.original_title.clone().filter(|t| !t.is_empty()))
        .unwrap_or_else(|| imdb_id.clone());

    let poster_url = movie
        .poster_path
        .as_deref()
        .map(|path| tmdb.poster_url(image_base, path));

    let release_date = movie
        .release_date
        .as_deref()
        .and_then(|raw| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok())
        .map(|d| d.to_string());

    MovieUpsert {
        imdb_id,
        title,
        rating: movie.vote_average.filter(|r| r.is_finite()),
        release_date,
        duration_mins: None,
        poster_url,
        description: movie.overview.clone().filter(|o| !o.is_empty()),
    }
}
