use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use sqlx::SqlitePool;

use crate::constants::UPSERT_CHUNK_SIZE;

use super::models::{Job, JobCounts, Movie, MovieUpsert, MovieWithLists};

/// Current UTC time as an RFC3339 string with millisecond precision.
///
/// All job scheduling timestamps are generated here so that string
/// comparisons in SQL stay within one format.
#[must_use]
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ========== Movies ==========

/// Merge a batch of movies into the store, optionally tagging them into a
/// named list.
///
/// Rows are written in chunks; each chunk commits independently so one
/// chunk's failure doesn't block the rest. Per row: `title`, `rating`,
/// `release_date` and `duration_mins` are always refreshed, while
/// `poster_url` and `description` only replace the stored value when the
/// incoming value is non-empty. The list tag is added with INSERT OR IGNORE
/// and existing tags are never removed.
///
/// Returns the approximate number of rows affected.
pub async fn upsert_movies(
    pool: &SqlitePool,
    movies: &[MovieUpsert],
    list_name: Option<&str>,
) -> Result<u64> {
    let mut affected = 0u64;

    for chunk in movies.chunks(UPSERT_CHUNK_SIZE) {
        let mut tx = pool.begin().await.context("Failed to begin upsert chunk")?;

        for movie in chunk {
            let result = sqlx::query(
                r"
                INSERT INTO movies (imdb_id, title, rating, release_date, duration_mins, poster_url, description)
                VALUES (?, ?, ?, ?, ?, COALESCE(?, ''), COALESCE(?, ''))
                ON CONFLICT(imdb_id) DO UPDATE SET
                    title = excluded.title,
                    rating = excluded.rating,
                    release_date = excluded.release_date,
                    duration_mins = excluded.duration_mins,
                    poster_url = CASE WHEN excluded.poster_url != '' THEN excluded.poster_url ELSE movies.poster_url END,
                    description = CASE WHEN excluded.description != '' THEN excluded.description ELSE movies.description END,
                    updated_at = datetime('now')
                ",
            )
            .bind(&movie.imdb_id)
            .bind(&movie.title)
            .bind(movie.rating)
            .bind(&movie.release_date)
            .bind(movie.duration_mins)
            .bind(&movie.poster_url)
            .bind(&movie.description)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to upsert movie {}", movie.imdb_id))?;

            affected += result.rows_affected();

            if let Some(list) = list_name {
                sqlx::query(
                    r"
                    INSERT OR IGNORE INTO movie_lists (movie_id, list_name)
                    SELECT id, ? FROM movies WHERE imdb_id = ?
                    ",
                )
                .bind(list)
                .bind(&movie.imdb_id)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to tag movie {}", movie.imdb_id))?;
            }
        }

        tx.commit().await.context("Failed to commit upsert chunk")?;
    }

    Ok(affected)
}

/// Get a movie by its external identifier.
pub async fn get_movie_by_imdb_id(pool: &SqlitePool, imdb_id: &str) -> Result<Option<Movie>> {
    sqlx::query_as("SELECT * FROM movies WHERE imdb_id = ?")
        .bind(imdb_id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch movie")
}

/// Get the names of all lists a movie belongs to.
pub async fn get_lists_for_movie(pool: &SqlitePool, movie_id: i64) -> Result<Vec<String>> {
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT list_name FROM movie_lists WHERE movie_id = ? ORDER BY list_name")
            .bind(movie_id)
            .fetch_all(pool)
            .await
            .context("Failed to fetch movie lists")?;

    Ok(rows.into_iter().map(|(name,)| name).collect())
}

/// Get a movie together with its list memberships.
pub async fn get_movie_with_lists(
    pool: &SqlitePool,
    imdb_id: &str,
) -> Result<Option<MovieWithLists>> {
    let Some(movie) = get_movie_by_imdb_id(pool, imdb_id).await? else {
        return Ok(None);
    };
    let lists = get_lists_for_movie(pool, movie.id).await?;
    Ok(Some(MovieWithLists { movie, lists }))
}

/// Count all movies in the store.
pub async fn count_movies(pool: &SqlitePool) -> Result<i64> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM movies")
        .fetch_one(pool)
        .await?;

    Ok(row.0)
}

/// Find movies with no poster URL, oldest first.
pub async fn find_movies_missing_poster(pool: &SqlitePool, limit: i64) -> Result<Vec<Movie>> {
    sqlx::query_as("SELECT * FROM movies WHERE poster_url = '' ORDER BY id LIMIT ?")
        .bind(limit)
        .fetch_all(pool)
        .await
        .context("Failed to fetch movies missing posters")
}

/// Find movies in a named list with no description, oldest first.
pub async fn find_movies_missing_description_in_list(
    pool: &SqlitePool,
    list_name: &str,
    limit: i64,
) -> Result<Vec<Movie>> {
    sqlx::query_as(
        r"
        SELECT m.* FROM movies m
        JOIN movie_lists l ON l.movie_id = m.id AND l.list_name = ?
        WHERE m.description = ''
        ORDER BY m.id
        LIMIT ?
        ",
    )
    .bind(list_name)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("Failed to fetch listed movies missing descriptions")
}

/// Find any movies with no description, oldest first.
pub async fn find_movies_missing_description(pool: &SqlitePool, limit: i64) -> Result<Vec<Movie>> {
    sqlx::query_as("SELECT * FROM movies WHERE description = '' ORDER BY id LIMIT ?")
        .bind(limit)
        .fetch_all(pool)
        .await
        .context("Failed to fetch movies missing descriptions")
}

/// Set a movie's poster URL.
///
/// Empty values are ignored so a failed lookup can never clear a previously
/// enriched poster.
pub async fn set_movie_poster(pool: &SqlitePool, imdb_id: &str, poster_url: &str) -> Result<u64> {
    if poster_url.is_empty() {
        return Ok(0);
    }

    let result = sqlx::query(
        "UPDATE movies SET poster_url = ?, updated_at = datetime('now') WHERE imdb_id = ?",
    )
    .bind(poster_url)
    .bind(imdb_id)
    .execute(pool)
    .await
    .context("Failed to set movie poster")?;

    Ok(result.rows_affected())
}

/// Set a movie's description.
///
/// Empty values are ignored so a failed lookup can never clear a previously
/// enriched description.
pub async fn set_movie_description(
    pool: &SqlitePool,
    imdb_id: &str,
    description: &str,
) -> Result<u64> {
    if description.trim().is_empty() {
        return Ok(0);
    }

    let result = sqlx::query(
        "UPDATE movies SET description = ?, updated_at = datetime('now') WHERE imdb_id = ?",
    )
    .bind(description)
    .bind(imdb_id)
    .execute(pool)
    .await
    .context("Failed to set movie description")?;

    Ok(result.rows_affected())
}

// ========== Jobs ==========

/// Insert a new waiting job and return its id.
///
/// Kind strings are validated against the closed job-kind set by the caller
/// (`jobs::enqueue`) before they reach the queue table.
pub async fn insert_job(
    pool: &SqlitePool,
    kind: &str,
    payload: &serde_json::Value,
    max_attempts: i32,
) -> Result<i64> {
    let result = sqlx::query(
        r"
        INSERT INTO jobs (kind, payload, status, max_attempts, run_at)
        VALUES (?, ?, 'waiting', ?, ?)
        ",
    )
    .bind(kind)
    .bind(payload.to_string())
    .bind(max_attempts)
    .bind(now_rfc3339())
    .execute(pool)
    .await
    .context("Failed to insert job")?;

    Ok(result.last_insert_rowid())
}

/// Get a job by id.
pub async fn get_job(pool: &SqlitePool, id: i64) -> Result<Option<Job>> {
    sqlx::query_as("SELECT * FROM jobs WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch job")
}

/// Claim the oldest due job: mark it active and bump its attempt counter.
///
/// Returns `None` when nothing is due. The queue has a single consumer, so
/// the select-then-update pair doesn't race.
pub async fn claim_due_job(pool: &SqlitePool) -> Result<Option<Job>> {
    let due: Option<(i64,)> = sqlx::query_as(
        r"
        SELECT id FROM jobs
        WHERE status IN ('waiting', 'delayed') AND run_at <= ?
        ORDER BY id
        LIMIT 1
        ",
    )
    .bind(now_rfc3339())
    .fetch_optional(pool)
    .await
    .context("Failed to find due job")?;

    let Some((id,)) = due else {
        return Ok(None);
    };

    sqlx::query("UPDATE jobs SET status = 'active', attempts = attempts + 1 WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to mark job active")?;

    get_job(pool, id).await
}

/// Mark a job completed, storing its JSON result.
pub async fn complete_job(pool: &SqlitePool, id: i64, result: &serde_json::Value) -> Result<()> {
    sqlx::query(
        r"
        UPDATE jobs
        SET status = 'completed', result = ?, finished_at = ?
        WHERE id = ?
        ",
    )
    .bind(result.to_string())
    .bind(now_rfc3339())
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to complete job")?;

    Ok(())
}

/// Reschedule a failed attempt: the job re-enters the queue as delayed,
/// due again at `run_at`.
pub async fn reschedule_job(pool: &SqlitePool, id: i64, error: &str, run_at: &str) -> Result<()> {
    sqlx::query(
        r"
        UPDATE jobs
        SET status = 'delayed', last_error = ?, run_at = ?
        WHERE id = ?
        ",
    )
    .bind(error)
    .bind(run_at)
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to reschedule job")?;

    Ok(())
}

/// Mark a job terminally failed. The row is retained (bounded by the purge
/// policy) for operator inspection.
pub async fn fail_job(pool: &SqlitePool, id: i64, error: &str) -> Result<()> {
    sqlx::query(
        r"
        UPDATE jobs
        SET status = 'failed', last_error = ?, finished_at = ?
        WHERE id = ?
        ",
    )
    .bind(error)
    .bind(now_rfc3339())
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to mark job failed")?;

    Ok(())
}

/// Reset jobs left active by an unclean shutdown back to waiting.
///
/// Delivery is at-least-once: a job interrupted mid-run simply runs again,
/// which is safe because every persistence operation it performs is an
/// idempotent merge.
pub async fn reset_stuck_active_jobs(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query("UPDATE jobs SET status = 'waiting', run_at = ? WHERE status = 'active'")
        .bind(now_rfc3339())
        .execute(pool)
        .await
        .context("Failed to reset stuck active jobs")?;

    Ok(result.rows_affected())
}

/// Per-state job counts. Pure read, used by the queue status endpoint.
pub async fn queue_counts(pool: &SqlitePool) -> Result<JobCounts> {
    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT status, COUNT(*) FROM jobs GROUP BY status")
            .fetch_all(pool)
            .await
            .context("Failed to count jobs")?;

    let mut counts = JobCounts::default();
    for (status, count) in rows {
        match status.as_str() {
            "waiting" => counts.waiting = count,
            "active" => counts.active = count,
            "completed" => counts.completed = count,
            "failed" => counts.failed = count,
            "delayed" => counts.delayed = count,
            _ => {}
        }
    }

    Ok(counts)
}

/// Purge finished jobs beyond the retention counts, keeping the most recent.
pub async fn purge_finished_jobs(
    pool: &SqlitePool,
    completed_keep: i64,
    failed_keep: i64,
) -> Result<u64> {
    let mut purged = 0u64;

    for (status, keep) in [("completed", completed_keep), ("failed", failed_keep)] {
        let result = sqlx::query(
            r"
            DELETE FROM jobs
            WHERE status = ? AND id NOT IN (
                SELECT id FROM jobs WHERE status = ? ORDER BY id DESC LIMIT ?
            )
            ",
        )
        .bind(status)
        .bind(status)
        .bind(keep)
        .execute(pool)
        .await
        .context("Failed to purge finished jobs")?;

        purged += result.rows_affected();
    }

    Ok(purged)
}
