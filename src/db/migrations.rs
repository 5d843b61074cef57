use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::debug;

/// Run all pending migrations.
pub async fn run(pool: &SqlitePool) -> Result<()> {
    create_migration_table(pool).await?;
    let current_version = get_schema_version(pool).await?;

    if current_version < 1 {
        debug!("Running migration v1");
        run_migration_v1(pool).await?;
        set_schema_version(pool, 1).await?;
    }

    Ok(())
}

async fn create_migration_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS _schema_version (
            version INTEGER PRIMARY KEY
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create schema version table")?;

    Ok(())
}

async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let row: Option<(i32,)> = sqlx::query_as("SELECT version FROM _schema_version LIMIT 1")
        .fetch_optional(pool)
        .await
        .context("Failed to get schema version")?;

    Ok(row.map_or(0, |(v,)| v))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("DELETE FROM _schema_version")
        .execute(pool)
        .await?;
    sqlx::query("INSERT INTO _schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;
    Ok(())
}

async fn run_migration_v1(pool: &SqlitePool) -> Result<()> {
    debug!("Running migration v1: creating initial schema");

    // Movies table
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS movies (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            imdb_id TEXT NOT NULL UNIQUE,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            rating REAL,
            release_date TEXT,
            duration_mins INTEGER,
            poster_url TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create movies table")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_movies_rating ON movies(rating)")
        .execute(pool)
        .await?;

    // List membership table. Union-only: rows are only ever added by sync
    // jobs, never removed.
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS movie_lists (
            movie_id INTEGER NOT NULL REFERENCES movies(id) ON DELETE CASCADE,
            list_name TEXT NOT NULL,
            added_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (movie_id, list_name)
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create movie_lists table")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_movie_lists_name ON movie_lists(list_name)")
        .execute(pool)
        .await?;

    // Job queue table
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS jobs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL,
            payload TEXT NOT NULL DEFAULT '{}',
            status TEXT NOT NULL DEFAULT 'waiting',
            attempts INTEGER NOT NULL DEFAULT 0,
            max_attempts INTEGER NOT NULL DEFAULT 5,
            run_at TEXT NOT NULL,
            last_error TEXT,
            result TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            finished_at TEXT
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create jobs table")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_status_run_at ON jobs(status, run_at)")
        .execute(pool)
        .await?;

    Ok(())
}
