//! Queue worker: claims due jobs one at a time, dispatches them to the
//! matching handler, and applies retry/backoff on failure.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::db::{
    claim_due_job, complete_job, fail_job, purge_finished_jobs, reschedule_job,
    reset_stuck_active_jobs, Database, Job,
};
use crate::tmdb::TmdbClient;

use super::{enrich, sync, EnrichParams, JobKind, SyncParams};

/// Single-consumer job queue worker.
///
/// Jobs execute serially: no two jobs run at once, so sync and enrichment
/// jobs never race on the catalog. Parallelism only happens inside a job's
/// own enrichment batch.
pub struct QueueWorker {
    config: Config,
    db: Database,
    http: reqwest::Client,
    tmdb: TmdbClient,
}

impl QueueWorker {
    /// Create a new worker.
    #[must_use]
    pub fn new(config: Config, db: Database) -> Self {
        let tmdb = TmdbClient::new(&config);

        // Dataset downloads run to multi-gigabyte bodies; bound connection
        // setup but not the transfer itself.
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            config,
            db,
            http,
            tmdb,
        }
    }

    /// Recover from a previous unclean shutdown.
    ///
    /// Jobs interrupted mid-run are still marked active; put them back in
    /// the queue so they run again.
    pub async fn recover_on_startup(&self) -> Result<()> {
        let stuck = reset_stuck_active_jobs(self.db.pool()).await?;
        if stuck > 0 {
            info!(count = stuck, "Reset stuck active jobs to waiting");
        }
        Ok(())
    }

    /// Run the worker loop until the task is aborted.
    pub async fn run(&self) {
        loop {
            match self.tick().await {
                // A job ran; look for the next one immediately.
                Ok(true) => {}
                Ok(false) => tokio::time::sleep(self.config.poll_interval).await,
                Err(e) => {
                    error!("Queue tick failed: {e:#}");
                    tokio::time::sleep(self.config.poll_interval).await;
                }
            }
        }
    }

    /// Claim and execute at most one due job. Returns whether a job ran.
    pub async fn tick(&self) -> Result<bool> {
        let Some(job) = claim_due_job(self.db.pool()).await? else {
            return Ok(false);
        };

        info!(
            job_id = job.id,
            kind = %job.kind,
            attempt = job.attempts,
            "Job started"
        );

        // An unknown kind in the table is a producer configuration error;
        // retrying can never fix it.
        let Some(kind) = JobKind::from_str(&job.kind) else {
            fail_job(self.db.pool(), job.id, "unknown job kind").await?;
            warn!(job_id = job.id, kind = %job.kind, "Unknown job kind marked failed");
            return Ok(true);
        };

        match self.dispatch(kind, &job).await {
            Ok(result) => {
                complete_job(self.db.pool(), job.id, &result).await?;
                info!(job_id = job.id, kind = %job.kind, "Job completed");
            }
            Err(e) => {
                let error_msg = format!("{e:#}");
                error!(job_id = job.id, kind = %job.kind, "Job failed: {error_msg}");

                if job.attempts >= job.max_attempts {
                    fail_job(self.db.pool(), job.id, &error_msg).await?;
                    warn!(
                        job_id = job.id,
                        attempts = job.attempts,
                        "Job terminally failed after max attempts"
                    );
                } else {
                    let delay = backoff_delay(self.config.retry_base_delay_ms, job.attempts);
                    let run_at = (Utc::now() + delay)
                        .to_rfc3339_opts(SecondsFormat::Millis, true);
                    reschedule_job(self.db.pool(), job.id, &error_msg, &run_at).await?;
                    debug!(
                        job_id = job.id,
                        delay_ms = delay.as_millis() as u64,
                        "Job rescheduled with backoff"
                    );
                }
            }
        }

        purge_finished_jobs(
            self.db.pool(),
            self.config.completed_retention,
            self.config.failed_retention,
        )
        .await?;

        Ok(true)
    }

    async fn dispatch(&self, kind: JobKind, job: &Job) -> Result<serde_json::Value> {
        match kind {
            JobKind::SyncTop250 => {
                let _params: SyncParams = parse_payload(&job.payload)?;
                sync::sync_top250(&self.db, &self.http, &self.config).await
            }
            JobKind::SyncAnimeTop50 => {
                let _params: SyncParams = parse_payload(&job.payload)?;
                sync::sync_anime_top50(&self.db, &self.tmdb).await
            }
            JobKind::EnrichPosters => {
                let params: EnrichParams = parse_payload(&job.payload)?;
                enrich::enrich_posters(&self.db, &self.tmdb, &params).await
            }
            JobKind::EnrichDescriptions => {
                let params: EnrichParams = parse_payload(&job.payload)?;
                enrich::enrich_descriptions(&self.db, &self.tmdb, &params).await
            }
        }
    }
}

fn parse_payload<T: DeserializeOwned>(payload: &str) -> Result<T> {
    serde_json::from_str(payload).context("Malformed job payload")
}

/// Exponential backoff: `base * 2^(attempt - 1)`, where `attempt` is the
/// 1-based attempt that just failed.
#[must_use]
pub fn backoff_delay(base_ms: u64, attempt: i32) -> Duration {
    let exp = attempt.saturating_sub(1).clamp(0, 16) as u32;
    Duration::from_millis(base_ms.saturating_mul(1 << exp))
}
