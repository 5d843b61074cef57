//! Durable job queue: job kinds, payloads, and the worker that executes
//! them.

pub mod enrich;
pub mod limiter;
pub mod sync;
pub mod worker;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::db::insert_job;

/// The closed set of job types this worker executes.
///
/// Wire names are validated here at enqueue time; an unknown name never
/// reaches the queue table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    SyncTop250,
    SyncAnimeTop50,
    EnrichPosters,
    EnrichDescriptions,
}

impl JobKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SyncTop250 => "sync-top250",
            Self::SyncAnimeTop50 => "sync-anime-top50",
            Self::EnrichPosters => "enrich-posters",
            Self::EnrichDescriptions => "enrich-descriptions",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "sync-top250" => Some(Self::SyncTop250),
            "sync-anime-top50" => Some(Self::SyncAnimeTop50),
            "enrich-posters" => Some(Self::EnrichPosters),
            "enrich-descriptions" => Some(Self::EnrichDescriptions),
            _ => None,
        }
    }
}

/// Payload for the sync jobs. The source tag is informational only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncParams {
    #[serde(default)]
    pub source: Option<String>,
}

/// Payload for the enrichment jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EnrichParams {
    /// Maximum records considered per run.
    pub max: i64,
    /// Maximum simultaneous external calls.
    pub concurrency: usize,
    /// Stagger between task starts, multiplied by position modulo
    /// concurrency.
    pub delay_ms: u64,
}

impl Default for EnrichParams {
    fn default() -> Self {
        Self {
            max: 250,
            concurrency: 3,
            delay_ms: 120,
        }
    }
}

/// Enqueue a job by wire name. This is the producer boundary used by the
/// (out-of-scope) API layer and the `enqueue` CLI mode.
///
/// # Errors
///
/// Rejects unknown job names; this is a producer configuration error, not a
/// dispatch-time condition.
pub async fn enqueue_job(
    pool: &SqlitePool,
    name: &str,
    payload: serde_json::Value,
    max_attempts: i32,
) -> Result<i64> {
    let kind = JobKind::from_str(name).ok_or_else(|| anyhow!("unknown job kind: {name}"))?;
    insert_job(pool, kind.as_str(), &payload, max_attempts).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_kind_round_trip() {
        for kind in [
            JobKind::SyncTop250,
            JobKind::SyncAnimeTop50,
            JobKind::EnrichPosters,
            JobKind::EnrichDescriptions,
        ] {
            assert_eq!(JobKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(JobKind::from_str("reticulate-splines"), None);
    }

    #[test]
    fn test_enrich_params_defaults() {
        let params: EnrichParams = serde_json::from_str("{}").unwrap();
        assert_eq!(params.max, 250);
        assert_eq!(params.concurrency, 3);
        assert_eq!(params.delay_ms, 120);
    }

    #[test]
    fn test_enrich_params_camel_case() {
        let params: EnrichParams =
            serde_json::from_str(r#"{"max": 10, "concurrency": 2, "delayMs": 50}"#).unwrap();
        assert_eq!(params.max, 10);
        assert_eq!(params.concurrency, 2);
        assert_eq!(params.delay_ms, 50);
    }
}
