use serde::{Deserialize, Serialize};

/// A catalog entry persisted in the store.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Movie {
    pub id: i64,
    pub imdb_id: String,
    pub title: String,
    pub description: String,
    pub rating: Option<f64>,
    pub release_date: Option<String>,
    pub duration_mins: Option<i64>,
    pub poster_url: String,
    pub created_at: String,
    pub updated_at: String,
}

/// A movie together with the named lists it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovieWithLists {
    pub movie: Movie,
    pub lists: Vec<String>,
}

/// Fields merged into the store by sync and enrichment jobs.
///
/// `title`, `rating`, `release_date` and `duration_mins` are always
/// refreshed on conflict; `poster_url` and `description` only overwrite the
/// stored value when non-empty, so repeated job runs never regress
/// previously enriched fields.
#[derive(Debug, Clone, Default)]
pub struct MovieUpsert {
    pub imdb_id: String,
    pub title: String,
    pub rating: Option<f64>,
    pub release_date: Option<String>,
    pub duration_mins: Option<i64>,
    pub poster_url: Option<String>,
    pub description: Option<String>,
}

/// Job lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Waiting,
    Active,
    Completed,
    Failed,
    Delayed,
}

impl JobStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Delayed => "delayed",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(Self::Waiting),
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "delayed" => Some(Self::Delayed),
            _ => None,
        }
    }
}

/// A queued job.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Job {
    pub id: i64,
    pub kind: String,
    pub payload: String,
    pub status: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub run_at: String,
    pub last_error: Option<String>,
    pub result: Option<String>,
    pub created_at: String,
    pub finished_at: Option<String>,
}

impl Job {
    #[must_use]
    pub fn status_enum(&self) -> Option<JobStatus> {
        JobStatus::from_str(&self.status)
    }
}

/// Per-state job counts for the queue status read.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct JobCounts {
    pub waiting: i64,
    pub active: i64,
    pub completed: i64,
    pub failed: i64,
    pub delayed: i64,
}
