//! Integration tests for the durable job queue.

use movie_catalog_worker::db::{
    claim_due_job, complete_job, fail_job, get_job, insert_job, purge_finished_jobs, queue_counts,
    reschedule_job, Database, JobStatus,
};
use movie_catalog_worker::jobs::enqueue_job;
use serde_json::json;
use tempfile::TempDir;

async fn setup_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("test.sqlite");
    let db = Database::new(&db_path)
        .await
        .expect("Failed to create database");
    (db, temp_dir)
}

#[tokio::test]
async fn test_enqueue_and_claim() {
    let (db, _temp_dir) = setup_db().await;

    let job_id = enqueue_job(db.pool(), "sync-top250", json!({"source": "cron"}), 5)
        .await
        .expect("Failed to enqueue");

    let job = get_job(db.pool(), job_id).await.unwrap().unwrap();
    assert_eq!(job.status, "waiting");
    assert_eq!(job.attempts, 0);
    assert_eq!(job.max_attempts, 5);

    let claimed = claim_due_job(db.pool())
        .await
        .unwrap()
        .expect("Job should be due");
    assert_eq!(claimed.id, job_id);
    assert_eq!(claimed.status, "active");
    assert_eq!(claimed.attempts, 1);
    assert_eq!(claimed.status_enum(), Some(JobStatus::Active));

    // Nothing else is due while the job is active
    assert!(claim_due_job(db.pool()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_unknown_job_name_rejected_at_enqueue() {
    let (db, _temp_dir) = setup_db().await;

    let result = enqueue_job(db.pool(), "reticulate-splines", json!({}), 5).await;
    let err = result.unwrap_err();
    assert!(err.to_string().contains("unknown job kind"));

    let counts = queue_counts(db.pool()).await.unwrap();
    assert_eq!(counts.waiting, 0);
}

#[tokio::test]
async fn test_claim_order_is_fifo() {
    let (db, _temp_dir) = setup_db().await;

    let first = enqueue_job(db.pool(), "enrich-posters", json!({}), 5)
        .await
        .unwrap();
    let second = enqueue_job(db.pool(), "enrich-descriptions", json!({}), 5)
        .await
        .unwrap();

    let claimed = claim_due_job(db.pool()).await.unwrap().unwrap();
    assert_eq!(claimed.id, first);
    complete_job(db.pool(), claimed.id, &json!({})).await.unwrap();

    let claimed = claim_due_job(db.pool()).await.unwrap().unwrap();
    assert_eq!(claimed.id, second);
}

#[tokio::test]
async fn test_complete_stores_result() {
    let (db, _temp_dir) = setup_db().await;

    let job_id = enqueue_job(db.pool(), "sync-top250", json!({}), 5)
        .await
        .unwrap();
    claim_due_job(db.pool()).await.unwrap().unwrap();
    complete_job(db.pool(), job_id, &json!({"count": 250, "affected": 250}))
        .await
        .unwrap();

    let job = get_job(db.pool(), job_id).await.unwrap().unwrap();
    assert_eq!(job.status, "completed");
    assert!(job.finished_at.is_some());

    let result: serde_json::Value = serde_json::from_str(job.result.as_deref().unwrap()).unwrap();
    assert_eq!(result["count"], 250);
}

#[tokio::test]
async fn test_reschedule_delays_with_increasing_run_at() {
    let (db, _temp_dir) = setup_db().await;

    let job_id = enqueue_job(db.pool(), "enrich-posters", json!({}), 5)
        .await
        .unwrap();

    let mut previous_run_at = String::new();
    for attempt in 1..=3 {
        // Make the job due regardless of the previous backoff window
        sqlx_force_due(&db, job_id).await;

        let claimed = claim_due_job(db.pool()).await.unwrap().unwrap();
        assert_eq!(claimed.attempts, attempt);

        // Schedule the retry further out each attempt, as the worker does
        let delay_ms = 1000 * (1 << (attempt - 1));
        let run_at = (chrono::Utc::now() + std::time::Duration::from_millis(delay_ms))
            .to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        reschedule_job(db.pool(), job_id, "boom", &run_at).await.unwrap();

        let job = get_job(db.pool(), job_id).await.unwrap().unwrap();
        assert_eq!(job.status, "delayed");
        assert_eq!(job.last_error.as_deref(), Some("boom"));
        assert!(job.run_at > previous_run_at, "backoff must grow");
        previous_run_at = job.run_at;
    }

    // A delayed job in the future is not claimable
    assert!(claim_due_job(db.pool()).await.unwrap().is_none());
}

async fn sqlx_force_due(db: &Database, job_id: i64) {
    let now = movie_catalog_worker::db::now_rfc3339();
    sqlx::query("UPDATE jobs SET run_at = ? WHERE id = ?")
        .bind(now)
        .bind(job_id)
        .execute(db.pool())
        .await
        .expect("Failed to force job due");
}

#[tokio::test]
async fn test_terminal_failure_retained() {
    let (db, _temp_dir) = setup_db().await;

    let job_id = enqueue_job(db.pool(), "sync-anime-top50", json!({}), 1)
        .await
        .unwrap();
    claim_due_job(db.pool()).await.unwrap().unwrap();
    fail_job(db.pool(), job_id, "TMDB 500: upstream exploded")
        .await
        .unwrap();

    let job = get_job(db.pool(), job_id).await.unwrap().unwrap();
    assert_eq!(job.status, "failed");
    assert!(job.finished_at.is_some());
    assert!(job.last_error.as_deref().unwrap().contains("TMDB 500"));

    // Terminal jobs never come back
    assert!(claim_due_job(db.pool()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_queue_counts_per_state() {
    let (db, _temp_dir) = setup_db().await;

    let a = enqueue_job(db.pool(), "sync-top250", json!({}), 5).await.unwrap();
    let b = enqueue_job(db.pool(), "enrich-posters", json!({}), 5).await.unwrap();
    enqueue_job(db.pool(), "enrich-descriptions", json!({}), 5)
        .await
        .unwrap();

    claim_due_job(db.pool()).await.unwrap().unwrap();
    complete_job(db.pool(), a, &json!({})).await.unwrap();

    claim_due_job(db.pool()).await.unwrap().unwrap();
    let far_future = "2999-01-01T00:00:00.000Z";
    reschedule_job(db.pool(), b, "boom", far_future).await.unwrap();

    let counts = queue_counts(db.pool()).await.unwrap();
    assert_eq!(counts.waiting, 1);
    assert_eq!(counts.active, 0);
    assert_eq!(counts.completed, 1);
    assert_eq!(counts.failed, 0);
    assert_eq!(counts.delayed, 1);
}

#[tokio::test]
async fn test_purge_keeps_most_recent_finished_jobs() {
    let (db, _temp_dir) = setup_db().await;

    let mut completed_ids = Vec::new();
    for _ in 0..5 {
        let id = enqueue_job(db.pool(), "sync-top250", json!({}), 5)
            .await
            .unwrap();
        claim_due_job(db.pool()).await.unwrap().unwrap();
        complete_job(db.pool(), id, &json!({})).await.unwrap();
        completed_ids.push(id);
    }

    let failed_id = enqueue_job(db.pool(), "enrich-posters", json!({}), 1)
        .await
        .unwrap();
    claim_due_job(db.pool()).await.unwrap().unwrap();
    fail_job(db.pool(), failed_id, "boom").await.unwrap();

    let purged = purge_finished_jobs(db.pool(), 2, 200).await.unwrap();
    assert_eq!(purged, 3);

    let counts = queue_counts(db.pool()).await.unwrap();
    assert_eq!(counts.completed, 2);
    assert_eq!(counts.failed, 1);

    // The survivors are the most recent completions
    assert!(get_job(db.pool(), completed_ids[0]).await.unwrap().is_none());
    assert!(get_job(db.pool(), completed_ids[4]).await.unwrap().is_some());
}

#[tokio::test]
async fn test_insert_job_bypassing_enqueue_is_claimable() {
    // The worker guards against unknown kinds that reach the table without
    // going through enqueue validation.
    let (db, _temp_dir) = setup_db().await;

    let job_id = insert_job(db.pool(), "not-a-real-kind", &json!({}), 5)
        .await
        .unwrap();
    let claimed = claim_due_job(db.pool()).await.unwrap().unwrap();
    assert_eq!(claimed.id, job_id);
    assert_eq!(claimed.kind, "not-a-real-kind");
}
