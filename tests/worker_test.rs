//! Integration tests for the queue worker state machine.

use movie_catalog_worker::config::Config;
use movie_catalog_worker::db::{get_job, insert_job, queue_counts, Database};
use movie_catalog_worker::jobs::enqueue_job;
use movie_catalog_worker::jobs::worker::QueueWorker;
use serde_json::json;
use tempfile::TempDir;

async fn setup_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db = Database::new(&temp_dir.path().join("test.sqlite"))
        .await
        .expect("Failed to create database");
    (db, temp_dir)
}

/// Test config whose TMDB base points at a closed port, so nothing in these
/// tests ever leaves the machine. Zero retry delay keeps retries
/// immediately due.
fn offline_config() -> Config {
    Config {
        tmdb_base_url: "http://127.0.0.1:9".to_string(),
        ..Config::for_testing()
    }
}

#[tokio::test]
async fn test_tick_idle_returns_false() {
    let (db, _temp_dir) = setup_db().await;
    let worker = QueueWorker::new(offline_config(), db);

    assert!(!worker.tick().await.unwrap());
}

#[tokio::test]
async fn test_enrichment_job_with_empty_catalog_completes() {
    let (db, _temp_dir) = setup_db().await;
    let worker = QueueWorker::new(offline_config(), db.clone());

    let job_id = enqueue_job(db.pool(), "enrich-descriptions", json!({}), 5)
        .await
        .unwrap();

    assert!(worker.tick().await.unwrap());

    let job = get_job(db.pool(), job_id).await.unwrap().unwrap();
    assert_eq!(job.status, "completed");

    let result: serde_json::Value = serde_json::from_str(job.result.as_deref().unwrap()).unwrap();
    assert_eq!(result["processed"], 0);
    assert_eq!(result["updated"], 0);
}

#[tokio::test]
async fn test_malformed_payload_retries_until_terminal() {
    let (db, _temp_dir) = setup_db().await;
    let worker = QueueWorker::new(offline_config(), db.clone());

    // Valid JSON, wrong shape: EnrichParams cannot deserialize from an array
    let job_id = enqueue_job(db.pool(), "enrich-posters", json!([1, 2, 3]), 5)
        .await
        .unwrap();

    let mut attempts_seen = Vec::new();
    for _ in 0..10 {
        if !worker.tick().await.unwrap() {
            break;
        }
        let job = get_job(db.pool(), job_id).await.unwrap().unwrap();
        attempts_seen.push(job.attempts);
        if job.status == "failed" {
            break;
        }
    }

    let job = get_job(db.pool(), job_id).await.unwrap().unwrap();
    assert_eq!(job.status, "failed");
    assert_eq!(job.attempts, 5);
    assert_eq!(attempts_seen, vec![1, 2, 3, 4, 5]);
    assert!(job
        .last_error
        .as_deref()
        .unwrap()
        .contains("Malformed job payload"));
    assert!(job.finished_at.is_some());

    // Terminal jobs are not picked up again
    assert!(!worker.tick().await.unwrap());
}

#[tokio::test]
async fn test_unknown_kind_fails_terminally_without_retry() {
    let (db, _temp_dir) = setup_db().await;
    let worker = QueueWorker::new(offline_config(), db.clone());

    // Bypasses enqueue validation, as a misconfigured producer would
    let job_id = insert_job(db.pool(), "bogus-kind", &json!({}), 5)
        .await
        .unwrap();

    assert!(worker.tick().await.unwrap());

    let job = get_job(db.pool(), job_id).await.unwrap().unwrap();
    assert_eq!(job.status, "failed");
    assert_eq!(job.attempts, 1);
    assert!(job.last_error.as_deref().unwrap().contains("unknown job kind"));
}

#[tokio::test]
async fn test_completed_jobs_purged_beyond_retention() {
    let (db, _temp_dir) = setup_db().await;
    let config = Config {
        completed_retention: 2,
        ..offline_config()
    };
    let worker = QueueWorker::new(config, db.clone());

    for _ in 0..5 {
        enqueue_job(db.pool(), "enrich-descriptions", json!({}), 5)
            .await
            .unwrap();
        assert!(worker.tick().await.unwrap());
    }

    let counts = queue_counts(db.pool()).await.unwrap();
    assert_eq!(counts.completed, 2);
    assert_eq!(counts.waiting, 0);
}

#[tokio::test]
async fn test_recover_requeues_interrupted_jobs() {
    let (db, _temp_dir) = setup_db().await;
    let worker = QueueWorker::new(offline_config(), db.clone());

    let job_id = enqueue_job(db.pool(), "enrich-descriptions", json!({}), 5)
        .await
        .unwrap();

    // Simulate a crash mid-run: the job is claimed but never finished
    movie_catalog_worker::db::claim_due_job(db.pool())
        .await
        .unwrap()
        .unwrap();
    let job = get_job(db.pool(), job_id).await.unwrap().unwrap();
    assert_eq!(job.status, "active");

    worker.recover_on_startup().await.unwrap();

    let job = get_job(db.pool(), job_id).await.unwrap().unwrap();
    assert_eq!(job.status, "waiting");
    assert_eq!(job.attempts, 1);

    // The recovered job runs to completion on the next tick
    assert!(worker.tick().await.unwrap());
    let job = get_job(db.pool(), job_id).await.unwrap().unwrap();
    assert_eq!(job.status, "completed");
}

#[tokio::test]
async fn test_jobs_execute_in_order_one_at_a_time() {
    let (db, _temp_dir) = setup_db().await;
    let worker = QueueWorker::new(offline_config(), db.clone());

    let first = enqueue_job(db.pool(), "enrich-descriptions", json!({}), 5)
        .await
        .unwrap();
    let second = enqueue_job(db.pool(), "enrich-descriptions", json!({}), 5)
        .await
        .unwrap();

    assert!(worker.tick().await.unwrap());
    let job = get_job(db.pool(), first).await.unwrap().unwrap();
    assert_eq!(job.status, "completed");
    let job = get_job(db.pool(), second).await.unwrap().unwrap();
    assert_eq!(job.status, "waiting");

    assert!(worker.tick().await.unwrap());
    let job = get_job(db.pool(), second).await.unwrap().unwrap();
    assert_eq!(job.status, "completed");
}
