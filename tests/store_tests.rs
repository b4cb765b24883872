mod test_harness;

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use jobq::config::StoreConfig;
use jobq::scheduler::{JobSpec, JobStatus};
use jobq::store::{document, Store};
use jobq::JobqError;
use test_harness::{assert_eventually, TestEnv, GIB};

/// Set on the re-executed test binary that plays the lock holder.
const HOLD_LOCK_ENV: &str = "JOBQ_TEST_HOLD_LOCK";

#[tokio::test]
async fn test_load_missing_document_is_empty() {
    let dir = TempDir::new().unwrap();
    let table = document::load(&dir.path().join("jobs.json")).await.unwrap();
    assert!(table.is_empty());

    // Reading through the store doesn't create the document either
    let store = Store::new(StoreConfig::new(dir.path()));
    assert!(store.snapshot().await.unwrap().is_empty());
    assert!(!store.config().state_path().exists());
}

#[tokio::test]
async fn test_save_then_load() {
    let dir = TempDir::new().unwrap();
    let store = Store::new(StoreConfig::new(dir.path().join("nested")));

    let job_id = store
        .transaction(|table| Ok(table.submit(JobSpec::new("alice", "true", 1024))))
        .await
        .unwrap();
    assert_eq!(job_id, 1);

    let table = document::load(&store.config().state_path()).await.unwrap();
    assert_eq!(table.queue().len(), 1);
    assert_eq!(table.history().len(), 1);
    assert_eq!(table.history()[0].user, "alice");
    assert!(table.is_coherent());
}

#[tokio::test]
async fn test_document_layout() {
    let env = TestEnv::new(GIB);
    env.submit("alice", "echo hi", 2048).await;

    let raw = std::fs::read_to_string(env.service.store().config().state_path()).unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();

    let history = value["job_history"].as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["job_id"], 1);
    assert_eq!(history[0]["status"], "queued");
    assert_eq!(history[0]["memory"], 2048);
    assert!(history[0]["pid"].is_null());
    assert_eq!(value["job_queue"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_loads_document_without_optional_fields() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("jobs.json");
    let legacy = r#"{
        "job_queue": [
            {"job_id": 2, "user": "bob", "command": "sleep 1", "priority": 1,
             "memory": 10, "compute": 5, "status": "queued", "pid": null}
        ],
        "job_history": [
            {"job_id": 2, "user": "bob", "command": "sleep 1", "priority": 1,
             "memory": 10, "compute": 5, "status": "queued", "pid": null}
        ]
    }"#;
    std::fs::write(&path, legacy).unwrap();

    // Both copies of job 2 must load identically
    let loaded = document::load(&path).await.unwrap();
    assert!(loaded.is_coherent());
    assert_eq!(loaded.get_job(2).unwrap().submitted_at, None);
    assert_eq!(loaded.queue()[0], loaded.history()[0]);

    let store = Store::new(StoreConfig::new(dir.path()));
    let next = store
        .transaction(|table| Ok(table.submit(JobSpec::new("carol", "true", 1))))
        .await
        .unwrap();

    // No persisted counter: ids continue after the highest one present
    assert_eq!(next, 3);
    let table = store.snapshot().await.unwrap();
    assert_eq!(table.history().len(), 2);
    assert!(table.is_coherent());
    assert!(table.get_job(2).unwrap().submitted_at.is_none());
    assert!(table.get_job(3).unwrap().submitted_at.is_some());
}

#[tokio::test]
async fn test_failed_transaction_writes_nothing() {
    let env = TestEnv::new(GIB);
    env.submit("alice", "true", 1).await;
    let path = env.service.store().config().state_path();
    let before = std::fs::read(&path).unwrap();

    let result: jobq::Result<()> = env
        .service
        .store()
        .transaction(|table| {
            table.clear_by_status(JobStatus::Queued);
            Err(JobqError::Internal("abort".into()))
        })
        .await;
    assert!(result.is_err());

    assert_eq!(std::fs::read(&path).unwrap(), before);
    assert_eq!(env.service.snapshot().await.unwrap().queue().len(), 1);
}

#[tokio::test]
async fn test_corrupt_document_is_an_error() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("jobs.json"), "{ not json").unwrap();

    let store = Store::new(StoreConfig::new(dir.path()));
    let err = store.snapshot().await.unwrap_err();
    assert!(matches!(err, JobqError::Json(_)));
}

#[tokio::test]
async fn test_concurrent_submissions_get_unique_ids() {
    let env = TestEnv::new(GIB);

    // Separate services share only the files on disk, like separate
    // processes would.
    let mut handles = Vec::new();
    for i in 0..20 {
        let service = env.second_invocation();
        handles.push(tokio::spawn(async move {
            service
                .submit(JobSpec::new(format!("user{}", i), "true", 1))
                .await
        }));
    }

    let results = futures::future::join_all(handles).await;
    let mut ids: Vec<u64> = results
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, (1..=20).collect::<Vec<u64>>());

    let table = env.service.snapshot().await.unwrap();
    assert_eq!(table.history().len(), 20);
    assert_eq!(table.queue().len(), 20);
    assert!(table.is_coherent());
}

#[tokio::test]
async fn test_open_transaction_blocks_other_invocations() {
    let env = TestEnv::new(GIB);
    let other = env.second_invocation();

    let tx = env.service.store().begin().await.unwrap();

    let submitted = Arc::new(tokio::sync::Notify::new());
    let done = submitted.clone();
    let handle = tokio::spawn(async move {
        let id = other.submit(JobSpec::new("bob", "true", 1)).await.unwrap();
        done.notify_one();
        id
    });

    // The submission cannot complete while the lock is held
    let blocked = tokio::time::timeout(Duration::from_millis(200), submitted.notified()).await;
    assert!(blocked.is_err());

    drop(tx);
    let id = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("submission never acquired the lock")
        .unwrap();
    assert_eq!(id, 1);
}

/// Only does anything when re-executed by
/// `test_lock_released_when_holder_dies`: takes the advisory lock, drops a
/// marker file next to it, then sleeps until killed.
#[test]
fn hold_lock_until_killed() {
    let Some(lock_path) = std::env::var_os(HOLD_LOCK_ENV) else {
        return;
    };
    let lock_path = PathBuf::from(lock_path);
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .unwrap();
    fs2::FileExt::lock_exclusive(&file).unwrap();
    std::fs::write(lock_path.with_extension("held"), b"").unwrap();
    std::thread::sleep(Duration::from_secs(60));
}

#[tokio::test]
async fn test_lock_released_when_holder_dies() {
    let env = TestEnv::new(GIB);
    let lock_path = env.service.store().config().lock_path();
    let marker = lock_path.with_extension("held");

    let mut holder = std::process::Command::new(std::env::current_exe().unwrap())
        .args(["hold_lock_until_killed", "--exact", "--nocapture"])
        .env(HOLD_LOCK_ENV, &lock_path)
        .stdout(Stdio::null())
        .spawn()
        .unwrap();

    assert_eventually(
        Duration::from_secs(10),
        || {
            let marker = marker.clone();
            async move { marker.exists() }
        },
        "holder never took the lock",
    )
    .await;

    let store = env.service.store().clone();
    let mut pending = tokio::spawn(async move {
        let mut tx = store.begin().await?;
        let id = tx.table_mut().submit(JobSpec::new("bob", "true", 1));
        tx.commit().await?;
        Ok::<u64, JobqError>(id)
    });

    // Blocked for as long as the other process holds the lock
    let blocked = tokio::time::timeout(Duration::from_millis(300), &mut pending).await;
    assert!(blocked.is_err());

    // The kernel drops the lock with the holder's descriptors
    holder.kill().unwrap();
    holder.wait().unwrap();

    let id = tokio::time::timeout(Duration::from_secs(5), pending)
        .await
        .expect("lock was never released")
        .unwrap()
        .unwrap();
    assert_eq!(id, 1);
    assert!(env.service.snapshot().await.unwrap().is_coherent());
}
