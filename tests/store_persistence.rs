//! Task store persistence tests.

mod common;

use chrono::Duration;
use cronkeep::{TaskRecord, TaskStore};
use tempfile::TempDir;

use common::local;

fn sample_tasks() -> Vec<TaskRecord> {
    let mut backup = TaskRecord::new("backup", "0 3 * * *", Duration::minutes(5));
    backup.last_success_time = Some(local(2025, 3, 9, 3, 0, 2));

    let mut report = TaskRecord::new("report", "0 9 * * 1-5", Duration::minutes(30));
    report.last_failure_time = Some(local(2025, 3, 7, 9, 0, 1));
    report.pending_retry_until = Some(local(2025, 3, 7, 9, 30, 1));
    report.scheduler_identifier = None;

    vec![backup, report]
}

#[tokio::test]
async fn empty_store_loads_no_tasks() {
    let store = TaskStore::in_memory().await.unwrap();
    assert!(store.load_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn replace_and_load_round_trips_in_order() {
    let store = TaskStore::in_memory().await.unwrap();
    let tasks = sample_tasks();

    let mut tx = store.begin().await.unwrap();
    TaskStore::replace_tasks(&mut tx, &tasks).await.unwrap();
    tx.commit().await.unwrap();

    let loaded = store.load_all().await.unwrap();
    assert_eq!(loaded, tasks);
    assert_eq!(loaded[0].name, "backup");
    assert_eq!(loaded[1].name, "report");
}

#[tokio::test]
async fn state_survives_reopening_the_database() {
    let dir = TempDir::new().unwrap();
    let path = dir
        .path()
        .join("tasks.db")
        .to_string_lossy()
        .into_owned();

    {
        let store = TaskStore::open(&path).await.unwrap();
        let mut tx = store.begin().await.unwrap();
        TaskStore::replace_tasks(&mut tx, &sample_tasks()).await.unwrap();
        tx.commit().await.unwrap();
    }

    let reopened = TaskStore::open(&path).await.unwrap();
    let loaded = reopened.load_all().await.unwrap();
    assert_eq!(loaded, sample_tasks());
}

#[tokio::test]
async fn update_task_changes_one_row_only() {
    let store = TaskStore::in_memory().await.unwrap();
    let tasks = sample_tasks();

    let mut tx = store.begin().await.unwrap();
    TaskStore::replace_tasks(&mut tx, &tasks).await.unwrap();
    tx.commit().await.unwrap();

    let mut changed = tasks[1].clone();
    changed.last_attempt_time = Some(local(2025, 3, 10, 9, 0, 0));
    changed.scheduler_identifier = Some("instance-a".to_string());

    let mut tx = store.begin().await.unwrap();
    TaskStore::update_task(&mut tx, &changed).await.unwrap();
    tx.commit().await.unwrap();

    let loaded = store.load_all().await.unwrap();
    assert_eq!(loaded[0], tasks[0]);
    assert_eq!(loaded[1], changed);
}

#[tokio::test]
async fn update_of_an_unknown_task_fails() {
    let store = TaskStore::in_memory().await.unwrap();
    let stranger = TaskRecord::new("stranger", "0 0 * * *", Duration::minutes(1));

    let mut tx = store.begin().await.unwrap();
    let err = TaskStore::update_task(&mut tx, &stranger).await.unwrap_err();
    assert!(err.to_string().contains("stranger"), "{}", err);
}

#[tokio::test]
async fn uncommitted_changes_are_not_visible() {
    let store = TaskStore::in_memory().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    TaskStore::replace_tasks(&mut tx, &sample_tasks()).await.unwrap();
    drop(tx); // rolled back

    assert!(store.load_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn timestamps_round_trip_to_the_same_instant() {
    let store = TaskStore::in_memory().await.unwrap();
    let mut task = TaskRecord::new("t", "0 * * * *", Duration::seconds(90));
    task.last_success_time = Some(local(2024, 11, 3, 14, 30, 59));
    task.last_attempt_time = Some(local(2024, 11, 4, 15, 0, 0));
    task.scheduler_identifier = Some("instance-b".to_string());

    let mut tx = store.begin().await.unwrap();
    TaskStore::replace_tasks(&mut tx, std::slice::from_ref(&task))
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let loaded = store.load_all().await.unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0], task);
    assert_eq!(loaded[0].retry_delay(), Duration::seconds(90));
}
