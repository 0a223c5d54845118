mod common;

use chrono::{NaiveDate, Utc};
use common::{Academy, INSTRUCTOR_EMAIL};
use ganesha_lib::application::ports::OfflineQueueStore;
use ganesha_lib::domain::entities::{AttendanceMark, AttendanceStatus};
use ganesha_lib::domain::value_objects::EntityId;
use ganesha_lib::infrastructure::database::ConnectionPool;
use ganesha_lib::infrastructure::offline::SqliteQueueStore;
use ganesha_lib::presentation::dto::attendance_dto::RecordAttendanceRequest;
use ganesha_lib::shared::config::DEFAULT_QUEUE_KEY;
use ganesha_lib::shared::error::AppError;
use serde_json::Value;
use std::time::Duration;

fn mark(student: &str, date: &str, status: &str) -> RecordAttendanceRequest {
    RecordAttendanceRequest {
        student_id: student.into(),
        class_date: date.into(),
        status: status.into(),
        notes: None,
    }
}

#[tokio::test]
async fn partial_drain_keeps_failed_and_later_entries_in_order() {
    let academy = Academy::seeded();
    let device = academy.signed_in(INSTRUCTOR_EMAIL).await;
    device.connectivity.set_online(false);

    for request in [
        mark("42", "2024-05-06", "present"),
        mark("43", "2024-05-06", "absent"),
        mark("42", "2024-05-07", "late"),
    ] {
        let response = device
            .attendance_handler
            .record_attendance(request)
            .await
            .unwrap();
        assert!(response.queued);
    }
    let status = device.attendance_handler.sync_status().await;
    assert_eq!(status.pending, 3);
    assert_eq!(status.label.as_deref(), Some("Offline"));

    device.connectivity.set_online(true);
    academy.backend.inject_failure_after(
        "attendance",
        1,
        AppError::TransientNetwork("flaky".into()),
    );
    let report = device.attendance_handler.drain_offline_queue().await.unwrap();
    assert_eq!(report.replayed, 1);
    assert_eq!(report.remaining, 2);

    let written = academy.backend.rows("attendance");
    assert_eq!(written.len(), 1);
    assert_eq!(written[0]["student_id"], "42");
    assert_eq!(written[0]["class_date"], "2024-05-06");

    let report = device.attendance_handler.drain_offline_queue().await.unwrap();
    assert_eq!(report.replayed, 2);
    assert_eq!(report.remaining, 0);

    let written = academy.backend.rows("attendance");
    let order: Vec<_> = written
        .iter()
        .map(|row| (row["student_id"].clone(), row["class_date"].clone()))
        .collect();
    assert_eq!(
        order,
        vec![
            (Value::from("42"), Value::from("2024-05-06")),
            (Value::from("43"), Value::from("2024-05-06")),
            (Value::from("42"), Value::from("2024-05-07")),
        ]
    );
    assert_eq!(written[0]["marked_by"], academy.instructor.id.as_str());
    assert_eq!(device.attendance_handler.sync_status().await.label, None);
}

#[tokio::test]
async fn replay_upserts_by_student_and_date() {
    let academy = Academy::seeded();
    let device = academy.signed_in(INSTRUCTOR_EMAIL).await;
    device.connectivity.set_online(false);

    device
        .attendance_handler
        .record_attendance(mark("42", "2024-05-06", "absent"))
        .await
        .unwrap();
    device
        .attendance_handler
        .record_attendance(mark("42", "2024-05-06", "late"))
        .await
        .unwrap();

    device.connectivity.set_online(true);
    device.attendance_handler.drain_offline_queue().await.unwrap();

    let written = academy.backend.rows("attendance");
    assert_eq!(written.len(), 1);
    assert_eq!(written[0]["status"], "late");
}

#[tokio::test]
async fn reconnect_drains_in_the_background() {
    let academy = Academy::seeded();
    let device = academy.signed_in(INSTRUCTOR_EMAIL).await;
    device.connectivity.set_online(false);
    let watcher = device.start_background_tasks();

    device
        .attendance_handler
        .record_attendance(mark("42", "2024-05-06", "present"))
        .await
        .unwrap();
    assert!(academy.backend.rows("attendance").is_empty());

    device.connectivity.set_online(true);
    tokio::time::timeout(Duration::from_secs(5), async {
        while academy.backend.rows("attendance").is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(device.attendance_handler.sync_status().await.pending, 0);
    watcher.abort();
}

#[tokio::test]
async fn queue_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!(
        "sqlite://{}?mode=rwc",
        dir.path().join("offline.db").display()
    );
    let first_mark = AttendanceMark::new(
        EntityId::new("42").unwrap(),
        NaiveDate::from_ymd_opt(2024, 5, 6).unwrap(),
        AttendanceStatus::Present,
    );

    {
        let pool = ConnectionPool::new(&url).await.unwrap();
        pool.migrate().await.unwrap();
        let store = SqliteQueueStore::new(pool.clone(), DEFAULT_QUEUE_KEY);
        store.append(&first_mark, Utc::now()).await.unwrap();
        pool.close().await;
    }

    let pool = ConnectionPool::new(&url).await.unwrap();
    pool.migrate().await.unwrap();
    let store = SqliteQueueStore::new(pool, DEFAULT_QUEUE_KEY);
    let entries = store.list().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].mark, first_mark);
}
