use opsboard_core::db::{open_db, open_db_in_memory};
use opsboard_core::{
    Actor, AppFlags, AppKind, AppRepository, Application, FieldValidation, FieldValue, NewApp,
    NewField, RecordListQuery, RecordPayload, RecordRepository, RecordSort, RepoError,
    SqliteAppRepository, SqliteRecordRepository, ValidationError, PROJECTION_SNAPSHOT_CAP,
};
use rusqlite::Connection;
use std::collections::HashSet;
use std::thread;

fn payload(value: serde_json::Value) -> RecordPayload {
    value.as_object().expect("payload must be an object").clone()
}

fn actor() -> Actor {
    Actor::new("alice")
}

fn task_tracker(conn: &mut Connection) -> Application {
    let repo = SqliteAppRepository::try_new(conn).unwrap();
    let app = repo
        .create_app(&NewApp::new("task_tracker", "Task Tracker", AppKind::Dynamic))
        .unwrap();
    let mut title = NewField::new(app.id, "title", "text", "Title");
    title.validation = FieldValidation {
        required: true,
        ..FieldValidation::default()
    };
    repo.define_field(&title).unwrap();
    let mut due = NewField::new(app.id, "due", "date", "Due");
    due.display_order = 1;
    repo.define_field(&due).unwrap();
    let mut points = NewField::new(app.id, "points", "number", "Points");
    points.display_order = 2;
    repo.define_field(&points).unwrap();
    repo.update_app_flags(
        app.id,
        &AppFlags {
            enable_bulk_delete: true,
            enable_history: true,
            enable_comments: true,
        },
    )
    .unwrap();
    repo.get_app(app.id).unwrap().unwrap()
}

#[test]
fn record_numbers_survive_deletes_without_reuse() {
    let mut conn = open_db_in_memory().unwrap();
    let app = task_tracker(&mut conn);
    let mut repo = SqliteRecordRepository::try_new(&mut conn).unwrap();

    let first = repo
        .create_record(
            app.id,
            &payload(serde_json::json!({"title": "A", "due": "2025-01-10"})),
            &actor(),
        )
        .unwrap();
    assert_eq!(first.record_number, 1);

    let second = repo
        .create_record(app.id, &payload(serde_json::json!({"title": "B"})), &actor())
        .unwrap();
    assert_eq!(second.record_number, 2);

    let outcome = repo.bulk_delete(app.id, &[first.id]).unwrap();
    assert_eq!(outcome.deleted, 1);

    let remaining = repo.list_records(app.id, &RecordListQuery::default()).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, second.id);

    let third = repo
        .create_record(app.id, &payload(serde_json::json!({"title": "C"})), &actor())
        .unwrap();
    assert_eq!(third.record_number, 3);
}

#[test]
fn create_rejects_unknown_missing_and_mistyped_fields() {
    let mut conn = open_db_in_memory().unwrap();
    let app = task_tracker(&mut conn);
    let mut repo = SqliteRecordRepository::try_new(&mut conn).unwrap();

    let unknown = repo
        .create_record(
            app.id,
            &payload(serde_json::json!({"title": "A", "ghost": 1})),
            &actor(),
        )
        .unwrap_err();
    assert!(matches!(
        unknown,
        RepoError::Validation(ValidationError::UnknownField(_))
    ));

    let missing = repo
        .create_record(app.id, &payload(serde_json::json!({"due": "2025-01-10"})), &actor())
        .unwrap_err();
    assert!(matches!(
        missing,
        RepoError::Validation(ValidationError::MissingRequired(_))
    ));

    let mistyped = repo
        .create_record(
            app.id,
            &payload(serde_json::json!({"title": "A", "due": "not a date"})),
            &actor(),
        )
        .unwrap_err();
    assert!(matches!(
        mistyped,
        RepoError::Validation(ValidationError::TypeMismatch { .. })
    ));

    // Nothing was persisted by the failed attempts.
    let records = repo.list_records(app.id, &RecordListQuery::default()).unwrap();
    assert!(records.is_empty());
}

#[test]
fn number_coercion_accepts_numeric_strings() {
    let mut conn = open_db_in_memory().unwrap();
    let app = task_tracker(&mut conn);
    let mut repo = SqliteRecordRepository::try_new(&mut conn).unwrap();

    let record = repo
        .create_record(
            app.id,
            &payload(serde_json::json!({"title": "A", "points": "7"})),
            &actor(),
        )
        .unwrap();
    assert_eq!(record.data.get("points"), Some(&FieldValue::Number(7.0)));
}

#[test]
fn list_supports_substring_search_over_string_fields() {
    let mut conn = open_db_in_memory().unwrap();
    let app = task_tracker(&mut conn);
    let mut repo = SqliteRecordRepository::try_new(&mut conn).unwrap();

    repo.create_record(
        app.id,
        &payload(serde_json::json!({"title": "Fix login page"})),
        &actor(),
    )
    .unwrap();
    repo.create_record(
        app.id,
        &payload(serde_json::json!({"title": "Ship dashboard"})),
        &actor(),
    )
    .unwrap();

    let query = RecordListQuery {
        search: Some("LOGIN".to_string()),
        ..RecordListQuery::default()
    };
    let hits = repo.list_records(app.id, &query).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(
        hits[0].data.get("title"),
        Some(&FieldValue::Text("Fix login page".to_string()))
    );
}

#[test]
fn list_sorts_by_field_with_record_number_tie_break() {
    let mut conn = open_db_in_memory().unwrap();
    let app = task_tracker(&mut conn);
    let mut repo = SqliteRecordRepository::try_new(&mut conn).unwrap();

    for (title, points) in [("a", 5.0), ("b", 1.0), ("c", 5.0), ("d", 3.0)] {
        repo.create_record(
            app.id,
            &payload(serde_json::json!({"title": title, "points": points})),
            &actor(),
        )
        .unwrap();
    }

    let query = RecordListQuery {
        sort: Some(RecordSort {
            key: "points".to_string(),
            descending: true,
        }),
        ..RecordListQuery::default()
    };
    let numbers: Vec<i64> = repo
        .list_records(app.id, &query)
        .unwrap()
        .into_iter()
        .map(|record| record.record_number)
        .collect();
    // points: 5 (records 1 and 3, tie broken by number), 3, 1.
    assert_eq!(numbers, vec![1, 3, 4, 2]);
}

#[test]
fn list_pagination_is_stable() {
    let mut conn = open_db_in_memory().unwrap();
    let app = task_tracker(&mut conn);
    let mut repo = SqliteRecordRepository::try_new(&mut conn).unwrap();

    for index in 0..5 {
        repo.create_record(
            app.id,
            &payload(serde_json::json!({"title": format!("task {index}")})),
            &actor(),
        )
        .unwrap();
    }

    let query = RecordListQuery {
        limit: Some(2),
        offset: 1,
        ..RecordListQuery::default()
    };
    let page = repo.list_records(app.id, &query).unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].record_number, 2);
    assert_eq!(page[1].record_number, 3);

    let past_end = RecordListQuery {
        offset: 99,
        ..RecordListQuery::default()
    };
    assert!(repo.list_records(app.id, &past_end).unwrap().is_empty());
}

#[test]
fn bulk_delete_is_gated_by_the_app_flag() {
    let mut conn = open_db_in_memory().unwrap();
    let app = task_tracker(&mut conn);
    {
        let repo = SqliteAppRepository::try_new(&mut conn).unwrap();
        repo.update_app_flags(
            app.id,
            &AppFlags {
                enable_bulk_delete: false,
                enable_history: true,
                enable_comments: true,
            },
        )
        .unwrap();
    }

    let mut repo = SqliteRecordRepository::try_new(&mut conn).unwrap();
    let record = repo
        .create_record(app.id, &payload(serde_json::json!({"title": "A"})), &actor())
        .unwrap();

    let denied = repo.bulk_delete(app.id, &[record.id]).unwrap_err();
    assert!(matches!(denied, RepoError::PermissionDenied(_)));
}

#[test]
fn bulk_delete_counts_skipped_ids_instead_of_failing() {
    let mut conn = open_db_in_memory().unwrap();
    let app = task_tracker(&mut conn);
    let mut repo = SqliteRecordRepository::try_new(&mut conn).unwrap();

    let record_a = repo
        .create_record(app.id, &payload(serde_json::json!({"title": "A"})), &actor())
        .unwrap();
    let record_b = repo
        .create_record(app.id, &payload(serde_json::json!({"title": "B"})), &actor())
        .unwrap();

    let first = repo.bulk_delete(app.id, &[record_a.id, record_b.id]).unwrap();
    assert_eq!((first.deleted, first.skipped), (2, 0));

    // Deleting again plus an unknown id: all skipped, no error.
    let retry = repo
        .bulk_delete(app.id, &[record_a.id, uuid::Uuid::new_v4()])
        .unwrap();
    assert_eq!((retry.deleted, retry.skipped), (0, 2));
}

#[test]
fn upsert_by_key_updates_instead_of_duplicating() {
    let mut conn = open_db_in_memory().unwrap();
    let app = task_tracker(&mut conn);
    let mut repo = SqliteRecordRepository::try_new(&mut conn).unwrap();

    let first = repo
        .upsert_by_key(
            app.id,
            "title",
            &payload(serde_json::json!({"title": "import-1", "points": 1})),
            &actor(),
        )
        .unwrap();
    assert_eq!(first.record_number, 1);

    // Overlapping retry of the same ingestion batch.
    let second = repo
        .upsert_by_key(
            app.id,
            "title",
            &payload(serde_json::json!({"title": "import-1", "points": 2})),
            &actor(),
        )
        .unwrap();
    assert_eq!(second.id, first.id);
    assert_eq!(second.record_number, 1);
    assert_eq!(second.data.get("points"), Some(&FieldValue::Number(2.0)));

    let records = repo.list_records(app.id, &RecordListQuery::default()).unwrap();
    assert_eq!(records.len(), 1);
}

#[test]
fn projection_snapshot_excludes_deleted_and_keeps_number_order() {
    let mut conn = open_db_in_memory().unwrap();
    let app = task_tracker(&mut conn);
    let mut repo = SqliteRecordRepository::try_new(&mut conn).unwrap();

    let record_a = repo
        .create_record(app.id, &payload(serde_json::json!({"title": "A"})), &actor())
        .unwrap();
    repo.create_record(app.id, &payload(serde_json::json!({"title": "B"})), &actor())
        .unwrap();
    repo.create_record(app.id, &payload(serde_json::json!({"title": "C"})), &actor())
        .unwrap();
    repo.soft_delete_record(record_a.id).unwrap();

    let snapshot = repo.snapshot_for_projection(app.id).unwrap();
    let numbers: Vec<i64> = snapshot.iter().map(|record| record.record_number).collect();
    assert_eq!(numbers, vec![2, 3]);
    assert!(snapshot.len() <= PROJECTION_SNAPSHOT_CAP as usize);
}

#[test]
fn concurrent_creates_assign_distinct_increasing_numbers() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("numbering.db");

    let app_id = {
        let mut conn = open_db(&db_path).unwrap();
        task_tracker(&mut conn).id
    };

    let threads = 4;
    let per_thread = 5;
    let mut handles = Vec::new();
    for worker in 0..threads {
        let db_path = db_path.clone();
        handles.push(thread::spawn(move || {
            let mut conn = open_db(&db_path).unwrap();
            let mut repo = SqliteRecordRepository::try_new(&mut conn).unwrap();
            let worker_actor = Actor::new(format!("worker-{worker}"));
            let mut numbers = Vec::new();
            for index in 0..per_thread {
                let record = repo
                    .create_record(
                        app_id,
                        &payload(serde_json::json!({
                            "title": format!("w{worker}-{index}")
                        })),
                        &worker_actor,
                    )
                    .unwrap();
                numbers.push(record.record_number);
            }
            numbers
        }));
    }

    let mut all_numbers = Vec::new();
    for handle in handles {
        all_numbers.extend(handle.join().unwrap());
    }

    let distinct: HashSet<i64> = all_numbers.iter().copied().collect();
    assert_eq!(distinct.len(), threads * per_thread);
    assert_eq!(*distinct.iter().min().unwrap(), 1);
    assert_eq!(
        *distinct.iter().max().unwrap(),
        (threads * per_thread) as i64
    );
}
