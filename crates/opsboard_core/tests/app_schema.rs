use opsboard_core::db::open_db_in_memory;
use opsboard_core::model::app::DefinitionError;
use opsboard_core::{
    Actor, AppFlags, AppKind, AppLifecycle, AppRepository, Application, AuditRepository, NewApp,
    NewField, RecordRepository, RepoError, SqliteAppRepository, SqliteAuditRepository,
    SqliteRecordRepository,
};
use rusqlite::Connection;

fn create_app(conn: &mut Connection, code: &str) -> Application {
    let repo = SqliteAppRepository::try_new(conn).unwrap();
    repo.create_app(&NewApp::new(code, code.to_uppercase(), AppKind::Dynamic))
        .unwrap()
}

#[test]
fn create_app_rejects_duplicate_and_malformed_codes() {
    let mut conn = open_db_in_memory().unwrap();
    create_app(&mut conn, "task_tracker");

    let repo = SqliteAppRepository::try_new(&mut conn).unwrap();
    let duplicate = repo
        .create_app(&NewApp::new("task_tracker", "Again", AppKind::Dynamic))
        .unwrap_err();
    assert!(matches!(duplicate, RepoError::DuplicateAppCode(_)));

    let shouting = repo
        .create_app(&NewApp::new("TASK_TRACKER", "Shouting", AppKind::Dynamic))
        .unwrap_err();
    assert!(matches!(
        shouting,
        RepoError::Definition(DefinitionError::InvalidCode(_))
    ));
}

#[test]
fn app_lookup_by_code_is_case_insensitive() {
    let mut conn = open_db_in_memory().unwrap();
    let app = create_app(&mut conn, "task_tracker");

    let repo = SqliteAppRepository::try_new(&mut conn).unwrap();
    let found = repo.get_app_by_code("TASK_TRACKER").unwrap().unwrap();
    assert_eq!(found.id, app.id);
}

#[test]
fn define_field_rejects_unknown_types_and_duplicate_codes() {
    let mut conn = open_db_in_memory().unwrap();
    let app = create_app(&mut conn, "task_tracker");

    let repo = SqliteAppRepository::try_new(&mut conn).unwrap();
    repo.define_field(&NewField::new(app.id, "title", "text", "Title"))
        .unwrap();

    let unknown = repo
        .define_field(&NewField::new(app.id, "owner", "lookup", "Owner"))
        .unwrap_err();
    assert!(matches!(unknown, RepoError::InvalidFieldType(_)));

    let duplicate = repo
        .define_field(&NewField::new(app.id, "title", "text", "Title 2"))
        .unwrap_err();
    assert!(matches!(duplicate, RepoError::DuplicateFieldCode { .. }));
}

#[test]
fn deactivated_fields_are_kept_but_hidden_from_active_listing() {
    let mut conn = open_db_in_memory().unwrap();
    let app = create_app(&mut conn, "task_tracker");

    let repo = SqliteAppRepository::try_new(&mut conn).unwrap();
    let title = repo
        .define_field(&NewField::new(app.id, "title", "text", "Title"))
        .unwrap();
    repo.define_field(&NewField::new(app.id, "due", "date", "Due"))
        .unwrap();

    repo.deactivate_field(title.id).unwrap();
    let active = repo.list_fields(app.id, false).unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].field_code, "due");

    let all = repo.list_fields(app.id, true).unwrap();
    assert_eq!(all.len(), 2);

    repo.reactivate_field(title.id).unwrap();
    assert_eq!(repo.list_fields(app.id, false).unwrap().len(), 2);
}

#[test]
fn reorder_fields_reassigns_positions_atomically() {
    let mut conn = open_db_in_memory().unwrap();
    let app = create_app(&mut conn, "task_tracker");

    let mut repo = SqliteAppRepository::try_new(&mut conn).unwrap();
    let title = repo
        .define_field(&NewField::new(app.id, "title", "text", "Title"))
        .unwrap();
    let due = repo
        .define_field(&NewField::new(app.id, "due", "date", "Due"))
        .unwrap();
    let done = repo
        .define_field(&NewField::new(app.id, "done", "checkbox", "Done"))
        .unwrap();

    repo.reorder_fields(app.id, &[done.id, title.id, due.id]).unwrap();
    let codes: Vec<String> = repo
        .list_fields(app.id, false)
        .unwrap()
        .into_iter()
        .map(|field| field.field_code)
        .collect();
    assert_eq!(codes, vec!["done", "title", "due"]);
}

#[test]
fn reorder_fields_rejects_partial_or_foreign_orderings() {
    let mut conn = open_db_in_memory().unwrap();
    let app = create_app(&mut conn, "task_tracker");

    let mut repo = SqliteAppRepository::try_new(&mut conn).unwrap();
    let title = repo
        .define_field(&NewField::new(app.id, "title", "text", "Title"))
        .unwrap();
    let mut due = NewField::new(app.id, "due", "date", "Due");
    due.display_order = 1;
    repo.define_field(&due).unwrap();

    let partial = repo.reorder_fields(app.id, &[title.id]).unwrap_err();
    assert!(matches!(partial, RepoError::InvalidData(_)));

    // Failed reorder must leave the original ordering intact.
    let codes: Vec<String> = repo
        .list_fields(app.id, false)
        .unwrap()
        .into_iter()
        .map(|field| field.field_code)
        .collect();
    assert_eq!(codes, vec!["title", "due"]);
}

#[test]
fn app_flags_round_trip() {
    let mut conn = open_db_in_memory().unwrap();
    let app = create_app(&mut conn, "task_tracker");

    let repo = SqliteAppRepository::try_new(&mut conn).unwrap();
    let flags = AppFlags {
        enable_bulk_delete: true,
        enable_history: false,
        enable_comments: false,
    };
    repo.update_app_flags(app.id, &flags).unwrap();

    let reloaded = repo.get_app(app.id).unwrap().unwrap();
    assert_eq!(reloaded.flags, flags);
}

#[test]
fn soft_deleted_apps_can_be_restored() {
    let mut conn = open_db_in_memory().unwrap();
    let app = create_app(&mut conn, "task_tracker");

    let repo = SqliteAppRepository::try_new(&mut conn).unwrap();
    repo.soft_delete_app(app.id).unwrap();
    assert_eq!(
        repo.get_app(app.id).unwrap().unwrap().lifecycle,
        AppLifecycle::SoftDeleted
    );
    assert!(repo.list_apps(false).unwrap().is_empty());
    assert_eq!(repo.list_apps(true).unwrap().len(), 1);

    repo.restore_app(app.id).unwrap();
    assert_eq!(
        repo.get_app(app.id).unwrap().unwrap().lifecycle,
        AppLifecycle::Active
    );
}

#[test]
fn purge_removes_schema_and_records_but_keeps_audit_rows() {
    let mut conn = open_db_in_memory().unwrap();
    let app = create_app(&mut conn, "task_tracker");
    let actor = Actor::new("alice");

    let record_id = {
        let repo = SqliteAppRepository::try_new(&mut conn).unwrap();
        repo.define_field(&NewField::new(app.id, "title", "text", "Title"))
            .unwrap();
        drop(repo);

        let mut records = SqliteRecordRepository::try_new(&mut conn).unwrap();
        let payload = serde_json::json!({"title": "first"});
        let record = records
            .create_record(app.id, payload.as_object().unwrap(), &actor)
            .unwrap();
        records
            .update_record(
                record.id,
                serde_json::json!({"title": "second"}).as_object().unwrap(),
                &actor,
            )
            .unwrap();
        record.id
    };

    {
        let mut repo = SqliteAppRepository::try_new(&mut conn).unwrap();
        repo.purge_app(app.id).unwrap();
        assert_eq!(
            repo.get_app(app.id).unwrap().unwrap().lifecycle,
            AppLifecycle::Purged
        );
        assert!(repo.list_apps(true).unwrap().is_empty());
        assert!(repo.list_fields(app.id, true).unwrap().is_empty());
    }

    let field_rows: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM records WHERE app_uuid = ?1;",
            [app.id.to_string()],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(field_rows, 0);

    let audit = SqliteAuditRepository::try_new(&conn).unwrap();
    let history = audit.history_for_record(record_id).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].field_code, "title");
}
