//! Record store contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist schema-validated record documents with per-app sequential
//!   numbering.
//! - Serve list queries (substring search, per-field sort, pagination) over
//!   bounded snapshots.
//! - Emit field-level history rows through the audit tracker inside the
//!   same transaction as the record write.
//!
//! # Invariants
//! - Payload validation happens before any SQL; a rejected payload leaves
//!   no partial rows.
//! - Number assignment is serialized per app through the `apps.record_seq`
//!   counter inside an immediate transaction; numbers are never reused.
//! - List ordering always ends with a `record_number` tie-break.

use crate::model::actor::Actor;
use crate::model::app::{AppId, Application};
use crate::model::field::{FieldDefinition, ValueKind};
use crate::model::record::{
    compare_values, diff_tracked_fields, validate_payload, FieldValue, Record, RecordData,
    RecordId, RecordPayload, ValidationError,
};
use crate::repo::app_repo::{get_app_on, list_fields_on};
use crate::repo::audit_repo::insert_history_rows;
use crate::repo::{
    ensure_schema_version, ensure_tables, int_to_bool, is_unique_violation, now_epoch_ms,
    parse_uuid, RepoError, RepoResult,
};
use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Upper bound on records handed to the view projector in one snapshot.
pub const PROJECTION_SNAPSHOT_CAP: u32 = 500;

const RECORD_SELECT_SQL: &str = "SELECT
    uuid,
    app_uuid,
    record_number,
    data,
    current_status_uuid,
    is_deleted,
    created_by,
    updated_by,
    created_at,
    updated_at
FROM records";

/// Sort request for record lists: a field code or `record_number`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSort {
    pub key: String,
    pub descending: bool,
}

/// Query options for record lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordListQuery {
    /// Case-insensitive substring matched against string-typed field values.
    pub search: Option<String>,
    pub sort: Option<RecordSort>,
    pub limit: Option<u32>,
    pub offset: u32,
    pub include_deleted: bool,
}

/// Outcome of a bulk delete batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkDeleteOutcome {
    pub deleted: u32,
    /// Ids that were unknown or already deleted; not an error.
    pub skipped: u32,
}

/// Outcome of a record update: the new state plus which fields changed.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordUpdate {
    pub record: Record,
    pub changed_fields: Vec<String>,
}

/// Repository interface for record persistence and queries.
pub trait RecordRepository {
    /// Validates and persists one record, assigning the next record number.
    fn create_record(
        &mut self,
        app_id: AppId,
        payload: &RecordPayload,
        actor: &Actor,
    ) -> RepoResult<Record>;
    /// Applies a partial update and captures history for changed fields.
    fn update_record(
        &mut self,
        record_id: RecordId,
        payload: &RecordPayload,
        actor: &Actor,
    ) -> RepoResult<RecordUpdate>;
    fn get_record(&self, record_id: RecordId, include_deleted: bool)
        -> RepoResult<Option<Record>>;
    fn list_records(&self, app_id: AppId, query: &RecordListQuery) -> RepoResult<Vec<Record>>;
    fn soft_delete_record(&self, record_id: RecordId) -> RepoResult<()>;
    /// Deletes a batch; gated by the app's `enable_bulk_delete` flag.
    fn bulk_delete(&mut self, app_id: AppId, ids: &[RecordId]) -> RepoResult<BulkDeleteOutcome>;
    /// Creates or updates by a natural key so overlapping ingestion retries
    /// never duplicate records.
    fn upsert_by_key(
        &mut self,
        app_id: AppId,
        key_field: &str,
        payload: &RecordPayload,
        actor: &Actor,
    ) -> RepoResult<Record>;
    /// Bounded snapshot for the view projector, capped at
    /// [`PROJECTION_SNAPSHOT_CAP`] records.
    fn snapshot_for_projection(&self, app_id: AppId) -> RepoResult<Vec<Record>>;
}

/// SQLite-backed record repository.
pub struct SqliteRecordRepository<'conn> {
    conn: &'conn mut Connection,
}

impl<'conn> SqliteRecordRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection.
    pub fn try_new(conn: &'conn mut Connection) -> RepoResult<Self> {
        ensure_schema_version(conn)?;
        ensure_tables(
            conn,
            &[
                ("apps", &["uuid", "record_seq", "enable_bulk_delete"]),
                ("app_fields", &["app_uuid", "field_code", "field_type"]),
                (
                    "records",
                    &["uuid", "app_uuid", "record_number", "data", "is_deleted"],
                ),
                ("record_history", &["record_uuid", "field_code"]),
            ],
        )?;
        Ok(Self { conn })
    }
}

impl RecordRepository for SqliteRecordRepository<'_> {
    fn create_record(
        &mut self,
        app_id: AppId,
        payload: &RecordPayload,
        actor: &Actor,
    ) -> RepoResult<Record> {
        let app = require_active_app(self.conn, app_id)?;
        let fields = list_fields_on(self.conn, app_id, true)?;
        let changes = validate_payload(&fields, payload, true)?;
        let data = changes.apply_to(&RecordData::new());
        let data_json = serde_json::to_string(&data)?;
        let now = now_epoch_ms();

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let record = insert_record_with_number(&tx, &app, &data, &data_json, actor, now)?;
        tx.commit()?;
        Ok(record)
    }

    fn update_record(
        &mut self,
        record_id: RecordId,
        payload: &RecordPayload,
        actor: &Actor,
    ) -> RepoResult<RecordUpdate> {
        let record = get_record_on(self.conn, record_id, false)?
            .ok_or(RepoError::RecordNotFound(record_id))?;
        let app = require_active_app(self.conn, record.app_id)?;
        let fields = list_fields_on(self.conn, record.app_id, true)?;

        let changes = validate_payload(&fields, payload, false)?;
        let new_data = changes.apply_to(&record.data);
        let diff = diff_tracked_fields(&fields, &record.data, &new_data);
        let data_json = serde_json::to_string(&new_data)?;
        let now = now_epoch_ms();

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            "UPDATE records
             SET data = ?1, updated_by = ?2, updated_at = ?3
             WHERE uuid = ?4
               AND is_deleted = 0;",
            params![
                data_json,
                actor.user_id.as_str(),
                now,
                record_id.to_string(),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::RecordNotFound(record_id));
        }

        if app.flags.enable_history && !diff.is_empty() {
            insert_history_rows(&tx, record_id, &diff, &actor.user_id, now)?;
        }
        tx.commit()?;

        let mut updated = record;
        updated.data = new_data;
        updated.updated_by = actor.user_id.clone();
        updated.updated_at = now;
        Ok(RecordUpdate {
            record: updated,
            changed_fields: diff.into_iter().map(|change| change.field_code).collect(),
        })
    }

    fn get_record(
        &self,
        record_id: RecordId,
        include_deleted: bool,
    ) -> RepoResult<Option<Record>> {
        get_record_on(self.conn, record_id, include_deleted)
    }

    fn list_records(&self, app_id: AppId, query: &RecordListQuery) -> RepoResult<Vec<Record>> {
        let Some(_app) = get_app_on(self.conn, app_id)? else {
            return Err(RepoError::AppNotFound(app_id));
        };
        let fields = list_fields_on(self.conn, app_id, true)?;
        let mut records = load_app_records(self.conn, app_id, &fields, query.include_deleted)?;

        if let Some(search) = query.search.as_deref() {
            let needle = search.to_lowercase();
            if !needle.is_empty() {
                records.retain(|record| record_matches(record, &needle));
            }
        }

        if let Some(sort) = query.sort.as_ref() {
            sort_records(&mut records, sort);
        }

        let offset = query.offset as usize;
        if offset >= records.len() {
            return Ok(Vec::new());
        }
        let mut page: Vec<Record> = records.split_off(offset);
        if let Some(limit) = query.limit {
            page.truncate(limit as usize);
        }
        Ok(page)
    }

    fn soft_delete_record(&self, record_id: RecordId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE records
             SET is_deleted = 1, updated_at = ?1
             WHERE uuid = ?2;",
            params![now_epoch_ms(), record_id.to_string()],
        )?;
        if changed == 0 {
            return Err(RepoError::RecordNotFound(record_id));
        }
        Ok(())
    }

    fn bulk_delete(&mut self, app_id: AppId, ids: &[RecordId]) -> RepoResult<BulkDeleteOutcome> {
        let app = get_app_on(self.conn, app_id)?.ok_or(RepoError::AppNotFound(app_id))?;
        if !app.flags.enable_bulk_delete {
            return Err(RepoError::PermissionDenied(format!(
                "bulk delete is disabled for app `{}`",
                app.code
            )));
        }

        let now = now_epoch_ms();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut outcome = BulkDeleteOutcome::default();
        for record_id in ids {
            let changed = tx.execute(
                "UPDATE records
                 SET is_deleted = 1, updated_at = ?1
                 WHERE uuid = ?2
                   AND app_uuid = ?3
                   AND is_deleted = 0;",
                params![now, record_id.to_string(), app_id.to_string()],
            )?;
            if changed == 1 {
                outcome.deleted += 1;
            } else {
                outcome.skipped += 1;
            }
        }
        tx.commit()?;
        Ok(outcome)
    }

    fn upsert_by_key(
        &mut self,
        app_id: AppId,
        key_field: &str,
        payload: &RecordPayload,
        actor: &Actor,
    ) -> RepoResult<Record> {
        let fields = list_fields_on(self.conn, app_id, false)?;
        let Some(key_def) = fields
            .iter()
            .find(|field| field.field_code == key_field && field.field_type.is_input())
        else {
            return Err(ValidationError::UnknownField(key_field.to_string()).into());
        };
        let Some(raw_key) = payload.get(key_field) else {
            return Err(ValidationError::MissingRequired(key_field.to_string()).into());
        };
        let key_json = crate::model::record::coerce_value(key_def, raw_key)?.to_json();

        let all_fields = list_fields_on(self.conn, app_id, true)?;
        let existing = load_app_records(self.conn, app_id, &all_fields, false)?
            .into_iter()
            .find(|record| {
                record
                    .data
                    .get(key_field)
                    .is_some_and(|value| value.to_json() == key_json)
            });

        match existing {
            Some(record) => Ok(self.update_record(record.id, payload, actor)?.record),
            None => self.create_record(app_id, payload, actor),
        }
    }

    fn snapshot_for_projection(&self, app_id: AppId) -> RepoResult<Vec<Record>> {
        let Some(_app) = get_app_on(self.conn, app_id)? else {
            return Err(RepoError::AppNotFound(app_id));
        };
        let fields = list_fields_on(self.conn, app_id, true)?;
        let mut records = load_app_records(self.conn, app_id, &fields, false)?;
        records.truncate(PROJECTION_SNAPSHOT_CAP as usize);
        Ok(records)
    }
}

fn require_active_app(conn: &Connection, app_id: AppId) -> RepoResult<Application> {
    match get_app_on(conn, app_id)? {
        Some(app) if app.is_active() => Ok(app),
        _ => Err(RepoError::AppNotFound(app_id)),
    }
}

/// Increments the per-app counter and inserts the row, retrying the
/// numbering step once when another writer took the number first.
fn insert_record_with_number(
    tx: &Transaction<'_>,
    app: &Application,
    data: &RecordData,
    data_json: &str,
    actor: &Actor,
    now: i64,
) -> RepoResult<Record> {
    let mut attempts = 0;
    loop {
        let record_number = next_record_number(tx, app.id)?;
        let record_id = Uuid::new_v4();
        let inserted = tx.execute(
            "INSERT INTO records (
                uuid,
                app_uuid,
                record_number,
                data,
                current_status_uuid,
                is_deleted,
                created_by,
                updated_by,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, NULL, 0, ?5, ?6, ?7, ?8);",
            params![
                record_id.to_string(),
                app.id.to_string(),
                record_number,
                data_json,
                actor.user_id.as_str(),
                actor.user_id.as_str(),
                now,
                now,
            ],
        );

        match inserted {
            Ok(_) => {
                return Ok(Record {
                    id: record_id,
                    app_id: app.id,
                    record_number,
                    data: data.clone(),
                    current_status_id: None,
                    is_deleted: false,
                    created_by: actor.user_id.clone(),
                    updated_by: actor.user_id.clone(),
                    created_at: now,
                    updated_at: now,
                })
            }
            Err(err) if is_unique_violation(&err) && attempts == 0 => {
                attempts += 1;
            }
            Err(err) if is_unique_violation(&err) => {
                return Err(RepoError::ConcurrencyConflict(format!(
                    "record number {record_number} already taken in app `{}` after retry",
                    app.code
                )))
            }
            Err(err) => return Err(err.into()),
        }
    }
}

fn next_record_number(tx: &Transaction<'_>, app_id: AppId) -> RepoResult<i64> {
    let changed = tx.execute(
        "UPDATE apps SET record_seq = record_seq + 1 WHERE uuid = ?1;",
        [app_id.to_string()],
    )?;
    if changed == 0 {
        return Err(RepoError::AppNotFound(app_id));
    }
    let number: i64 = tx.query_row(
        "SELECT record_seq FROM apps WHERE uuid = ?1;",
        [app_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(number)
}

pub(crate) fn get_record_on(
    conn: &Connection,
    record_id: RecordId,
    include_deleted: bool,
) -> RepoResult<Option<Record>> {
    let mut stmt = conn.prepare(&format!(
        "{RECORD_SELECT_SQL}
         WHERE uuid = ?1
           AND (?2 = 1 OR is_deleted = 0);"
    ))?;
    let mut rows = stmt.query(params![
        record_id.to_string(),
        i64::from(include_deleted)
    ])?;
    let Some(row) = rows.next()? else {
        return Ok(None);
    };

    let app_uuid_text: String = row.get("app_uuid")?;
    let app_id = parse_uuid(&app_uuid_text, "records.app_uuid")?;
    let fields = list_fields_on(conn, app_id, true)?;
    Ok(Some(parse_record_row(row, &fields)?))
}

pub(crate) fn load_app_records(
    conn: &Connection,
    app_id: AppId,
    fields: &[FieldDefinition],
    include_deleted: bool,
) -> RepoResult<Vec<Record>> {
    let mut sql = format!("{RECORD_SELECT_SQL} WHERE app_uuid = ?1");
    if !include_deleted {
        sql.push_str(" AND is_deleted = 0");
    }
    sql.push_str(" ORDER BY record_number ASC;");

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([app_id.to_string()])?;
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        records.push(parse_record_row(row, fields)?);
    }
    Ok(records)
}

fn parse_record_row(row: &Row<'_>, fields: &[FieldDefinition]) -> RepoResult<Record> {
    let uuid_text: String = row.get("uuid")?;
    let app_uuid_text: String = row.get("app_uuid")?;
    let data_text: String = row.get("data")?;

    let current_status_id = match row.get::<_, Option<String>>("current_status_uuid")? {
        Some(value) => Some(parse_uuid(&value, "records.current_status_uuid")?),
        None => None,
    };

    Ok(Record {
        id: parse_uuid(&uuid_text, "records.uuid")?,
        app_id: parse_uuid(&app_uuid_text, "records.app_uuid")?,
        record_number: row.get("record_number")?,
        data: data_from_json(fields, &data_text)?,
        current_status_id,
        is_deleted: int_to_bool(row.get("is_deleted")?, "records.is_deleted")?,
        created_by: row.get("created_by")?,
        updated_by: row.get("updated_by")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

/// Rebuilds a typed document from the stored JSON, using field definitions
/// where available and a lenient shape-based fallback for orphaned keys.
fn data_from_json(fields: &[FieldDefinition], text: &str) -> RepoResult<RecordData> {
    let value: Value = serde_json::from_str(text)
        .map_err(|err| RepoError::InvalidData(format!("invalid record data JSON: {err}")))?;
    let Value::Object(map) = value else {
        return Err(RepoError::InvalidData(
            "record data JSON must be an object".to_string(),
        ));
    };

    let by_code: BTreeMap<&str, &FieldDefinition> = fields
        .iter()
        .map(|field| (field.field_code.as_str(), field))
        .collect();

    let mut data = RecordData::new();
    for (key, raw) in &map {
        let value = match by_code.get(key.as_str()) {
            Some(field) => typed_from_stored(field, raw),
            None => FieldValue::from_stored(raw),
        };
        if let Some(value) = value {
            data.insert(key.clone(), value);
        }
    }
    Ok(data)
}

fn typed_from_stored(field: &FieldDefinition, raw: &Value) -> Option<FieldValue> {
    match (field.field_type.value_kind(), raw) {
        (ValueKind::Date, Value::String(text)) => Some(FieldValue::Date(text.clone())),
        _ => FieldValue::from_stored(raw),
    }
}

fn record_matches(record: &Record, needle: &str) -> bool {
    record.data.values().any(|value| match value {
        FieldValue::Text(text) | FieldValue::Date(text) => {
            text.to_lowercase().contains(needle)
        }
        FieldValue::List(items) => items
            .iter()
            .any(|item| item.to_lowercase().contains(needle)),
        FieldValue::Number(_) | FieldValue::Bool(_) => false,
    })
}

fn sort_records(records: &mut [Record], sort: &RecordSort) {
    records.sort_by(|left, right| {
        let primary = if sort.key == "record_number" {
            left.record_number.cmp(&right.record_number)
        } else {
            compare_values(left.data.get(&sort.key), right.data.get(&sort.key))
        };
        let primary = if sort.descending {
            primary.reverse()
        } else {
            primary
        };
        primary.then(left.record_number.cmp(&right.record_number))
    });
}
