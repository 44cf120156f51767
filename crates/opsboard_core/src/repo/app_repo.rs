//! Schema registry contracts and SQLite implementation.
//!
//! # Responsibility
//! - Own app and field definition persistence: the schema every other
//!   component validates against.
//! - Enforce code uniqueness, the closed field type set, and the tri-state
//!   app lifecycle.
//!
//! # Invariants
//! - App codes are checked for format and uniqueness at creation only and
//!   never change afterwards.
//! - Fields are soft-deactivated, never hard-deleted; purge is the only
//!   operation that removes schema rows.
//! - `reorder_fields` reassigns display order atomically or not at all.

use crate::model::app::{
    AppFlags, AppId, AppKind, AppLifecycle, Application, DefinitionError, NewApp,
};
use crate::model::field::{FieldDefinition, FieldId, FieldType, NewField};
use crate::repo::{
    bool_to_int, ensure_schema_version, ensure_tables, int_to_bool, is_unique_violation,
    now_epoch_ms, parse_uuid, RepoError, RepoResult,
};
use rusqlite::{params, Connection, Row, TransactionBehavior};
use std::collections::BTreeSet;
use uuid::Uuid;

const APP_SELECT_SQL: &str = "SELECT
    uuid,
    code,
    name,
    kind,
    icon,
    color,
    enable_bulk_delete,
    enable_history,
    enable_comments,
    lifecycle,
    record_seq,
    created_at,
    updated_at
FROM apps";

const FIELD_SELECT_SQL: &str = "SELECT
    uuid,
    app_uuid,
    field_code,
    field_type,
    label,
    validation,
    display_order,
    is_active
FROM app_fields";

/// Repository interface for the schema registry.
pub trait AppRepository {
    /// Creates one app; the only point where the code format is validated.
    fn create_app(&self, draft: &NewApp) -> RepoResult<Application>;
    fn get_app(&self, app_id: AppId) -> RepoResult<Option<Application>>;
    fn get_app_by_code(&self, code: &str) -> RepoResult<Option<Application>>;
    /// Lists apps; soft-deleted apps only when `include_deleted`, purged
    /// tombstones never.
    fn list_apps(&self, include_deleted: bool) -> RepoResult<Vec<Application>>;
    fn update_app_flags(&self, app_id: AppId, flags: &AppFlags) -> RepoResult<()>;
    /// Defines one field; rejects unknown types and duplicate codes.
    fn define_field(&self, draft: &NewField) -> RepoResult<FieldDefinition>;
    fn get_field(&self, field_id: FieldId) -> RepoResult<Option<FieldDefinition>>;
    fn list_fields(&self, app_id: AppId, include_inactive: bool)
        -> RepoResult<Vec<FieldDefinition>>;
    fn deactivate_field(&self, field_id: FieldId) -> RepoResult<()>;
    fn reactivate_field(&self, field_id: FieldId) -> RepoResult<()>;
    /// Reassigns display order for the full active field set atomically.
    fn reorder_fields(&mut self, app_id: AppId, ordering: &[FieldId]) -> RepoResult<()>;
    fn soft_delete_app(&self, app_id: AppId) -> RepoResult<()>;
    fn restore_app(&self, app_id: AppId) -> RepoResult<()>;
    /// Irreversibly removes schema, records, views and process
    /// configuration; audit rows survive, the app row stays as a tombstone.
    fn purge_app(&mut self, app_id: AppId) -> RepoResult<()>;
}

/// SQLite-backed schema registry repository.
pub struct SqliteAppRepository<'conn> {
    conn: &'conn mut Connection,
}

impl<'conn> SqliteAppRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection.
    pub fn try_new(conn: &'conn mut Connection) -> RepoResult<Self> {
        ensure_schema_version(conn)?;
        ensure_tables(
            conn,
            &[
                ("apps", &["uuid", "code", "lifecycle", "record_seq"]),
                ("app_fields", &["uuid", "app_uuid", "field_code", "is_active"]),
            ],
        )?;
        Ok(Self { conn })
    }
}

impl AppRepository for SqliteAppRepository<'_> {
    fn create_app(&self, draft: &NewApp) -> RepoResult<Application> {
        draft.validate()?;

        let now = now_epoch_ms();
        let app = Application {
            id: Uuid::new_v4(),
            code: draft.code.clone(),
            name: draft.name.clone(),
            kind: draft.kind,
            icon: draft.icon.clone(),
            color: draft.color.clone(),
            flags: AppFlags::default(),
            lifecycle: AppLifecycle::Active,
            record_seq: 0,
            created_at: now,
            updated_at: now,
        };

        let inserted = self.conn.execute(
            "INSERT INTO apps (
                uuid,
                code,
                name,
                kind,
                icon,
                color,
                enable_bulk_delete,
                enable_history,
                enable_comments,
                lifecycle,
                record_seq,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13);",
            params![
                app.id.to_string(),
                app.code.as_str(),
                app.name.as_str(),
                app.kind.as_str(),
                app.icon.as_deref(),
                app.color.as_deref(),
                bool_to_int(app.flags.enable_bulk_delete),
                bool_to_int(app.flags.enable_history),
                bool_to_int(app.flags.enable_comments),
                app.lifecycle.as_str(),
                app.record_seq,
                app.created_at,
                app.updated_at,
            ],
        );

        match inserted {
            Ok(_) => Ok(app),
            Err(err) if is_unique_violation(&err) => {
                Err(RepoError::DuplicateAppCode(draft.code.clone()))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn get_app(&self, app_id: AppId) -> RepoResult<Option<Application>> {
        get_app_on(self.conn, app_id)
    }

    fn get_app_by_code(&self, code: &str) -> RepoResult<Option<Application>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{APP_SELECT_SQL} WHERE code = ?1 COLLATE NOCASE;"))?;
        let mut rows = stmt.query([code])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_app_row(row)?));
        }
        Ok(None)
    }

    fn list_apps(&self, include_deleted: bool) -> RepoResult<Vec<Application>> {
        let mut sql = format!("{APP_SELECT_SQL} WHERE lifecycle != 'purged'");
        if !include_deleted {
            sql.push_str(" AND lifecycle = 'active'");
        }
        sql.push_str(" ORDER BY code ASC;");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut apps = Vec::new();
        while let Some(row) = rows.next()? {
            apps.push(parse_app_row(row)?);
        }
        Ok(apps)
    }

    fn update_app_flags(&self, app_id: AppId, flags: &AppFlags) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE apps
             SET
                enable_bulk_delete = ?1,
                enable_history = ?2,
                enable_comments = ?3,
                updated_at = ?4
             WHERE uuid = ?5
               AND lifecycle = 'active';",
            params![
                bool_to_int(flags.enable_bulk_delete),
                bool_to_int(flags.enable_history),
                bool_to_int(flags.enable_comments),
                now_epoch_ms(),
                app_id.to_string(),
            ],
        )?;

        if changed == 0 {
            return Err(RepoError::AppNotFound(app_id));
        }
        Ok(())
    }

    fn define_field(&self, draft: &NewField) -> RepoResult<FieldDefinition> {
        let Some(field_type) = FieldType::parse(draft.field_type.as_str()) else {
            return Err(RepoError::InvalidFieldType(draft.field_type.clone()));
        };
        if !crate::model::app::code_is_valid(&draft.field_code) {
            return Err(DefinitionError::InvalidCode(draft.field_code.clone()).into());
        }
        if draft.label.trim().is_empty() {
            return Err(DefinitionError::EmptyLabel(draft.field_code.clone()).into());
        }
        if !app_is_active(self.conn, draft.app_id)? {
            return Err(RepoError::AppNotFound(draft.app_id));
        }

        let field = FieldDefinition {
            id: Uuid::new_v4(),
            app_id: draft.app_id,
            field_code: draft.field_code.clone(),
            field_type,
            label: draft.label.clone(),
            validation: draft.validation.clone(),
            display_order: draft.display_order,
            is_active: true,
        };

        let inserted = self.conn.execute(
            "INSERT INTO app_fields (
                uuid,
                app_uuid,
                field_code,
                field_type,
                label,
                validation,
                display_order,
                is_active
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1);",
            params![
                field.id.to_string(),
                field.app_id.to_string(),
                field.field_code.as_str(),
                field.field_type.as_str(),
                field.label.as_str(),
                serde_json::to_string(&field.validation)?,
                field.display_order,
            ],
        );

        match inserted {
            Ok(_) => Ok(field),
            Err(err) if is_unique_violation(&err) => Err(RepoError::DuplicateFieldCode {
                app_id: draft.app_id,
                field_code: draft.field_code.clone(),
            }),
            Err(err) => Err(err.into()),
        }
    }

    fn get_field(&self, field_id: FieldId) -> RepoResult<Option<FieldDefinition>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{FIELD_SELECT_SQL} WHERE uuid = ?1;"))?;
        let mut rows = stmt.query([field_id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_field_row(row)?));
        }
        Ok(None)
    }

    fn list_fields(
        &self,
        app_id: AppId,
        include_inactive: bool,
    ) -> RepoResult<Vec<FieldDefinition>> {
        list_fields_on(self.conn, app_id, include_inactive)
    }

    fn deactivate_field(&self, field_id: FieldId) -> RepoResult<()> {
        set_field_active(self.conn, field_id, false)
    }

    fn reactivate_field(&self, field_id: FieldId) -> RepoResult<()> {
        set_field_active(self.conn, field_id, true)
    }

    fn reorder_fields(&mut self, app_id: AppId, ordering: &[FieldId]) -> RepoResult<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut known = BTreeSet::new();
        {
            let mut stmt =
                tx.prepare("SELECT uuid FROM app_fields WHERE app_uuid = ?1 AND is_active = 1;")?;
            let mut rows = stmt.query([app_id.to_string()])?;
            while let Some(row) = rows.next()? {
                let uuid_text: String = row.get(0)?;
                known.insert(parse_uuid(&uuid_text, "app_fields.uuid")?);
            }
        }

        if known.is_empty() {
            return Err(RepoError::AppNotFound(app_id));
        }

        let requested: BTreeSet<FieldId> = ordering.iter().copied().collect();
        if requested.len() != ordering.len() || requested != known {
            return Err(RepoError::InvalidData(
                "reorder must list every active field of the app exactly once".to_string(),
            ));
        }

        for (position, field_id) in ordering.iter().enumerate() {
            tx.execute(
                "UPDATE app_fields SET display_order = ?1 WHERE uuid = ?2;",
                params![position as i64, field_id.to_string()],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn soft_delete_app(&self, app_id: AppId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE apps
             SET lifecycle = 'soft_deleted', updated_at = ?1
             WHERE uuid = ?2
               AND lifecycle = 'active';",
            params![now_epoch_ms(), app_id.to_string()],
        )?;
        if changed == 0 {
            return Err(RepoError::AppNotFound(app_id));
        }
        Ok(())
    }

    fn restore_app(&self, app_id: AppId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE apps
             SET lifecycle = 'active', updated_at = ?1
             WHERE uuid = ?2
               AND lifecycle = 'soft_deleted';",
            params![now_epoch_ms(), app_id.to_string()],
        )?;
        if changed == 0 {
            return Err(RepoError::AppNotFound(app_id));
        }
        Ok(())
    }

    fn purge_app(&mut self, app_id: AppId) -> RepoResult<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let app_uuid = app_id.to_string();
        let marked = tx.execute(
            "UPDATE apps
             SET lifecycle = 'purged', updated_at = ?1
             WHERE uuid = ?2
               AND lifecycle != 'purged';",
            params![now_epoch_ms(), app_uuid.as_str()],
        )?;
        if marked == 0 {
            return Err(RepoError::AppNotFound(app_id));
        }

        // Audit tables (record_history, process_logs, record_comments) are
        // deliberately not touched; their rows stay addressable by record id.
        tx.execute("DELETE FROM records WHERE app_uuid = ?1;", [app_uuid.as_str()])?;
        tx.execute(
            "DELETE FROM app_views WHERE app_uuid = ?1;",
            [app_uuid.as_str()],
        )?;
        tx.execute(
            "DELETE FROM process_actions WHERE app_uuid = ?1;",
            [app_uuid.as_str()],
        )?;
        tx.execute(
            "DELETE FROM process_statuses WHERE app_uuid = ?1;",
            [app_uuid.as_str()],
        )?;
        tx.execute(
            "DELETE FROM app_fields WHERE app_uuid = ?1;",
            [app_uuid.as_str()],
        )?;

        tx.commit()?;
        Ok(())
    }
}

fn set_field_active(conn: &Connection, field_id: FieldId, active: bool) -> RepoResult<()> {
    let changed = conn.execute(
        "UPDATE app_fields SET is_active = ?1 WHERE uuid = ?2;",
        params![bool_to_int(active), field_id.to_string()],
    )?;
    if changed == 0 {
        return Err(RepoError::FieldNotFound(field_id));
    }
    Ok(())
}

pub(crate) fn get_app_on(conn: &Connection, app_id: AppId) -> RepoResult<Option<Application>> {
    let mut stmt = conn.prepare(&format!("{APP_SELECT_SQL} WHERE uuid = ?1;"))?;
    let mut rows = stmt.query([app_id.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_app_row(row)?));
    }
    Ok(None)
}

pub(crate) fn app_is_active(conn: &Connection, app_id: AppId) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM apps
            WHERE uuid = ?1
              AND lifecycle = 'active'
        );",
        [app_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

pub(crate) fn list_fields_on(
    conn: &Connection,
    app_id: AppId,
    include_inactive: bool,
) -> RepoResult<Vec<FieldDefinition>> {
    let mut sql = format!("{FIELD_SELECT_SQL} WHERE app_uuid = ?1");
    if !include_inactive {
        sql.push_str(" AND is_active = 1");
    }
    sql.push_str(" ORDER BY display_order ASC, field_code ASC;");

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([app_id.to_string()])?;
    let mut fields = Vec::new();
    while let Some(row) = rows.next()? {
        fields.push(parse_field_row(row)?);
    }
    Ok(fields)
}

pub(crate) fn parse_app_row(row: &Row<'_>) -> RepoResult<Application> {
    let uuid_text: String = row.get("uuid")?;
    let id = parse_uuid(&uuid_text, "apps.uuid")?;

    let kind_text: String = row.get("kind")?;
    let kind = AppKind::parse(&kind_text)
        .ok_or_else(|| RepoError::InvalidData(format!("invalid app kind `{kind_text}`")))?;

    let lifecycle_text: String = row.get("lifecycle")?;
    let lifecycle = AppLifecycle::parse(&lifecycle_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid app lifecycle `{lifecycle_text}`"))
    })?;

    Ok(Application {
        id,
        code: row.get("code")?,
        name: row.get("name")?,
        kind,
        icon: row.get("icon")?,
        color: row.get("color")?,
        flags: AppFlags {
            enable_bulk_delete: int_to_bool(
                row.get("enable_bulk_delete")?,
                "apps.enable_bulk_delete",
            )?,
            enable_history: int_to_bool(row.get("enable_history")?, "apps.enable_history")?,
            enable_comments: int_to_bool(row.get("enable_comments")?, "apps.enable_comments")?,
        },
        lifecycle,
        record_seq: row.get("record_seq")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub(crate) fn parse_field_row(row: &Row<'_>) -> RepoResult<FieldDefinition> {
    let uuid_text: String = row.get("uuid")?;
    let app_uuid_text: String = row.get("app_uuid")?;

    let type_text: String = row.get("field_type")?;
    let field_type = FieldType::parse(&type_text)
        .ok_or_else(|| RepoError::InvalidData(format!("invalid field type `{type_text}`")))?;

    let validation_text: String = row.get("validation")?;
    let validation = serde_json::from_str(&validation_text).map_err(|err| {
        RepoError::InvalidData(format!("invalid validation rules JSON: {err}"))
    })?;

    Ok(FieldDefinition {
        id: parse_uuid(&uuid_text, "app_fields.uuid")?,
        app_id: parse_uuid(&app_uuid_text, "app_fields.app_uuid")?,
        field_code: row.get("field_code")?,
        field_type,
        label: row.get("label")?,
        validation,
        display_order: row.get("display_order")?,
        is_active: int_to_bool(row.get("is_active")?, "app_fields.is_active")?,
    })
}
