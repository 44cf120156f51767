//! App template/clone service.
//!
//! # Responsibility
//! - Clone an app's field schema into a fresh app (template instantiation).
//! - Duplicate an app end-to-end: schema, views and workflow configuration.
//!
//! # Invariants
//! - Cloning copies definitions only; records, logs, history and comments
//!   never travel with a template.
//! - Either the whole clone commits or nothing does.

use crate::model::app::{AppId, AppLifecycle, Application, NewApp};
use crate::model::process::StatusId;
use crate::repo::app_repo::{get_app_on, list_fields_on};
use crate::repo::process_repo::{list_actions_on, list_statuses_on};
use crate::repo::view_repo::list_views_on;
use crate::repo::{
    bool_to_int, ensure_schema_version, ensure_tables, is_unique_violation, now_epoch_ms,
    RepoError, RepoResult,
};
use rusqlite::{params, Connection, Transaction, TransactionBehavior};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Schema-registry-level clone operations.
///
/// Talks to the shared store directly; each public operation is one
/// transaction.
pub struct TemplateService<'conn> {
    conn: &'conn mut Connection,
}

impl<'conn> TemplateService<'conn> {
    /// Constructs the service from a migrated/ready connection.
    pub fn try_new(conn: &'conn mut Connection) -> RepoResult<Self> {
        ensure_schema_version(conn)?;
        ensure_tables(
            conn,
            &[
                ("apps", &["uuid", "code"]),
                ("app_fields", &["uuid", "app_uuid"]),
                ("app_views", &["uuid", "app_uuid"]),
                ("process_statuses", &["uuid", "app_uuid"]),
                ("process_actions", &["uuid", "from_status_uuid", "to_status_uuid"]),
            ],
        )?;
        Ok(Self { conn })
    }

    /// Clones only the field schema of `source_app_id` into a new app.
    pub fn clone_schema(
        &mut self,
        source_app_id: AppId,
        new_code: &str,
        new_name: &str,
    ) -> RepoResult<Application> {
        self.clone_internal(source_app_id, new_code, new_name, false)
    }

    /// Duplicates an app end-to-end: fields, views, statuses and actions.
    pub fn duplicate_app(
        &mut self,
        source_app_id: AppId,
        new_code: &str,
        new_name: &str,
    ) -> RepoResult<Application> {
        self.clone_internal(source_app_id, new_code, new_name, true)
    }

    fn clone_internal(
        &mut self,
        source_app_id: AppId,
        new_code: &str,
        new_name: &str,
        include_views_and_workflow: bool,
    ) -> RepoResult<Application> {
        let source = match get_app_on(self.conn, source_app_id)? {
            Some(app) if app.lifecycle != AppLifecycle::Purged => app,
            _ => return Err(RepoError::AppNotFound(source_app_id)),
        };

        let draft = NewApp {
            code: new_code.to_string(),
            name: new_name.to_string(),
            kind: source.kind,
            icon: source.icon.clone(),
            color: source.color.clone(),
        };
        draft.validate()?;

        let fields = list_fields_on(self.conn, source_app_id, true)?;
        let views = list_views_on(self.conn, source_app_id)?;
        let statuses = list_statuses_on(self.conn, source_app_id)?;
        let actions = list_actions_on(self.conn, source_app_id)?;

        let now = now_epoch_ms();
        let app = Application {
            id: Uuid::new_v4(),
            code: draft.code.clone(),
            name: draft.name.clone(),
            kind: draft.kind,
            icon: draft.icon.clone(),
            color: draft.color.clone(),
            flags: source.flags,
            lifecycle: AppLifecycle::Active,
            record_seq: 0,
            created_at: now,
            updated_at: now,
        };

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        insert_app_row(&tx, &app)?;

        for field in &fields {
            tx.execute(
                "INSERT INTO app_fields (
                    uuid,
                    app_uuid,
                    field_code,
                    field_type,
                    label,
                    validation,
                    display_order,
                    is_active
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
                params![
                    Uuid::new_v4().to_string(),
                    app.id.to_string(),
                    field.field_code.as_str(),
                    field.field_type.as_str(),
                    field.label.as_str(),
                    serde_json::to_string(&field.validation)?,
                    field.display_order,
                    bool_to_int(field.is_active),
                ],
            )?;
        }

        if include_views_and_workflow {
            for view in &views {
                tx.execute(
                    "INSERT INTO app_views (uuid, app_uuid, name, view_type, config, is_default)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
                    params![
                        Uuid::new_v4().to_string(),
                        app.id.to_string(),
                        view.name.as_str(),
                        view.config.view_type().as_str(),
                        view.config.to_config_json()?,
                        bool_to_int(view.is_default),
                    ],
                )?;
            }

            let mut status_ids: BTreeMap<StatusId, StatusId> = BTreeMap::new();
            for status in &statuses {
                let new_id = Uuid::new_v4();
                status_ids.insert(status.id, new_id);
                tx.execute(
                    "INSERT INTO process_statuses (
                        uuid,
                        app_uuid,
                        name,
                        is_initial,
                        is_final,
                        display_order
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
                    params![
                        new_id.to_string(),
                        app.id.to_string(),
                        status.name.as_str(),
                        bool_to_int(status.is_initial),
                        bool_to_int(status.is_final),
                        status.display_order,
                    ],
                )?;
            }

            for action in &actions {
                let from = status_ids.get(&action.from_status_id).ok_or_else(|| {
                    RepoError::StatusNotFound(action.from_status_id)
                })?;
                let to = status_ids
                    .get(&action.to_status_id)
                    .ok_or_else(|| RepoError::StatusNotFound(action.to_status_id))?;
                tx.execute(
                    "INSERT INTO process_actions (
                        uuid,
                        app_uuid,
                        name,
                        from_status_uuid,
                        to_status_uuid,
                        guard_capability
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
                    params![
                        Uuid::new_v4().to_string(),
                        app.id.to_string(),
                        action.name.as_str(),
                        from.to_string(),
                        to.to_string(),
                        action.guard.map(|capability| capability.as_str()),
                    ],
                )?;
            }
        }

        tx.commit()?;
        Ok(app)
    }
}

fn insert_app_row(tx: &Transaction<'_>, app: &Application) -> RepoResult<()> {
    let inserted = tx.execute(
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
        Ok(_) => Ok(()),
        Err(err) if is_unique_violation(&err) => {
            Err(RepoError::DuplicateAppCode(app.code.clone()))
        }
        Err(err) => Err(err.into()),
    }
}
