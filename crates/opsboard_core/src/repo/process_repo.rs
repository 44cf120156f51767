//! Workflow engine contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist per-app process statuses and actions.
//! - Execute guarded transitions with single-winner semantics.
//! - Keep the append-only process log and its materialized status cache in
//!   lockstep.
//!
//! # Invariants
//! - A workflow definition carries exactly one initial status.
//! - `records.current_status_uuid` is written only in the same transaction
//!   as a process log insert; it is a cache of the log, nothing else.
//! - The record's status is re-checked inside the write transaction, so of
//!   two concurrent identical transitions exactly one succeeds.

use crate::model::actor::{parse_capability, Actor};
use crate::model::app::{AppId, DefinitionError};
use crate::model::process::{
    ActionId, NewAction, NewStatus, ProcessAction, ProcessLog, ProcessStatus, StatusId,
};
use crate::model::record::RecordId;
use crate::repo::app_repo::app_is_active;
use crate::repo::record_repo::get_record_on;
use crate::repo::{
    bool_to_int, ensure_schema_version, ensure_tables, int_to_bool, now_epoch_ms, parse_uuid,
    RepoError, RepoResult,
};
use rusqlite::{params, Connection, Row, TransactionBehavior};
use std::collections::BTreeMap;
use uuid::Uuid;

const STATUS_SELECT_SQL: &str = "SELECT
    uuid,
    app_uuid,
    name,
    is_initial,
    is_final,
    display_order
FROM process_statuses";

const ACTION_SELECT_SQL: &str = "SELECT
    uuid,
    app_uuid,
    name,
    from_status_uuid,
    to_status_uuid,
    guard_capability
FROM process_actions";

/// Repository interface for the workflow engine.
pub trait ProcessRepository {
    /// Replaces the app's status set atomically; the new set must contain
    /// exactly one initial status. Existing records fall back to it.
    fn define_statuses(
        &mut self,
        app_id: AppId,
        drafts: &[NewStatus],
    ) -> RepoResult<Vec<ProcessStatus>>;
    fn list_statuses(&self, app_id: AppId) -> RepoResult<Vec<ProcessStatus>>;
    /// Defines one action; both endpoints must be statuses of the same app.
    fn define_action(&self, draft: &NewAction) -> RepoResult<ProcessAction>;
    fn list_actions(&self, app_id: AppId) -> RepoResult<Vec<ProcessAction>>;
    fn get_action(&self, action_id: ActionId) -> RepoResult<Option<ProcessAction>>;
    /// Resolves the record's current status, or `None` when the record's
    /// app has no workflow configured.
    fn current_status(&self, record_id: RecordId) -> RepoResult<Option<ProcessStatus>>;
    /// Per-record transition history in execution order.
    fn list_logs(&self, record_id: RecordId) -> RepoResult<Vec<ProcessLog>>;
    /// Executes one guarded transition atomically: log append plus status
    /// stamp, both or neither.
    fn execute_action(
        &mut self,
        record_id: RecordId,
        action_id: ActionId,
        actor: &Actor,
        comment: Option<&str>,
    ) -> RepoResult<ProcessLog>;
}

/// SQLite-backed workflow repository.
pub struct SqliteProcessRepository<'conn> {
    conn: &'conn mut Connection,
}

impl<'conn> SqliteProcessRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection.
    pub fn try_new(conn: &'conn mut Connection) -> RepoResult<Self> {
        ensure_schema_version(conn)?;
        ensure_tables(
            conn,
            &[
                ("process_statuses", &["uuid", "app_uuid", "is_initial", "is_final"]),
                (
                    "process_actions",
                    &["uuid", "from_status_uuid", "to_status_uuid", "guard_capability"],
                ),
                ("process_logs", &["record_uuid", "action_uuid", "executed_at"]),
                ("records", &["uuid", "current_status_uuid"]),
            ],
        )?;
        Ok(Self { conn })
    }
}

impl ProcessRepository for SqliteProcessRepository<'_> {
    fn define_statuses(
        &mut self,
        app_id: AppId,
        drafts: &[NewStatus],
    ) -> RepoResult<Vec<ProcessStatus>> {
        let initial_count = drafts.iter().filter(|draft| draft.is_initial).count();
        if initial_count != 1 {
            return Err(DefinitionError::InitialStatusCount(initial_count).into());
        }
        for draft in drafts {
            if draft.name.trim().is_empty() {
                return Err(DefinitionError::EmptyName.into());
            }
        }
        if !app_is_active(self.conn, app_id)? {
            return Err(RepoError::AppNotFound(app_id));
        }

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let app_uuid = app_id.to_string();
        tx.execute(
            "DELETE FROM process_actions WHERE app_uuid = ?1;",
            [app_uuid.as_str()],
        )?;
        tx.execute(
            "DELETE FROM process_statuses WHERE app_uuid = ?1;",
            [app_uuid.as_str()],
        )?;
        // Redefinition resets every record to the new initial status; old
        // logs stay in place as history.
        tx.execute(
            "UPDATE records SET current_status_uuid = NULL WHERE app_uuid = ?1;",
            [app_uuid.as_str()],
        )?;

        let mut statuses = Vec::with_capacity(drafts.len());
        for (position, draft) in drafts.iter().enumerate() {
            let status = ProcessStatus {
                id: Uuid::new_v4(),
                app_id,
                name: draft.name.clone(),
                is_initial: draft.is_initial,
                is_final: draft.is_final,
                display_order: position as i64,
            };
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
                    status.id.to_string(),
                    app_uuid.as_str(),
                    status.name.as_str(),
                    bool_to_int(status.is_initial),
                    bool_to_int(status.is_final),
                    status.display_order,
                ],
            )?;
            statuses.push(status);
        }

        tx.commit()?;
        Ok(statuses)
    }

    fn list_statuses(&self, app_id: AppId) -> RepoResult<Vec<ProcessStatus>> {
        list_statuses_on(self.conn, app_id)
    }

    fn define_action(&self, draft: &NewAction) -> RepoResult<ProcessAction> {
        if draft.name.trim().is_empty() {
            return Err(DefinitionError::EmptyName.into());
        }

        let statuses = list_statuses_on(self.conn, draft.app_id)?;
        if statuses.is_empty() {
            return Err(RepoError::WorkflowNotEnabled(draft.app_id));
        }
        for endpoint in [draft.from_status_id, draft.to_status_id] {
            if !statuses.iter().any(|status| status.id == endpoint) {
                return Err(RepoError::StatusNotFound(endpoint));
            }
        }

        let action = ProcessAction {
            id: Uuid::new_v4(),
            app_id: draft.app_id,
            name: draft.name.clone(),
            from_status_id: draft.from_status_id,
            to_status_id: draft.to_status_id,
            guard: draft.guard,
        };

        self.conn.execute(
            "INSERT INTO process_actions (
                uuid,
                app_uuid,
                name,
                from_status_uuid,
                to_status_uuid,
                guard_capability
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                action.id.to_string(),
                action.app_id.to_string(),
                action.name.as_str(),
                action.from_status_id.to_string(),
                action.to_status_id.to_string(),
                action.guard.map(|capability| capability.as_str()),
            ],
        )?;
        Ok(action)
    }

    fn list_actions(&self, app_id: AppId) -> RepoResult<Vec<ProcessAction>> {
        list_actions_on(self.conn, app_id)
    }

    fn get_action(&self, action_id: ActionId) -> RepoResult<Option<ProcessAction>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{ACTION_SELECT_SQL} WHERE uuid = ?1;"))?;
        let mut rows = stmt.query([action_id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_action_row(row)?));
        }
        Ok(None)
    }

    fn current_status(&self, record_id: RecordId) -> RepoResult<Option<ProcessStatus>> {
        let record = get_record_on(self.conn, record_id, true)?
            .ok_or(RepoError::RecordNotFound(record_id))?;
        let statuses = list_statuses_on(self.conn, record.app_id)?;
        if statuses.is_empty() {
            return Ok(None);
        }
        resolve_current(&statuses, record.current_status_id).map(Some)
    }

    fn list_logs(&self, record_id: RecordId) -> RepoResult<Vec<ProcessLog>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, record_uuid, action_uuid, from_status_uuid, to_status_uuid,
                    executed_by, executed_at, comment
             FROM process_logs
             WHERE record_uuid = ?1
             ORDER BY executed_at ASC, id ASC;",
        )?;
        let mut rows = stmt.query([record_id.to_string()])?;
        let mut logs = Vec::new();
        while let Some(row) = rows.next()? {
            logs.push(parse_log_row(row)?);
        }
        Ok(logs)
    }

    fn execute_action(
        &mut self,
        record_id: RecordId,
        action_id: ActionId,
        actor: &Actor,
        comment: Option<&str>,
    ) -> RepoResult<ProcessLog> {
        let action = match self.get_action(action_id)? {
            Some(action) => action,
            None => return Err(RepoError::ActionNotFound(action_id)),
        };
        let record = get_record_on(self.conn, record_id, false)?
            .ok_or(RepoError::RecordNotFound(record_id))?;
        if record.app_id != action.app_id {
            return Err(RepoError::InvalidTransition {
                record_id,
                message: "action belongs to a different app".to_string(),
            });
        }
        if let Some(guard) = action.guard {
            if !actor.has(guard) {
                return Err(RepoError::PermissionDenied(format!(
                    "action `{}` requires capability `{}`",
                    action.name,
                    guard.as_str()
                )));
            }
        }

        let statuses: BTreeMap<StatusId, ProcessStatus> =
            list_statuses_on(self.conn, record.app_id)?
                .into_iter()
                .map(|status| (status.id, status))
                .collect();
        if statuses.is_empty() {
            return Err(RepoError::WorkflowNotEnabled(record.app_id));
        }

        let now = now_epoch_ms();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        // Re-check the stamped status inside the write transaction; a stale
        // caller must observe InvalidTransition, not double-apply.
        let stamped: Option<Option<String>> = tx
            .query_row(
                "SELECT current_status_uuid FROM records WHERE uuid = ?1 AND is_deleted = 0;",
                [record_id.to_string()],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        let Some(stamped) = stamped else {
            return Err(RepoError::RecordNotFound(record_id));
        };
        let current_id = match stamped {
            Some(value) => parse_uuid(&value, "records.current_status_uuid")?,
            None => initial_of(&statuses)?.id,
        };
        let current = statuses.get(&current_id).ok_or_else(|| {
            RepoError::InvalidData(format!(
                "record {record_id} is stamped with unknown status {current_id}"
            ))
        })?;

        if current.is_final {
            return Err(RepoError::InvalidTransition {
                record_id,
                message: format!("status `{}` is final", current.name),
            });
        }
        if current.id != action.from_status_id {
            return Err(RepoError::InvalidTransition {
                record_id,
                message: format!(
                    "action `{}` expects status {}, record is at `{}`",
                    action.name, action.from_status_id, current.name
                ),
            });
        }

        tx.execute(
            "INSERT INTO process_logs (
                record_uuid,
                action_uuid,
                from_status_uuid,
                to_status_uuid,
                executed_by,
                executed_at,
                comment
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                record_id.to_string(),
                action.id.to_string(),
                action.from_status_id.to_string(),
                action.to_status_id.to_string(),
                actor.user_id.as_str(),
                now,
                comment,
            ],
        )?;
        let log_id = tx.last_insert_rowid();

        tx.execute(
            "UPDATE records SET current_status_uuid = ?1, updated_at = ?2 WHERE uuid = ?3;",
            params![action.to_status_id.to_string(), now, record_id.to_string()],
        )?;

        tx.commit()?;
        Ok(ProcessLog {
            id: log_id,
            record_id,
            action_id: action.id,
            from_status_id: action.from_status_id,
            to_status_id: action.to_status_id,
            executed_by: actor.user_id.clone(),
            executed_at: now,
            comment: comment.map(str::to_string),
        })
    }
}

/// Resolves the effective status for a stamped value, falling back to the
/// initial status when no transition has happened yet.
pub(crate) fn resolve_current(
    statuses: &[ProcessStatus],
    stamped: Option<StatusId>,
) -> RepoResult<ProcessStatus> {
    match stamped {
        Some(status_id) => statuses
            .iter()
            .find(|status| status.id == status_id)
            .cloned()
            .ok_or(RepoError::StatusNotFound(status_id)),
        None => statuses
            .iter()
            .find(|status| status.is_initial)
            .cloned()
            .ok_or_else(|| {
                RepoError::InvalidData("workflow has no initial status".to_string())
            }),
    }
}

fn initial_of(statuses: &BTreeMap<StatusId, ProcessStatus>) -> RepoResult<&ProcessStatus> {
    statuses
        .values()
        .find(|status| status.is_initial)
        .ok_or_else(|| RepoError::InvalidData("workflow has no initial status".to_string()))
}

pub(crate) fn list_statuses_on(conn: &Connection, app_id: AppId) -> RepoResult<Vec<ProcessStatus>> {
    let mut stmt = conn.prepare(&format!(
        "{STATUS_SELECT_SQL} WHERE app_uuid = ?1 ORDER BY display_order ASC;"
    ))?;
    let mut rows = stmt.query([app_id.to_string()])?;
    let mut statuses = Vec::new();
    while let Some(row) = rows.next()? {
        statuses.push(parse_status_row(row)?);
    }
    Ok(statuses)
}

pub(crate) fn list_actions_on(conn: &Connection, app_id: AppId) -> RepoResult<Vec<ProcessAction>> {
    let mut stmt =
        conn.prepare(&format!("{ACTION_SELECT_SQL} WHERE app_uuid = ?1 ORDER BY name ASC;"))?;
    let mut rows = stmt.query([app_id.to_string()])?;
    let mut actions = Vec::new();
    while let Some(row) = rows.next()? {
        actions.push(parse_action_row(row)?);
    }
    Ok(actions)
}

fn parse_status_row(row: &Row<'_>) -> RepoResult<ProcessStatus> {
    let uuid_text: String = row.get("uuid")?;
    let app_uuid_text: String = row.get("app_uuid")?;
    Ok(ProcessStatus {
        id: parse_uuid(&uuid_text, "process_statuses.uuid")?,
        app_id: parse_uuid(&app_uuid_text, "process_statuses.app_uuid")?,
        name: row.get("name")?,
        is_initial: int_to_bool(row.get("is_initial")?, "process_statuses.is_initial")?,
        is_final: int_to_bool(row.get("is_final")?, "process_statuses.is_final")?,
        display_order: row.get("display_order")?,
    })
}

fn parse_action_row(row: &Row<'_>) -> RepoResult<ProcessAction> {
    let uuid_text: String = row.get("uuid")?;
    let app_uuid_text: String = row.get("app_uuid")?;
    let from_text: String = row.get("from_status_uuid")?;
    let to_text: String = row.get("to_status_uuid")?;
    let guard = match row.get::<_, Option<String>>("guard_capability")? {
        Some(value) => Some(parse_capability(&value)?),
        None => None,
    };
    Ok(ProcessAction {
        id: parse_uuid(&uuid_text, "process_actions.uuid")?,
        app_id: parse_uuid(&app_uuid_text, "process_actions.app_uuid")?,
        name: row.get("name")?,
        from_status_id: parse_uuid(&from_text, "process_actions.from_status_uuid")?,
        to_status_id: parse_uuid(&to_text, "process_actions.to_status_uuid")?,
        guard,
    })
}

fn parse_log_row(row: &Row<'_>) -> RepoResult<ProcessLog> {
    let record_text: String = row.get("record_uuid")?;
    let action_text: String = row.get("action_uuid")?;
    let from_text: String = row.get("from_status_uuid")?;
    let to_text: String = row.get("to_status_uuid")?;
    Ok(ProcessLog {
        id: row.get("id")?,
        record_id: parse_uuid(&record_text, "process_logs.record_uuid")?,
        action_id: parse_uuid(&action_text, "process_logs.action_uuid")?,
        from_status_id: parse_uuid(&from_text, "process_logs.from_status_uuid")?,
        to_status_id: parse_uuid(&to_text, "process_logs.to_status_uuid")?,
        executed_by: row.get("executed_by")?,
        executed_at: row.get("executed_at")?,
        comment: row.get("comment")?,
    })
}
