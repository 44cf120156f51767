//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts, one per aggregate.
//! - Isolate SQLite query details from service/business orchestration.
//! - Share the semantic error taxonomy every mutating call reports.
//!
//! # Invariants
//! - Repository writes validate definitions/payloads before any SQL runs;
//!   failed validation leaves no partial rows behind.
//! - Repositories only accept connections whose migrations are applied.

use crate::db::{migrations::latest_version, DbError};
use crate::model::actor::CapabilityError;
use crate::model::app::{AppId, DefinitionError};
use crate::model::audit::CommentId;
use crate::model::field::FieldId;
use crate::model::process::{ActionId, StatusId};
use crate::model::record::{RecordId, ValidationError};
use crate::model::view::ViewId;
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod app_repo;
pub mod audit_repo;
pub mod process_repo;
pub mod record_repo;
pub mod view_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Semantic error taxonomy shared by every repository.
#[derive(Debug)]
pub enum RepoError {
    /// Record payload violates the app's schema.
    Validation(ValidationError),
    /// App/field/status definition is malformed.
    Definition(DefinitionError),
    DuplicateAppCode(String),
    DuplicateFieldCode {
        app_id: AppId,
        field_code: String,
    },
    /// Field type string is not in the closed enum.
    InvalidFieldType(String),
    AppNotFound(AppId),
    AppCodeNotFound(String),
    FieldNotFound(FieldId),
    RecordNotFound(RecordId),
    ViewNotFound(ViewId),
    StatusNotFound(StatusId),
    ActionNotFound(ActionId),
    CommentNotFound(CommentId),
    /// The app has no process statuses configured.
    WorkflowNotEnabled(AppId),
    /// Action does not apply to the record's current status; terminal,
    /// callers must re-fetch state before retrying.
    InvalidTransition {
        record_id: RecordId,
        message: String,
    },
    PermissionDenied(String),
    /// Numbering/status race that survived the bounded retry.
    ConcurrencyConflict(String),
    Db(DbError),
    InvalidData(String),
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Definition(err) => write!(f, "{err}"),
            Self::DuplicateAppCode(code) => write!(f, "app code already taken: {code}"),
            Self::DuplicateFieldCode { app_id, field_code } => {
                write!(f, "field code `{field_code}` already defined in app {app_id}")
            }
            Self::InvalidFieldType(value) => write!(f, "unsupported field type: {value}"),
            Self::AppNotFound(app_id) => write!(f, "app not found: {app_id}"),
            Self::AppCodeNotFound(code) => write!(f, "app not found: {code}"),
            Self::FieldNotFound(field_id) => write!(f, "field not found: {field_id}"),
            Self::RecordNotFound(record_id) => write!(f, "record not found: {record_id}"),
            Self::ViewNotFound(view_id) => write!(f, "view not found: {view_id}"),
            Self::StatusNotFound(status_id) => write!(f, "process status not found: {status_id}"),
            Self::ActionNotFound(action_id) => write!(f, "process action not found: {action_id}"),
            Self::CommentNotFound(comment_id) => write!(f, "comment not found: {comment_id}"),
            Self::WorkflowNotEnabled(app_id) => {
                write!(f, "app {app_id} has no workflow configured")
            }
            Self::InvalidTransition { record_id, message } => {
                write!(f, "invalid transition for record {record_id}: {message}")
            }
            Self::PermissionDenied(message) => write!(f, "permission denied: {message}"),
            Self::ConcurrencyConflict(message) => {
                write!(f, "concurrency conflict: {message}")
            }
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "connection schema version {actual_version} does not match expected \
                 {expected_version}; run migrations first"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "required table `{table}` is missing")
            }
            Self::MissingRequiredColumn { table, column } => {
                write!(f, "required column `{table}.{column}` is missing")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Definition(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for RepoError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DefinitionError> for RepoError {
    fn from(value: DefinitionError) -> Self {
        Self::Definition(value)
    }
}

impl From<CapabilityError> for RepoError {
    fn from(value: CapabilityError) -> Self {
        Self::InvalidData(value.to_string())
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(value: serde_json::Error) -> Self {
        Self::InvalidData(value.to_string())
    }
}

/// Current wall-clock time in epoch milliseconds.
///
/// Timestamps bound inside one transaction are computed once, so rows
/// written together share the same instant.
pub(crate) fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as i64)
        .unwrap_or(0)
}

/// Verifies the connection carries the schema version this binary expects.
pub(crate) fn ensure_schema_version(conn: &Connection) -> RepoResult<()> {
    let actual: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    let expected = latest_version();
    if actual != expected {
        return Err(RepoError::UninitializedConnection {
            expected_version: expected,
            actual_version: actual,
        });
    }
    Ok(())
}

/// Verifies the listed tables and columns exist on the connection.
pub(crate) fn ensure_tables(
    conn: &Connection,
    requirements: &[(&'static str, &[&'static str])],
) -> RepoResult<()> {
    for &(table, columns) in requirements {
        if !table_exists(conn, table)? {
            return Err(RepoError::MissingRequiredTable(table));
        }
        for &column in columns {
            if !table_has_column(conn, table, column)? {
                return Err(RepoError::MissingRequiredColumn { table, column });
            }
        }
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> RepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    i64::from(value)
}

pub(crate) fn int_to_bool(value: i64, context: &str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid boolean value `{other}` in {context}"
        ))),
    }
}

pub(crate) fn parse_uuid(value: &str, context: &str) -> RepoResult<uuid::Uuid> {
    uuid::Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{value}` in {context}")))
}

/// Returns whether `err` is a UNIQUE constraint violation.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
