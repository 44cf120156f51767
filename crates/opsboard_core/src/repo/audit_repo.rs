//! Audit trail contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist the field-level history rows the record store emits on update.
//! - Own user comments: creation, listing and moderated deletion.
//!
//! # Invariants
//! - History rows are written only from within a record update transaction
//!   and are never edited or deleted afterwards.
//! - Comment deletion requires the author or a comment-moderation capable
//!   actor.

use crate::model::actor::{Actor, Capability};
use crate::model::audit::{Comment, CommentId, HistoryEntry};
use crate::model::record::{FieldChange, RecordId};
use crate::repo::app_repo::get_app_on;
use crate::repo::record_repo::get_record_on;
use crate::repo::{
    ensure_schema_version, ensure_tables, now_epoch_ms, parse_uuid, RepoError, RepoResult,
};
use rusqlite::{params, Connection, Row, Transaction};
use uuid::Uuid;

/// Repository interface for history queries and comments.
pub trait AuditRepository {
    /// Per-record history, newest change first.
    fn history_for_record(&self, record_id: RecordId) -> RepoResult<Vec<HistoryEntry>>;
    /// Adds one comment; gated by the app's `enable_comments` flag.
    fn add_comment(&self, record_id: RecordId, actor: &Actor, body: &str) -> RepoResult<Comment>;
    /// Per-record comments in creation order.
    fn comments_for_record(&self, record_id: RecordId) -> RepoResult<Vec<Comment>>;
    /// Deletes one comment; author or comment-moderation capability.
    fn delete_comment(&self, comment_id: CommentId, actor: &Actor) -> RepoResult<()>;
}

/// SQLite-backed audit repository.
pub struct SqliteAuditRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteAuditRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_schema_version(conn)?;
        ensure_tables(
            conn,
            &[
                (
                    "record_history",
                    &["record_uuid", "field_code", "old_value", "new_value"],
                ),
                ("record_comments", &["uuid", "record_uuid", "user_id", "body"]),
            ],
        )?;
        Ok(Self { conn })
    }
}

impl AuditRepository for SqliteAuditRepository<'_> {
    fn history_for_record(&self, record_id: RecordId) -> RepoResult<Vec<HistoryEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, record_uuid, field_code, old_value, new_value, changed_by, changed_at
             FROM record_history
             WHERE record_uuid = ?1
             ORDER BY changed_at DESC, id DESC;",
        )?;
        let mut rows = stmt.query([record_id.to_string()])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(parse_history_row(row)?);
        }
        Ok(entries)
    }

    fn add_comment(&self, record_id: RecordId, actor: &Actor, body: &str) -> RepoResult<Comment> {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            return Err(RepoError::InvalidData(
                "comment body must not be empty".to_string(),
            ));
        }

        let record = get_record_on(self.conn, record_id, false)?
            .ok_or(RepoError::RecordNotFound(record_id))?;
        let app = get_app_on(self.conn, record.app_id)?
            .ok_or(RepoError::AppNotFound(record.app_id))?;
        if !app.flags.enable_comments {
            return Err(RepoError::PermissionDenied(format!(
                "comments are disabled for app `{}`",
                app.code
            )));
        }

        let now = now_epoch_ms();
        let comment = Comment {
            id: Uuid::new_v4(),
            record_id,
            user_id: actor.user_id.clone(),
            body: trimmed.to_string(),
            created_at: now,
            updated_at: now,
        };

        self.conn.execute(
            "INSERT INTO record_comments (uuid, record_uuid, user_id, body, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                comment.id.to_string(),
                record_id.to_string(),
                comment.user_id.as_str(),
                comment.body.as_str(),
                now,
                now,
            ],
        )?;
        Ok(comment)
    }

    fn comments_for_record(&self, record_id: RecordId) -> RepoResult<Vec<Comment>> {
        let mut stmt = self.conn.prepare(
            "SELECT uuid, record_uuid, user_id, body, created_at, updated_at
             FROM record_comments
             WHERE record_uuid = ?1
             ORDER BY created_at ASC, uuid ASC;",
        )?;
        let mut rows = stmt.query([record_id.to_string()])?;
        let mut comments = Vec::new();
        while let Some(row) = rows.next()? {
            comments.push(parse_comment_row(row)?);
        }
        Ok(comments)
    }

    fn delete_comment(&self, comment_id: CommentId, actor: &Actor) -> RepoResult<()> {
        let author: Option<String> = self
            .conn
            .query_row(
                "SELECT user_id FROM record_comments WHERE uuid = ?1;",
                [comment_id.to_string()],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        let Some(author) = author else {
            return Err(RepoError::CommentNotFound(comment_id));
        };
        if author != actor.user_id && !actor.has(Capability::CommentModerate) {
            return Err(RepoError::PermissionDenied(
                "only the author or a comment moderator may delete a comment".to_string(),
            ));
        }

        self.conn.execute(
            "DELETE FROM record_comments WHERE uuid = ?1;",
            [comment_id.to_string()],
        )?;
        Ok(())
    }
}

/// Writes one history row per changed field inside the caller's record
/// update transaction; every row shares the transaction timestamp.
pub(crate) fn insert_history_rows(
    tx: &Transaction<'_>,
    record_id: RecordId,
    changes: &[FieldChange],
    changed_by: &str,
    changed_at: i64,
) -> RepoResult<()> {
    let mut stmt = tx.prepare(
        "INSERT INTO record_history (record_uuid, field_code, old_value, new_value, changed_by, changed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
    )?;
    for change in changes {
        let old_value = change
            .old_value
            .as_ref()
            .map(|value| serde_json::to_string(&value.to_json()))
            .transpose()?;
        let new_value = change
            .new_value
            .as_ref()
            .map(|value| serde_json::to_string(&value.to_json()))
            .transpose()?;
        stmt.execute(params![
            record_id.to_string(),
            change.field_code.as_str(),
            old_value,
            new_value,
            changed_by,
            changed_at,
        ])?;
    }
    Ok(())
}

fn parse_history_row(row: &Row<'_>) -> RepoResult<HistoryEntry> {
    let record_uuid_text: String = row.get("record_uuid")?;
    Ok(HistoryEntry {
        id: row.get("id")?,
        record_id: parse_uuid(&record_uuid_text, "record_history.record_uuid")?,
        field_code: row.get("field_code")?,
        old_value: row.get("old_value")?,
        new_value: row.get("new_value")?,
        changed_by: row.get("changed_by")?,
        changed_at: row.get("changed_at")?,
    })
}

fn parse_comment_row(row: &Row<'_>) -> RepoResult<Comment> {
    let uuid_text: String = row.get("uuid")?;
    let record_uuid_text: String = row.get("record_uuid")?;
    Ok(Comment {
        id: parse_uuid(&uuid_text, "record_comments.uuid")?,
        record_id: parse_uuid(&record_uuid_text, "record_comments.record_uuid")?,
        user_id: row.get("user_id")?,
        body: row.get("body")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
