//! Audit trail shapes: field-level history entries and user comments.
//!
//! # Invariants
//! - History entries are emitted only by record updates and never mutated.
//! - Comments are free text, independent of the diff mechanism, and only
//!   ever deleted, not edited.

use crate::model::record::RecordId;
use uuid::Uuid;

/// Stable identifier for a comment.
pub type CommentId = Uuid;

/// One captured before/after value for a single field.
///
/// Values are stored as serialized JSON; `None` marks an absent value on
/// the corresponding side (field added or cleared).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub id: i64,
    pub record_id: RecordId,
    pub field_code: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub changed_by: String,
    pub changed_at: i64,
}

/// One free-text annotation on a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub id: CommentId,
    pub record_id: RecordId,
    pub user_id: String,
    pub body: String,
    pub created_at: i64,
    pub updated_at: i64,
}
