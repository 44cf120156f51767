//! Audit trail use-case service.
//!
//! # Responsibility
//! - Expose per-record history and comment entry points.
//!
//! # Invariants
//! - There is no operation that clears history; the trail only grows.

use crate::model::actor::Actor;
use crate::model::audit::{Comment, CommentId, HistoryEntry};
use crate::model::record::RecordId;
use crate::repo::audit_repo::AuditRepository;
use crate::repo::RepoResult;

/// Use-case facade over the audit repository.
pub struct AuditService<R: AuditRepository> {
    repo: R,
}

impl<R: AuditRepository> AuditService<R> {
    /// Creates a service using the provided repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Field-level change history, newest first.
    pub fn history(&self, record_id: RecordId) -> RepoResult<Vec<HistoryEntry>> {
        self.repo.history_for_record(record_id)
    }

    /// Adds one comment authored by `actor`.
    pub fn add_comment(
        &self,
        record_id: RecordId,
        actor: &Actor,
        body: &str,
    ) -> RepoResult<Comment> {
        self.repo.add_comment(record_id, actor, body)
    }

    /// Comments in creation order.
    pub fn comments(&self, record_id: RecordId) -> RepoResult<Vec<Comment>> {
        self.repo.comments_for_record(record_id)
    }

    /// Deletes one comment; allowed for the author or a moderator.
    pub fn delete_comment(&self, comment_id: CommentId, actor: &Actor) -> RepoResult<()> {
        self.repo.delete_comment(comment_id, actor)
    }
}
