//! Record store use-case service.
//!
//! # Responsibility
//! - Provide record CRUD/list entry points for portal callers.
//! - Announce successful mutations to registered listeners.
//!
//! # Invariants
//! - Notification dispatch happens after commit and never affects the
//!   outcome of the mutation it announces.

use crate::model::actor::Actor;
use crate::model::app::AppId;
use crate::model::record::{Record, RecordId, RecordPayload};
use crate::notify::{ListenerRegistry, MutationEvent};
use crate::repo::record_repo::{
    BulkDeleteOutcome, RecordListQuery, RecordRepository, RecordUpdate,
};
use crate::repo::RepoResult;

/// Use-case facade over the record repository.
pub struct RecordService<R: RecordRepository> {
    repo: R,
    listeners: ListenerRegistry,
}

impl<R: RecordRepository> RecordService<R> {
    /// Creates a service with no registered listeners.
    pub fn new(repo: R) -> Self {
        Self {
            repo,
            listeners: ListenerRegistry::new(),
        }
    }

    /// Creates a service that announces mutations to `listeners`.
    pub fn with_listeners(repo: R, listeners: ListenerRegistry) -> Self {
        Self { repo, listeners }
    }

    /// Validates and persists one record.
    pub fn create_record(
        &mut self,
        app_id: AppId,
        payload: &RecordPayload,
        actor: &Actor,
    ) -> RepoResult<Record> {
        let record = self.repo.create_record(app_id, payload, actor)?;
        self.listeners.notify_all(&MutationEvent::RecordCreated {
            app_id,
            record_id: record.id,
            record_number: record.record_number,
        });
        Ok(record)
    }

    /// Applies a partial update, capturing history for changed fields.
    pub fn update_record(
        &mut self,
        record_id: RecordId,
        payload: &RecordPayload,
        actor: &Actor,
    ) -> RepoResult<RecordUpdate> {
        let update = self.repo.update_record(record_id, payload, actor)?;
        self.listeners.notify_all(&MutationEvent::RecordUpdated {
            app_id: update.record.app_id,
            record_id: update.record.id,
            changed_fields: update.changed_fields.clone(),
        });
        Ok(update)
    }

    pub fn get_record(
        &self,
        record_id: RecordId,
        include_deleted: bool,
    ) -> RepoResult<Option<Record>> {
        self.repo.get_record(record_id, include_deleted)
    }

    pub fn list_records(
        &self,
        app_id: AppId,
        query: &RecordListQuery,
    ) -> RepoResult<Vec<Record>> {
        self.repo.list_records(app_id, query)
    }

    pub fn delete_record(&self, record_id: RecordId) -> RepoResult<()> {
        self.repo.soft_delete_record(record_id)
    }

    /// Deletes a batch of records, reporting per-id outcome counts.
    pub fn bulk_delete(
        &mut self,
        app_id: AppId,
        ids: &[RecordId],
    ) -> RepoResult<BulkDeleteOutcome> {
        let outcome = self.repo.bulk_delete(app_id, ids)?;
        if outcome.deleted > 0 {
            self.listeners.notify_all(&MutationEvent::RecordsDeleted {
                app_id,
                deleted: outcome.deleted,
            });
        }
        Ok(outcome)
    }

    /// Creates or updates by natural key; retry-safe for external ingestion.
    pub fn upsert_by_key(
        &mut self,
        app_id: AppId,
        key_field: &str,
        payload: &RecordPayload,
        actor: &Actor,
    ) -> RepoResult<Record> {
        self.repo.upsert_by_key(app_id, key_field, payload, actor)
    }

    /// Bounded record snapshot for the view projector.
    pub fn snapshot_for_projection(&self, app_id: AppId) -> RepoResult<Vec<Record>> {
        self.repo.snapshot_for_projection(app_id)
    }
}
