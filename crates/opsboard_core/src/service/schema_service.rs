//! Schema registry use-case service.
//!
//! # Responsibility
//! - Provide stable app/field definition entry points for admin callers.
//! - Shape the form-facing field projection the record UI binds to.
//!
//! # Invariants
//! - Service APIs never bypass repository validation contracts.
//! - The service layer remains storage-agnostic.

use crate::model::app::{AppFlags, AppId, Application, NewApp};
use crate::model::field::{FieldDefinition, FieldId, NewField};
use crate::repo::app_repo::AppRepository;
use crate::repo::{RepoError, RepoResult};

/// Use-case facade over the schema registry repository.
pub struct SchemaService<R: AppRepository> {
    repo: R,
}

impl<R: AppRepository> SchemaService<R> {
    /// Creates a service using the provided repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Creates one app; fails `DuplicateAppCode` when the code is taken.
    pub fn create_app(&self, draft: &NewApp) -> RepoResult<Application> {
        self.repo.create_app(draft)
    }

    /// Resolves one app by its immutable code.
    pub fn get_app_by_code(&self, code: &str) -> RepoResult<Application> {
        self.repo
            .get_app_by_code(code)?
            .ok_or_else(|| RepoError::AppCodeNotFound(code.to_string()))
    }

    pub fn get_app(&self, app_id: AppId) -> RepoResult<Option<Application>> {
        self.repo.get_app(app_id)
    }

    pub fn list_apps(&self, include_deleted: bool) -> RepoResult<Vec<Application>> {
        self.repo.list_apps(include_deleted)
    }

    pub fn update_app_flags(&self, app_id: AppId, flags: &AppFlags) -> RepoResult<()> {
        self.repo.update_app_flags(app_id, flags)
    }

    /// Defines one field on an app.
    pub fn define_field(&self, draft: &NewField) -> RepoResult<FieldDefinition> {
        self.repo.define_field(draft)
    }

    pub fn list_fields(
        &self,
        app_id: AppId,
        include_inactive: bool,
    ) -> RepoResult<Vec<FieldDefinition>> {
        self.repo.list_fields(app_id, include_inactive)
    }

    /// Active input fields in display order: what a create/edit form shows.
    pub fn form_fields(&self, app_id: AppId) -> RepoResult<Vec<FieldDefinition>> {
        let fields = self.repo.list_fields(app_id, false)?;
        Ok(fields
            .into_iter()
            .filter(|field| field.field_type.is_input())
            .collect())
    }

    pub fn deactivate_field(&self, field_id: FieldId) -> RepoResult<()> {
        self.repo.deactivate_field(field_id)
    }

    pub fn reactivate_field(&self, field_id: FieldId) -> RepoResult<()> {
        self.repo.reactivate_field(field_id)
    }

    /// Atomically reassigns display order over the app's active fields.
    pub fn reorder_fields(&mut self, app_id: AppId, ordering: &[FieldId]) -> RepoResult<()> {
        self.repo.reorder_fields(app_id, ordering)
    }

    pub fn soft_delete_app(&self, app_id: AppId) -> RepoResult<()> {
        self.repo.soft_delete_app(app_id)
    }

    pub fn restore_app(&self, app_id: AppId) -> RepoResult<()> {
        self.repo.restore_app(app_id)
    }

    /// Irreversible purge; schema, records, views and process configuration
    /// are removed, audit rows are retained.
    pub fn purge_app(&mut self, app_id: AppId) -> RepoResult<()> {
        self.repo.purge_app(app_id)
    }
}
