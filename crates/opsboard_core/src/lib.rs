//! Core domain logic for the OpsBoard dynamic application engine.
//! This crate is the single source of truth for business invariants.

pub mod db;
pub mod logging;
pub mod model;
pub mod notify;
pub mod projection;
pub mod repo;
pub mod service;

pub use db::{open_db, open_db_in_memory};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::actor::{parse_capability, Actor, Capability, CapabilityError};
pub use model::app::{AppFlags, AppId, AppKind, AppLifecycle, Application, NewApp};
pub use model::audit::{Comment, CommentId, HistoryEntry};
pub use model::field::{FieldDefinition, FieldId, FieldType, FieldValidation, NewField};
pub use model::process::{
    ActionId, NewAction, NewStatus, ProcessAction, ProcessLog, ProcessStatus, StatusId,
};
pub use model::record::{
    FieldValue, Record, RecordData, RecordId, RecordPayload, ValidationError,
};
pub use model::view::{
    Aggregation, CalendarConfig, ChartConfig, ChartType, NewView, TableConfig, ViewConfig,
    ViewDefinition, ViewId, ViewType,
};
pub use notify::{ListenerRegistry, MutationEvent, MutationListener};
pub use projection::{project, Projection};
pub use repo::app_repo::{AppRepository, SqliteAppRepository};
pub use repo::audit_repo::{AuditRepository, SqliteAuditRepository};
pub use repo::process_repo::{ProcessRepository, SqliteProcessRepository};
pub use repo::record_repo::{
    BulkDeleteOutcome, RecordListQuery, RecordRepository, RecordSort, RecordUpdate,
    SqliteRecordRepository, PROJECTION_SNAPSHOT_CAP,
};
pub use repo::view_repo::{SqliteViewRepository, ViewRepository};
pub use repo::{RepoError, RepoResult};
pub use service::audit_service::AuditService;
pub use service::record_service::RecordService;
pub use service::schema_service::SchemaService;
pub use service::template_service::TemplateService;
pub use service::workflow_service::WorkflowService;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
