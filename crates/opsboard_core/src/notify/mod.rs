//! Mutation notification contracts.
//!
//! Successful mutations are announced to registered listeners so external
//! collaborators (mail, webhooks, search indexers) can react. Dispatch is
//! fire-and-forget: a listener failure is logged and never rolls back the
//! mutation that triggered it.

pub mod registry;

pub use registry::{ListenerRegistry, ListenerRegistryError, MutationListener};

use crate::model::app::AppId;
use crate::model::process::{ActionId, StatusId};
use crate::model::record::RecordId;

/// One successful core mutation, described for downstream consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationEvent {
    RecordCreated {
        app_id: AppId,
        record_id: RecordId,
        record_number: i64,
    },
    RecordUpdated {
        app_id: AppId,
        record_id: RecordId,
        changed_fields: Vec<String>,
    },
    RecordsDeleted {
        app_id: AppId,
        deleted: u32,
    },
    ActionExecuted {
        record_id: RecordId,
        action_id: ActionId,
        to_status_id: StatusId,
    },
}

impl MutationEvent {
    /// Stable event name used in dispatch logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RecordCreated { .. } => "record_created",
            Self::RecordUpdated { .. } => "record_updated",
            Self::RecordsDeleted { .. } => "records_deleted",
            Self::ActionExecuted { .. } => "action_executed",
        }
    }
}
