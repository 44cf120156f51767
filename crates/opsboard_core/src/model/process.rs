//! Workflow state machine shapes: statuses, actions and the transition log.
//!
//! # Responsibility
//! - Define the per-app finite-state model a record moves through.
//!
//! # Invariants
//! - A workflow-enabled app has exactly one initial status.
//! - Process log rows are append-only and never edited or deleted.

use crate::model::actor::Capability;
use crate::model::app::AppId;
use crate::model::record::RecordId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier for a process status.
pub type StatusId = Uuid;
/// Stable identifier for a process action.
pub type ActionId = Uuid;

/// One state a record can sit in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessStatus {
    pub id: StatusId,
    pub app_id: AppId,
    pub name: String,
    pub is_initial: bool,
    /// Final statuses offer no actions, regardless of configuration.
    pub is_final: bool,
    pub display_order: i64,
}

/// One allowed transition between two statuses of the same app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessAction {
    pub id: ActionId,
    pub app_id: AppId,
    pub name: String,
    pub from_status_id: StatusId,
    pub to_status_id: StatusId,
    /// Capability the executing actor must hold; `None` means unguarded.
    pub guard: Option<Capability>,
}

/// One executed transition. Append-only audit row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessLog {
    pub id: i64,
    pub record_id: RecordId,
    pub action_id: ActionId,
    pub from_status_id: StatusId,
    pub to_status_id: StatusId,
    pub executed_by: String,
    pub executed_at: i64,
    pub comment: Option<String>,
}

/// Definition request for one status in a workflow definition batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStatus {
    pub name: String,
    pub is_initial: bool,
    pub is_final: bool,
}

impl NewStatus {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_initial: false,
            is_final: false,
        }
    }

    pub fn initial(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_initial: true,
            is_final: false,
        }
    }

    pub fn fin(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_initial: false,
            is_final: true,
        }
    }
}

/// Definition request for one process action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAction {
    pub app_id: AppId,
    pub name: String,
    pub from_status_id: StatusId,
    pub to_status_id: StatusId,
    pub guard: Option<Capability>,
}
