//! Workflow use-case service.
//!
//! # Responsibility
//! - Resolve current status and the actions available to an actor.
//! - Execute guarded transitions and announce them.
//!
//! # Invariants
//! - A record on a final status offers no actions, regardless of what is
//!   configured.
//! - Guard checks use only the trusted capability set handed in with the
//!   actor.

use crate::model::actor::Actor;
use crate::model::app::AppId;
use crate::model::process::{
    ActionId, NewAction, NewStatus, ProcessAction, ProcessLog, ProcessStatus,
};
use crate::model::record::RecordId;
use crate::notify::{ListenerRegistry, MutationEvent};
use crate::repo::process_repo::ProcessRepository;
use crate::repo::RepoResult;

/// Use-case facade over the workflow repository.
pub struct WorkflowService<R: ProcessRepository> {
    repo: R,
    listeners: ListenerRegistry,
}

impl<R: ProcessRepository> WorkflowService<R> {
    /// Creates a service with no registered listeners.
    pub fn new(repo: R) -> Self {
        Self {
            repo,
            listeners: ListenerRegistry::new(),
        }
    }

    /// Creates a service that announces transitions to `listeners`.
    pub fn with_listeners(repo: R, listeners: ListenerRegistry) -> Self {
        Self { repo, listeners }
    }

    /// Replaces the app's workflow status set.
    pub fn define_statuses(
        &mut self,
        app_id: AppId,
        drafts: &[NewStatus],
    ) -> RepoResult<Vec<ProcessStatus>> {
        self.repo.define_statuses(app_id, drafts)
    }

    pub fn list_statuses(&self, app_id: AppId) -> RepoResult<Vec<ProcessStatus>> {
        self.repo.list_statuses(app_id)
    }

    pub fn define_action(&self, draft: &NewAction) -> RepoResult<ProcessAction> {
        self.repo.define_action(draft)
    }

    pub fn list_actions(&self, app_id: AppId) -> RepoResult<Vec<ProcessAction>> {
        self.repo.list_actions(app_id)
    }

    /// Current status of a record, or `None` when its app has no workflow.
    pub fn current_status(&self, record_id: RecordId) -> RepoResult<Option<ProcessStatus>> {
        self.repo.current_status(record_id)
    }

    /// Actions leaving the record's current status whose guard the actor
    /// satisfies; empty for final statuses and workflow-less apps.
    pub fn available_actions(
        &self,
        record_id: RecordId,
        actor: &Actor,
    ) -> RepoResult<Vec<ProcessAction>> {
        let Some(current) = self.repo.current_status(record_id)? else {
            return Ok(Vec::new());
        };
        if current.is_final {
            return Ok(Vec::new());
        }

        let actions = self.repo.list_actions(current.app_id)?;
        Ok(actions
            .into_iter()
            .filter(|action| action.from_status_id == current.id)
            .filter(|action| action.guard.map_or(true, |guard| actor.has(guard)))
            .collect())
    }

    /// Executes one transition; log append and status stamp are atomic.
    pub fn execute_action(
        &mut self,
        record_id: RecordId,
        action_id: ActionId,
        actor: &Actor,
        comment: Option<&str>,
    ) -> RepoResult<ProcessLog> {
        let log = self.repo.execute_action(record_id, action_id, actor, comment)?;
        self.listeners.notify_all(&MutationEvent::ActionExecuted {
            record_id,
            action_id,
            to_status_id: log.to_status_id,
        });
        Ok(log)
    }

    /// Per-record transition history in execution order.
    pub fn transition_log(&self, record_id: RecordId) -> RepoResult<Vec<ProcessLog>> {
        self.repo.list_logs(record_id)
    }
}
