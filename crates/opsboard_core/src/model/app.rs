//! Application aggregate: the root a schema, records and views hang off.
//!
//! # Responsibility
//! - Define the app shape, its behavior flags and its tri-state lifecycle.
//! - Validate app/field code format at definition time.
//!
//! # Invariants
//! - `code` is validated once at creation and is immutable afterwards;
//!   renaming would orphan dependent routes and permissions.
//! - `record_seq` only ever grows; it is the source of new record numbers.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for an application.
pub type AppId = Uuid;

static CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_]{1,31}$").expect("valid code regex"));

/// Returns whether `value` is a well-formed app or field code.
pub fn code_is_valid(value: &str) -> bool {
    CODE_RE.is_match(value)
}

/// Static vs dynamic application classification.
///
/// Static apps are the portal's fixed, hand-built pages; dynamic apps carry
/// an admin-defined schema and flow through the engine in this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppKind {
    Static,
    Dynamic,
}

impl AppKind {
    /// Stable string id used in storage.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Dynamic => "dynamic",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "static" => Some(Self::Static),
            "dynamic" => Some(Self::Dynamic),
            _ => None,
        }
    }
}

/// Tri-state app lifecycle.
///
/// Soft-deleted apps can be restored; purged apps are gone for good and only
/// their tombstone row (plus retained audit rows) remains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppLifecycle {
    Active,
    SoftDeleted,
    Purged,
}

impl AppLifecycle {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::SoftDeleted => "soft_deleted",
            Self::Purged => "purged",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "soft_deleted" => Some(Self::SoftDeleted),
            "purged" => Some(Self::Purged),
            _ => None,
        }
    }
}

/// Per-app behavior switches consumed by store and audit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppFlags {
    /// Gates `bulk_delete`; single-record deletes are always allowed.
    pub enable_bulk_delete: bool,
    /// Gates field-level history capture on record updates.
    pub enable_history: bool,
    /// Gates user comments on records.
    pub enable_comments: bool,
}

impl Default for AppFlags {
    fn default() -> Self {
        Self {
            enable_bulk_delete: false,
            enable_history: true,
            enable_comments: true,
        }
    }
}

/// One configurable data collection with its own schema, views and optional
/// workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: AppId,
    /// Immutable routing/permission key, `[a-z][a-z0-9_]{1,31}`.
    pub code: String,
    pub name: String,
    pub kind: AppKind,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub flags: AppFlags,
    pub lifecycle: AppLifecycle,
    /// Materialized record numbering counter; see the record repository.
    pub record_seq: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Application {
    /// Returns whether the app accepts reads and writes.
    pub fn is_active(&self) -> bool {
        self.lifecycle == AppLifecycle::Active
    }
}

/// Creation request for a new application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewApp {
    pub code: String,
    pub name: String,
    pub kind: AppKind,
    pub icon: Option<String>,
    pub color: Option<String>,
}

impl NewApp {
    pub fn new(code: impl Into<String>, name: impl Into<String>, kind: AppKind) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            kind,
            icon: None,
            color: None,
        }
    }

    /// Validates creation-time constraints.
    ///
    /// # Invariants
    /// - `code` must match the code format; this is the only point where the
    ///   format is checked, the code never changes afterwards.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        if !code_is_valid(&self.code) {
            return Err(DefinitionError::InvalidCode(self.code.clone()));
        }
        if self.name.trim().is_empty() {
            return Err(DefinitionError::EmptyName);
        }
        Ok(())
    }
}

/// Definition-time validation errors shared by app, field and status
/// configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    /// Code does not match `[a-z][a-z0-9_]{1,31}`.
    InvalidCode(String),
    EmptyName,
    EmptyLabel(String),
    /// A workflow definition must carry exactly one initial status.
    InitialStatusCount(usize),
}

impl Display for DefinitionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidCode(value) => write!(
                f,
                "invalid code `{value}`: expected lowercase letters, digits and underscores, \
                 starting with a letter, 2-32 chars"
            ),
            Self::EmptyName => write!(f, "name must not be empty"),
            Self::EmptyLabel(field_code) => {
                write!(f, "label for field `{field_code}` must not be empty")
            }
            Self::InitialStatusCount(count) => write!(
                f,
                "workflow definition must have exactly one initial status, got {count}"
            ),
        }
    }
}

impl Error for DefinitionError {}

#[cfg(test)]
mod tests {
    use super::{code_is_valid, AppKind, AppLifecycle, DefinitionError, NewApp};

    #[test]
    fn code_format_accepts_typical_app_codes() {
        assert!(code_is_valid("task_tracker"));
        assert!(code_is_valid("crm2"));
        assert!(code_is_valid("ab"));
    }

    #[test]
    fn code_format_rejects_bad_shapes() {
        assert!(!code_is_valid(""));
        assert!(!code_is_valid("a"));
        assert!(!code_is_valid("Tasks"));
        assert!(!code_is_valid("1tracker"));
        assert!(!code_is_valid("task-tracker"));
        assert!(!code_is_valid(&"x".repeat(33)));
    }

    #[test]
    fn new_app_validate_checks_code_and_name() {
        let ok = NewApp::new("task_tracker", "Task Tracker", AppKind::Dynamic);
        assert!(ok.validate().is_ok());

        let bad_code = NewApp::new("Task Tracker", "Task Tracker", AppKind::Dynamic);
        assert!(matches!(
            bad_code.validate(),
            Err(DefinitionError::InvalidCode(_))
        ));

        let bad_name = NewApp::new("task_tracker", "   ", AppKind::Dynamic);
        assert!(matches!(bad_name.validate(), Err(DefinitionError::EmptyName)));
    }

    #[test]
    fn lifecycle_round_trips_through_storage_strings() {
        for lifecycle in [
            AppLifecycle::Active,
            AppLifecycle::SoftDeleted,
            AppLifecycle::Purged,
        ] {
            assert_eq!(AppLifecycle::parse(lifecycle.as_str()), Some(lifecycle));
        }
        assert_eq!(AppLifecycle::parse("deleted"), None);
    }
}
