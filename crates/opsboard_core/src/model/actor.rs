//! Trusted actor identity and capability declarations for guard checks.
//!
//! The core performs no authentication; an external collaborator resolves
//! the session and hands over the user id plus the capability set, which is
//! trusted as-is and only ever guard-checked.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Capability consumed by workflow guards and audit moderation checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    AppAdmin,
    RecordEdit,
    RecordDelete,
    ProcessReview,
    ProcessApprove,
    CommentModerate,
}

impl Capability {
    /// Stable string id used in stored guard columns.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AppAdmin => CAPABILITY_APP_ADMIN,
            Self::RecordEdit => CAPABILITY_RECORD_EDIT,
            Self::RecordDelete => CAPABILITY_RECORD_DELETE,
            Self::ProcessReview => CAPABILITY_PROCESS_REVIEW,
            Self::ProcessApprove => CAPABILITY_PROCESS_APPROVE,
            Self::CommentModerate => CAPABILITY_COMMENT_MODERATE,
        }
    }
}

/// Stored string value for the app administration capability.
pub const CAPABILITY_APP_ADMIN: &str = "app_admin";
/// Stored string value for the record edit capability.
pub const CAPABILITY_RECORD_EDIT: &str = "record_edit";
/// Stored string value for the record delete capability.
pub const CAPABILITY_RECORD_DELETE: &str = "record_delete";
/// Stored string value for the workflow review capability.
pub const CAPABILITY_PROCESS_REVIEW: &str = "process_review";
/// Stored string value for the workflow approve capability.
pub const CAPABILITY_PROCESS_APPROVE: &str = "process_approve";
/// Stored string value for the comment moderation capability.
pub const CAPABILITY_COMMENT_MODERATE: &str = "comment_moderate";

const SUPPORTED_CAPABILITY_STRINGS: &[&str] = &[
    CAPABILITY_APP_ADMIN,
    CAPABILITY_RECORD_EDIT,
    CAPABILITY_RECORD_DELETE,
    CAPABILITY_PROCESS_REVIEW,
    CAPABILITY_PROCESS_APPROVE,
    CAPABILITY_COMMENT_MODERATE,
];

/// Returns supported capability declaration strings.
pub fn supported_capability_strings() -> &'static [&'static str] {
    SUPPORTED_CAPABILITY_STRINGS
}

/// Parses one capability from its stored string value.
pub fn parse_capability(value: &str) -> Result<Capability, CapabilityError> {
    let normalized = value.trim();
    if normalized.is_empty() {
        return Err(CapabilityError::EmptyCapability);
    }

    match normalized {
        CAPABILITY_APP_ADMIN => Ok(Capability::AppAdmin),
        CAPABILITY_RECORD_EDIT => Ok(Capability::RecordEdit),
        CAPABILITY_RECORD_DELETE => Ok(Capability::RecordDelete),
        CAPABILITY_PROCESS_REVIEW => Ok(Capability::ProcessReview),
        CAPABILITY_PROCESS_APPROVE => Ok(Capability::ProcessApprove),
        CAPABILITY_COMMENT_MODERATE => Ok(Capability::CommentModerate),
        other => Err(CapabilityError::UnsupportedCapability(other.to_string())),
    }
}

/// Capability parse errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    EmptyCapability,
    UnsupportedCapability(String),
}

impl Display for CapabilityError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyCapability => write!(f, "capability value must not be empty"),
            Self::UnsupportedCapability(value) => {
                write!(f, "capability is unsupported: {value}")
            }
        }
    }
}

impl Error for CapabilityError {}

/// Trusted identity executing an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: String,
    pub capabilities: BTreeSet<Capability>,
}

impl Actor {
    /// Creates an actor with no capabilities.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            capabilities: BTreeSet::new(),
        }
    }

    /// Creates an actor holding the given capabilities.
    pub fn with_capabilities(
        user_id: impl Into<String>,
        capabilities: impl IntoIterator<Item = Capability>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            capabilities: capabilities.into_iter().collect(),
        }
    }

    /// Returns whether the actor holds `capability`.
    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}
