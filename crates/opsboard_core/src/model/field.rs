//! Field definitions: the schema rows every record payload validates
//! against.
//!
//! # Responsibility
//! - Define the closed field type enum and its per-variant behavior.
//! - Carry per-field validation rules as data.
//!
//! # Invariants
//! - `field_code` is unique per app and immutable.
//! - A field referenced by any record is deactivated, never hard-deleted.

use crate::model::app::AppId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier for a field definition.
pub type FieldId = Uuid;

/// Closed set of supported field types.
///
/// Per-type behavior (value kind, form/list classification, validation) is
/// resolved through the methods below, one lookup per variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Number,
    Date,
    Dropdown,
    Checkbox,
    File,
    RichText,
    RelatedRecords,
    Subtable,
    Computed,
}

/// Value shape a field type stores, used by payload coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Text,
    Number,
    Date,
    Bool,
    List,
}

impl FieldType {
    /// Stable string id used in storage and admin APIs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Date => "date",
            Self::Dropdown => "dropdown",
            Self::Checkbox => "checkbox",
            Self::File => "file",
            Self::RichText => "rich_text",
            Self::RelatedRecords => "related_records",
            Self::Subtable => "subtable",
            Self::Computed => "computed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "text" => Some(Self::Text),
            "number" => Some(Self::Number),
            "date" => Some(Self::Date),
            "dropdown" => Some(Self::Dropdown),
            "checkbox" => Some(Self::Checkbox),
            "file" => Some(Self::File),
            "rich_text" => Some(Self::RichText),
            "related_records" => Some(Self::RelatedRecords),
            "subtable" => Some(Self::Subtable),
            "computed" => Some(Self::Computed),
            _ => None,
        }
    }

    /// Whether the field appears on create/edit forms and accepts payload
    /// values. Computed fields are derived, never written by callers.
    pub fn is_input(self) -> bool {
        !matches!(self, Self::Computed)
    }

    /// Whether the field is excluded from default table columns.
    pub fn hidden_in_list(self) -> bool {
        matches!(self, Self::File | Self::RichText | Self::Subtable)
    }

    /// The tagged value variant this type stores.
    pub fn value_kind(self) -> ValueKind {
        match self {
            Self::Text | Self::Dropdown | Self::File | Self::RichText | Self::Computed => {
                ValueKind::Text
            }
            Self::Number => ValueKind::Number,
            Self::Date => ValueKind::Date,
            Self::Checkbox => ValueKind::Bool,
            Self::RelatedRecords | Self::Subtable => ValueKind::List,
        }
    }
}

/// Per-field validation rules, persisted as a JSON column.
///
/// Rules that do not apply to a field's value kind are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldValidation {
    pub required: bool,
    /// Maximum character count for text-kind values.
    pub max_length: Option<u32>,
    /// Inclusive numeric bounds.
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    /// Allowed values for dropdown fields; empty means unconstrained.
    pub options: Vec<String>,
}

/// Metadata describing one record attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub id: FieldId,
    pub app_id: AppId,
    /// Unique per app, immutable, same format as app codes.
    pub field_code: String,
    pub field_type: FieldType,
    pub label: String,
    pub validation: FieldValidation,
    pub display_order: i64,
    pub is_active: bool,
}

/// Creation request for a new field definition.
///
/// `field_type` arrives as the raw admin-supplied string so the registry can
/// reject unknown types explicitly.
#[derive(Debug, Clone, PartialEq)]
pub struct NewField {
    pub app_id: AppId,
    pub field_code: String,
    pub field_type: String,
    pub label: String,
    pub validation: FieldValidation,
    pub display_order: i64,
}

impl NewField {
    pub fn new(
        app_id: AppId,
        field_code: impl Into<String>,
        field_type: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            app_id,
            field_code: field_code.into(),
            field_type: field_type.into(),
            label: label.into(),
            validation: FieldValidation::default(),
            display_order: 0,
        }
    }
}
