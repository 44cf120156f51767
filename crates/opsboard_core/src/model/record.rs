//! Record domain model and payload coercion.
//!
//! # Responsibility
//! - Define the open record document as a map of typed field values.
//! - Coerce untrusted JSON payloads against active field definitions.
//! - Provide the deep-value diff the history tracker consumes.
//!
//! # Invariants
//! - `record_number` is strictly increasing per app and never reused.
//! - `data` keys are a subset of the app's known field codes at write time.
//! - Upstream payload shapes are never trusted; every value passes through
//!   [`coerce_value`] before persistence.

use crate::model::app::AppId;
use crate::model::field::{FieldDefinition, FieldValidation, ValueKind};
use crate::model::process::StatusId;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for a record.
pub type RecordId = Uuid;

/// Untrusted inbound payload shape: field code -> raw JSON value.
pub type RecordPayload = serde_json::Map<String, Value>;

/// Validated record document: field code -> typed value.
pub type RecordData = BTreeMap<String, FieldValue>;

static ISO_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})$").expect("valid date regex"));

/// Tagged value variant stored in a record document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Date(String),
    Bool(bool),
    List(Vec<String>),
}

impl FieldValue {
    /// Serializes the value to its canonical JSON form.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Text(value) | Self::Date(value) => Value::String(value.clone()),
            Self::Number(value) => serde_json::Number::from_f64(*value)
                .map_or(Value::Null, Value::Number),
            Self::Bool(value) => Value::Bool(*value),
            Self::List(values) => Value::Array(
                values.iter().map(|item| Value::String(item.clone())).collect(),
            ),
        }
    }

    /// Reads a stored JSON value back without schema context.
    ///
    /// Used when loading rows whose field definitions have since been
    /// deactivated or removed; date strings load as text until re-coerced.
    pub fn from_stored(value: &Value) -> Option<Self> {
        match value {
            Value::String(text) => Some(Self::Text(text.clone())),
            Value::Number(number) => number.as_f64().map(Self::Number),
            Value::Bool(flag) => Some(Self::Bool(*flag)),
            Value::Array(items) => {
                let mut list = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::String(text) => list.push(text.clone()),
                        other => list.push(other.to_string()),
                    }
                }
                Some(Self::List(list))
            }
            Value::Null | Value::Object(_) => None,
        }
    }
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(value) | Self::Date(value) => write!(f, "{value}"),
            Self::Number(value) => {
                if value.fract() == 0.0 && value.abs() < 1e15 {
                    write!(f, "{}", *value as i64)
                } else {
                    write!(f, "{value}")
                }
            }
            Self::Bool(value) => write!(f, "{value}"),
            Self::List(values) => write!(f, "{}", values.join(", ")),
        }
    }
}

/// Total ordering over optional field values for stable list sorting.
///
/// Missing values always sort last; numbers compare numerically, everything
/// else compares as its display string.
pub fn compare_values(left: Option<&FieldValue>, right: Option<&FieldValue>) -> Ordering {
    match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(FieldValue::Number(a)), Some(FieldValue::Number(b))) => {
            a.partial_cmp(b).unwrap_or(Ordering::Equal)
        }
        (Some(a), Some(b)) => a.to_string().cmp(&b.to_string()),
    }
}

/// Returns whether `value` is a valid `YYYY-MM-DD` calendar date.
pub fn date_is_valid(value: &str) -> bool {
    let Some(caps) = ISO_DATE_RE.captures(value) else {
        return false;
    };
    let year: i32 = caps[1].parse().unwrap_or(0);
    let month: u32 = caps[2].parse().unwrap_or(0);
    let day: u32 = caps[3].parse().unwrap_or(0);
    if year == 0 || !(1..=12).contains(&month) {
        return false;
    }
    day >= 1 && day <= days_in_month(year, month)
}

fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            if (year % 4 == 0 && year % 100 != 0) || year % 400 == 0 {
                29
            } else {
                28
            }
        }
        _ => 0,
    }
}

/// One row owned by an app: open data document plus immutable sequential
/// record number.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: RecordId,
    pub app_id: AppId,
    pub record_number: i64,
    pub data: RecordData,
    /// Cache of the latest process log's target status; `None` means the
    /// record still sits on the app's initial status (or the app has no
    /// workflow).
    pub current_status_id: Option<StatusId>,
    pub is_deleted: bool,
    pub created_by: String,
    pub updated_by: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Payload validation errors surfaced before any write happens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Payload key does not match any active field of the app.
    UnknownField(String),
    /// Payload writes to a computed (non-input) field.
    NotInputField(String),
    MissingRequired(String),
    TypeMismatch {
        field_code: String,
        expected: &'static str,
    },
    TooLong {
        field_code: String,
        max_length: u32,
    },
    OutOfRange(String),
    UnknownOption {
        field_code: String,
        value: String,
    },
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownField(field_code) => {
                write!(f, "unknown field `{field_code}`")
            }
            Self::NotInputField(field_code) => {
                write!(f, "field `{field_code}` is not an input field")
            }
            Self::MissingRequired(field_code) => {
                write!(f, "required field `{field_code}` is missing")
            }
            Self::TypeMismatch {
                field_code,
                expected,
            } => write!(f, "field `{field_code}` expects a {expected} value"),
            Self::TooLong {
                field_code,
                max_length,
            } => write!(f, "field `{field_code}` exceeds max length {max_length}"),
            Self::OutOfRange(field_code) => {
                write!(f, "field `{field_code}` is out of the allowed range")
            }
            Self::UnknownOption { field_code, value } => {
                write!(f, "field `{field_code}` does not allow option `{value}`")
            }
        }
    }
}

impl Error for ValidationError {}

/// Coerces one raw JSON value into the typed variant `field` stores.
///
/// Lenient where the intent is unambiguous (numeric strings for number
/// fields, scalars for single-element lists), strict everywhere else.
pub fn coerce_value(
    field: &FieldDefinition,
    raw: &Value,
) -> Result<FieldValue, ValidationError> {
    let field_code = field.field_code.as_str();
    let value = match (field.field_type.value_kind(), raw) {
        (ValueKind::Text, Value::String(text)) => FieldValue::Text(text.clone()),
        (ValueKind::Text, Value::Number(number)) => FieldValue::Text(number.to_string()),
        (ValueKind::Text, Value::Bool(flag)) => FieldValue::Text(flag.to_string()),
        (ValueKind::Number, Value::Number(number)) => match number.as_f64() {
            Some(parsed) => FieldValue::Number(parsed),
            None => {
                return Err(ValidationError::TypeMismatch {
                    field_code: field_code.to_string(),
                    expected: "number",
                })
            }
        },
        (ValueKind::Number, Value::String(text)) => match text.trim().parse::<f64>() {
            Ok(parsed) if parsed.is_finite() => FieldValue::Number(parsed),
            _ => {
                return Err(ValidationError::TypeMismatch {
                    field_code: field_code.to_string(),
                    expected: "number",
                })
            }
        },
        (ValueKind::Date, Value::String(text)) if date_is_valid(text) => {
            FieldValue::Date(text.clone())
        }
        (ValueKind::Date, _) => {
            return Err(ValidationError::TypeMismatch {
                field_code: field_code.to_string(),
                expected: "date (YYYY-MM-DD)",
            })
        }
        (ValueKind::Bool, Value::Bool(flag)) => FieldValue::Bool(*flag),
        (ValueKind::Bool, Value::String(text)) => match text.as_str() {
            "true" => FieldValue::Bool(true),
            "false" => FieldValue::Bool(false),
            _ => {
                return Err(ValidationError::TypeMismatch {
                    field_code: field_code.to_string(),
                    expected: "boolean",
                })
            }
        },
        (ValueKind::List, Value::Array(items)) => {
            let mut list = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(text) => list.push(text.clone()),
                    _ => {
                        return Err(ValidationError::TypeMismatch {
                            field_code: field_code.to_string(),
                            expected: "list of strings",
                        })
                    }
                }
            }
            FieldValue::List(list)
        }
        (ValueKind::List, Value::String(text)) => FieldValue::List(vec![text.clone()]),
        _ => {
            return Err(ValidationError::TypeMismatch {
                field_code: field_code.to_string(),
                expected: expected_label(field.field_type.value_kind()),
            })
        }
    };

    check_rules(field_code, &field.validation, &value)?;
    Ok(value)
}

fn expected_label(kind: ValueKind) -> &'static str {
    match kind {
        ValueKind::Text => "text",
        ValueKind::Number => "number",
        ValueKind::Date => "date (YYYY-MM-DD)",
        ValueKind::Bool => "boolean",
        ValueKind::List => "list of strings",
    }
}

fn check_rules(
    field_code: &str,
    rules: &FieldValidation,
    value: &FieldValue,
) -> Result<(), ValidationError> {
    match value {
        FieldValue::Text(text) => {
            if let Some(max_length) = rules.max_length {
                if text.chars().count() > max_length as usize {
                    return Err(ValidationError::TooLong {
                        field_code: field_code.to_string(),
                        max_length,
                    });
                }
            }
            if !rules.options.is_empty() && !rules.options.iter().any(|option| option == text) {
                return Err(ValidationError::UnknownOption {
                    field_code: field_code.to_string(),
                    value: text.clone(),
                });
            }
        }
        FieldValue::Number(number) => {
            if rules.min_value.is_some_and(|min| *number < min)
                || rules.max_value.is_some_and(|max| *number > max)
            {
                return Err(ValidationError::OutOfRange(field_code.to_string()));
            }
        }
        FieldValue::Date(_) | FieldValue::Bool(_) | FieldValue::List(_) => {}
    }
    Ok(())
}

/// Validates an untrusted payload against the app's active input fields.
///
/// `require_all = true` additionally enforces required fields that are
/// absent from the payload (record creation); partial updates only check
/// the keys they touch. An explicit JSON `null` clears the field and is
/// rejected for required fields.
pub fn validate_payload(
    fields: &[FieldDefinition],
    payload: &RecordPayload,
    require_all: bool,
) -> Result<PayloadChanges, ValidationError> {
    let active: BTreeMap<&str, &FieldDefinition> = fields
        .iter()
        .filter(|field| field.is_active)
        .map(|field| (field.field_code.as_str(), field))
        .collect();

    let mut set = RecordData::new();
    let mut cleared = Vec::new();

    for (key, raw) in payload {
        let Some(field) = active.get(key.as_str()) else {
            return Err(ValidationError::UnknownField(key.clone()));
        };
        if !field.field_type.is_input() {
            return Err(ValidationError::NotInputField(key.clone()));
        }
        if raw.is_null() {
            if field.validation.required {
                return Err(ValidationError::MissingRequired(key.clone()));
            }
            cleared.push(key.clone());
            continue;
        }
        set.insert(key.clone(), coerce_value(field, raw)?);
    }

    if require_all {
        for field in active.values() {
            if field.validation.required
                && field.field_type.is_input()
                && !set.contains_key(field.field_code.as_str())
            {
                return Err(ValidationError::MissingRequired(field.field_code.clone()));
            }
        }
    }

    Ok(PayloadChanges { set, cleared })
}

/// Outcome of payload validation: values to set and fields to clear.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PayloadChanges {
    pub set: RecordData,
    pub cleared: Vec<String>,
}

impl PayloadChanges {
    /// Applies the changes on top of an existing document.
    pub fn apply_to(&self, data: &RecordData) -> RecordData {
        let mut next = data.clone();
        for key in &self.cleared {
            next.remove(key);
        }
        for (key, value) in &self.set {
            next.insert(key.clone(), value.clone());
        }
        next
    }
}

/// One field-level difference between two record documents.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub field_code: String,
    pub old_value: Option<FieldValue>,
    pub new_value: Option<FieldValue>,
}

/// Deep-compares two documents restricted to tracked (input) fields.
///
/// Equal serialized values produce no change entry, so a no-op update
/// yields an empty diff.
pub fn diff_tracked_fields(
    fields: &[FieldDefinition],
    old: &RecordData,
    new: &RecordData,
) -> Vec<FieldChange> {
    let mut changes = Vec::new();
    for field in fields {
        if !field.field_type.is_input() {
            continue;
        }
        let code = field.field_code.as_str();
        let before = old.get(code);
        let after = new.get(code);
        let same = match (before, after) {
            (None, None) => true,
            (Some(a), Some(b)) => a.to_json() == b.to_json(),
            _ => false,
        };
        if !same {
            changes.push(FieldChange {
                field_code: code.to_string(),
                old_value: before.cloned(),
                new_value: after.cloned(),
            });
        }
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::{
        coerce_value, compare_values, date_is_valid, diff_tracked_fields, validate_payload,
        FieldValue, RecordData, ValidationError,
    };
    use crate::model::field::{FieldDefinition, FieldType, FieldValidation, NewField};
    use serde_json::json;
    use uuid::Uuid;

    fn field(code: &str, field_type: FieldType) -> FieldDefinition {
        let draft = NewField::new(Uuid::new_v4(), code, field_type.as_str(), code);
        FieldDefinition {
            id: Uuid::new_v4(),
            app_id: draft.app_id,
            field_code: draft.field_code,
            field_type,
            label: draft.label,
            validation: FieldValidation::default(),
            display_order: 0,
            is_active: true,
        }
    }

    #[test]
    fn date_validation_accepts_real_calendar_dates_only() {
        assert!(date_is_valid("2025-01-10"));
        assert!(date_is_valid("2024-02-29"));
        assert!(!date_is_valid("2025-02-29"));
        assert!(!date_is_valid("2025-13-01"));
        assert!(!date_is_valid("2025-00-10"));
        assert!(!date_is_valid("2025-1-10"));
        assert!(!date_is_valid("tomorrow"));
    }

    #[test]
    fn coercion_accepts_numeric_strings_for_number_fields() {
        let number = field("amount", FieldType::Number);
        assert_eq!(
            coerce_value(&number, &json!("42.5")).unwrap(),
            FieldValue::Number(42.5)
        );
        assert!(matches!(
            coerce_value(&number, &json!("not a number")),
            Err(ValidationError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn coercion_rejects_malformed_dates() {
        let due = field("due", FieldType::Date);
        assert_eq!(
            coerce_value(&due, &json!("2025-01-10")).unwrap(),
            FieldValue::Date("2025-01-10".to_string())
        );
        assert!(matches!(
            coerce_value(&due, &json!("01/10/2025")),
            Err(ValidationError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn dropdown_options_are_enforced() {
        let mut priority = field("priority", FieldType::Dropdown);
        priority.validation.options = vec!["low".to_string(), "high".to_string()];
        assert!(coerce_value(&priority, &json!("low")).is_ok());
        assert!(matches!(
            coerce_value(&priority, &json!("urgent")),
            Err(ValidationError::UnknownOption { .. })
        ));
    }

    #[test]
    fn payload_validation_rejects_unknown_and_computed_fields() {
        let mut score = field("score", FieldType::Computed);
        score.validation.required = false;
        let fields = vec![field("title", FieldType::Text), score];

        let unknown = serde_json::from_value(json!({"missing": "x"})).unwrap();
        assert!(matches!(
            validate_payload(&fields, &unknown, false),
            Err(ValidationError::UnknownField(_))
        ));

        let computed = serde_json::from_value(json!({"score": "9"})).unwrap();
        assert!(matches!(
            validate_payload(&fields, &computed, false),
            Err(ValidationError::NotInputField(_))
        ));
    }

    #[test]
    fn required_fields_are_checked_on_full_validation_only() {
        let mut title = field("title", FieldType::Text);
        title.validation.required = true;
        let fields = vec![title, field("due", FieldType::Date)];

        let partial = serde_json::from_value(json!({"due": "2025-01-10"})).unwrap();
        assert!(validate_payload(&fields, &partial, false).is_ok());
        assert!(matches!(
            validate_payload(&fields, &partial, true),
            Err(ValidationError::MissingRequired(_))
        ));
    }

    #[test]
    fn null_clears_optional_fields_and_rejects_required_ones() {
        let mut title = field("title", FieldType::Text);
        title.validation.required = true;
        let fields = vec![title, field("due", FieldType::Date)];

        let clear_due = serde_json::from_value(json!({"due": null})).unwrap();
        let changes = validate_payload(&fields, &clear_due, false).unwrap();
        assert_eq!(changes.cleared, vec!["due".to_string()]);

        let clear_title = serde_json::from_value(json!({"title": null})).unwrap();
        assert!(matches!(
            validate_payload(&fields, &clear_title, false),
            Err(ValidationError::MissingRequired(_))
        ));
    }

    #[test]
    fn diff_reports_only_changed_tracked_fields() {
        let fields = vec![
            field("title", FieldType::Text),
            field("due", FieldType::Date),
            field("score", FieldType::Computed),
        ];

        let mut old = RecordData::new();
        old.insert("title".to_string(), FieldValue::Text("A".to_string()));
        old.insert("due".to_string(), FieldValue::Date("2025-01-10".to_string()));
        old.insert("score".to_string(), FieldValue::Text("1".to_string()));

        let mut new = old.clone();
        new.insert("title".to_string(), FieldValue::Text("B".to_string()));
        new.insert("score".to_string(), FieldValue::Text("2".to_string()));

        let changes = diff_tracked_fields(&fields, &old, &new);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].field_code, "title");

        assert!(diff_tracked_fields(&fields, &old, &old).is_empty());
    }

    #[test]
    fn value_ordering_sorts_numbers_numerically_and_missing_last() {
        let two = FieldValue::Number(2.0);
        let ten = FieldValue::Number(10.0);
        assert!(compare_values(Some(&two), Some(&ten)).is_lt());
        assert!(compare_values(Some(&ten), None).is_lt());
        assert!(compare_values(None, Some(&two)).is_gt());
    }

    #[test]
    fn display_formats_integers_without_fraction() {
        assert_eq!(FieldValue::Number(3.0).to_string(), "3");
        assert_eq!(FieldValue::Number(3.5).to_string(), "3.5");
        assert_eq!(
            FieldValue::List(vec!["a".to_string(), "b".to_string()]).to_string(),
            "a, b"
        );
    }
}
