//! Calendar projection: date-keyed entries from a record snapshot.
//!
//! # Invariants
//! - Records whose date field is missing or not a valid calendar date are
//!   excluded, never errors.
//! - Entries are ordered by (date, record number) for deterministic output.

use crate::model::field::FieldDefinition;
use crate::model::record::{date_is_valid, FieldValue, Record, RecordId};
use crate::model::view::CalendarConfig;
use serde::Serialize;

/// One record placed on the calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarEntry {
    pub date: String,
    pub title: String,
    pub record_id: RecordId,
    pub record_number: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarProjection {
    pub entries: Vec<CalendarEntry>,
}

/// Projects records onto a calendar keyed by the configured date field.
pub fn project_calendar(
    config: &CalendarConfig,
    fields: &[FieldDefinition],
    records: &[Record],
) -> CalendarProjection {
    let title_field = config
        .title_field
        .as_deref()
        .filter(|code| {
            fields
                .iter()
                .any(|field| field.is_active && field.field_code == *code)
        });

    let mut entries: Vec<CalendarEntry> = records
        .iter()
        .filter_map(|record| {
            let date = match record.data.get(&config.date_field) {
                Some(FieldValue::Date(value)) | Some(FieldValue::Text(value))
                    if date_is_valid(value) =>
                {
                    value.clone()
                }
                _ => return None,
            };
            let title = title_field
                .and_then(|code| record.data.get(code))
                .map(ToString::to_string)
                .unwrap_or_else(|| format!("#{}", record.record_number));
            Some(CalendarEntry {
                date,
                title,
                record_id: record.id,
                record_number: record.record_number,
            })
        })
        .collect();

    entries.sort_by(|left, right| {
        left.date
            .cmp(&right.date)
            .then(left.record_number.cmp(&right.record_number))
    });
    CalendarProjection { entries }
}

#[cfg(test)]
mod tests {
    use super::project_calendar;
    use crate::model::field::{FieldDefinition, FieldType, FieldValidation};
    use crate::model::record::{FieldValue, Record, RecordData};
    use crate::model::view::CalendarConfig;
    use uuid::Uuid;

    fn field(code: &str, field_type: FieldType) -> FieldDefinition {
        FieldDefinition {
            id: Uuid::new_v4(),
            app_id: Uuid::nil(),
            field_code: code.to_string(),
            field_type,
            label: code.to_string(),
            validation: FieldValidation::default(),
            display_order: 0,
            is_active: true,
        }
    }

    fn record(number: i64, data: RecordData) -> Record {
        Record {
            id: Uuid::new_v4(),
            app_id: Uuid::nil(),
            record_number: number,
            data,
            current_status_id: None,
            is_deleted: false,
            created_by: "u1".to_string(),
            updated_by: "u1".to_string(),
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn records_without_parseable_dates_are_excluded() {
        let fields = vec![field("due", FieldType::Date), field("title", FieldType::Text)];
        let config = CalendarConfig {
            date_field: "due".to_string(),
            title_field: Some("title".to_string()),
        };

        let mut with_date = RecordData::new();
        with_date.insert("due".to_string(), FieldValue::Date("2025-03-01".to_string()));
        with_date.insert("title".to_string(), FieldValue::Text("kickoff".to_string()));

        let mut bad_date = RecordData::new();
        bad_date.insert("due".to_string(), FieldValue::Text("soon".to_string()));

        let records = vec![
            record(1, with_date),
            record(2, bad_date),
            record(3, RecordData::new()),
        ];

        let projection = project_calendar(&config, &fields, &records);
        assert_eq!(projection.entries.len(), 1);
        assert_eq!(projection.entries[0].title, "kickoff");
        assert_eq!(projection.entries[0].date, "2025-03-01");
    }

    #[test]
    fn entries_sort_by_date_then_record_number_with_fallback_titles() {
        let fields = vec![field("due", FieldType::Date)];
        let config = CalendarConfig {
            date_field: "due".to_string(),
            title_field: None,
        };

        let mut later = RecordData::new();
        later.insert("due".to_string(), FieldValue::Date("2025-05-02".to_string()));
        let mut earlier = RecordData::new();
        earlier.insert("due".to_string(), FieldValue::Date("2025-05-01".to_string()));

        let projection = project_calendar(&config, &fields, &[record(7, later), record(2, earlier)]);
        assert_eq!(projection.entries[0].date, "2025-05-01");
        assert_eq!(projection.entries[0].title, "#2");
        assert_eq!(projection.entries[1].title, "#7");
    }
}
