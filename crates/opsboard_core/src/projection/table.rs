//! Table projection: column resolution and row shaping.
//!
//! # Invariants
//! - Configured columns referencing deactivated or unknown fields are
//!   silently skipped.
//! - An unconfigured column list falls back to the first eligible fields
//!   in display order.
//! - Rows keep snapshot order (ascending record number).

use crate::model::field::FieldDefinition;
use crate::model::record::{FieldValue, Record, RecordId};
use crate::model::view::TableConfig;
use serde::Serialize;

/// Number of fallback columns when the view does not configure any.
pub const TABLE_FALLBACK_COLUMNS: usize = 5;

/// One resolved table column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableColumn {
    pub field_code: String,
    pub label: String,
}

/// One projected row; cells align with the projection's column list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    pub record_id: RecordId,
    pub record_number: i64,
    pub cells: Vec<Option<FieldValue>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableProjection {
    pub columns: Vec<TableColumn>,
    pub rows: Vec<TableRow>,
}

/// Projects records into a table using the view's configured columns, or
/// the default eligible field set when unconfigured.
pub fn project_table(
    config: &TableConfig,
    fields: &[FieldDefinition],
    records: &[Record],
) -> TableProjection {
    let columns = resolve_columns(config, fields);
    let rows = records
        .iter()
        .map(|record| TableRow {
            record_id: record.id,
            record_number: record.record_number,
            cells: columns
                .iter()
                .map(|column| record.data.get(&column.field_code).cloned())
                .collect(),
        })
        .collect();

    TableProjection { columns, rows }
}

fn resolve_columns(config: &TableConfig, fields: &[FieldDefinition]) -> Vec<TableColumn> {
    let active: Vec<&FieldDefinition> = fields.iter().filter(|field| field.is_active).collect();

    if config.columns.is_empty() {
        return active
            .iter()
            .filter(|field| field.field_type.is_input() && !field.field_type.hidden_in_list())
            .take(TABLE_FALLBACK_COLUMNS)
            .map(|field| TableColumn {
                field_code: field.field_code.clone(),
                label: field.label.clone(),
            })
            .collect();
    }

    config
        .columns
        .iter()
        .filter_map(|field_code| {
            active
                .iter()
                .find(|field| &field.field_code == field_code)
                .map(|field| TableColumn {
                    field_code: field.field_code.clone(),
                    label: field.label.clone(),
                })
        })
        .collect()
}
