//! View projection entry points.
//!
//! # Responsibility
//! - Turn a (view definition, record snapshot) pair into a typed
//!   table/calendar/chart projection.
//!
//! # Invariants
//! - Projection is a pure function: inputs are never mutated and identical
//!   inputs produce identical output.
//! - Stale field references in view configs are skipped, never errors.
//! - Input is a bounded snapshot; projection stays synchronous.

use crate::model::field::FieldDefinition;
use crate::model::record::Record;
use crate::model::view::{ViewConfig, ViewDefinition};
use serde::Serialize;

pub mod calendar;
pub mod chart;
pub mod table;

pub use calendar::{project_calendar, CalendarEntry, CalendarProjection};
pub use chart::{project_chart, ChartPoint, ChartProjection, ChartSeries};
pub use table::{project_table, TableColumn, TableProjection, TableRow};

/// View-type-specific projection output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Projection {
    Table(TableProjection),
    Calendar(CalendarProjection),
    Chart(ChartProjection),
}

/// Projects a record snapshot through a saved view definition.
///
/// `fields` must be the app's *current* active field set; column and field
/// references are resolved against it at projection time.
pub fn project(
    view: &ViewDefinition,
    fields: &[FieldDefinition],
    records: &[Record],
) -> Projection {
    match &view.config {
        ViewConfig::Table(config) => Projection::Table(project_table(config, fields, records)),
        ViewConfig::Calendar(config) => {
            Projection::Calendar(project_calendar(config, fields, records))
        }
        ViewConfig::Chart(config) => Projection::Chart(project_chart(config, records)),
    }
}
