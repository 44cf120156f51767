//! Saved view definitions: app-scoped projection configurations.
//!
//! # Responsibility
//! - Define the per-view-type configuration shapes persisted as JSON.
//! - Map between the storage pair (`view_type`, `config`) and the typed
//!   configuration enum.
//!
//! # Invariants
//! - At most one view per app carries `is_default`.
//! - Config field references are resolved lazily at projection time; a
//!   stale reference is not an error here.

use crate::model::app::AppId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier for a view definition.
pub type ViewId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewType {
    Table,
    Calendar,
    Chart,
}

impl ViewType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::Calendar => "calendar",
            Self::Chart => "chart",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "table" => Some(Self::Table),
            "calendar" => Some(Self::Calendar),
            "chart" => Some(Self::Chart),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartType {
    Bar,
    Line,
    Pie,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

/// Table view config: explicit column list, or empty for the default
/// first-N eligible fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    pub columns: Vec<String>,
}

/// Calendar view config: which date field drives placement and which field
/// supplies the entry title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarConfig {
    pub date_field: String,
    #[serde(default)]
    pub title_field: Option<String>,
}

/// Chart view config: bucketing and aggregation over a record snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartConfig {
    pub chart_type: ChartType,
    pub x_field: String,
    /// Ignored when `aggregation` is `Count`.
    #[serde(default)]
    pub y_field: Option<String>,
    /// Missing group field collapses all records into a single series.
    #[serde(default)]
    pub group_field: Option<String>,
    pub aggregation: Aggregation,
}

/// View-type-specific configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewConfig {
    Table(TableConfig),
    Calendar(CalendarConfig),
    Chart(ChartConfig),
}

impl ViewConfig {
    pub fn view_type(&self) -> ViewType {
        match self {
            Self::Table(_) => ViewType::Table,
            Self::Calendar(_) => ViewType::Calendar,
            Self::Chart(_) => ViewType::Chart,
        }
    }

    /// Serializes the config body for the storage JSON column.
    pub fn to_config_json(&self) -> serde_json::Result<String> {
        match self {
            Self::Table(config) => serde_json::to_string(config),
            Self::Calendar(config) => serde_json::to_string(config),
            Self::Chart(config) => serde_json::to_string(config),
        }
    }

    /// Rebuilds the typed config from the storage pair.
    pub fn from_parts(view_type: ViewType, config_json: &str) -> serde_json::Result<Self> {
        Ok(match view_type {
            ViewType::Table => Self::Table(serde_json::from_str(config_json)?),
            ViewType::Calendar => Self::Calendar(serde_json::from_str(config_json)?),
            ViewType::Chart => Self::Chart(serde_json::from_str(config_json)?),
        })
    }
}

/// A saved, app-scoped projection over the app's records.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewDefinition {
    pub id: ViewId,
    pub app_id: AppId,
    pub name: String,
    pub config: ViewConfig,
    pub is_default: bool,
}

/// Creation request for a new view definition.
#[derive(Debug, Clone, PartialEq)]
pub struct NewView {
    pub app_id: AppId,
    pub name: String,
    pub config: ViewConfig,
    pub is_default: bool,
}

impl NewView {
    pub fn new(app_id: AppId, name: impl Into<String>, config: ViewConfig) -> Self {
        Self {
            app_id,
            name: name.into(),
            config,
            is_default: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        Aggregation, CalendarConfig, ChartConfig, ChartType, TableConfig, ViewConfig, ViewType,
    };

    #[test]
    fn config_round_trips_through_storage_parts() {
        let config = ViewConfig::Chart(ChartConfig {
            chart_type: ChartType::Bar,
            x_field: "status".to_string(),
            y_field: None,
            group_field: Some("team".to_string()),
            aggregation: Aggregation::Count,
        });

        let json = config.to_config_json().unwrap();
        let restored = ViewConfig::from_parts(ViewType::Chart, &json).unwrap();
        assert_eq!(restored, config);
    }

    #[test]
    fn legacy_config_bodies_tolerate_missing_optional_keys() {
        let table = ViewConfig::from_parts(ViewType::Table, "{}").unwrap();
        assert_eq!(table, ViewConfig::Table(TableConfig::default()));

        let calendar =
            ViewConfig::from_parts(ViewType::Calendar, r#"{"date_field":"due"}"#).unwrap();
        assert_eq!(
            calendar,
            ViewConfig::Calendar(CalendarConfig {
                date_field: "due".to_string(),
                title_field: None,
            })
        );
    }

    #[test]
    fn view_type_strings_round_trip() {
        for view_type in [ViewType::Table, ViewType::Calendar, ViewType::Chart] {
            assert_eq!(ViewType::parse(view_type.as_str()), Some(view_type));
        }
        assert_eq!(ViewType::parse("kanban"), None);
    }
}
