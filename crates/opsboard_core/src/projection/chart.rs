//! Chart projection: bucketing and aggregation over a record snapshot.
//!
//! # Invariants
//! - Records are bucketed by (x value, group value); a missing group field
//!   collapses everything into a single series.
//! - `Count` ignores the y field entirely; the other aggregations skip
//!   records whose y value is missing or not numeric.
//! - Series and buckets are emitted in lexicographic order so identical
//!   inputs serialize identically.

use crate::model::record::{FieldValue, Record};
use crate::model::view::{Aggregation, ChartConfig, ChartType};
use serde::Serialize;
use std::collections::BTreeMap;

/// One aggregated bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub x: String,
    pub value: f64,
}

/// One series of buckets; `name` is `None` for the single collapsed series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSeries {
    pub name: Option<String>,
    pub points: Vec<ChartPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartProjection {
    pub chart_type: ChartType,
    pub aggregation: Aggregation,
    pub series: Vec<ChartSeries>,
}

#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
}

impl Bucket {
    fn add(&mut self, y: f64) {
        if self.count == 0 {
            self.min = y;
            self.max = y;
        } else {
            self.min = self.min.min(y);
            self.max = self.max.max(y);
        }
        self.count += 1;
        self.sum += y;
    }

    fn value(&self, aggregation: Aggregation) -> f64 {
        match aggregation {
            Aggregation::Count => self.count as f64,
            Aggregation::Sum => self.sum,
            Aggregation::Avg => {
                if self.count == 0 {
                    0.0
                } else {
                    self.sum / self.count as f64
                }
            }
            Aggregation::Min => self.min,
            Aggregation::Max => self.max,
        }
    }
}

/// Projects records into aggregated chart series.
pub fn project_chart(config: &ChartConfig, records: &[Record]) -> ChartProjection {
    let mut buckets: BTreeMap<Option<String>, BTreeMap<String, Bucket>> = BTreeMap::new();

    for record in records {
        let Some(x_value) = record.data.get(&config.x_field) else {
            continue;
        };
        let x = x_value.to_string();

        let group = match config.group_field.as_deref() {
            Some(group_field) => record.data.get(group_field).map(ToString::to_string),
            None => None,
        };

        let y = match config.aggregation {
            Aggregation::Count => 0.0,
            _ => {
                let Some(y) = numeric_y(config, record) else {
                    continue;
                };
                y
            }
        };

        buckets
            .entry(group)
            .or_default()
            .entry(x)
            .or_default()
            .add(y);
    }

    let series = buckets
        .into_iter()
        .map(|(name, points)| ChartSeries {
            name,
            points: points
                .into_iter()
                .map(|(x, bucket)| ChartPoint {
                    x,
                    value: bucket.value(config.aggregation),
                })
                .collect(),
        })
        .collect();

    ChartProjection {
        chart_type: config.chart_type,
        aggregation: config.aggregation,
        series,
    }
}

fn numeric_y(config: &ChartConfig, record: &Record) -> Option<f64> {
    let y_field = config.y_field.as_deref()?;
    match record.data.get(y_field)? {
        FieldValue::Number(value) => Some(*value),
        _ => None,
    }
}
