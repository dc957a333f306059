// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Data points accepted by a sender.

use std::collections::BTreeSet;

use derive_more::Display;
use indexmap::IndexMap;
use serde::Serialize;
use uuid::Uuid;

pub mod histogram;

/// Point tags, iterated in insertion order.
pub type Tags = IndexMap<String, String>;

/// Aggregation bin of a distribution. Ordering follows the order lines are emitted in.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HistogramGranularity {
    #[display("!M")]
    Minute,
    #[display("!H")]
    Hour,
    #[display("!D")]
    Day,
}

impl HistogramGranularity {
    pub fn all() -> BTreeSet<HistogramGranularity> {
        BTreeSet::from([Self::Minute, Self::Hour, Self::Day])
    }
}

/// One bucket of a t-digest-style histogram.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Centroid {
    pub value: f64,
    pub count: u32,
}

impl Centroid {
    pub fn new(value: f64, count: u32) -> Self {
        Self { value, count }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpanLog {
    /// Microseconds since epoch.
    pub timestamp: i64,
    pub fields: IndexMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Metric {
    pub name: String,
    pub value: f64,
    /// Epoch seconds. When absent the ingestion time is used.
    pub timestamp: Option<i64>,
    pub source: Option<String>,
    pub tags: Tags,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeltaCounter {
    pub name: String,
    pub value: f64,
    pub source: Option<String>,
    pub tags: Tags,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Distribution {
    pub name: String,
    pub centroids: Vec<Centroid>,
    pub granularities: BTreeSet<HistogramGranularity>,
    pub timestamp: Option<i64>,
    pub source: Option<String>,
    pub tags: Tags,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Span {
    pub name: String,
    pub start_millis: i64,
    pub duration_millis: i64,
    pub source: Option<String>,
    pub trace_id: Uuid,
    pub span_id: Uuid,
    pub parents: Vec<Uuid>,
    pub follows_from: Vec<Uuid>,
    /// Span tags keep duplicates, unlike point tags.
    pub tags: Vec<(String, String)>,
    pub span_logs: Vec<SpanLog>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Event {
    pub name: String,
    pub start_millis: i64,
    /// Zero means the event lasts one millisecond.
    pub end_millis: i64,
    pub source: Option<String>,
    pub tags: Vec<String>,
    pub annotations: IndexMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DataPoint {
    Metric(Metric),
    DeltaCounter(DeltaCounter),
    Distribution(Distribution),
    Span(Span),
    Event(Event),
}

impl From<Metric> for DataPoint {
    fn from(metric: Metric) -> Self {
        Self::Metric(metric)
    }
}

impl From<DeltaCounter> for DataPoint {
    fn from(counter: DeltaCounter) -> Self {
        Self::DeltaCounter(counter)
    }
}

impl From<Distribution> for DataPoint {
    fn from(distribution: Distribution) -> Self {
        Self::Distribution(distribution)
    }
}

impl From<Span> for DataPoint {
    fn from(span: Span) -> Self {
        Self::Span(span)
    }
}

impl From<Event> for DataPoint {
    fn from(event: Event) -> Self {
        Self::Event(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_granularity_markers() {
        let markers: Vec<String> = HistogramGranularity::all()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(markers, vec!["!M", "!H", "!D"]);
    }

    #[test]
    fn test_data_point_from_entity() {
        let point: DataPoint = Event {
            name: "deploy".to_string(),
            start_millis: 1,
            ..Default::default()
        }
        .into();
        assert!(matches!(point, DataPoint::Event(ref e) if e.name == "deploy"));
    }
}
