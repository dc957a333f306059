// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Wavefront line format encoding.
//!
//! Every function here is pure: the same point always yields byte-identical output. Names
//! and tag keys are sanitized (illegal characters become `-`), tag values and sources are
//! escaped. Encoding only fails when a required field is missing.
//!
//! ```
//! use wavefront_sender::encoder::metric_to_line_data;
//! use wavefront_sender::entities::Metric;
//!
//! let metric = Metric {
//!     name: "new-york.power.usage".to_string(),
//!     value: 42422.0,
//!     timestamp: Some(1493773500),
//!     source: Some("localhost".to_string()),
//!     tags: [("datacenter".to_string(), "dc1".to_string())].into_iter().collect(),
//! };
//! assert_eq!(
//!     metric_to_line_data(&metric, "defaultSource").unwrap(),
//!     "\"new-york.power.usage\" 42422.0 1493773500 source=\"localhost\" \"datacenter\"=\"dc1\"\n"
//! );
//! ```

use indexmap::IndexMap;
use serde::Serialize;

use crate::constants::{DELTA_PREFIX, DELTA_PREFIX_2, SPAN_LOG_KEY, TILDE_PREFIX};
use crate::entities::{DeltaCounter, Distribution, Event, Metric, Span, SpanLog, Tags};
use crate::errors::EncodingError;

/// Sanitizes a metric name or tag key and wraps it in double quotes.
pub fn sanitize(name: &str) -> String {
    sanitize_internal(name, true)
}

pub fn sanitize_without_quotes(name: &str) -> String {
    sanitize_internal(name, false)
}

/// Trims a tag value or source, escapes quotes and newlines, and wraps it in double quotes.
pub fn sanitize_value(value: &str) -> String {
    let escaped = value.trim().replace('"', "\\\"").replace('\n', "\\n");
    format!("\"{escaped}\"")
}

// Legal characters are `,` `-` `.`, ASCII digits and letters, and `_`.
fn is_legal_char(c: char) -> bool {
    matches!(c, ','..='.' | '0'..='9' | 'A'..='Z' | 'a'..='z' | '_')
}

fn sanitize_internal(name: &str, add_quotes: bool) -> String {
    let mut chars = name.chars();
    let first = chars.next();
    let second = chars.next();
    let delta_prefixed = matches!(first, Some(DELTA_PREFIX) | Some(DELTA_PREFIX_2));
    let tilde_prefixed = first == Some(TILDE_PREFIX);
    let delta_tilde_prefixed = delta_prefixed && second == Some(TILDE_PREFIX);

    let mut builder = String::with_capacity(name.len() + 2);
    if add_quotes {
        builder.push('"');
    }
    for (i, c) in name.chars().enumerate() {
        let legal = is_legal_char(c)
            || (i == 0 && (delta_prefixed || tilde_prefixed))
            || (i == 1 && delta_tilde_prefixed);
        builder.push(if legal { c } else { '-' });
    }
    if add_quotes {
        builder.push('"');
    }
    builder
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

fn resolve_source<'a>(source: Option<&'a str>, default_source: &'a str) -> &'a str {
    match source {
        Some(source) if !is_blank(source) => source,
        _ => default_source,
    }
}

/// Shortest representation that parses back to the same value, always with a fraction
/// for integral values (`42422` is written `42422.0`).
fn format_value(value: f64) -> String {
    format!("{value:?}")
}

fn push_point_tags(
    builder: &mut Vec<String>,
    tags: &Tags,
    kind: &'static str,
) -> Result<(), EncodingError> {
    for (key, value) in tags {
        if is_blank(key) {
            return Err(EncodingError::BlankTagKey(kind));
        }
        if is_blank(value) {
            return Err(EncodingError::BlankTagValue {
                kind,
                key: key.clone(),
            });
        }
        builder.push(format!("{}={}", sanitize(key), sanitize_value(value)));
    }
    Ok(())
}

/// `"<name>" <value> [<timestamp>] source="<source>" ["<key>"="<value>" ...]`
pub fn metric_to_line_data(metric: &Metric, default_source: &str) -> Result<String, EncodingError> {
    point_to_line_data(
        &metric.name,
        metric.value,
        metric.timestamp,
        metric.source.as_deref(),
        &metric.tags,
        default_source,
    )
}

/// Same layout as a metric, with the name forced to start with the delta sigil and no
/// timestamp so that the server aggregates the increments.
pub fn delta_counter_to_line_data(
    counter: &DeltaCounter,
    default_source: &str,
) -> Result<String, EncodingError> {
    if is_blank(&counter.name) {
        return Err(EncodingError::BlankName("Delta counter"));
    }
    let name = if counter.name.starts_with(DELTA_PREFIX) || counter.name.starts_with(DELTA_PREFIX_2)
    {
        counter.name.clone()
    } else {
        format!("{DELTA_PREFIX}{}", counter.name)
    };
    point_to_line_data(
        &name,
        counter.value,
        None,
        counter.source.as_deref(),
        &counter.tags,
        default_source,
    )
}

fn point_to_line_data(
    name: &str,
    value: f64,
    timestamp: Option<i64>,
    source: Option<&str>,
    tags: &Tags,
    default_source: &str,
) -> Result<String, EncodingError> {
    if is_blank(name) {
        return Err(EncodingError::BlankName("Metrics"));
    }
    let source = resolve_source(source, default_source);

    let mut builder = vec![sanitize(name), format_value(value)];
    if let Some(timestamp) = timestamp {
        builder.push(timestamp.to_string());
    }
    builder.push(format!("source={}", sanitize_value(source)));
    push_point_tags(&mut builder, tags, "Metric point")?;
    Ok(builder.join(" ") + "\n")
}

/// One line per granularity:
/// `!<G> [<timestamp>] #<count> <mean> [...] "<name>" source="<source>" [tags]`
pub fn histogram_to_line_data(
    distribution: &Distribution,
    default_source: &str,
) -> Result<String, EncodingError> {
    if is_blank(&distribution.name) {
        return Err(EncodingError::BlankName("Histogram"));
    }
    if distribution.granularities.is_empty() {
        return Err(EncodingError::NoGranularities);
    }
    if distribution.centroids.is_empty() {
        return Err(EncodingError::NoCentroids);
    }
    if distribution.centroids.iter().any(|c| c.count == 0) {
        return Err(EncodingError::EmptyCentroid);
    }
    let source = resolve_source(distribution.source.as_deref(), default_source);

    // Everything after the granularity marker is shared by all lines.
    let mut body = Vec::with_capacity(distribution.centroids.len() * 2 + 3);
    if let Some(timestamp) = distribution.timestamp {
        body.push(timestamp.to_string());
    }
    for centroid in &distribution.centroids {
        body.push(format!("#{}", centroid.count));
        body.push(format_value(centroid.value));
    }
    body.push(sanitize(&distribution.name));
    body.push(format!("source={}", sanitize_value(source)));
    push_point_tags(&mut body, &distribution.tags, "Histogram")?;
    let body = body.join(" ");

    let mut lines = String::new();
    for granularity in &distribution.granularities {
        lines.push_str(&format!("{granularity} {body}\n"));
    }
    Ok(lines)
}

/// `"<name>" source="<source>" traceId=<uuid> spanId=<uuid> [parent=<uuid> ...]
/// [followsFrom=<uuid> ...] ["<key>"="<value>" ...] <start_millis> <duration_millis>`
pub fn tracing_span_to_line_data(span: &Span, default_source: &str) -> Result<String, EncodingError> {
    if is_blank(&span.name) {
        return Err(EncodingError::BlankName("Span"));
    }
    if span.trace_id.is_nil() {
        return Err(EncodingError::NilId("traceId"));
    }
    if span.span_id.is_nil() {
        return Err(EncodingError::NilId("spanId"));
    }
    let source = resolve_source(span.source.as_deref(), default_source);

    let mut builder = vec![
        sanitize_value(&span.name),
        format!("source={}", sanitize_value(source)),
        format!("traceId={}", span.trace_id),
        format!("spanId={}", span.span_id),
    ];
    for parent in &span.parents {
        builder.push(format!("parent={parent}"));
    }
    for follows_from in &span.follows_from {
        builder.push(format!("followsFrom={follows_from}"));
    }
    let span_log_tag = (!span.span_logs.is_empty()).then_some((SPAN_LOG_KEY, "true"));
    let tags = span
        .tags
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .chain(span_log_tag);
    for (key, value) in tags {
        if is_blank(key) {
            return Err(EncodingError::BlankTagKey("Span"));
        }
        if is_blank(value) {
            return Err(EncodingError::BlankTagValue {
                kind: "Span",
                key: key.to_string(),
            });
        }
        builder.push(format!("{}={}", sanitize(key), sanitize_value(value)));
    }
    builder.push(span.start_millis.to_string());
    builder.push(span.duration_millis.to_string());
    Ok(builder.join(" ") + "\n")
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SpanLogLine<'a> {
    trace_id: String,
    span_id: String,
    logs: &'a [SpanLog],
    span: &'a str,
}

/// JSON companion line of a span, correlated through its trace and span ids.
pub fn span_log_to_line_data(span: &Span, span_line: &str) -> Result<String, EncodingError> {
    let line = SpanLogLine {
        trace_id: span.trace_id.to_string(),
        span_id: span.span_id.to_string(),
        logs: &span.span_logs,
        span: span_line.trim_end_matches('\n'),
    };
    let json = serde_json::to_string(&line).map_err(|e| EncodingError::Json(e.to_string()))?;
    Ok(json + "\n")
}

fn validate_event(event: &Event) -> Result<(), EncodingError> {
    if is_blank(&event.name) {
        return Err(EncodingError::BlankName("Event"));
    }
    if event.start_millis == 0 {
        return Err(EncodingError::MissingStartTime);
    }
    for (key, value) in &event.annotations {
        if is_blank(key) {
            return Err(EncodingError::BlankAnnotationKey);
        }
        if is_blank(value) {
            return Err(EncodingError::BlankAnnotationValue(key.clone()));
        }
    }
    if event.tags.iter().any(|tag| is_blank(tag)) {
        return Err(EncodingError::BlankTagKey("Event"));
    }
    Ok(())
}

fn event_end_millis(event: &Event) -> i64 {
    if event.end_millis == 0 {
        event.start_millis + 1
    } else {
        event.end_millis
    }
}

/// `@Event <start> <end> "<name>" [key="<value>" ...] host="<source>" [tag="<tag>" ...]`
pub fn event_to_line_data(event: &Event, default_source: &str) -> Result<String, EncodingError> {
    validate_event(event)?;
    let source = resolve_source(event.source.as_deref(), default_source);

    let mut builder = vec![
        "@Event".to_string(),
        event.start_millis.to_string(),
        event_end_millis(event).to_string(),
        sanitize_value(&event.name),
    ];
    for (key, value) in &event.annotations {
        builder.push(format!(
            "{}={}",
            sanitize_without_quotes(key),
            sanitize_value(value)
        ));
    }
    builder.push(format!("host={}", sanitize_value(source)));
    for tag in &event.tags {
        builder.push(format!("tag={}", sanitize_value(tag)));
    }
    Ok(builder.join(" ") + "\n")
}

fn no_tags(tags: &&[String]) -> bool {
    tags.is_empty()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EventJson<'a> {
    name: &'a str,
    annotations: &'a IndexMap<String, String>,
    hosts: [&'a str; 1],
    start_time: i64,
    end_time: i64,
    #[serde(skip_serializing_if = "no_tags")]
    tags: &'a [String],
}

/// Event body accepted by the direct ingestion events API.
pub fn event_to_json(event: &Event, default_source: &str) -> Result<String, EncodingError> {
    validate_event(event)?;
    let body = EventJson {
        name: &event.name,
        annotations: &event.annotations,
        hosts: [resolve_source(event.source.as_deref(), default_source)],
        start_time: event.start_millis,
        end_time: event_end_millis(event),
        tags: &event.tags,
    };
    serde_json::to_string(&body).map_err(|e| EncodingError::Json(e.to_string()))
}
