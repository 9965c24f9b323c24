// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;

use serde::{Serialize, Serializer};

use crate::span::SpanData;

/// A serialized batch ready to be handed to the transport.
pub struct EncodedPayload {
    pub body: Vec<u8>,
    pub trace_count: usize,
    pub content_type: &'static str,
}

/// Accumulates completed traces and serializes them into one payload per
/// flush. One encoder instance exists per protocol version; the exporter
/// picks the active one on every add.
pub trait TraceEncoder: Send {
    fn add_trace(&mut self, spans: &[SpanData]);

    fn trace_count(&self) -> usize;

    /// Spans buffered across all pending traces.
    fn span_count(&self) -> usize;

    /// Serializes the buffered traces and resets the encoder.
    fn take_payload(&mut self) -> crate::Result<EncodedPayload>;
}

/// JSON rendition of the agent trace payload: an array of traces, each an
/// array of span objects.
#[derive(Default)]
pub struct JsonEncoder {
    traces: Vec<Vec<SpanData>>,
    spans: usize,
}

impl JsonEncoder {
    pub fn new() -> Self {
        JsonEncoder::default()
    }
}

impl TraceEncoder for JsonEncoder {
    fn add_trace(&mut self, spans: &[SpanData]) {
        self.spans += spans.len();
        self.traces.push(spans.to_vec());
    }

    fn trace_count(&self) -> usize {
        self.traces.len()
    }

    fn span_count(&self) -> usize {
        self.spans
    }

    fn take_payload(&mut self) -> crate::Result<EncodedPayload> {
        let traces = std::mem::take(&mut self.traces);
        self.spans = 0;
        let wire: Vec<Vec<WireSpan<'_>>> = traces
            .iter()
            .map(|spans| spans.iter().map(WireSpan::from).collect())
            .collect();
        Ok(EncodedPayload {
            body: serde_json::to_vec(&wire)?,
            trace_count: wire.len(),
            content_type: "application/json",
        })
    }
}

#[derive(Serialize)]
struct WireSpan<'a> {
    trace_id: u64,
    span_id: u64,
    parent_id: u64,
    service: &'a str,
    name: &'a str,
    resource: &'a str,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    span_type: Option<&'a str>,
    start: u64,
    duration: u64,
    error: i32,
    meta: &'a HashMap<String, String>,
    #[serde(serialize_with = "finite_metrics")]
    metrics: &'a HashMap<String, f64>,
}

impl<'a> From<&'a SpanData> for WireSpan<'a> {
    fn from(data: &'a SpanData) -> Self {
        WireSpan {
            trace_id: data.trace_id,
            span_id: data.span_id,
            parent_id: data.parent_id,
            service: &data.service,
            name: &data.name,
            resource: &data.resource,
            span_type: data.span_type.as_deref(),
            start: data.start,
            duration: data.duration,
            error: data.error as i32,
            meta: &data.meta,
            metrics: &data.metrics,
        }
    }
}

/// Non-finite metrics are not representable in JSON, drop them.
fn finite_metrics<S: Serializer>(
    metrics: &&HashMap<String, f64>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_map(metrics.iter().filter(|(_, v)| v.is_finite()))
}
