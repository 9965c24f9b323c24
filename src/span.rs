// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::{
    collections::HashMap,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use crate::sampling::SamplingMechanism;
use crate::trace::Trace;
use crate::tracer::TracerCore;

const ERROR_MESSAGE_TAG: &str = "error.msg";

/// A tag value accepted by [`Span::set_tag`].
///
/// Numeric values land in the span's metrics map, booleans are stored as
/// 0/1 metrics, everything else is coerced to a string tag.
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Str(String),
    Float(f64),
    Int(i64),
    Bool(bool),
}

impl From<&str> for TagValue {
    fn from(v: &str) -> Self {
        TagValue::Str(v.to_string())
    }
}

impl From<String> for TagValue {
    fn from(v: String) -> Self {
        TagValue::Str(v)
    }
}

impl From<f64> for TagValue {
    fn from(v: f64) -> Self {
        TagValue::Float(v)
    }
}

impl From<i64> for TagValue {
    fn from(v: i64) -> Self {
        TagValue::Int(v)
    }
}

impl From<i32> for TagValue {
    fn from(v: i32) -> Self {
        TagValue::Int(v as i64)
    }
}

impl From<u32> for TagValue {
    fn from(v: u32) -> Self {
        TagValue::Int(v as i64)
    }
}

impl From<bool> for TagValue {
    fn from(v: bool) -> Self {
        TagValue::Bool(v)
    }
}

/// The recorded fields of a single span, as handed to encoders.
#[derive(Debug, Clone)]
pub struct SpanData {
    pub trace_id: u64,
    pub span_id: u64,
    /// 0 when this span is the trace root.
    pub parent_id: u64,
    pub service: String,
    pub name: String,
    pub resource: String,
    pub span_type: Option<String>,
    /// Wall-clock start in nanoseconds since the epoch.
    pub start: u64,
    /// Nanoseconds, 0 until the span finishes.
    pub duration: u64,
    pub error: bool,
    pub meta: HashMap<String, String>,
    pub metrics: HashMap<String, f64>,
    pub(crate) baggage: Arc<HashMap<String, String>>,
    pub(crate) finished: bool,
}

impl SpanData {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        trace_id: u64,
        span_id: u64,
        parent_id: u64,
        service: String,
        name: String,
        resource: String,
        start: u64,
        baggage: Arc<HashMap<String, String>>,
    ) -> Self {
        SpanData {
            trace_id,
            span_id,
            parent_id,
            service,
            name,
            resource,
            span_type: None,
            start,
            duration: 0,
            error: false,
            meta: HashMap::new(),
            metrics: HashMap::new(),
            baggage,
            finished: false,
        }
    }

    pub(crate) fn apply_tag(&mut self, key: String, value: TagValue) {
        match value {
            TagValue::Str(v) => {
                self.meta.insert(key, v);
            }
            TagValue::Float(v) => {
                self.metrics.insert(key, v);
            }
            TagValue::Int(v) => {
                self.metrics.insert(key, v as f64);
            }
            TagValue::Bool(v) => {
                self.metrics.insert(key, if v { 1.0 } else { 0.0 });
            }
        }
    }
}

/// Handle to one span of an in-flight trace.
///
/// The span's data lives inside its [`Trace`], so handles are cheap to
/// clone and all mutation goes through the trace lock. Every operation is
/// a no-op once the span has finished or the trace has sealed.
#[derive(Clone)]
pub struct Span {
    pub(crate) trace: Trace,
    pub(crate) index: usize,
    pub(crate) core: Arc<TracerCore>,
}

impl Span {
    pub(crate) fn from_parts(trace: Trace, index: usize, core: Arc<TracerCore>) -> Self {
        Span { trace, index, core }
    }

    /// Runs `f` against the span's mutable record, skipping spans that
    /// already finished or whose trace has sealed.
    fn with_open_span<R>(&self, f: impl FnOnce(&mut SpanData) -> R) -> Option<R> {
        let mut inner = self.trace.lock();
        if inner.sealed {
            return None;
        }
        let data = inner.spans.get_mut(self.index)?;
        if data.finished {
            return None;
        }
        Some(f(data))
    }

    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    pub fn trace_id(&self) -> u64 {
        self.trace.trace_id()
    }

    pub fn span_id(&self) -> Option<u64> {
        let inner = self.trace.lock();
        inner.spans.get(self.index).map(|s| s.span_id)
    }

    /// Sets a single tag, routing the value by type: numbers and booleans
    /// become metrics, strings become meta entries.
    pub fn set_tag(&self, key: impl Into<String>, value: impl Into<TagValue>) {
        let (key, value) = (key.into(), value.into());
        self.with_open_span(|data| data.apply_tag(key, value));
    }

    pub fn add_tags<K, V>(&self, tags: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: Into<TagValue>,
    {
        self.with_open_span(|data| {
            for (key, value) in tags {
                data.apply_tag(key.into(), value.into());
            }
        });
    }

    /// Flags the span as errored and records the error message.
    pub fn add_error(&self, error: &(dyn std::error::Error + 'static)) {
        let message = error.to_string();
        self.with_open_span(|data| {
            data.error = true;
            data.meta.insert(ERROR_MESSAGE_TAG.to_string(), message);
        });
    }

    pub fn set_error(&self, error: bool) {
        self.with_open_span(|data| data.error = error);
    }

    pub fn set_resource(&self, resource: impl Into<String>) {
        let resource = resource.into();
        self.with_open_span(|data| data.resource = resource);
    }

    pub fn set_span_type(&self, span_type: impl Into<String>) {
        let span_type = span_type.into();
        self.with_open_span(|data| data.span_type = Some(span_type));
    }

    /// Sets a baggage item visible to this span and to children started
    /// after the call. The map is copy-on-write, so siblings holding the
    /// previous map are unaffected.
    pub fn set_baggage_item(&self, key: impl Into<String>, value: impl Into<String>) {
        let (key, value) = (key.into(), value.into());
        self.with_open_span(|data| {
            Arc::make_mut(&mut data.baggage).insert(key, value);
        });
    }

    pub fn baggage_item(&self, key: &str) -> Option<String> {
        let inner = self.trace.lock();
        inner
            .spans
            .get(self.index)
            .and_then(|data| data.baggage.get(key).cloned())
    }

    /// Forces the trace's sampling decision from user code. Does nothing
    /// when a decision was already taken.
    pub fn sample(&self, keep: bool) {
        let mut inner = self.trace.lock();
        inner.set_sampling_decision(SamplingMechanism::Manual.decide(keep));
    }

    /// Finishes the span with the current time.
    pub fn finish(&self) {
        self.finish_at(None)
    }

    /// Finishes the span at an explicit end time, for callers that measure
    /// the operation themselves.
    pub fn finish_with_end(&self, end: SystemTime) {
        self.finish_at(Some(end))
    }

    fn finish_at(&self, end: Option<SystemTime>) {
        let mut inner = self.trace.lock();
        if inner.sealed {
            return;
        }
        // Durations are measured from the trace's baseline, not the
        // span's own start, so every span in a trace shares one clock.
        let trace_start = inner.start_ns;
        let now_ns = inner.now_ns();
        let Some(data) = inner.spans.get_mut(self.index) else {
            return;
        };
        if data.finished {
            return;
        }
        data.finished = true;
        data.duration = match end {
            Some(end) => {
                let end_ns = end
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_nanos() as u64;
                end_ns.saturating_sub(trace_start)
            }
            // Monotonic elapsed since the baseline, immune to wall-clock
            // adjustments.
            None => now_ns.saturating_sub(trace_start),
        };
        inner.finished += 1;
        if inner.finished == inner.started {
            self.core.seal_locked(&mut inner);
        }
    }
}

impl std::fmt::Debug for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Span")
            .field("trace_id", &self.trace.trace_id())
            .field("index", &self.index)
            .finish()
    }
}
