// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::{Instant, SystemTime, UNIX_EPOCH},
};

use crate::sampling::{SamplingDecision, SamplingPriority};
use crate::span::SpanData;

/// Shared bookkeeping for one local trace.
///
/// A trace is created together with its root span and lives until every
/// span started on it has finished. At that point a sampling decision is
/// taken (if none was recorded earlier), the spans are handed to the
/// exporter when the decision is keep, and the trace seals itself. A sealed
/// trace ignores all further mutation.
#[derive(Clone)]
pub struct Trace {
    inner: Arc<Mutex<TraceInner>>,
}

pub(crate) struct TraceInner {
    pub(crate) trace_id: u64,
    /// Spans in start order. The root span is always at index 0.
    pub(crate) spans: Vec<SpanData>,
    pub(crate) started: u32,
    pub(crate) finished: u32,
    pub(crate) sampling: Option<SamplingDecision>,
    /// Trace-level string tags, merged into the root span at export.
    pub(crate) meta: HashMap<String, String>,
    /// Trace-level numeric tags, merged into the root span at export.
    pub(crate) metrics: HashMap<String, f64>,
    pub(crate) origin: Option<String>,
    /// Wall-clock start in nanoseconds since the epoch, captured once.
    pub(crate) start_ns: u64,
    /// Monotonic baseline taken at the same moment as `start_ns`. All
    /// subsequent timestamps on this trace derive from it so they cannot
    /// go backwards when the system clock is adjusted.
    pub(crate) ticks: Instant,
    pub(crate) sealed: bool,
}

impl TraceInner {
    /// Current wall-clock time projected from the monotonic baseline.
    pub(crate) fn now_ns(&self) -> u64 {
        self.start_ns + self.ticks.elapsed().as_nanos() as u64
    }

    /// Records the decision unless one exists already. The first decision
    /// wins for the remainder of the trace's life.
    pub(crate) fn set_sampling_decision(&mut self, decision: SamplingDecision) -> bool {
        if self.sealed || self.sampling.is_some() {
            return false;
        }
        self.sampling = Some(decision);
        true
    }
}

impl Trace {
    pub(crate) fn new(trace_id: u64) -> Self {
        let start_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;
        Trace {
            inner: Arc::new(Mutex::new(TraceInner {
                trace_id,
                spans: Vec::new(),
                started: 0,
                finished: 0,
                sampling: None,
                meta: HashMap::new(),
                metrics: HashMap::new(),
                origin: None,
                start_ns,
                ticks: Instant::now(),
                sealed: false,
            })),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, TraceInner> {
        self.inner.lock().unwrap()
    }

    pub fn trace_id(&self) -> u64 {
        self.lock().trace_id
    }

    pub fn sampling_priority(&self) -> Option<SamplingPriority> {
        self.lock().sampling.map(|d| d.priority)
    }

    /// Marks where this trace originated (e.g. "synthetics"). No-op once
    /// the trace has sealed.
    pub fn set_origin(&self, origin: impl Into<String>) {
        let mut inner = self.lock();
        if !inner.sealed {
            inner.origin = Some(origin.into());
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.lock().sealed
    }
}
