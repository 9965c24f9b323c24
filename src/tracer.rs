// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::{sync::Arc, time::Duration};

use crate::configuration::Config;
use crate::constants::{ORIGIN_TAG, SAMPLING_PRIORITY_TAG};
use crate::dd_debug;
use crate::export::{AgentExporter, AgentResponse, HttpTransport, TraceRequest, Transport};
use crate::id::generate_id;
use crate::sampler::Sampler;
use crate::span::{Span, SpanData};
use crate::trace::{Trace, TraceInner};

/// Entry point of the crate: starts spans, owns the sampler and the
/// exporter, and wires the agent's rate feedback back into sampling.
///
/// # Usage
/// ```no_run
/// use dd_tracer::{Config, Tracer};
///
/// let tracer = Tracer::new(Config::builder().set_service("shop".to_string()).build());
/// let root = tracer.start_span("web.request");
/// let child = tracer.start_child("db.query", &root);
/// child.finish();
/// root.finish();
/// tracer.shutdown(std::time::Duration::from_secs(1));
/// ```
pub struct Tracer {
    core: Arc<TracerCore>,
}

pub(crate) struct TracerCore {
    pub(crate) config: Arc<Config>,
    pub(crate) sampler: Arc<Sampler>,
    pub(crate) exporter: AgentExporter,
}

/// Stands in when the real transport cannot be constructed. Traces are
/// dropped but instrumentation keeps working.
struct DiscardTransport;

impl Transport for DiscardTransport {
    fn send(&mut self, request: TraceRequest) -> crate::error::Result<AgentResponse> {
        dd_debug!(
            "Tracer: no transport available, discarding {} traces",
            request.trace_count
        );
        Ok(AgentResponse {
            rate_by_service: None,
        })
    }
}

impl Tracer {
    pub fn new(config: Config) -> Self {
        let transport: Box<dyn Transport> = match HttpTransport::new() {
            Ok(transport) => Box::new(transport),
            Err(e) => {
                crate::dd_error!("Tracer: failed to set up HTTP transport: {e}");
                Box::new(DiscardTransport)
            }
        };
        Tracer::with_transport(config, transport)
    }

    /// Builds a tracer around a custom delivery mechanism. This is the
    /// seam test doubles plug into.
    pub fn with_transport(config: Config, transport: Box<dyn Transport>) -> Self {
        let config = Arc::new(config);
        let sampler = Arc::new(Sampler::new(Arc::clone(&config)));
        let rates_sink = Arc::clone(&sampler);
        let exporter = AgentExporter::start(
            Arc::clone(&config),
            transport,
            Box::new(move |rates| rates_sink.update(rates)),
        );
        Tracer {
            core: Arc::new(TracerCore {
                config,
                sampler,
                exporter,
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.core.config
    }

    /// Starts a new trace with its root span.
    pub fn start_span(&self, name: impl Into<String>) -> Span {
        self.core.start_root(name.into())
    }

    /// Starts a child of `parent` on the same trace. If the parent's trace
    /// already completed, a fresh trace is started instead.
    pub fn start_child(&self, name: impl Into<String>, parent: &Span) -> Span {
        self.core.start_child(name.into(), parent)
    }

    /// Requests an asynchronous flush of buffered traces.
    pub fn flush(&self) {
        self.core.exporter.flush();
    }

    /// Best-effort final flush, waiting at most `timeout`. Call before
    /// process exit so in-flight traces are not lost.
    pub fn shutdown(&self, timeout: Duration) {
        self.core.exporter.shutdown(timeout);
    }
}

impl TracerCore {
    fn start_root(self: &Arc<Self>, name: String) -> Span {
        let trace = Trace::new(generate_id());
        {
            let mut inner = trace.lock();
            let trace_id = inner.trace_id;
            let start = inner.start_ns;
            for (key, value) in self.config.global_tags() {
                inner.meta.insert(key.to_string(), value.to_string());
            }
            if let Some(env) = self.config.env() {
                inner.meta.insert("env".to_string(), env.to_string());
            }
            if let Some(version) = self.config.version() {
                inner.meta.insert("version".to_string(), version.to_string());
            }
            // The root span reuses the trace id as its span id.
            inner.spans.push(SpanData::new(
                trace_id,
                trace_id,
                0,
                self.config.service().to_string(),
                name.clone(),
                name,
                start,
                Arc::default(),
            ));
            inner.started = 1;
        }
        Span::from_parts(trace, 0, Arc::clone(self))
    }

    fn start_child(self: &Arc<Self>, name: String, parent: &Span) -> Span {
        let trace = parent.trace.clone();
        let mut inner = trace.lock();
        if inner.sealed {
            drop(inner);
            dd_debug!("Tracer: parent trace already completed, starting a new trace");
            return self.start_root(name);
        }
        let trace_id = inner.trace_id;
        let (parent_span_id, baggage) = match inner.spans.get(parent.index) {
            Some(p) => (p.span_id, Arc::clone(&p.baggage)),
            None => (0, Arc::default()),
        };
        let start = inner.now_ns();
        let index = inner.spans.len();
        inner.spans.push(SpanData::new(
            trace_id,
            generate_id(),
            parent_span_id,
            self.config.service().to_string(),
            name.clone(),
            name,
            start,
            baggage,
        ));
        inner.started += 1;
        drop(inner);
        Span::from_parts(trace, index, Arc::clone(self))
    }

    /// Completes a trace whose spans have all finished: decides sampling
    /// if still undecided, forwards the spans to the exporter when kept,
    /// and seals the trace. Called with the trace lock held.
    pub(crate) fn seal_locked(&self, inner: &mut TraceInner) {
        if inner.sealed {
            return;
        }
        if inner.sampling.is_none() {
            self.sampler.sample_locked(inner);
        }
        let keep = inner
            .sampling
            .map(|decision| decision.priority.is_keep())
            .unwrap_or(false);
        if keep {
            let mut records = std::mem::take(&mut inner.spans);
            if let Some(root) = records.first_mut() {
                for (key, value) in inner.meta.drain() {
                    root.meta.insert(key, value);
                }
                for (key, value) in inner.metrics.drain() {
                    root.metrics.insert(key, value);
                }
                if let Some(origin) = inner.origin.take() {
                    root.meta.insert(ORIGIN_TAG.to_string(), origin);
                }
                if let Some(decision) = inner.sampling {
                    root.metrics.insert(
                        SAMPLING_PRIORITY_TAG.to_string(),
                        decision.priority.into_i8() as f64,
                    );
                }
            }
            self.exporter.add(records);
        } else {
            inner.spans.clear();
        }
        inner.started = 0;
        inner.finished = 0;
        inner.sealed = true;
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
        time::Duration,
    };

    use super::Tracer;
    use crate::configuration::Config;
    use crate::export::{AgentResponse, TraceRequest, Transport};
    use crate::sampling::priority;

    #[derive(Clone, Default)]
    struct RecordingTransport {
        requests: Arc<Mutex<Vec<TraceRequest>>>,
        rates: Option<HashMap<String, f64>>,
    }

    impl Transport for RecordingTransport {
        fn send(&mut self, request: TraceRequest) -> crate::error::Result<AgentResponse> {
            let rates = self.rates.clone();
            self.requests.lock().unwrap().push(request);
            Ok(AgentResponse {
                rate_by_service: rates,
            })
        }
    }

    fn tracer() -> (Tracer, Arc<Mutex<Vec<TraceRequest>>>) {
        let transport = RecordingTransport::default();
        let requests = Arc::clone(&transport.requests);
        let config = Config::builder()
            .set_service("shop".to_string())
            .set_agent_url("http://localhost:8126".to_string())
            .set_flush_interval(Duration::ZERO)
            .build();
        (Tracer::with_transport(config, Box::new(transport)), requests)
    }

    fn exported_spans(requests: &[TraceRequest]) -> Vec<serde_json::Value> {
        requests
            .iter()
            .flat_map(|r| {
                let traces: Vec<Vec<serde_json::Value>> =
                    serde_json::from_slice(&r.body).unwrap();
                traces.into_iter().flatten()
            })
            .collect()
    }

    #[test]
    fn test_root_span_id_is_trace_id() {
        let (tracer, _) = tracer();
        let root = tracer.start_span("web.request");
        assert_eq!(root.span_id(), Some(root.trace_id()));
    }

    #[test]
    fn test_trace_exports_when_all_spans_finish() {
        let (tracer, requests) = tracer();
        let root = tracer.start_span("web.request");
        let child = tracer.start_child("db.query", &root);
        root.finish();
        assert!(requests.lock().unwrap().is_empty());
        child.finish();
        tracer.shutdown(Duration::from_secs(5));

        let requests = requests.lock().unwrap();
        let spans = exported_spans(&requests);
        assert_eq!(spans.len(), 2);
        let root_span = spans.iter().find(|s| s["parent_id"] == 0).unwrap();
        assert_eq!(root_span["name"], "web.request");
        assert_eq!(root_span["service"], "shop");
        // With no rules and no agent rates the trace is kept by default.
        assert_eq!(root_span["metrics"]["_sampling_priority_v1"], 1.0);
    }

    #[test]
    fn test_dropped_trace_is_not_exported() {
        let (tracer, requests) = tracer();
        let root = tracer.start_span("web.request");
        root.sample(false);
        root.finish();
        tracer.shutdown(Duration::from_secs(5));
        assert!(requests.lock().unwrap().is_empty());
        assert_eq!(
            root.trace().sampling_priority(),
            Some(priority::USER_REJECT)
        );
    }

    #[test]
    fn test_finish_is_idempotent() {
        let (tracer, requests) = tracer();
        let root = tracer.start_span("op");
        root.finish();
        root.finish();
        tracer.shutdown(Duration::from_secs(5));
        let requests = requests.lock().unwrap();
        assert_eq!(exported_spans(&requests).len(), 1);
    }

    #[test]
    fn test_mutations_after_seal_are_noops() {
        let (tracer, _) = tracer();
        let root = tracer.start_span("op");
        root.finish();
        assert!(root.trace().is_sealed());
        root.set_tag("late", "value");
        root.set_baggage_item("late", "value");
        assert_eq!(root.baggage_item("late"), None);
        tracer.shutdown(Duration::from_secs(5));
    }

    #[test]
    fn test_child_of_sealed_trace_starts_new_trace() {
        let (tracer, _) = tracer();
        let root = tracer.start_span("op");
        root.finish();
        let orphan = tracer.start_child("late.child", &root);
        assert_ne!(orphan.trace_id(), root.trace_id());
        assert_eq!(orphan.span_id(), Some(orphan.trace_id()));
        tracer.shutdown(Duration::from_secs(5));
    }

    #[test]
    fn test_baggage_copy_on_write() {
        let (tracer, _) = tracer();
        let root = tracer.start_span("op");
        root.set_baggage_item("account", "42");
        let child = tracer.start_child("child", &root);
        assert_eq!(child.baggage_item("account"), Some("42".to_string()));

        // The child's later baggage does not leak to a sibling started
        // from the unchanged parent map.
        child.set_baggage_item("flag", "on");
        let sibling = tracer.start_child("sibling", &root);
        assert_eq!(sibling.baggage_item("flag"), None);
        assert_eq!(child.baggage_item("flag"), Some("on".to_string()));
        tracer.shutdown(Duration::from_secs(5));
    }

    #[test]
    fn test_child_start_is_monotonic() {
        let (tracer, requests) = tracer();
        let root = tracer.start_span("op");
        let child = tracer.start_child("child", &root);
        child.finish();
        root.finish();
        tracer.shutdown(Duration::from_secs(5));

        let requests = requests.lock().unwrap();
        let spans = exported_spans(&requests);
        let root_start = spans
            .iter()
            .find(|s| s["parent_id"] == 0)
            .unwrap()["start"]
            .as_u64()
            .unwrap();
        let child_start = spans
            .iter()
            .find(|s| s["parent_id"] != 0)
            .unwrap()["start"]
            .as_u64()
            .unwrap();
        assert!(child_start >= root_start);
    }

    #[test]
    fn test_duration_measured_from_trace_baseline() {
        let (tracer, requests) = tracer();
        let root = tracer.start_span("op");
        std::thread::sleep(Duration::from_millis(20));
        let child = tracer.start_child("child", &root);
        child.finish();
        root.finish();
        tracer.shutdown(Duration::from_secs(5));

        let requests = requests.lock().unwrap();
        let spans = exported_spans(&requests);
        let root_start = spans.iter().find(|s| s["parent_id"] == 0).unwrap()["start"]
            .as_u64()
            .unwrap();
        let child_span = spans.iter().find(|s| s["parent_id"] != 0).unwrap();
        let offset = child_span["start"].as_u64().unwrap() - root_start;
        assert!(offset >= 20_000_000, "offset was {offset}ns");
        // The child finished right after starting, but its duration runs
        // from the trace baseline and so covers the offset too.
        assert!(
            child_span["duration"].as_u64().unwrap() >= offset,
            "duration {} < offset {offset}",
            child_span["duration"]
        );
    }

    #[test]
    fn test_explicit_end_measured_from_trace_start() {
        use std::time::SystemTime;

        let (tracer, requests) = tracer();
        let root = tracer.start_span("op");
        root.finish_with_end(SystemTime::now() + Duration::from_secs(2));
        tracer.shutdown(Duration::from_secs(5));

        let requests = requests.lock().unwrap();
        let spans = exported_spans(&requests);
        let duration = spans[0]["duration"].as_u64().unwrap();
        assert!(duration >= 1_900_000_000, "duration was {duration}ns");
    }

    #[test]
    fn test_agent_rates_feed_back_into_sampler() {
        let transport = RecordingTransport {
            rates: Some(HashMap::from([("service:,env:".to_string(), 0.0)])),
            ..Default::default()
        };
        let requests = Arc::clone(&transport.requests);
        let config = Config::builder()
            .set_service("shop".to_string())
            .set_agent_url("http://localhost:8126".to_string())
            .set_flush_interval(Duration::ZERO)
            .build();
        let tracer = Tracer::with_transport(config, Box::new(transport));

        // First trace: no rates yet, kept by default and exported. The
        // response delivers a reject-everything table. Shutdown waits for
        // the full flush cycle, including the rates callback.
        let first = tracer.start_span("op");
        first.finish();
        tracer.shutdown(Duration::from_secs(5));
        assert_eq!(requests.lock().unwrap().len(), 1);

        // Second trace: decided by the fallback agent rate of zero.
        let second = tracer.start_span("op");
        second.finish();
        assert_eq!(
            second.trace().sampling_priority(),
            Some(priority::AUTO_REJECT)
        );
        assert_eq!(requests.lock().unwrap().len(), 1);
    }
}
