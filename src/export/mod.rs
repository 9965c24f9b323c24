// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

mod encoder;
mod transport;

pub use encoder::{EncodedPayload, JsonEncoder, TraceEncoder};
pub use transport::{AgentResponse, HttpTransport, TraceRequest, Transport};

use std::{
    collections::HashMap,
    sync::{Arc, Condvar, Mutex},
    thread,
    time::{Duration, Instant},
};

use crate::configuration::{Config, ProtocolVersion};
use crate::span::SpanData;
use crate::{dd_debug, dd_error};

pub(crate) type ServiceRatesCallback = Box<dyn Fn(HashMap<String, f64>) + Send>;

/// Buffers completed traces and submits them to the agent from a
/// dedicated worker thread, so span lifecycle calls never touch the
/// network.
///
/// Flush scheduling: a configured interval of zero flushes on every add;
/// otherwise the first add arms a single deadline that later adds never
/// re-arm. Reaching the partial-flush span threshold forces an early
/// flush.
pub(crate) struct AgentExporter {
    shared: Arc<Shared>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

struct Shared {
    config: Arc<Config>,
    state: Mutex<ExporterState>,
    signal: Condvar,
}

struct ExporterState {
    /// One encoder per protocol version; `active_version` selects where
    /// new traces buffer.
    encoders: HashMap<ProtocolVersion, Box<dyn TraceEncoder>>,
    active_version: ProtocolVersion,
    flush_requested: bool,
    shutdown: bool,
    stopped: bool,
    deadline: Option<Instant>,
}

impl AgentExporter {
    pub(crate) fn start(
        config: Arc<Config>,
        transport: Box<dyn Transport>,
        on_service_rates: ServiceRatesCallback,
    ) -> Self {
        let mut encoders: HashMap<ProtocolVersion, Box<dyn TraceEncoder>> = HashMap::new();
        encoders.insert(ProtocolVersion::V04, Box::new(JsonEncoder::new()));
        encoders.insert(ProtocolVersion::V05, Box::new(JsonEncoder::new()));

        let shared = Arc::new(Shared {
            state: Mutex::new(ExporterState {
                encoders,
                active_version: config.protocol_version(),
                flush_requested: false,
                shutdown: false,
                stopped: false,
                deadline: None,
            }),
            signal: Condvar::new(),
            config,
        });

        let work = {
            let shared = Arc::clone(&shared);
            move || worker_loop(shared, transport, on_service_rates)
        };
        #[cfg(any(test, feature = "test-utils"))]
        let work = crate::log::test_logger::with_local_logger(work);

        let worker = match thread::Builder::new()
            .name("dd-tracer-export".to_string())
            .spawn(work)
        {
            Ok(handle) => Some(handle),
            Err(e) => {
                dd_error!("Exporter: failed to spawn worker thread: {e}");
                None
            }
        };

        AgentExporter {
            shared,
            worker: Mutex::new(worker),
        }
    }

    /// Buffers one completed trace and schedules a flush per the
    /// configured interval and partial-flush threshold.
    pub(crate) fn add(&self, spans: Vec<SpanData>) {
        if spans.is_empty() {
            return;
        }
        let mut state = self.shared.state.lock().unwrap();
        let version = state.active_version;
        let Some(encoder) = state.encoders.get_mut(&version) else {
            return;
        };
        encoder.add_trace(&spans);
        let buffered = encoder.span_count();

        let interval = self.shared.config.flush_interval();
        if interval.is_zero() || buffered >= self.shared.config.flush_min_spans() {
            state.flush_requested = true;
            state.deadline = None;
            self.shared.signal.notify_all();
        } else if state.deadline.is_none() {
            state.deadline = Some(Instant::now() + interval);
            self.shared.signal.notify_all();
        }
    }

    /// Requests an asynchronous flush of whatever is buffered.
    pub(crate) fn flush(&self) {
        let mut state = self.shared.state.lock().unwrap();
        state.flush_requested = true;
        state.deadline = None;
        self.shared.signal.notify_all();
    }

    /// Performs a final best-effort flush and joins the worker, waiting at
    /// most `timeout` for the flush to complete.
    pub(crate) fn shutdown(&self, timeout: Duration) {
        {
            let mut state = self.shared.state.lock().unwrap();
            if state.shutdown {
                return;
            }
            state.shutdown = true;
            state.flush_requested = true;
            self.shared.signal.notify_all();
        }

        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock().unwrap();
        while !state.stopped {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let (next, _) = self
                .shared
                .signal
                .wait_timeout(state, deadline - now)
                .unwrap();
            state = next;
        }
        let stopped = state.stopped;
        drop(state);

        if stopped {
            if let Some(handle) = self.worker.lock().unwrap().take() {
                let _ = handle.join();
            }
        } else {
            dd_debug!("Exporter: shutdown timed out waiting for the final flush");
        }
    }
}

fn worker_loop(
    shared: Arc<Shared>,
    mut transport: Box<dyn Transport>,
    on_service_rates: ServiceRatesCallback,
) {
    loop {
        let mut state = shared.state.lock().unwrap();
        loop {
            if state.shutdown || state.flush_requested {
                break;
            }
            match state.deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    let (next, _) = shared.signal.wait_timeout(state, deadline - now).unwrap();
                    state = next;
                }
                None => state = shared.signal.wait(state).unwrap(),
            }
        }

        let shutting_down = state.shutdown;
        state.flush_requested = false;
        state.deadline = None;
        let version = state.active_version;
        let payload = state
            .encoders
            .get_mut(&version)
            .filter(|encoder| encoder.trace_count() > 0)
            .map(|encoder| encoder.take_payload());
        // Pick up live protocol version changes for the next batch.
        state.active_version = shared.config.protocol_version();
        drop(state);

        match payload {
            // An empty buffer makes no network call at all.
            None => {}
            Some(Err(e)) => dd_error!("Exporter: failed to encode batch: {e}"),
            Some(Ok(payload)) => {
                let url = format!(
                    "{}{}",
                    shared.config.collector_url().trim_end_matches('/'),
                    version.traces_path()
                );
                let request = TraceRequest {
                    url,
                    content_type: payload.content_type,
                    trace_count: payload.trace_count,
                    body: payload.body,
                };
                match transport.send(request) {
                    Ok(response) => {
                        if let Some(rates) = response.rate_by_service {
                            on_service_rates(rates);
                        }
                    }
                    // The batch is dropped, there is no retry.
                    Err(e) => dd_error!("Exporter: dropping batch: {e}"),
                }
            }
        }

        if shutting_down {
            let mut state = shared.state.lock().unwrap();
            state.stopped = true;
            shared.signal.notify_all();
            return;
        }
    }
}
