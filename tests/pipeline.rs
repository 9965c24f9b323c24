// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! End-to-end tests driving the public API with a recording transport in
//! place of the agent.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use dd_tracer::export::{AgentResponse, TraceRequest, Transport};
use dd_tracer::sampling::priority;
use dd_tracer::{Config, ConfigBuilder, SamplingRuleConfig, Tracer};

#[derive(Clone, Default)]
struct RecordingTransport {
    requests: Arc<Mutex<Vec<TraceRequest>>>,
    rates: Option<HashMap<String, f64>>,
    fail: bool,
}

impl Transport for RecordingTransport {
    fn send(&mut self, request: TraceRequest) -> dd_tracer::Result<AgentResponse> {
        if self.fail {
            return Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "agent unreachable",
            )
            .into());
        }
        let rates = self.rates.clone();
        self.requests.lock().unwrap().push(request);
        Ok(AgentResponse {
            rate_by_service: rates,
        })
    }
}

fn base_config() -> ConfigBuilder {
    Config::builder()
        .set_service("shop".to_string())
        .set_agent_url("http://localhost:8126".to_string())
        .set_flush_interval(Duration::ZERO)
}

fn tracer_with(
    builder: ConfigBuilder,
    transport: RecordingTransport,
) -> (Tracer, Arc<Mutex<Vec<TraceRequest>>>) {
    let requests = Arc::clone(&transport.requests);
    (
        Tracer::with_transport(builder.build(), Box::new(transport)),
        requests,
    )
}

fn exported_spans(requests: &[TraceRequest]) -> Vec<serde_json::Value> {
    requests
        .iter()
        .flat_map(|r| {
            let traces: Vec<Vec<serde_json::Value>> = serde_json::from_slice(&r.body).unwrap();
            traces.into_iter().flatten()
        })
        .collect()
}

fn root_of(spans: &[serde_json::Value]) -> &serde_json::Value {
    spans.iter().find(|s| s["parent_id"] == 0).unwrap()
}

#[test]
fn full_trace_reaches_the_agent() {
    let (tracer, requests) = tracer_with(base_config(), RecordingTransport::default());

    let root = tracer.start_span("web.request");
    root.set_tag("http.status_code", 200);
    root.set_tag("http.url", "/checkout");
    let db = tracer.start_child("db.query", &root);
    db.set_tag("db.statement", "select 1");
    db.finish();
    root.finish();
    tracer.shutdown(Duration::from_secs(5));

    let requests = requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].trace_count, 1);
    assert_eq!(requests[0].url, "http://localhost:8126/v0.4/traces");

    let spans = exported_spans(&requests);
    assert_eq!(spans.len(), 2);
    let root = root_of(&spans);
    assert_eq!(root["name"], "web.request");
    assert_eq!(root["service"], "shop");
    assert_eq!(root["meta"]["http.url"], "/checkout");
    assert_eq!(root["metrics"]["http.status_code"], 200.0);
    assert_eq!(root["metrics"]["_sampling_priority_v1"], 1.0);
    assert!(root["meta"]["_dd.p.upstream_services"]
        .as_str()
        .unwrap()
        .contains("|1|0|"));

    let child = spans.iter().find(|s| s["parent_id"] != 0).unwrap();
    assert_eq!(child["trace_id"], root["trace_id"]);
    assert_eq!(child["parent_id"], root["span_id"]);
}

#[test]
fn nothing_is_sent_before_the_last_span_finishes() {
    let (tracer, requests) = tracer_with(base_config(), RecordingTransport::default());
    let root = tracer.start_span("web.request");
    let child = tracer.start_child("db.query", &root);
    root.finish();
    tracer.flush();
    std::thread::sleep(Duration::from_millis(50));
    assert!(requests.lock().unwrap().is_empty());
    child.finish();
    tracer.shutdown(Duration::from_secs(5));
    assert_eq!(requests.lock().unwrap().len(), 1);
}

#[test]
fn flush_without_traces_makes_no_request() {
    let (tracer, requests) = tracer_with(base_config(), RecordingTransport::default());
    tracer.flush();
    tracer.shutdown(Duration::from_secs(5));
    assert!(requests.lock().unwrap().is_empty());
}

#[test]
fn nonzero_interval_defers_the_flush() {
    let (tracer, requests) = tracer_with(
        base_config().set_flush_interval(Duration::from_secs(3600)),
        RecordingTransport::default(),
    );
    let root = tracer.start_span("op");
    root.finish();
    std::thread::sleep(Duration::from_millis(50));
    assert!(requests.lock().unwrap().is_empty());
    // The shutdown flush delivers the deferred batch.
    tracer.shutdown(Duration::from_secs(5));
    assert_eq!(requests.lock().unwrap().len(), 1);
}

#[test]
fn host_and_port_beat_the_configured_url() {
    let (tracer, requests) = tracer_with(
        base_config()
            .set_agent_host("10.0.0.1".to_string())
            .set_agent_port(9126),
        RecordingTransport::default(),
    );
    assert_eq!(tracer.config().collector_url(), "http://10.0.0.1:9126");
    let root = tracer.start_span("op");
    root.finish();
    tracer.shutdown(Duration::from_secs(5));
    assert_eq!(
        requests.lock().unwrap()[0].url,
        "http://10.0.0.1:9126/v0.4/traces"
    );
}

#[test]
fn slow_rule_rejects_while_catch_all_keeps() {
    let (tracer, requests) = tracer_with(
        base_config()
            .set_sampling_rules(vec![SamplingRuleConfig {
                sample_rate: 0.0,
                name: Some("web.slow*".to_string()),
                service: None,
            }])
            .set_sample_rate(1.0),
        RecordingTransport::default(),
    );

    let slow = tracer.start_span("web.slow.checkout");
    slow.finish();
    assert_eq!(
        slow.trace().sampling_priority(),
        Some(priority::USER_REJECT)
    );

    let fast = tracer.start_span("web.fast");
    fast.finish();
    assert_eq!(fast.trace().sampling_priority(), Some(priority::USER_KEEP));

    tracer.shutdown(Duration::from_secs(5));
    let requests = requests.lock().unwrap();
    let spans = exported_spans(&requests);
    // Only the kept trace went out, carrying the rule's rate.
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0]["name"], "web.fast");
    assert_eq!(spans[0]["metrics"]["_dd.rule_psr"], 1.0);
    assert_eq!(spans[0]["metrics"]["_sampling_priority_v1"], 2.0);
}

#[test]
fn rate_limiter_ceiling_rejects_rule_kept_traces() {
    let (tracer, requests) = tracer_with(
        base_config().set_sample_rate(1.0).set_rate_limit(0),
        RecordingTransport::default(),
    );
    let root = tracer.start_span("op");
    root.finish();
    assert_eq!(
        root.trace().sampling_priority(),
        Some(priority::USER_REJECT)
    );
    tracer.shutdown(Duration::from_secs(5));
    assert!(requests.lock().unwrap().is_empty());
}

#[test]
fn manual_decision_beats_the_sampler() {
    let (tracer, requests) = tracer_with(
        base_config().set_sample_rate(0.0),
        RecordingTransport::default(),
    );
    let root = tracer.start_span("op");
    root.sample(true);
    root.finish();
    assert_eq!(root.trace().sampling_priority(), Some(priority::USER_KEEP));
    tracer.shutdown(Duration::from_secs(5));
    let requests = requests.lock().unwrap();
    let spans = exported_spans(&requests);
    assert_eq!(spans[0]["metrics"]["_sampling_priority_v1"], 2.0);
}

#[test]
fn agent_rates_close_the_feedback_loop() {
    let (tracer, requests) = tracer_with(
        base_config().set_env("prod".to_string()),
        RecordingTransport {
            rates: Some(HashMap::from([(
                "service:shop,env:prod".to_string(),
                1.0,
            )])),
            ..Default::default()
        },
    );

    // First trace is kept by the default mechanism and brings the rates
    // back. Shutdown waits for the whole cycle.
    let first = tracer.start_span("op");
    first.finish();
    tracer.shutdown(Duration::from_secs(5));

    // Second trace is decided by the agent rate.
    let second = tracer.start_span("op");
    second.finish();
    assert_eq!(
        second.trace().sampling_priority(),
        Some(priority::AUTO_KEEP)
    );

    let requests = requests.lock().unwrap();
    let spans = exported_spans(&requests);
    let first_root = root_of(&spans);
    // The first trace predates any agent guidance.
    assert!(first_root["metrics"].get("_dd.agent_psr").is_none());
}

#[test]
fn transport_failures_do_not_disturb_instrumentation() {
    let (tracer, requests) = tracer_with(
        base_config(),
        RecordingTransport {
            fail: true,
            ..Default::default()
        },
    );
    let root = tracer.start_span("op");
    root.finish();
    // The batch is dropped; later spans still work and sampling still
    // decides.
    let next = tracer.start_span("op");
    next.finish();
    assert_eq!(next.trace().sampling_priority(), Some(priority::AUTO_KEEP));
    tracer.shutdown(Duration::from_secs(5));
    assert!(requests.lock().unwrap().is_empty());
}

#[test]
fn global_tags_and_env_land_on_the_root_span() {
    let (tracer, requests) = tracer_with(
        base_config()
            .set_env("prod".to_string())
            .set_version("1.2.3".to_string())
            .set_tags("team:checkout,region:eu".to_string()),
        RecordingTransport::default(),
    );
    let root = tracer.start_span("op");
    let child = tracer.start_child("child", &root);
    child.finish();
    root.finish();
    tracer.shutdown(Duration::from_secs(5));

    let requests = requests.lock().unwrap();
    let spans = exported_spans(&requests);
    let root = root_of(&spans);
    assert_eq!(root["meta"]["team"], "checkout");
    assert_eq!(root["meta"]["region"], "eu");
    assert_eq!(root["meta"]["env"], "prod");
    assert_eq!(root["meta"]["version"], "1.2.3");
}
