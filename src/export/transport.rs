// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::CONTENT_TYPE;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use serde::Deserialize;

use crate::constants::TRACE_COUNT_HEADER;
use crate::error::{Error, Result};

/// One outgoing trace submission.
pub struct TraceRequest {
    /// Full URL including the versioned traces path.
    pub url: String,
    pub content_type: &'static str,
    pub trace_count: usize,
    pub body: Vec<u8>,
}

/// The parts of an agent reply the tracer acts on.
pub struct AgentResponse {
    /// Per-service keep rates, present when the agent included them.
    pub rate_by_service: Option<HashMap<String, f64>>,
}

/// Delivery seam between the exporter and the network. The exporter's
/// worker thread owns the transport, so implementations never need
/// internal synchronization.
pub trait Transport: Send {
    fn send(&mut self, request: TraceRequest) -> Result<AgentResponse>;
}

#[derive(Deserialize)]
struct ResponseBody {
    rate_by_service: HashMap<String, f64>,
}

/// HTTP transport backed by a blocking current-thread runtime.
// TODO: route unix:// collector URLs through a unix socket connector;
// they currently fail at connect time.
pub struct HttpTransport {
    runtime: tokio::runtime::Runtime,
    client: Client<HttpConnector, Full<Bytes>>,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let client = Client::builder(TokioExecutor::new()).build_http();
        Ok(HttpTransport { runtime, client })
    }
}

impl Transport for HttpTransport {
    fn send(&mut self, request: TraceRequest) -> Result<AgentResponse> {
        let req = hyper::Request::builder()
            .method(hyper::Method::POST)
            .uri(request.url.as_str())
            .header(CONTENT_TYPE, request.content_type)
            .header(TRACE_COUNT_HEADER, request.trace_count.to_string())
            .body(Full::new(Bytes::from(request.body)))?;

        self.runtime.block_on(async {
            let response = self.client.request(req).await?;
            let status = response.status();
            let body = response.into_body().collect().await?.to_bytes();
            if !status.is_success() {
                return Err(Error::msg(format!(
                    "agent responded with status {status}"
                )));
            }
            // Older agents reply with a bare "OK"; only a JSON body
            // carries rates.
            let rate_by_service = serde_json::from_slice::<ResponseBody>(&body)
                .ok()
                .map(|b| b.rate_by_service);
            Ok(AgentResponse { rate_by_service })
        })
    }
}
