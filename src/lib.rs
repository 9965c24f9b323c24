// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-process trace collection for Datadog APM.
//!
//! The crate builds traces span by span, decides with rules, agent rates
//! and a rate limiter whether each completed trace is kept, and submits
//! kept traces to the local agent from a background worker.
//!
//! ```no_run
//! use dd_tracer::{Config, Tracer};
//!
//! let tracer = Tracer::new(
//!     Config::builder()
//!         .set_service("shop".to_string())
//!         .set_env("prod".to_string())
//!         .build(),
//! );
//!
//! let root = tracer.start_span("web.request");
//! root.set_tag("http.method", "GET");
//! let db = tracer.start_child("db.query", &root);
//! db.finish();
//! root.finish();
//!
//! tracer.shutdown(std::time::Duration::from_secs(1));
//! ```

pub mod constants;
pub mod log;

mod configuration;
mod error;
mod id;
mod sampler;
mod span;
mod trace;
mod tracer;

pub mod export;
pub mod sampling;

pub use configuration::{
    Config, ConfigBuilder, ConfigSourceOrigin, ProtocolVersion, SamplingRuleConfig, TRACER_VERSION,
};
pub use error::{Error, Result};
pub use span::{Span, SpanData, TagValue};
pub use trace::Trace;
pub use tracer::Tracer;
