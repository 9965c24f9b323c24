// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::{
    borrow::Cow,
    fmt::{self, Display},
    path::Path,
    str::FromStr,
    sync::{Mutex, OnceLock},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::configuration::sources::{CompositeSource, ConfigSourceOrigin, EnvSource, HashMapSource};
use crate::configuration::supported::ConfigurationKey;
use crate::log::LevelFilter;

pub const TRACER_VERSION: &str = "0.1.0";

const DEFAULT_SERVICE_NAME: &str = "unnamed-rust-service";
const DEFAULT_AGENT_HOST: &str = "127.0.0.1";
const DEFAULT_AGENT_PORT: u32 = 8126;
const DEFAULT_AGENT_SOCKET_PATH: &str = "/var/run/datadog/apm.socket";
const DEFAULT_RATE_LIMIT: i32 = 100;
const DEFAULT_FLUSH_INTERVAL_MS: u64 = 2000;
const DEFAULT_FLUSH_MIN_SPANS: usize = 1000;

/// Version of the trace payload protocol negotiated with the agent.
///
/// The version selects the encoder used to serialize batches and the path
/// traces are submitted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProtocolVersion {
    #[default]
    V04,
    V05,
}

impl ProtocolVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolVersion::V04 => "0.4",
            ProtocolVersion::V05 => "0.5",
        }
    }

    /// The agent route traces are submitted to for this version.
    pub fn traces_path(&self) -> &'static str {
        match self {
            ProtocolVersion::V04 => "/v0.4/traces",
            ProtocolVersion::V05 => "/v0.5/traces",
        }
    }
}

impl Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProtocolVersion {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "0.4" => Ok(ProtocolVersion::V04),
            "0.5" => Ok(ProtocolVersion::V05),
            _ => Err("unsupported trace protocol version, expected 0.4 or 0.5"),
        }
    }
}

/// Configuration for a single sampling rule
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SamplingRuleConfig {
    /// The sample rate to apply when this rule matches. Rates outside [0, 1]
    /// or non-finite values cause the rule to be discarded at sampler
    /// construction.
    pub sample_rate: f64,

    /// Span name to match, either an exact string or a glob pattern
    #[serde(default)]
    pub name: Option<String>,

    /// Service name to match, either an exact string or a glob pattern.
    /// A rule without a service matcher matches any service.
    #[serde(default)]
    pub service: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct ParsedSamplingRules {
    rules: Vec<SamplingRuleConfig>,
}

impl FromStr for ParsedSamplingRules {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(s)
            .map(|rules| ParsedSamplingRules { rules })
            .map_err(|e| e.to_string())
    }
}

/// Wrapper to parse "," separated key:value tags, discarding entries
/// without a ":" delimiter.
struct KeyValueTags(Vec<(String, String)>);

impl FromStr for KeyValueTags {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(KeyValueTags(
            s.split(',')
                .filter_map(|s| {
                    s.split_once(':')
                        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                })
                .filter(|(k, v)| !k.is_empty() && !v.is_empty())
                .collect(),
        ))
    }
}

/// Wrapper to accept the usual truthy spellings for boolean toggles.
struct Truthy(bool);

impl FromStr for Truthy {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("true") || s == "1" {
            Ok(Truthy(true))
        } else if s.eq_ignore_ascii_case("false") || s == "0" {
            Ok(Truthy(false))
        } else {
            Err("expected true, false, 1 or 0")
        }
    }
}

#[derive(Debug)]
#[non_exhaustive]
/// Finalized configuration for the tracer.
///
/// Values are resolved once at build time with the precedence:
/// code override > environment variable > compiled default.
///
/// # Usage
/// ```
/// use dd_tracer::Config;
///
/// let config = Config::builder()
///     .set_service("my-service".to_string())
///     .set_env("prod".to_string())
///     .build();
/// ```
pub struct Config {
    // # Global
    runtime_id: &'static str,
    tracer_version: &'static str,

    // # Service tagging
    service: String,
    env: Option<String>,
    version: Option<String>,
    /// Tags added at the trace level for every trace
    global_tags: Vec<(String, String)>,

    // # Agent
    /// Resolved collector URL, either `http://host:port` or `unix://path`
    collector_url: Cow<'static, str>,
    /// Protocol version, mutable at runtime so a live change takes effect
    /// on the exporter's next encoder lookup
    protocol_version: Mutex<ProtocolVersion>,

    // # Sampling
    sample_rate: Option<f64>,
    rate_limit: i32,
    sampling_rules: Vec<SamplingRuleConfig>,

    // # Export
    flush_interval: Duration,
    flush_min_spans: usize,

    // # Logs
    log_injection: bool,
    log_level_filter: LevelFilter,
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    fn from_sources(sources: &CompositeSource) -> Self {
        // String values cannot fail to parse, so no error logging here.
        let get_string = |key| sources.get(key).value.map(|v| v.value);

        let service = get_string(ConfigurationKey::DD_SERVICE)
            .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string());

        let url = get_string(ConfigurationKey::DD_TRACE_AGENT_URL);
        let host = get_string(ConfigurationKey::DD_AGENT_HOST);
        let port = get_logged::<u32>(sources, ConfigurationKey::DD_TRACE_AGENT_PORT);

        let protocol_version =
            get_logged::<ProtocolVersion>(sources, ConfigurationKey::DD_TRACE_AGENT_PROTOCOL_VERSION)
                .unwrap_or_default();

        let sample_rate = get_logged::<f64>(sources, ConfigurationKey::DD_TRACE_SAMPLE_RATE);

        let rate_limit = get_logged::<i32>(sources, ConfigurationKey::DD_TRACE_RATE_LIMIT)
            .unwrap_or(DEFAULT_RATE_LIMIT);

        let sampling_rules =
            get_logged::<ParsedSamplingRules>(sources, ConfigurationKey::DD_TRACE_SAMPLING_RULES)
                .map(|r| r.rules)
                .unwrap_or_default();

        let flush_interval = get_logged::<u64>(sources, ConfigurationKey::DD_TRACE_FLUSH_INTERVAL)
            .unwrap_or(DEFAULT_FLUSH_INTERVAL_MS);

        let flush_min_spans =
            get_logged::<usize>(sources, ConfigurationKey::DD_TRACE_PARTIAL_FLUSH_MIN_SPANS)
                .unwrap_or(DEFAULT_FLUSH_MIN_SPANS);

        let log_injection = get_logged::<Truthy>(sources, ConfigurationKey::DD_LOGS_INJECTION)
            .map(|t| t.0)
            .unwrap_or(false);

        let log_level_filter =
            get_logged::<LevelFilter>(sources, ConfigurationKey::DD_TRACE_LOG_LEVEL)
                .unwrap_or_default();

        let global_tags = get_logged::<KeyValueTags>(sources, ConfigurationKey::DD_TAGS)
            .map(|t| t.0)
            .unwrap_or_default();

        Config {
            runtime_id: Config::process_runtime_id(),
            tracer_version: TRACER_VERSION,
            service,
            env: get_string(ConfigurationKey::DD_ENV),
            version: get_string(ConfigurationKey::DD_VERSION),
            global_tags,
            collector_url: resolve_collector_url(
                url.as_deref(),
                host.as_deref(),
                port,
                Path::new(DEFAULT_AGENT_SOCKET_PATH),
            ),
            protocol_version: Mutex::new(protocol_version),
            sample_rate,
            rate_limit,
            sampling_rules,
            flush_interval: Duration::from_millis(flush_interval),
            flush_min_spans,
            log_injection,
            log_level_filter,
        }
    }

    pub fn runtime_id(&self) -> &str {
        self.runtime_id
    }

    pub fn tracer_version(&self) -> &str {
        self.tracer_version
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn env(&self) -> Option<&str> {
        self.env.as_deref()
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn global_tags(&self) -> impl Iterator<Item = (&str, &str)> {
        self.global_tags
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn collector_url(&self) -> &str {
        &self.collector_url
    }

    pub fn protocol_version(&self) -> ProtocolVersion {
        *self.protocol_version.lock().unwrap()
    }

    /// Changes the protocol version at runtime. The exporter picks the new
    /// version up after its next flush attempt.
    pub fn set_protocol_version(&self, version: ProtocolVersion) {
        *self.protocol_version.lock().unwrap() = version;
    }

    pub fn sample_rate(&self) -> Option<f64> {
        self.sample_rate
    }

    pub fn rate_limit(&self) -> i32 {
        self.rate_limit
    }

    pub fn sampling_rules(&self) -> &[SamplingRuleConfig] {
        &self.sampling_rules
    }

    pub fn flush_interval(&self) -> Duration {
        self.flush_interval
    }

    pub fn flush_min_spans(&self) -> usize {
        self.flush_min_spans
    }

    pub fn log_injection(&self) -> bool {
        self.log_injection
    }

    pub fn log_level_filter(&self) -> LevelFilter {
        self.log_level_filter
    }

    fn process_runtime_id() -> &'static str {
        static RUNTIME_ID: OnceLock<String> = OnceLock::new();
        RUNTIME_ID.get_or_init(|| uuid::Uuid::new_v4().to_string())
    }
}

/// Reads one configuration entry, logging values that failed to parse in
/// a lower-precedence source.
fn get_logged<T: FromStr<Err = impl Display>>(
    sources: &CompositeSource,
    key: ConfigurationKey,
) -> Option<T> {
    let result = sources.get_parse::<T>(key);
    for error in &result.errors {
        crate::dd_warn!("Config: ignoring invalid {}: {error:?}", key.as_str());
    }
    result.value.map(|v| v.value)
}

/// Resolves the collector address with the documented precedence:
/// explicit host/port pair > explicit URL > well-known local socket >
/// loopback default.
///
/// A malformed URL is recovered silently: it logs at debug level and falls
/// through to the next candidate.
fn resolve_collector_url(
    url: Option<&str>,
    host: Option<&str>,
    port: Option<u32>,
    socket_path: &Path,
) -> Cow<'static, str> {
    if host.is_some() || port.is_some() {
        let host = host.unwrap_or(DEFAULT_AGENT_HOST);
        let port = port.unwrap_or(DEFAULT_AGENT_PORT);
        let candidate = format!("http://{host}:{port}");
        match candidate.parse::<hyper::Uri>() {
            Ok(_) => return Cow::Owned(candidate),
            Err(e) => {
                crate::dd_debug!(
                    "Config: invalid collector host/port {:?}: {}, falling back",
                    candidate,
                    e
                );
            }
        }
    }
    if let Some(url) = url {
        match url.parse::<hyper::Uri>() {
            Ok(uri) if uri.host().is_some() => return Cow::Owned(url.to_string()),
            Ok(_) => {
                crate::dd_debug!("Config: collector URL {:?} has no host, falling back", url);
            }
            Err(e) => {
                crate::dd_debug!(
                    "Config: invalid collector URL {:?}: {}, falling back",
                    url,
                    e
                );
            }
        }
    }
    if socket_path.exists() {
        return Cow::Owned(format!("unix://{}", socket_path.display()));
    }
    Cow::Owned(format!("http://{DEFAULT_AGENT_HOST}:{DEFAULT_AGENT_PORT}"))
}

/// Builder collecting code-level overrides before resolving the final
/// configuration against the environment.
#[derive(Default)]
pub struct ConfigBuilder {
    overrides: Vec<(ConfigurationKey, String)>,
    /// Kept as structured data: a JSON round-trip would reject rules
    /// with non-finite rates outright, and those must reach the sampler
    /// so it can drop just the offending entry.
    sampling_rules: Option<Vec<SamplingRuleConfig>>,
}

impl ConfigBuilder {
    fn set(mut self, key: ConfigurationKey, value: String) -> Self {
        self.overrides.push((key, value));
        self
    }

    pub fn set_service(self, service: String) -> Self {
        self.set(ConfigurationKey::DD_SERVICE, service)
    }

    pub fn set_env(self, env: String) -> Self {
        self.set(ConfigurationKey::DD_ENV, env)
    }

    pub fn set_version(self, version: String) -> Self {
        self.set(ConfigurationKey::DD_VERSION, version)
    }

    /// Sets trace-level tags from `key:value` pairs.
    pub fn set_tags(self, tags: String) -> Self {
        self.set(ConfigurationKey::DD_TAGS, tags)
    }

    pub fn set_agent_url(self, url: String) -> Self {
        self.set(ConfigurationKey::DD_TRACE_AGENT_URL, url)
    }

    pub fn set_agent_host(self, host: String) -> Self {
        self.set(ConfigurationKey::DD_AGENT_HOST, host)
    }

    pub fn set_agent_port(self, port: u32) -> Self {
        self.set(ConfigurationKey::DD_TRACE_AGENT_PORT, port.to_string())
    }

    pub fn set_protocol_version(self, version: ProtocolVersion) -> Self {
        self.set(
            ConfigurationKey::DD_TRACE_AGENT_PROTOCOL_VERSION,
            version.as_str().to_string(),
        )
    }

    pub fn set_sample_rate(self, rate: f64) -> Self {
        self.set(ConfigurationKey::DD_TRACE_SAMPLE_RATE, rate.to_string())
    }

    pub fn set_rate_limit(self, limit: i32) -> Self {
        self.set(ConfigurationKey::DD_TRACE_RATE_LIMIT, limit.to_string())
    }

    pub fn set_sampling_rules(mut self, rules: Vec<SamplingRuleConfig>) -> Self {
        self.sampling_rules = Some(rules);
        self
    }

    pub fn set_flush_interval(self, interval: Duration) -> Self {
        self.set(
            ConfigurationKey::DD_TRACE_FLUSH_INTERVAL,
            interval.as_millis().to_string(),
        )
    }

    pub fn set_flush_min_spans(self, min_spans: usize) -> Self {
        self.set(
            ConfigurationKey::DD_TRACE_PARTIAL_FLUSH_MIN_SPANS,
            min_spans.to_string(),
        )
    }

    pub fn set_log_injection(self, enabled: bool) -> Self {
        self.set(ConfigurationKey::DD_LOGS_INJECTION, enabled.to_string())
    }

    pub fn set_log_level(self, level: LevelFilter) -> Self {
        self.set(ConfigurationKey::DD_TRACE_LOG_LEVEL, level.to_string())
    }

    pub fn build(self) -> Config {
        let mut sources = CompositeSource::new();
        sources.add_source(HashMapSource::from_iter(
            self.overrides
                .into_iter()
                .map(|(key, value)| (key.as_str(), value)),
            ConfigSourceOrigin::Code,
        ));
        sources.add_source(EnvSource);
        let mut config = Config::from_sources(&sources);
        if let Some(rules) = self.sampling_rules {
            config.sampling_rules = rules;
        }
        crate::log::set_max_level(config.log_level_filter);
        config
    }
}
