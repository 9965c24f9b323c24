// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// The set of configuration entries the tracer understands.
///
/// The variant names double as the environment variable names so that code
/// overrides and env vars resolve through the same key.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigurationKey {
    DD_SERVICE,
    DD_ENV,
    DD_VERSION,
    DD_TAGS,
    DD_TRACE_AGENT_URL,
    DD_AGENT_HOST,
    DD_TRACE_AGENT_PORT,
    DD_TRACE_AGENT_PROTOCOL_VERSION,
    DD_TRACE_SAMPLE_RATE,
    DD_TRACE_RATE_LIMIT,
    DD_TRACE_SAMPLING_RULES,
    DD_TRACE_FLUSH_INTERVAL,
    DD_TRACE_PARTIAL_FLUSH_MIN_SPANS,
    DD_LOGS_INJECTION,
    DD_TRACE_LOG_LEVEL,
}

impl ConfigurationKey {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ConfigurationKey::DD_SERVICE => "DD_SERVICE",
            ConfigurationKey::DD_ENV => "DD_ENV",
            ConfigurationKey::DD_VERSION => "DD_VERSION",
            ConfigurationKey::DD_TAGS => "DD_TAGS",
            ConfigurationKey::DD_TRACE_AGENT_URL => "DD_TRACE_AGENT_URL",
            ConfigurationKey::DD_AGENT_HOST => "DD_AGENT_HOST",
            ConfigurationKey::DD_TRACE_AGENT_PORT => "DD_TRACE_AGENT_PORT",
            ConfigurationKey::DD_TRACE_AGENT_PROTOCOL_VERSION => {
                "DD_TRACE_AGENT_PROTOCOL_VERSION"
            }
            ConfigurationKey::DD_TRACE_SAMPLE_RATE => "DD_TRACE_SAMPLE_RATE",
            ConfigurationKey::DD_TRACE_RATE_LIMIT => "DD_TRACE_RATE_LIMIT",
            ConfigurationKey::DD_TRACE_SAMPLING_RULES => "DD_TRACE_SAMPLING_RULES",
            ConfigurationKey::DD_TRACE_FLUSH_INTERVAL => "DD_TRACE_FLUSH_INTERVAL",
            ConfigurationKey::DD_TRACE_PARTIAL_FLUSH_MIN_SPANS => {
                "DD_TRACE_PARTIAL_FLUSH_MIN_SPANS"
            }
            ConfigurationKey::DD_LOGS_INJECTION => "DD_LOGS_INJECTION",
            ConfigurationKey::DD_TRACE_LOG_LEVEL => "DD_TRACE_LOG_LEVEL",
        }
    }
}
