// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

pub const SAMPLING_PRIORITY_TAG: &str = "_sampling_priority_v1";
pub const SAMPLING_RULE_RATE_TAG: &str = "_dd.rule_psr";
pub const SAMPLING_AGENT_RATE_TAG: &str = "_dd.agent_psr";
pub const SAMPLING_LIMIT_RATE_TAG: &str = "_dd.limit_psr";
pub const UPSTREAM_SERVICES_TAG: &str = "_dd.p.upstream_services";
pub const ORIGIN_TAG: &str = "_dd.origin";

/// Key of the per-service rate applied when the agent has not reported
/// a rate for a given service/env pair.
pub const DEFAULT_SERVICE_RATE_KEY: &str = "service:,env:";

/// Header carrying the number of traces in an export payload.
pub const TRACE_COUNT_HEADER: &str = "X-Datadog-Trace-Count";
