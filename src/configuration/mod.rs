// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#[allow(clippy::module_inception)]
mod configuration;
mod sources;
mod supported;

pub use configuration::{
    Config, ConfigBuilder, ProtocolVersion, SamplingRuleConfig, TRACER_VERSION,
};
pub use sources::ConfigSourceOrigin;
