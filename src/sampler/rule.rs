// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

use crate::configuration::SamplingRuleConfig;
use crate::sampler::glob_matcher::GlobMatcher;

/// Matches a single span field, either literally or through a glob
/// pattern. The glob form is used when the configured value carries a
/// wildcard.
#[derive(Debug, Clone)]
pub(crate) enum FieldMatcher {
    Exact(String),
    Pattern(GlobMatcher),
}

impl FieldMatcher {
    fn new(value: &str) -> Self {
        if value.contains(['*', '?']) {
            FieldMatcher::Pattern(GlobMatcher::new(value))
        } else {
            FieldMatcher::Exact(value.to_string())
        }
    }

    fn matches(&self, subject: &str) -> bool {
        match self {
            FieldMatcher::Exact(expected) => expected == subject,
            FieldMatcher::Pattern(matcher) => matcher.matches(subject),
        }
    }
}

#[derive(Debug)]
pub(crate) struct RuleConfigurationError {
    rate: f64,
}

impl fmt::Display for RuleConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sample rate {} is not a probability in [0, 1]",
            self.rate
        )
    }
}

impl std::error::Error for RuleConfigurationError {}

/// One ordered sampling rule. Rules are evaluated against a trace's root
/// span and the first match wins.
#[derive(Debug, Clone)]
pub(crate) struct SamplingRule {
    pub(crate) rate: f64,
    name: Option<FieldMatcher>,
    service: Option<FieldMatcher>,
}

impl SamplingRule {
    pub(crate) fn from_config(
        config: &SamplingRuleConfig,
    ) -> Result<Self, RuleConfigurationError> {
        if !config.sample_rate.is_finite() || !(0.0..=1.0).contains(&config.sample_rate) {
            return Err(RuleConfigurationError {
                rate: config.sample_rate,
            });
        }
        Ok(SamplingRule {
            rate: config.sample_rate,
            name: config.name.as_deref().map(FieldMatcher::new),
            service: config.service.as_deref().map(FieldMatcher::new),
        })
    }

    /// The trailing rule synthesized from the global sample rate. It has
    /// no matchers, so it matches every root span that reached it.
    pub(crate) fn catch_all(rate: f64) -> Result<Self, RuleConfigurationError> {
        SamplingRule::from_config(&SamplingRuleConfig {
            sample_rate: rate,
            name: None,
            service: None,
        })
    }

    pub(crate) fn matches(&self, name: &str, service: &str) -> bool {
        self.name.as_ref().map_or(true, |m| m.matches(name))
            && self.service.as_ref().map_or(true, |m| m.matches(service))
    }
}
