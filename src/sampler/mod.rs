// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

mod glob_matcher;
mod rate_limiter;
mod rule;

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, RwLock},
};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use crate::configuration::Config;
use crate::constants::{
    DEFAULT_SERVICE_RATE_KEY, SAMPLING_AGENT_RATE_TAG, SAMPLING_LIMIT_RATE_TAG,
    SAMPLING_RULE_RATE_TAG, UPSTREAM_SERVICES_TAG,
};
use crate::dd_warn;
use crate::sampling::{SamplingDecision, SamplingMechanism};
use crate::trace::{Trace, TraceInner};

use rate_limiter::RateLimiter;
use rule::SamplingRule;

/// Decides whether traces are kept, in two tiers: configured rules
/// (rate-limited, user priorities) and agent-reported per-service rates
/// (automatic priorities). Traces that match neither tier are kept with
/// the default mechanism so the backend can score them itself.
pub struct Sampler {
    config: Arc<Config>,
    rules: Vec<SamplingRule>,
    /// Present only when at least one rule survived configuration.
    limiter: Option<RateLimiter>,
    /// Keep rates keyed by "service:<svc>,env:<env>", replaced wholesale
    /// by agent responses.
    agent_rates: RwLock<HashMap<String, f64>>,
    /// Cache of base64-encoded service names for the upstream tag.
    encoded_services: Mutex<HashMap<String, String>>,
}

impl Sampler {
    pub(crate) fn new(config: Arc<Config>) -> Self {
        let mut rules = Vec::new();
        for rule_config in config.sampling_rules() {
            match SamplingRule::from_config(rule_config) {
                Ok(rule) => rules.push(rule),
                Err(e) => dd_warn!("Sampler: dropping sampling rule: {e}"),
            }
        }
        if let Some(rate) = config.sample_rate() {
            match SamplingRule::catch_all(rate) {
                Ok(rule) => rules.push(rule),
                Err(e) => dd_warn!("Sampler: ignoring global sample rate: {e}"),
            }
        }
        let limiter = (!rules.is_empty()).then(|| RateLimiter::new(config.rate_limit()));
        Sampler {
            config,
            rules,
            limiter,
            agent_rates: RwLock::new(HashMap::new()),
            encoded_services: Mutex::new(HashMap::new()),
        }
    }

    /// Decides the given trace. Does nothing when the trace has no root
    /// span yet or already carries a decision.
    pub fn sample(&self, trace: &Trace) {
        self.sample_locked(&mut trace.lock());
    }

    pub(crate) fn sample_locked(&self, inner: &mut TraceInner) {
        if inner.sealed || inner.sampling.is_some() {
            return;
        }
        let Some(root) = inner.spans.first() else {
            return;
        };
        let name = root.name.clone();
        let service = root.service.clone();

        let (decision, rate) = match self.rules.iter().find(|r| r.matches(&name, &service)) {
            Some(rule) => (self.apply_rule(rule, inner), Some(rule.rate)),
            None => self.apply_agent_rate(&service, inner),
        };
        inner.set_sampling_decision(decision);
        self.record_upstream_service(inner, &service, decision, rate);
    }

    fn apply_rule(&self, rule: &SamplingRule, inner: &mut TraceInner) -> SamplingDecision {
        inner
            .metrics
            .insert(SAMPLING_RULE_RATE_TAG.to_string(), rule.rate);
        let sampled = rule.rate >= 1.0 || crate::id::random_unit() < rule.rate;
        let mut allowed = sampled;
        if sampled {
            if let Some(limiter) = &self.limiter {
                allowed = limiter.is_allowed();
                if !allowed {
                    inner.metrics.insert(
                        SAMPLING_LIMIT_RATE_TAG.to_string(),
                        limiter.effective_rate(),
                    );
                }
            }
        }
        SamplingMechanism::Rule.decide(allowed)
    }

    fn apply_agent_rate(
        &self,
        service: &str,
        inner: &mut TraceInner,
    ) -> (SamplingDecision, Option<f64>) {
        let key = service_rate_key(service, self.config.env());
        let rates = self.agent_rates.read().unwrap();
        match rates
            .get(&key)
            .or_else(|| rates.get(DEFAULT_SERVICE_RATE_KEY))
            .copied()
        {
            Some(rate) => {
                inner
                    .metrics
                    .insert(SAMPLING_AGENT_RATE_TAG.to_string(), rate);
                let keep = rate >= 1.0 || crate::id::random_unit() < rate;
                (SamplingMechanism::AgentRate.decide(keep), Some(rate))
            }
            // No guidance yet: keep, and let the agent rate the trace.
            None => (SamplingMechanism::Default.decide(true), None),
        }
    }

    /// Replaces the per-service keep rates with the table from the latest
    /// agent response.
    pub fn update(&self, rates: HashMap<String, f64>) {
        *self.agent_rates.write().unwrap() = rates;
    }

    /// Appends this service's decision to the `_dd.p.upstream_services`
    /// trace tag: `base64(service)|priority|mechanism|rate`, entries
    /// separated by `;`. The rate field is empty unless a rule or agent
    /// rate produced the decision.
    fn record_upstream_service(
        &self,
        inner: &mut TraceInner,
        service: &str,
        decision: SamplingDecision,
        rate: Option<f64>,
    ) {
        let encoded = {
            let mut cache = self.encoded_services.lock().unwrap();
            cache
                .entry(service.to_string())
                .or_insert_with(|| BASE64.encode(service))
                .clone()
        };
        let rate_str = match rate {
            Some(r) => ((r * 1e4).ceil() / 1e4).to_string(),
            None => String::new(),
        };
        let entry = format!(
            "{encoded}|{}|{}|{rate_str}",
            decision.priority,
            decision.mechanism.into_u8()
        );
        inner
            .meta
            .entry(UPSTREAM_SERVICES_TAG.to_string())
            .and_modify(|tag| {
                tag.push(';');
                tag.push_str(&entry);
            })
            .or_insert(entry);
    }
}

fn service_rate_key(service: &str, env: Option<&str>) -> String {
    format!("service:{service},env:{}", env.unwrap_or(""))
}
