// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::{fmt, str::FromStr};

/// A finalized sampling decision for a trace.
///
/// A trace starts without a decision and receives one at most once, the
/// first assignment wins for the remainder of the trace's life.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SamplingDecision {
    pub priority: SamplingPriority,
    pub mechanism: SamplingMechanism,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplingPriority {
    value: i8,
}

impl SamplingPriority {
    pub const fn from_i8(value: i8) -> Self {
        Self { value }
    }

    pub fn into_i8(self) -> i8 {
        self.value
    }

    pub fn is_keep(&self) -> bool {
        self.value > 0
    }
}

pub mod priority {
    use super::SamplingPriority;

    pub const USER_REJECT: SamplingPriority = SamplingPriority::from_i8(-1);
    pub const AUTO_REJECT: SamplingPriority = SamplingPriority::from_i8(0);
    pub const AUTO_KEEP: SamplingPriority = SamplingPriority::from_i8(1);
    pub const USER_KEEP: SamplingPriority = SamplingPriority::from_i8(2);
}

impl fmt::Display for SamplingPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl FromStr for SamplingPriority {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i8>().map(SamplingPriority::from_i8).map_err(drop)
    }
}

/// The reason code explaining how a sampling priority was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum SamplingMechanism {
    /// No sampling guidance was available, the trace is kept opt-in.
    #[default]
    Default = 0,
    /// A per-service rate reported by the agent decided the trace.
    AgentRate = 1,
    /// A configured sampling rule matched the trace's root span.
    Rule = 3,
    /// The decision was made explicitly through the span API.
    Manual = 4,
}

impl SamplingMechanism {
    pub fn into_u8(self) -> u8 {
        self as u8
    }

    /// Maps a keep/drop outcome to the priority pair this mechanism uses.
    ///
    /// Automatic mechanisms produce AUTO_* priorities, user-driven ones
    /// (rules, manual decisions) produce USER_*.
    pub fn to_priority(&self, is_keep: bool) -> SamplingPriority {
        let (keep, reject) = match self {
            SamplingMechanism::Default | SamplingMechanism::AgentRate => {
                (priority::AUTO_KEEP, priority::AUTO_REJECT)
            }
            SamplingMechanism::Rule | SamplingMechanism::Manual => {
                (priority::USER_KEEP, priority::USER_REJECT)
            }
        };
        if is_keep {
            keep
        } else {
            reject
        }
    }

    pub(crate) fn decide(&self, is_keep: bool) -> SamplingDecision {
        SamplingDecision {
            priority: self.to_priority(is_keep),
            mechanism: *self,
        }
    }
}
