// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Allocation fault policy + runtime controller for the namespace tree

use crate::NsError;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};

/// Allocation sites that can be made to fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultOp {
    /// Heap buffer for a name longer than the inline threshold.
    NameAlloc,
    /// Arena slot for a new node.
    NodeAlloc,
}

/// Individual rule describing which allocation should fail and how often.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultRule {
    pub op: FaultOp,
    /// Optional number of leading invocations to skip before injecting faults.
    #[serde(default)]
    pub start_after: u64,
    /// Optional maximum number of injected failures for this rule.
    #[serde(default)]
    pub max_faults: Option<u64>,
}

impl FaultRule {
    pub fn always(op: FaultOp) -> Self {
        Self {
            op,
            start_after: 0,
            max_faults: None,
        }
    }
}

/// JSON/TOML-serializable policy.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct FaultPolicy {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub rules: Vec<FaultRule>,
}

impl FaultPolicy {
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn single(rule: FaultRule) -> Self {
        Self {
            enabled: true,
            rules: vec![rule],
        }
    }

    pub fn is_active(&self) -> bool {
        self.enabled && !self.rules.is_empty()
    }
}

#[derive(Clone, Debug, Default)]
struct RuleCounters {
    hits: u64,
    invocations: u64,
}

#[derive(Clone, Debug, Default)]
struct FaultState {
    policy: FaultPolicy,
    counters: Vec<RuleCounters>,
}

/// Runtime controller that tracks policy + hit counts.
///
/// Counters sit behind a mutex so that the allocation paths can consult the
/// injector through a shared reference.
#[derive(Debug, Default)]
pub struct FaultInjector {
    state: Mutex<FaultState>,
}

impl FaultInjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: FaultPolicy) -> Self {
        let injector = Self::new();
        injector.set_policy(policy);
        injector
    }

    pub fn snapshot(&self) -> FaultPolicy {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).policy.clone()
    }

    pub fn set_policy(&self, policy: FaultPolicy) {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        guard.counters = vec![RuleCounters::default(); policy.rules.len()];
        guard.policy = policy;
    }

    pub fn clear(&self) {
        self.set_policy(FaultPolicy::default());
    }

    /// Returns `Err(OutOfMemory)` when a rule for `op` fires.
    pub fn check(&self, op: FaultOp) -> Result<(), NsError> {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !guard.policy.enabled {
            return Ok(());
        }
        let state = &mut *guard;
        if state.counters.len() < state.policy.rules.len() {
            state.counters.resize(state.policy.rules.len(), RuleCounters::default());
        }
        for (rule, counters) in state.policy.rules.iter().zip(state.counters.iter_mut()) {
            if rule.op != op {
                continue;
            }
            counters.invocations = counters.invocations.saturating_add(1);
            if counters.invocations <= rule.start_after {
                continue;
            }
            if let Some(max) = rule.max_faults {
                if counters.hits >= max {
                    continue;
                }
            }
            counters.hits = counters.hits.saturating_add(1);
            tracing::debug!(
                target: "devns::fault",
                ?op,
                hits = counters.hits,
                "injecting allocation failure"
            );
            return Err(NsError::OutOfMemory);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fault_policy_json() {
        let json = br#"{ "enabled": true, "rules": [ { "op": "name_alloc", "max_faults": 2 } ] }"#;
        let policy = FaultPolicy::from_json_bytes(json).expect("policy");
        assert!(policy.enabled);
        assert_eq!(policy.rules.len(), 1);
        assert_eq!(policy.rules[0].op, FaultOp::NameAlloc);
        assert_eq!(policy.rules[0].max_faults, Some(2));
    }

    #[test]
    fn injector_respects_start_and_max_hits() {
        let injector = FaultInjector::with_policy(FaultPolicy::single(FaultRule {
            op: FaultOp::NodeAlloc,
            start_after: 1,
            max_faults: Some(2),
        }));

        // First call skipped due to start_after
        assert_eq!(injector.check(FaultOp::NodeAlloc), Ok(()));
        assert_eq!(injector.check(FaultOp::NodeAlloc), Err(NsError::OutOfMemory));
        assert_eq!(injector.check(FaultOp::NodeAlloc), Err(NsError::OutOfMemory));
        // Max hits reached
        assert_eq!(injector.check(FaultOp::NodeAlloc), Ok(()));
    }

    #[test]
    fn rules_only_match_their_own_op() {
        let injector = FaultInjector::with_policy(FaultPolicy::single(FaultRule::always(
            FaultOp::NameAlloc,
        )));
        assert_eq!(injector.check(FaultOp::NodeAlloc), Ok(()));
        assert_eq!(injector.check(FaultOp::NameAlloc), Err(NsError::OutOfMemory));

        injector.clear();
        assert_eq!(injector.check(FaultOp::NameAlloc), Ok(()));
        assert!(!injector.snapshot().is_active());
    }
}
