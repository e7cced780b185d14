//! Per-caller retry limit for identical tool calls

use crate::config::GuardConfig;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }

    pub fn from_config(config: &GuardConfig) -> Self {
        Self::new(config.max_attempts)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&GuardConfig::default())
    }
}

/// Identity of a call: who made it and with exactly which parameters
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallKey {
    pub caller: String,
    pub params: Vec<String>,
}

impl CallKey {
    pub fn new(caller: &str, params: &[&str]) -> Self {
        Self {
            caller: caller.to_string(),
            params: params.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// Outcome of asking the guard for permission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The call may proceed; `attempt` is 1-based
    Allowed { attempt: u32 },
    /// The key already used up its attempts
    Exhausted { attempts: u32 },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed { .. })
    }
}

/// Counts attempts per [`CallKey`] for the lifetime of the process
#[derive(Debug, Default)]
pub struct RetryGuard {
    policy: RetryPolicy,
    attempts: Mutex<HashMap<CallKey, u32>>,
}

impl RetryGuard {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Record an attempt for `key`, refusing once the limit is reached.
    ///
    /// Refused attempts are not counted.
    pub fn admit(&self, key: CallKey) -> Admission {
        let mut attempts = self
            .attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let count = attempts.entry(key).or_insert(0);
        if *count >= self.policy.max_attempts {
            return Admission::Exhausted { attempts: *count };
        }
        *count += 1;
        Admission::Allowed { attempt: *count }
    }

    pub fn attempts(&self, key: &CallKey) -> u32 {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    pub fn reset(&self) {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
