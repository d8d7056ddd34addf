//! Lifecycle states and retry bookkeeping.

use std::fmt;
use std::time::Duration;

/// Where the daemon is in its session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Authenticating,
    Connecting,
    Connected,
    Disconnecting,
    Terminated,
}

impl LifecycleState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Terminated)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Authenticating => "authenticating",
            LifecycleState::Connecting => "connecting",
            LifecycleState::Connected => "connected",
            LifecycleState::Disconnecting => "disconnecting",
            LifecycleState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Escalating delays between consecutive failed attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    delays: Vec<Duration>,
    max_attempts: u32,
}

impl RetryPolicy {
    /// Build a policy. An empty delay list falls back to the defaults.
    pub fn new(delays: Vec<Duration>, max_attempts: u32) -> Self {
        let delays = if delays.is_empty() {
            Self::default().delays
        } else {
            delays
        };
        Self {
            delays,
            max_attempts,
        }
    }

    /// Delay before retry number `retry` (zero-based). The last delay
    /// repeats once the list runs out.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let idx = (retry as usize).min(self.delays.len().saturating_sub(1));
        self.delays.get(idx).copied().unwrap_or_default()
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }
}

impl Default for RetryPolicy {
    /// 10s, 30s, 60s, 120s, then every 300s, for up to 10000 attempts.
    fn default() -> Self {
        Self {
            delays: [10, 30, 60, 120, 300]
                .into_iter()
                .map(Duration::from_secs)
                .collect(),
            max_attempts: 10_000,
        }
    }
}

/// Consecutive failures of one kind of attempt.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RetryCounter {
    failures: u32,
}

impl RetryCounter {
    /// Record a failure and return the delay before the next attempt, or
    /// `None` when the attempt budget is spent.
    pub fn record_failure(&mut self, policy: &RetryPolicy) -> Option<Duration> {
        self.failures = self.failures.saturating_add(1);
        if self.failures >= policy.max_attempts() {
            return None;
        }
        Some(policy.delay_for(self.failures - 1))
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}
