use crate::config::SupervisorPolicy;
use std::time::Duration;

/// Restart budget and backoff derived from the supervisor policy
#[derive(Debug, Clone)]
pub struct RestartPolicy {
    /// Consecutive automatic restarts allowed
    pub max_restarts: u32,
    /// Delay before the first restart (in milliseconds)
    pub base_delay_ms: u64,
    /// Cap for the exponential delay (in milliseconds)
    pub max_delay_ms: u64,
    /// Runs at least this long reset the consecutive crash count
    pub min_uptime: Option<Duration>,
}

/// What to do after an entry crashed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    /// Restart after the given delay
    RestartAfter(Duration),
    /// Budget spent; leave the entry crashed
    GiveUp,
}

impl RestartPolicy {
    pub fn from_policy(policy: &SupervisorPolicy) -> Self {
        Self {
            max_restarts: policy.max_restarts,
            base_delay_ms: policy.backoff_base_ms,
            max_delay_ms: policy.backoff_max_ms,
            min_uptime: policy.min_uptime(),
        }
    }

    /// Decide on the `consecutive`-th crash in a row (1-based)
    pub fn decide(&self, consecutive: u32) -> RestartDecision {
        if consecutive == 0 || consecutive > self.max_restarts {
            return RestartDecision::GiveUp;
        }
        RestartDecision::RestartAfter(self.calculate_delay(consecutive))
    }

    /// Exponential backoff: base * 2^(consecutive - 1), capped at the max delay
    pub fn calculate_delay(&self, consecutive: u32) -> Duration {
        let exponent = consecutive.saturating_sub(1);
        let delay_ms = self
            .base_delay_ms
            .saturating_mul(2_u64.saturating_pow(exponent))
            .min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }

    /// Whether a run of this length clears the consecutive crash count
    pub fn resets_after(&self, ran_for: Option<Duration>) -> bool {
        match (self.min_uptime, ran_for) {
            (Some(min), Some(ran)) => ran >= min,
            _ => false,
        }
    }
}
