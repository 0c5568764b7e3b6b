// ── Retry backoff ──
//
// delay(n) = min(base * 2^(n-1), max) for the n-th consecutive failure,
// zero once a cycle succeeds. Validation and transport failures share the
// same streak.

use std::time::Duration;

use crate::config::RetryPolicy;

/// Failure streak and the delay it implies.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    failures: u32,
    next_delay: Duration,
    seed: u64,
}

impl Backoff {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            failures: 0,
            next_delay: Duration::ZERO,
            seed: 0,
        }
    }

    /// Phase offset for jitter, so devices sharing a policy spread out.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Swap the policy, keeping the current streak.
    pub fn set_policy(&mut self, policy: RetryPolicy) {
        self.policy = policy;
        if self.failures > 0 {
            self.next_delay = self.delay_for(self.failures);
        }
    }

    /// Extend the streak and return the delay before the next attempt.
    pub fn record_failure(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        self.next_delay = self.delay_for(self.failures);
        self.next_delay
    }

    /// Stretch the pending delay to at least `floor`, still capped at the
    /// policy maximum. Used when the device names its own retry time.
    pub fn defer(&mut self, floor: Duration) -> Duration {
        self.next_delay = self.next_delay.max(floor.min(self.policy.max_delay));
        self.next_delay
    }

    pub fn reset(&mut self) {
        self.failures = 0;
        self.next_delay = Duration::ZERO;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn next_delay(&self) -> Duration {
        self.next_delay
    }

    /// Delay after `failures` consecutive failures.
    pub fn delay_for(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let max = self.policy.max_delay;
        let factor = 1u32.checked_shl(failures - 1).unwrap_or(u32::MAX);
        let capped = self
            .policy
            .base_delay
            .checked_mul(factor)
            .map_or(max, |d| d.min(max));

        if self.policy.jitter {
            jitter(capped, failures, self.seed).min(max)
        } else {
            capped
        }
    }
}

/// Deterministic +/-25% spread seeded from the attempt number and a
/// per-device phase.
fn jitter(delay: Duration, attempt: u32, seed: u64) -> Duration {
    let phase = f64::from(u32::try_from(seed % 1000).unwrap_or(0)) / 1000.0 * std::f64::consts::TAU;
    let factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3 + phase).sin();
    Duration::from_secs_f64((delay.as_secs_f64() * factor).max(0.0))
}
