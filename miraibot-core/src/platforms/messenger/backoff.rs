//! Reconnect pacing for transient stream failures.

use std::collections::VecDeque;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// A lone transient failure reconnects at once; a burst of them inside
/// `window_secs` is spaced out exponentially.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Length of the window in which failures count as "repeated".
    pub window_secs: u64,
    /// Failures inside the window that still reconnect without delay.
    pub immediate_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    /// Adds up to 25% random jitter to each delay.
    pub use_jitter: bool,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            window_secs: 60,
            immediate_retries: 1,
            initial_delay_ms: 1000,
            max_delay_ms: 60_000,
            backoff_multiplier: 2.0,
            use_jitter: true,
        }
    }
}

impl ReconnectPolicy {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// Delay for the `step`-th delayed retry (0-indexed).
    pub fn delay_for_step(&self, step: u32) -> Duration {
        let exponent = step.min(i32::MAX as u32) as i32;
        let base = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let delay_ms = base.min(self.max_delay_ms as f64) as u64;

        if self.use_jitter {
            let jitter = (delay_ms as f64 * 0.25 * rand::random::<f64>()) as u64;
            Duration::from_millis(delay_ms + jitter)
        } else {
            Duration::from_millis(delay_ms)
        }
    }
}

/// Remembers recent transient failures to decide how long to wait before
/// the next reconnect.
#[derive(Debug)]
pub struct TransientTracker {
    policy: ReconnectPolicy,
    recent: VecDeque<Instant>,
}

impl TransientTracker {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            recent: VecDeque::new(),
        }
    }

    /// Records a failure at `now` and returns the delay to apply.
    pub fn next_delay(&mut self, now: Instant) -> Duration {
        let window = self.policy.window();
        while let Some(first) = self.recent.front() {
            if now.saturating_duration_since(*first) > window {
                self.recent.pop_front();
            } else {
                break;
            }
        }
        self.recent.push_back(now);

        let failures = self.recent.len() as u32;
        if failures <= self.policy.immediate_retries {
            return Duration::ZERO;
        }
        self.policy.delay_for_step(failures - self.policy.immediate_retries - 1)
    }

    pub fn recent_failures(&self) -> usize {
        self.recent.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ReconnectPolicy {
        ReconnectPolicy {
            use_jitter: false,
            ..Default::default()
        }
    }

    #[test]
    fn delays_grow_and_cap() {
        let p = policy();
        assert_eq!(p.delay_for_step(0), Duration::from_secs(1));
        assert_eq!(p.delay_for_step(1), Duration::from_secs(2));
        assert_eq!(p.delay_for_step(3), Duration::from_secs(8));
        assert_eq!(p.delay_for_step(20), Duration::from_secs(60));
    }

    #[test]
    fn jitter_stays_within_a_quarter() {
        let p = ReconnectPolicy::default();
        for _ in 0..50 {
            let d = p.delay_for_step(2);
            assert!(d >= Duration::from_millis(4000));
            assert!(d <= Duration::from_millis(5000));
        }
    }

    #[test]
    fn first_failure_is_immediate_then_backs_off() {
        let mut tracker = TransientTracker::new(policy());
        let t0 = Instant::now();
        assert_eq!(tracker.next_delay(t0), Duration::ZERO);
        assert_eq!(tracker.next_delay(t0 + Duration::from_secs(1)), Duration::from_secs(1));
        assert_eq!(tracker.next_delay(t0 + Duration::from_secs(2)), Duration::from_secs(2));
        assert_eq!(tracker.recent_failures(), 3);
    }

    #[test]
    fn quiet_window_resets_the_streak() {
        let mut tracker = TransientTracker::new(policy());
        let t0 = Instant::now();
        tracker.next_delay(t0);
        tracker.next_delay(t0 + Duration::from_secs(1));
        let later = t0 + Duration::from_secs(600);
        assert_eq!(tracker.next_delay(later), Duration::ZERO);
        assert_eq!(tracker.recent_failures(), 1);
    }
}
