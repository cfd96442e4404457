//! Fixed-interval retry policy and the clock it sleeps on.
//!
//! Failing heights are retried forever: neither the sync loop nor a
//! projection may skip a height. The policy only decides how long to wait and
//! when a run of failures is long enough to raise an operator alarm.

use std::time::Duration;

use async_trait::async_trait;

/// Indefinite retry with a fixed backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Wait between attempts.
    pub interval: Duration,
    /// Raise an alarm every `n` consecutive failures on the same height.
    pub alert_after: Option<u32>,
}

impl RetryPolicy {
    pub fn fixed(interval: Duration) -> Self {
        Self {
            interval,
            alert_after: None,
        }
    }

    pub fn with_alert_after(mut self, failures: u32) -> Self {
        self.alert_after = (failures > 0).then_some(failures);
        self
    }

    /// Returns `true` when `consecutive_failures` lands on an alert boundary.
    pub fn should_alert(&self, consecutive_failures: u32) -> bool {
        match self.alert_after {
            Some(n) => consecutive_failures > 0 && consecutive_failures % n == 0,
            None => false,
        }
    }

    /// Returns `true` once the alert threshold has been crossed.
    pub fn is_stalled(&self, consecutive_failures: u32) -> bool {
        self.alert_after
            .map_or(false, |n| consecutive_failures >= n)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(5))
    }
}

/// Source of delays for every loop in the pipeline.
#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Wall-clock sleeping on the Tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_boundaries() {
        let policy = RetryPolicy::fixed(Duration::from_secs(1)).with_alert_after(3);
        assert!(!policy.should_alert(0));
        assert!(!policy.should_alert(2));
        assert!(policy.should_alert(3));
        assert!(!policy.should_alert(4));
        assert!(policy.should_alert(6));

        assert!(!policy.is_stalled(2));
        assert!(policy.is_stalled(3));
        assert!(policy.is_stalled(10));
    }

    #[test]
    fn no_alert_without_threshold() {
        let policy = RetryPolicy::fixed(Duration::from_secs(1)).with_alert_after(0);
        assert_eq!(policy.alert_after, None);
        assert!(!policy.should_alert(100));
        assert!(!policy.is_stalled(100));
    }
}
