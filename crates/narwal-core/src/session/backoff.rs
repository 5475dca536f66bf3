// ── Reconnect backoff ──
//
// Delays grow exponentially from `initial_delay` with a deterministic
// jitter, never shrink while the device stays unreachable, and never
// exceed `max_delay`. Only a connection that stayed awake for
// `reset_after` brings them back down.

use std::time::Duration;

use crate::config::ReconnectConfig;

#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    config: ReconnectConfig,
    attempt: u32,
    last: Duration,
}

impl Backoff {
    pub(crate) fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempt: 0,
            last: Duration::ZERO,
        }
    }

    /// Consecutive failures since the last reset.
    pub(crate) fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay before the next attempt; advances the attempt counter.
    pub(crate) fn next_delay(&mut self) -> Duration {
        let delay = jittered(self.attempt, &self.config)
            .max(self.last)
            .min(self.config.max_delay);
        self.last = delay;
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Report how long the last connection stayed awake. Returns `true` if
    /// that was long enough to reset the backoff.
    pub(crate) fn record_awake(&mut self, awake_for: Duration) -> bool {
        if awake_for >= self.config.reset_after {
            self.reset();
            return true;
        }
        false
    }

    pub(crate) fn reset(&mut self) {
        self.attempt = 0;
        self.last = Duration::ZERO;
    }
}

/// `initial * 2^attempt`, capped, scaled by a jitter factor in 0.75..=1.25.
#[allow(clippy::cast_precision_loss, clippy::as_conversions)]
fn jittered(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt.min(30)).unwrap_or(30);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    Duration::from_secs_f64((capped * jitter_factor).max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ReconnectConfig {
        ReconnectConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            reset_after: Duration::from_secs(120),
        }
    }

    #[test]
    fn delays_never_decrease_and_stay_capped() {
        let mut backoff = Backoff::new(config());
        let mut previous = Duration::ZERO;
        for _ in 0..40 {
            let delay = backoff.next_delay();
            assert!(delay >= previous, "{delay:?} < {previous:?}");
            assert!(delay <= Duration::from_secs(60));
            previous = delay;
        }
        assert_eq!(previous, Duration::from_secs(60));
    }

    #[test]
    fn first_delay_is_near_initial() {
        let mut backoff = Backoff::new(config());
        let first = backoff.next_delay();
        assert!(first >= Duration::from_millis(750) && first <= Duration::from_millis(1250));
    }

    #[test]
    fn short_awake_period_keeps_backoff() {
        let mut backoff = Backoff::new(config());
        for _ in 0..5 {
            backoff.next_delay();
        }
        assert!(!backoff.record_awake(Duration::from_secs(30)));
        assert_eq!(backoff.attempt(), 5);
        assert!(backoff.next_delay() >= Duration::from_secs(16));
    }

    #[test]
    fn sustained_awake_resets_backoff() {
        let mut backoff = Backoff::new(config());
        for _ in 0..5 {
            backoff.next_delay();
        }
        assert!(backoff.record_awake(Duration::from_secs(120)));
        assert_eq!(backoff.attempt(), 0);
        assert!(backoff.next_delay() <= Duration::from_millis(1250));
    }

    #[test]
    fn attempts_keep_counting_at_the_cap() {
        let mut backoff = Backoff::new(config());
        for _ in 0..100 {
            backoff.next_delay();
        }
        assert_eq!(backoff.attempt(), 100);
        assert_eq!(backoff.next_delay(), Duration::from_secs(60));
    }
}
