// Delay strategies between status checks

use std::time::Duration;

/// Delay after a failed status request
pub const STATUS_RETRY_DELAY: Duration = Duration::from_secs(5);

pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(5000);
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 1.5;
pub const DEFAULT_BACKOFF_CAP: Duration = Duration::from_millis(30000);

/// How long to wait before the next status check of a still-running job
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackoffStrategy {
    /// Same delay after every check
    Fixed(Duration),
    /// `min(base * multiplier^attempt, cap)`
    Exponential {
        base: Duration,
        multiplier: f64,
        cap: Duration,
    },
}

impl BackoffStrategy {
    /// Fixed 5 second delay
    pub fn fixed() -> Self {
        BackoffStrategy::Fixed(STATUS_RETRY_DELAY)
    }

    /// Exponential delay starting from 5 seconds, growing by 1.5, capped at 30 seconds
    pub fn exponential() -> Self {
        BackoffStrategy::Exponential {
            base: DEFAULT_BACKOFF_BASE,
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            cap: DEFAULT_BACKOFF_CAP,
        }
    }

    /// Delay before check number `attempt + 1`, where `attempt` counts the
    /// non-terminal responses received so far (starting at 1)
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            BackoffStrategy::Fixed(delay) => delay,
            BackoffStrategy::Exponential {
                base,
                multiplier,
                cap,
            } => {
                let exponent = attempt.min(i32::MAX as u32) as i32;
                let millis = base.as_millis() as f64 * multiplier.max(1.0).powi(exponent);
                let capped = millis.min(cap.as_millis() as f64);
                if capped.is_finite() {
                    Duration::from_millis(capped as u64)
                } else {
                    cap
                }
            }
        }
    }
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self::fixed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_delay_is_constant() {
        let strategy = BackoffStrategy::fixed();
        assert_eq!(strategy.delay(1), Duration::from_secs(5));
        assert_eq!(strategy.delay(50), Duration::from_secs(5));
    }

    #[test]
    fn test_exponential_delay_grows_until_cap() {
        let strategy = BackoffStrategy::exponential();
        assert_eq!(strategy.delay(1), Duration::from_millis(7500));
        assert_eq!(strategy.delay(2), Duration::from_millis(11250));
        assert_eq!(strategy.delay(3), Duration::from_millis(16875));
        assert_eq!(strategy.delay(5), Duration::from_millis(30000));
        assert_eq!(strategy.delay(u32::MAX), Duration::from_millis(30000));
    }
}
