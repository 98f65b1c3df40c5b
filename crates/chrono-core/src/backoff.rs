//! Retry backoff strategies.
//!
//! Generalizes a single hard-coded exponential formula into a pluggable
//! strategy trait with linear and exponential variants, each optionally
//! jittered. RNG is injected so tests can assert exact delays.

use std::time::Duration;

use rand::RngCore;

/// How jitter is applied on top of the base delay.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Jitter {
    /// No jitter; the computed delay is used as-is.
    None,
    /// Delay is a uniform random value in `[0, computed]`.
    Full,
    /// Delay is `computed / 2 + uniform(0, computed / 2)`.
    Equal,
}

impl Jitter {
    fn apply(&self, base: Duration, rng: &mut dyn RngCore) -> Duration {
        match self {
            Jitter::None => base,
            Jitter::Full => {
                let millis = base.as_millis() as u64;
                if millis == 0 {
                    return base;
                }
                Duration::from_millis(rng.next_u64() % (millis + 1))
            }
            Jitter::Equal => {
                let millis = base.as_millis() as u64;
                let half = millis / 2;
                if half == 0 {
                    return base;
                }
                Duration::from_millis(half + rng.next_u64() % (half + 1))
            }
        }
    }
}

/// A pluggable retry delay schedule, parameterized by attempt count.
pub trait BackoffStrategy: Send + Sync {
    /// Computes the delay before retry attempt `retry_count` (0-indexed: the
    /// delay applied after the first failure is `next_delay(0, ..)`).
    fn next_delay(&self, retry_count: u32, rng: &mut dyn RngCore) -> Duration;
}

/// `delay = min(base_delay_ms + increment_ms * retry_count, max_delay_ms)`.
#[derive(Clone, Debug)]
pub struct Linear {
    pub base_delay_ms: u64,
    pub increment_ms: u64,
    pub max_delay_ms: Option<u64>,
    pub jitter: Jitter,
}

impl Linear {
    pub fn new(base_delay_ms: u64, increment_ms: u64) -> Self {
        Self { base_delay_ms, increment_ms, max_delay_ms: None, jitter: Jitter::None }
    }

    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = Some(max_delay_ms);
        self
    }

    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }
}

impl BackoffStrategy for Linear {
    fn next_delay(&self, retry_count: u32, rng: &mut dyn RngCore) -> Duration {
        let raw = self.base_delay_ms.saturating_add(self.increment_ms.saturating_mul(retry_count as u64));
        let capped = match self.max_delay_ms {
            Some(max) => raw.min(max),
            None => raw,
        };
        self.jitter.apply(Duration::from_millis(capped), rng)
    }
}

/// `delay = min(base_delay_ms * 2^retry_count, max_delay_ms)`.
#[derive(Clone, Debug)]
pub struct Exponential {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: Jitter,
}

impl Exponential {
    pub fn new(base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self { base_delay_ms, max_delay_ms, jitter: Jitter::None }
    }

    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }
}

impl BackoffStrategy for Exponential {
    fn next_delay(&self, retry_count: u32, rng: &mut dyn RngCore) -> Duration {
        let multiplier = 1u64.checked_shl(retry_count).unwrap_or(u64::MAX);
        let raw = self.base_delay_ms.saturating_mul(multiplier);
        let capped = raw.min(self.max_delay_ms);
        self.jitter.apply(Duration::from_millis(capped), rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    #[test]
    fn linear_backoff_increments_by_fixed_step() {
        let strategy = Linear::new(1000, 500);
        let mut rng = StepRng::new(0, 1);

        assert_eq!(strategy.next_delay(0, &mut rng), Duration::from_millis(1000));
        assert_eq!(strategy.next_delay(1, &mut rng), Duration::from_millis(1500));
        assert_eq!(strategy.next_delay(2, &mut rng), Duration::from_millis(2000));
    }

    #[test]
    fn linear_backoff_respects_max_delay_cap() {
        let strategy = Linear::new(1000, 1000).with_max_delay_ms(2500);
        let mut rng = StepRng::new(0, 1);

        assert_eq!(strategy.next_delay(10, &mut rng), Duration::from_millis(2500));
    }

    #[test]
    fn exponential_backoff_doubles_each_retry() {
        let strategy = Exponential::new(100, 10_000);
        let mut rng = StepRng::new(0, 1);

        assert_eq!(strategy.next_delay(0, &mut rng), Duration::from_millis(100));
        assert_eq!(strategy.next_delay(1, &mut rng), Duration::from_millis(200));
        assert_eq!(strategy.next_delay(3, &mut rng), Duration::from_millis(800));
    }

    #[test]
    fn exponential_backoff_saturates_at_max_delay() {
        let strategy = Exponential::new(1000, 5000);
        let mut rng = StepRng::new(0, 1);

        assert_eq!(strategy.next_delay(20, &mut rng), Duration::from_millis(5000));
    }

    #[test]
    fn full_jitter_never_exceeds_computed_delay() {
        let strategy = Exponential::new(1000, 10_000).with_jitter(Jitter::Full);
        let mut rng = StepRng::new(u64::MAX / 2, 7);

        for retry in 0..5 {
            let delay = strategy.next_delay(retry, &mut rng);
            assert!(delay <= Duration::from_millis(1000 * 2u64.pow(retry)));
        }
    }

    #[test]
    fn equal_jitter_is_never_below_half_the_computed_delay() {
        let strategy = Exponential::new(2000, 10_000).with_jitter(Jitter::Equal);
        let mut rng = StepRng::new(0, 1);

        let delay = strategy.next_delay(0, &mut rng);
        assert!(delay >= Duration::from_millis(1000));
        assert!(delay <= Duration::from_millis(2000));
    }
}
