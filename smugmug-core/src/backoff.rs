use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter: bool,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, jitter: bool) -> Self {
        Self { base, max, jitter }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let mut rng = rand::thread_rng();
        self.delay_with_rng(attempt, &mut rng)
    }

    pub fn delay_with_rng<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let base_ms = self.base.as_millis().min(u128::from(u64::MAX)) as u64;
        let max_ms = self.max.as_millis().min(u128::from(u64::MAX)) as u64;
        let shift = attempt.min(16);
        let exp = base_ms.saturating_mul(1u64 << shift).min(max_ms);
        let delay_ms = if self.jitter {
            // Half-jitter: keeps a floor so retries never hammer instantly.
            rng.gen_range(exp / 2..=exp)
        } else {
            exp
        };
        Duration::from_millis(delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn backoff_without_jitter_is_exponential() {
        let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(60), false);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(backoff.delay_with_rng(0, &mut rng), Duration::from_secs(1));
        assert_eq!(backoff.delay_with_rng(1, &mut rng), Duration::from_secs(2));
        assert_eq!(backoff.delay_with_rng(2, &mut rng), Duration::from_secs(4));
        assert_eq!(backoff.delay_with_rng(5, &mut rng), Duration::from_secs(32));
        assert_eq!(backoff.delay_with_rng(6, &mut rng), Duration::from_secs(60));
        assert_eq!(backoff.delay_with_rng(16, &mut rng), Duration::from_secs(60));
    }

    #[test]
    fn backoff_with_jitter_stays_within_bounds() {
        let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(60), true);
        let mut rng = StdRng::seed_from_u64(42);
        for attempt in 0..8 {
            let delay = backoff.delay_with_rng(attempt, &mut rng);
            assert!(delay <= Duration::from_secs(60));
        }
        let delay = backoff.delay_with_rng(3, &mut rng);
        assert!(delay >= Duration::from_secs(4));
    }
}
