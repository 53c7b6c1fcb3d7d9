use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tracing::debug;

/// How long to wait between outbound requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacingStrategy {
    /// No pause at all (tests, offline replays)
    None,
    /// Same pause every time
    Fixed(Duration),
    /// `base * 2^failures`, capped at `max`
    Exponential { base: Duration, max: Duration },
}

impl PacingStrategy {
    pub fn delay(&self, consecutive_failures: u32) -> Duration {
        match *self {
            Self::None => Duration::ZERO,
            Self::Fixed(delay) => delay,
            Self::Exponential { base, max } => {
                let factor = 1u32.checked_shl(consecutive_failures).unwrap_or(u32::MAX);
                base.saturating_mul(factor).min(max)
            }
        }
    }
}

/// Pacing gate shared by one call site (searches, detail fetches).
///
/// Failures reported through [`RateLimiter::record_failure`] stretch the next
/// wait under the exponential strategy; a success resets it.
#[derive(Debug)]
pub struct RateLimiter {
    strategy: PacingStrategy,
    failures: AtomicU32,
}

impl RateLimiter {
    pub fn new(strategy: PacingStrategy) -> Self {
        Self {
            strategy,
            failures: AtomicU32::new(0),
        }
    }

    pub fn fixed(delay: Duration) -> Self {
        Self::new(PacingStrategy::Fixed(delay))
    }

    pub fn unpaced() -> Self {
        Self::new(PacingStrategy::None)
    }

    pub fn strategy(&self) -> PacingStrategy {
        self.strategy
    }

    pub fn next_delay(&self) -> Duration {
        self.strategy.delay(self.failures.load(Ordering::Relaxed))
    }

    pub async fn wait(&self) {
        let delay = self.next_delay();
        if delay.is_zero() {
            return;
        }
        debug!("Pacing for {:?}", delay);
        tokio::time::sleep(delay).await;
    }

    pub fn record_success(&self) {
        self.failures.store(0, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }
}
