//! Request pacing: randomized pauses between downloads and a cooldown when
//! the provider's remaining rate limit runs low.

use std::time::Duration;

use tracing::{debug, info};

/// Pause inserted between successful downloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    /// No pause; used for dry runs and tests.
    Disabled,
    /// Uniformly random pause in `min..=max`.
    Random {
        /// Shortest pause.
        min: Duration,
        /// Longest pause.
        max: Duration,
    },
}

impl Default for Pacing {
    fn default() -> Self {
        Self::Random {
            min: Duration::from_secs(7),
            max: Duration::from_secs(15),
        }
    }
}

impl Pacing {
    pub fn new(enabled: bool) -> Self {
        if enabled {
            Self::default()
        } else {
            Self::Disabled
        }
    }

    /// Draw the next pause.
    pub fn delay(self) -> Duration {
        match self {
            Self::Disabled => Duration::ZERO,
            Self::Random { min, max } => {
                let low = min.as_millis() as u64;
                let high = (max.as_millis() as u64).max(low);
                Duration::from_millis(fastrand::u64(low..=high))
            }
        }
    }

    pub async fn pause(self) {
        let delay = self.delay();
        if delay.is_zero() {
            return;
        }
        debug!(delay_ms = delay.as_millis() as u64, "pausing between downloads");
        tokio::time::sleep(delay).await;
    }
}

/// Cooldown applied when the provider reports few remaining requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Cool down when the remaining count is at or below this value.
    pub low_water: u32,
    pub cooldown: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            low_water: 15,
            cooldown: Duration::from_secs(20),
        }
    }
}

impl RateLimitPolicy {
    /// Cooldown for a `x-ratelimit-remaining` header value, if one is due.
    ///
    /// A missing or unparseable header never triggers a cooldown.
    pub fn cooldown_for(&self, remaining: Option<&str>) -> Option<Duration> {
        let remaining: u32 = remaining?.trim().parse().ok()?;
        (remaining <= self.low_water).then_some(self.cooldown)
    }

    pub async fn observe(&self, remaining: Option<&str>) {
        if let Some(cooldown) = self.cooldown_for(remaining) {
            info!(
                remaining = remaining.unwrap_or_default(),
                cooldown_secs = cooldown.as_secs(),
                "rate limit low, cooling down"
            );
            tokio::time::sleep(cooldown).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_pacing_never_waits() {
        assert_eq!(Pacing::new(false).delay(), Duration::ZERO);
    }

    #[test]
    fn random_pacing_stays_in_bounds() {
        let pacing = Pacing::default();
        for _ in 0..50 {
            let delay = pacing.delay();
            assert!(delay >= Duration::from_secs(7), "delay={delay:?}");
            assert!(delay <= Duration::from_secs(15), "delay={delay:?}");
        }
    }

    #[test]
    fn cooldown_triggers_at_low_water_mark() {
        let policy = RateLimitPolicy::default();
        assert_eq!(policy.cooldown_for(Some("15")), Some(Duration::from_secs(20)));
        assert_eq!(policy.cooldown_for(Some("3")), Some(Duration::from_secs(20)));
        assert_eq!(policy.cooldown_for(Some("16")), None);
        assert_eq!(policy.cooldown_for(Some("n/a")), None);
        assert_eq!(policy.cooldown_for(None), None);
    }
}
