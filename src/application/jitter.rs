use crate::domain::ActionLimits;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// Closed pacing window, in seconds, for one action type on one account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JitterProfile {
    pub min_interval_s: u64,
    pub max_interval_s: u64,
}

impl JitterProfile {
    pub fn new(min_interval_s: u64, max_interval_s: u64) -> Self {
        // an inverted window collapses to the fixed lower bound
        Self {
            min_interval_s,
            max_interval_s: max_interval_s.max(min_interval_s),
        }
    }

    pub fn from_limits(limits: &ActionLimits) -> Self {
        Self::new(
            limits.min_interval_s.max(0) as u64,
            limits.max_interval_s.max(0) as u64,
        )
    }
}

/// Randomised delay between consecutive actions on one account.
///
/// Each lane owns its policy, so no state is shared across accounts. Tests
/// pin the random source with [`JitterPolicy::with_seed`].
pub struct JitterPolicy {
    rng: StdRng,
}

impl JitterPolicy {
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Uniform over `[min, max]` at millisecond resolution; `min == max`
    /// yields exactly that delay.
    pub fn next_delay(&mut self, profile: &JitterProfile) -> Duration {
        let min_ms = profile.min_interval_s.saturating_mul(1000);
        let max_ms = profile.max_interval_s.saturating_mul(1000);
        if min_ms >= max_ms {
            return Duration::from_millis(min_ms);
        }
        Duration::from_millis(self.rng.gen_range(min_ms..=max_ms))
    }
}
