use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use spaces_config::RecordingConfig;

use crate::services::ActiveSession;

/// How far before the expected start a session may have been created and
/// still belong to this hosting attempt.
const START_SKEW_SECS: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale { age_secs: i64 },
    /// Created before this hosting attempt began.
    Mismatched,
}

impl Freshness {
    pub fn is_fresh(self) -> bool {
        self == Self::Fresh
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FreshnessPolicy {
    max_age_expected: chrono::Duration,
    max_age: chrono::Duration,
}

impl FreshnessPolicy {
    pub fn from_config(config: &RecordingConfig) -> Self {
        Self {
            max_age_expected: chrono::Duration::seconds(i64::from(config.fresh_age_expected_secs)),
            max_age: chrono::Duration::seconds(i64::from(config.fresh_age_secs)),
        }
    }

    pub fn check(
        &self,
        session: &ActiveSession,
        now: DateTime<Utc>,
        expected_start: Option<DateTime<Utc>>,
    ) -> Freshness {
        let age = now - session.created_at;
        let limit = match expected_start {
            Some(expected) => {
                if session.created_at < expected - chrono::Duration::seconds(START_SKEW_SECS) {
                    return Freshness::Mismatched;
                }
                self.max_age_expected
            }
            None => self.max_age,
        };
        if age > limit {
            Freshness::Stale {
                age_secs: age.num_seconds(),
            }
        } else {
            Freshness::Fresh
        }
    }
}

/// Bounded retries with doubling, jittered delays.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub jitter: (f64, f64),
}

impl RetryPolicy {
    pub fn from_config(config: &RecordingConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            base_delay: Duration::from_millis(u64::from(config.retry_base_delay_ms)),
            jitter: (config.jitter_min, config.jitter_max),
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32, rng: &mut impl Rng) -> Duration {
        let (lo, hi) = self.jitter;
        let factor = if lo < hi { rng.gen_range(lo..=hi) } else { lo };
        let exp = 2u32.saturating_pow(attempt.saturating_sub(1).min(16));
        self.base_delay.mul_f64(f64::from(exp) * factor.max(0.0))
    }
}
