//! Active speaker detection over the two voices of a conversation.
//!
//! [`detect_active_speaker`] is a pure decision over smoothed levels;
//! [`SpeakerTracker`] adds smoothing and change-only emission on top.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use spaces_config::SpeakerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeakerRole {
    Host,
    Visitor,
}

impl SpeakerRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Visitor => "visitor",
        }
    }
}

/// One audio level reading attributed to a speaker role.
#[derive(Debug, Clone, Copy)]
pub struct AudioLevelSample {
    pub role: SpeakerRole,
    pub level: f64,
    pub at: Instant,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LevelPair {
    pub host: f64,
    pub visitor: f64,
}

impl LevelPair {
    pub fn new(host: f64, visitor: f64) -> Self {
        Self { host, visitor }
    }

    /// Loudest reading per role; roles without samples read as silence.
    pub fn from_samples(samples: &[AudioLevelSample]) -> Self {
        samples.iter().fold(Self::default(), |mut acc, s| {
            let slot = match s.role {
                SpeakerRole::Host => &mut acc.host,
                SpeakerRole::Visitor => &mut acc.visitor,
            };
            *slot = slot.max(sanitize(s.level));
            acc
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Level one voice must exceed to be the active speaker alone.
    pub single: f64,
    /// Lower bar above which two simultaneous voices are compared.
    pub both: f64,
}

impl From<&SpeakerConfig> for Thresholds {
    fn from(config: &SpeakerConfig) -> Self {
        Self {
            single: config.single_threshold,
            both: config.both_threshold,
        }
    }
}

/// Decide who is speaking.
///
/// When both voices exceed `both`, the louder one wins and a tie keeps
/// `previous`. Otherwise a single voice above `single` wins. Anything else
/// is silence.
pub fn detect_active_speaker(
    levels: LevelPair,
    previous: Option<SpeakerRole>,
    thresholds: Thresholds,
) -> Option<SpeakerRole> {
    let host = sanitize(levels.host);
    let visitor = sanitize(levels.visitor);

    if host > thresholds.both && visitor > thresholds.both {
        return if host > visitor {
            Some(SpeakerRole::Host)
        } else if visitor > host {
            Some(SpeakerRole::Visitor)
        } else {
            previous
        };
    }

    match (host > thresholds.single, visitor > thresholds.single) {
        (true, false) => Some(SpeakerRole::Host),
        (false, true) => Some(SpeakerRole::Visitor),
        _ => None,
    }
}

fn sanitize(level: f64) -> f64 {
    if level.is_finite() && level > 0.0 {
        level
    } else {
        0.0
    }
}

/// Smooths raw levels and reports a decision only when it changes.
#[derive(Debug, Clone)]
pub struct SpeakerTracker {
    thresholds: Thresholds,
    smoothing: f64,
    smoothed: LevelPair,
    current: Option<SpeakerRole>,
}

impl SpeakerTracker {
    pub fn new(config: &SpeakerConfig) -> Self {
        Self {
            thresholds: Thresholds::from(config),
            smoothing: config.smoothing.clamp(0.0, 1.0),
            smoothed: LevelPair::default(),
            current: None,
        }
    }

    pub fn current(&self) -> Option<SpeakerRole> {
        self.current
    }

    /// Feed one raw reading. Returns `Some(decision)` only when the active
    /// speaker differs from the previous decision.
    pub fn observe(&mut self, raw: LevelPair) -> Option<Option<SpeakerRole>> {
        let a = self.smoothing;
        self.smoothed = LevelPair {
            host: a * sanitize(raw.host) + (1.0 - a) * self.smoothed.host,
            visitor: a * sanitize(raw.visitor) + (1.0 - a) * self.smoothed.visitor,
        };
        let next = detect_active_speaker(self.smoothed, self.current, self.thresholds);
        if next == self.current {
            return None;
        }
        self.current = next;
        Some(next)
    }

    pub fn reset(&mut self) {
        self.smoothed = LevelPair::default();
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> Thresholds {
        Thresholds::from(&SpeakerConfig::default())
    }

    #[test]
    fn loud_host_wins() {
        let got = detect_active_speaker(LevelPair::new(0.01, 0.0), None, thresholds());
        assert_eq!(got, Some(SpeakerRole::Host));
    }

    #[test]
    fn louder_of_two_quiet_voices_wins() {
        let got = detect_active_speaker(LevelPair::new(0.0005, 0.0007), None, thresholds());
        assert_eq!(got, Some(SpeakerRole::Visitor));
    }

    #[test]
    fn silence_yields_none() {
        let got = detect_active_speaker(
            LevelPair::new(0.0001, 0.0002),
            Some(SpeakerRole::Host),
            thresholds(),
        );
        assert_eq!(got, None);
    }

    #[test]
    fn tie_keeps_previous() {
        let level = LevelPair::new(0.004, 0.004);
        assert_eq!(
            detect_active_speaker(level, Some(SpeakerRole::Visitor), thresholds()),
            Some(SpeakerRole::Visitor)
        );
        assert_eq!(detect_active_speaker(level, None, thresholds()), None);
    }

    #[test]
    fn garbage_levels_count_as_silence() {
        let got = detect_active_speaker(LevelPair::new(f64::NAN, -1.0), None, thresholds());
        assert_eq!(got, None);
    }

    #[test]
    fn tracker_emits_only_changes() {
        let config = SpeakerConfig {
            smoothing: 1.0,
            ..SpeakerConfig::default()
        };
        let mut tracker = SpeakerTracker::new(&config);
        let loud_host = LevelPair::new(0.01, 0.0);

        assert_eq!(tracker.observe(loud_host), Some(Some(SpeakerRole::Host)));
        assert_eq!(tracker.observe(loud_host), None);
        assert_eq!(tracker.observe(loud_host), None);
        assert_eq!(tracker.observe(LevelPair::default()), Some(None));
        assert_eq!(tracker.observe(LevelPair::default()), None);
    }

    #[test]
    fn smoothing_delays_the_switch() {
        let mut tracker = SpeakerTracker::new(&SpeakerConfig::default());
        assert_eq!(
            tracker.observe(LevelPair::new(0.01, 0.0)),
            Some(Some(SpeakerRole::Host))
        );
        // host 0.0025, visitor 0.002: host still louder
        assert_eq!(tracker.observe(LevelPair::new(0.0, 0.004)), None);
        // host 0.00125, visitor 0.005
        assert_eq!(
            tracker.observe(LevelPair::new(0.0, 0.008)),
            Some(Some(SpeakerRole::Visitor))
        );
        tracker.reset();
        assert_eq!(tracker.current(), None);
    }

    #[test]
    fn samples_fold_to_loudest_per_role() {
        let now = Instant::now();
        let pair = LevelPair::from_samples(&[
            AudioLevelSample { role: SpeakerRole::Visitor, level: 0.002, at: now },
            AudioLevelSample { role: SpeakerRole::Visitor, level: 0.004, at: now },
            AudioLevelSample { role: SpeakerRole::Host, level: f64::INFINITY, at: now },
        ]);
        assert_eq!(pair, LevelPair::new(0.0, 0.004));
    }
}
