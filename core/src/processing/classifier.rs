use crate::config::ClassifierConfig;
use crate::prelude::RiskLevel;
use serde::Serialize;

/// Everything the classifier looks at for one object in one tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskInput {
    pub ignored: bool,
    pub buffering: bool,
    pub average_signal: f32,
    pub latest_signal: Option<f32>,
    pub score: Option<f32>,
    pub limit: Option<f32>,
}

/// Which rule produced a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RiskReason {
    Ignored,
    Buffering,
    ProximityOverride,
    Anomaly,
    Nominal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub level: RiskLevel,
    pub reason: RiskReason,
}

impl Decision {
    fn new(level: RiskLevel, reason: RiskReason) -> Self {
        Self { level, reason }
    }
}

/// Fixed-precedence mapping from model output and signal strength to risk.
///
/// The proximity override sits above the model: a learned limit can never
/// suppress a raw-proximity emergency.
#[derive(Debug, Clone)]
pub struct RiskClassifier {
    config: ClassifierConfig,
}

impl RiskClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn decide(&self, input: &RiskInput) -> Decision {
        if input.ignored {
            return Decision::new(RiskLevel::Safe, RiskReason::Ignored);
        }
        if input.buffering {
            return Decision::new(RiskLevel::Safe, RiskReason::Buffering);
        }
        if self.within_proximity(input) {
            return Decision::new(RiskLevel::Danger, RiskReason::ProximityOverride);
        }

        match (input.score, input.limit) {
            (Some(score), Some(limit)) if score > limit => {
                let level = if input.average_signal > self.config.mid_dbm {
                    RiskLevel::Danger
                } else if input.average_signal > self.config.far_dbm {
                    RiskLevel::Warn
                } else {
                    RiskLevel::Safe
                };
                Decision::new(level, RiskReason::Anomaly)
            }
            _ => Decision::new(RiskLevel::Safe, RiskReason::Nominal),
        }
    }

    /// A single reading above the near band trips the override, as does the average.
    fn within_proximity(&self, input: &RiskInput) -> bool {
        let near = self.config.near_dbm;
        input.average_signal > near || input.latest_signal.map_or(false, |latest| latest > near)
    }

    /// Aggregate risk of a tick: the highest level present.
    pub fn aggregate<I>(levels: I) -> RiskLevel
    where
        I: IntoIterator<Item = RiskLevel>,
    {
        levels.into_iter().max().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> RiskClassifier {
        RiskClassifier::new(ClassifierConfig::default())
    }

    fn evaluated(average_signal: f32, score: f32, limit: f32) -> RiskInput {
        RiskInput {
            average_signal,
            latest_signal: Some(average_signal),
            score: Some(score),
            limit: Some(limit),
            ..Default::default()
        }
    }

    #[test]
    fn ignored_objects_are_always_safe() {
        let classifier = classifier();
        for (signal, score) in [(-30.0, 9.0), (-70.0, 1.0), (-95.0, 0.0)] {
            let input = RiskInput {
                ignored: true,
                ..evaluated(signal, score, 0.1)
            };
            assert_eq!(classifier.decide(&input).level, RiskLevel::Safe);
        }
    }

    #[test]
    fn buffering_objects_are_safe_even_when_near() {
        let input = RiskInput {
            buffering: true,
            average_signal: -30.0,
            latest_signal: Some(-30.0),
            ..Default::default()
        };
        let decision = classifier().decide(&input);
        assert_eq!(decision.level, RiskLevel::Safe);
        assert_eq!(decision.reason, RiskReason::Buffering);
    }

    #[test]
    fn proximity_override_beats_a_quiet_model() {
        let decision = classifier().decide(&evaluated(-40.0, 0.0001, 5.0));
        assert_eq!(decision.level, RiskLevel::Danger);
        assert_eq!(decision.reason, RiskReason::ProximityOverride);
    }

    #[test]
    fn single_near_reading_trips_override() {
        let input = RiskInput {
            latest_signal: Some(-40.0),
            ..evaluated(-87.5, 0.01, 0.2)
        };
        assert_eq!(classifier().decide(&input).level, RiskLevel::Danger);
    }

    #[test]
    fn anomalies_are_banded_by_signal() {
        let classifier = classifier();
        assert_eq!(
            classifier.decide(&evaluated(-60.0, 0.5, 0.1)).level,
            RiskLevel::Danger
        );
        assert_eq!(
            classifier.decide(&evaluated(-80.0, 0.5, 0.1)).level,
            RiskLevel::Warn
        );
        assert_eq!(
            classifier.decide(&evaluated(-90.0, 0.5, 0.1)).level,
            RiskLevel::Safe
        );
        assert_eq!(
            classifier.decide(&evaluated(-60.0, 0.05, 0.1)).reason,
            RiskReason::Nominal
        );
    }

    #[test]
    fn aggregate_takes_the_maximum() {
        assert_eq!(
            RiskClassifier::aggregate([RiskLevel::Safe, RiskLevel::Warn]),
            RiskLevel::Warn
        );
        assert_eq!(
            RiskClassifier::aggregate(std::iter::empty()),
            RiskLevel::Safe
        );
    }
}
