use crate::interface::LinkState;
use crate::prelude::{Millis, RiskLevel};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Risk picture for one object in one tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectRisk {
    pub level: RiskLevel,
    /// Reconstruction error; absent while the window is buffering or the object is ignored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<f32>,
    pub avg_signal: f32,
    pub ignored: bool,
    pub buffering: bool,
}

/// Output emitted once per fusion tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    pub timestamp: Millis,
    pub link: LinkState,
    pub active_object_count: usize,
    pub per_object_risk: BTreeMap<String, ObjectRisk>,
    pub aggregate_risk: RiskLevel,
    /// Strongest active, non-ignored object for telemetry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strongest: Option<String>,
    /// The self-training queue is full and a pass can run.
    pub training_due: bool,
}

impl TickReport {
    /// Report for a tick while the link is down: no objects, no risk.
    pub fn offline(timestamp: Millis) -> Self {
        Self {
            timestamp,
            link: LinkState::Disconnected,
            ..Default::default()
        }
    }

    /// Ids currently classified DANGER.
    pub fn danger_ids(&self) -> Vec<String> {
        self.per_object_risk
            .iter()
            .filter(|(_, risk)| risk.level == RiskLevel::Danger)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn level_of(&self, id: &str) -> Option<RiskLevel> {
        self.per_object_risk.get(id).map(|risk| risk.level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_report_carries_no_risk() {
        let report = TickReport::offline(42);
        assert_eq!(report.link, LinkState::Disconnected);
        assert_eq!(report.active_object_count, 0);
        assert_eq!(report.aggregate_risk, RiskLevel::Safe);
        assert!(report.danger_ids().is_empty());
    }

    #[test]
    fn report_serializes_for_the_sink() {
        let mut report = TickReport {
            timestamp: 1_000,
            link: LinkState::Connected,
            active_object_count: 1,
            aggregate_risk: RiskLevel::Danger,
            ..Default::default()
        };
        report.per_object_risk.insert(
            "aa:bb".into(),
            ObjectRisk {
                level: RiskLevel::Danger,
                score: Some(0.2),
                limit: Some(0.1),
                avg_signal: -42.0,
                ..Default::default()
            },
        );

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["aggregate_risk"], "DANGER");
        assert_eq!(json["link"], "connected");
        assert_eq!(json["per_object_risk"]["aa:bb"]["avg_signal"], -42.0);
        assert_eq!(report.danger_ids(), vec!["aa:bb".to_string()]);
    }
}
