use beaconcore::interface::{LinkEvent, TickReport};
use beaconcore::telemetry::MetricsSnapshot;
use serde::{Deserialize, Serialize};

/// State served to dashboards polling the bridge.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RiskViewModel {
    pub report: TickReport,
    pub metrics: MetricsSnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_link_event: Option<LinkEvent>,
    pub status: String,
}

impl RiskViewModel {
    pub fn with_status(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            ..Default::default()
        }
    }
}
