use crate::prelude::Millis;
use serde::{Deserialize, Serialize};

/// One decoded beacon packet delivered by the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeaconReading {
    pub object_id: String,
    pub rssi_dbm: i32,
    pub received_at: Millis,
}

impl BeaconReading {
    pub fn new(object_id: impl Into<String>, rssi_dbm: i32, received_at: Millis) -> Self {
        Self {
            object_id: object_id.into(),
            rssi_dbm,
            received_at,
        }
    }
}

/// Connectivity of the transport link as seen by the watchdog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    Connected,
    #[default]
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisconnectReason {
    /// No packet within the watchdog timeout.
    Timeout,
    /// The transport reported the link gone.
    Transport,
}

/// Link transition surfaced to the output sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "reason", rename_all = "lowercase")]
pub enum LinkEvent {
    Connected,
    Disconnected(DisconnectReason),
}
