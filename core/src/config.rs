//! Engine configuration.
//!
//! Every tunable of the engine lives here with its default. The values are
//! representative choices, not constants validated against real hardware, so
//! each section can be overridden independently from YAML or code.

use crate::prelude::{EngineError, EngineResult, Millis};
use serde::{Deserialize, Serialize};

/// Number of context features appended after the signal window.
pub const CONTEXT_FEATURES: usize = 4;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub tracking: TrackingConfig,
    pub encoder: EncoderConfig,
    pub model: ModelConfig,
    pub threshold: ThresholdConfig,
    pub classifier: ClassifierConfig,
    pub watchdog: WatchdogConfig,
    pub schedule: ScheduleConfig,
}

/// Per-object signal tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Signal window length W.
    pub window_size: usize,
    /// Objects unseen for longer than this are left out of a tick.
    pub stale_after_ms: Millis,
    /// Stale objects older than this are dropped from the registry.
    pub reclaim_after_ms: Millis,
    /// Packet-rate measurement window.
    pub rate_window_ms: Millis,
    /// Near-reading streak that ignore-lists an object as the operator's own device.
    /// `None` disables the gatekeeper.
    ///
    /// With the default cutoff equal to the proximity override, anything that lingers
    /// in the near band for more than this many packets is silenced for the rest of
    /// the session, including a person standing next to the vehicle. Disable it where
    /// the operator's device never reaches the engine.
    pub auto_ignore_after: Option<u32>,
    /// Raw reading above which a packet counts towards the gatekeeper streak.
    pub auto_ignore_dbm: f32,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            window_size: 20,
            stale_after_ms: 5_000,
            reclaim_after_ms: 30_000,
            rate_window_ms: 1_000,
            auto_ignore_after: Some(20),
            auto_ignore_dbm: -45.0,
        }
    }
}

/// Feature normalisation ranges.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    pub rssi_floor_dbm: f32,
    pub rssi_span_db: f32,
    /// Motion cap in g.
    pub motion_cap: f32,
    /// Rotation cap in deg/s.
    pub rotation_cap: f32,
    /// Nominal maximum packet rate per second.
    pub max_packet_rate: f32,
    pub max_ambient_level: f32,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            rssi_floor_dbm: -100.0,
            rssi_span_db: 70.0,
            motion_cap: 2.0,
            rotation_cap: 100.0,
            max_packet_rate: 10.0,
            max_ambient_level: 100.0,
        }
    }
}

/// Reconstruction network and its training schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub hidden_units: usize,
    pub bottleneck_units: usize,
    pub learning_rate: f32,
    pub batch_size: usize,
    /// Samples gathered before a self-training pass.
    pub queue_capacity: usize,
    pub train_epochs: usize,
    /// Epochs for operator corrections.
    pub force_epochs: usize,
    /// Only samples scoring below `plausibility_factor * limit` are queued.
    pub plausibility_factor: f32,
    pub seed: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            hidden_units: 16,
            bottleneck_units: 8,
            learning_rate: 0.005,
            batch_size: 32,
            queue_capacity: 40,
            train_epochs: 2,
            force_epochs: 12,
            plausibility_factor: 1.5,
            seed: 7,
        }
    }
}

/// Adaptive decision limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub history_capacity: usize,
    pub margin: f32,
    /// Added per unit of normalised motion.
    pub motion_gain: f32,
    /// Added per unit of normalised rotation.
    pub rotation_gain: f32,
    /// Added per unit of normalised ambient level.
    pub noise_gain: f32,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            history_capacity: 50,
            margin: 0.08,
            motion_gain: 0.2,
            rotation_gain: 0.1,
            noise_gain: 0.05,
        }
    }
}

/// Signal bands used by the risk classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Hard proximity override.
    pub near_dbm: f32,
    /// Anomalies above this are DANGER.
    pub mid_dbm: f32,
    /// Anomalies above this are WARN.
    pub far_dbm: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            near_dbm: -45.0,
            mid_dbm: -75.0,
            far_dbm: -85.0,
        }
    }
}

/// Link liveness monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    pub timeout_ms: Millis,
    pub check_interval_ms: Millis,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 3_500,
            check_interval_ms: 1_000,
        }
    }
}

/// Periodic schedules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub tick_interval_ms: Millis,
    /// Run self-training on a blocking worker instead of inside the tick.
    pub background_training: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 200,
            background_training: false,
        }
    }
}

impl FusionConfig {
    /// Length of every feature vector fed to the model.
    pub fn feature_dimension(&self) -> usize {
        self.tracking.window_size + CONTEXT_FEATURES
    }

    pub fn validate(&self) -> EngineResult<()> {
        fn require(condition: bool, message: &str) -> EngineResult<()> {
            if condition {
                Ok(())
            } else {
                Err(EngineError::InvalidConfig(message.to_string()))
            }
        }

        require(self.tracking.window_size > 0, "window_size must be positive")?;
        require(
            self.tracking.rate_window_ms > 0,
            "rate_window_ms must be positive",
        )?;
        require(
            self.tracking.reclaim_after_ms >= self.tracking.stale_after_ms,
            "reclaim_after_ms must not be shorter than stale_after_ms",
        )?;
        require(self.encoder.rssi_span_db > 0.0, "rssi_span_db must be positive")?;
        require(
            self.encoder.motion_cap > 0.0
                && self.encoder.rotation_cap > 0.0
                && self.encoder.max_packet_rate > 0.0
                && self.encoder.max_ambient_level > 0.0,
            "encoder caps must be positive",
        )?;
        require(
            self.model.hidden_units > 0 && self.model.bottleneck_units > 0,
            "layer widths must be positive",
        )?;
        require(
            self.model.learning_rate > 0.0,
            "learning_rate must be positive",
        )?;
        require(self.model.batch_size > 0, "batch_size must be positive")?;
        require(
            self.model.queue_capacity > 0,
            "queue_capacity must be positive",
        )?;
        require(
            self.model.train_epochs > 0 && self.model.force_epochs > 0,
            "epoch counts must be positive",
        )?;
        require(
            self.threshold.history_capacity > 0,
            "history_capacity must be positive",
        )?;
        require(
            self.threshold.motion_gain >= 0.0
                && self.threshold.rotation_gain >= 0.0
                && self.threshold.noise_gain >= 0.0,
            "context gains must not be negative",
        )?;
        require(
            self.classifier.near_dbm > self.classifier.mid_dbm
                && self.classifier.mid_dbm > self.classifier.far_dbm,
            "classifier bands must satisfy near > mid > far",
        )?;
        require(self.watchdog.timeout_ms > 0, "watchdog timeout must be positive")?;
        require(
            self.watchdog.check_interval_ms > 0 && self.schedule.tick_interval_ms > 0,
            "schedule intervals must be positive",
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate_and_yield_24_features() {
        let config = FusionConfig::default();
        config.validate().unwrap();
        assert_eq!(config.feature_dimension(), 24);
    }

    #[test]
    fn misordered_bands_are_rejected() {
        let mut config = FusionConfig::default();
        config.classifier.mid_dbm = -40.0;
        assert!(matches!(
            config.validate(),
            Err(EngineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn partial_json_keeps_section_defaults() {
        let config: FusionConfig =
            serde_json::from_str(r#"{"threshold": {"margin": 0.1}}"#).unwrap();
        assert_eq!(config.threshold.margin, 0.1);
        assert_eq!(config.threshold.history_capacity, 50);
        assert_eq!(config.tracking.window_size, 20);
    }
}
