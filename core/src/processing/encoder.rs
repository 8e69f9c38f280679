use crate::config::{EncoderConfig, CONTEXT_FEATURES};
use crate::math::StatsHelper;
use crate::prelude::ContextSample;

/// Context features scaled into `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NormalizedContext {
    pub motion: f32,
    pub rotation: f32,
    pub packet_rate: f32,
    pub ambient: f32,
}

/// Turns a full signal window plus context into the model's input vector.
///
/// Out-of-range values are clamped, never rejected, so sensor glitches cannot
/// push the network outside its trained range.
#[derive(Debug, Clone)]
pub struct FeatureEncoder {
    config: EncoderConfig,
    window_size: usize,
}

impl FeatureEncoder {
    pub fn new(config: EncoderConfig, window_size: usize) -> Self {
        Self {
            config,
            window_size,
        }
    }

    pub fn dimension(&self) -> usize {
        self.window_size + CONTEXT_FEATURES
    }

    pub fn normalize_rssi(&self, rssi_dbm: f32) -> f32 {
        StatsHelper::clamp_unit((rssi_dbm - self.config.rssi_floor_dbm) / self.config.rssi_span_db)
    }

    pub fn normalize_context(&self, context: &ContextSample, packet_rate: f32) -> NormalizedContext {
        let config = &self.config;
        NormalizedContext {
            motion: StatsHelper::clamp_unit(context.motion_intensity / config.motion_cap),
            rotation: StatsHelper::clamp_unit(context.rotation_intensity / config.rotation_cap),
            packet_rate: StatsHelper::clamp_unit(packet_rate / config.max_packet_rate),
            ambient: StatsHelper::clamp_unit(context.ambient_level / config.max_ambient_level),
        }
    }

    /// Builds the feature vector, or `None` while the window is still buffering.
    pub fn build(&self, window: &[f32], context: &NormalizedContext) -> Option<Vec<f32>> {
        if window.len() != self.window_size {
            return None;
        }
        let mut vector = Vec::with_capacity(self.dimension());
        vector.extend(window.iter().map(|&rssi| self.normalize_rssi(rssi)));
        vector.extend([
            context.motion,
            context.rotation,
            context.packet_rate,
            context.ambient,
        ]);
        Some(vector)
    }
}
