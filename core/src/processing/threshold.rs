use crate::config::ThresholdConfig;
use crate::math::StatsHelper;
use crate::processing::{BoundedBuffer, NormalizedContext};

/// Moving baseline of recent reconstruction errors plus context tolerance.
///
/// The anomaly boundary is always relative: `mean(recent scores) + margin`,
/// raised in busy physical or acoustic surroundings where reconstruction error
/// is expected to run higher.
pub struct ThresholdController {
    history: BoundedBuffer<f32>,
    config: ThresholdConfig,
}

impl ThresholdController {
    pub fn new(config: ThresholdConfig) -> Self {
        Self {
            history: BoundedBuffer::with_capacity(config.history_capacity),
            config,
        }
    }

    /// Records a score and returns the decision limit for the given context.
    pub fn update(&mut self, score: f32, context: &NormalizedContext) -> f32 {
        if score.is_finite() {
            self.history.push(score);
        }
        self.limit_for(context)
    }

    pub fn base_threshold(&self) -> f32 {
        StatsHelper::mean(&self.history.to_vec()) + self.config.margin
    }

    /// Limit for the current history without recording anything.
    pub fn limit_for(&self, context: &NormalizedContext) -> f32 {
        self.base_threshold() + self.motion_tolerance(context) + self.noise_tolerance(context)
    }

    fn motion_tolerance(&self, context: &NormalizedContext) -> f32 {
        context.motion * self.config.motion_gain + context.rotation * self.config.rotation_gain
    }

    fn noise_tolerance(&self, context: &NormalizedContext) -> f32 {
        context.ambient * self.config.noise_gain
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}
