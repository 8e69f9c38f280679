use crate::prelude::TrainingError;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Engine counters shared between the tick path and background workers.
pub struct MetricsRecorder {
    inner: Mutex<MetricsSnapshot>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub ticks: usize,
    pub packets: usize,
    pub training_passes: usize,
    pub training_skipped: usize,
    pub corrections: usize,
    pub disconnects: usize,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MetricsSnapshot::default()),
        }
    }

    fn update(&self, apply: impl FnOnce(&mut MetricsSnapshot)) {
        if let Ok(mut metrics) = self.inner.lock() {
            apply(&mut metrics);
        }
    }

    pub fn record_tick(&self) {
        self.update(|m| m.ticks += 1);
    }

    pub fn record_packet(&self) {
        self.update(|m| m.packets += 1);
    }

    /// Counts completed passes; a pass that was merely not due is not a skip.
    pub fn record_training<T>(&self, outcome: &Result<T, TrainingError>) {
        match outcome {
            Ok(_) => self.update(|m| m.training_passes += 1),
            Err(TrainingError::NotDue { .. }) => {}
            Err(_) => self.update(|m| m.training_skipped += 1),
        }
    }

    pub fn record_correction(&self) {
        self.update(|m| m.corrections += 1);
    }

    pub fn record_disconnect(&self) {
        self.update(|m| m.disconnects += 1);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        if let Ok(metrics) = self.inner.lock() {
            *metrics
        } else {
            MetricsSnapshot::default()
        }
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn training_outcomes_are_classified() {
        let metrics = MetricsRecorder::new();
        metrics.record_training::<()>(&Ok(()));
        metrics.record_training::<()>(&Err(TrainingError::NotDue {
            queued: 3,
            capacity: 40,
        }));
        metrics.record_training::<()>(&Err(TrainingError::DegenerateBatch));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.training_passes, 1);
        assert_eq!(snapshot.training_skipped, 1);
    }
}
