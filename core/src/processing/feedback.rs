use crate::math::StatsHelper;
use crate::model::{AnomalyModel, TrainReport};
use crate::prelude::{EngineError, EngineResult, TrainingError};
use crate::telemetry::LogManager;
use crate::tracking::ObjectRegistry;

/// An object that was DANGER in an alarm tick, with the feature vector it was scored on.
///
/// The vector is captured at alarm time; later ticks overwrite the object's own copy.
#[derive(Debug, Clone, PartialEq)]
pub struct FlaggedAlarm {
    pub id: String,
    pub vector: Option<Vec<f32>>,
}

/// Result of an operator correction.
#[derive(Debug, Clone, PartialEq)]
pub struct Correction {
    /// Objects ignore-listed by this correction.
    pub ignored: Vec<String>,
    /// Feature vectors handed to the model.
    pub vectors: usize,
    pub training: Option<Result<TrainReport, TrainingError>>,
}

/// Applies "false alarm" reports from the operator.
pub struct FeedbackTrainer {
    logger: LogManager,
}

impl FeedbackTrainer {
    pub fn new() -> Self {
        Self {
            logger: LogManager::new("feedback"),
        }
    }

    /// Teaches the model that the flagged situation is normal and silences its causes.
    pub fn report_false_alarm(
        &self,
        flagged: &[FlaggedAlarm],
        registry: &mut ObjectRegistry,
        model: &AnomalyModel,
    ) -> EngineResult<Correction> {
        if flagged.is_empty() {
            self.logger.record("false alarm reported with nothing flagged");
            return Err(EngineError::NothingFlagged);
        }

        let vectors: Vec<Vec<f32>> = flagged
            .iter()
            .filter_map(|alarm| alarm.vector.as_ref())
            .filter(|vector| StatsHelper::all_finite(vector))
            .cloned()
            .collect();

        let vector_count = vectors.len();
        let training = if vectors.is_empty() {
            None
        } else {
            Some(model.force_train(vectors))
        };

        let ignored: Vec<String> = flagged
            .iter()
            .filter(|alarm| registry.ignore(&alarm.id))
            .map(|alarm| alarm.id.clone())
            .collect();

        self.logger.record(&format!(
            "false alarm: trained on {} vectors, ignore-listed {:?}",
            vector_count, ignored
        ));

        Ok(Correction {
            ignored,
            vectors: vector_count,
            training,
        })
    }
}

impl Default for FeedbackTrainer {
    fn default() -> Self {
        Self::new()
    }
}
