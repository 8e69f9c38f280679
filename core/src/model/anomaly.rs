//! Online anomaly model.
//!
//! Scoring reads an `Arc` snapshot of the network; training clones the
//! snapshot, fits the clone and swaps it in under a short write lock. A score
//! therefore sees either the old or the new parameters, never a mix, and
//! inference is never blocked by a running pass.

use crate::config::ModelConfig;
use crate::math::StatsHelper;
use crate::model::network::Autoencoder;
use crate::prelude::{EngineError, EngineResult, TrainingError};
use crate::processing::BoundedBuffer;
use crate::telemetry::LogManager;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

/// Summary of a completed training pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainReport {
    pub samples: usize,
    pub epochs: usize,
    pub final_loss: f32,
}

/// Clears the training flag when a pass ends, however it ends.
struct TrainingGuard<'a>(&'a AtomicBool);

impl Drop for TrainingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct AnomalyModel {
    network: RwLock<Arc<Autoencoder>>,
    queue: Mutex<BoundedBuffer<Vec<f32>>>,
    deferred: Mutex<Vec<Vec<f32>>>,
    training: AtomicBool,
    config: ModelConfig,
    input_dim: usize,
    logger: LogManager,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl AnomalyModel {
    pub fn new(config: ModelConfig, input_dim: usize) -> Self {
        let network = Autoencoder::from_config(&config, input_dim);
        Self {
            network: RwLock::new(Arc::new(network)),
            queue: Mutex::new(BoundedBuffer::with_capacity(config.queue_capacity)),
            deferred: Mutex::new(Vec::new()),
            training: AtomicBool::new(false),
            config,
            input_dim,
            logger: LogManager::new("model"),
        }
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    /// Current parameters; stays valid while a newer snapshot is swapped in.
    pub fn snapshot(&self) -> Arc<Autoencoder> {
        match self.network.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Reconstruction error of `vector`. Read-only with respect to parameters.
    pub fn score(&self, vector: &[f32]) -> EngineResult<f32> {
        if vector.len() != self.input_dim {
            return Err(EngineError::Dimension {
                expected: self.input_dim,
                found: vector.len(),
            });
        }
        Ok(self.snapshot().reconstruction_error(vector))
    }

    /// Queues a plausibly normal sample for self-training.
    ///
    /// Only samples scoring below `plausibility_factor * limit` are kept so the
    /// model does not learn anomalies as normal.
    pub fn enqueue_for_training(&self, vector: Vec<f32>, score: f32, limit: f32) -> bool {
        let plausible = score.is_finite()
            && limit.is_finite()
            && score < self.config.plausibility_factor * limit;
        if plausible && vector.len() == self.input_dim {
            lock(&self.queue).push(vector);
            true
        } else {
            false
        }
    }

    pub fn queued(&self) -> usize {
        lock(&self.queue).len()
    }

    /// The queue is full and no pass is running.
    pub fn training_due(&self) -> bool {
        !self.is_training()
            && (lock(&self.queue).is_full() || !lock(&self.deferred).is_empty())
    }

    pub fn is_training(&self) -> bool {
        self.training.load(Ordering::Acquire)
    }

    fn begin_training(&self) -> Result<TrainingGuard<'_>, TrainingError> {
        self.training
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| TrainingGuard(&self.training))
            .map_err(|_| TrainingError::Busy)
    }

    /// Runs a short self-training pass once the queue is full.
    ///
    /// Corrections deferred while another pass was running are applied first.
    pub fn maybe_train(&self) -> Result<TrainReport, TrainingError> {
        let pending = !lock(&self.deferred).is_empty();
        let queued = self.queued();
        if !pending && queued < self.config.queue_capacity {
            return Err(TrainingError::NotDue {
                queued,
                capacity: self.config.queue_capacity,
            });
        }

        let _guard = self.begin_training()?;

        let corrections = std::mem::take(&mut *lock(&self.deferred));
        if !corrections.is_empty() {
            let outcome = self.fit(corrections, self.config.force_epochs);
            self.log_outcome("deferred correction", &outcome);
            if queued < self.config.queue_capacity {
                return outcome;
            }
        }

        let batch = lock(&self.queue).drain();
        let outcome = self.fit(batch, self.config.train_epochs);
        self.log_outcome("self-training", &outcome);
        outcome
    }

    /// Aggressive fit on operator-flagged vectors, bypassing the plausibility filter.
    ///
    /// If another pass is in flight the vectors are kept and applied by the next
    /// [`maybe_train`](Self::maybe_train) call.
    pub fn force_train(&self, vectors: Vec<Vec<f32>>) -> Result<TrainReport, TrainingError> {
        if vectors.is_empty() {
            return Err(TrainingError::EmptyBatch);
        }
        let guard = match self.begin_training() {
            Ok(guard) => guard,
            Err(err) => {
                lock(&self.deferred).extend(vectors);
                self.logger
                    .warn("training pass in flight, correction deferred");
                return Err(err);
            }
        };

        let outcome = self.fit(vectors, self.config.force_epochs);
        drop(guard);
        self.log_outcome("correction", &outcome);
        outcome
    }

    fn fit(&self, batch: Vec<Vec<f32>>, epochs: usize) -> Result<TrainReport, TrainingError> {
        if batch.is_empty() {
            return Err(TrainingError::EmptyBatch);
        }
        if let Some(bad) = batch.iter().find(|vector| vector.len() != self.input_dim) {
            return Err(TrainingError::DimensionMismatch {
                expected: self.input_dim,
                found: bad.len(),
            });
        }
        if !batch.iter().all(|vector| StatsHelper::all_finite(vector)) {
            return Err(TrainingError::DegenerateBatch);
        }

        let mut candidate = (*self.snapshot()).clone();
        let final_loss = candidate.fit(&batch, epochs, self.config.batch_size);
        if !final_loss.is_finite() || !candidate.is_finite() {
            return Err(TrainingError::Diverged);
        }

        match self.network.write() {
            Ok(mut guard) => *guard = Arc::new(candidate),
            Err(poisoned) => *poisoned.into_inner() = Arc::new(candidate),
        }

        Ok(TrainReport {
            samples: batch.len(),
            epochs,
            final_loss,
        })
    }

    fn log_outcome(&self, kind: &str, outcome: &Result<TrainReport, TrainingError>) {
        match outcome {
            Ok(report) => self.logger.record(&format!(
                "{} pass: {} samples, {} epochs, loss {:.5}",
                kind, report.samples, report.epochs, report.final_loss
            )),
            Err(err) => self.logger.warn(&format!("{} pass skipped: {}", kind, err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EncoderConfig, ThresholdConfig};
    use crate::prelude::ContextSample;
    use crate::processing::{FeatureEncoder, ThresholdController};
    use std::thread;

    fn background(level: f32) -> Vec<f32> {
        let mut vector = vec![level; 20];
        vector.extend([0.0; 4]);
        vector
    }

    fn model() -> AnomalyModel {
        AnomalyModel::new(ModelConfig::default(), 24)
    }

    #[test]
    fn score_rejects_wrong_dimension() {
        let model = model();
        assert!(matches!(
            model.score(&[0.5; 10]),
            Err(EngineError::Dimension {
                expected: 24,
                found: 10
            })
        ));
        assert!(model.score(&background(0.4)).unwrap() >= 0.0);
    }

    #[test]
    fn implausible_samples_are_not_queued() {
        let model = model();
        assert!(model.enqueue_for_training(background(0.4), 0.1, 0.1));
        assert!(!model.enqueue_for_training(background(0.4), 0.2, 0.1));
        assert!(!model.enqueue_for_training(background(0.4), f32::NAN, 0.1));
        assert_eq!(model.queued(), 1);
    }

    #[test]
    fn queue_never_exceeds_capacity() {
        let model = model();
        for _ in 0..100 {
            model.enqueue_for_training(background(0.4), 0.0, 1.0);
        }
        assert_eq!(model.queued(), 40);
    }

    #[test]
    fn maybe_train_waits_for_a_full_queue() {
        let model = model();
        for _ in 0..39 {
            model.enqueue_for_training(background(0.4), 0.0, 1.0);
        }
        assert!(!model.training_due());
        assert_eq!(
            model.maybe_train(),
            Err(TrainingError::NotDue {
                queued: 39,
                capacity: 40
            })
        );

        model.enqueue_for_training(background(0.4), 0.0, 1.0);
        assert!(model.training_due());
        let report = model.maybe_train().unwrap();
        assert_eq!(report.samples, 40);
        assert_eq!(report.epochs, 2);
        assert_eq!(model.queued(), 0);
        assert!(!model.is_training());
    }

    #[test]
    fn degenerate_batches_leave_parameters_untouched() {
        let model = model();
        let sample = background(0.4);
        let before = model.score(&sample).unwrap();

        let mut poisoned = background(0.4);
        poisoned[3] = f32::NAN;
        assert_eq!(
            model.force_train(vec![poisoned]),
            Err(TrainingError::DegenerateBatch)
        );
        assert_eq!(model.force_train(Vec::new()), Err(TrainingError::EmptyBatch));
        assert_eq!(model.score(&sample).unwrap(), before);
        assert!(!model.is_training());
    }

    #[test]
    fn only_one_pass_runs_at_a_time() {
        let model = model();
        let guard = model.begin_training().unwrap();
        assert!(model.is_training());
        assert_eq!(
            model.force_train(vec![background(0.4)]),
            Err(TrainingError::Busy)
        );
        drop(guard);

        assert!(model.training_due());
        let report = model.maybe_train().unwrap();
        assert_eq!(report.samples, 1);
        assert_eq!(report.epochs, 12);
    }

    #[test]
    fn stable_background_converges_through_self_training() {
        let encoder = FeatureEncoder::new(EncoderConfig::default(), 20);
        let mut threshold = ThresholdController::new(ThresholdConfig::default());
        let context = encoder.normalize_context(&ContextSample::calm(), 0.0);
        let sample = encoder.build(&[-70.0; 20], &context).unwrap();

        let model = model();
        let initial = model.score(&sample).unwrap();
        let mut passes = 0;
        for _ in 0..500 {
            while !model.training_due() {
                let score = model.score(&sample).unwrap();
                let limit = threshold.update(score, &context);
                assert!(model.enqueue_for_training(sample.clone(), score, limit));
            }
            model.maybe_train().unwrap();
            passes += 1;
        }

        let error = model.score(&sample).unwrap();
        assert_eq!(passes, 500);
        assert!(error < initial);
        assert!(error < 0.01, "error {error}");
    }

    #[test]
    fn scoring_keeps_working_during_training() {
        let model = Arc::new(model());
        let sample = background(0.4);
        let _guard = model.begin_training().unwrap();
        assert!(model.score(&sample).is_ok());
    }

    #[test]
    fn concurrent_scores_see_whole_snapshots() {
        let model = Arc::new(model());
        let sample = background(0.4);
        let before = model.score(&sample).unwrap();
        let done = Arc::new(AtomicBool::new(false));

        let scorer = {
            let model = Arc::clone(&model);
            let done = Arc::clone(&done);
            let sample = sample.clone();
            thread::spawn(move || {
                let mut scores = Vec::new();
                while !done.load(Ordering::Acquire) {
                    scores.push(model.score(&sample).unwrap());
                }
                scores.push(model.score(&sample).unwrap());
                scores
            })
        };

        let trainer = {
            let model = Arc::clone(&model);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let outcome = model.force_train(vec![background(0.7); 40]);
                done.store(true, Ordering::Release);
                outcome
            })
        };

        assert!(trainer.join().unwrap().is_ok());
        let scores = scorer.join().unwrap();
        let after = model.score(&sample).unwrap();

        assert_ne!(before, after);
        assert!(!scores.is_empty());
        assert!(scores
            .iter()
            .all(|&score| score.is_finite() && (score == before || score == after)));
        assert_eq!(*scores.last().unwrap(), after);
        assert!(!model.is_training());
    }
}
