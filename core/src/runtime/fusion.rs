//! Fixed-period fusion pass.
//!
//! Ingest only touches the registry and the watchdog; everything else runs in
//! [`FusionLoop::tick`], which leaves registry and model state fully updated
//! before returning.

use crate::config::FusionConfig;
use crate::interface::{BeaconReading, LinkEvent, ObjectRisk, TickReport};
use crate::model::{AnomalyModel, TrainReport};
use crate::prelude::{ContextSample, EngineError, EngineResult, Millis, RiskLevel, TrainingError};
use crate::processing::{
    Correction, FeatureEncoder, FeedbackTrainer, FlaggedAlarm, RiskClassifier, RiskInput,
    ThresholdController,
};
use crate::runtime::watchdog::Watchdog;
use crate::telemetry::{LogManager, MetricsRecorder};
use crate::tracking::ObjectRegistry;
use std::sync::Arc;

pub struct FusionLoop {
    config: FusionConfig,
    registry: ObjectRegistry,
    encoder: FeatureEncoder,
    model: Arc<AnomalyModel>,
    threshold: ThresholdController,
    classifier: RiskClassifier,
    feedback: FeedbackTrainer,
    watchdog: Watchdog,
    flagged: Vec<FlaggedAlarm>,
    metrics: Arc<MetricsRecorder>,
    logger: LogManager,
}

impl FusionLoop {
    pub fn new(config: FusionConfig) -> EngineResult<Self> {
        config.validate()?;
        let dimension = config.feature_dimension();
        Ok(Self {
            registry: ObjectRegistry::new(config.tracking.clone()),
            encoder: FeatureEncoder::new(config.encoder.clone(), config.tracking.window_size),
            model: Arc::new(AnomalyModel::new(config.model.clone(), dimension)),
            threshold: ThresholdController::new(config.threshold.clone()),
            classifier: RiskClassifier::new(config.classifier.clone()),
            feedback: FeedbackTrainer::new(),
            watchdog: Watchdog::new(config.watchdog.clone()),
            flagged: Vec::new(),
            metrics: Arc::new(MetricsRecorder::new()),
            logger: LogManager::new("fusion"),
            config,
        })
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    pub fn model(&self) -> Arc<AnomalyModel> {
        Arc::clone(&self.model)
    }

    pub fn metrics(&self) -> Arc<MetricsRecorder> {
        Arc::clone(&self.metrics)
    }

    pub fn watchdog(&self) -> &Watchdog {
        &self.watchdog
    }

    /// Alarm snapshot the next false-alarm report would act on.
    pub fn flagged(&self) -> &[FlaggedAlarm] {
        &self.flagged
    }

    /// Event-driven ingest of one decoded packet.
    pub fn ingest(&mut self, reading: &BeaconReading) {
        self.watchdog.on_packet(reading.received_at);
        self.registry.ingest(
            &reading.object_id,
            reading.rssi_dbm as f32,
            reading.received_at,
        );
        self.metrics.record_packet();
    }

    /// Explicit (re)connect from the transport. Per-object tracking starts fresh;
    /// learned state and the ignore list carry over.
    pub fn connect(&mut self, now: Millis) -> Option<LinkEvent> {
        let event = self.watchdog.connect(now);
        if event.is_some() {
            self.registry.reset_tracking();
            self.flagged.clear();
        }
        event
    }

    pub fn disconnect(&mut self) -> Option<LinkEvent> {
        let event = self.watchdog.disconnect();
        if event.is_some() {
            self.metrics.record_disconnect();
        }
        event
    }

    /// Watchdog schedule entry point.
    pub fn check_link(&mut self, now: Millis) -> Option<LinkEvent> {
        let event = self.watchdog.check(now);
        if event.is_some() {
            self.metrics.record_disconnect();
        }
        event
    }

    /// One fusion pass. Self-training runs inline unless the schedule offloads it.
    pub fn tick(&mut self, now: Millis, context: &ContextSample) -> TickReport {
        let mut report = self.evaluate(now, context);
        if report.training_due && !self.config.schedule.background_training {
            if let Err(err) = self.train_if_due() {
                self.logger.detail(&format!("inline training skipped: {}", err));
            }
            report.training_due = self.model.training_due();
        }
        report
    }

    /// Runs a self-training pass if one is due, recording the outcome.
    pub fn train_if_due(&self) -> Result<TrainReport, TrainingError> {
        let outcome = self.model.maybe_train();
        self.metrics.record_training(&outcome);
        outcome
    }

    /// Scores and classifies every active object without training.
    pub fn evaluate(&mut self, now: Millis, context: &ContextSample) -> TickReport {
        self.metrics.record_tick();
        if !self.watchdog.is_connected() {
            return TickReport::offline(now);
        }

        let mut report = TickReport {
            timestamp: now,
            link: self.watchdog.state(),
            ..Default::default()
        };

        for id in self.registry.active_ids(now) {
            match self.evaluate_object(&id, context) {
                Ok(risk) => {
                    report.per_object_risk.insert(id, risk);
                }
                Err(err) => self.logger.warn(&format!("{} left out of tick: {}", id, err)),
            }
        }

        report.active_object_count = report.per_object_risk.len();
        report.aggregate_risk = RiskClassifier::aggregate(
            report
                .per_object_risk
                .values()
                .filter(|risk| !risk.ignored)
                .map(|risk| risk.level),
        );
        report.strongest = report
            .per_object_risk
            .iter()
            .filter(|(_, risk)| !risk.ignored)
            .max_by(|(_, a), (_, b)| a.avg_signal.total_cmp(&b.avg_signal))
            .map(|(id, _)| id.clone());

        let danger = report.danger_ids();
        if !danger.is_empty() {
            self.flagged = danger
                .into_iter()
                .map(|id| FlaggedAlarm {
                    vector: self
                        .registry
                        .get(&id)
                        .and_then(|object| object.last_feature_vector())
                        .map(<[f32]>::to_vec),
                    id,
                })
                .collect();
        }

        self.registry.reclaim(now);
        report.training_due = self.model.training_due();
        self.logger.detail(&format!(
            "tick {}: {} active, aggregate {}",
            now,
            report.active_object_count,
            report.aggregate_risk.as_str()
        ));
        report
    }

    fn evaluate_object(&mut self, id: &str, context: &ContextSample) -> EngineResult<ObjectRisk> {
        let object = self
            .registry
            .get(id)
            .ok_or_else(|| EngineError::Internal(format!("{} vanished mid-tick", id)))?;

        let mut input = RiskInput {
            ignored: object.is_ignored(),
            buffering: object.is_buffering(),
            average_signal: object.average_signal(),
            latest_signal: object.latest_signal(),
            score: None,
            limit: None,
        };

        let mut evaluation = None;
        if !input.ignored && !input.buffering {
            let normalized = self.encoder.normalize_context(context, object.packet_rate());
            let vector = self
                .encoder
                .build(&object.signal_window(), &normalized)
                .ok_or_else(|| EngineError::Internal(format!("{} window not full", id)))?;
            let score = self.model.score(&vector)?;
            let limit = self.threshold.update(score, &normalized);
            self.model
                .enqueue_for_training(vector.clone(), score, limit);
            input.score = Some(score);
            input.limit = Some(limit);
            evaluation = Some((vector, score, limit));
        }

        let decision = self.classifier.decide(&input);
        if let Some(object) = self.registry.get_mut(id) {
            if let Some((vector, score, limit)) = evaluation {
                object.record_evaluation(vector, score, limit);
            }
            object.record_level(decision.level);
        }

        Ok(ObjectRisk {
            level: decision.level,
            score: input.score,
            limit: input.limit,
            avg_signal: input.average_signal,
            ignored: input.ignored,
            buffering: input.buffering,
        })
    }

    /// Operator "false alarm" entry point. Returns whether a correction was applied.
    pub fn report_false_alarm(&mut self) -> bool {
        let flagged = std::mem::take(&mut self.flagged);
        match self
            .feedback
            .report_false_alarm(&flagged, &mut self.registry, &self.model)
        {
            Ok(correction) => {
                self.record_correction(&correction);
                true
            }
            Err(EngineError::NothingFlagged) => false,
            Err(err) => {
                self.logger.warn(&format!("correction failed: {}", err));
                false
            }
        }
    }

    fn record_correction(&self, correction: &Correction) {
        self.metrics.record_correction();
        if let Some(outcome) = &correction.training {
            self.metrics.record_training(outcome);
        }
    }

    /// Level the object received in the most recent tick.
    pub fn level_of(&self, id: &str) -> Option<RiskLevel> {
        self.registry.get(id).map(|object| object.last_level())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::{DisconnectReason, LinkState};

    fn engine() -> FusionLoop {
        let mut engine = FusionLoop::new(FusionConfig::default()).unwrap();
        engine.connect(0);
        engine
    }

    fn feed(engine: &mut FusionLoop, id: &str, readings: &[i32], start: Millis, step: Millis) {
        for (index, &rssi) in readings.iter().enumerate() {
            engine.ingest(&BeaconReading::new(id, rssi, start + index as Millis * step));
        }
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = FusionConfig::default();
        config.tracking.window_size = 0;
        assert!(matches!(
            FusionLoop::new(config),
            Err(EngineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn buffering_objects_have_no_score_and_are_safe() {
        let mut engine = engine();
        feed(&mut engine, "near", &[-30; 19], 0, 50);
        let report = engine.tick(1_000, &ContextSample::calm());
        let risk = &report.per_object_risk["near"];
        assert!(risk.buffering);
        assert_eq!(risk.score, None);
        assert_eq!(risk.limit, None);
        assert_eq!(risk.level, RiskLevel::Safe);
        assert_eq!(report.aggregate_risk, RiskLevel::Safe);
    }

    #[test]
    fn near_spike_after_quiet_window_is_danger() {
        let mut engine = engine();
        feed(&mut engine, "A", &[-90; 20], 0, 100);
        let report = engine.tick(2_000, &ContextSample::calm());
        assert_eq!(report.level_of("A"), Some(RiskLevel::Safe));

        engine.ingest(&BeaconReading::new("A", -40, 2_100));
        let report = engine.tick(2_200, &ContextSample::calm());
        assert_eq!(report.level_of("A"), Some(RiskLevel::Danger));
        assert_eq!(report.aggregate_risk, RiskLevel::Danger);
    }

    #[test]
    fn steady_emitter_is_learned_as_normal() {
        let mut engine = engine();
        let noise = [0, 1, -2, 2, -1, 1, 0, -2, 2, -1];
        let readings: Vec<i32> = (0..20).map(|i| -70 + noise[i % noise.len()]).collect();
        feed(&mut engine, "B", &readings, 0, 100);

        let mut now = 2_000;
        let mut trained = false;
        for round in 0..60 {
            engine.ingest(&BeaconReading::new(
                "B",
                -70 + noise[round % noise.len()],
                now,
            ));
            let report = engine.tick(now, &ContextSample::calm());
            assert!(report.per_object_risk.contains_key("B"));
            now += 200;
            if engine.metrics().snapshot().training_passes > 0 {
                trained = true;
                break;
            }
        }
        assert!(trained, "self-training never fired");

        let report = engine.tick(now, &ContextSample::calm());
        let risk = &report.per_object_risk["B"];
        assert!(risk.score.unwrap() < risk.limit.unwrap());
        assert_eq!(risk.level, RiskLevel::Safe);
    }

    #[test]
    fn false_alarm_silences_flagged_object() {
        let mut engine = engine();
        feed(&mut engine, "C", &[-42; 20], 0, 100);
        let report = engine.tick(2_000, &ContextSample::calm());
        assert_eq!(report.level_of("C"), Some(RiskLevel::Danger));
        assert_eq!(engine.flagged().len(), 1);
        assert_eq!(engine.flagged()[0].id, "C");
        assert!(engine.flagged()[0].vector.is_some());

        assert!(engine.report_false_alarm());
        assert!(engine.flagged().is_empty());
        assert!(engine.registry().get("C").unwrap().is_ignored());

        let report = engine.tick(2_200, &ContextSample::calm());
        let risk = &report.per_object_risk["C"];
        assert_eq!(risk.level, RiskLevel::Safe);
        assert!(risk.ignored);
        assert_eq!(risk.avg_signal, -42.0);
        assert_eq!(report.aggregate_risk, RiskLevel::Safe);
        assert_eq!(engine.metrics().snapshot().corrections, 1);
    }

    #[test]
    fn false_alarm_after_the_alarm_cleared_still_retrains() {
        let mut engine = engine();
        feed(&mut engine, "C", &[-42; 20], 0, 100);
        let report = engine.tick(2_000, &ContextSample::calm());
        assert_eq!(report.level_of("C"), Some(RiskLevel::Danger));
        let alarm_vector = engine.flagged()[0].vector.clone().unwrap();

        feed(&mut engine, "C", &[-90; 20], 2_100, 100);
        let report = engine.tick(4_200, &ContextSample::calm());
        assert_eq!(report.level_of("C"), Some(RiskLevel::Safe));
        assert_eq!(engine.flagged()[0].id, "C");

        let before = engine.model().score(&alarm_vector).unwrap();
        assert!(engine.report_false_alarm());

        let metrics = engine.metrics().snapshot();
        assert_eq!(metrics.corrections, 1);
        assert_eq!(metrics.training_passes, 1);
        assert!(engine.registry().get("C").unwrap().is_ignored());
        assert!(engine.model().score(&alarm_vector).unwrap() < before);
    }

    #[test]
    fn false_alarm_without_flags_is_a_no_op() {
        let mut engine = engine();
        feed(&mut engine, "far", &[-95; 20], 0, 100);
        engine.tick(2_000, &ContextSample::calm());
        assert!(!engine.report_false_alarm());
        assert!(!engine.registry().get("far").unwrap().is_ignored());
    }

    #[test]
    fn lingering_near_object_is_silenced_unless_the_gatekeeper_is_off() {
        let mut gated = engine();
        let mut ungated = {
            let mut config = FusionConfig::default();
            config.tracking.auto_ignore_after = None;
            let mut engine = FusionLoop::new(config).unwrap();
            engine.connect(0);
            engine
        };
        for engine in [&mut gated, &mut ungated] {
            feed(engine, "person", &[-40; 21], 0, 100);
        }

        let report = gated.tick(2_100, &ContextSample::calm());
        assert!(report.per_object_risk["person"].ignored);
        assert_eq!(report.aggregate_risk, RiskLevel::Safe);

        let report = ungated.tick(2_100, &ContextSample::calm());
        assert_eq!(report.level_of("person"), Some(RiskLevel::Danger));
    }

    #[test]
    fn stale_objects_drop_out_of_the_tick() {
        let mut engine = engine();
        feed(&mut engine, "gone", &[-70; 5], 0, 100);
        feed(&mut engine, "here", &[-70; 5], 4_000, 100);
        engine.check_link(4_500);
        let report = engine.tick(6_000, &ContextSample::calm());
        assert!(!report.per_object_risk.contains_key("gone"));
        assert_eq!(report.active_object_count, 1);
        assert_eq!(report.strongest.as_deref(), Some("here"));
    }

    #[test]
    fn link_loss_suppresses_output_until_reconnect() {
        let mut engine = engine();
        feed(&mut engine, "A", &[-42; 20], 0, 100);
        assert_eq!(
            engine.check_link(5_500),
            Some(LinkEvent::Disconnected(DisconnectReason::Timeout))
        );
        assert_eq!(engine.check_link(6_500), None);

        engine.ingest(&BeaconReading::new("A", -42, 6_600));
        let report = engine.tick(6_700, &ContextSample::calm());
        assert_eq!(report.link, LinkState::Disconnected);
        assert_eq!(report.active_object_count, 0);
        assert_eq!(report.aggregate_risk, RiskLevel::Safe);

        assert_eq!(engine.connect(7_000), Some(LinkEvent::Connected));
        let report = engine.tick(7_100, &ContextSample::calm());
        assert_eq!(report.link, LinkState::Connected);
        assert_eq!(report.active_object_count, 0);
        assert_eq!(engine.metrics().snapshot().disconnects, 1);
    }

    #[test]
    fn busy_context_raises_the_limit() {
        let mut calm = engine();
        let mut busy = engine();
        for engine in [&mut calm, &mut busy] {
            feed(engine, "D", &[-80; 20], 0, 100);
        }
        let calm_report = calm.tick(2_000, &ContextSample::calm());
        let busy_report = busy.tick(2_000, &ContextSample::new(1.5, 80.0, 90.0));
        let calm_limit = calm_report.per_object_risk["D"].limit.unwrap();
        let busy_limit = busy_report.per_object_risk["D"].limit.unwrap();
        assert!(busy_limit > calm_limit);
    }
}
