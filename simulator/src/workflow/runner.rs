use crate::generator::profile::{build_readings, ContextTrack};
use crate::workflow::config::WorkflowConfig;
use anyhow::{ensure, Context};
use beaconcore::interface::{BeaconReading, LinkEvent, TickReport};
use beaconcore::prelude::{ContextSource, Millis};
use beaconcore::telemetry::MetricsSnapshot;
use beaconcore::{FusionLoop, RiskLevel};
use serde::Serialize;

/// One sample of the aggregate risk timeline.
#[derive(Debug, Clone, Serialize)]
pub struct TimelinePoint {
    pub timestamp: Millis,
    pub aggregate: RiskLevel,
    pub active: usize,
    pub strongest: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowResult {
    pub ticks: usize,
    pub danger_ticks: usize,
    pub warn_ticks: usize,
    pub peak_risk: RiskLevel,
    pub corrections: usize,
    pub link_events: Vec<(Millis, LinkEvent)>,
    pub timeline: Vec<TimelinePoint>,
    pub final_report: TickReport,
    pub metrics: MetricsSnapshot,
}

/// Replays a scenario through the engine on a virtual clock.
#[derive(Clone)]
pub struct Runner {
    config: WorkflowConfig,
}

impl Runner {
    pub fn new(config: WorkflowConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Generates the configured scenario and runs it.
    pub fn run_scenario(&self) -> anyhow::Result<WorkflowResult> {
        let readings = build_readings(&self.config.scenario).context("generating scenario")?;
        self.execute(&readings)
    }

    /// Drives both schedules over `readings`, which must be ordered by arrival.
    pub fn execute(&self, readings: &[BeaconReading]) -> anyhow::Result<WorkflowResult> {
        ensure!(
            readings
                .windows(2)
                .all(|pair| pair[0].received_at <= pair[1].received_at),
            "readings must be ordered by arrival time"
        );

        let scenario = &self.config.scenario;
        let mut engine =
            FusionLoop::new(self.config.engine.clone()).context("building fusion engine")?;
        let tick_ms = self.config.engine.schedule.tick_interval_ms;
        let check_ms = self.config.engine.watchdog.check_interval_ms;
        ensure!(
            tick_ms > 0 && check_ms > 0,
            "schedule intervals must be positive"
        );

        let mut context = ContextTrack::new(scenario.context.clone(), scenario.seed);
        let mut pending_alarms: Vec<Millis> = scenario.false_alarm_at_ms.clone();
        pending_alarms.sort_unstable();
        pending_alarms.reverse();

        let mut link_events = Vec::new();
        if let Some(event) = engine.connect(0) {
            link_events.push((0, event));
        }

        let mut cursor = 0;
        let mut next_check = check_ms;
        let mut result_ticks = 0;
        let mut danger_ticks = 0;
        let mut warn_ticks = 0;
        let mut corrections = 0;
        let mut peak_risk = RiskLevel::Safe;
        let mut timeline = Vec::new();
        let mut final_report = TickReport::offline(0);

        let mut now = tick_ms;
        while now <= scenario.duration_ms {
            if let Some(outage) = &scenario.outage {
                if outage.reconnect && now >= outage.end_ms && !engine.watchdog().is_connected() {
                    if let Some(event) = engine.connect(now) {
                        link_events.push((now, event));
                    }
                }
            }

            while cursor < readings.len() && readings[cursor].received_at <= now {
                engine.ingest(&readings[cursor]);
                cursor += 1;
            }

            while next_check <= now {
                if let Some(event) = engine.check_link(next_check) {
                    link_events.push((next_check, event));
                }
                next_check += check_ms;
            }

            let report = engine.tick(now, &context.current_context());
            result_ticks += 1;
            match report.aggregate_risk {
                RiskLevel::Danger => danger_ticks += 1,
                RiskLevel::Warn => warn_ticks += 1,
                RiskLevel::Safe => {}
            }
            peak_risk = peak_risk.max(report.aggregate_risk);
            timeline.push(TimelinePoint {
                timestamp: now,
                aggregate: report.aggregate_risk,
                active: report.active_object_count,
                strongest: report.strongest.clone(),
            });
            final_report = report;

            while pending_alarms.last().map_or(false, |at| *at <= now) {
                pending_alarms.pop();
                if engine.report_false_alarm() {
                    corrections += 1;
                }
            }

            now += tick_ms;
        }

        Ok(WorkflowResult {
            ticks: result_ticks,
            danger_ticks,
            warn_ticks,
            peak_risk,
            corrections,
            link_events,
            timeline,
            final_report,
            metrics: engine.metrics().snapshot(),
        })
    }
}
