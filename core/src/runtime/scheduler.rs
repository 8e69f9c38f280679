//! Live driver: a fast fusion tick and a 1 Hz watchdog check on tokio intervals.
//!
//! Ingest calls arrive independently through the shared engine handle. With
//! `background_training` enabled, due self-training passes run on the blocking
//! pool so the tick schedule never waits for them.

use crate::interface::{LinkEvent, TickReport};
use crate::prelude::{Clock, ContextSource, RiskSink};
use crate::runtime::FusionLoop;
use crate::telemetry::LogManager;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};

/// Engine handle shared between the transport, the bridge and the scheduler.
pub type SharedEngine = Arc<Mutex<FusionLoop>>;

pub fn shared(engine: FusionLoop) -> SharedEngine {
    Arc::new(Mutex::new(engine))
}

/// Locks the engine, recovering the state if a holder panicked.
pub fn lock_engine(engine: &SharedEngine) -> MutexGuard<'_, FusionLoop> {
    engine.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Sink events forwarded over a channel.
#[derive(Debug, Clone)]
pub enum SinkEvent {
    Tick(TickReport),
    Link(LinkEvent),
}

impl RiskSink for mpsc::UnboundedSender<SinkEvent> {
    fn publish(&mut self, report: &TickReport) {
        if self.send(SinkEvent::Tick(report.clone())).is_err() {
            LogManager::new("scheduler").detail("sink receiver dropped, tick discarded");
        }
    }

    fn link_changed(&mut self, event: LinkEvent) {
        if self.send(SinkEvent::Link(event)).is_err() {
            LogManager::new("scheduler").detail("sink receiver dropped, link event discarded");
        }
    }

    fn is_detached(&self) -> bool {
        self.is_closed()
    }
}

/// Runs both schedules until `shutdown` turns true, its sender is dropped or the
/// sink detaches.
pub async fn run_engine<C, S>(
    engine: SharedEngine,
    clock: Arc<dyn Clock>,
    mut context: C,
    mut sink: S,
    mut shutdown: watch::Receiver<bool>,
) where
    C: ContextSource,
    S: RiskSink,
{
    let logger = LogManager::new("scheduler");
    let (tick_ms, check_ms, background) = {
        let guard = lock_engine(&engine);
        let config = guard.config();
        (
            config.schedule.tick_interval_ms,
            config.watchdog.check_interval_ms,
            config.schedule.background_training,
        )
    };

    let mut tick = interval(Duration::from_millis(tick_ms));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut check = interval(Duration::from_millis(check_ms));
    check.set_missed_tick_behavior(MissedTickBehavior::Delay);

    logger.record(&format!(
        "running: tick {} ms, watchdog {} ms, background training {}",
        tick_ms, check_ms, background
    ));

    loop {
        tokio::select! {
            _ = tick.tick() => {
                let now = clock.now_ms();
                let sample = context.current_context();
                let (report, model, metrics) = {
                    let mut guard = lock_engine(&engine);
                    (guard.tick(now, &sample), guard.model(), guard.metrics())
                };
                sink.publish(&report);
                if sink.is_detached() {
                    logger.record("sink detached, stopping");
                    break;
                }

                if background && report.training_due && !model.is_training() {
                    tokio::task::spawn_blocking(move || {
                        let outcome = model.maybe_train();
                        metrics.record_training(&outcome);
                    });
                }
            }
            _ = check.tick() => {
                let now = clock.now_ms();
                let event = lock_engine(&engine).check_link(now);
                if let Some(event) = event {
                    sink.link_changed(event);
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    logger.record("stopped");
}
