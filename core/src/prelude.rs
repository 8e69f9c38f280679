use serde::{Deserialize, Serialize};
use std::time::Instant;

pub use crate::config::FusionConfig;
use crate::interface::{LinkEvent, TickReport};

/// Milliseconds on the engine clock.
pub type Millis = u64;

/// Ambient context sampled from the observing device once per fusion tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextSample {
    pub motion_intensity: f32,
    pub rotation_intensity: f32,
    pub ambient_level: f32,
}

impl ContextSample {
    pub fn new(motion_intensity: f32, rotation_intensity: f32, ambient_level: f32) -> Self {
        Self {
            motion_intensity,
            rotation_intensity,
            ambient_level,
        }
    }

    pub fn calm() -> Self {
        Self::default()
    }
}

/// Ordered risk levels; the aggregate of a tick is the maximum.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    #[default]
    Safe,
    Warn,
    Danger,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Safe => "SAFE",
            RiskLevel::Warn => "WARN",
            RiskLevel::Danger => "DANGER",
        }
    }
}

/// Reasons a training pass did not update the model.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TrainingError {
    #[error("training queue holds {queued} of {capacity} samples")]
    NotDue { queued: usize, capacity: usize },
    #[error("another training pass is in flight")]
    Busy,
    #[error("empty training batch")]
    EmptyBatch,
    #[error("batch contains non-finite values")]
    DegenerateBatch,
    #[error("training diverged, parameters left unchanged")]
    Diverged,
    #[error("expected {expected} features, found {found}")]
    DimensionMismatch { expected: usize, found: usize },
}

/// Common error type for engine operations.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("expected {expected} features, found {found}")]
    Dimension { expected: usize, found: usize },
    #[error("no flagged objects to correct")]
    NothingFlagged,
    #[error("training failure: {0}")]
    Training(#[from] TrainingError),
    #[error("internal failure: {0}")]
    Internal(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Supplies the ambient context for each fusion tick.
pub trait ContextSource: Send {
    fn current_context(&mut self) -> ContextSample;
}

impl<F> ContextSource for F
where
    F: FnMut() -> ContextSample + Send,
{
    fn current_context(&mut self) -> ContextSample {
        self()
    }
}

/// Receives the per-tick risk picture and link transitions.
pub trait RiskSink: Send {
    fn publish(&mut self, report: &TickReport);
    fn link_changed(&mut self, event: LinkEvent);

    /// The consumer is gone; the scheduler stops once this returns true.
    fn is_detached(&self) -> bool {
        false
    }
}

/// Time source for the live scheduler.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> Millis;
}

/// Milliseconds elapsed since construction.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> Millis {
        self.start.elapsed().as_millis() as Millis
    }
}
