//! Streaming fusion-and-anomaly core for the BeaconGuard proximity warning platform.
//!
//! Beacon readings flow through per-object tracking, feature encoding and an
//! online-trained reconstruction model; an adaptive limit and a fixed-precedence
//! classifier turn reconstruction error into a per-tick risk picture.

pub mod config;
pub mod interface;
pub mod math;
pub mod model;
pub mod prelude;
pub mod processing;
pub mod runtime;
pub mod telemetry;
pub mod tracking;

pub use config::FusionConfig;
pub use prelude::{ContextSample, EngineError, EngineResult, Millis, RiskLevel};
pub use runtime::FusionLoop;
