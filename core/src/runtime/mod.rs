pub mod fusion;
pub mod scheduler;
pub mod watchdog;

pub use fusion::FusionLoop;
pub use scheduler::{lock_engine, run_engine, shared, SharedEngine, SinkEvent};
pub use watchdog::Watchdog;
