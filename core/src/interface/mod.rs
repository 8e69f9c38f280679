pub mod reading;
pub mod report;

pub use reading::{BeaconReading, DisconnectReason, LinkEvent, LinkState};
pub use report::{ObjectRisk, TickReport};
