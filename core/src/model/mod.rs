pub mod anomaly;
pub mod network;

pub use anomaly::{AnomalyModel, TrainReport};
pub use network::Autoencoder;
