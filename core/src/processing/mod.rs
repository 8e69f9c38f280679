pub mod bounded;
pub mod classifier;
pub mod encoder;
pub mod feedback;
pub mod threshold;

pub use bounded::BoundedBuffer;
pub use classifier::{Decision, RiskClassifier, RiskInput, RiskReason};
pub use encoder::{FeatureEncoder, NormalizedContext};
pub use feedback::{Correction, FeedbackTrainer, FlaggedAlarm};
pub use threshold::ThresholdController;
