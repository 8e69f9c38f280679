pub mod registry;

pub use registry::{ObjectRegistry, TrackedObject};
