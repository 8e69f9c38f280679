pub mod bridge;
pub mod decoder;
pub mod model;
