use log::{debug, info, warn};

/// Component-scoped wrapper over the `log` facade.
#[derive(Debug, Clone, Copy)]
pub struct LogManager {
    component: &'static str,
}

impl LogManager {
    pub fn new(component: &'static str) -> Self {
        Self { component }
    }

    /// State transitions worth keeping in the operator log.
    pub fn record(&self, message: &str) {
        info!("[{}] {}", self.component, message);
    }

    /// Per-tick detail.
    pub fn detail(&self, message: &str) {
        debug!("[{}] {}", self.component, message);
    }

    pub fn warn(&self, message: &str) {
        warn!("[{}] {}", self.component, message);
    }
}
