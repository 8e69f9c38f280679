use crate::config::WatchdogConfig;
use crate::interface::{DisconnectReason, LinkEvent, LinkState};
use crate::prelude::Millis;
use crate::telemetry::LogManager;

/// Declares the link down when packets stop arriving.
///
/// Once down, only an explicit [`connect`](Watchdog::connect) restores the link;
/// late packets alone do not.
pub struct Watchdog {
    state: LinkState,
    last_packet_at: Millis,
    config: WatchdogConfig,
    logger: LogManager,
}

impl Watchdog {
    pub fn new(config: WatchdogConfig) -> Self {
        Self {
            state: LinkState::Disconnected,
            last_packet_at: 0,
            config,
            logger: LogManager::new("watchdog"),
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == LinkState::Connected
    }

    pub fn last_packet_at(&self) -> Millis {
        self.last_packet_at
    }

    pub fn on_packet(&mut self, now: Millis) {
        self.last_packet_at = self.last_packet_at.max(now);
    }

    pub fn connect(&mut self, now: Millis) -> Option<LinkEvent> {
        self.last_packet_at = now;
        if self.is_connected() {
            return None;
        }
        self.state = LinkState::Connected;
        self.logger.record("link connected");
        Some(LinkEvent::Connected)
    }

    /// Transport-reported link loss.
    pub fn disconnect(&mut self) -> Option<LinkEvent> {
        self.transition_down(DisconnectReason::Transport)
    }

    /// Periodic liveness check.
    pub fn check(&mut self, now: Millis) -> Option<LinkEvent> {
        if self.is_connected() && now.saturating_sub(self.last_packet_at) > self.config.timeout_ms
        {
            self.logger.warn(&format!(
                "no packet for {} ms, link lost",
                now.saturating_sub(self.last_packet_at)
            ));
            return self.transition_down(DisconnectReason::Timeout);
        }
        None
    }

    fn transition_down(&mut self, reason: DisconnectReason) -> Option<LinkEvent> {
        if !self.is_connected() {
            return None;
        }
        self.state = LinkState::Disconnected;
        Some(LinkEvent::Disconnected(reason))
    }
}
