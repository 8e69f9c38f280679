//! Per-object signal tracking.
//!
//! The registry is the sole owner of [`TrackedObject`] state. Other components
//! only borrow objects for the duration of a tick.

use crate::config::TrackingConfig;
use crate::math::StatsHelper;
use crate::prelude::{Millis, RiskLevel};
use crate::processing::BoundedBuffer;
use crate::telemetry::LogManager;
use std::collections::HashMap;

/// Signal history and latest evaluation for one observed object.
#[derive(Debug, Clone)]
pub struct TrackedObject {
    id: String,
    window: BoundedBuffer<f32>,
    average_signal: f32,
    last_seen_at: Millis,
    packet_rate: f32,
    rate_window_start: Millis,
    rate_count: u32,
    ignored: bool,
    near_streak: u32,
    last_feature_vector: Option<Vec<f32>>,
    last_score: Option<f32>,
    last_limit: Option<f32>,
    last_level: RiskLevel,
}

impl TrackedObject {
    fn new(id: &str, window_size: usize, now: Millis) -> Self {
        Self {
            id: id.to_string(),
            window: BoundedBuffer::with_capacity(window_size),
            average_signal: 0.0,
            last_seen_at: now,
            packet_rate: 0.0,
            rate_window_start: now,
            rate_count: 0,
            ignored: false,
            near_streak: 0,
            last_feature_vector: None,
            last_score: None,
            last_limit: None,
            last_level: RiskLevel::Safe,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Copy of the signal window, oldest first.
    pub fn signal_window(&self) -> Vec<f32> {
        self.window.to_vec()
    }

    pub fn sample_count(&self) -> usize {
        self.window.len()
    }

    /// Fewer than W samples seen; the model is not consulted yet.
    pub fn is_buffering(&self) -> bool {
        !self.window.is_full()
    }

    pub fn average_signal(&self) -> f32 {
        self.average_signal
    }

    pub fn latest_signal(&self) -> Option<f32> {
        self.window.last().copied()
    }

    pub fn last_seen_at(&self) -> Millis {
        self.last_seen_at
    }

    pub fn packet_rate(&self) -> f32 {
        self.packet_rate
    }

    pub fn is_ignored(&self) -> bool {
        self.ignored
    }

    pub fn last_feature_vector(&self) -> Option<&[f32]> {
        self.last_feature_vector.as_deref()
    }

    pub fn last_score(&self) -> Option<f32> {
        self.last_score
    }

    pub fn last_limit(&self) -> Option<f32> {
        self.last_limit
    }

    pub fn last_level(&self) -> RiskLevel {
        self.last_level
    }

    fn is_active(&self, now: Millis, stale_after_ms: Millis) -> bool {
        now.saturating_sub(self.last_seen_at) <= stale_after_ms
    }

    pub(crate) fn record_evaluation(&mut self, vector: Vec<f32>, score: f32, limit: f32) {
        self.last_feature_vector = Some(vector);
        self.last_score = Some(score);
        self.last_limit = Some(limit);
    }

    pub(crate) fn record_level(&mut self, level: RiskLevel) {
        self.last_level = level;
    }

    fn update_rate(&mut self, now: Millis, rate_window_ms: Millis) {
        let elapsed = now.saturating_sub(self.rate_window_start);
        if elapsed >= rate_window_ms {
            self.packet_rate = self.rate_count as f32 * 1000.0 / elapsed as f32;
            self.rate_window_start = now;
            self.rate_count = 0;
        }
        self.rate_count += 1;
    }
}

/// Owns one [`TrackedObject`] per observed id.
pub struct ObjectRegistry {
    objects: HashMap<String, TrackedObject>,
    config: TrackingConfig,
    logger: LogManager,
}

impl ObjectRegistry {
    pub fn new(config: TrackingConfig) -> Self {
        Self {
            objects: HashMap::new(),
            config,
            logger: LogManager::new("registry"),
        }
    }

    /// Records one reading, creating the object on first sight.
    pub fn ingest(&mut self, id: &str, rssi: f32, now: Millis) {
        let window_size = self.config.window_size;
        let object = self
            .objects
            .entry(id.to_string())
            .or_insert_with(|| TrackedObject::new(id, window_size, now));

        object.window.push(rssi);
        object.average_signal = StatsHelper::mean(&object.window.to_vec());
        object.update_rate(now, self.config.rate_window_ms);
        object.last_seen_at = object.last_seen_at.max(now);

        if let Some(limit) = self.config.auto_ignore_after {
            if rssi > self.config.auto_ignore_dbm {
                object.near_streak += 1;
            } else {
                object.near_streak = object.near_streak.saturating_sub(1);
            }
            if !object.ignored && object.near_streak > limit {
                object.ignored = true;
                self.logger.warn(&format!(
                    "{} held {:.0} dBm for {} packets, auto-ignored as the operator's device",
                    id, rssi, object.near_streak
                ));
            }
        }
    }

    /// Objects seen within the staleness timeout, in arbitrary order.
    pub fn active_objects(&self, now: Millis) -> impl Iterator<Item = &TrackedObject> + '_ {
        let stale_after_ms = self.config.stale_after_ms;
        self.objects
            .values()
            .filter(move |object| object.is_active(now, stale_after_ms))
    }

    pub fn active_ids(&self, now: Millis) -> Vec<String> {
        self.active_objects(now)
            .map(|object| object.id.clone())
            .collect()
    }

    /// Ignore-lists a known object. Returns `false` for an unknown id.
    pub fn ignore(&mut self, id: &str) -> bool {
        match self.objects.get_mut(id) {
            Some(object) => {
                if !object.ignored {
                    object.ignored = true;
                    self.logger.record(&format!("{} ignore-listed", id));
                }
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &str) -> Option<&TrackedObject> {
        self.objects.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut TrackedObject> {
        self.objects.get_mut(id)
    }

    /// Drops objects stale beyond the reclaim horizon. Ignore-listed objects are kept
    /// so their flag survives a reappearance.
    pub fn reclaim(&mut self, now: Millis) -> usize {
        let horizon = self.config.reclaim_after_ms;
        let before = self.objects.len();
        self.objects
            .retain(|_, object| object.ignored || object.is_active(now, horizon));
        let reclaimed = before - self.objects.len();
        if reclaimed > 0 {
            self.logger
                .detail(&format!("reclaimed {} stale objects", reclaimed));
        }
        reclaimed
    }

    /// Forgets signal history after a link loss while keeping the ignore list.
    pub fn reset_tracking(&mut self) {
        let window_size = self.config.window_size;
        self.objects.retain(|_, object| object.ignored);
        for object in self.objects.values_mut() {
            let ignored = TrackedObject {
                ignored: true,
                ..TrackedObject::new(&object.id, window_size, object.last_seen_at)
            };
            *object = ignored;
        }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ObjectRegistry {
        ObjectRegistry::new(TrackingConfig::default())
    }

    #[test]
    fn window_is_bounded_fifo() {
        let mut registry = registry();
        for step in 0..25 {
            registry.ingest("a", -100.0 + step as f32, step * 100);
        }
        let object = registry.get("a").unwrap();
        assert_eq!(object.sample_count(), 20);
        assert_eq!(object.signal_window()[0], -95.0);
        assert_eq!(object.latest_signal(), Some(-76.0));
        assert!(!object.is_buffering());
    }

    #[test]
    fn average_follows_window() {
        let mut registry = registry();
        registry.ingest("a", -80.0, 0);
        registry.ingest("a", -60.0, 10);
        assert_eq!(registry.get("a").unwrap().average_signal(), -70.0);
    }

    #[test]
    fn stale_objects_leave_the_active_set() {
        let mut registry = registry();
        registry.ingest("old", -70.0, 0);
        registry.ingest("new", -70.0, 4_000);

        let mut active = registry.active_ids(5_000);
        active.sort();
        assert_eq!(active, vec!["new".to_string(), "old".to_string()]);
        assert_eq!(registry.active_ids(5_001), vec!["new".to_string()]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn ignore_is_idempotent() {
        let mut registry = registry();
        registry.ingest("a", -70.0, 0);
        assert!(registry.ignore("a"));
        let once = registry.get("a").unwrap().is_ignored();
        assert!(registry.ignore("a"));
        assert_eq!(registry.get("a").unwrap().is_ignored(), once);
        assert!(once);
        assert!(!registry.ignore("unknown"));
    }

    #[test]
    fn packet_rate_rolls_over_each_second() {
        let mut registry = registry();
        for step in 0..10 {
            registry.ingest("a", -70.0, step * 100);
        }
        assert_eq!(registry.get("a").unwrap().packet_rate(), 0.0);
        registry.ingest("a", -70.0, 1_000);
        assert!((registry.get("a").unwrap().packet_rate() - 10.0).abs() < 1e-4);
    }

    #[test]
    fn gatekeeper_ignores_persistent_near_emitter() {
        let mut registry = registry();
        for step in 0..21 {
            registry.ingest("phone", -30.0, step * 50);
        }
        assert!(registry.get("phone").unwrap().is_ignored());

        registry.ingest("tag", -30.0, 0);
        registry.ingest("tag", -80.0, 10);
        assert!(!registry.get("tag").unwrap().is_ignored());
    }

    #[test]
    fn gatekeeper_can_be_disabled() {
        let mut registry = ObjectRegistry::new(TrackingConfig {
            auto_ignore_after: None,
            ..TrackingConfig::default()
        });
        for step in 0..50 {
            registry.ingest("phone", -30.0, step * 50);
        }
        assert!(!registry.get("phone").unwrap().is_ignored());
    }

    #[test]
    fn reclaim_keeps_ignored_objects() {
        let mut registry = registry();
        registry.ingest("gone", -70.0, 0);
        registry.ingest("muted", -70.0, 0);
        registry.ignore("muted");
        registry.ingest("here", -70.0, 40_000);

        assert_eq!(registry.reclaim(40_000), 1);
        assert!(registry.get("gone").is_none());
        assert!(registry.get("muted").is_some());
    }

    #[test]
    fn reset_tracking_preserves_ignore_list() {
        let mut registry = registry();
        for step in 0..20 {
            registry.ingest("muted", -70.0, step);
            registry.ingest("other", -70.0, step);
        }
        registry.ignore("muted");
        registry.reset_tracking();

        assert!(registry.get("other").is_none());
        let muted = registry.get("muted").unwrap();
        assert!(muted.is_ignored());
        assert_eq!(muted.sample_count(), 0);
    }
}
