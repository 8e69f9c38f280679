use crate::generator::template::{ramp, sway};
use anyhow::{ensure, Context};
use beaconcore::interface::BeaconReading;
use beaconcore::prelude::ContextSource;
use beaconcore::ContextSample;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Weight kept from the previous context sample when smoothing raw readings.
const CONTEXT_SMOOTHING: f32 = 0.8;

/// Signal drift of one synthetic beacon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectProfile {
    pub id: String,
    pub base_rssi_dbm: f32,
    pub noise_db: f32,
    pub sway_db: f32,
    pub sway_period_ms: u64,
    /// First packet time; the beacon is silent before it.
    pub start_ms: u64,
    pub approach: Option<Approach>,
}

impl Default for ObjectProfile {
    fn default() -> Self {
        Self {
            id: "beacon".into(),
            base_rssi_dbm: -85.0,
            noise_db: 1.0,
            sway_db: 0.0,
            sway_period_ms: 6_000,
            start_ms: 0,
            approach: None,
        }
    }
}

/// Linear walk from the base level towards `target_rssi_dbm`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Approach {
    pub start_ms: u64,
    pub ramp_ms: u64,
    pub target_rssi_dbm: f32,
}

/// Motion and ambient conditions fed to each tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextProfile {
    pub motion: f32,
    pub rotation: f32,
    pub ambient: f32,
    pub jitter: f32,
}

impl Default for ContextProfile {
    fn default() -> Self {
        Self {
            motion: 0.1,
            rotation: 5.0,
            ambient: 30.0,
            jitter: 0.05,
        }
    }
}

/// Window in which the transport goes silent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outage {
    pub start_ms: u64,
    pub end_ms: u64,
    /// Re-establish the link once the outage ends.
    #[serde(default = "default_reconnect")]
    pub reconnect: bool,
}

fn default_reconnect() -> bool {
    true
}

impl Outage {
    pub fn covers(&self, time_ms: u64) -> bool {
        (self.start_ms..self.end_ms).contains(&time_ms)
    }
}

/// Synthetic yard scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub name: Option<String>,
    pub description: Option<String>,
    pub duration_ms: u64,
    pub packet_interval_ms: u64,
    pub seed: u64,
    pub objects: Vec<ObjectProfile>,
    pub context: ContextProfile,
    pub outage: Option<Outage>,
    /// Times at which the operator dismisses the current alarm.
    pub false_alarm_at_ms: Vec<u64>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            name: Some("yard".into()),
            description: Some("parked tag, passing forklift, approaching worker".into()),
            duration_ms: 40_000,
            packet_interval_ms: 100,
            seed: 7,
            objects: vec![
                ObjectProfile {
                    id: "dock-tag".into(),
                    base_rssi_dbm: -88.0,
                    noise_db: 1.0,
                    ..Default::default()
                },
                ObjectProfile {
                    id: "forklift-2".into(),
                    base_rssi_dbm: -78.0,
                    noise_db: 1.5,
                    sway_db: 3.0,
                    sway_period_ms: 8_000,
                    ..Default::default()
                },
                ObjectProfile {
                    id: "worker-17".into(),
                    base_rssi_dbm: -86.0,
                    noise_db: 1.0,
                    start_ms: 2_000,
                    approach: Some(Approach {
                        start_ms: 24_000,
                        ramp_ms: 6_000,
                        target_rssi_dbm: -52.0,
                    }),
                    ..Default::default()
                },
            ],
            context: ContextProfile::default(),
            outage: None,
            false_alarm_at_ms: Vec::new(),
        }
    }
}

impl ScenarioConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.packet_interval_ms > 0, "packet_interval_ms must be positive");
        ensure!(!self.objects.is_empty(), "scenario has no objects");
        if let Some(outage) = &self.outage {
            ensure!(
                outage.start_ms < outage.end_ms,
                "outage must end after it starts"
            );
        }
        Ok(())
    }
}

fn signal_at(profile: &ObjectProfile, time_ms: u64, rng: &mut StdRng) -> f32 {
    let mut level = profile.base_rssi_dbm + sway(time_ms, profile.sway_period_ms, profile.sway_db);
    if let Some(approach) = &profile.approach {
        let progress = ramp(time_ms, approach.start_ms, approach.ramp_ms);
        level += (approach.target_rssi_dbm - profile.base_rssi_dbm) * progress;
    }
    if profile.noise_db > 0.0 {
        level += rng.gen_range(-profile.noise_db..profile.noise_db);
    }
    level
}

/// Builds the time-ordered packet stream for a scenario.
pub fn build_readings(config: &ScenarioConfig) -> anyhow::Result<Vec<BeaconReading>> {
    config.validate().context("validating scenario")?;
    let mut rng = StdRng::seed_from_u64(config.seed);
    let steps = config.duration_ms / config.packet_interval_ms;
    let mut readings = Vec::with_capacity(steps as usize * config.objects.len());

    for step in 0..steps {
        let time_ms = step * config.packet_interval_ms;
        if config
            .outage
            .as_ref()
            .map_or(false, |outage| outage.covers(time_ms))
        {
            continue;
        }
        for profile in config.objects.iter().filter(|p| time_ms >= p.start_ms) {
            let rssi = signal_at(profile, time_ms, &mut rng).round().clamp(-127.0, 0.0);
            readings.push(BeaconReading::new(profile.id.clone(), rssi as i32, time_ms));
        }
    }

    Ok(readings)
}

/// Low-pass filtered context stream around the scenario's base conditions.
pub struct ContextTrack {
    profile: ContextProfile,
    current: ContextSample,
    rng: StdRng,
}

impl ContextTrack {
    pub fn new(profile: ContextProfile, seed: u64) -> Self {
        let current = ContextSample::new(profile.motion, profile.rotation, profile.ambient);
        Self {
            profile,
            current,
            rng: StdRng::seed_from_u64(seed.wrapping_add(1)),
        }
    }

    fn jittered(&mut self, base: f32) -> f32 {
        let spread = self.profile.jitter * base.abs().max(1.0);
        if spread > 0.0 {
            (base + self.rng.gen_range(-spread..spread)).max(0.0)
        } else {
            base
        }
    }

    pub fn next_sample(&mut self) -> ContextSample {
        let raw = ContextSample::new(
            self.jittered(self.profile.motion),
            self.jittered(self.profile.rotation),
            self.jittered(self.profile.ambient),
        );
        let blend = |previous: f32, fresh: f32| {
            CONTEXT_SMOOTHING * previous + (1.0 - CONTEXT_SMOOTHING) * fresh
        };
        self.current = ContextSample::new(
            blend(self.current.motion_intensity, raw.motion_intensity),
            blend(self.current.rotation_intensity, raw.rotation_intensity),
            blend(self.current.ambient_level, raw.ambient_level),
        );
        self.current
    }
}

impl ContextSource for ContextTrack {
    fn current_context(&mut self) -> ContextSample {
        self.next_sample()
    }
}
