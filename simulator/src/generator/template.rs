use std::f32::consts::PI;

/// Slow sinusoidal drift of a beacon's signal, e.g. a swaying tag.
pub fn sway(time_ms: u64, period_ms: u64, amplitude_db: f32) -> f32 {
    if period_ms == 0 {
        return 0.0;
    }
    let phase = (time_ms % period_ms) as f32 / period_ms as f32;
    (phase * 2.0 * PI).sin() * amplitude_db
}

/// Linear progress in `[0, 1]` of a ramp starting at `start_ms`.
pub fn ramp(time_ms: u64, start_ms: u64, duration_ms: u64) -> f32 {
    if time_ms <= start_ms {
        return 0.0;
    }
    if duration_ms == 0 {
        return 1.0;
    }
    ((time_ms - start_ms) as f32 / duration_ms as f32).min(1.0)
}
