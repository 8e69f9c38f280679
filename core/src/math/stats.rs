pub struct StatsHelper;

impl StatsHelper {
    pub fn mean(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        samples.iter().sum::<f32>() / samples.len() as f32
    }

    /// Mean squared difference over the shorter of the two slices.
    pub fn mse(lhs: &[f32], rhs: &[f32]) -> f32 {
        let len = lhs.len().min(rhs.len());
        if len == 0 {
            return 0.0;
        }
        let sum_sq: f32 = lhs
            .iter()
            .zip(rhs)
            .map(|(&a, &b)| (a - b) * (a - b))
            .sum();
        sum_sq / len as f32
    }

    /// Clamps into `[0, 1]`; NaN maps to 0.
    pub fn clamp_unit(value: f32) -> f32 {
        if value.is_nan() {
            0.0
        } else {
            value.clamp(0.0, 1.0)
        }
    }

    pub fn all_finite(samples: &[f32]) -> bool {
        samples.iter().all(|v| v.is_finite())
    }
}
