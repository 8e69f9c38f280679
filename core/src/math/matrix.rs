use ndarray::{Array1, Array2, ArrayView2};
use rand::Rng;

pub struct MatrixHelper;

impl MatrixHelper {
    /// Multiply two 2D arrays (all f32 for simplicity).
    pub fn multiply(lhs: ArrayView2<f32>, rhs: ArrayView2<f32>) -> Array2<f32> {
        lhs.dot(&rhs)
    }

    /// Stacks equally sized rows into a batch matrix.
    pub fn from_rows(rows: &[Vec<f32>], width: usize) -> Array2<f32> {
        let mut batch = Array2::zeros((rows.len(), width));
        for (mut target, row) in batch.rows_mut().into_iter().zip(rows) {
            for (cell, &value) in target.iter_mut().zip(row) {
                *cell = value;
            }
        }
        batch
    }

    /// Glorot-uniform initialised `inputs x outputs` weight matrix.
    pub fn glorot_uniform<R: Rng>(inputs: usize, outputs: usize, rng: &mut R) -> Array2<f32> {
        let limit = (6.0 / (inputs + outputs) as f32).sqrt();
        Array2::from_shape_fn((inputs, outputs), |_| rng.gen_range(-limit..limit))
    }

    pub fn zeros(len: usize) -> Array1<f32> {
        Array1::zeros(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn multiply_matches_manual_product() {
        let lhs = array![[1.0f32, 2.0], [3.0, 4.0]];
        let rhs = array![[1.0f32], [1.0]];
        let product = MatrixHelper::multiply(lhs.view(), rhs.view());
        assert_eq!(product, array![[3.0f32], [7.0]]);
    }

    #[test]
    fn glorot_weights_stay_within_limit() {
        let mut rng = StdRng::seed_from_u64(1);
        let weights = MatrixHelper::glorot_uniform(24, 16, &mut rng);
        let limit = (6.0f32 / 40.0).sqrt();
        assert_eq!(weights.dim(), (24, 16));
        assert!(weights.iter().all(|w| w.abs() <= limit));
    }

    #[test]
    fn from_rows_builds_batch() {
        let batch = MatrixHelper::from_rows(&[vec![0.1, 0.2], vec![0.3, 0.4]], 2);
        assert_eq!(batch.dim(), (2, 2));
        assert_eq!(batch[[1, 0]], 0.3);
    }
}
