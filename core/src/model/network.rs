//! Feed-forward reconstruction network.
//!
//! Architecture: N -> 16 -> 8 (bottleneck) -> 16 -> N, ReLU hidden layers and a
//! sigmoid output so reconstructions stay inside the normalised feature range.
//! Trained with Adam on mean squared reconstruction error.

use crate::config::ModelConfig;
use crate::math::{MatrixHelper, StatsHelper};
use ndarray::{Array, Array1, Array2, Axis, Dimension, Zip};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Relu,
    Sigmoid,
}

impl Activation {
    fn apply(self, z: Array2<f32>) -> Array2<f32> {
        match self {
            Activation::Relu => z.mapv_into(|v| v.max(0.0)),
            Activation::Sigmoid => z.mapv_into(|v| 1.0 / (1.0 + (-v).exp())),
        }
    }

    /// Derivative expressed through the activated output.
    fn derivative(self, output: &Array2<f32>) -> Array2<f32> {
        match self {
            Activation::Relu => output.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 }),
            Activation::Sigmoid => output.mapv(|v| v * (1.0 - v)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
}

impl Adam {
    fn new(learning_rate: f32) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
        }
    }

    fn update<D: Dimension>(
        &self,
        param: &mut Array<f32, D>,
        grad: &Array<f32, D>,
        first: &mut Array<f32, D>,
        second: &mut Array<f32, D>,
        step: i32,
    ) {
        let correction1 = 1.0 - self.beta1.powi(step);
        let correction2 = 1.0 - self.beta2.powi(step);
        Zip::from(param)
            .and(grad)
            .and(first)
            .and(second)
            .for_each(|p, &g, m, v| {
                *m = self.beta1 * *m + (1.0 - self.beta1) * g;
                *v = self.beta2 * *v + (1.0 - self.beta2) * g * g;
                let m_hat = *m / correction1;
                let v_hat = *v / correction2;
                *p -= self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon);
            });
    }
}

#[derive(Debug, Clone)]
struct Dense {
    weights: Array2<f32>,
    bias: Array1<f32>,
    activation: Activation,
    weight_moments: (Array2<f32>, Array2<f32>),
    bias_moments: (Array1<f32>, Array1<f32>),
}

impl Dense {
    fn new(inputs: usize, outputs: usize, activation: Activation, rng: &mut StdRng) -> Self {
        Self {
            weights: MatrixHelper::glorot_uniform(inputs, outputs, rng),
            bias: MatrixHelper::zeros(outputs),
            activation,
            weight_moments: (
                Array2::zeros((inputs, outputs)),
                Array2::zeros((inputs, outputs)),
            ),
            bias_moments: (MatrixHelper::zeros(outputs), MatrixHelper::zeros(outputs)),
        }
    }

    fn forward(&self, input: &Array2<f32>) -> Array2<f32> {
        let z = MatrixHelper::multiply(input.view(), self.weights.view()) + &self.bias;
        self.activation.apply(z)
    }

    fn apply_gradients(
        &mut self,
        grad_w: &Array2<f32>,
        grad_b: &Array1<f32>,
        optimizer: &Adam,
        step: i32,
    ) {
        let (m_w, v_w) = &mut self.weight_moments;
        optimizer.update(&mut self.weights, grad_w, m_w, v_w, step);
        let (m_b, v_b) = &mut self.bias_moments;
        optimizer.update(&mut self.bias, grad_b, m_b, v_b, step);
    }

    fn is_finite(&self) -> bool {
        self.weights
            .iter()
            .chain(self.bias.iter())
            .all(|v| v.is_finite())
    }
}

/// Symmetric autoencoder trained to reproduce its own input.
#[derive(Debug, Clone)]
pub struct Autoencoder {
    layers: Vec<Dense>,
    input_dim: usize,
    optimizer: Adam,
    step: i32,
    rng: StdRng,
}

impl Autoencoder {
    pub fn new(
        input_dim: usize,
        hidden_units: usize,
        bottleneck_units: usize,
        learning_rate: f32,
        seed: u64,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let shape = [
            (input_dim, hidden_units, Activation::Relu),
            (hidden_units, bottleneck_units, Activation::Relu),
            (bottleneck_units, hidden_units, Activation::Relu),
            (hidden_units, input_dim, Activation::Sigmoid),
        ];
        let layers = shape
            .iter()
            .map(|&(inputs, outputs, activation)| Dense::new(inputs, outputs, activation, &mut rng))
            .collect();

        Self {
            layers,
            input_dim,
            optimizer: Adam::new(learning_rate),
            step: 0,
            rng,
        }
    }

    pub fn from_config(config: &ModelConfig, input_dim: usize) -> Self {
        Self::new(
            input_dim,
            config.hidden_units,
            config.bottleneck_units,
            config.learning_rate,
            config.seed,
        )
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    fn forward_batch(&self, batch: &Array2<f32>) -> Vec<Array2<f32>> {
        let mut activations = Vec::with_capacity(self.layers.len() + 1);
        activations.push(batch.clone());
        for layer in &self.layers {
            let next = layer.forward(&activations[activations.len() - 1]);
            activations.push(next);
        }
        activations
    }

    pub fn reconstruct(&self, input: &[f32]) -> Vec<f32> {
        let batch = MatrixHelper::from_rows(&[input.to_vec()], self.input_dim);
        let output = self
            .layers
            .iter()
            .fold(batch, |activation, layer| layer.forward(&activation));
        output.row(0).to_vec()
    }

    /// Mean squared error between `input` and its reconstruction.
    pub fn reconstruction_error(&self, input: &[f32]) -> f32 {
        StatsHelper::mse(input, &self.reconstruct(input))
    }

    /// Mini-batch fit of the samples onto themselves; returns the last epoch's mean loss.
    pub fn fit(&mut self, samples: &[Vec<f32>], epochs: usize, batch_size: usize) -> f32 {
        let mut order: Vec<usize> = (0..samples.len()).collect();
        let mut epoch_loss = 0.0;

        for _ in 0..epochs {
            order.shuffle(&mut self.rng);
            let mut total = 0.0;
            let mut batches = 0usize;
            for chunk in order.chunks(batch_size.max(1)) {
                let rows: Vec<Vec<f32>> = chunk.iter().map(|&index| samples[index].clone()).collect();
                let batch = MatrixHelper::from_rows(&rows, self.input_dim);
                total += self.train_batch(&batch);
                batches += 1;
            }
            epoch_loss = total / batches.max(1) as f32;
        }

        epoch_loss
    }

    fn train_batch(&mut self, batch: &Array2<f32>) -> f32 {
        let activations = self.forward_batch(batch);
        let output = &activations[activations.len() - 1];
        let diff = output - batch;
        let count = diff.len() as f32;
        let loss = diff.mapv(|d| d * d).sum() / count;

        let output_layer = self.layers.len() - 1;
        let mut delta = diff.mapv(|d| 2.0 * d / count)
            * &self.layers[output_layer].activation.derivative(output);

        self.step += 1;
        for index in (0..self.layers.len()).rev() {
            let input = &activations[index];
            let grad_w = input.t().dot(&delta);
            let grad_b = delta.sum_axis(Axis(0));
            let upstream = if index > 0 {
                let back = delta.dot(&self.layers[index].weights.t());
                Some(back * &self.layers[index - 1].activation.derivative(input))
            } else {
                None
            };

            self.layers[index].apply_gradients(&grad_w, &grad_b, &self.optimizer, self.step);
            if let Some(next) = upstream {
                delta = next;
            }
        }

        loss
    }

    pub fn is_finite(&self) -> bool {
        self.layers.iter().all(Dense::is_finite)
    }
}
