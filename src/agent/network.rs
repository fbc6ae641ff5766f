// src/agent/network.rs
//
// Small fully-connected Q-network and its Adam optimizer.
// Three hidden ReLU layers and a linear head; trained with MSE toward
// per-sample targets. Parameters serialize with serde for snapshots.

use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Number of hidden layers.
const HIDDEN_LAYERS: usize = 3;

/// One fully-connected layer. Weights are `(in_dim, out_dim)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseLayer {
    pub w: Array2<f64>,
    pub b: Array1<f64>,
}

impl DenseLayer {
    /// Glorot-uniform initialization.
    fn glorot(rng: &mut ChaCha8Rng, in_dim: usize, out_dim: usize) -> Self {
        let limit = (6.0 / (in_dim + out_dim) as f64).sqrt();
        Self {
            w: Array2::from_shape_fn((in_dim, out_dim), |_| rng.gen_range(-limit..limit)),
            b: Array1::zeros(out_dim),
        }
    }
}

/// Multi-layer perceptron mapping observations to one value per action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QNetwork {
    layers: Vec<DenseLayer>,
}

impl QNetwork {
    pub fn new(input_dim: usize, output_dim: usize, hidden_dim: usize, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut layers = Vec::with_capacity(HIDDEN_LAYERS + 1);
        let mut in_dim = input_dim;
        for _ in 0..HIDDEN_LAYERS {
            layers.push(DenseLayer::glorot(&mut rng, in_dim, hidden_dim));
            in_dim = hidden_dim;
        }
        layers.push(DenseLayer::glorot(&mut rng, in_dim, output_dim));
        Self { layers }
    }

    pub fn input_dim(&self) -> usize {
        self.layers[0].w.nrows()
    }

    pub fn output_dim(&self) -> usize {
        self.layers[self.layers.len() - 1].w.ncols()
    }

    pub fn layers(&self) -> &[DenseLayer] {
        &self.layers
    }

    /// Predicted action values for a single observation.
    pub fn forward(&self, x: ArrayView1<f64>) -> Array1<f64> {
        let n = self.layers.len();
        let mut a = x.to_owned();
        for (i, layer) in self.layers.iter().enumerate() {
            let z = a.dot(&layer.w) + &layer.b;
            a = if i + 1 == n { z } else { z.mapv(|v| v.max(0.0)) };
        }
        a
    }

    /// Predicted action values for a batch (rows are observations).
    pub fn predict_batch(&self, x: &Array2<f64>) -> Array2<f64> {
        let n = self.layers.len();
        let mut a = x.clone();
        for (i, layer) in self.layers.iter().enumerate() {
            let z = a.dot(&layer.w) + &layer.b;
            a = if i + 1 == n { z } else { z.mapv(|v| v.max(0.0)) };
        }
        a
    }

    /// One gradient step toward `targets` under mean-squared error.
    ///
    /// Target rows that equal the current predictions contribute zero
    /// gradient, which is how the caller restricts learning to the
    /// acted-on action component per sample.
    pub fn train_batch(&mut self, states: &Array2<f64>, targets: &Array2<f64>, opt: &mut Adam) {
        let n = self.layers.len();

        // Forward pass, caching pre-activations and activations.
        let mut activations: Vec<Array2<f64>> = Vec::with_capacity(n + 1);
        let mut pre: Vec<Array2<f64>> = Vec::with_capacity(n);
        activations.push(states.clone());
        for (i, layer) in self.layers.iter().enumerate() {
            let z = activations[i].dot(&layer.w) + &layer.b;
            let a = if i + 1 == n {
                z.clone()
            } else {
                z.mapv(|v| v.max(0.0))
            };
            pre.push(z);
            activations.push(a);
        }

        // Backward pass. MSE averaged over batch and outputs.
        let batch = states.nrows() as f64;
        let out_dim = targets.ncols() as f64;
        let mut delta = (&activations[n] - targets) * (2.0 / (batch * out_dim));

        let mut grads: Vec<(Array2<f64>, Array1<f64>)> = self
            .layers
            .iter()
            .map(|l| (Array2::zeros(l.w.raw_dim()), Array1::zeros(l.b.raw_dim())))
            .collect();

        for i in (0..n).rev() {
            grads[i].0 = activations[i].t().dot(&delta);
            grads[i].1 = delta.sum_axis(Axis(0));
            if i > 0 {
                let da = delta.dot(&self.layers[i].w.t());
                let mask = pre[i - 1].mapv(|v| if v > 0.0 { 1.0 } else { 0.0 });
                delta = da * mask;
            }
        }

        opt.step(&mut self.layers, &grads);
    }
}

/// Adam optimizer; first/second moment estimates per parameter tensor.
#[derive(Debug, Clone)]
pub struct Adam {
    lr: f64,
    beta1: f64,
    beta2: f64,
    eps: f64,
    t: u64,
    m: Vec<(Array2<f64>, Array1<f64>)>,
    v: Vec<(Array2<f64>, Array1<f64>)>,
}

impl Adam {
    pub fn new(net: &QNetwork, lr: f64) -> Self {
        let zeros: Vec<(Array2<f64>, Array1<f64>)> = net
            .layers()
            .iter()
            .map(|l| (Array2::zeros(l.w.raw_dim()), Array1::zeros(l.b.raw_dim())))
            .collect();
        Self {
            lr,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            t: 0,
            m: zeros.clone(),
            v: zeros,
        }
    }

    pub fn step(&mut self, layers: &mut [DenseLayer], grads: &[(Array2<f64>, Array1<f64>)]) {
        self.t += 1;
        let (b1, b2, eps) = (self.beta1, self.beta2, self.eps);
        let lr_t = self.lr * (1.0 - b2.powi(self.t as i32)).sqrt() / (1.0 - b1.powi(self.t as i32));

        for i in 0..layers.len() {
            let (gw, gb) = &grads[i];
            let (mw, mb) = &mut self.m[i];
            let (vw, vb) = &mut self.v[i];

            mw.zip_mut_with(gw, |m, &g| *m = b1 * *m + (1.0 - b1) * g);
            vw.zip_mut_with(gw, |v, &g| *v = b2 * *v + (1.0 - b2) * g * g);
            mb.zip_mut_with(gb, |m, &g| *m = b1 * *m + (1.0 - b1) * g);
            vb.zip_mut_with(gb, |v, &g| *v = b2 * *v + (1.0 - b2) * g * g);

            let step_w = mw.mapv(|m| m * lr_t) / vw.mapv(|v| v.sqrt() + eps);
            let step_b = mb.mapv(|m| m * lr_t) / vb.mapv(|v| v.sqrt() + eps);
            layers[i].w -= &step_w;
            layers[i].b -= &step_b;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_forward_shapes() {
        let net = QNetwork::new(10, 4, 64, 7);
        assert_eq!(net.input_dim(), 10);
        assert_eq!(net.output_dim(), 4);

        let x = Array1::zeros(10);
        let q = net.forward(x.view());
        assert_eq!(q.len(), 4);

        let batch = Array2::zeros((5, 10));
        let qs = net.predict_batch(&batch);
        assert_eq!(qs.dim(), (5, 4));
    }

    #[test]
    fn test_batch_and_single_forward_agree() {
        let net = QNetwork::new(3, 2, 16, 11);
        let batch = array![[0.1, -0.4, 0.7], [1.0, 0.0, -1.0]];
        let qs = net.predict_batch(&batch);
        for (i, row) in batch.axis_iter(Axis(0)).enumerate() {
            let single = net.forward(row);
            for j in 0..2 {
                assert!((qs[[i, j]] - single[j]).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_same_seed_same_parameters() {
        let a = QNetwork::new(4, 2, 8, 5);
        let b = QNetwork::new(4, 2, 8, 5);
        assert_eq!(a.layers()[0].w, b.layers()[0].w);

        let c = QNetwork::new(4, 2, 8, 6);
        assert_ne!(a.layers()[0].w, c.layers()[0].w);
    }

    #[test]
    fn test_training_reduces_error_on_fixed_targets() {
        let mut net = QNetwork::new(2, 2, 16, 3);
        let mut opt = Adam::new(&net, 0.01);

        let states = array![[0.0, 1.0], [1.0, 0.0], [0.5, 0.5]];
        let targets = array![[1.0, -1.0], [-1.0, 1.0], [0.0, 0.0]];

        let mse = |net: &QNetwork| {
            let pred = net.predict_batch(&states);
            (&pred - &targets).mapv(|d| d * d).sum()
        };

        let before = mse(&net);
        for _ in 0..300 {
            net.train_batch(&states, &targets, &mut opt);
        }
        let after = mse(&net);
        assert!(
            after < before * 0.5,
            "training should reduce error: {before} -> {after}"
        );
    }

    #[test]
    fn test_matching_targets_leave_network_unchanged() {
        let mut net = QNetwork::new(2, 2, 8, 9);
        let mut opt = Adam::new(&net, 0.01);
        let states = array![[0.3, 0.6]];
        let targets = net.predict_batch(&states);

        let w_before = net.layers()[0].w.clone();
        net.train_batch(&states, &targets, &mut opt);
        let diff = (&net.layers()[0].w - &w_before)
            .mapv(f64::abs)
            .fold(0.0_f64, |a, b| a.max(*b));
        assert!(diff < 1e-12, "zero-residual batch must not move weights");
    }

    #[test]
    fn test_serde_roundtrip_preserves_predictions() {
        let net = QNetwork::new(4, 3, 8, 2);
        let json = serde_json::to_string(&net).unwrap();
        let restored: QNetwork = serde_json::from_str(&json).unwrap();

        let x = array![0.2, -0.1, 0.8, 0.0];
        assert_eq!(net.forward(x.view()), restored.forward(x.view()));
    }

    #[test]
    fn test_serde_roundtrip_is_bit_exact_after_training() {
        // Trained weights land on arbitrary f64 values; the JSON text
        // must parse back to the identical bit pattern, not just the
        // nearest within one ulp.
        let mut net = QNetwork::new(2, 2, 16, 3);
        let mut opt = Adam::new(&net, 0.01);
        let states = array![[0.0, 1.0], [1.0, 0.0], [0.5, 0.5]];
        let targets = array![[1.0, -1.0], [-1.0, 1.0], [0.0, 0.0]];
        for _ in 0..50 {
            net.train_batch(&states, &targets, &mut opt);
        }

        let json = serde_json::to_string(&net).unwrap();
        let restored: QNetwork = serde_json::from_str(&json).unwrap();
        for (a, b) in net.layers().iter().zip(restored.layers()) {
            for (x, y) in a.w.iter().zip(b.w.iter()) {
                assert_eq!(x.to_bits(), y.to_bits());
            }
            for (x, y) in a.b.iter().zip(b.b.iter()) {
                assert_eq!(x.to_bits(), y.to_bits());
            }
        }

        let probe = array![0.3, 0.7];
        assert_eq!(net.forward(probe.view()), restored.forward(probe.view()));
    }
}
