//! Per-layer gradient accumulators and bias correction.
//!
//! Every optimizer statistic (momentum velocity, squared-gradient average)
//! mirrors the shape of the parameters it tracks: one matrix per weight
//! matrix, one scalar per bias. Entries exist only for trainable layers; the
//! arena holds `None` for activations and pooling layers so lookups on the
//! hot path are plain indexing.

use log::debug;
use ndarray::Array2;

use crate::layers::{Layer, TrainableLayer};

/// Running statistic mirroring one layer's parameter shapes.
pub(crate) struct ParameterStats {
    pub weights: Vec<Array2<f64>>,
    pub biases: Vec<f64>,
}

impl ParameterStats {
    pub fn zeros_for(layer: &dyn TrainableLayer) -> Self {
        Self {
            weights: layer
                .weight_shapes()
                .into_iter()
                .map(Array2::zeros)
                .collect(),
            biases: vec![0.0; layer.bias_len()],
        }
    }

    /// Exponential moving average update: `s <- decay·s + (1 − decay)·g`.
    pub fn accumulate(&mut self, decay: f64, weight_grads: &[Array2<f64>], bias_grads: &[f64]) {
        let complement = 1.0 - decay;
        for (stat, grad) in self.weights.iter_mut().zip(weight_grads) {
            *stat = &*stat * decay + grad * complement;
        }
        for (stat, &grad) in self.biases.iter_mut().zip(bias_grads) {
            *stat = decay * *stat + complement * grad;
        }
    }

    /// Squared-gradient variant: `s <- decay·s + (1 − decay)·g²`.
    pub fn accumulate_squared(
        &mut self,
        decay: f64,
        weight_grads: &[Array2<f64>],
        bias_grads: &[f64],
    ) {
        let complement = 1.0 - decay;
        for (stat, grad) in self.weights.iter_mut().zip(weight_grads) {
            *stat = &*stat * decay + &(grad * grad) * complement;
        }
        for (stat, &grad) in self.biases.iter_mut().zip(bias_grads) {
            *stat = decay * *stat + complement * grad * grad;
        }
    }
}

/// Bias correction for a zero-initialized exponential moving average.
///
/// The factor `1 / (1 − decayᵗ)` undoes the pull toward zero over the first
/// steps; `decay_power` starts at `decay` and advances by one factor of
/// `decay` per optimizer step. One state exists per accumulated-statistic
/// family and is shared across all layers.
pub(crate) struct Correction {
    decay: f64,
    decay_power: f64,
}

impl Correction {
    pub fn new(decay: f64) -> Self {
        Self {
            decay,
            decay_power: decay,
        }
    }

    pub fn factor(&self) -> f64 {
        1.0 / (1.0 - self.decay_power)
    }

    pub fn advance(&mut self) {
        self.decay_power *= self.decay;
    }
}

/// Allocate the accumulator arena: one entry per layer, `None` for layers
/// without trainable parameters.
pub(crate) fn init_arena(layers: &[Box<dyn Layer>]) -> Vec<Option<ParameterStats>> {
    let arena: Vec<_> = layers
        .iter()
        .map(|layer| layer.trainable().map(ParameterStats::zeros_for))
        .collect();
    debug!(
        "accumulator arena: {} trainable of {} layers",
        arena.iter().filter(|entry| entry.is_some()).count(),
        arena.len()
    );
    arena
}

/// Elementwise sign of the gradients, zero where a gradient is zero.
pub(crate) fn sign_steps(
    weight_grads: &[Array2<f64>],
    bias_grads: &[f64],
) -> (Vec<Array2<f64>>, Vec<f64>) {
    let sign = |v: f64| {
        if v > 0.0 {
            1.0
        } else if v < 0.0 {
            -1.0
        } else {
            0.0
        }
    };
    (
        weight_grads.iter().map(|g| g.mapv(sign)).collect(),
        bias_grads.iter().map(|&g| sign(g)).collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_correction_factor_sequence() {
        let mut correction = Correction::new(0.9);
        assert!((correction.factor() - 10.0).abs() < 1e-12);
        correction.advance();
        assert!((correction.factor() - 1.0 / (1.0 - 0.81)).abs() < 1e-12);
        correction.advance();
        assert!((correction.factor() - 1.0 / (1.0 - 0.729)).abs() < 1e-9);
    }

    #[test]
    fn test_accumulate_moving_average() {
        let mut stats = ParameterStats {
            weights: vec![array![[0.0, 0.0]]],
            biases: vec![0.0],
        };
        stats.accumulate(0.9, &[array![[1.0, -2.0]]], &[2.0]);
        assert_eq!(stats.weights[0], array![[0.1, -0.2]]);
        assert!((stats.biases[0] - 0.2).abs() < 1e-12);

        stats.accumulate(0.9, &[array![[1.0, -2.0]]], &[2.0]);
        assert!((stats.weights[0][[0, 0]] - 0.19).abs() < 1e-12);
    }

    #[test]
    fn test_accumulate_squared_squares_gradients() {
        let mut stats = ParameterStats {
            weights: vec![array![[0.0]]],
            biases: vec![0.0],
        };
        stats.accumulate_squared(0.5, &[array![[-3.0]]], &[2.0]);
        assert!((stats.weights[0][[0, 0]] - 4.5).abs() < 1e-12);
        assert!((stats.biases[0] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_sign_steps_zero_at_zero() {
        let (weights, biases) = sign_steps(&[array![[3.0, -0.5], [0.0, 1.0]]], &[-2.0, 0.0]);
        assert_eq!(weights[0], array![[1.0, -1.0], [0.0, 1.0]]);
        assert_eq!(biases, vec![-1.0, 0.0]);
    }
}
