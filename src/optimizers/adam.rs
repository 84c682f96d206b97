//! Adam: bias-corrected momentum combined with squared-gradient scaling.

use ndarray::Array2;

use crate::error::ConfigError;
use crate::layers::{Layer, TrainableLayer};
use crate::optimizers::accumulator::{init_arena, sign_steps, Correction, ParameterStats};
use crate::optimizers::{
    check_eps, check_learning_rate, check_momentum, check_rho, loss_column, Optimizer,
};

/// Adam update: `w <- w − lr · v̂ / (sqrt(ŝ) + eps)` with `v̂` and `ŝ` the
/// bias-corrected momentum and squared-gradient averages.
///
/// The zero-momentum and zero-rho branches are algebraic simplifications of
/// that formula rather than separate rules: with `momentum = 0` the
/// corrected velocity equals the raw gradient, with `rho = 0` the corrected
/// squared average equals `g²` so the denominator is `|g| + eps`, and with
/// both zero the update collapses to `sign(g)`.
pub struct Adam {
    learning_rate: f64,
    rho: f64,
    momentum: f64,
    eps: f64,
    velocities: Vec<Option<ParameterStats>>,
    squared: Vec<Option<ParameterStats>>,
    velocity_correction: Correction,
    squared_correction: Correction,
}

impl Adam {
    /// # Errors
    ///
    /// Returns [`ConfigError::OutOfRangeHyperparameter`] unless
    /// `learning_rate > 0`, `rho` and `momentum` lie in `[0, 1)` and
    /// `eps >= 0`.
    pub fn new(learning_rate: f64, rho: f64, momentum: f64, eps: f64) -> Result<Self, ConfigError> {
        check_learning_rate(learning_rate)?;
        check_rho(rho)?;
        check_momentum(momentum)?;
        check_eps(eps)?;
        Ok(Self {
            learning_rate,
            rho,
            momentum,
            eps,
            velocities: Vec::new(),
            squared: Vec::new(),
            velocity_correction: Correction::new(momentum),
            squared_correction: Correction::new(rho),
        })
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }
}

/// Corrected numerator terms: `v̂ = v / (1 − momentumᵗ)`.
fn corrected_velocity(stats: &ParameterStats, factor: f64) -> (Vec<Array2<f64>>, Vec<f64>) {
    (
        stats.weights.iter().map(|v| v * factor).collect(),
        stats.biases.iter().map(|v| v * factor).collect(),
    )
}

/// Divide numerator terms by `sqrt(ŝ) + eps`.
fn scale_by_root(
    numerator: (Vec<Array2<f64>>, Vec<f64>),
    stats: &ParameterStats,
    factor: f64,
    eps: f64,
) -> (Vec<Array2<f64>>, Vec<f64>) {
    let (num_weights, num_biases) = numerator;
    (
        num_weights
            .iter()
            .zip(&stats.weights)
            .map(|(num, stat)| num / &stat.mapv(|s| (s * factor).sqrt() + eps))
            .collect(),
        num_biases
            .iter()
            .zip(&stats.biases)
            .map(|(num, stat)| num / ((stat * factor).sqrt() + eps))
            .collect(),
    )
}

/// Divide numerator terms by `|g| + eps` (the rho-zero denominator).
fn scale_by_magnitude(
    numerator: (Vec<Array2<f64>>, Vec<f64>),
    trainable: &dyn TrainableLayer,
    eps: f64,
) -> (Vec<Array2<f64>>, Vec<f64>) {
    let (num_weights, num_biases) = numerator;
    (
        num_weights
            .iter()
            .zip(trainable.weight_gradients())
            .map(|(num, grad)| num / &grad.mapv(|g| g.abs() + eps))
            .collect(),
        num_biases
            .iter()
            .zip(trainable.bias_gradients())
            .map(|(num, grad)| num / (grad.abs() + eps))
            .collect(),
    )
}

impl Optimizer for Adam {
    fn pre_train_init(&mut self, layers: &[Box<dyn Layer>]) {
        if self.momentum != 0.0 {
            self.velocities = init_arena(layers);
        }
        if self.rho != 0.0 {
            self.squared = init_arena(layers);
        }
    }

    fn step(&mut self, layers: &mut [Box<dyn Layer>], loss_gradient: &[f64]) {
        if self.momentum != 0.0 {
            assert_eq!(
                self.velocities.len(),
                layers.len(),
                "pre_train_init must run against the same layer list before stepping"
            );
        }
        if self.rho != 0.0 {
            assert_eq!(
                self.squared.len(),
                layers.len(),
                "pre_train_init must run against the same layer list before stepping"
            );
        }

        let mut gradient = loss_column(loss_gradient);
        for idx in (0..layers.len()).rev() {
            gradient = layers[idx].backward(&gradient);
            let Some(trainable) = layers[idx].trainable_mut() else {
                continue;
            };

            let numerator = if self.momentum == 0.0 {
                (
                    trainable.weight_gradients().to_vec(),
                    trainable.bias_gradients().to_vec(),
                )
            } else {
                let velocity = self.velocities[idx]
                    .as_mut()
                    .expect("trainable layers have velocity state");
                velocity.accumulate(
                    self.momentum,
                    trainable.weight_gradients(),
                    trainable.bias_gradients(),
                );
                corrected_velocity(velocity, self.velocity_correction.factor())
            };

            let (weight_steps, bias_steps) = if self.rho == 0.0 {
                if self.momentum == 0.0 {
                    sign_steps(trainable.weight_gradients(), trainable.bias_gradients())
                } else {
                    scale_by_magnitude(numerator, &*trainable, self.eps)
                }
            } else {
                let stats = self.squared[idx]
                    .as_mut()
                    .expect("trainable layers have squared-gradient state");
                stats.accumulate_squared(
                    self.rho,
                    trainable.weight_gradients(),
                    trainable.bias_gradients(),
                );
                scale_by_root(numerator, stats, self.squared_correction.factor(), self.eps)
            };

            trainable.apply_update(self.learning_rate, &weight_steps, &bias_steps);
        }

        if self.momentum != 0.0 {
            self.velocity_correction.advance();
        }
        if self.rho != 0.0 {
            self.squared_correction.advance();
        }
    }
}
