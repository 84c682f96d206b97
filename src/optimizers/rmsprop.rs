//! RMSProp: squared-gradient scaling with bias correction.

use ndarray::Array2;

use crate::error::ConfigError;
use crate::layers::Layer;
use crate::optimizers::accumulator::{init_arena, sign_steps, Correction, ParameterStats};
use crate::optimizers::{check_eps, check_learning_rate, check_rho, loss_column, Optimizer};

/// RMSProp update: `w <- w − lr · g / sqrt(ŝ + eps)` where
/// `s <- rho·s + (1 − rho)·g²` and `ŝ = s / (1 − rhoᵗ)`.
///
/// With `rho = 0` the accumulator would equal `g²` at every step, so the
/// scaled gradient reduces to the elementwise sign of `g` (zero where the
/// gradient is zero) and no state is allocated.
pub struct RmsProp {
    learning_rate: f64,
    rho: f64,
    eps: f64,
    squared: Vec<Option<ParameterStats>>,
    correction: Correction,
}

impl RmsProp {
    /// # Errors
    ///
    /// Returns [`ConfigError::OutOfRangeHyperparameter`] unless
    /// `learning_rate > 0`, `rho` lies in `[0, 1)` and `eps >= 0`.
    pub fn new(learning_rate: f64, rho: f64, eps: f64) -> Result<Self, ConfigError> {
        check_learning_rate(learning_rate)?;
        check_rho(rho)?;
        check_eps(eps)?;
        Ok(Self {
            learning_rate,
            rho,
            eps,
            squared: Vec::new(),
            correction: Correction::new(rho),
        })
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }
}

impl Optimizer for RmsProp {
    fn pre_train_init(&mut self, layers: &[Box<dyn Layer>]) {
        if self.rho != 0.0 {
            self.squared = init_arena(layers);
        }
    }

    fn step(&mut self, layers: &mut [Box<dyn Layer>], loss_gradient: &[f64]) {
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
            let (weight_steps, bias_steps) = if self.rho == 0.0 {
                sign_steps(trainable.weight_gradients(), trainable.bias_gradients())
            } else {
                let stats = self.squared[idx]
                    .as_mut()
                    .expect("trainable layers have squared-gradient state");
                stats.accumulate_squared(
                    self.rho,
                    trainable.weight_gradients(),
                    trainable.bias_gradients(),
                );
                let factor = self.correction.factor();
                let eps = self.eps;
                let weights: Vec<Array2<f64>> = trainable
                    .weight_gradients()
                    .iter()
                    .zip(&stats.weights)
                    .map(|(grad, stat)| grad / &stat.mapv(|s| (s * factor + eps).sqrt()))
                    .collect();
                let biases: Vec<f64> = trainable
                    .bias_gradients()
                    .iter()
                    .zip(&stats.biases)
                    .map(|(grad, stat)| grad / (stat * factor + eps).sqrt())
                    .collect();
                (weights, biases)
            };
            trainable.apply_update(self.learning_rate, &weight_steps, &bias_steps);
        }
        if self.rho != 0.0 {
            self.correction.advance();
        }
    }
}
