//! Stochastic gradient descent, optionally with momentum.

use crate::error::ConfigError;
use crate::layers::Layer;
use crate::optimizers::accumulator::{init_arena, ParameterStats};
use crate::optimizers::{check_learning_rate, check_momentum, loss_column, Optimizer};

/// SGD update: `w <- w − lr·g`, or `w <- w − lr·v` with the velocity
/// `v <- momentum·v + (1 − momentum)·g` when momentum is enabled.
///
/// With `momentum = 0` no velocity state is allocated and the raw gradient
/// is applied directly.
pub struct Sgd {
    learning_rate: f64,
    momentum: f64,
    velocities: Vec<Option<ParameterStats>>,
}

impl Sgd {
    /// # Errors
    ///
    /// Returns [`ConfigError::OutOfRangeHyperparameter`] unless
    /// `learning_rate > 0` and `momentum` lies in `[0, 1)`.
    pub fn new(learning_rate: f64, momentum: f64) -> Result<Self, ConfigError> {
        check_learning_rate(learning_rate)?;
        check_momentum(momentum)?;
        Ok(Self {
            learning_rate,
            momentum,
            velocities: Vec::new(),
        })
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }
}

impl Optimizer for Sgd {
    fn pre_train_init(&mut self, layers: &[Box<dyn Layer>]) {
        if self.momentum != 0.0 {
            self.velocities = init_arena(layers);
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
        let mut gradient = loss_column(loss_gradient);
        for idx in (0..layers.len()).rev() {
            gradient = layers[idx].backward(&gradient);
            let Some(trainable) = layers[idx].trainable_mut() else {
                continue;
            };
            if self.momentum == 0.0 {
                let weight_steps = trainable.weight_gradients().to_vec();
                let bias_steps = trainable.bias_gradients().to_vec();
                trainable.apply_update(self.learning_rate, &weight_steps, &bias_steps);
            } else {
                let velocity = self.velocities[idx]
                    .as_mut()
                    .expect("trainable layers have velocity state");
                velocity.accumulate(
                    self.momentum,
                    trainable.weight_gradients(),
                    trainable.bias_gradients(),
                );
                trainable.apply_update(self.learning_rate, &velocity.weights, &velocity.biases);
            }
        }
    }
}
