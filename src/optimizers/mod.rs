//! Optimizer abstractions for parameter updates.
//!
//! An optimizer walks the caller's ordered layer list in reverse, invoking
//! each layer's backward pass to obtain the gradient for the preceding layer
//! and applying its update rule to every layer that exposes trainable
//! parameters. Accumulator state (momentum velocities, squared-gradient
//! statistics) lives in a dense arena parallel to the layer list, allocated
//! once by `pre_train_init`.

mod accumulator;
pub mod adam;
pub mod rmsprop;
pub mod sgd;

pub use adam::Adam;
pub use rmsprop::RmsProp;
pub use sgd::Sgd;

use ndarray::Array2;

use crate::error::ConfigError;
use crate::layers::Layer;

/// Core trait for optimizers driving one training step.
pub trait Optimizer {
    /// Allocate per-layer accumulator state by inspecting which layers in
    /// the ordered list expose trainable parameters. Must be called once
    /// before the first [`step`](Optimizer::step).
    fn pre_train_init(&mut self, layers: &[Box<dyn Layer>]);

    /// Run one backward-and-update pass.
    ///
    /// `loss_gradient` is the flat gradient of the loss with respect to the
    /// final layer's output; the final layer re-chunks it into its own
    /// output shape. Layers are processed in strict reverse order, each
    /// receiving the input gradient produced by its successor.
    fn step(&mut self, layers: &mut [Box<dyn Layer>], loss_gradient: &[f64]);
}

/// Wrap a flat loss gradient as the single-column matrix the last layer's
/// backward pass conforms to its own output shape.
pub(crate) fn loss_column(loss_gradient: &[f64]) -> Vec<Array2<f64>> {
    vec![
        Array2::from_shape_vec((loss_gradient.len(), 1), loss_gradient.to_vec())
            .expect("a flat vector always fits a single column"),
    ]
}

pub(crate) fn check_learning_rate(learning_rate: f64) -> Result<(), ConfigError> {
    if learning_rate <= 0.0 {
        return Err(ConfigError::OutOfRangeHyperparameter {
            what: "learning rate",
            value: learning_rate,
            expected: "> 0",
        });
    }
    Ok(())
}

pub(crate) fn check_momentum(momentum: f64) -> Result<(), ConfigError> {
    if !(0.0..1.0).contains(&momentum) {
        return Err(ConfigError::OutOfRangeHyperparameter {
            what: "momentum",
            value: momentum,
            expected: "[0, 1)",
        });
    }
    Ok(())
}

pub(crate) fn check_rho(rho: f64) -> Result<(), ConfigError> {
    if !(0.0..1.0).contains(&rho) {
        return Err(ConfigError::OutOfRangeHyperparameter {
            what: "rho",
            value: rho,
            expected: "[0, 1)",
        });
    }
    Ok(())
}

pub(crate) fn check_eps(eps: f64) -> Result<(), ConfigError> {
    if eps < 0.0 {
        return Err(ConfigError::OutOfRangeHyperparameter {
            what: "eps",
            value: eps,
            expected: ">= 0",
        });
    }
    Ok(())
}
