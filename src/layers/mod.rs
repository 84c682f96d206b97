//! Layer abstractions for convolutional networks.
//!
//! This module provides the [`Layer`] trait shared by every layer type, the
//! optional [`TrainableLayer`] capability for layers that own parameters,
//! and the layer implementations (Conv2D, pooling, dense, activations).
//!
//! Data flows through a network as a list of per-channel matrices. Layers
//! cache their last input/output so the backward pass can be derived from
//! the most recent forward call.

pub mod activation;
pub mod avgpool;
pub mod conv2d;
pub mod dense;
pub mod maxpool;

pub use activation::{Elu, LeakyReLU, ReLU, Sigmoid, Tanh};
pub use avgpool::AvgPool;
pub use conv2d::Conv2D;
pub use dense::Dense;
pub use maxpool::MaxPool;

use ndarray::Array2;

/// Core trait for network layers.
///
/// `forward` consumes the previous layer's output (one matrix per channel)
/// and produces this layer's output; `backward` consumes the gradient of the
/// loss with respect to this layer's output and returns the gradient with
/// respect to its input, for propagation to the preceding layer. Both are
/// stateful: they overwrite the layer's cached input/output/gradients on
/// every call.
pub trait Layer {
    fn forward(&mut self, input: &[Array2<f64>]) -> Vec<Array2<f64>>;

    fn backward(&mut self, output_gradient: &[Array2<f64>]) -> Vec<Array2<f64>>;

    /// Concrete-type escape hatch for callers that hold a layer behind the
    /// trait but need to inspect it (parameter readout after training).
    fn as_any(&self) -> &dyn std::any::Any;

    /// Capability query for layers exposing trainable parameters.
    ///
    /// Activations and pooling layers return `None`; they propagate
    /// gradients but never receive a parameter update.
    fn trainable(&self) -> Option<&dyn TrainableLayer> {
        None
    }

    fn trainable_mut(&mut self) -> Option<&mut dyn TrainableLayer> {
        None
    }
}

/// Capability exposed by layers with trainable parameters.
///
/// Parameter gradients are reported as a list of matrices (one per
/// (filter, channel) pair for convolution, a single weight matrix for dense)
/// plus a list of scalars (one bias per filter, or the dense bias vector).
/// Accumulator state in the optimizers mirrors exactly these shapes.
pub trait TrainableLayer {
    fn weight_gradients(&self) -> &[Array2<f64>];

    fn bias_gradients(&self) -> &[f64];

    /// Shapes of the weight-gradient matrices, for accumulator allocation.
    fn weight_shapes(&self) -> Vec<(usize, usize)>;

    /// Number of bias scalars, for accumulator allocation.
    fn bias_len(&self) -> usize;

    /// Subtract `learning_rate` times the given (already scaled) gradient
    /// steps from the layer's parameters.
    fn apply_update(
        &mut self,
        learning_rate: f64,
        weight_steps: &[Array2<f64>],
        bias_steps: &[f64],
    );
}

/// Re-chunk an incoming gradient into the shapes of `reference`.
///
/// Gradients cross layer boundaries either already shaped (channel matrices
/// from a convolution or pooling backward) or as a single flat column (the
/// loss gradient, or a dense layer's input gradient). Conforming against the
/// producing layer's cached output makes both cases uniform.
///
/// # Panics
///
/// Panics if the total element counts differ; a caller passing a gradient of
/// the wrong size is a programming error, not a recoverable condition.
pub(crate) fn conform_to(gradient: &[Array2<f64>], reference: &[Array2<f64>]) -> Vec<Array2<f64>> {
    let matches = gradient.len() == reference.len()
        && gradient
            .iter()
            .zip(reference)
            .all(|(g, r)| g.dim() == r.dim());
    if matches {
        return gradient.to_vec();
    }

    let flat: Vec<f64> = gradient.iter().flat_map(|m| m.iter().copied()).collect();
    let expected: usize = reference.iter().map(|m| m.len()).sum();
    assert_eq!(
        flat.len(),
        expected,
        "gradient has {} elements but the layer produced {}",
        flat.len(),
        expected
    );

    let mut offset = 0;
    reference
        .iter()
        .map(|m| {
            let (h, w) = m.dim();
            let chunk = flat[offset..offset + h * w].to_vec();
            offset += h * w;
            Array2::from_shape_vec((h, w), chunk).expect("chunk length matches the reference shape")
        })
        .collect()
}
