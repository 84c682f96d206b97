//! Sequential container for an ordered, heterogeneous layer list.

use log::trace;
use ndarray::Array2;

use crate::layers::Layer;
use crate::optimizers::Optimizer;

/// An ordered stack of layers. Data flows forward through the list in
/// order; the optimizer walks it in reverse during a training step.
///
/// # Example
///
/// ```ignore
/// use convnet::network::Sequential;
/// use convnet::optimizers::{Optimizer, Sgd};
///
/// let mut network = Sequential::new();
/// network.add(conv).add(ReLU::new()).add(dense);
///
/// let mut optimizer = Sgd::new(0.01, 0.9)?;
/// optimizer.pre_train_init(network.layers());
/// network.train_step(&mut optimizer, &input, &loss_gradient);
/// ```
#[derive(Default)]
pub struct Sequential {
    layers: Vec<Box<dyn Layer>>,
}

impl Sequential {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, layer: impl Layer + 'static) -> &mut Self {
        self.layers.push(Box::new(layer));
        self
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layers(&self) -> &[Box<dyn Layer>] {
        &self.layers
    }

    pub fn layers_mut(&mut self) -> &mut [Box<dyn Layer>] {
        &mut self.layers
    }

    /// Run one forward pass through every layer.
    pub fn forward(&mut self, input: &[Array2<f64>]) -> Vec<Array2<f64>> {
        let mut current = input.to_vec();
        for (idx, layer) in self.layers.iter_mut().enumerate() {
            current = layer.forward(&current);
            trace!("layer {idx}: {} output channels", current.len());
        }
        current
    }

    /// Flatten the current output of a forward pass row-major, channel by
    /// channel.
    pub fn flatten(output: &[Array2<f64>]) -> Vec<f64> {
        output.iter().flat_map(|m| m.iter().copied()).collect()
    }

    /// One training step: forward, then the optimizer's backward-and-update
    /// pass seeded with the given loss gradient.
    ///
    /// The optimizer must have been initialized against this network's layer
    /// list via [`Optimizer::pre_train_init`].
    pub fn train_step(
        &mut self,
        optimizer: &mut dyn Optimizer,
        input: &[Array2<f64>],
        loss_gradient: &[f64],
    ) -> Vec<Array2<f64>> {
        let output = self.forward(input);
        optimizer.step(&mut self.layers, loss_gradient);
        output
    }
}
