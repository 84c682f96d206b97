//! Elementwise activation layers.
//!
//! Activations participate in the layer list like any other layer but own no
//! trainable parameters: they propagate gradients and are skipped by the
//! optimizers. The backward pass multiplies the incoming gradient by the
//! derivative evaluated at the cached pre-activation input.

use ndarray::Array2;

use crate::error::ConfigError;
use crate::layers::{conform_to, Layer};

fn map_channels(input: &[Array2<f64>], f: impl Fn(f64) -> f64) -> Vec<Array2<f64>> {
    input.iter().map(|m| m.mapv(&f)).collect()
}

fn scale_by_derivative(
    last_input: &[Array2<f64>],
    gradient: &[Array2<f64>],
    prime: impl Fn(f64) -> f64,
) -> Vec<Array2<f64>> {
    last_input
        .iter()
        .zip(gradient)
        .map(|(input, grads)| &input.mapv(&prime) * grads)
        .collect()
}

/// Per-call caches shared by every activation layer.
#[derive(Default)]
struct ActivationCache {
    last_input: Vec<Array2<f64>>,
    last_output: Vec<Array2<f64>>,
    last_input_gradient: Vec<Array2<f64>>,
}

impl ActivationCache {
    fn forward(
        &mut self,
        input: &[Array2<f64>],
        f: impl Fn(f64) -> f64,
    ) -> Vec<Array2<f64>> {
        self.last_input = input.to_vec();
        self.last_output = map_channels(input, f);
        self.last_output.clone()
    }

    fn backward(
        &mut self,
        output_gradient: &[Array2<f64>],
        prime: impl Fn(f64) -> f64,
    ) -> Vec<Array2<f64>> {
        let gradient = conform_to(output_gradient, &self.last_output);
        self.last_input_gradient = scale_by_derivative(&self.last_input, &gradient, prime);
        self.last_input_gradient.clone()
    }
}

/// Rectified linear unit: `max(0, v)`.
#[derive(Default)]
pub struct ReLU {
    cache: ActivationCache,
}

impl ReLU {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Layer for ReLU {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn forward(&mut self, input: &[Array2<f64>]) -> Vec<Array2<f64>> {
        self.cache.forward(input, |v| v.max(0.0))
    }

    fn backward(&mut self, output_gradient: &[Array2<f64>]) -> Vec<Array2<f64>> {
        self.cache
            .backward(output_gradient, |v| if v > 0.0 { 1.0 } else { 0.0 })
    }
}

/// Leaky rectified linear unit: `max(alpha * v, v)`.
pub struct LeakyReLU {
    alpha: f64,
    cache: ActivationCache,
}

impl LeakyReLU {
    /// # Errors
    ///
    /// Returns [`ConfigError::OutOfRangeHyperparameter`] unless
    /// `alpha` lies in `[0, 1]`.
    pub fn new(alpha: f64) -> Result<Self, ConfigError> {
        if !(0.0..=1.0).contains(&alpha) {
            return Err(ConfigError::OutOfRangeHyperparameter {
                what: "LeakyReLU alpha",
                value: alpha,
                expected: "[0, 1]",
            });
        }
        Ok(Self {
            alpha,
            cache: ActivationCache::default(),
        })
    }
}

impl Layer for LeakyReLU {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn forward(&mut self, input: &[Array2<f64>]) -> Vec<Array2<f64>> {
        let alpha = self.alpha;
        self.cache.forward(input, |v| v.max(alpha * v))
    }

    fn backward(&mut self, output_gradient: &[Array2<f64>]) -> Vec<Array2<f64>> {
        let alpha = self.alpha;
        self.cache
            .backward(output_gradient, |v| if v > 0.0 { 1.0 } else { alpha })
    }
}

/// Exponential linear unit: `v` for `v >= 0`, `alpha * (e^v - 1)` below.
pub struct Elu {
    alpha: f64,
    cache: ActivationCache,
}

impl Elu {
    /// # Errors
    ///
    /// Returns [`ConfigError::OutOfRangeHyperparameter`] unless `alpha` is
    /// positive.
    pub fn new(alpha: f64) -> Result<Self, ConfigError> {
        if alpha <= 0.0 {
            return Err(ConfigError::OutOfRangeHyperparameter {
                what: "ELU alpha",
                value: alpha,
                expected: "> 0",
            });
        }
        Ok(Self {
            alpha,
            cache: ActivationCache::default(),
        })
    }
}

impl Layer for Elu {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn forward(&mut self, input: &[Array2<f64>]) -> Vec<Array2<f64>> {
        let alpha = self.alpha;
        self.cache.forward(input, |v| {
            if v >= 0.0 {
                v
            } else {
                alpha * (v.exp() - 1.0)
            }
        })
    }

    fn backward(&mut self, output_gradient: &[Array2<f64>]) -> Vec<Array2<f64>> {
        let alpha = self.alpha;
        self.cache.backward(output_gradient, |v| {
            if v > 0.0 {
                1.0
            } else {
                alpha * v.exp()
            }
        })
    }
}

fn sigmoid(v: f64) -> f64 {
    1.0 / (1.0 + (-v).exp())
}

/// Logistic sigmoid.
#[derive(Default)]
pub struct Sigmoid {
    cache: ActivationCache,
}

impl Sigmoid {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Layer for Sigmoid {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn forward(&mut self, input: &[Array2<f64>]) -> Vec<Array2<f64>> {
        self.cache.forward(input, sigmoid)
    }

    fn backward(&mut self, output_gradient: &[Array2<f64>]) -> Vec<Array2<f64>> {
        self.cache
            .backward(output_gradient, |v| sigmoid(v) * (1.0 - sigmoid(v)))
    }
}

/// Hyperbolic tangent.
#[derive(Default)]
pub struct Tanh {
    cache: ActivationCache,
}

impl Tanh {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Layer for Tanh {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn forward(&mut self, input: &[Array2<f64>]) -> Vec<Array2<f64>> {
        self.cache.forward(input, f64::tanh)
    }

    fn backward(&mut self, output_gradient: &[Array2<f64>]) -> Vec<Array2<f64>> {
        self.cache
            .backward(output_gradient, |v| 1.0 - v.tanh().powi(2))
    }
}
