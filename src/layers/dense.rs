//! Dense (fully connected) layer.
//!
//! A plain matrix-vector product over the flattened input channels:
//! `y = W·x + b`. Dense layers sit at the head of a network after the
//! convolutional stack; their input gradient flows back as a single flat
//! column that the preceding layer re-chunks into channel matrices.

use ndarray::{Array1, Array2};
use rand::Rng;

use crate::error::ConfigError;
use crate::layers::{conform_to, Layer, TrainableLayer};

pub struct Dense {
    inputs: usize,
    outputs: usize,
    weights: Array2<f64>,
    bias: Vec<f64>,

    last_flat_input: Array1<f64>,
    last_output: Vec<Array2<f64>>,
    last_output_gradient: Vec<Array2<f64>>,
    last_input_gradient: Vec<Array2<f64>>,
    weight_gradient: Vec<Array2<f64>>,
    bias_gradient: Vec<f64>,
}

impl Dense {
    pub fn new(inputs: usize, outputs: usize) -> Result<Self, ConfigError> {
        if inputs < 1 {
            return Err(ConfigError::NonPositiveCount {
                what: "number of input features",
            });
        }
        if outputs < 1 {
            return Err(ConfigError::NonPositiveCount {
                what: "number of output features",
            });
        }
        Ok(Self {
            inputs,
            outputs,
            weights: Array2::zeros((outputs, inputs)),
            bias: vec![0.0; outputs],
            last_flat_input: Array1::zeros(0),
            last_output: Vec::new(),
            last_output_gradient: Vec::new(),
            last_input_gradient: Vec::new(),
            weight_gradient: Vec::new(),
            bias_gradient: Vec::new(),
        })
    }

    /// Load the weight matrix from a flat row-major array
    /// (`outputs × inputs`).
    pub fn load_weights(&mut self, source: &[f64]) -> Result<(), ConfigError> {
        let expected = self.outputs * self.inputs;
        if source.len() != expected {
            return Err(ConfigError::ShapeMismatch {
                what: "dense weight load",
                expected,
                got: source.len(),
            });
        }
        self.weights = Array2::from_shape_vec((self.outputs, self.inputs), source.to_vec())
            .expect("length checked above");
        Ok(())
    }

    pub fn load_bias(&mut self, source: &[f64]) -> Result<(), ConfigError> {
        if source.len() != self.outputs {
            return Err(ConfigError::ShapeMismatch {
                what: "dense bias load",
                expected: self.outputs,
                got: source.len(),
            });
        }
        self.bias = source.to_vec();
        Ok(())
    }

    /// Initialize every weight uniformly from `[min, max]`.
    pub fn init_weights_random<R: Rng>(
        &mut self,
        min: f64,
        max: f64,
        rng: &mut R,
    ) -> Result<(), ConfigError> {
        if max < min {
            return Err(ConfigError::OutOfRangeHyperparameter {
                what: "weight init range",
                value: max,
                expected: "max >= min",
            });
        }
        self.weights.mapv_inplace(|_| rng.gen_range(min..=max));
        Ok(())
    }

    pub fn input_len(&self) -> usize {
        self.inputs
    }

    pub fn output_len(&self) -> usize {
        self.outputs
    }

    pub fn weights(&self) -> &Array2<f64> {
        &self.weights
    }

    pub fn bias(&self) -> &[f64] {
        &self.bias
    }

    /// Gradient received by the most recent backward call.
    pub fn last_output_gradient(&self) -> &[Array2<f64>] {
        &self.last_output_gradient
    }
}

impl Layer for Dense {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn forward(&mut self, input: &[Array2<f64>]) -> Vec<Array2<f64>> {
        let flat: Array1<f64> = input.iter().flat_map(|m| m.iter().copied()).collect();
        assert_eq!(
            flat.len(),
            self.inputs,
            "Dense expects {} input features, got {}",
            self.inputs,
            flat.len()
        );
        let mut activation = self.weights.dot(&flat);
        for (value, bias) in activation.iter_mut().zip(&self.bias) {
            *value += bias;
        }
        self.last_flat_input = flat;
        self.last_output = vec![Array2::from_shape_vec((self.outputs, 1), activation.to_vec())
            .expect("activation length matches the output count")];
        self.last_output.clone()
    }

    fn backward(&mut self, output_gradient: &[Array2<f64>]) -> Vec<Array2<f64>> {
        let gradient = conform_to(output_gradient, &self.last_output);
        let grads: Array1<f64> = gradient[0].iter().copied().collect();

        let flat_input = &self.last_flat_input;
        self.weight_gradient = vec![Array2::from_shape_fn(
            (self.outputs, self.inputs),
            |(i, j)| grads[i] * flat_input[j],
        )];
        self.bias_gradient = grads.to_vec();

        let input_gradient = self.weights.t().dot(&grads);
        self.last_input_gradient =
            vec![Array2::from_shape_vec((self.inputs, 1), input_gradient.to_vec())
                .expect("gradient length matches the input count")];
        self.last_output_gradient = gradient;
        self.last_input_gradient.clone()
    }

    fn trainable(&self) -> Option<&dyn TrainableLayer> {
        Some(self)
    }

    fn trainable_mut(&mut self) -> Option<&mut dyn TrainableLayer> {
        Some(self)
    }
}

impl TrainableLayer for Dense {
    fn weight_gradients(&self) -> &[Array2<f64>] {
        &self.weight_gradient
    }

    fn bias_gradients(&self) -> &[f64] {
        &self.bias_gradient
    }

    fn weight_shapes(&self) -> Vec<(usize, usize)> {
        vec![(self.outputs, self.inputs)]
    }

    fn bias_len(&self) -> usize {
        self.outputs
    }

    fn apply_update(
        &mut self,
        learning_rate: f64,
        weight_steps: &[Array2<f64>],
        bias_steps: &[f64],
    ) {
        self.weights = &self.weights - &(&weight_steps[0] * learning_rate);
        for (bias, step) in self.bias.iter_mut().zip(bias_steps) {
            *bias -= learning_rate * step;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_rejects_zero_sizes() {
        assert!(matches!(
            Dense::new(0, 3),
            Err(ConfigError::NonPositiveCount { .. })
        ));
        assert!(matches!(
            Dense::new(3, 0),
            Err(ConfigError::NonPositiveCount { .. })
        ));
    }

    #[test]
    fn test_forward_matrix_vector_product() {
        let mut layer = Dense::new(3, 2).unwrap();
        layer.load_weights(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        layer.load_bias(&[1.0, -1.0]).unwrap();

        let output = layer.forward(&[array![[1.0, 0.0, 2.0]]]);
        // [1*1 + 2*0 + 3*2 + 1, 4*1 + 5*0 + 6*2 - 1]
        assert_eq!(output[0], array![[8.0], [15.0]]);
    }

    #[test]
    fn test_backward_gradients() {
        let mut layer = Dense::new(2, 2).unwrap();
        layer.load_weights(&[1.0, 2.0, 3.0, 4.0]).unwrap();

        layer.forward(&[array![[2.0], [3.0]]]);
        let input_gradient = layer.backward(&[array![[1.0], [-1.0]]]);

        // dW = g xT, db = g, dx = WT g
        assert_eq!(
            layer.weight_gradients()[0],
            array![[2.0, 3.0], [-2.0, -3.0]]
        );
        assert_eq!(layer.bias_gradients(), &[1.0, -1.0]);
        assert_eq!(input_gradient[0], array![[-2.0], [-2.0]]);
    }

    #[test]
    fn test_load_validates_lengths() {
        let mut layer = Dense::new(3, 2).unwrap();
        assert!(matches!(
            layer.load_weights(&[1.0, 2.0]),
            Err(ConfigError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            layer.load_bias(&[1.0, 2.0, 3.0]),
            Err(ConfigError::ShapeMismatch { .. })
        ));
    }
}
