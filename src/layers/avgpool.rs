//! Average-pooling layer.
//!
//! The forward pass multiplies a precomputed sparse averaging operator (the
//! same unrolling as the correlation operator, with a uniform window weight)
//! against each flattened channel. The backward pass redistributes each
//! output cell's gradient over its window at the same uniform weight, so the
//! gradient mass is conserved exactly.

use ndarray::{Array1, Array2};

use crate::error::ConfigError;
use crate::geometry::{output_extent, Extent, Padding, Stride};
use crate::layers::{conform_to, Layer};
use crate::operator::averaging_operator;

/// Windowed mean over each channel independently.
pub struct AvgPool {
    pool: Extent,
    input: Extent,
    output: Extent,
    stride: Stride,
    operator: Array2<f64>,

    last_input: Vec<Array2<f64>>,
    last_output: Vec<Array2<f64>>,
    last_output_gradient: Vec<Array2<f64>>,
    last_input_gradient: Vec<Array2<f64>>,
}

impl AvgPool {
    pub fn new(pool: Extent, input: Extent, stride: Stride) -> Result<Self, ConfigError> {
        if pool.height < 1 || pool.width < 1 {
            return Err(ConfigError::NonPositiveCount {
                what: "pool extent",
            });
        }
        if pool.height > input.height || pool.width > input.width {
            return Err(ConfigError::KernelTooLarge {
                kernel: pool,
                input,
            });
        }
        if stride.vertical < 1 || stride.horizontal < 1 {
            return Err(ConfigError::NonPositiveCount { what: "stride" });
        }
        let output = output_extent(input, pool, Padding::none(), stride);
        Ok(Self {
            pool,
            input,
            output,
            stride,
            operator: averaging_operator(pool, input, output, stride),
            last_input: Vec::new(),
            last_output: Vec::new(),
            last_output_gradient: Vec::new(),
            last_input_gradient: Vec::new(),
        })
    }

    pub fn output_extent(&self) -> Extent {
        self.output
    }

    pub fn input_extent(&self) -> Extent {
        self.input
    }

    /// Input seen by the most recent forward call.
    pub fn last_input(&self) -> &[Array2<f64>] {
        &self.last_input
    }

    /// Gradient received by the most recent backward call.
    pub fn last_output_gradient(&self) -> &[Array2<f64>] {
        &self.last_output_gradient
    }
}

impl Layer for AvgPool {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn forward(&mut self, input: &[Array2<f64>]) -> Vec<Array2<f64>> {
        self.last_input = input.to_vec();
        let mut output = Vec::with_capacity(input.len());
        for matrix in input {
            assert_eq!(
                matrix.dim(),
                (self.input.height, self.input.width),
                "AvgPool expects input channels of extent {}",
                self.input
            );
            let flat: Array1<f64> = matrix.iter().copied().collect();
            let pooled = self.operator.dot(&flat);
            output.push(
                Array2::from_shape_vec((self.output.height, self.output.width), pooled.to_vec())
                    .expect("operator rows match the output extent"),
            );
        }
        self.last_output = output.clone();
        output
    }

    fn backward(&mut self, output_gradient: &[Array2<f64>]) -> Vec<Array2<f64>> {
        let gradient = conform_to(output_gradient, &self.last_output);
        let weight = 1.0 / self.pool.flat_len() as f64;
        self.last_input_gradient = gradient
            .iter()
            .map(|grads| {
                let mut spread = Array2::zeros((self.input.height, self.input.width));
                for i in 0..self.output.height {
                    for j in 0..self.output.width {
                        let share = grads[[i, j]] * weight;
                        let top = i * self.stride.vertical;
                        let left = j * self.stride.horizontal;
                        for pi in 0..self.pool.height {
                            for pj in 0..self.pool.width {
                                spread[[top + pi, left + pj]] += share;
                            }
                        }
                    }
                }
                spread
            })
            .collect();
        self.last_output_gradient = gradient;
        self.last_input_gradient.clone()
    }
}
