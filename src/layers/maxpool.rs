//! Max-pooling layer.
//!
//! The forward pass records, per output cell, which input position supplied
//! the maximum; the backward pass routes each cell's gradient to exactly that
//! position. Ties keep the earliest-scanned position: a later element must
//! strictly exceed the running maximum to take over.

use ndarray::Array2;

use crate::error::ConfigError;
use crate::geometry::{output_extent, Extent, Padding, Stride};
use crate::layers::{conform_to, Layer};

/// Windowed maximum over each channel independently.
pub struct MaxPool {
    pool: Extent,
    input: Extent,
    output: Extent,
    stride: Stride,
    channels: usize,

    /// `[channel][out_row][out_col]` -> input position of the selected
    /// maximum, rebuilt on every forward call.
    max_positions: Vec<Vec<Vec<(usize, usize)>>>,

    last_input: Vec<Array2<f64>>,
    last_output: Vec<Array2<f64>>,
    last_output_gradient: Vec<Array2<f64>>,
    last_input_gradient: Vec<Array2<f64>>,
}

impl MaxPool {
    pub fn new(
        pool: Extent,
        input: Extent,
        stride: Stride,
        channels: usize,
    ) -> Result<Self, ConfigError> {
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
        if channels < 1 {
            return Err(ConfigError::NonPositiveCount {
                what: "number of channels",
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
            channels,
            max_positions: vec![
                vec![vec![(0, 0); output.width]; output.height];
                channels
            ],
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

impl Layer for MaxPool {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn forward(&mut self, input: &[Array2<f64>]) -> Vec<Array2<f64>> {
        assert_eq!(
            input.len(),
            self.channels,
            "MaxPool expects {} channels, got {}",
            self.channels,
            input.len()
        );
        self.last_input = input.to_vec();
        let mut output = Vec::with_capacity(self.channels);
        for (channel, matrix) in input.iter().enumerate() {
            let mut pooled = Array2::zeros((self.output.height, self.output.width));
            for i in 0..self.output.height {
                for j in 0..self.output.width {
                    let top = i * self.stride.vertical;
                    let left = j * self.stride.horizontal;
                    // Seed below the first element so it always wins the
                    // first strict comparison, even when the window is
                    // constant.
                    let mut current_max = matrix[[top, left]] - 1.0;
                    for pi in 0..self.pool.height {
                        for pj in 0..self.pool.width {
                            let value = matrix[[top + pi, left + pj]];
                            if value > current_max {
                                current_max = value;
                                self.max_positions[channel][i][j] = (top + pi, left + pj);
                            }
                        }
                    }
                    pooled[[i, j]] = current_max;
                }
            }
            output.push(pooled);
        }
        self.last_output = output.clone();
        output
    }

    fn backward(&mut self, output_gradient: &[Array2<f64>]) -> Vec<Array2<f64>> {
        let gradient = conform_to(output_gradient, &self.last_output);
        self.last_input_gradient = gradient
            .iter()
            .enumerate()
            .map(|(channel, grads)| {
                let mut routed = Array2::zeros((self.input.height, self.input.width));
                for i in 0..self.output.height {
                    for j in 0..self.output.width {
                        let (y, x) = self.max_positions[channel][i][j];
                        routed[[y, x]] += grads[[i, j]];
                    }
                }
                routed
            })
            .collect();
        self.last_output_gradient = gradient;
        self.last_input_gradient.clone()
    }
}
