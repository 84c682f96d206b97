//! 2-D convolutional layer.
//!
//! The forward pass multiplies an unrolled-correlation operator matrix by the
//! flattened, zero-padded input, one (filter, channel) pair at a time. The
//! backward pass reuses the same operator construction: the kernel gradient
//! correlates the padded input against the dilated output-gradient, and the
//! input gradient correlates the dilated, further-padded output-gradient
//! against the 180-degree-rotated filter.
//!
//! Backpropagation references:
//! <https://deeplearning.cs.cmu.edu/F21/document/recitation/Recitation5/CNN_Backprop_Recitation_5_F21.pdf>
//! <https://hideyukiinada.github.io/cnn_backprop_strides2.html>

use log::debug;
use ndarray::{Array1, Array2};
use rand::Rng;

use crate::error::ConfigError;
use crate::geometry::{output_extent, Extent, Padding, Stride};
use crate::layers::{conform_to, Layer, TrainableLayer};
use crate::operator::{
    add_padding, correlation_operator, crop, dilate, dilated_extent, padded_flat_input,
    rotate_half_turn, skip_compensation,
};

/// 2-D convolutional layer with learnable filters and per-filter biases.
///
/// Owns `filters × channels` kernel matrices (filter-major order) and one
/// bias scalar per filter. The geometry of the backward pass (dilated and
/// padded gradient extents, skip compensation) is derived once at
/// construction.
pub struct Conv2D {
    filters: usize,
    channels: usize,
    kernel: Extent,
    input: Extent,
    output: Extent,
    padding: Padding,
    stride: Stride,

    weights: Vec<Array2<f64>>,
    bias: Vec<f64>,

    padded_input: Extent,
    padded_dilated_gradient: Extent,
    skipped_rows: usize,
    skipped_cols: usize,

    last_input: Vec<Array2<f64>>,
    last_output: Vec<Array2<f64>>,
    last_output_gradient: Vec<Array2<f64>>,
    last_input_gradient: Vec<Array2<f64>>,
    weight_gradients: Vec<Array2<f64>>,
    bias_gradients: Vec<f64>,
}

impl Conv2D {
    /// Create a convolution layer.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::KernelTooLarge`] when the kernel does not fit
    /// inside the padded input, and [`ConfigError::NonPositiveCount`] when
    /// the filter count, channel count or a stride component is zero.
    pub fn new(
        kernel: Extent,
        filters: usize,
        input: Extent,
        channels: usize,
        stride: Stride,
        padding: Padding,
    ) -> Result<Self, ConfigError> {
        if kernel.height < 1 || kernel.width < 1 {
            return Err(ConfigError::NonPositiveCount {
                what: "kernel extent",
            });
        }
        let padded_input = input.padded(padding);
        if kernel.height > padded_input.height || kernel.width > padded_input.width {
            return Err(ConfigError::KernelTooLarge {
                kernel,
                input: padded_input,
            });
        }
        if filters < 1 {
            return Err(ConfigError::NonPositiveCount {
                what: "number of filters",
            });
        }
        if channels < 1 {
            return Err(ConfigError::NonPositiveCount {
                what: "number of input channels",
            });
        }
        if stride.vertical < 1 || stride.horizontal < 1 {
            return Err(ConfigError::NonPositiveCount { what: "stride" });
        }

        let output = output_extent(input, kernel, padding, stride);
        let skipped_rows = skip_compensation(
            input.height + padding.vertical(),
            kernel.height,
            stride.vertical,
        );
        let skipped_cols = skip_compensation(
            input.width + padding.horizontal(),
            kernel.width,
            stride.horizontal,
        );
        let dilated_gradient = dilated_extent(output, stride);
        let padded_dilated_gradient = Extent::new(
            dilated_gradient.height + 2 * (kernel.height - 1) + skipped_rows,
            dilated_gradient.width + 2 * (kernel.width - 1) + skipped_cols,
        );
        debug!(
            "Conv2D: {channels}x{input} -> {filters}x{output}, kernel {kernel}, \
             skip ({skipped_rows}, {skipped_cols})"
        );

        Ok(Self {
            filters,
            channels,
            kernel,
            input,
            output,
            padding,
            stride,
            weights: vec![Array2::zeros((kernel.height, kernel.width)); filters * channels],
            bias: vec![0.0; filters],
            padded_input,
            padded_dilated_gradient,
            skipped_rows,
            skipped_cols,
            last_input: Vec::new(),
            last_output: Vec::new(),
            last_output_gradient: Vec::new(),
            last_input_gradient: Vec::new(),
            weight_gradients: Vec::new(),
            bias_gradients: Vec::new(),
        })
    }

    /// Load all kernels from a flat array in filter-then-channel order, each
    /// kernel row-major.
    pub fn load_filter(&mut self, source: &[f64]) -> Result<(), ConfigError> {
        let expected = self.filters * self.channels * self.kernel.flat_len();
        if source.len() != expected {
            return Err(ConfigError::ShapeMismatch {
                what: "filter load",
                expected,
                got: source.len(),
            });
        }
        self.weights = source
            .chunks(self.kernel.flat_len())
            .map(|chunk| {
                Array2::from_shape_vec((self.kernel.height, self.kernel.width), chunk.to_vec())
                    .expect("chunk length matches the kernel extent")
            })
            .collect();
        Ok(())
    }

    /// Load the per-filter bias scalars.
    pub fn load_bias(&mut self, source: &[f64]) -> Result<(), ConfigError> {
        if source.len() != self.filters {
            return Err(ConfigError::ShapeMismatch {
                what: "bias load",
                expected: self.filters,
                got: source.len(),
            });
        }
        self.bias = source.to_vec();
        Ok(())
    }

    /// Initialize every kernel entry uniformly from `[min, max]`.
    pub fn init_filter_random<R: Rng>(
        &mut self,
        min: f64,
        max: f64,
        rng: &mut R,
    ) -> Result<(), ConfigError> {
        if max < min {
            return Err(ConfigError::OutOfRangeHyperparameter {
                what: "filter init range",
                value: max,
                expected: "max >= min",
            });
        }
        for kernel in &mut self.weights {
            kernel.mapv_inplace(|_| rng.gen_range(min..=max));
        }
        Ok(())
    }

    /// Split a flat row-major sample into per-channel input matrices.
    pub fn channels_from_flat(&self, source: &[f64]) -> Vec<Array2<f64>> {
        let pixels = self.input.flat_len();
        assert_eq!(
            source.len(),
            self.channels * pixels,
            "flat input length does not match {} channels of {}",
            self.channels,
            self.input
        );
        source
            .chunks(pixels)
            .map(|chunk| {
                Array2::from_shape_vec((self.input.height, self.input.width), chunk.to_vec())
                    .expect("chunk length matches the input extent")
            })
            .collect()
    }

    pub fn kernel_extent(&self) -> Extent {
        self.kernel
    }

    pub fn input_extent(&self) -> Extent {
        self.input
    }

    pub fn output_extent(&self) -> Extent {
        self.output
    }

    pub fn num_filters(&self) -> usize {
        self.filters
    }

    pub fn input_channels(&self) -> usize {
        self.channels
    }

    /// Total number of kernel matrices (`filters × channels`).
    pub fn kernel_count(&self) -> usize {
        self.filters * self.channels
    }

    pub fn filter(&self) -> &[Array2<f64>] {
        &self.weights
    }

    pub fn bias(&self) -> &[f64] {
        &self.bias
    }

    /// Number of trainable scalars (kernel entries plus biases).
    pub fn parameter_count(&self) -> usize {
        self.kernel_count() * self.kernel.flat_len() + self.filters
    }

    /// Output of the most recent forward call, one matrix per filter.
    pub fn last_output(&self) -> &[Array2<f64>] {
        &self.last_output
    }

    /// Gradient received by the most recent backward call.
    pub fn last_output_gradient(&self) -> &[Array2<f64>] {
        &self.last_output_gradient
    }

    /// Input gradient produced by the most recent backward call.
    pub fn last_input_gradient(&self) -> &[Array2<f64>] {
        &self.last_input_gradient
    }

    fn compute_parameter_gradients(&mut self, gradient: &[Array2<f64>]) {
        self.weight_gradients = Vec::with_capacity(self.kernel_count());
        self.bias_gradients = Vec::with_capacity(self.filters);

        for f in 0..self.filters {
            let dilated = dilate(&gradient[f], self.stride);
            let padded_dilated = add_padding(
                &dilated,
                Padding::new(0, self.skipped_cols, self.skipped_rows, 0),
            );
            let operator = correlation_operator(
                &padded_dilated,
                self.padded_input,
                self.kernel,
                Stride::unit(),
            );
            for c in 0..self.channels {
                let flat_input = padded_flat_input(&self.last_input[c], self.padding);
                let kernel_gradient = operator.dot(&flat_input);
                self.weight_gradients.push(
                    Array2::from_shape_vec(
                        (self.kernel.height, self.kernel.width),
                        kernel_gradient.to_vec(),
                    )
                    .expect("operator rows match the kernel extent"),
                );
            }
            self.bias_gradients.push(gradient[f].sum());
        }
    }

    fn compute_input_gradient(&mut self, gradient: &[Array2<f64>]) {
        self.last_input_gradient =
            vec![Array2::zeros((self.input.height, self.input.width)); self.channels];

        for f in 0..self.filters {
            let dilated = dilate(&gradient[f], self.stride);
            let flat_gradient = padded_flat_input(
                &dilated,
                Padding::new(
                    self.kernel.height - 1,
                    self.kernel.width - 1 + self.skipped_cols,
                    self.kernel.height - 1 + self.skipped_rows,
                    self.kernel.width - 1,
                ),
            );
            for c in 0..self.channels {
                let rotated = rotate_half_turn(&self.weights[f * self.channels + c]);
                let operator = correlation_operator(
                    &rotated,
                    self.padded_dilated_gradient,
                    self.padded_input,
                    Stride::unit(),
                );
                let convolved = operator.dot(&flat_gradient);
                let full = Array2::from_shape_vec(
                    (self.padded_input.height, self.padded_input.width),
                    convolved.to_vec(),
                )
                .expect("operator rows match the padded input extent");
                self.last_input_gradient[c] =
                    &self.last_input_gradient[c] + &crop(&full, self.padding);
            }
        }
    }
}

impl Layer for Conv2D {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn forward(&mut self, input: &[Array2<f64>]) -> Vec<Array2<f64>> {
        assert_eq!(
            input.len(),
            self.channels,
            "Conv2D expects {} input channels, got {}",
            self.channels,
            input.len()
        );
        self.last_input = input.to_vec();
        let mut output = Vec::with_capacity(self.filters);
        for f in 0..self.filters {
            let mut convolved: Array1<f64> = Array1::zeros(self.output.flat_len());
            for c in 0..self.channels {
                let operator = correlation_operator(
                    &self.weights[f * self.channels + c],
                    self.padded_input,
                    self.output,
                    self.stride,
                );
                let flat_input = padded_flat_input(&input[c], self.padding);
                convolved = convolved + operator.dot(&flat_input);
            }
            convolved += self.bias[f];
            output.push(
                Array2::from_shape_vec(
                    (self.output.height, self.output.width),
                    convolved.to_vec(),
                )
                .expect("accumulator length matches the output extent"),
            );
        }
        self.last_output = output.clone();
        output
    }

    fn backward(&mut self, output_gradient: &[Array2<f64>]) -> Vec<Array2<f64>> {
        let gradient = conform_to(output_gradient, &self.last_output);
        self.compute_parameter_gradients(&gradient);
        self.compute_input_gradient(&gradient);
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

impl TrainableLayer for Conv2D {
    fn weight_gradients(&self) -> &[Array2<f64>] {
        &self.weight_gradients
    }

    fn bias_gradients(&self) -> &[f64] {
        &self.bias_gradients
    }

    fn weight_shapes(&self) -> Vec<(usize, usize)> {
        vec![(self.kernel.height, self.kernel.width); self.kernel_count()]
    }

    fn bias_len(&self) -> usize {
        self.filters
    }

    fn apply_update(
        &mut self,
        learning_rate: f64,
        weight_steps: &[Array2<f64>],
        bias_steps: &[f64],
    ) {
        for (bias, step) in self.bias.iter_mut().zip(bias_steps) {
            *bias -= learning_rate * step;
        }
        for (kernel, step) in self.weights.iter_mut().zip(weight_steps) {
            *kernel = &*kernel - &(step * learning_rate);
        }
    }
}
