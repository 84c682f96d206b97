//! The unrolled-correlation operator and the matrix helpers built around it.
//!
//! A correlation over a padded input can be written as a dense matrix
//! multiplied by the flattened input vector. The same operator construction,
//! fed different (kernel, padded-extent, output-extent, stride) quadruples,
//! implements forward convolution, the kernel-gradient computation and the
//! input-gradient computation, which is why it lives in its own module.

use ndarray::{s, Array1, Array2};

use crate::geometry::{Extent, Padding, Stride};

/// Build the dense operator that maps a flattened padded input of extent
/// `padded` to the flattened correlation output of extent `output`.
///
/// Row `i·Ow + j` of the result holds the kernel values for output position
/// `(i, j)`: the kernel entry `(ki, kj)` lands at flattened column
/// `i·strideV·Pw + j·strideH + kj + ki·Pw`.
pub fn correlation_operator(
    kernel: &Array2<f64>,
    padded: Extent,
    output: Extent,
    stride: Stride,
) -> Array2<f64> {
    let (kh, kw) = kernel.dim();
    unrolled_operator(Extent::new(kh, kw), padded, output, stride, |ki, kj| {
        kernel[[ki, kj]]
    })
}

/// Build the sparse averaging operator used by average pooling: the same
/// unrolling as [`correlation_operator`] with the uniform window weight
/// `1 / (pool.height · pool.width)` in place of kernel values.
pub fn averaging_operator(
    pool: Extent,
    input: Extent,
    output: Extent,
    stride: Stride,
) -> Array2<f64> {
    let weight = 1.0 / pool.flat_len() as f64;
    unrolled_operator(pool, input, output, stride, |_, _| weight)
}

fn unrolled_operator(
    window: Extent,
    padded: Extent,
    output: Extent,
    stride: Stride,
    value: impl Fn(usize, usize) -> f64,
) -> Array2<f64> {
    let flat_dim = padded.flat_len();
    let mut values = vec![0.0; output.flat_len() * flat_dim];
    let mut row_offset = 0;
    for _ in 0..output.height {
        for j in 0..output.width {
            for ki in 0..window.height {
                for kj in 0..window.width {
                    let c = row_offset + j * stride.horizontal + kj + ki * padded.width;
                    values[c] = value(ki, kj);
                }
            }
            row_offset += flat_dim;
        }
        row_offset += padded.width * stride.vertical;
    }
    Array2::from_shape_vec((output.flat_len(), flat_dim), values)
        .expect("operator dimensions are consistent by construction")
}

/// Copy `source` into the middle of a zero matrix grown by `padding`.
pub fn add_padding(source: &Array2<f64>, padding: Padding) -> Array2<f64> {
    let (n, m) = source.dim();
    let padded = Extent::new(n, m).padded(padding);
    let mut result = Array2::zeros((padded.height, padded.width));
    result
        .slice_mut(s![
            padding.top..padding.top + n,
            padding.left..padding.left + m
        ])
        .assign(source);
    result
}

/// Flatten `source` with zero margins into the row-major vector the
/// correlation operator multiplies against.
pub fn padded_flat_input(source: &Array2<f64>, padding: Padding) -> Array1<f64> {
    Array1::from(add_padding(source, padding).into_raw_vec())
}

/// Remove `margins` from the border of `source`, undoing [`add_padding`].
pub fn crop(source: &Array2<f64>, margins: Padding) -> Array2<f64> {
    let (n, m) = source.dim();
    source
        .slice(s![
            margins.top..n - margins.bottom,
            margins.left..m - margins.right
        ])
        .to_owned()
}

/// Extent of a matrix after inserting `stride − 1` zero gaps between entries
/// in both directions.
pub fn dilated_extent(source: Extent, stride: Stride) -> Extent {
    Extent {
        height: stride.vertical * (source.height - 1) + 1,
        width: stride.horizontal * (source.width - 1) + 1,
    }
}

/// Spread `source` entries `stride` apart, filling the gaps with zeros.
///
/// This undoes the subsampling a strided forward pass applies, so a dilated
/// output-gradient can be correlated at unit stride.
pub fn dilate(source: &Array2<f64>, stride: Stride) -> Array2<f64> {
    let (n, m) = source.dim();
    let extent = dilated_extent(Extent::new(n, m), stride);
    let mut result = Array2::zeros((extent.height, extent.width));
    for i in 0..n {
        for j in 0..m {
            result[[i * stride.vertical, j * stride.horizontal]] = source[[i, j]];
        }
    }
    result
}

/// Rotate a matrix by 180 degrees (reverse both axes).
pub fn rotate_half_turn(source: &Array2<f64>) -> Array2<f64> {
    let (n, m) = source.dim();
    Array2::from_shape_fn((n, m), |(i, j)| source[[n - 1 - i, m - 1 - j]])
}

/// Residual rows or columns that strided-kernel coverage misses along one
/// axis: the part of the padded span left over once the last window that
/// still fits has been placed. Zero whenever the stride divides the span
/// evenly.
pub fn skip_compensation(span: usize, kernel: usize, stride: usize) -> usize {
    (span - kernel) % stride
}
