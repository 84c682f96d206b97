// Pooling fixtures: literal max/average pooling outputs and backward
// routing, ported alongside the selection and mass-conservation properties.

use approx::assert_relative_eq;
use ndarray::{array, Array2};

use convnet::geometry::{Extent, Stride};
use convnet::layers::{AvgPool, Layer, MaxPool};

fn flatten(output: &[Array2<f64>]) -> Vec<f64> {
    output.iter().flat_map(|m| m.iter().copied()).collect()
}

fn assert_mat_close(actual: &Array2<f64>, expected: &Array2<f64>, epsilon: f64) {
    assert_eq!(actual.dim(), expected.dim(), "matrix extents differ");
    for (a, e) in actual.iter().zip(expected) {
        assert_relative_eq!(a, e, epsilon = epsilon);
    }
}

#[test]
fn test_max_pool_single_channel() {
    let mut layer =
        MaxPool::new(Extent::new(2, 2), Extent::new(4, 4), Stride::new(2, 2), 1).unwrap();
    let output = layer.forward(&[array![
        [3.0, 1.0, 5.0, 4.0],
        [2.0, 4.0, 2.0, -1.0],
        [2.0, 7.0, 2.0, 0.0],
        [7.0, 6.0, 1.0, -9.0]
    ]]);
    assert_eq!(flatten(&output), vec![4.0, 5.0, 7.0, 2.0]);
}

#[test]
fn test_max_pool_two_channels() {
    let mut layer =
        MaxPool::new(Extent::new(2, 2), Extent::new(4, 4), Stride::new(2, 2), 2).unwrap();
    let output = layer.forward(&[
        array![
            [3.0, 1.0, 5.0, 4.0],
            [2.0, 4.0, 2.0, -1.0],
            [2.0, 7.0, 2.0, 0.0],
            [7.0, 6.0, 1.0, -9.0]
        ],
        array![
            [8.0, 2.0, 5.0, 0.0],
            [4.0, 1.0, 5.0, 4.0],
            [0.0, -3.0, 2.0, 2.0],
            [-4.0, 0.0, 2.0, 3.0]
        ],
    ]);
    assert_eq!(flatten(&output), vec![4.0, 5.0, 7.0, 2.0, 8.0, 5.0, 0.0, 3.0]);
    assert_eq!(output[0], array![[4.0, 5.0], [7.0, 2.0]]);
    assert_eq!(output[1], array![[8.0, 5.0], [0.0, 3.0]]);
}

#[test]
fn test_max_pool_ignores_uncovered_border() {
    let mut layer =
        MaxPool::new(Extent::new(2, 2), Extent::new(3, 3), Stride::new(2, 2), 1).unwrap();
    let output = layer.forward(&[array![
        [1.0, 2.0, 4.0],
        [3.0, 2.0, 4.0],
        [4.0, 4.0, 4.0]
    ]]);
    assert_eq!(flatten(&output), vec![3.0]);
}

#[test]
fn test_max_pool_backward_routes_to_recorded_positions() {
    let mut layer =
        MaxPool::new(Extent::new(2, 2), Extent::new(4, 4), Stride::new(2, 2), 1).unwrap();
    layer.forward(&[array![
        [3.0, 1.0, 5.0, 4.0],
        [2.0, 4.0, 2.0, -1.0],
        [2.0, 7.0, 2.0, 0.0],
        [7.0, 6.0, 1.0, -9.0]
    ]]);
    let routed = layer.backward(&[array![[1.0, 2.0], [3.0, 4.0]]]);

    // Each gradient lands on the argmax alone; everything else stays zero.
    assert_mat_close(
        &routed[0],
        &array![
            [0.0, 0.0, 2.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 3.0, 4.0, 0.0],
            [0.0, 0.0, 0.0, 0.0]
        ],
        1e-12,
    );
}

#[test]
fn test_avg_pool_two_by_two() {
    let mut layer = AvgPool::new(Extent::new(2, 2), Extent::new(4, 4), Stride::new(2, 2)).unwrap();
    let output = layer.forward(&[array![
        [1.0, 2.0, -1.0, -2.0],
        [3.0, 5.0, 5.0, 1.0],
        [-3.0, 5.0, 1.0, 2.0],
        [-2.0, 1.0, 2.0, 8.0]
    ]]);
    assert_mat_close(
        &output[0],
        &array![[11.0 / 4.0, 3.0 / 4.0], [1.0 / 4.0, 13.0 / 4.0]],
        0.01,
    );
}

#[test]
fn test_avg_pool_ignores_uncovered_border() {
    let mut layer = AvgPool::new(Extent::new(2, 2), Extent::new(5, 5), Stride::new(2, 2)).unwrap();
    let output = layer.forward(&[array![
        [1.0, 2.0, -1.0, -2.0, 5.0],
        [3.0, 5.0, 5.0, 1.0, 0.0],
        [-3.0, 5.0, 1.0, 2.0, 2.0],
        [-2.0, 1.0, 2.0, 8.0, 7.0],
        [2.0, 3.0, 5.0, 1.0, 0.0]
    ]]);
    assert_mat_close(
        &output[0],
        &array![[11.0 / 4.0, 3.0 / 4.0], [1.0 / 4.0, 13.0 / 4.0]],
        0.01,
    );
}

#[test]
fn test_avg_pool_three_by_three_two_channels() {
    let mut layer = AvgPool::new(Extent::new(3, 3), Extent::new(5, 5), Stride::new(3, 3)).unwrap();
    let output = layer.forward(&[
        array![
            [1.0, 2.0, -1.0, -2.0, 5.0],
            [3.0, 5.0, 5.0, 1.0, 0.0],
            [-3.0, 5.0, 1.0, 2.0, 2.0],
            [-2.0, 1.0, 2.0, 8.0, 7.0],
            [2.0, 3.0, 5.0, 1.0, 0.0]
        ],
        array![
            [5.0, 3.0, 9.0, 0.0, 1.0],
            [0.0, -2.0, 0.0, 9.0, -3.0],
            [-4.0, 2.0, 1.0, 9.0, 3.0],
            [5.0, 3.0, 2.0, 1.0, 1.0],
            [0.0, -3.0, -3.0, -4.0, 5.0]
        ],
    ]);
    assert_relative_eq!(output[0][[0, 0]], 18.0 / 9.0, epsilon = 0.01);
    assert_relative_eq!(output[1][[0, 0]], 14.0 / 9.0, epsilon = 0.01);
}

#[test]
fn test_avg_pool_backward_redistributes_evenly() {
    let mut layer = AvgPool::new(Extent::new(2, 2), Extent::new(4, 4), Stride::new(2, 2)).unwrap();
    layer.forward(&[Array2::zeros((4, 4))]);
    let spread = layer.backward(&[array![[1.0, 2.0], [4.0, -1.0]]]);
    assert_mat_close(
        &spread[0],
        &array![
            [0.25, 0.25, 0.5, 0.5],
            [0.25, 0.25, 0.5, 0.5],
            [1.0, 1.0, -0.25, -0.25],
            [1.0, 1.0, -0.25, -0.25]
        ],
        1e-9,
    );
}

#[test]
fn test_avg_pool_backward_leaves_uncovered_border_at_zero() {
    let mut layer = AvgPool::new(Extent::new(2, 2), Extent::new(5, 5), Stride::new(2, 2)).unwrap();
    layer.forward(&[Array2::zeros((5, 5))]);
    let spread = layer.backward(&[array![[1.0, 2.0], [4.0, -1.0]]]);
    assert_mat_close(
        &spread[0],
        &array![
            [0.25, 0.25, 0.5, 0.5, 0.0],
            [0.25, 0.25, 0.5, 0.5, 0.0],
            [1.0, 1.0, -0.25, -0.25, 0.0],
            [1.0, 1.0, -0.25, -0.25, 0.0],
            [0.0, 0.0, 0.0, 0.0, 0.0]
        ],
        1e-9,
    );
}

#[test]
fn test_avg_pool_backward_two_channels() {
    let mut layer = AvgPool::new(Extent::new(3, 3), Extent::new(4, 4), Stride::new(3, 3)).unwrap();
    layer.forward(&[Array2::zeros((4, 4)), Array2::zeros((4, 4))]);
    let spread = layer.backward(&[array![[3.0]], array![[18.0]]]);
    let third = 3.0 / 9.0;
    assert_mat_close(
        &spread[0],
        &array![
            [third, third, third, 0.0],
            [third, third, third, 0.0],
            [third, third, third, 0.0],
            [0.0, 0.0, 0.0, 0.0]
        ],
        1e-9,
    );
    assert_mat_close(
        &spread[1],
        &array![
            [2.0, 2.0, 2.0, 0.0],
            [2.0, 2.0, 2.0, 0.0],
            [2.0, 2.0, 2.0, 0.0],
            [0.0, 0.0, 0.0, 0.0]
        ],
        1e-9,
    );
}
