//! Scalar loss functions evaluated over a batch of prediction vectors.
//!
//! Losses report scalars for monitoring; the gradient fed into the first
//! backward pass is produced outside this crate, at the boundary where
//! predictions meet labels.

use ndarray::Array1;

/// Batch loss: `avg` divides the summed loss by the batch size, `total`
/// leaves the batch dimension unreduced.
pub trait Loss {
    fn avg(&self, predictions: &[Array1<f64>], targets: &[Array1<f64>]) -> f64;

    fn total(&self, predictions: &[Array1<f64>], targets: &[Array1<f64>]) -> f64;
}

fn check_batch(predictions: &[Array1<f64>], targets: &[Array1<f64>]) {
    assert_eq!(
        predictions.len(),
        targets.len(),
        "prediction batch ({}) and target batch ({}) differ",
        predictions.len(),
        targets.len()
    );
}

/// Mean squared error, normalized by the output length.
pub struct MeanSquareError {
    output_len: usize,
}

impl MeanSquareError {
    pub fn new(output_len: usize) -> Self {
        Self { output_len }
    }

    fn sum_of_squares(&self, predictions: &[Array1<f64>], targets: &[Array1<f64>]) -> f64 {
        predictions
            .iter()
            .zip(targets)
            .map(|(prediction, target)| {
                prediction
                    .iter()
                    .zip(target)
                    .map(|(p, t)| (t - p).powi(2))
                    .sum::<f64>()
            })
            .sum()
    }
}

impl Loss for MeanSquareError {
    fn avg(&self, predictions: &[Array1<f64>], targets: &[Array1<f64>]) -> f64 {
        check_batch(predictions, targets);
        self.total(predictions, targets) / predictions.len() as f64
    }

    fn total(&self, predictions: &[Array1<f64>], targets: &[Array1<f64>]) -> f64 {
        check_batch(predictions, targets);
        self.sum_of_squares(predictions, targets) / self.output_len as f64
    }
}

/// Mean absolute error, normalized by the output length.
pub struct MeanAbsoluteError {
    output_len: usize,
}

impl MeanAbsoluteError {
    pub fn new(output_len: usize) -> Self {
        Self { output_len }
    }

    fn sum_of_abs(&self, predictions: &[Array1<f64>], targets: &[Array1<f64>]) -> f64 {
        predictions
            .iter()
            .zip(targets)
            .map(|(prediction, target)| {
                prediction
                    .iter()
                    .zip(target)
                    .map(|(p, t)| (t - p).abs())
                    .sum::<f64>()
            })
            .sum()
    }
}

impl Loss for MeanAbsoluteError {
    fn avg(&self, predictions: &[Array1<f64>], targets: &[Array1<f64>]) -> f64 {
        check_batch(predictions, targets);
        self.total(predictions, targets) / predictions.len() as f64
    }

    fn total(&self, predictions: &[Array1<f64>], targets: &[Array1<f64>]) -> f64 {
        check_batch(predictions, targets);
        self.sum_of_abs(predictions, targets) / self.output_len as f64
    }
}

/// Root mean squared error: per sample, the square root of the mean squared
/// deviation over the output vector; summed over the batch.
pub struct RootMeanSquareError {
    output_len: usize,
}

impl RootMeanSquareError {
    pub fn new(output_len: usize) -> Self {
        Self { output_len }
    }
}

impl Loss for RootMeanSquareError {
    fn avg(&self, predictions: &[Array1<f64>], targets: &[Array1<f64>]) -> f64 {
        check_batch(predictions, targets);
        self.total(predictions, targets) / predictions.len() as f64
    }

    fn total(&self, predictions: &[Array1<f64>], targets: &[Array1<f64>]) -> f64 {
        check_batch(predictions, targets);
        predictions
            .iter()
            .zip(targets)
            .map(|(prediction, target)| {
                let sum: f64 = prediction
                    .iter()
                    .zip(target)
                    .map(|(p, t)| (t - p).powi(2))
                    .sum();
                (sum / self.output_len as f64).sqrt()
            })
            .sum()
    }
}

/// Residual sum of squares: the unnormalized squared deviation summed over
/// every output entry in the batch.
pub struct ResidualSumOfSquares;

impl ResidualSumOfSquares {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ResidualSumOfSquares {
    fn default() -> Self {
        Self::new()
    }
}

impl Loss for ResidualSumOfSquares {
    fn avg(&self, predictions: &[Array1<f64>], targets: &[Array1<f64>]) -> f64 {
        check_batch(predictions, targets);
        self.total(predictions, targets) / predictions.len() as f64
    }

    fn total(&self, predictions: &[Array1<f64>], targets: &[Array1<f64>]) -> f64 {
        check_batch(predictions, targets);
        predictions
            .iter()
            .zip(targets)
            .map(|(prediction, target)| {
                prediction
                    .iter()
                    .zip(target)
                    .map(|(p, t)| (t - p).powi(2))
                    .sum::<f64>()
            })
            .sum()
    }
}

/// Label-weighted negative log-probability.
///
/// Predictions are clamped away from the 0/1 edges where the label would
/// make the logarithm blow up.
pub struct CrossEntropy;

impl CrossEntropy {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CrossEntropy {
    fn default() -> Self {
        Self::new()
    }
}

impl Loss for CrossEntropy {
    fn avg(&self, predictions: &[Array1<f64>], targets: &[Array1<f64>]) -> f64 {
        check_batch(predictions, targets);
        self.total(predictions, targets) / predictions.len() as f64
    }

    fn total(&self, predictions: &[Array1<f64>], targets: &[Array1<f64>]) -> f64 {
        check_batch(predictions, targets);
        let mut sum = 0.0;
        for (prediction, target) in predictions.iter().zip(targets) {
            for (&p, &label) in prediction.iter().zip(target) {
                let p = if p == 0.0 && label == 1.0 {
                    1e-7
                } else if p == 1.0 && label == 0.0 {
                    0.999_999_99
                } else {
                    p
                };
                sum -= label * p.ln();
            }
        }
        sum
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_mse_single_sample() {
        let loss = MeanSquareError::new(3);
        let predictions = vec![array![0.57, 0.20, 0.23]];
        let targets = vec![array![1.0, 0.0, 0.0]];
        assert!((loss.avg(&predictions, &targets) - 0.0926).abs() < 0.001);
        assert!((loss.total(&predictions, &targets) - 0.0926).abs() < 0.001);
    }

    #[test]
    fn test_mse_batch() {
        let loss = MeanSquareError::new(3);
        let predictions = vec![
            array![0.57, 0.20, 0.23],
            array![0.22, 0.20, 0.58],
            array![0.24, 0.52, 0.24],
        ];
        let targets = vec![
            array![1.0, 0.0, 0.0],
            array![0.0, 0.0, 1.0],
            array![0.0, 1.0, 0.0],
        ];
        assert!((loss.avg(&predictions, &targets) - 0.09868).abs() < 0.001);
        assert!((loss.total(&predictions, &targets) - 0.29606).abs() < 0.001);
    }

    #[test]
    fn test_mae_batch() {
        let loss = MeanAbsoluteError::new(2);
        let predictions = vec![array![0.5, 0.5], array![1.0, 0.0]];
        let targets = vec![array![1.0, 0.0], array![1.0, 0.0]];
        assert!((loss.total(&predictions, &targets) - 0.5).abs() < 1e-12);
        assert!((loss.avg(&predictions, &targets) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_rmse_square_roots_per_sample() {
        let loss = RootMeanSquareError::new(2);
        let predictions = vec![array![1.0, 0.0], array![0.0, 0.0]];
        let targets = vec![array![0.0, 1.0], array![0.0, 2.0]];
        // sqrt(2/2) + sqrt(4/2)
        assert!((loss.total(&predictions, &targets) - (1.0 + 2.0f64.sqrt())).abs() < 1e-12);
        assert!((loss.avg(&predictions, &targets) - (1.0 + 2.0f64.sqrt()) / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_rss_skips_normalization() {
        let loss = ResidualSumOfSquares::new();
        let predictions = vec![array![1.0, 0.0], array![0.0, 0.0]];
        let targets = vec![array![0.0, 1.0], array![0.0, 2.0]];
        assert!((loss.total(&predictions, &targets) - 6.0).abs() < 1e-12);
        assert!((loss.avg(&predictions, &targets) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_cross_entropy_single_sample() {
        let loss = CrossEntropy::new();
        let predictions = vec![array![0.57, 0.20, 0.23]];
        let targets = vec![array![1.0, 0.0, 0.0]];
        assert!((loss.avg(&predictions, &targets) - 0.56).abs() < 0.01);
    }

    #[test]
    fn test_cross_entropy_batch() {
        let loss = CrossEntropy::new();
        let predictions = vec![
            array![0.57, 0.20, 0.23],
            array![0.22, 0.20, 0.58],
            array![0.24, 0.52, 0.24],
        ];
        let targets = vec![
            array![1.0, 0.0, 0.0],
            array![0.0, 0.0, 1.0],
            array![0.0, 1.0, 0.0],
        ];
        assert!((loss.avg(&predictions, &targets) - 0.5833).abs() < 0.01);
        assert!((loss.total(&predictions, &targets) - 1.75).abs() < 0.011);
    }

    #[test]
    fn test_cross_entropy_clamps_confident_misses() {
        let loss = CrossEntropy::new();
        let predictions = vec![array![0.0, 1.0]];
        let targets = vec![array![1.0, 0.0]];
        let value = loss.total(&predictions, &targets);
        assert!(value.is_finite());
        assert!(value > 0.0);
    }
}
