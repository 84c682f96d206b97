//! Typed configuration errors.
//!
//! Every invalid configuration (kernel larger than the padded input,
//! non-positive counts, out-of-range hyperparameters, mismatched load
//! lengths) is rejected at construction or load time with a [`ConfigError`].
//! Shape violations during `forward`/`backward` are programming errors and
//! panic instead of returning a result.

use thiserror::Error;

use crate::geometry::Extent;

/// Error raised when a layer, optimizer or training configuration is
/// rejected at setup time.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The kernel (or pool window) does not fit inside the padded input.
    #[error("kernel {kernel} exceeds padded input {input}")]
    KernelTooLarge { kernel: Extent, input: Extent },

    /// A filter/channel/feature count that must be at least one was zero.
    #[error("{what} must be positive")]
    NonPositiveCount { what: &'static str },

    /// A hyperparameter fell outside its admissible range.
    #[error("{what} out of range: {value} (expected {expected})")]
    OutOfRangeHyperparameter {
        what: &'static str,
        value: f64,
        expected: &'static str,
    },

    /// A parameter array passed to a load method has the wrong length.
    #[error("{what}: expected {expected} values, got {got}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    /// The configuration file names an optimizer this crate does not provide.
    #[error("unknown optimizer {0:?}")]
    UnknownOptimizer(String),

    /// The configuration file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file could not be parsed.
    #[error("malformed config file: {0}")]
    Parse(#[from] serde_json::Error),
}
