//! Training configuration loaded from JSON.
//!
//! Different optimizers require different optional fields:
//!
//! - **sgd**: optional `momentum`
//! - **rmsprop**: requires `rho`, optional `epsilon`
//! - **adam**: requires `rho` and `momentum`, optional `epsilon`
//!
//! # Example
//!
//! ```json
//! {
//!   "optimizer": "adam",
//!   "learning_rate": 0.001,
//!   "momentum": 0.9,
//!   "rho": 0.999,
//!   "epsilon": 1e-8
//! }
//! ```

use std::fs;
use std::path::Path;

use log::debug;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::optimizers::{Adam, Optimizer, RmsProp, Sgd};

const DEFAULT_EPSILON: f64 = 1e-8;

/// Configuration for a training run, parsed from a JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct TrainingConfig {
    /// Optimizer name: "sgd", "rmsprop" or "adam".
    pub optimizer: String,

    /// Step size for parameter updates.
    pub learning_rate: f64,

    /// First-moment decay, used by SGD-with-momentum and Adam.
    pub momentum: Option<f64>,

    /// Squared-gradient decay, used by RMSProp and Adam.
    pub rho: Option<f64>,

    /// Numerical-stability constant for the scaled updates.
    pub epsilon: Option<f64>,
}

/// Load and validate a training configuration.
///
/// # Example
///
/// ```ignore
/// use convnet::config::{build_optimizer, load_config};
///
/// let config = load_config("config/train_adam.json")?;
/// let mut optimizer = build_optimizer(&config)?;
/// ```
///
/// # Errors
///
/// Returns [`ConfigError::Io`]/[`ConfigError::Parse`] for unreadable or
/// malformed files, and the validation errors of [`build_optimizer`] for
/// configurations naming impossible hyperparameters.
pub fn load_config(path: impl AsRef<Path>) -> Result<TrainingConfig, ConfigError> {
    let contents = fs::read_to_string(path)?;
    let config: TrainingConfig = serde_json::from_str(&contents)?;
    // Constructing the optimizer runs the full hyperparameter validation.
    build_optimizer(&config)?;
    debug!("loaded config: {config:?}");
    Ok(config)
}

/// Construct the optimizer a configuration describes.
///
/// # Errors
///
/// Returns [`ConfigError::UnknownOptimizer`] for unrecognized names and
/// [`ConfigError::OutOfRangeHyperparameter`] when a value falls outside its
/// admissible range.
pub fn build_optimizer(config: &TrainingConfig) -> Result<Box<dyn Optimizer>, ConfigError> {
    let momentum = config.momentum.unwrap_or(0.0);
    let rho = config.rho.unwrap_or(0.0);
    let epsilon = config.epsilon.unwrap_or(DEFAULT_EPSILON);
    match config.optimizer.as_str() {
        "sgd" => Ok(Box::new(Sgd::new(config.learning_rate, momentum)?)),
        "rmsprop" => Ok(Box::new(RmsProp::new(config.learning_rate, rho, epsilon)?)),
        "adam" => Ok(Box::new(Adam::new(
            config.learning_rate,
            rho,
            momentum,
            epsilon,
        )?)),
        other => Err(ConfigError::UnknownOptimizer(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(optimizer: &str, learning_rate: f64) -> TrainingConfig {
        TrainingConfig {
            optimizer: optimizer.to_string(),
            learning_rate,
            momentum: None,
            rho: None,
            epsilon: None,
        }
    }

    #[test]
    fn test_build_known_optimizers() {
        assert!(build_optimizer(&config("sgd", 0.1)).is_ok());
        assert!(build_optimizer(&config("rmsprop", 0.1)).is_ok());
        assert!(build_optimizer(&config("adam", 0.1)).is_ok());
    }

    #[test]
    fn test_rejects_unknown_optimizer() {
        assert!(matches!(
            build_optimizer(&config("adagrad", 0.1)),
            Err(ConfigError::UnknownOptimizer(_))
        ));
    }

    #[test]
    fn test_rejects_bad_learning_rate() {
        assert!(matches!(
            build_optimizer(&config("sgd", 0.0)),
            Err(ConfigError::OutOfRangeHyperparameter { .. })
        ));
    }

    #[test]
    fn test_rejects_out_of_range_momentum() {
        let mut cfg = config("sgd", 0.1);
        cfg.momentum = Some(1.0);
        assert!(matches!(
            build_optimizer(&cfg),
            Err(ConfigError::OutOfRangeHyperparameter { .. })
        ));
    }
}
