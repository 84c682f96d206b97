//! Numerical engine for training small convolutional neural networks.
//!
//! This library provides forward and backward passes for 2-D convolution and
//! pooling layers, together with the gradient-accumulation mechanics
//! (momentum, second-moment scaling, bias correction) shared by the classical
//! optimizers SGD-with-momentum, RMSProp and Adam.
//!
//! # Modules
//!
//! - `geometry`: extents, padding, stride and the derived output-size arithmetic
//! - `operator`: the unrolled-correlation operator and matrix helpers
//! - `layers`: Layer trait and implementations (Conv2D, MaxPool, AvgPool, Dense, activations)
//! - `optimizers`: Optimizer trait and implementations (SGD, RMSProp, Adam)
//! - `losses`: scalar loss functions evaluated over prediction batches
//! - `network`: sequential container chaining layers through a training step
//! - `config`: training configuration loaded from JSON
//! - `error`: typed configuration errors shared by every constructor

pub mod config;
pub mod error;
pub mod geometry;
pub mod layers;
pub mod losses;
pub mod network;
pub mod operator;
pub mod optimizers;

pub use error::ConfigError;
