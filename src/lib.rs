//! Convolutional image classifier training on CPU.
//!
//! Trains a small CNN on CIFAR-10 style data with a train/validation split,
//! tracking per-batch loss and accuracy and the best validation accuracy of
//! the run.
//!
//! # Modules
//!
//! - `data`: datasets (CIFAR-10 binary, in-memory, synthetic), transforms, split and batching
//! - `layers`: Layer trait and implementations (Conv2D, Dense, BatchNorm, ...)
//! - `architecture`: declarative network description and model building
//! - `model`: the `Classifier` trait and the `Sequential` model
//! - `loss`, `metrics`: softmax cross-entropy and accuracy
//! - `optimizers`: Optimizer trait with Adam and SGD
//! - `training`: the train/validate loop, run history and test evaluation
//! - `config`, `device`, `error`: run configuration, execution device, error type
//! - `utils`: RNG and activation kernels

pub mod architecture;
pub mod config;
pub mod data;
pub mod device;
pub mod error;
pub mod layers;
pub mod loss;
pub mod metrics;
pub mod model;
pub mod optimizers;
pub mod training;
pub mod utils;

pub use error::{Error, Result};
