//! Run configuration.
//!
//! Every hyperparameter of a run lives in `TrainingConfig`. The defaults are
//! the values of the reference experiment, so an empty JSON object (or no
//! config file at all) reproduces it.
//!
//! # Example
//!
//! ```json
//! {
//!   "epochs": 10,
//!   "batch_size": 128,
//!   "learning_rate": 0.003,
//!   "weight_decay": 0.0001,
//!   "validation_fraction": 0.1,
//!   "optimizer": "adam",
//!   "device": "accelerator",
//!   "data_dir": "./data/cifar-10-batches-bin"
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::device::DeviceRequest;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    Adam,
    Sgd,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainingConfig {
    /// Number of train/validate epochs
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f32,
    /// L2 penalty folded into the gradient by the optimizer
    pub weight_decay: f32,
    /// Fraction of the training split held out for validation, in [0, 1)
    pub validation_fraction: f32,
    /// Seeds the split, the per-epoch order, weight init and dropout
    pub seed: u64,
    pub optimizer: OptimizerKind,
    pub device: DeviceRequest,
    /// Draw a fresh batch order over each split every epoch
    pub shuffle_each_epoch: bool,
    /// Directory holding the CIFAR-10 binary batches
    pub data_dir: PathBuf,
    /// Optional architecture JSON; the built-in network is used when absent
    pub architecture: Option<PathBuf>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 10,
            batch_size: 128,
            learning_rate: 3e-3,
            weight_decay: 1e-4,
            validation_fraction: 0.1,
            seed: 42,
            optimizer: OptimizerKind::Adam,
            device: DeviceRequest::Accelerator,
            shuffle_each_epoch: true,
            data_dir: PathBuf::from("./data/cifar-10-batches-bin"),
            architecture: None,
        }
    }
}

/// Loads and validates a training configuration from a JSON file.
///
/// # Examples
///
/// ```no_run
/// use convnet_trainer::config::load_config;
///
/// let cfg = load_config("config/cifar10.json").unwrap();
/// assert_eq!(cfg.epochs, 10);
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<TrainingConfig> {
    let contents = fs::read_to_string(path)?;
    let config: TrainingConfig = serde_json::from_str(&contents)?;
    validate_config(&config)?;
    Ok(config)
}

pub fn validate_config(config: &TrainingConfig) -> Result<()> {
    if config.epochs == 0 {
        return Err(Error::InvalidConfig("epochs must be greater than 0".into()));
    }
    if config.batch_size == 0 {
        return Err(Error::InvalidConfig(
            "batch_size must be greater than 0".into(),
        ));
    }
    if !(config.learning_rate > 0.0 && config.learning_rate.is_finite()) {
        return Err(Error::InvalidConfig(format!(
            "learning_rate must be positive, got {}",
            config.learning_rate
        )));
    }
    if !(config.weight_decay >= 0.0 && config.weight_decay.is_finite()) {
        return Err(Error::InvalidConfig(format!(
            "weight_decay must be non-negative, got {}",
            config.weight_decay
        )));
    }
    if !(0.0..1.0).contains(&config.validation_fraction) {
        return Err(Error::InvalidConfig(format!(
            "validation_fraction must be in [0, 1), got {}",
            config.validation_fraction
        )));
    }
    Ok(())
}
