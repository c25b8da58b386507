//! Error type shared by configuration, data loading, the model and the training loop.

use std::fmt;

use thiserror::Error;

/// Phase of a run in which a batch failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Training,
    Validation,
    Evaluation,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunPhase::Training => write!(f, "training"),
            RunPhase::Validation => write!(f, "validation"),
            RunPhase::Evaluation => write!(f, "evaluation"),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid architecture at layer {layer}: {reason}")]
    InvalidArchitecture { layer: usize, reason: String },

    #[error("shape mismatch in {context}: expected {expected} values, got {actual}")]
    ShapeMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("length mismatch: {outputs} score rows for {labels} labels")]
    LengthMismatch { outputs: usize, labels: usize },

    #[error("label {label} out of range for {n_classes} classes")]
    LabelOutOfRange { label: usize, n_classes: usize },

    #[error("empty batch")]
    EmptyBatch,

    #[error("batch prepared for {batch} but model lives on {model}")]
    DeviceMismatch { batch: String, model: String },

    #[error("backward called without a training-mode forward pass")]
    NoActivations,

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("non-finite loss {loss} during {phase} (epoch {epoch}, batch {batch})")]
    NonFiniteLoss {
        phase: RunPhase,
        epoch: usize,
        batch: usize,
        loss: f32,
    },

    #[error("{phase} failed at epoch {epoch}, batch {batch}: {source}")]
    Batch {
        phase: RunPhase,
        epoch: usize,
        batch: usize,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wraps `self` with the position in the run where it happened.
    ///
    /// Errors that already carry a position are returned unchanged.
    pub fn at(self, phase: RunPhase, epoch: usize, batch: usize) -> Self {
        match self {
            Error::Batch { .. } | Error::NonFiniteLoss { .. } => self,
            other => Error::Batch {
                phase,
                epoch,
                batch,
                source: Box::new(other),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
