//! Core error types.

use std::path::PathBuf;
use thiserror::Error;

/// Stage of the pipeline an error occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    /// Error occurred during tensor operations.
    TensorOperation,
    /// Error occurred during image normalization.
    Normalization,
    /// Error occurred while cutting or padding images into patches.
    Patching,
    /// Error occurred inside the training loop.
    Training,
    /// Error occurred while saving or restoring model weights.
    Checkpoint,
}

impl std::fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingStage::TensorOperation => write!(f, "tensor operation"),
            ProcessingStage::Normalization => write!(f, "normalization"),
            ProcessingStage::Patching => write!(f, "patching"),
            ProcessingStage::Training => write!(f, "training"),
            ProcessingStage::Checkpoint => write!(f, "checkpoint"),
        }
    }
}

/// A message-only error used as the source of a [`FusionError::Processing`]
/// when there is no underlying error value.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct OpaqueError(pub String);

/// Errors that can occur while preparing data, training, or fusing images.
#[derive(Error, Debug)]
pub enum FusionError {
    /// An image could not be decoded.
    #[error("image load")]
    ImageLoad(#[source] image::ImageError),

    /// Error occurred during processing.
    #[error("{kind} failed: {context}")]
    Processing {
        /// The stage of processing where the error occurred.
        kind: ProcessingStage,
        /// Additional context about the error.
        context: String,
        /// The underlying error that caused this error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Error from a candle tensor or autograd operation.
    #[error("tensor operation")]
    Tensor(#[from] candle_core::Error),

    /// The patch container file is malformed.
    #[error("patch container {path}: {message}")]
    Container {
        /// Path of the offending container.
        path: PathBuf,
        /// What was wrong with it.
        message: String,
    },

    /// Error from safetensors (de)serialization.
    #[error("safetensors")]
    Safetensors(#[from] safetensors::SafeTensorError),

    /// The infrared and visible datasets hold different numbers of samples.
    #[error("infrared and visible datasets differ in size: {infrared} vs {visible}")]
    DatasetMismatch {
        /// Number of infrared samples.
        infrared: usize,
        /// Number of visible samples.
        visible: usize,
    },

    /// Error indicating invalid input.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// A message describing the invalid input.
        message: String,
    },

    /// Error indicating a configuration problem.
    #[error("configuration: {message}")]
    ConfigError {
        /// A message describing the configuration error.
        message: String,
    },

    /// IO error.
    #[error("io")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("json")]
    Json(#[from] serde_json::Error),
}

impl From<crate::core::config::ConfigError> for FusionError {
    fn from(error: crate::core::config::ConfigError) -> Self {
        Self::ConfigError {
            message: error.to_string(),
        }
    }
}
