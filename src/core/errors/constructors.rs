//! Ergonomic constructors for [`FusionError`].
//!
//! These keep call sites short while still attaching the processing stage and
//! the underlying cause:
//!
//! ```rust
//! use fusion_gan::core::FusionError;
//!
//! let error = FusionError::checkpoint(
//!     "write G_5.safetensors",
//!     std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
//! );
//! assert_eq!(error.to_string(), "checkpoint failed: write G_5.safetensors");
//! ```

use super::types::{FusionError, OpaqueError, ProcessingStage};
use std::path::Path;

impl FusionError {
    #[inline]
    fn processing_with_context(
        kind: ProcessingStage,
        context: impl Into<String>,
        error: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Processing {
            kind,
            context: context.into(),
            source: Box::new(error),
        }
    }

    /// Creates an error for tensor operations.
    pub fn tensor_operation(
        context: &str,
        error: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::processing_with_context(ProcessingStage::TensorOperation, context, error)
    }

    /// Creates an error for normalization operations.
    pub fn normalization(
        context: &str,
        error: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::processing_with_context(ProcessingStage::Normalization, context, error)
    }

    /// Creates an error for patch extraction or padding.
    pub fn patching(context: &str, error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::processing_with_context(ProcessingStage::Patching, context, error)
    }

    /// Creates an error raised inside the training loop.
    pub fn training(context: &str, error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::processing_with_context(ProcessingStage::Training, context, error)
    }

    /// Creates an error for saving or loading model weights.
    pub fn checkpoint(
        context: &str,
        error: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::processing_with_context(ProcessingStage::Checkpoint, context, error)
    }

    /// Creates a processing error that has no underlying cause.
    ///
    /// # Arguments
    ///
    /// * `kind` - The stage of processing where the error occurred.
    /// * `context` - What was being attempted.
    /// * `message` - What went wrong.
    pub fn processing_message(
        kind: ProcessingStage,
        context: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::processing_with_context(kind, context, OpaqueError(message.into()))
    }

    /// Creates an error for a malformed patch container.
    pub fn container(path: &Path, message: impl Into<String>) -> Self {
        Self::Container {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    /// Creates an error for invalid input.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Creates an error for configuration problems.
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }
}
