//! Error types for the fusion training pipeline.
//!
//! Every fallible operation in the crate returns [`FusionResult`]. Errors carry
//! the processing stage they came from and keep the underlying cause in the
//! source chain, so `main` can print the whole chain on failure.
//!
//! # Usage
//!
//! ```rust
//! use fusion_gan::core::errors::{FusionError, ProcessingStage};
//!
//! let error = FusionError::patching(
//!     "image 3 is smaller than the patch size",
//!     std::io::Error::new(std::io::ErrorKind::InvalidData, "too small"),
//! );
//! assert!(matches!(
//!     error,
//!     FusionError::Processing { kind: ProcessingStage::Patching, .. }
//! ));
//!
//! let config_error = FusionError::config_error("label_size must not exceed patch_size");
//! assert!(config_error.to_string().contains("label_size"));
//! ```

pub mod constructors;
pub mod types;

pub use types::{FusionError, OpaqueError, ProcessingStage};

/// Convenient result alias for fusion operations.
pub type FusionResult<T> = Result<T, FusionError>;
