//! # Fusion GAN
//!
//! Trains a generative adversarial network that fuses co-registered infrared
//! and visible-light grayscale images into one image keeping the thermal
//! intensity of the infrared source and the texture of the visible one.
//!
//! ## Pipeline
//!
//! 1. Images are cut into overlapping patches with a centred label window,
//!    or padded whole for evaluation, and cached as safetensors archives.
//! 2. Samples are normalised to `[-1, 1]` and batched in aligned IR/VI pairs.
//! 3. A convolutional generator maps the stacked pair to a fused image; a
//!    discriminator scores fused images against visible ones.
//! 4. Both networks are trained alternately with Adam, a least-squares
//!    adversarial loss with soft labels, and an intensity plus Sobel-gradient
//!    content loss for the generator.
//!
//! ## Modules
//!
//! * [`core`] - Configuration, constants, error handling, and logging setup
//! * [`dataset`] - Patch caching, indexed access, and paired batching
//! * [`models`] - Generator and discriminator networks
//! * [`processors`] - Normalisation, patch extraction, and the Sobel operator
//! * [`train`] - Losses, the training loop, checkpoints, and inference
//! * [`utils`] - Image loading and device selection
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fusion_gan::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TrainConfig::default();
//! let device = parse_device(&config.device)?;
//!
//! let preparer = DatasetPreparer::new(config.patch, &config.checkpoint_dir)?;
//! let ir = FusionDataset::open(&preparer, &config.ir_dir, ArchiveKind::Train)?;
//! let vi = FusionDataset::open(&preparer, &config.vi_dir, ArchiveKind::Train)?;
//! let mut loader = PairedLoader::new(&ir, &vi, config.batch_size, config.shuffle, config.seed)?;
//!
//! let nets = FusionNetworks::new(&config.model, &config.patch, &device)?;
//! let mut trainer = FusionTrainer::new(config, nets)?;
//! let result = trainer.train(&mut loader)?;
//! println!("finished after epoch {}", result.final_epoch);
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod dataset;
pub mod models;
pub mod processors;
pub mod train;
pub mod utils;

/// Prelude module for convenient imports.
///
/// ```rust
/// use fusion_gan::prelude::*;
/// ```
///
/// Covers the types needed to prepare data, train, and fuse. Lower level
/// pieces (loss functions, patch extraction) live in their own modules.
pub mod prelude {
    // Configuration
    pub use crate::core::config::{ConfigValidator, TrainConfig};

    // Data
    pub use crate::dataset::{ArchiveKind, DatasetPreparer, FusionDataset, PairedLoader};

    // Training and inference
    pub use crate::models::FusionNetworks;
    pub use crate::train::{CheckpointStore, FusionTrainer, ImageFuser, TrainResult};

    // Error Handling
    pub use crate::core::{FusionError, FusionResult};

    // Utilities
    pub use crate::utils::{load_gray_image, parse_device};
}
