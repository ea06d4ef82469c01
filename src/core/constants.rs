//! Constants used throughout the fusion pipeline.
//!
//! Default hyper-parameters, file names, and processing limits shared by the
//! dataset preparer, the trainer, and the command-line interface.

/// The default number of patch pairs per mini-batch.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// The default side length of a square input patch.
pub const DEFAULT_PATCH_SIZE: usize = 160;

/// The default side length of the square label window.
///
/// The label is centred inside the input patch, so the generator output loses
/// `(patch - label) / 2` pixels on each side.
pub const DEFAULT_LABEL_SIZE: usize = 152;

/// The default step between consecutive patch origins.
pub const DEFAULT_STRIDE_SIZE: usize = 60;

/// The default number of training epochs.
pub const DEFAULT_EPOCHS: usize = 30;

/// Epochs between loss reports and weight checkpoints.
pub const DEFAULT_LOG_INTERVAL: usize = 5;

/// Batches between generator updates. The discriminator steps on every batch.
pub const DEFAULT_GENERATOR_INTERVAL: usize = 2;

/// Gray level used to pad whole images for evaluation and fusion.
pub const PAD_VALUE: u8 = 127;

/// Image extensions picked up when scanning a dataset directory.
///
/// Matching is case-insensitive.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["bmp", "tif", "jpg", "png"];

/// Cache file for the patched training set.
pub const TRAIN_CACHE_FILE: &str = "train.safetensors";

/// Cache file for the padded evaluation set.
pub const TEST_CACHE_FILE: &str = "test.safetensors";

/// Version written into patch container metadata.
pub const CONTAINER_FORMAT_VERSION: &str = "1";

/// Training history written next to the checkpoints.
pub const HISTORY_FILE: &str = "history.json";

/// File name of the log written under the log directory.
pub const LOG_FILE: &str = "fusion-gan.log";

/// The default threshold for parallel processing.
///
/// This constant defines the minimum number of items that need
/// to be processed before parallel processing is used.
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 4;
