//! Training configuration.
//!
//! The configuration is split into sections that mirror the pipeline stages:
//! [`PatchConfig`] for dataset preparation, [`ModelConfig`] for the networks,
//! [`OptimizerConfig`] for Adam, and [`LossConfig`] for the loss weights and
//! soft adversarial labels. [`TrainConfig`] ties them together with the run
//! level settings (directories, epochs, intervals).
//!
//! Every section deserializes from JSON with missing fields falling back to
//! their defaults:
//!
//! ```rust
//! use fusion_gan::core::config::TrainConfig;
//!
//! let config: TrainConfig = serde_json::from_str(r#"
//! {
//!   "epochs": 10,
//!   "patch": { "patch_size": 64, "label_size": 56 }
//! }
//! "#).unwrap();
//!
//! assert_eq!(config.epochs, 10);
//! assert_eq!(config.patch.stride_size, 60);
//! assert_eq!(config.batch_size, 32);
//! ```

use super::errors::{ConfigError, ConfigValidator};
use crate::core::constants::*;
use crate::core::errors::FusionResult;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Geometry of the patches cut from source images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchConfig {
    /// Side length of the square generator input patch.
    pub patch_size: usize,
    /// Side length of the square label window centred in the patch.
    pub label_size: usize,
    /// Step between consecutive patch origins, in pixels.
    pub stride_size: usize,
}

impl PatchConfig {
    /// Total border removed by the generator, `patch_size - label_size`.
    pub fn border(&self) -> usize {
        self.patch_size.saturating_sub(self.label_size)
    }

    /// Offset of the label window inside a patch.
    pub fn label_offset(&self) -> usize {
        self.border() / 2
    }
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            patch_size: DEFAULT_PATCH_SIZE,
            label_size: DEFAULT_LABEL_SIZE,
            stride_size: DEFAULT_STRIDE_SIZE,
        }
    }
}

impl ConfigValidator for PatchConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.validate_positive(self.patch_size, "patch_size")?;
        self.validate_positive(self.label_size, "label_size")?;
        self.validate_positive(self.stride_size, "stride_size")?;
        if self.label_size > self.patch_size {
            return Err(ConfigError::InvalidConfig {
                message: format!(
                    "label_size ({}) must not exceed patch_size ({})",
                    self.label_size, self.patch_size
                ),
            });
        }
        Ok(())
    }

    fn get_defaults() -> Self {
        Self::default()
    }
}

/// Layer widths of the generator and discriminator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Output channels of each hidden generator convolution.
    pub generator_channels: Vec<usize>,
    /// Output channels of each stride-2 discriminator convolution.
    pub discriminator_channels: Vec<usize>,
    /// Square kernel size shared by all convolutions. Must be odd.
    pub kernel_size: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            generator_channels: vec![64, 32, 16],
            discriminator_channels: vec![32, 64, 128, 256],
            kernel_size: 3,
        }
    }
}

impl ConfigValidator for ModelConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.generator_channels.is_empty() || self.discriminator_channels.is_empty() {
            return Err(ConfigError::InvalidConfig {
                message: "generator_channels and discriminator_channels must not be empty"
                    .to_string(),
            });
        }
        for &c in self
            .generator_channels
            .iter()
            .chain(&self.discriminator_channels)
        {
            self.validate_positive(c, "channel count")?;
        }
        if self.kernel_size % 2 == 0 {
            return Err(ConfigError::InvalidConfig {
                message: format!("kernel_size must be odd, got {}", self.kernel_size),
            });
        }
        Ok(())
    }

    fn get_defaults() -> Self {
        Self::default()
    }
}

/// Adam hyper-parameters, shared by both networks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub eps: f64,
    /// Decoupled weight decay. Zero gives plain Adam.
    pub weight_decay: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            weight_decay: 0.0,
        }
    }
}

impl ConfigValidator for OptimizerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ConfigError::InvalidConfig {
                message: format!("learning_rate must be positive, got {}", self.learning_rate),
            });
        }
        self.validate_f64_range(self.beta1, 0.0, 1.0, "beta1")?;
        self.validate_f64_range(self.beta2, 0.0, 1.0, "beta2")?;
        self.validate_f64_range(self.eps, 0.0, 1.0, "eps")?;
        self.validate_f64_range(self.weight_decay, 0.0, 1.0, "weight_decay")?;
        Ok(())
    }

    fn get_defaults() -> Self {
        Self::default()
    }
}

/// A half-open range `[low, high)` that soft adversarial targets are drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SoftLabel {
    pub low: f64,
    pub high: f64,
}

impl SoftLabel {
    pub const fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }
}

/// Loss weights and soft labels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LossConfig {
    /// Weight of the content loss in the generator objective.
    pub content_weight: f64,
    /// Weight of the Sobel gradient term inside the content loss.
    pub gradient_weight: f64,
    /// Target range for discriminator scores on fused images.
    pub fake_label: SoftLabel,
    /// Target range for discriminator scores on visible images, also the
    /// generator's adversarial target.
    pub real_label: SoftLabel,
}

impl Default for LossConfig {
    fn default() -> Self {
        Self {
            content_weight: 100.0,
            gradient_weight: 5.0,
            fake_label: SoftLabel::new(0.0, 0.3),
            real_label: SoftLabel::new(0.7, 1.2),
        }
    }
}

impl ConfigValidator for LossConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        for (name, weight) in [
            ("content_weight", self.content_weight),
            ("gradient_weight", self.gradient_weight),
        ] {
            if !(weight.is_finite() && weight >= 0.0) {
                return Err(ConfigError::InvalidConfig {
                    message: format!("{name} must be a non-negative number, got {weight}"),
                });
            }
        }
        for (name, label) in [("fake_label", self.fake_label), ("real_label", self.real_label)] {
            if !(label.low.is_finite() && label.high.is_finite() && label.low < label.high) {
                return Err(ConfigError::InvalidConfig {
                    message: format!(
                        "{name} must satisfy low < high, got [{}, {})",
                        label.low, label.high
                    ),
                });
            }
        }
        Ok(())
    }

    fn get_defaults() -> Self {
        Self::default()
    }
}

/// Complete configuration of a training, evaluation, or fusion run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Directory holding the infrared source images.
    pub ir_dir: PathBuf,
    /// Directory holding the visible-light source images.
    pub vi_dir: PathBuf,
    /// Directory for patch caches, checkpoints, and the training history.
    pub checkpoint_dir: PathBuf,
    /// Directory for the log file.
    pub log_dir: PathBuf,
    pub batch_size: usize,
    pub epochs: usize,
    /// Epochs between loss reports and checkpoints.
    pub log_interval: usize,
    /// Batches between generator updates.
    pub generator_interval: usize,
    /// Shuffle patch order every epoch.
    pub shuffle: bool,
    /// Seed for shuffling. `None` seeds from entropy.
    pub seed: Option<u64>,
    /// Compute device: `auto`, `cpu`, `cuda`, or `cuda:N`.
    pub device: String,
    pub patch: PatchConfig,
    pub model: ModelConfig,
    pub optimizer: OptimizerConfig,
    pub loss: LossConfig,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            ir_dir: PathBuf::from("./Train_ir"),
            vi_dir: PathBuf::from("./Train_vi"),
            checkpoint_dir: PathBuf::from("./checkpoint"),
            log_dir: PathBuf::from("./log"),
            batch_size: DEFAULT_BATCH_SIZE,
            epochs: DEFAULT_EPOCHS,
            log_interval: DEFAULT_LOG_INTERVAL,
            generator_interval: DEFAULT_GENERATOR_INTERVAL,
            shuffle: true,
            seed: None,
            device: "auto".to_string(),
            patch: PatchConfig::default(),
            model: ModelConfig::default(),
            optimizer: OptimizerConfig::default(),
            loss: LossConfig::default(),
        }
    }
}

impl TrainConfig {
    /// Loads a configuration from a JSON file.
    ///
    /// Fields missing from the file keep their defaults. The result is not
    /// validated; call [`ConfigValidator::validate`] once all overrides are in.
    pub fn from_json_file(path: impl AsRef<Path>) -> FusionResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl ConfigValidator for TrainConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.validate_batch_size(self.batch_size)?;
        self.validate_positive(self.epochs, "epochs")?;
        self.validate_positive(self.log_interval, "log_interval")?;
        self.validate_positive(self.generator_interval, "generator_interval")?;
        self.patch.validate()?;
        self.model.validate()?;
        self.optimizer.validate()?;
        self.loss.validate()?;
        Ok(())
    }

    fn get_defaults() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = TrainConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.patch.patch_size, 160);
        assert_eq!(config.patch.label_size, 152);
        assert_eq!(config.patch.stride_size, 60);
        assert_eq!(config.epochs, 30);
        assert_eq!(config.log_interval, 5);
        assert_eq!(config.generator_interval, 2);
    }

    #[test]
    fn test_patch_geometry() {
        let patch = PatchConfig {
            patch_size: 33,
            label_size: 24,
            stride_size: 10,
        };
        assert_eq!(patch.border(), 9);
        assert_eq!(patch.label_offset(), 4);
    }

    #[test]
    fn test_label_larger_than_patch_is_rejected() {
        let patch = PatchConfig {
            patch_size: 32,
            label_size: 40,
            stride_size: 8,
        };
        assert!(patch.validate().is_err());
    }

    #[test]
    fn test_zero_intervals_are_rejected() {
        let config = TrainConfig {
            generator_interval: 0,
            ..TrainConfig::default()
        };
        assert!(config.validate().is_err());

        let config = TrainConfig {
            log_interval: 0,
            ..TrainConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_even_kernel_is_rejected() {
        let model = ModelConfig {
            kernel_size: 4,
            ..ModelConfig::default()
        };
        assert!(model.validate().is_err());
    }

    #[test]
    fn test_inverted_soft_label_is_rejected() {
        let loss = LossConfig {
            real_label: SoftLabel::new(1.2, 0.7),
            ..LossConfig::default()
        };
        assert!(loss.validate().is_err());
    }

    #[test]
    fn test_from_json_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "batch_size": 8, "seed": 7, "loss": {{ "content_weight": 50.0 }} }}"#
        )
        .unwrap();

        let config = TrainConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.batch_size, 8);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.loss.content_weight, 50.0);
        assert_eq!(config.loss.gradient_weight, 5.0);
        assert_eq!(config.device, "auto");
    }
}
