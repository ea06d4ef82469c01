//! Configuration management for the fusion pipeline.
//!
//! This module provides configuration types, validation traits, and JSON
//! loading for training, evaluation, and fusion runs.

pub mod errors;
pub mod training;

pub use errors::{ConfigError, ConfigValidator};
pub use training::{
    LossConfig, ModelConfig, OptimizerConfig, PatchConfig, SoftLabel, TrainConfig,
};
