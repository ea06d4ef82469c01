//! Generator and discriminator networks.
//!
//! Both networks are plain candle modules whose parameters live in their own
//! [`VarMap`], so each optimizer sees only the weights it is meant to update
//! and each network checkpoints to its own file.

pub mod discriminator;
pub mod generator;

pub use discriminator::Discriminator;
pub use generator::{GENERATOR_INPUT_CHANNELS, Generator, center_crop};

use crate::core::config::{ConfigValidator, ModelConfig, PatchConfig};
use crate::core::errors::{FusionError, FusionResult};
use candle_core::{DType, Device};
use candle_nn::{VarBuilder, VarMap};

/// The generator/discriminator pair with their parameter stores.
pub struct FusionNetworks {
    pub generator: Generator,
    pub discriminator: Discriminator,
    generator_vars: VarMap,
    discriminator_vars: VarMap,
    device: Device,
}

impl FusionNetworks {
    /// Creates freshly initialised networks on `device`.
    ///
    /// The generator crops `patch.patch_size - patch.label_size` pixels so its
    /// output lines up with the label window.
    pub fn new(model: &ModelConfig, patch: &PatchConfig, device: &Device) -> FusionResult<Self> {
        model.validate()?;
        patch.validate()?;
        let generator_vars = VarMap::new();
        let discriminator_vars = VarMap::new();

        let generator = Generator::new(
            model,
            patch.border(),
            VarBuilder::from_varmap(&generator_vars, DType::F32, device),
        )
        .map_err(|e| FusionError::tensor_operation("build generator", e))?;
        let discriminator = Discriminator::new(
            model,
            VarBuilder::from_varmap(&discriminator_vars, DType::F32, device),
        )
        .map_err(|e| FusionError::tensor_operation("build discriminator", e))?;

        Ok(Self {
            generator,
            discriminator,
            generator_vars,
            discriminator_vars,
            device: device.clone(),
        })
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn generator_vars(&self) -> &VarMap {
        &self.generator_vars
    }

    pub fn discriminator_vars(&self) -> &VarMap {
        &self.discriminator_vars
    }

    pub fn generator_vars_mut(&mut self) -> &mut VarMap {
        &mut self.generator_vars
    }

    pub fn discriminator_vars_mut(&mut self) -> &mut VarMap {
        &mut self.discriminator_vars
    }

    /// Total number of trainable scalars in both networks.
    pub fn parameter_count(&self) -> usize {
        self.generator_vars
            .all_vars()
            .iter()
            .chain(self.discriminator_vars.all_vars().iter())
            .map(|v| v.elem_count())
            .sum()
    }
}
