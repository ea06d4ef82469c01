//! Whole-image fusion with a trained generator.

use super::checkpoint::CheckpointStore;
use crate::core::config::{ModelConfig, PatchConfig};
use crate::core::errors::{FusionError, FusionResult};
use crate::models::FusionNetworks;
use crate::processors::{NormalizeImage, PatchExtractor};
use crate::utils::{discover_images, load_gray_image};
use candle_core::{Device, Module, Tensor};
use image::GrayImage;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Fuses infrared/visible image pairs of any size.
///
/// Inputs are padded the same way as evaluation samples, so the generator's
/// crop brings the output back to the source resolution.
pub struct ImageFuser {
    nets: FusionNetworks,
    extractor: PatchExtractor,
    normalizer: NormalizeImage,
}

impl ImageFuser {
    /// Wraps already built networks.
    pub fn new(nets: FusionNetworks, patch: PatchConfig) -> FusionResult<Self> {
        Ok(Self {
            nets,
            extractor: PatchExtractor::new(patch)?,
            normalizer: NormalizeImage::for_fusion(),
        })
    }

    /// Builds the generator described by `model` and `patch` and loads its
    /// weights from a `G_{epoch}.safetensors` file.
    pub fn from_checkpoint(
        model: &ModelConfig,
        patch: PatchConfig,
        generator_path: &Path,
        device: &Device,
    ) -> FusionResult<Self> {
        let mut nets = FusionNetworks::new(model, &patch, device)?;
        CheckpointStore::load_generator(generator_path, &mut nets)?;
        info!("Loaded generator from {}", generator_path.display());
        Self::new(nets, patch)
    }

    /// Fuses one pair. Both images must have the same dimensions.
    pub fn fuse(&self, infrared: &GrayImage, visible: &GrayImage) -> FusionResult<GrayImage> {
        fuse_pair(
            &self.nets,
            &self.extractor,
            &self.normalizer,
            infrared,
            visible,
        )
    }

    /// Fuses every pair found in two directories and writes `<stem>.png`
    /// files named after the infrared images into `out_dir`.
    ///
    /// Pairs are matched by their position in the numerically sorted listings.
    pub fn fuse_directories(
        &self,
        ir_dir: &Path,
        vi_dir: &Path,
        out_dir: &Path,
    ) -> FusionResult<Vec<PathBuf>> {
        let ir_paths = discover_images(ir_dir)?;
        let vi_paths = discover_images(vi_dir)?;
        if ir_paths.len() != vi_paths.len() {
            return Err(FusionError::DatasetMismatch {
                infrared: ir_paths.len(),
                visible: vi_paths.len(),
            });
        }
        std::fs::create_dir_all(out_dir)?;

        let mut written = Vec::with_capacity(ir_paths.len());
        for (ir_path, vi_path) in ir_paths.iter().zip(&vi_paths) {
            let fused = self.fuse(&load_gray_image(ir_path)?, &load_gray_image(vi_path)?)?;
            let stem = ir_path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| written.len().to_string());
            let out_path = out_dir.join(format!("{stem}.png"));
            fused.save(&out_path).map_err(FusionError::ImageLoad)?;
            debug!("Fused {} -> {}", ir_path.display(), out_path.display());
            written.push(out_path);
        }
        info!("Wrote {} fused images to {}", written.len(), out_dir.display());
        Ok(written)
    }
}

/// Pads both images with the evaluation border, runs the generator, and maps
/// the output back to an 8-bit image of the source size.
pub(crate) fn fuse_pair(
    nets: &FusionNetworks,
    extractor: &PatchExtractor,
    normalizer: &NormalizeImage,
    infrared: &GrayImage,
    visible: &GrayImage,
) -> FusionResult<GrayImage> {
    if infrared.dimensions() != visible.dimensions() {
        return Err(FusionError::invalid_input(format!(
            "infrared image is {:?} but visible image is {:?}",
            infrared.dimensions(),
            visible.dimensions()
        )));
    }
    let prepare = |image: &GrayImage| -> FusionResult<Tensor> {
        let padded = extractor.pad_whole(image).input;
        Ok(normalizer.normalize(padded.view())?.unsqueeze(0)?)
    };
    let input = Tensor::cat(&[&prepare(infrared)?, &prepare(visible)?], 1)?
        .to_device(nets.device())?;
    let fused = nets
        .generator
        .forward(&input)
        .map_err(|e| FusionError::tensor_operation("generator forward", e))?;
    normalizer.denormalize(&fused)
}
