//! Indexed access to prepared samples.

use super::container::{ArchiveKind, PatchArchive};
use super::preparer::DatasetPreparer;
use crate::core::config::PatchConfig;
use crate::core::errors::{FusionError, FusionResult};
use crate::processors::NormalizeImage;
use candle_core::Tensor;
use std::path::Path;

/// A prepared infrared or visible dataset.
///
/// Samples stay as `u8` arrays in memory and are normalised on access, so
/// `get` returns fresh `(1, H, W)` f32 CPU tensors for the input and label.
#[derive(Debug, Clone)]
pub struct FusionDataset {
    archive: PatchArchive,
    normalizer: NormalizeImage,
}

impl FusionDataset {
    pub fn from_archive(archive: PatchArchive, normalizer: NormalizeImage) -> Self {
        Self {
            archive,
            normalizer,
        }
    }

    /// Prepares (or loads from cache) the samples under `source_dir`.
    pub fn open(
        preparer: &DatasetPreparer,
        source_dir: &Path,
        kind: ArchiveKind,
    ) -> FusionResult<Self> {
        let archive = preparer.prepare(source_dir, kind)?;
        Ok(Self::from_archive(archive, NormalizeImage::for_fusion()))
    }

    pub fn len(&self) -> usize {
        self.archive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archive.is_empty()
    }

    pub fn kind(&self) -> ArchiveKind {
        self.archive.kind
    }

    pub fn geometry(&self) -> &PatchConfig {
        &self.archive.geometry
    }

    /// `(height, width)` of the input at `idx`, if it exists.
    pub fn sample_shape(&self, idx: usize) -> Option<(usize, usize)> {
        self.archive.data.get(idx).map(|a| {
            let (h, w, _) = a.dim();
            (h, w)
        })
    }

    /// Returns the normalised `(input, label)` pair at `idx`.
    ///
    /// # Errors
    ///
    /// Returns `FusionError::InvalidInput` if `idx` is out of range.
    pub fn get(&self, idx: usize) -> FusionResult<(Tensor, Tensor)> {
        let (Some(input), Some(label)) = (self.archive.data.get(idx), self.archive.label.get(idx))
        else {
            return Err(FusionError::invalid_input(format!(
                "sample index {idx} out of range for a dataset of {}",
                self.len()
            )));
        };
        Ok((
            self.normalizer.normalize(input.view())?,
            self.normalizer.normalize(label.view())?,
        ))
    }
}
