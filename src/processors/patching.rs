//! Patch extraction and padding.
//!
//! Training samples are square windows cut from each source image on a fixed
//! stride. The label of a window is its centred `label_size` sub-window, which
//! is what the generator is expected to reproduce after its border crop.
//!
//! Evaluation and fusion work on whole images instead. The image is padded with
//! a constant gray so that, after the generator removes its border, the output
//! lines up with the original pixels.

use crate::core::config::{ConfigValidator, PatchConfig};
use crate::core::constants::PAD_VALUE;
use crate::core::errors::{FusionError, FusionResult};
use crate::utils::gray_to_array;
use image::GrayImage;
use ndarray::{Array2, Array3, Axis, s};

/// One input window and its centred label, both `(H, W, 1)`.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchPair {
    pub input: Array3<u8>,
    pub label: Array3<u8>,
}

/// Cuts images into patch pairs according to a [`PatchConfig`].
#[derive(Debug, Clone, Copy)]
pub struct PatchExtractor {
    config: PatchConfig,
}

impl PatchExtractor {
    /// Creates an extractor, rejecting geometries with a zero size or a label
    /// larger than the patch.
    pub fn new(config: PatchConfig) -> FusionResult<Self> {
        config
            .validate()
            .map_err(|e| FusionError::patching("invalid patch geometry", e))?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PatchConfig {
        &self.config
    }

    /// Origins `(row, col)` of every training window in an image of the given size.
    ///
    /// Rows run over `0..height - patch_size` and columns over
    /// `0..width - patch_size` in steps of `stride_size`. Both upper bounds are
    /// exclusive, so an image no larger than one patch yields nothing.
    pub fn patch_origins(&self, height: usize, width: usize) -> Vec<(usize, usize)> {
        let PatchConfig {
            patch_size,
            stride_size,
            ..
        } = self.config;
        if height <= patch_size || width <= patch_size {
            return Vec::new();
        }

        (0..height - patch_size)
            .step_by(stride_size)
            .flat_map(|row| {
                (0..width - patch_size)
                    .step_by(stride_size)
                    .map(move |col| (row, col))
            })
            .collect()
    }

    /// Extracts every training patch pair of one image, row-major by origin.
    pub fn extract(&self, image: &GrayImage) -> Vec<PatchPair> {
        let pixels = gray_to_array(image);
        let (height, width) = pixels.dim();
        let PatchConfig {
            patch_size,
            label_size,
            ..
        } = self.config;
        let offset = self.config.label_offset();

        self.patch_origins(height, width)
            .into_iter()
            .map(|(row, col)| {
                let input = pixels
                    .slice(s![row..row + patch_size, col..col + patch_size])
                    .to_owned();
                let label = pixels
                    .slice(s![
                        row + offset..row + offset + label_size,
                        col + offset..col + offset + label_size
                    ])
                    .to_owned();
                PatchPair {
                    input: input.insert_axis(Axis(2)),
                    label: label.insert_axis(Axis(2)),
                }
            })
            .collect()
    }

    /// Builds the whole-image pair used for evaluation.
    ///
    /// The input is the image padded with [`PAD_VALUE`]; the label is the
    /// unpadded image.
    pub fn pad_whole(&self, image: &GrayImage) -> PatchPair {
        let pixels = gray_to_array(image);
        PatchPair {
            input: pad_constant(&pixels, self.config.border(), PAD_VALUE).insert_axis(Axis(2)),
            label: pixels.insert_axis(Axis(2)),
        }
    }
}

/// Pads a 2D array by `border` pixels in total per axis.
///
/// `border / 2` goes on the top and left, the remainder on the bottom and right.
pub fn pad_constant(pixels: &Array2<u8>, border: usize, value: u8) -> Array2<u8> {
    let (height, width) = pixels.dim();
    let before = border / 2;
    let mut padded = Array2::from_elem((height + border, width + border), value);
    padded
        .slice_mut(s![before..before + height, before..before + width])
        .assign(pixels);
    padded
}
