//! Image normalization for the fusion networks.
//!
//! Samples are stored as `(H, W, C)` u8 arrays. Before they reach the networks
//! they are scaled to `[0, 1]` and shifted by a per-channel mean and std, then
//! laid out channel-first. With the fusion defaults (scale 1/255, mean 0.5,
//! std 0.5) pixel 0 maps to -1 and pixel 255 maps to 1, matching the `tanh`
//! range of the generator output.

use crate::core::FusionError;
use candle_core::{DType, Device, Tensor};
use image::GrayImage;
use ndarray::ArrayView3;

/// Normalizes image arrays into network input tensors.
///
/// `alpha` and `beta` are precomputed so that each value is mapped as
/// `pixel * alpha + beta`.
#[derive(Debug, Clone)]
pub struct NormalizeImage {
    /// Scaling factors for each channel (alpha = scale / std)
    pub alpha: Vec<f32>,
    /// Offset values for each channel (beta = -mean / std)
    pub beta: Vec<f32>,
}

impl NormalizeImage {
    /// Creates a new NormalizeImage instance with the specified parameters.
    ///
    /// # Arguments
    ///
    /// * `scale` - Optional scaling factor (defaults to 1.0/255.0)
    /// * `mean` - Optional mean values for each channel (defaults to [0.5])
    /// * `std` - Optional standard deviation values for each channel (defaults to [0.5])
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// * Scale is less than or equal to 0
    /// * Mean and std are empty or differ in length
    /// * Any standard deviation value is less than or equal to 0
    pub fn new(
        scale: Option<f32>,
        mean: Option<Vec<f32>>,
        std: Option<Vec<f32>>,
    ) -> Result<Self, FusionError> {
        let scale = scale.unwrap_or(1.0 / 255.0);
        let mean = mean.unwrap_or_else(|| vec![0.5]);
        let std = std.unwrap_or_else(|| vec![0.5]);

        if scale <= 0.0 {
            return Err(FusionError::ConfigError {
                message: "Scale must be greater than 0".to_string(),
            });
        }

        if mean.is_empty() || mean.len() != std.len() {
            return Err(FusionError::ConfigError {
                message: format!(
                    "Mean and std must be non-empty and of equal length, got {} and {}",
                    mean.len(),
                    std.len()
                ),
            });
        }

        for (i, &s) in std.iter().enumerate() {
            if s <= 0.0 {
                return Err(FusionError::ConfigError {
                    message: format!(
                        "Standard deviation at index {i} must be greater than 0, got {s}"
                    ),
                });
            }
        }

        let alpha: Vec<f32> = std.iter().map(|s| scale / s).collect();
        let beta: Vec<f32> = mean.iter().zip(&std).map(|(m, s)| -m / s).collect();

        Ok(Self { alpha, beta })
    }

    /// Single-channel normalization to `[-1, 1]` used for all fusion inputs.
    pub fn for_fusion() -> Self {
        Self {
            alpha: vec![2.0 / 255.0],
            beta: vec![-1.0],
        }
    }

    /// Number of channels this normalizer expects.
    pub fn channels(&self) -> usize {
        self.alpha.len()
    }

    /// Normalizes an `(H, W, C)` array into a `(C, H, W)` f32 tensor on the CPU.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel count does not match the normalizer.
    pub fn normalize(&self, array: ArrayView3<'_, u8>) -> Result<Tensor, FusionError> {
        let (height, width, channels) = array.dim();
        if channels != self.channels() {
            return Err(FusionError::InvalidInput {
                message: format!(
                    "expected {} channel(s), got {} in a {}x{} sample",
                    self.channels(),
                    channels,
                    height,
                    width
                ),
            });
        }

        let mut data = Vec::with_capacity(channels * height * width);
        for c in 0..channels {
            let (alpha, beta) = (self.alpha[c], self.beta[c]);
            for y in 0..height {
                for x in 0..width {
                    data.push(array[[y, x, c]] as f32 * alpha + beta);
                }
            }
        }

        Tensor::from_vec(data, (channels, height, width), &Device::Cpu)
            .map_err(|e| FusionError::normalization("build sample tensor", e))
    }

    /// Maps a single-channel network output back to an 8-bit image.
    ///
    /// Accepts tensors of shape `(H, W)`, `(1, H, W)`, or `(1, 1, H, W)` on any
    /// device. Values are rounded and clamped to `0..=255`.
    pub fn denormalize(&self, tensor: &Tensor) -> Result<GrayImage, FusionError> {
        if self.channels() != 1 {
            return Err(FusionError::config_error(
                "denormalize only supports single-channel normalizers",
            ));
        }

        let dims = tensor.dims();
        let leading: usize = dims.iter().rev().skip(2).product();
        if dims.len() < 2 || leading != 1 {
            return Err(FusionError::InvalidInput {
                message: format!("expected a single 2D plane, got shape {:?}", dims),
            });
        }
        let (height, width) = (dims[dims.len() - 2], dims[dims.len() - 1]);

        let values = tensor
            .flatten_all()
            .and_then(|t| t.to_dtype(DType::F32))
            .and_then(|t| t.to_vec1::<f32>())
            .map_err(|e| FusionError::normalization("read output tensor", e))?;

        let (alpha, beta) = (self.alpha[0], self.beta[0]);
        let pixels: Vec<u8> = values
            .iter()
            .map(|v| ((v - beta) / alpha).round().clamp(0.0, 255.0) as u8)
            .collect();

        GrayImage::from_raw(width as u32, height as u32, pixels).ok_or_else(|| {
            FusionError::invalid_input(format!("cannot build a {width}x{height} image"))
        })
    }
}

impl Default for NormalizeImage {
    fn default() -> Self {
        Self::for_fusion()
    }
}
