//! Fusion generator.

use crate::core::config::ModelConfig;
use candle_core::{Module, Result, Tensor};
use candle_nn::{Conv2d, Conv2dConfig, VarBuilder};

/// Infrared and visible inputs, stacked on the channel axis.
pub const GENERATOR_INPUT_CHANNELS: usize = 2;

pub(crate) const LEAKY_SLOPE: f64 = 0.2;

pub(crate) fn leaky_relu(xs: &Tensor) -> Result<Tensor> {
    xs.maximum(&(xs * LEAKY_SLOPE)?)
}

/// Removes `border` pixels from each spatial axis, `border / 2` from the
/// leading edge and the rest from the trailing edge.
pub fn center_crop(xs: &Tensor, border: usize) -> Result<Tensor> {
    if border == 0 {
        return Ok(xs.clone());
    }
    let (_, _, height, width) = xs.dims4()?;
    if height <= border || width <= border {
        return Err(candle_core::Error::Msg(format!(
            "cannot crop a {height}x{width} map by {border} pixels"
        )));
    }
    let offset = border / 2;
    xs.narrow(2, offset, height - border)?
        .narrow(3, offset, width - border)
}

/// Same-padding convolution stack mapping `(B, 2, H, W)` to a fused
/// `(B, 1, H - crop, W - crop)` image in `[-1, 1]`.
#[derive(Debug, Clone)]
pub struct Generator {
    hidden: Vec<Conv2d>,
    output: Conv2d,
    crop: usize,
}

impl Generator {
    /// Builds the generator; `crop` is `patch_size - label_size`.
    pub fn new(config: &ModelConfig, crop: usize, vb: VarBuilder) -> Result<Self> {
        let conv_cfg = Conv2dConfig {
            padding: config.kernel_size / 2,
            ..Default::default()
        };

        let mut hidden = Vec::with_capacity(config.generator_channels.len());
        let mut in_channels = GENERATOR_INPUT_CHANNELS;
        for (i, &out_channels) in config.generator_channels.iter().enumerate() {
            hidden.push(candle_nn::conv2d(
                in_channels,
                out_channels,
                config.kernel_size,
                conv_cfg,
                vb.pp(format!("conv{i}")),
            )?);
            in_channels = out_channels;
        }
        let output = candle_nn::conv2d(in_channels, 1, config.kernel_size, conv_cfg, vb.pp("out"))?;

        Ok(Self {
            hidden,
            output,
            crop,
        })
    }

    pub fn crop(&self) -> usize {
        self.crop
    }
}

impl Module for Generator {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let mut xs = xs.clone();
        for conv in &self.hidden {
            xs = leaky_relu(&conv.forward(&xs)?)?;
        }
        let xs = self.output.forward(&xs)?.tanh()?;
        center_crop(&xs, self.crop)
    }
}
