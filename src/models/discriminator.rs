//! Fusion discriminator.

use super::generator::leaky_relu;
use crate::core::config::ModelConfig;
use candle_core::{Module, Result, Tensor};
use candle_nn::{Conv2d, Conv2dConfig, Linear, VarBuilder};

/// Scores single-channel images: `(B, 1, H, W)` to `(B, 1)`.
///
/// Stride-2 convolutions downsample, a global average pool removes the
/// spatial axes, and a linear head produces one unbounded score per image, so
/// any input size is accepted.
#[derive(Debug, Clone)]
pub struct Discriminator {
    convs: Vec<Conv2d>,
    head: Linear,
}

impl Discriminator {
    pub fn new(config: &ModelConfig, vb: VarBuilder) -> Result<Self> {
        let conv_cfg = Conv2dConfig {
            padding: config.kernel_size / 2,
            stride: 2,
            ..Default::default()
        };

        let mut convs = Vec::with_capacity(config.discriminator_channels.len());
        let mut in_channels = 1;
        for (i, &out_channels) in config.discriminator_channels.iter().enumerate() {
            convs.push(candle_nn::conv2d(
                in_channels,
                out_channels,
                config.kernel_size,
                conv_cfg,
                vb.pp(format!("conv{i}")),
            )?);
            in_channels = out_channels;
        }
        let head = candle_nn::linear(in_channels, 1, vb.pp("head"))?;

        Ok(Self { convs, head })
    }
}

impl Module for Discriminator {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let mut xs = xs.clone();
        for conv in &self.convs {
            xs = leaky_relu(&conv.forward(&xs)?)?;
        }
        let pooled = xs.flatten_from(2)?.mean(2)?;
        self.head.forward(&pooled)
    }
}
