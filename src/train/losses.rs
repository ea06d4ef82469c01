//! Adversarial and content losses.
//!
//! The discriminator is trained with a least-squares objective against soft
//! labels: fused images are pushed towards `U[fake.low, fake.high)` and
//! visible images towards `U[real.low, real.high)`. The generator is pushed
//! towards the real range, and additionally has to keep the infrared
//! intensities and the visible edges:
//!
//! ```text
//! content = mean((G(x) - ir)^2) + gradient_weight * mean((∇G(x) - ∇vi)^2)
//! G_loss  = mean((D(G(x)) - U_real)^2) + content_weight * content
//! ```
//!
//! where `∇` is the horizontal Sobel response.

use crate::core::config::{LossConfig, SoftLabel};
use crate::processors::SobelFilter;
use candle_core::{Device, Result, Tensor};

impl SoftLabel {
    /// Draws one target per sample from `[low, high)`, shape `(batch, 1)`.
    pub fn sample(&self, batch: usize, device: &Device) -> Result<Tensor> {
        Tensor::rand(self.low as f32, self.high as f32, (batch, 1), device)
    }
}

/// `mean((scores - targets)^2)`.
pub fn least_squares(scores: &Tensor, targets: &Tensor) -> Result<Tensor> {
    (scores - targets)?.sqr()?.mean_all()
}

/// Least-squares discriminator loss over fused and visible scores.
pub fn discriminator_loss(
    fake_scores: &Tensor,
    real_scores: &Tensor,
    fake_targets: &Tensor,
    real_targets: &Tensor,
) -> Result<Tensor> {
    least_squares(fake_scores, fake_targets)? + least_squares(real_scores, real_targets)?
}

/// Intensity term against the infrared label plus the weighted Sobel edge
/// term against the visible label.
pub fn content_loss(
    fused: &Tensor,
    ir_label: &Tensor,
    vi_label: &Tensor,
    sobel: &SobelFilter,
    gradient_weight: f64,
) -> Result<Tensor> {
    let intensity = (fused - ir_label)?.sqr()?.mean_all()?;
    let edges = (sobel.apply(fused)? - sobel.apply(vi_label)?)?
        .sqr()?
        .mean_all()?;
    intensity + (edges * gradient_weight)?
}

/// Generator objective: adversarial term plus weighted content term.
pub fn generator_loss(adversarial: &Tensor, content: &Tensor, content_weight: f64) -> Result<Tensor> {
    adversarial + (content * content_weight)?
}

/// The generator objective and its two parts.
#[derive(Debug, Clone)]
pub struct GeneratorLoss {
    pub total: Tensor,
    pub adversarial: Tensor,
    pub content: Tensor,
}

/// Loss configuration bound to a device, sampling fresh soft labels per call.
#[derive(Debug, Clone)]
pub struct GanLoss {
    config: LossConfig,
    sobel: SobelFilter,
    device: Device,
}

impl GanLoss {
    pub fn new(config: LossConfig, device: &Device) -> Result<Self> {
        Ok(Self {
            config,
            sobel: SobelFilter::new(device)?,
            device: device.clone(),
        })
    }

    pub fn config(&self) -> &LossConfig {
        &self.config
    }

    pub fn discriminator(&self, fake_scores: &Tensor, real_scores: &Tensor) -> Result<Tensor> {
        let fake_targets = self.config.fake_label.sample(fake_scores.dim(0)?, &self.device)?;
        let real_targets = self.config.real_label.sample(real_scores.dim(0)?, &self.device)?;
        discriminator_loss(fake_scores, real_scores, &fake_targets, &real_targets)
    }

    pub fn generator(
        &self,
        fused: &Tensor,
        fake_scores: &Tensor,
        ir_label: &Tensor,
        vi_label: &Tensor,
    ) -> Result<GeneratorLoss> {
        let targets = self.config.real_label.sample(fake_scores.dim(0)?, &self.device)?;
        let adversarial = least_squares(fake_scores, &targets)?;
        let content = content_loss(
            fused,
            ir_label,
            vi_label,
            &self.sobel,
            self.config.gradient_weight,
        )?;
        let total = generator_loss(&adversarial, &content, self.config.content_weight)?;
        Ok(GeneratorLoss {
            total,
            adversarial,
            content,
        })
    }
}
