//! Sobel gradient operator for the content loss edge term.

use candle_core::{DType, Device, Result, Tensor};

/// Horizontal Sobel kernel, row-major.
pub const SOBEL_KERNEL: [f32; 9] = [-1.0, 0.0, 1.0, -2.0, 0.0, 2.0, -1.0, 0.0, 1.0];

/// Differentiable Sobel filter over single-channel batches.
///
/// The kernel is applied as a valid cross-correlation, so a `(B, 1, H, W)`
/// input produces a `(B, 1, H - 2, W - 2)` response.
#[derive(Debug, Clone)]
pub struct SobelFilter {
    kernel: Tensor,
}

impl SobelFilter {
    pub fn new(device: &Device) -> Result<Self> {
        let kernel = Tensor::from_slice(&SOBEL_KERNEL, (1, 1, 3, 3), device)?;
        Ok(Self { kernel })
    }

    pub fn apply(&self, xs: &Tensor) -> Result<Tensor> {
        let kernel = if xs.dtype() == DType::F32 {
            self.kernel.clone()
        } else {
            self.kernel.to_dtype(xs.dtype())?
        };
        xs.conv2d(&kernel, 0, 1, 1, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn image_tensor(img: &GrayImage) -> Tensor {
        let (w, h) = img.dimensions();
        let data: Vec<f32> = img.as_raw().iter().map(|&p| p as f32).collect();
        Tensor::from_vec(data, (1, 1, h as usize, w as usize), &Device::Cpu).unwrap()
    }

    #[test]
    fn test_constant_image_has_no_gradient() {
        let sobel = SobelFilter::new(&Device::Cpu).unwrap();
        let xs = Tensor::full(0.25f32, (2, 1, 6, 5), &Device::Cpu).unwrap();
        let out = sobel.apply(&xs).unwrap();
        assert_eq!(out.dims(), &[2, 1, 4, 3]);
        let max = out.abs().unwrap().max_all().unwrap().to_scalar::<f32>().unwrap();
        assert_eq!(max, 0.0);
    }

    #[test]
    fn test_horizontal_ramp_is_constant() {
        let sobel = SobelFilter::new(&Device::Cpu).unwrap();
        let img = GrayImage::from_fn(6, 4, |x, _| Luma([(x * 3) as u8]));
        let out = sobel.apply(&image_tensor(&img)).unwrap();
        let values = out.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        // each row contributes (1 + 2 + 1) * (3 * 2)
        assert!(values.iter().all(|&v| (v - 24.0).abs() < 1e-4));
    }

    #[test]
    fn test_matches_imageproc_on_interior() {
        let sobel = SobelFilter::new(&Device::Cpu).unwrap();
        let img = GrayImage::from_fn(9, 7, |x, y| Luma([((x * 37 + y * 11) % 251) as u8]));
        let out = sobel.apply(&image_tensor(&img)).unwrap();
        let out = out.squeeze(0).unwrap().squeeze(0).unwrap();
        let values = out.to_vec2::<f32>().unwrap();

        let reference = imageproc::gradients::horizontal_sobel(&img);
        for (y, row) in values.iter().enumerate() {
            for (x, &v) in row.iter().enumerate() {
                let expected = reference.get_pixel(x as u32 + 1, y as u32 + 1)[0] as f32;
                assert!((v.abs() - expected.abs()).abs() < 1e-3);
            }
        }
    }

    #[test]
    fn test_gradient_flows_through_filter() {
        let sobel = SobelFilter::new(&Device::Cpu).unwrap();
        let var = candle_core::Var::from_tensor(
            &Tensor::arange(0f32, 16.0, &Device::Cpu)
                .unwrap()
                .reshape((1, 1, 4, 4))
                .unwrap(),
        )
        .unwrap();
        let loss = sobel.apply(var.as_tensor()).unwrap().sqr().unwrap().sum_all().unwrap();
        let grads = loss.backward().unwrap();
        assert!(grads.get(var.as_tensor()).is_some());
    }
}
