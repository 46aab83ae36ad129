//! Denoiser interface
//!
//! The trained inpainting UNet is consumed as an opaque unit. Its input is the
//! channel concatenation `[latent, mask, masked_latent]` (4 + 1 + 4 channels)
//! over the composite height; its output is the predicted noise with the
//! latent's shape.

use burn::prelude::*;
use burn::tensor::ElementConversion;
use burn_tryon_samplers::NoiseSchedule;

/// Noise predictor
pub trait Denoiser<B: Backend>: Send {
    /// Predict noise
    ///
    /// * `input` - [batch, 9, h, w] denoiser input
    /// * `timestep` - [1] current training timestep
    ///
    /// Returns [batch, 4, h, w].
    fn forward(&self, input: Tensor<B, 4>, timestep: Tensor<B, 1>) -> Tensor<B, 4>;
}

impl<B, F> Denoiser<B> for F
where
    B: Backend,
    F: Fn(Tensor<B, 4>, Tensor<B, 1>) -> Tensor<B, 4> + Send,
{
    fn forward(&self, input: Tensor<B, 4>, timestep: Tensor<B, 1>) -> Tensor<B, 4> {
        self(input, timestep)
    }
}

/// Parameter-free denoiser that treats the conditioning latent as the clean image
///
/// Predicts `ε = (x_t - sqrt(ᾱ) x0) / sqrt(1 - ᾱ)` with `x0` read from the
/// masked-latent channels. Lets the whole loop run without pretrained weights.
#[derive(Debug, Clone)]
pub struct PassthroughDenoiser {
    schedule: NoiseSchedule,
    latent_channels: usize,
}

impl PassthroughDenoiser {
    pub fn new(schedule: NoiseSchedule) -> Self {
        Self {
            schedule,
            latent_channels: 4,
        }
    }
}

impl<B: Backend> Denoiser<B> for PassthroughDenoiser {
    fn forward(&self, input: Tensor<B, 4>, timestep: Tensor<B, 1>) -> Tensor<B, 4> {
        let [b, c, h, w] = input.dims();
        let lc = self.latent_channels;
        let t = timestep.into_scalar().elem::<f64>().max(0.0) as usize;
        let alpha = self.schedule.alpha_cumprod_at(t);

        let noisy = input.clone().slice([0..b, 0..lc, 0..h, 0..w]);
        let clean = input.slice([0..b, c - lc..c, 0..h, 0..w]);
        (noisy - clean * alpha.sqrt()) / (1.0 - alpha).sqrt()
    }
}
