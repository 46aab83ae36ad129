//! Latent encoder/decoder interfaces
//!
//! The pretrained VAE is consumed as an opaque unit. Implementations only
//! need to honour the tensor contracts below.

use burn::prelude::*;

/// VAE scaling factors for different model versions
pub mod scaling {
    /// SD 1.x / SD 2.x scaling factor
    pub const SD1X: f64 = 0.18215;
    /// SDXL scaling factor
    pub const SDXL: f64 = 0.13025;
}

/// Spatial downscale between pixel space and latent space
pub const DOWNSCALE_FACTOR: usize = 8;

/// Pixel space to latent space
pub trait LatentEncoder<B: Backend>: Send {
    /// Encode images to latents
    ///
    /// Input: [batch, 3, H, W] with values in [-1, 1]
    /// Output: [batch, C, H/8, W/8], already multiplied by `scaling_factor()`
    fn encode(&self, image: Tensor<B, 4>) -> Tensor<B, 4>;

    fn scaling_factor(&self) -> f64 {
        scaling::SD1X
    }

    fn latent_channels(&self) -> usize {
        4
    }

    fn downscale_factor(&self) -> usize {
        DOWNSCALE_FACTOR
    }
}

/// Latent space to pixel space
pub trait LatentDecoder<B: Backend>: Send {
    /// Decode unscaled latents to images
    ///
    /// Input: [batch, C, h, w] latent with the scaling factor removed
    /// Output: [batch, 3, h*8, w*8] with values roughly in [-1, 1]
    fn decode(&self, latent: Tensor<B, 4>) -> Tensor<B, 4>;

    fn scaling_factor(&self) -> f64 {
        scaling::SD1X
    }
}

/// Remove the scaling factor and decode
pub fn decode_scaled<B: Backend, D: LatentDecoder<B> + ?Sized>(
    decoder: &D,
    latent: Tensor<B, 4>,
) -> Tensor<B, 4> {
    decoder.decode(latent / decoder.scaling_factor())
}

/// Map decoder output from [-1, 1] to [0, 1]
pub fn decode_to_unit_range<B: Backend>(image: Tensor<B, 4>) -> Tensor<B, 4> {
    (image / 2.0 + 0.5).clamp(0.0, 1.0)
}

/// Blank out the region to be replaced: `image * (mask < 0.5)`
///
/// `image` is [batch, 3, H, W], `mask` is [batch, 1, H, W].
pub fn mask_image<B: Backend>(image: Tensor<B, 4>, mask: Tensor<B, 4>) -> Tensor<B, 4> {
    let channels = image.dims()[1];
    let keep = mask.lower_elem(0.5).float().repeat_dim(1, channels);
    image * keep
}
