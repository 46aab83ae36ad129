//! Parameter-free reference codec
//!
//! Encodes by averaging 8x8 blocks (RGB plus a luminance channel) and
//! decodes by nearest upsampling. Exact on images that are constant on
//! 8x8 blocks. Used for tests and smoke runs without pretrained weights.

use burn::prelude::*;

use crate::codec::{DOWNSCALE_FACTOR, LatentDecoder, LatentEncoder, scaling};

#[derive(Debug, Clone, Copy)]
pub struct PooledCodec {
    scaling_factor: f64,
}

impl Default for PooledCodec {
    fn default() -> Self {
        Self {
            scaling_factor: scaling::SD1X,
        }
    }
}

impl PooledCodec {
    pub fn new(scaling_factor: f64) -> Self {
        Self { scaling_factor }
    }
}

impl<B: Backend> LatentEncoder<B> for PooledCodec {
    fn encode(&self, image: Tensor<B, 4>) -> Tensor<B, 4> {
        let f = DOWNSCALE_FACTOR;
        let [b, c, h, w] = image.dims();
        let (lh, lw) = (h / f, w / f);

        let pooled: Tensor<B, 4> = image
            .slice([0..b, 0..c, 0..lh * f, 0..lw * f])
            .reshape([b, c, lh, f, lw, f])
            .mean_dim(5)
            .mean_dim(3)
            .reshape([b, c, lh, lw]);
        let luminance = pooled.clone().mean_dim(1);

        Tensor::cat(vec![pooled, luminance], 1) * self.scaling_factor
    }

    fn scaling_factor(&self) -> f64 {
        self.scaling_factor
    }
}

impl<B: Backend> LatentDecoder<B> for PooledCodec {
    fn decode(&self, latent: Tensor<B, 4>) -> Tensor<B, 4> {
        let f = DOWNSCALE_FACTOR;
        let [b, _, h, w] = latent.dims();

        latent
            .slice([0..b, 0..3, 0..h, 0..w])
            .reshape([b, 3, h, 1, w, 1])
            .repeat_dim(3, f)
            .repeat_dim(5, f)
            .reshape([b, 3, h * f, w * f])
    }

    fn scaling_factor(&self) -> f64 {
        self.scaling_factor
    }
}
