//! Latent encoder/decoder interfaces for burn-tryon

pub mod codec;
pub mod pooled;

pub use codec::{
    DOWNSCALE_FACTOR, LatentDecoder, LatentEncoder, decode_scaled, decode_to_unit_range,
    mask_image, scaling,
};
pub use pooled::PooledCodec;
