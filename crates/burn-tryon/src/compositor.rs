//! Person/garment composite latents
//!
//! The masked person and the garment are concatenated along the height axis,
//! so the denoiser attends across both halves in one pass. The mask latent is
//! concatenated with zeros so the garment half is never inpainted.

use burn::prelude::*;
use burn::tensor::Int;

use crate::error::TryOnError;

/// Height axis in NCHW
const HEIGHT_DIM: usize = 2;

/// Conditioning latents for one inference call
#[derive(Debug, Clone)]
pub struct LatentComposite<B: Backend> {
    /// cat(masked_latent, garment_latent) along height
    masked_latent_concat: Tensor<B, 4>,
    /// cat(mask_latent, zeros) along height
    mask_latent_concat: Tensor<B, 4>,
    /// masked_latent alone, for the unconditional branch
    masked_latent: Tensor<B, 4>,
    /// zeros_like(garment_latent), for the unconditional branch
    garment_zeros: Tensor<B, 4>,
}

impl<B: Backend> LatentComposite<B> {
    /// Build the composite from encoder outputs and the downsampled mask
    ///
    /// * `masked_latent` - [batch, C, h, w]
    /// * `garment_latent` - [batch, C, h, w]
    /// * `mask_latent` - [batch, 1, h, w]
    pub fn new(
        masked_latent: Tensor<B, 4>,
        garment_latent: Tensor<B, 4>,
        mask_latent: Tensor<B, 4>,
    ) -> Result<Self, TryOnError> {
        let [b, c, h, w] = masked_latent.dims();
        if garment_latent.dims() != [b, c, h, w] {
            return Err(TryOnError::ShapeMismatch {
                name: "garment_latent",
                expected: vec![b, c, h, w],
                actual: garment_latent.dims().to_vec(),
            });
        }
        if mask_latent.dims() != [b, 1, h, w] {
            return Err(TryOnError::ShapeMismatch {
                name: "mask_latent",
                expected: vec![b, 1, h, w],
                actual: mask_latent.dims().to_vec(),
            });
        }

        let masked_latent_concat = Tensor::cat(
            vec![masked_latent.clone(), garment_latent.clone()],
            HEIGHT_DIM,
        );
        let mask_latent_concat = Tensor::cat(
            vec![mask_latent.clone(), mask_latent.zeros_like()],
            HEIGHT_DIM,
        );

        Ok(Self {
            masked_latent_concat,
            mask_latent_concat,
            masked_latent,
            garment_zeros: garment_latent.zeros_like(),
        })
    }

    /// Shape of the evolving latent: [batch, C, 2h, w]
    pub fn latent_shape(&self) -> [usize; 4] {
        self.masked_latent_concat.dims()
    }

    /// Height of the person half in latent space
    pub fn person_height(&self) -> usize {
        self.masked_latent.dims()[HEIGHT_DIM]
    }

    pub fn masked_latent_concat(&self) -> &Tensor<B, 4> {
        &self.masked_latent_concat
    }

    pub fn mask_latent_concat(&self) -> &Tensor<B, 4> {
        &self.mask_latent_concat
    }

    /// Denoiser conditioning as `(mask_concat, masked_concat)`
    ///
    /// With guidance, both are doubled along the batch axis. The first half
    /// is the unconditional branch, where the garment latent is zeroed.
    pub fn denoiser_conditioning(&self, guidance: bool) -> (Tensor<B, 4>, Tensor<B, 4>) {
        if !guidance {
            return (
                self.mask_latent_concat.clone(),
                self.masked_latent_concat.clone(),
            );
        }

        let uncond = Tensor::cat(
            vec![self.masked_latent.clone(), self.garment_zeros.clone()],
            HEIGHT_DIM,
        );
        let masked = Tensor::cat(vec![uncond, self.masked_latent_concat.clone()], 0);
        let mask = Tensor::cat(
            vec![self.mask_latent_concat.clone(), self.mask_latent_concat.clone()],
            0,
        );
        (mask, masked)
    }
}

/// Nearest-neighbour resize of a mask to latent resolution
///
/// Source index is `floor(dst * in / out)` on each axis.
pub fn downsample_mask_nearest<B: Backend>(
    mask: Tensor<B, 4>,
    target_h: usize,
    target_w: usize,
) -> Tensor<B, 4> {
    let [_, _, h, w] = mask.dims();
    let device = mask.device();
    let rows = nearest_indices::<B>(h, target_h, &device);
    let cols = nearest_indices::<B>(w, target_w, &device);
    mask.select(2, rows).select(3, cols)
}

fn nearest_indices<B: Backend>(
    input: usize,
    output: usize,
    device: &B::Device,
) -> Tensor<B, 1, Int> {
    let indices: Vec<i32> = (0..output)
        .map(|i| ((i * input) / output.max(1)).min(input.saturating_sub(1)) as i32)
        .collect();
    Tensor::from_data(TensorData::new(indices, [output]), device)
}

/// Keep the person half (top) of a composite latent
///
/// The height must be even; the result has half of it.
pub fn split_person_half<B: Backend>(latent: Tensor<B, 4>) -> Result<Tensor<B, 4>, TryOnError> {
    let [b, c, h, w] = latent.dims();
    if h % 2 != 0 {
        return Err(TryOnError::ShapeMismatch {
            name: "composite_latent",
            expected: vec![b, c, h + 1, w],
            actual: vec![b, c, h, w],
        });
    }
    Ok(latent.slice([0..b, 0..c, 0..h / 2, 0..w]))
}
