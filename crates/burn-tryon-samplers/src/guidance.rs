//! Classifier-free guidance

use burn::prelude::*;

/// Guidance is applied only above a scale of 1.0
pub fn guidance_enabled(guidance_scale: f64) -> bool {
    guidance_scale > 1.0
}

/// Apply classifier-free guidance
///
/// Combines conditional and unconditional predictions:
/// `output = uncond + guidance_scale * (cond - uncond)`
pub fn apply_guidance<B: Backend>(
    noise_pred_uncond: Tensor<B, 4>,
    noise_pred_cond: Tensor<B, 4>,
    guidance_scale: f64,
) -> Tensor<B, 4> {
    noise_pred_uncond.clone() + (noise_pred_cond - noise_pred_uncond) * guidance_scale
}

/// Duplicate a latent along the batch axis, unconditional branch first
pub fn expand_for_guidance<B: Backend>(latent: Tensor<B, 4>) -> Tensor<B, 4> {
    Tensor::cat(vec![latent.clone(), latent], 0)
}

/// Split a guided prediction into (uncond, cond) halves along the batch axis
///
/// The batch size must be even.
pub fn split_guidance_batch<B: Backend>(noise_pred: Tensor<B, 4>) -> (Tensor<B, 4>, Tensor<B, 4>) {
    let [b, c, h, w] = noise_pred.dims();
    let half = b / 2;
    let uncond = noise_pred.clone().slice([0..half, 0..c, 0..h, 0..w]);
    let cond = noise_pred.slice([half..b, 0..c, 0..h, 0..w]);
    (uncond, cond)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_guidance_enabled() {
        assert!(!guidance_enabled(0.0));
        assert!(!guidance_enabled(1.0));
        assert!(guidance_enabled(1.01));
        assert!(guidance_enabled(2.5));
    }

    #[test]
    fn test_unit_scale_returns_cond() {
        let device = Default::default();
        let uncond = Tensor::<TestBackend, 4>::full([1, 4, 2, 2], -3.0, &device);
        let cond = Tensor::<TestBackend, 4>::full([1, 4, 2, 2], 0.75, &device);
        let out = apply_guidance(uncond, cond, 1.0);
        for v in out.into_data().to_vec::<f32>().unwrap() {
            assert!((v - 0.75).abs() < 1e-6);
        }
    }

    #[test]
    fn test_guidance_extrapolates() {
        let device = Default::default();
        let uncond = Tensor::<TestBackend, 4>::zeros([1, 1, 1, 1], &device);
        let cond = Tensor::<TestBackend, 4>::ones([1, 1, 1, 1], &device);
        let out = apply_guidance(uncond, cond, 2.5);
        assert_eq!(out.into_data().to_vec::<f32>().unwrap(), vec![2.5]);
    }

    #[test]
    fn test_expand_then_split() {
        let device = Default::default();
        let latent = Tensor::<TestBackend, 4>::from_data(
            TensorData::new(vec![1.0f32, 2.0, 3.0, 4.0], [1, 1, 2, 2]),
            &device,
        );
        let expanded = expand_for_guidance(latent.clone());
        assert_eq!(expanded.dims(), [2, 1, 2, 2]);

        let (uncond, cond) = split_guidance_batch(expanded);
        assert_eq!(uncond.dims(), [1, 1, 2, 2]);
        assert_eq!(
            cond.into_data().to_vec::<f32>().unwrap(),
            latent.into_data().to_vec::<f32>().unwrap()
        );
    }
}
