//! Conversion between images and NCHW tensors

use burn::prelude::*;
use image::{GrayImage, RgbImage};

use crate::error::ConditioningError;

/// RGB image to a [1, 3, H, W] tensor in [-1, 1]
pub fn image_to_tensor<B: Backend>(image: &RgbImage, device: &B::Device) -> Tensor<B, 4> {
    let (w, h) = image.dimensions();
    let (w, h) = (w as usize, h as usize);
    let raw = image.as_raw();

    let mut values = vec![0.0f32; 3 * h * w];
    for (i, pixel) in raw.chunks_exact(3).enumerate() {
        for c in 0..3 {
            values[c * h * w + i] = pixel[c] as f32 / 127.5 - 1.0;
        }
    }
    Tensor::from_data(TensorData::new(values, [1, 3, h, w]), device)
}

/// Grayscale mask to a binary [1, 1, H, W] tensor
///
/// Values are scaled to [0, 1] then thresholded: `< 0.5` is 0, `>= 0.5` is 1.
pub fn mask_to_tensor<B: Backend>(mask: &GrayImage, device: &B::Device) -> Tensor<B, 4> {
    let (w, h) = mask.dimensions();
    let values: Vec<f32> = mask
        .as_raw()
        .iter()
        .map(|&v| if v as f32 / 255.0 >= 0.5 { 1.0 } else { 0.0 })
        .collect();
    Tensor::from_data(
        TensorData::new(values, [1, 1, h as usize, w as usize]),
        device,
    )
}

/// Threshold a mask tensor at 0.5 into {0, 1}
pub fn binarize_mask<B: Backend>(mask: Tensor<B, 4>) -> Tensor<B, 4> {
    mask.greater_equal_elem(0.5).float()
}

/// Tensor [batch, 3, H, W] with values in [0, 1] to RGB images
pub fn tensor_to_images<B: Backend>(
    tensor: Tensor<B, 4>,
) -> Result<Vec<RgbImage>, ConditioningError> {
    let [b, c, h, w] = tensor.dims();
    if c != 3 {
        return Err(ConditioningError::ShapeMismatch {
            name: "image",
            expected: vec![b, 3, h, w],
            actual: vec![b, c, h, w],
        });
    }

    let floats: Vec<f32> = tensor
        .into_data()
        .convert::<f32>()
        .to_vec()
        .map_err(|e| ConditioningError::TensorData(format!("{:?}", e)))?;

    let plane = h * w;
    (0..b)
        .map(|batch| {
            let offset = batch * 3 * plane;
            let mut rgb = Vec::with_capacity(plane * 3);
            for i in 0..plane {
                for channel in 0..3 {
                    let v = floats[offset + channel * plane + i];
                    rgb.push((v * 255.0).round().clamp(0.0, 255.0) as u8);
                }
            }
            RgbImage::from_raw(w as u32, h as u32, rgb).ok_or(ConditioningError::ShapeMismatch {
                name: "image",
                expected: vec![h, w, 3],
                actual: vec![plane * 3],
            })
        })
        .collect()
}
