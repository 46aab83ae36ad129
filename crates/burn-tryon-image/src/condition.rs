//! Canonical person/garment/mask inputs

use burn::prelude::*;
use image::{DynamicImage, GrayImage, RgbImage};

use crate::error::ConditioningError;
use crate::garment::Garment;
use crate::resize::{resize_and_crop, resize_and_pad};
use crate::tensor::{binarize_mask, image_to_tensor, mask_to_tensor};

/// Person, garment and mask at the canonical resolution
#[derive(Debug, Clone)]
pub struct CanonicalImages {
    pub person: RgbImage,
    pub garment: RgbImage,
    pub mask: GrayImage,
}

impl CanonicalImages {
    /// Crop person and mask, pad the garment, all to `width` x `height`
    ///
    /// Person and mask are cropped independently, so a size mismatch
    /// between them is not an error here.
    pub fn prepare(
        person: &DynamicImage,
        garment: Garment,
        mask: &DynamicImage,
        width: u32,
        height: u32,
    ) -> Result<Self, ConditioningError> {
        let garment = garment.into_image()?;
        Ok(Self {
            person: resize_and_crop(person, width, height, "person")?.to_rgb8(),
            garment: resize_and_pad(&garment, width, height, "garment")?,
            mask: resize_and_crop(mask, width, height, "mask")?.to_luma8(),
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.person.dimensions()
    }

    /// Normalize into tensors: images in [-1, 1], mask in {0, 1}
    pub fn to_tensors<B: Backend>(&self, device: &B::Device) -> ConditionedTensors<B> {
        ConditionedTensors {
            person: image_to_tensor(&self.person, device),
            garment: image_to_tensor(&self.garment, device),
            mask: mask_to_tensor(&self.mask, device),
        }
    }
}

/// Validated conditioning tensors
///
/// All three share batch, height and width. Person and garment carry three
/// channels, the mask one.
#[derive(Debug, Clone)]
pub struct ConditionedTensors<B: Backend> {
    person: Tensor<B, 4>,
    garment: Tensor<B, 4>,
    mask: Tensor<B, 4>,
}

impl<B: Backend> ConditionedTensors<B> {
    /// Accept pre-converted tensors after checking their shapes
    ///
    /// The mask is thresholded at 0.5, so soft masks come out in {0, 1}.
    pub fn new(
        person: Tensor<B, 4>,
        garment: Tensor<B, 4>,
        mask: Tensor<B, 4>,
    ) -> Result<Self, ConditioningError> {
        let [b, c, h, w] = person.dims();
        if c != 3 || b == 0 || h == 0 || w == 0 {
            return Err(ConditioningError::ShapeMismatch {
                name: "person",
                expected: vec![b.max(1), 3, h, w],
                actual: vec![b, c, h, w],
            });
        }
        if garment.dims() != [b, 3, h, w] {
            return Err(ConditioningError::ShapeMismatch {
                name: "garment",
                expected: vec![b, 3, h, w],
                actual: garment.dims().to_vec(),
            });
        }
        if mask.dims() != [b, 1, h, w] {
            return Err(ConditioningError::ShapeMismatch {
                name: "mask",
                expected: vec![b, 1, h, w],
                actual: mask.dims().to_vec(),
            });
        }
        Ok(Self {
            person,
            garment,
            mask: binarize_mask(mask),
        })
    }

    pub fn person(&self) -> &Tensor<B, 4> {
        &self.person
    }

    pub fn garment(&self) -> &Tensor<B, 4> {
        &self.garment
    }

    pub fn mask(&self) -> &Tensor<B, 4> {
        &self.mask
    }

    /// [batch, 3, height, width] of the person tensor
    pub fn dims(&self) -> [usize; 4] {
        self.person.dims()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use image::{Luma, Rgb};

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_prepare_canonical_sizes() {
        let person = DynamicImage::ImageRgb8(RgbImage::from_pixel(900, 1100, Rgb([90, 90, 90])));
        let garment = DynamicImage::ImageRgb8(RgbImage::from_pixel(500, 700, Rgb([200, 0, 0])));
        let mask = DynamicImage::ImageLuma8(GrayImage::from_pixel(640, 960, Luma([255])));

        let canonical =
            CanonicalImages::prepare(&person, Garment::Single(garment), &mask, 768, 1024).unwrap();
        assert_eq!(canonical.dimensions(), (768, 1024));
        assert_eq!(canonical.garment.dimensions(), (768, 1024));
        assert_eq!(canonical.mask.dimensions(), (768, 1024));

        let device = Default::default();
        let tensors = canonical.to_tensors::<TestBackend>(&device);
        assert_eq!(tensors.dims(), [1, 3, 1024, 768]);
        assert_eq!(tensors.garment().dims(), [1, 3, 1024, 768]);
        assert_eq!(tensors.mask().dims(), [1, 1, 1024, 768]);
    }

    #[test]
    fn test_prepare_stacked_garment() {
        let person = DynamicImage::ImageRgb8(RgbImage::new(64, 64));
        let mask = DynamicImage::ImageLuma8(GrayImage::new(64, 64));
        let garment = Garment::Stacked {
            upper: DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 60, Rgb([255, 0, 0]))),
            lower: DynamicImage::ImageRgb8(RgbImage::from_pixel(50, 55, Rgb([0, 255, 0]))),
        };
        let canonical = CanonicalImages::prepare(&person, garment, &mask, 64, 64).unwrap();
        // 50x115 fits as 27x64, so red sits at the top center and green below
        assert_eq!(*canonical.garment.get_pixel(32, 5), Rgb([255, 0, 0]));
        assert_eq!(*canonical.garment.get_pixel(32, 60), Rgb([0, 255, 0]));
        assert_eq!(*canonical.garment.get_pixel(2, 32), Rgb([255, 255, 255]));
    }

    #[test]
    fn test_conditioned_tensors_validation() {
        let device = Default::default();
        let person = Tensor::<TestBackend, 4>::zeros([1, 3, 16, 8], &device);
        let garment = Tensor::<TestBackend, 4>::zeros([1, 3, 16, 8], &device);
        let mask = Tensor::<TestBackend, 4>::zeros([1, 1, 16, 8], &device);
        assert!(ConditionedTensors::new(person.clone(), garment.clone(), mask.clone()).is_ok());

        let small_garment = Tensor::<TestBackend, 4>::zeros([1, 3, 8, 8], &device);
        assert!(matches!(
            ConditionedTensors::new(person.clone(), small_garment, mask.clone()),
            Err(ConditioningError::ShapeMismatch { name: "garment", .. })
        ));

        let rgb_mask = Tensor::<TestBackend, 4>::zeros([1, 3, 16, 8], &device);
        assert!(matches!(
            ConditionedTensors::new(person.clone(), garment.clone(), rgb_mask),
            Err(ConditioningError::ShapeMismatch { name: "mask", .. })
        ));

        // Batch and channel axes swapped
        let flat_person = Tensor::<TestBackend, 4>::zeros([3, 1, 16, 8], &device);
        assert!(matches!(
            ConditionedTensors::new(flat_person, garment, mask),
            Err(ConditioningError::ShapeMismatch { name: "person", .. })
        ));
    }

    #[test]
    fn test_soft_mask_tensor_binarized() {
        let device = Default::default();
        let person = Tensor::<TestBackend, 4>::full([1, 3, 2, 2], 0.2, &device);
        let garment = Tensor::<TestBackend, 4>::full([1, 3, 2, 2], -0.4, &device);
        let mask = Tensor::<TestBackend, 4>::from_data(
            TensorData::new(vec![0.7f32, 0.2, 0.5, 0.49], [1, 1, 2, 2]),
            &device,
        );
        let tensors = ConditionedTensors::new(person, garment, mask).unwrap();
        assert_eq!(
            tensors.mask().clone().into_data().to_vec::<f32>().unwrap(),
            vec![1.0, 0.0, 1.0, 0.0]
        );
    }
}
