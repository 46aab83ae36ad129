//! Image conditioning stage for burn-tryon
//!
//! Turns arbitrary-size person, garment and mask images into canonical
//! tensors:
//!
//! - person and mask are aspect-fill cropped to the target resolution
//! - the garment (or a stacked upper/lower pair) is aspect-fill padded on white
//! - images are normalized to [-1, 1], the mask binarized to {0, 1}

pub mod condition;
pub mod error;
pub mod garment;
pub mod resize;
pub mod tensor;

use std::path::Path;

use image::DynamicImage;

pub use condition::{CanonicalImages, ConditionedTensors};
pub use error::ConditioningError;
pub use garment::{Garment, stack_garments};
pub use resize::{PAD_COLOR, resize_and_crop, resize_and_pad};
pub use tensor::{binarize_mask, image_to_tensor, mask_to_tensor, tensor_to_images};

/// Load an image from disk, detecting the format from its contents
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage, ConditioningError> {
    let image = image::ImageReader::open(path)?
        .with_guessed_format()?
        .decode()?;
    Ok(image)
}

/// Decode raster bytes (PNG, JPEG)
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, ConditioningError> {
    Ok(image::load_from_memory(bytes)?)
}
