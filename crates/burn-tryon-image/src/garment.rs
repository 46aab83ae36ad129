//! Garment inputs: a single image or an upper/lower pair

use image::imageops;
use image::{DynamicImage, GenericImageView, RgbImage};

use crate::error::ConditioningError;

/// Garment conditioning input
#[derive(Debug, Clone)]
pub enum Garment {
    /// One garment image (upper, lower or overall)
    Single(DynamicImage),
    /// Upper and lower garments, stacked vertically before conditioning
    Stacked {
        upper: DynamicImage,
        lower: DynamicImage,
    },
}

impl Garment {
    /// Build from optional parts; the upper garment is required
    pub fn from_parts(
        upper: Option<DynamicImage>,
        lower: Option<DynamicImage>,
    ) -> Result<Self, ConditioningError> {
        match (upper, lower) {
            (Some(upper), Some(lower)) => Ok(Self::Stacked { upper, lower }),
            (Some(upper), None) => Ok(Self::Single(upper)),
            (None, _) => Err(ConditioningError::MissingGarment("upper")),
        }
    }

    /// Collapse into the single image fed to the conditioning stage
    pub fn into_image(self) -> Result<DynamicImage, ConditioningError> {
        match self {
            Self::Single(image) => Ok(image),
            Self::Stacked { upper, lower } => {
                stack_garments(&upper, &lower).map(DynamicImage::ImageRgb8)
            }
        }
    }
}

/// Stack two garments vertically
///
/// The canvas is `max(w1, w2)` wide and `h1 + h2` tall, black where neither
/// image covers it. `upper` sits at (0, 0), `lower` directly below at (0, h1).
pub fn stack_garments(
    upper: &DynamicImage,
    lower: &DynamicImage,
) -> Result<RgbImage, ConditioningError> {
    let (w1, h1) = upper.dimensions();
    let (w2, h2) = lower.dimensions();
    for (name, width, height) in [("upper", w1, h1), ("lower", w2, h2)] {
        if width == 0 || height == 0 {
            return Err(ConditioningError::EmptyImage {
                name,
                width,
                height,
            });
        }
    }

    let mut canvas = RgbImage::new(w1.max(w2), h1 + h2);
    imageops::replace(&mut canvas, &upper.to_rgb8(), 0, 0);
    imageops::replace(&mut canvas, &lower.to_rgb8(), 0, h1 as i64);
    Ok(canvas)
}
