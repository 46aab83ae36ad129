//! Optional safety filter applied to decoded images

use std::path::Path;

use burn_tryon_image::{ConditioningError, load_image};
use image::imageops::FilterType;
use image::{DynamicImage, Rgb, RgbImage};

/// Classifies decoded images; `true` means the image must be replaced
pub trait SafetyChecker: Send {
    fn is_flagged(&self, image: &RgbImage) -> bool;
}

impl<F> SafetyChecker for F
where
    F: Fn(&RgbImage) -> bool + Send,
{
    fn is_flagged(&self, image: &RgbImage) -> bool {
        self(image)
    }
}

/// Image substituted for flagged results
#[derive(Debug, Clone)]
pub enum Placeholder {
    Solid(Rgb<u8>),
    Image(RgbImage),
}

impl Default for Placeholder {
    fn default() -> Self {
        Self::Solid(Rgb([0, 0, 0]))
    }
}

impl Placeholder {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConditioningError> {
        Ok(Self::Image(load_image(path)?.to_rgb8()))
    }

    /// Placeholder at the given size
    pub fn render(&self, width: u32, height: u32) -> RgbImage {
        match self {
            Self::Solid(color) => RgbImage::from_pixel(width, height, *color),
            Self::Image(image) if image.dimensions() == (width, height) => image.clone(),
            Self::Image(image) => DynamicImage::ImageRgb8(image.clone())
                .resize_exact(width, height, FilterType::Lanczos3)
                .to_rgb8(),
        }
    }
}

/// Replace flagged images; returns the images and the per-image flags
pub fn apply_safety_filter(
    images: Vec<RgbImage>,
    checker: Option<&dyn SafetyChecker>,
    placeholder: &Placeholder,
) -> (Vec<RgbImage>, Vec<bool>) {
    let Some(checker) = checker else {
        let flags = vec![false; images.len()];
        return (images, flags);
    };

    images
        .into_iter()
        .map(|image| {
            if checker.is_flagged(&image) {
                let (w, h) = image.dimensions();
                (placeholder.render(w, h), true)
            } else {
                (image, false)
            }
        })
        .unzip()
}
