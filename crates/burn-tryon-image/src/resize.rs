//! Aspect-preserving resize to the canonical resolution

use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};

use crate::error::ConditioningError;

/// Canvas color behind padded garments
pub const PAD_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

fn check_extent(image: &DynamicImage, name: &'static str) -> Result<(u32, u32), ConditioningError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(ConditioningError::EmptyImage {
            name,
            width,
            height,
        });
    }
    Ok((width, height))
}

fn check_target(width: u32, height: u32) -> Result<(), ConditioningError> {
    if width == 0 || height == 0 {
        return Err(ConditioningError::InvalidResolution {
            width: width as usize,
            height: height as usize,
        });
    }
    Ok(())
}

/// Aspect-fill crop: center-crop to the target aspect ratio, then resize
///
/// An image already at the target size is returned unchanged.
pub fn resize_and_crop(
    image: &DynamicImage,
    width: u32,
    height: u32,
    name: &'static str,
) -> Result<DynamicImage, ConditioningError> {
    check_target(width, height)?;
    let (w, h) = check_extent(image, name)?;
    if (w, h) == (width, height) {
        return Ok(image.clone());
    }

    let (tw, th) = (width as u64, height as u64);
    let (crop_w, crop_h) = if (w as u64) * th < (h as u64) * tw {
        // Narrower than the target: keep width, trim height
        (w as u64, (w as u64 * th / tw).max(1))
    } else {
        ((h as u64 * tw / th).max(1), h as u64)
    };
    let left = (w as u64 - crop_w) / 2;
    let top = (h as u64 - crop_h) / 2;

    Ok(image
        .crop_imm(left as u32, top as u32, crop_w as u32, crop_h as u32)
        .resize_exact(width, height, FilterType::Lanczos3))
}

/// Aspect-fill pad: fit inside the target, then center on a white canvas
///
/// The whole source stays visible; nothing is cropped.
pub fn resize_and_pad(
    image: &DynamicImage,
    width: u32,
    height: u32,
    name: &'static str,
) -> Result<RgbImage, ConditioningError> {
    check_target(width, height)?;
    let (w, h) = check_extent(image, name)?;

    let (tw, th) = (width as u64, height as u64);
    let (new_w, new_h) = if (w as u64) * th < (h as u64) * tw {
        ((w as u64 * th / h as u64).clamp(1, tw), th)
    } else {
        (tw, (h as u64 * tw / w as u64).clamp(1, th))
    };

    let resized = image
        .resize_exact(new_w as u32, new_h as u32, FilterType::Lanczos3)
        .to_rgb8();
    let mut canvas = RgbImage::from_pixel(width, height, PAD_COLOR);
    let x = ((tw - new_w) / 2) as i64;
    let y = ((th - new_h) / 2) as i64;
    imageops::replace(&mut canvas, &resized, x, y);
    Ok(canvas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }))
    }

    #[test]
    fn test_crop_output_size() {
        for (w, h) in [(500, 700), (1200, 800), (768, 2048), (33, 17)] {
            let out = resize_and_crop(&gradient(w, h), 768, 1024, "person").unwrap();
            assert_eq!(out.dimensions(), (768, 1024), "source {}x{}", w, h);
        }
    }

    #[test]
    fn test_crop_is_idempotent_at_canonical_size() {
        let source = gradient(768, 1024);
        let once = resize_and_crop(&source, 768, 1024, "person").unwrap();
        let twice = resize_and_crop(&once, 768, 1024, "person").unwrap();
        assert_eq!(once.to_rgb8().as_raw(), source.to_rgb8().as_raw());
        assert_eq!(twice.to_rgb8().as_raw(), once.to_rgb8().as_raw());
    }

    #[test]
    fn test_crop_keeps_center() {
        // Wide image: left and right thirds red, middle third blue
        let source = DynamicImage::ImageRgb8(RgbImage::from_fn(300, 100, |x, _| {
            if (100..200).contains(&x) {
                Rgb([0, 0, 255])
            } else {
                Rgb([255, 0, 0])
            }
        }));
        let out = resize_and_crop(&source, 60, 80, "person").unwrap().to_rgb8();
        // Crop box is 75x100 centered at x = 150, entirely blue
        assert_eq!(out.dimensions(), (60, 80));
        let center = out.get_pixel(30, 40);
        assert!(center[2] > 200 && center[0] < 50, "{:?}", center);
    }

    #[test]
    fn test_pad_never_crops() {
        // 500x700 into 768x1024: scaled to 731x1024, 18px white bands left and right
        let source = DynamicImage::ImageRgb8(RgbImage::from_pixel(500, 700, Rgb([10, 20, 30])));
        let out = resize_and_pad(&source, 768, 1024, "garment").unwrap();
        assert_eq!(out.dimensions(), (768, 1024));
        assert_eq!(*out.get_pixel(0, 512), PAD_COLOR);
        assert_eq!(*out.get_pixel(767, 512), PAD_COLOR);
        assert_eq!(*out.get_pixel(384, 0), Rgb([10, 20, 30]));
        assert_eq!(*out.get_pixel(384, 1023), Rgb([10, 20, 30]));
        assert_eq!(*out.get_pixel(20, 512), Rgb([10, 20, 30]));
    }

    #[test]
    fn test_pad_wide_source() {
        let source = DynamicImage::ImageLuma8(image::GrayImage::from_pixel(400, 100, Luma([0])));
        let out = resize_and_pad(&source, 80, 80, "garment").unwrap();
        // Scaled to 80x20, centered vertically
        assert_eq!(*out.get_pixel(40, 10), PAD_COLOR);
        assert_eq!(*out.get_pixel(40, 40), Rgb([0, 0, 0]));
        assert_eq!(*out.get_pixel(40, 70), PAD_COLOR);
    }

    #[test]
    fn test_zero_extent_rejected() {
        let empty = DynamicImage::ImageRgb8(RgbImage::new(0, 10));
        assert!(matches!(
            resize_and_crop(&empty, 8, 8, "mask"),
            Err(ConditioningError::EmptyImage { name: "mask", .. })
        ));
        assert!(resize_and_pad(&empty, 8, 8, "garment").is_err());
        assert!(matches!(
            resize_and_crop(&gradient(8, 8), 0, 8, "person"),
            Err(ConditioningError::InvalidResolution { .. })
        ));
    }
}
