use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma};

/// Upscale factor applied to crops narrower than this
const SMALL_WIDTH: u32 = 600;
const BLUR_SIGMA: f32 = 0.6;

#[derive(Debug, Clone)]
pub struct Preprocessed {
    pub image: DynamicImage,
    /// Output pixels per input pixel; used to map boxes back to the crop
    pub scale: f32,
}

pub trait Preprocessor: Send + Sync {
    // Default: grayscale, upscale, light denoise, contrast stretch
    fn process(&self, image: &DynamicImage) -> Preprocessed {
        if image.width() == 0 || image.height() == 0 {
            return Preprocessed {
                image: image.clone(),
                scale: 1.0,
            };
        }

        let scale = if image.width() < SMALL_WIDTH { 2.0 } else { 1.5 };
        let width = ((image.width() as f32) * scale).round() as u32;
        let height = ((image.height() as f32) * scale).round() as u32;

        let gray = image.to_luma8();
        let upscaled = imageops::resize(&gray, width, height, FilterType::CatmullRom);
        let denoised = imageops::blur(&upscaled, BLUR_SIGMA);
        let stretched = stretch_contrast(denoised);

        Preprocessed {
            image: DynamicImage::ImageLuma8(stretched),
            scale,
        }
    }
}

pub struct DefaultPreprocessor;
impl Preprocessor for DefaultPreprocessor {}

/// Hands the crop to the engine untouched
pub struct Passthrough;
impl Preprocessor for Passthrough {
    fn process(&self, image: &DynamicImage) -> Preprocessed {
        Preprocessed {
            image: image.clone(),
            scale: 1.0,
        }
    }
}

/// Map luminance linearly so the darkest pixel is 0 and the brightest 255
fn stretch_contrast(mut image: GrayImage) -> GrayImage {
    let (min, max) = image
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), Luma([v])| (lo.min(*v), hi.max(*v)));

    if max <= min {
        return image;
    }

    let range = (max - min) as u32;
    for Luma([v]) in image.pixels_mut() {
        *v = (((*v - min) as u32 * 255) / range) as u8;
    }
    image
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_crops_are_doubled() {
        let image = DynamicImage::new_rgb8(100, 40);
        let out = DefaultPreprocessor.process(&image);
        assert_eq!(out.scale, 2.0);
        assert_eq!((out.image.width(), out.image.height()), (200, 80));
    }

    #[test]
    fn test_wide_crops_grow_by_half() {
        let image = DynamicImage::new_rgb8(800, 100);
        let out = DefaultPreprocessor.process(&image);
        assert_eq!(out.scale, 1.5);
        assert_eq!((out.image.width(), out.image.height()), (1200, 150));
    }

    #[test]
    fn test_contrast_is_stretched() {
        let mut gray = GrayImage::new(2, 1);
        gray.put_pixel(0, 0, Luma([100]));
        gray.put_pixel(1, 0, Luma([150]));

        let out = stretch_contrast(gray);
        assert_eq!(out.get_pixel(0, 0), &Luma([0]));
        assert_eq!(out.get_pixel(1, 0), &Luma([255]));
    }

    #[test]
    fn test_flat_image_is_left_alone() {
        let gray = GrayImage::from_pixel(3, 3, Luma([42]));
        let out = stretch_contrast(gray);
        assert!(out.pixels().all(|p| p.0[0] == 42));
    }

    #[test]
    fn test_passthrough_keeps_scale() {
        let image = DynamicImage::new_rgb8(10, 10);
        let out = Passthrough.process(&image);
        assert_eq!(out.scale, 1.0);
        assert_eq!(out.image.width(), 10);
    }
}
