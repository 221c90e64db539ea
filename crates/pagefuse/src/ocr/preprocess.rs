//! Crop preparation for text recognition.
//!
//! Each region crop gets a quality score from its luminance contrast and
//! edge sharpness. Low-quality crops go through the heavy chain (contrast
//! stretch, denoise, sharpen); the rest get the light chain (contrast
//! stretch, sharpen).

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage};

use crate::layout::geometry::BoundingBox;

/// Mean absolute Laplacian treated as fully sharp.
const SHARPNESS_SATURATION: f64 = 48.0;
/// Standard deviation of luminance treated as full contrast.
const CONTRAST_SATURATION: f64 = 64.0;

const DENOISE_SIGMA: f32 = 0.8;
const HEAVY_SHARPEN_SIGMA: f32 = 1.2;
const HEAVY_SHARPEN_THRESHOLD: i32 = 2;
const LIGHT_SHARPEN_SIGMA: f32 = 0.8;
const LIGHT_SHARPEN_THRESHOLD: i32 = 4;

/// Which preprocessing chain was applied to a crop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreprocessChain {
    Light,
    Heavy,
}

/// A crop ready for recognition.
#[derive(Debug, Clone)]
pub struct PreparedCrop {
    pub image: DynamicImage,
    pub quality: f64,
    pub chain: PreprocessChain,
}

/// Contrast component in `[0, 1]`: luminance standard deviation, saturated.
pub fn contrast_score(gray: &GrayImage) -> f64 {
    let count = gray.width() as f64 * gray.height() as f64;
    if count == 0.0 {
        return 0.0;
    }

    let sum: f64 = gray.pixels().map(|p| p[0] as f64).sum();
    let mean = sum / count;
    let variance = gray
        .pixels()
        .map(|p| {
            let diff = p[0] as f64 - mean;
            diff * diff
        })
        .sum::<f64>()
        / count;

    (variance.sqrt() / CONTRAST_SATURATION).min(1.0)
}

/// Sharpness component in `[0, 1]`: mean absolute 4-neighbour Laplacian, saturated.
///
/// Images smaller than 3x3 have no interior and score 0.
pub fn sharpness_score(gray: &GrayImage) -> f64 {
    let (width, height) = gray.dimensions();
    if width < 3 || height < 3 {
        return 0.0;
    }

    let at = |x: u32, y: u32| gray.get_pixel(x, y)[0] as f64;
    let mut total = 0.0;
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let laplacian = at(x - 1, y) + at(x + 1, y) + at(x, y - 1) + at(x, y + 1) - 4.0 * at(x, y);
            total += laplacian.abs();
        }
    }
    let interior = (width - 2) as f64 * (height - 2) as f64;

    (total / interior / SHARPNESS_SATURATION).min(1.0)
}

/// Combined quality score in `[0, 1]`.
pub fn quality_score(gray: &GrayImage) -> f64 {
    0.5 * contrast_score(gray) + 0.5 * sharpness_score(gray)
}

/// Stretch luminance so the darkest pixel maps to 0 and the brightest to 255.
pub fn contrast_stretch(gray: &GrayImage) -> GrayImage {
    let mut min = u8::MAX;
    let mut max = u8::MIN;
    for pixel in gray.pixels() {
        min = min.min(pixel[0]);
        max = max.max(pixel[0]);
    }

    if max <= min {
        return gray.clone();
    }

    let scale = 255.0 / (max as f32 - min as f32);
    let mut output = gray.clone();
    for pixel in output.pixels_mut() {
        pixel[0] = ((pixel[0].saturating_sub(min)) as f32 * scale).round() as u8;
    }
    output
}

/// Score a crop and run the matching preprocessing chain.
pub fn prepare_crop(crop: &DynamicImage, quality_threshold: f64) -> PreparedCrop {
    let gray = crop.to_luma8();
    let quality = quality_score(&gray);
    let stretched = contrast_stretch(&gray);

    let (processed, chain) = if quality < quality_threshold {
        let denoised = imageops::blur(&stretched, DENOISE_SIGMA);
        (
            imageops::unsharpen(&denoised, HEAVY_SHARPEN_SIGMA, HEAVY_SHARPEN_THRESHOLD),
            PreprocessChain::Heavy,
        )
    } else {
        (
            imageops::unsharpen(&stretched, LIGHT_SHARPEN_SIGMA, LIGHT_SHARPEN_THRESHOLD),
            PreprocessChain::Light,
        )
    };

    PreparedCrop {
        image: DynamicImage::ImageLuma8(processed),
        quality,
        chain,
    }
}

/// Downscale `image` so its longer side is at most `max_dimension`.
///
/// Returns `None` when the image already fits. Otherwise returns the copy and
/// the factor that maps its coordinates back to the original image.
pub fn downscale_for_detection(image: &DynamicImage, max_dimension: u32) -> Option<(DynamicImage, f64)> {
    let (width, height) = (image.width(), image.height());
    let longer = width.max(height);
    if max_dimension == 0 || longer <= max_dimension {
        return None;
    }

    let ratio = max_dimension as f64 / longer as f64;
    let new_width = ((width as f64 * ratio).round() as u32).clamp(1, max_dimension);
    let new_height = ((height as f64 * ratio).round() as u32).clamp(1, max_dimension);
    let resized = image.resize_exact(new_width, new_height, FilterType::Triangle);

    Some((resized, longer as f64 / new_width.max(new_height) as f64))
}

/// Crop `image` to `bbox`, clamped to the image bounds.
///
/// Returns `None` when nothing with positive area remains.
pub fn crop_region(image: &DynamicImage, bbox: &BoundingBox) -> Option<DynamicImage> {
    let (x, y, width, height) = bbox.to_pixel_rect(image.width(), image.height())?;
    Some(image.crop_imm(x, y, width, height))
}
