use image::{DynamicImage, GrayImage, Luma, RgbImage};
use imageproc::contrast::otsu_level;
use imageproc::distance_transform::Norm;
use imageproc::filter::median_filter;
use imageproc::map::map_colors;
use imageproc::morphology;

use crate::params::Binarization;

/// Convert image to grayscale
pub fn to_grayscale(img: &DynamicImage) -> GrayImage {
    img.to_luma8()
}

/// Median blur with a square aperture of `aperture` pixels (odd)
pub fn median_blur(img: &RgbImage, aperture: u32) -> RgbImage {
    let radius = aperture.saturating_sub(1) / 2;
    if radius == 0 {
        return img.clone();
    }
    median_filter(img, radius, radius)
}

/// Level used to split foreground from background
pub fn binarization_level(img: &GrayImage, binarization: Binarization) -> u8 {
    match binarization {
        Binarization::Auto => otsu_level(img),
        Binarization::Fixed(level) => level,
    }
}

/// Pixels strictly above the level become 255, everything else 0
pub fn binarize(img: &GrayImage, binarization: Binarization) -> GrayImage {
    let level = binarization_level(img, binarization);
    map_colors(img, |p: Luma<u8>| if p[0] > level { Luma([255u8]) } else { Luma([0u8]) })
}

fn kernel_radius(kernel_size: u32) -> u8 {
    (kernel_size / 2).min(u8::MAX as u32) as u8
}

/// Morphological closing: fills small gaps inside foreground blobs
pub fn close(mask: &GrayImage, kernel_size: u32) -> GrayImage {
    let radius = kernel_radius(kernel_size);
    if radius == 0 {
        return mask.clone();
    }
    morphology::close(mask, Norm::L1, radius)
}

/// Morphological opening: removes specks and thin bridges between blobs
pub fn open(mask: &GrayImage, kernel_size: u32) -> GrayImage {
    let radius = kernel_radius(kernel_size);
    if radius == 0 {
        return mask.clone();
    }
    morphology::open(mask, Norm::L1, radius)
}
