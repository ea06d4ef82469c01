//! Utility functions for image discovery and loading.
//!
//! Source datasets are flat directories of numbered images (`1.bmp`, `2.bmp`,
//! ...). Infrared and visible images are paired by position after sorting, so
//! the ordering rules here decide which images get fused together.

use crate::core::FusionError;
use crate::core::constants::{DEFAULT_PARALLEL_THRESHOLD, SUPPORTED_EXTENSIONS};
use image::{DynamicImage, GrayImage};
use ndarray::Array2;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

/// Converts a DynamicImage to an 8-bit GrayImage.
pub fn dynamic_to_gray(img: DynamicImage) -> GrayImage {
    img.to_luma8()
}

/// Loads an image from a file path and converts it to grayscale.
///
/// # Errors
///
/// Returns `FusionError::ImageLoad` if the file cannot be opened or decoded.
pub fn load_gray_image(path: &Path) -> Result<GrayImage, FusionError> {
    let img = image::open(path).map_err(FusionError::ImageLoad)?;
    Ok(dynamic_to_gray(img))
}

/// Loads a batch of grayscale images, preserving input order.
pub fn load_gray_images_batch<P: AsRef<Path> + Send + Sync>(
    paths: &[P],
) -> Result<Vec<GrayImage>, FusionError> {
    load_gray_images_batch_with_threshold(paths, None)
}

/// Loads a batch of grayscale images with a custom parallel threshold.
///
/// # Arguments
///
/// * `paths` - A slice of paths to the image files to load
/// * `parallel_threshold` - An optional threshold for parallel processing.
///   If `None`, the default threshold from `DEFAULT_PARALLEL_THRESHOLD` is used.
///
/// # Errors
///
/// Returns the first error encountered if any image cannot be loaded.
pub fn load_gray_images_batch_with_threshold<P: AsRef<Path> + Send + Sync>(
    paths: &[P],
    parallel_threshold: Option<usize>,
) -> Result<Vec<GrayImage>, FusionError> {
    let threshold = parallel_threshold.unwrap_or(DEFAULT_PARALLEL_THRESHOLD);

    if paths.len() > threshold {
        use rayon::prelude::*;
        paths
            .par_iter()
            .map(|p| load_gray_image(p.as_ref()))
            .collect()
    } else {
        paths.iter().map(|p| load_gray_image(p.as_ref())).collect()
    }
}

/// Returns true if the path has one of the supported image extensions.
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
        .unwrap_or(false)
}

/// Orders paths by numeric file stem, falling back to lexicographic order.
///
/// Numeric stems come first in numeric order (`2` before `10`); anything else
/// follows in plain string order.
fn compare_by_stem(a: &Path, b: &Path) -> Ordering {
    let stem = |p: &Path| {
        p.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    };
    let (sa, sb) = (stem(a), stem(b));
    match (sa.parse::<u64>(), sb.parse::<u64>()) {
        (Ok(na), Ok(nb)) => na.cmp(&nb).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => sa.cmp(&sb).then_with(|| a.cmp(b)),
    }
}

/// Lists the supported images directly inside `dir`, sorted by file stem.
///
/// The scan is not recursive.
///
/// # Errors
///
/// Returns `FusionError::Io` if the directory cannot be read.
pub fn discover_images(dir: &Path) -> Result<Vec<PathBuf>, FusionError> {
    let mut images = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_supported_image(&path) {
            images.push(path);
        }
    }
    images.sort_by(|a, b| compare_by_stem(a, b));
    Ok(images)
}

/// Views a grayscale image as a `(height, width)` array.
pub fn gray_to_array(img: &GrayImage) -> Array2<u8> {
    let (width, height) = img.dimensions();
    Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
        img.get_pixel(x as u32, y as u32)[0]
    })
}
