//! Utility functions for the fusion pipeline.
//!
//! This module provides image discovery and loading helpers and compute
//! device selection.

pub mod device;
pub mod image;

pub use device::parse_device;
pub use image::{
    discover_images, dynamic_to_gray, gray_to_array, is_supported_image, load_gray_image,
    load_gray_images_batch, load_gray_images_batch_with_threshold,
};

pub use crate::core::{init_tracing, init_tracing_with_log_dir};
