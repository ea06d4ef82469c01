//! Image processing for fusion training.
//!
//! # Modules
//!
//! * `normalization` - Pixel scaling into and out of the network value range
//! * `patching` - Training patch extraction and whole-image padding
//! * `sobel` - Differentiable Sobel gradient used by the content loss

mod normalization;
mod patching;
mod sobel;

pub use normalization::*;
pub use patching::*;
pub use sobel::*;
