//! Detector adapters.
//!
//! The evaluator treats the detection model as an opaque capability: given an
//! image, return normalized bounding boxes. Backends implement [`Detector`];
//! the only shipped backend wraps an exported ONNX artifact (feature `onnx`),
//! and tests substitute stub detectors returning canned boxes.

#[cfg(feature = "onnx")]
pub mod onnx;

#[cfg(feature = "onnx")]
pub use onnx::OnnxDetector;

use std::path::Path;

use image::RgbImage;

use crate::bbox::BoundingBox;
use crate::error::DefectcheckError;

/// An object-detection backend.
///
/// Implementations reduce whatever their runtime produces (confidences,
/// letterboxed pixel coordinates) to plain normalized center boxes.
pub trait Detector {
    /// Runs detection on an in-memory pixel buffer.
    ///
    /// The fuzzing phase synthesizes corrupted buffers that never exist on
    /// disk, so this is the required entry point.
    fn detect_image(&self, image: &RgbImage) -> Result<Vec<BoundingBox>, DefectcheckError>;

    /// Runs detection on an image file.
    fn detect_path(&self, path: &Path) -> Result<Vec<BoundingBox>, DefectcheckError> {
        let image = load_rgb(path)?;
        self.detect_image(&image)
    }
}

/// Decodes an image file into an RGB pixel buffer.
pub fn load_rgb(path: &Path) -> Result<RgbImage, DefectcheckError> {
    let decoded = image::open(path).map_err(|source| DefectcheckError::ImageDecode {
        path: path.to_path_buf(),
        message: source.to_string(),
    })?;
    Ok(decoded.to_rgb8())
}
