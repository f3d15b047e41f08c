//! ONNX detector backend.
//!
//! Loads an exported YOLO weight artifact with tract and reduces its raw
//! head output to normalized center boxes. Expects the common
//! `[1, rows, 5 + classes]` export layout: per row `cx cy w h` in input-size
//! pixels, an objectness score, then one score per class.

use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::RgbImage;
use log::{debug, info};
use tract_onnx::prelude::*;

use crate::bbox::{iou, BoundingBox};
use crate::detect::Detector;
use crate::error::DefectcheckError;

type RunnableOnnx = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Inference thresholds and input geometry.
#[derive(Clone, Copy, Debug)]
pub struct OnnxOptions {
    /// Square model input edge, in pixels.
    pub input_size: u32,
    /// Minimum objectness * class score to keep a row.
    pub confidence_threshold: f32,
    /// IoU above which overlapping detections are suppressed.
    pub nms_iou: f64,
}

impl Default for OnnxOptions {
    fn default() -> Self {
        Self {
            input_size: 640,
            confidence_threshold: 0.25,
            nms_iou: 0.45,
        }
    }
}

/// A detector backed by a tract-loaded ONNX model.
pub struct OnnxDetector {
    model: RunnableOnnx,
    weights_path: PathBuf,
    options: OnnxOptions,
}

impl OnnxDetector {
    /// Loads and optimizes the model from an exported `.onnx` artifact.
    pub fn load(weights_path: &Path, options: OnnxOptions) -> Result<Self, DefectcheckError> {
        if !weights_path.is_file() {
            return Err(DefectcheckError::WeightsNotFound {
                path: weights_path.to_path_buf(),
            });
        }

        info!("loading ONNX model from {}", weights_path.display());

        let size = options.input_size as i64;
        let model = tract_onnx::onnx()
            .model_for_path(weights_path)
            .and_then(|m| {
                m.with_input_fact(
                    0,
                    InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)),
                )
            })
            .and_then(|m| m.into_optimized())
            .and_then(|m| m.into_runnable())
            .map_err(|source| DefectcheckError::Detector {
                message: format!("failed to load {}: {source}", weights_path.display()),
            })?;

        Ok(Self {
            model,
            weights_path: weights_path.to_path_buf(),
            options,
        })
    }

    /// Path of the loaded weight artifact.
    pub fn weights_path(&self) -> &Path {
        &self.weights_path
    }

    fn preprocess(&self, image: &RgbImage) -> Tensor {
        let size = self.options.input_size;
        let resized = image::imageops::resize(image, size, size, FilterType::Triangle);

        tract_ndarray::Array4::from_shape_fn(
            (1, 3, size as usize, size as usize),
            |(_, channel, y, x)| resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
        )
        .into()
    }

    fn decode(&self, output: &Tensor) -> Result<Vec<BoundingBox>, DefectcheckError> {
        let view = output
            .to_array_view::<f32>()
            .map_err(|source| DefectcheckError::Detector {
                message: format!("unexpected output tensor: {source}"),
            })?;
        let view = view
            .into_dimensionality::<tract_ndarray::Ix3>()
            .map_err(|_| DefectcheckError::Detector {
                message: format!("unsupported output shape {:?}", output.shape()),
            })?;

        if view.shape()[2] < 6 {
            return Err(DefectcheckError::Detector {
                message: format!("unsupported output shape {:?}", view.shape()),
            });
        }

        let scale = self.options.input_size as f64;
        let mut candidates: Vec<(BoundingBox, f32)> = Vec::new();

        for row in view.index_axis(tract_ndarray::Axis(0), 0).rows() {
            let objectness = row[4];
            let (class_id, class_score) = row
                .iter()
                .skip(5)
                .enumerate()
                .fold((0usize, f32::MIN), |best, (idx, score)| {
                    if *score > best.1 {
                        (idx, *score)
                    } else {
                        best
                    }
                });

            let confidence = objectness * class_score;
            if confidence < self.options.confidence_threshold {
                continue;
            }

            candidates.push((
                BoundingBox::new(
                    class_id as u32,
                    row[0] as f64 / scale,
                    row[1] as f64 / scale,
                    row[2] as f64 / scale,
                    row[3] as f64 / scale,
                ),
                confidence,
            ));
        }

        Ok(non_max_suppress(candidates, self.options.nms_iou))
    }
}

impl Detector for OnnxDetector {
    fn detect_image(&self, image: &RgbImage) -> Result<Vec<BoundingBox>, DefectcheckError> {
        let input = self.preprocess(image);
        let outputs = self
            .model
            .run(tvec!(input.into_tvalue()))
            .map_err(|source| DefectcheckError::Detector {
                message: format!("inference failed: {source}"),
            })?;

        let boxes = self.decode(&outputs[0])?;
        debug!("detected {} box(es)", boxes.len());
        Ok(boxes)
    }
}

/// Greedy non-maximum suppression over confidence-ranked candidates.
fn non_max_suppress(mut candidates: Vec<(BoundingBox, f32)>, nms_iou: f64) -> Vec<BoundingBox> {
    candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut kept: Vec<BoundingBox> = Vec::new();
    for (candidate, _) in candidates {
        if kept.iter().all(|existing| iou(existing, &candidate) < nms_iou) {
            kept.push(candidate);
        }
    }
    kept
}
