//! Normalized bounding boxes and the IoU engine.
//!
//! Detections and ground-truth annotations are both represented as
//! center-format boxes in normalized coordinates (fractions of the image
//! width/height), so every comparison is resolution-independent.

use serde::{Deserialize, Serialize};

/// An axis-aligned bounding box in normalized center format.
///
/// `cx`/`cy` locate the box center and `w`/`h` its extent, all in [0, 1]
/// relative to the image dimensions. This is the YOLO label convention;
/// geometry helpers convert to corner form on demand.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub class_id: u32,
    pub cx: f64,
    pub cy: f64,
    pub w: f64,
    pub h: f64,
}

impl BoundingBox {
    /// Creates a new box from center coordinates and extents.
    #[inline]
    pub fn new(class_id: u32, cx: f64, cy: f64, w: f64, h: f64) -> Self {
        Self {
            class_id,
            cx,
            cy,
            w,
            h,
        }
    }

    /// Returns the minimum x coordinate (left edge).
    #[inline]
    pub fn xmin(&self) -> f64 {
        self.cx - self.w / 2.0
    }

    /// Returns the minimum y coordinate (top edge).
    #[inline]
    pub fn ymin(&self) -> f64 {
        self.cy - self.h / 2.0
    }

    /// Returns the maximum x coordinate (right edge).
    #[inline]
    pub fn xmax(&self) -> f64 {
        self.cx + self.w / 2.0
    }

    /// Returns the maximum y coordinate (bottom edge).
    #[inline]
    pub fn ymax(&self) -> f64 {
        self.cy + self.h / 2.0
    }

    /// Returns the area of the box.
    #[inline]
    pub fn area(&self) -> f64 {
        self.w * self.h
    }

    /// Returns true if all coordinates are finite (not NaN or infinite).
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.cx.is_finite() && self.cy.is_finite() && self.w.is_finite() && self.h.is_finite()
    }
}

/// Intersection over union between two boxes.
///
/// Returns a value in [0, 1]. Non-overlapping boxes score 0; a pair of
/// zero-area boxes also scores 0 rather than dividing by zero.
pub fn iou(box1: &BoundingBox, box2: &BoundingBox) -> f64 {
    let inter_xmin = box1.xmin().max(box2.xmin());
    let inter_ymin = box1.ymin().max(box2.ymin());
    let inter_xmax = box1.xmax().min(box2.xmax());
    let inter_ymax = box1.ymax().min(box2.ymax());

    // Negative extents mean no overlap; clamp so the area never goes negative.
    let inter_area =
        (inter_xmax - inter_xmin).max(0.0) * (inter_ymax - inter_ymin).max(0.0);

    // Areas from the same corner arithmetic as the intersection, so identical
    // boxes divide to exactly 1.
    let box1_area = (box1.xmax() - box1.xmin()) * (box1.ymax() - box1.ymin());
    let box2_area = (box2.xmax() - box2.xmin()) * (box2.ymax() - box2.ymin());

    let union = box1_area + box2_area - inter_area;
    if union == 0.0 {
        return 0.0;
    }

    inter_area / union
}

/// Maps boxes to their equivalents after a 90-degree clockwise rotation of
/// the underlying image.
///
/// Under that rotation a normalized point (x, y) lands at (1 - y, x), and the
/// box extents swap axes. Class ids are unchanged. Matches the pixel-level
/// effect of [`image::imageops::rotate90`].
pub fn rotate_90_clockwise(boxes: &[BoundingBox]) -> Vec<BoundingBox> {
    boxes
        .iter()
        .map(|b| BoundingBox {
            class_id: b.class_id,
            cx: 1.0 - b.cy,
            cy: b.cx,
            w: b.h,
            h: b.w,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn corner_accessors() {
        let b = BoundingBox::new(0, 0.5, 0.5, 0.4, 0.2);
        assert!(close(b.xmin(), 0.3));
        assert!(close(b.ymin(), 0.4));
        assert!(close(b.xmax(), 0.7));
        assert!(close(b.ymax(), 0.6));
    }

    #[test]
    fn iou_identical_boxes_is_one() {
        let b = BoundingBox::new(0, 0.5, 0.5, 0.2, 0.2);
        assert!(close(iou(&b, &b), 1.0));
    }

    #[test]
    fn iou_is_symmetric() {
        let a = BoundingBox::new(0, 0.4, 0.4, 0.3, 0.3);
        let b = BoundingBox::new(0, 0.5, 0.5, 0.2, 0.4);
        assert!(close(iou(&a, &b), iou(&b, &a)));
    }

    #[test]
    fn iou_disjoint_boxes_is_zero() {
        let a = BoundingBox::new(0, 0.1, 0.1, 0.1, 0.1);
        let b = BoundingBox::new(0, 0.9, 0.9, 0.1, 0.1);
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn iou_zero_area_boxes_do_not_divide_by_zero() {
        let a = BoundingBox::new(0, 0.5, 0.5, 0.0, 0.0);
        let b = BoundingBox::new(0, 0.5, 0.5, 0.0, 0.0);
        let v = iou(&a, &b);
        assert_eq!(v, 0.0);
        assert!(v.is_finite());
    }

    #[test]
    fn iou_half_overlap() {
        // Two 0.2x0.2 boxes offset by half a width: inter 0.1x0.2 = 0.02,
        // union 0.04 + 0.04 - 0.02 = 0.06.
        let a = BoundingBox::new(0, 0.4, 0.5, 0.2, 0.2);
        let b = BoundingBox::new(0, 0.5, 0.5, 0.2, 0.2);
        assert!(close(iou(&a, &b), 0.02 / 0.06));
    }

    #[test]
    fn rotation_matches_worked_example() {
        let boxes = [BoundingBox::new(0, 0.2, 0.3, 0.1, 0.2)];
        let rotated = rotate_90_clockwise(&boxes);
        assert!(close(rotated[0].cx, 0.7));
        assert!(close(rotated[0].cy, 0.2));
        assert!(close(rotated[0].w, 0.2));
        assert!(close(rotated[0].h, 0.1));
    }

    #[test]
    fn rotation_four_times_is_identity() {
        let boxes = vec![
            BoundingBox::new(0, 0.2, 0.3, 0.1, 0.2),
            BoundingBox::new(0, 0.71, 0.09, 0.05, 0.33),
        ];
        let mut rotated = boxes.clone();
        for _ in 0..4 {
            rotated = rotate_90_clockwise(&rotated);
        }
        for (orig, back) in boxes.iter().zip(&rotated) {
            assert!(close(orig.cx, back.cx));
            assert!(close(orig.cy, back.cy));
            assert!(close(orig.w, back.w));
            assert!(close(orig.h, back.h));
        }
    }

    #[test]
    fn rotation_preserves_class_id() {
        let boxes = [BoundingBox::new(3, 0.5, 0.5, 0.1, 0.1)];
        assert_eq!(rotate_90_clockwise(&boxes)[0].class_id, 3);
    }
}
