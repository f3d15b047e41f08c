//! Box-set comparison.
//!
//! Used by the metamorphic phase (detections vs. detections on a rotated
//! image) and the differential phase (detections vs. ground truth).

use crate::bbox::{iou, BoundingBox};

/// Outcome of comparing one box set against another.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MatchCount {
    /// Boxes in the first set that found at least one qualifying match.
    pub matched: usize,
    /// Size of the first set (the comparison denominator).
    pub total: usize,
}

impl MatchCount {
    /// Matched boxes as a fraction of the total, or 0 for an empty set.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.matched as f64 / self.total as f64
    }
}

/// Counts boxes in `set_a` that have an IoU of at least `threshold` with some
/// box in `set_b`.
///
/// The scan is greedy: the first qualifying box in `set_b` wins, and a box in
/// `set_b` may match more than one box in `set_a`. This intentionally mirrors
/// the historical scoring; one-to-one assignment would shift percentages on
/// images with overlapping boxes of the same class.
pub fn match_box_sets(set_a: &[BoundingBox], set_b: &[BoundingBox], threshold: f64) -> MatchCount {
    let mut matched = 0;

    for a in set_a {
        for b in set_b {
            if iou(a, b) >= threshold {
                matched += 1;
                break;
            }
        }
    }

    MatchCount {
        matched,
        total: set_a.len(),
    }
}
