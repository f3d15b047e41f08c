//! Evaluation report types and text formatting.
//!
//! The orchestrator returns one immutable [`EvaluationReport`] per run; the
//! caller merges the summary strings into the model record and persists it.
//! Reports render as text (Display) or serialize as JSON.

use serde::Serialize;
use std::fmt;

use crate::store::ModelRecord;

/// Result of the metamorphic (rotation-invariance) phase.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum MetamorphicOutcome {
    /// Accumulated match counts across the corpus.
    Matched { matched: usize, total: usize },
    /// The phase aborted; the error is carried as text.
    Failed { error: String },
}

impl MetamorphicOutcome {
    /// The summary string persisted onto the model record.
    pub fn summary(&self) -> String {
        match self {
            Self::Matched { total: 0, .. } => {
                "0 matches found (no bounding boxes detected in either orientation)".to_string()
            }
            Self::Matched { matched, total } => {
                let pct = *matched as f64 / *total as f64 * 100.0;
                format!("{pct:.1}% Matched out of {total} Total")
            }
            Self::Failed { error } => format!("Test failed: {error}"),
        }
    }
}

/// Result of the differential (regression vs. previous model) phase.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum DifferentialOutcome {
    /// Both models scored against the same ground truth.
    Compared {
        current_matched: usize,
        previous_matched: usize,
        total_truth: usize,
        images: usize,
    },
    /// No baseline model exists; the phase short-circuits as a pass.
    NoBaseline,
    /// The phase aborted; the error is carried as text.
    Failed { error: String },
}

impl DifferentialOutcome {
    /// Signed percentage-point difference, positive when the current model
    /// matched more ground truth than the baseline. Zero ground truth scores
    /// both models as zero.
    pub fn difference_points(&self) -> Option<f64> {
        match self {
            Self::Compared {
                current_matched,
                previous_matched,
                total_truth,
                ..
            } => {
                if *total_truth == 0 {
                    return Some(0.0);
                }
                let current = *current_matched as f64 / *total_truth as f64;
                let previous = *previous_matched as f64 / *total_truth as f64;
                Some((current - previous) * 100.0)
            }
            _ => None,
        }
    }

    /// The summary string persisted onto the model record.
    pub fn summary(&self) -> String {
        match self {
            Self::Compared { images, .. } => {
                let diff = self.difference_points().expect("compared outcome has a difference");
                format!("{diff:+.1} percentage points vs previous model over {images} images")
            }
            Self::NoBaseline => "No previous model found, test passed".to_string(),
            Self::Failed { error } => format!("Test failed: {error}"),
        }
    }
}

/// Result of the fuzzing (robustness) phase.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum FuzzingOutcome {
    /// Completed detector calls vs. corpus size.
    Completed { passed: usize, total: usize },
    /// The phase aborted; the error is carried as text.
    Failed { error: String },
}

impl FuzzingOutcome {
    /// The summary string persisted onto the model record.
    pub fn summary(&self) -> String {
        match self {
            Self::Completed { total: 0, .. } => "No images to fuzz".to_string(),
            Self::Completed { passed, total } => {
                let pct = *passed as f64 / *total as f64 * 100.0;
                format!("{pct:.0}% Passed out of {total} Images")
            }
            Self::Failed { error } => format!("Test failed: {error}"),
        }
    }
}

/// Aggregate result of one three-phase evaluation run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EvaluationReport {
    /// Model folder name the run evaluated.
    pub model_name: String,
    /// Number of images in the sampled corpus.
    pub corpus_size: usize,
    pub metamorphic: MetamorphicOutcome,
    pub differential: DifferentialOutcome,
    pub fuzzing: FuzzingOutcome,
}

impl EvaluationReport {
    /// Copies the three summary strings onto a model record.
    ///
    /// The caller is responsible for saving the record afterwards; a
    /// cancelled or aborted run never reaches this point.
    pub fn apply_to(&self, record: &mut ModelRecord) {
        record.metamorphic_test_result = self.metamorphic.summary();
        record.differential_test_result = self.differential.summary();
        record.fuzzing_test_result = self.fuzzing.summary();
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Model:        {}", self.model_name)?;
        writeln!(f, "Test corpus:  {} image(s)", self.corpus_size)?;
        writeln!(f, "Metamorphic:  {}", self.metamorphic.summary())?;
        writeln!(f, "Differential: {}", self.differential.summary())?;
        writeln!(f, "Fuzzing:      {}", self.fuzzing.summary())
    }
}
