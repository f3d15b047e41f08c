//! The three-phase evaluation orchestrator.
//!
//! After training, a model is exercised against a sampled corpus with three
//! independent strategies: a metamorphic rotation-invariance test, a
//! differential regression test against the previous model, and a fuzzing
//! robustness test on corrupted input. Each phase reduces to one summary
//! string; the caller merges them into the model record.
//!
//! Runs execute on a dedicated worker thread (see [`spawn`]) so a
//! multi-minute evaluation never blocks an interactive caller. Progress and
//! status updates stream over a channel as fire-and-forget events.

mod report;

pub use report::{DifferentialOutcome, EvaluationReport, FuzzingOutcome, MetamorphicOutcome};

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{mpsc, Arc};
use std::thread;

use image::imageops;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::bbox::rotate_90_clockwise;
use crate::corrupt::corrupt_image;
use crate::detect::{load_rgb, Detector};
use crate::error::DefectcheckError;
use crate::labels::{label_path_for, read_label_file};
use crate::matching::match_box_sets;
use crate::sampler::TestImageSet;

/// Options controlling a single evaluation run.
#[derive(Clone, Debug)]
pub struct EvalOptions {
    /// IoU threshold for the metamorphic consistency comparison.
    pub metamorphic_iou: f64,
    /// IoU threshold for scoring detections against ground truth.
    pub differential_iou: f64,
    /// Standard deviation of the fuzzing phase's Gaussian noise.
    pub noise_sigma: f64,
    /// Optional seed driving the fuzzing corruptions.
    pub seed: Option<u64>,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            metamorphic_iou: 0.3,
            differential_iou: 0.5,
            noise_sigma: crate::corrupt::DEFAULT_NOISE_SIGMA,
            seed: None,
        }
    }
}

/// Progress and status notifications emitted while a run executes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TestEvent {
    /// Overall progress in [0, 100], monotonically non-decreasing.
    Progress(u8),
    /// One appended line of human-readable status.
    Status(String),
}

/// Cooperative cancellation flag, checked before each image.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Event emitter that never blocks the worker: channel sends ignore a
/// dropped receiver, and progress is clamped to stay monotonic.
struct Emitter<'a> {
    events: Option<&'a Sender<TestEvent>>,
    last_progress: u8,
}

impl<'a> Emitter<'a> {
    fn new(events: Option<&'a Sender<TestEvent>>) -> Self {
        Self {
            events,
            last_progress: 0,
        }
    }

    fn progress(&mut self, value: u8) {
        let value = value.min(100);
        if value <= self.last_progress {
            return;
        }
        self.last_progress = value;
        if let Some(tx) = self.events {
            let _ = tx.send(TestEvent::Progress(value));
        }
    }

    fn status(&mut self, line: String) {
        info!("{line}");
        if let Some(tx) = self.events {
            let _ = tx.send(TestEvent::Status(line));
        }
    }
}

/// Progress value after `step` of `steps` images in the given phase
/// (0-based), on the unified 0-100 scale split into exact thirds.
fn phase_progress(phase: usize, step: usize, steps: usize) -> u8 {
    let phase_fraction = if steps == 0 {
        1.0
    } else {
        step as f64 / steps as f64
    };
    ((phase as f64 + phase_fraction) / 3.0 * 100.0).round() as u8
}

/// One configured evaluation run over a frozen corpus.
///
/// `detector` is the model under test; `baseline` is the comparison model
/// resolved at setup, or `None` when the store holds no previous model.
pub struct Evaluation<'a, D: Detector> {
    detector: &'a D,
    baseline: Option<&'a D>,
    images: &'a TestImageSet,
    label_dirs: Vec<PathBuf>,
    model_name: String,
    options: EvalOptions,
}

impl<'a, D: Detector> Evaluation<'a, D> {
    pub fn new(
        detector: &'a D,
        baseline: Option<&'a D>,
        images: &'a TestImageSet,
        label_dirs: Vec<PathBuf>,
        model_name: String,
        options: EvalOptions,
    ) -> Self {
        Self {
            detector,
            baseline,
            images,
            label_dirs,
            model_name,
            options,
        }
    }

    /// Runs all three phases in order and returns the aggregate report.
    ///
    /// A phase failure is absorbed into that phase's outcome so the remaining
    /// phases still run; cancellation aborts the whole run with
    /// [`DefectcheckError::Cancelled`] and nothing is persisted.
    pub fn run(
        &self,
        events: Option<&Sender<TestEvent>>,
        cancel: &CancelToken,
    ) -> Result<EvaluationReport, DefectcheckError> {
        let mut emitter = Emitter::new(events);

        let metamorphic = match self.metamorphic_phase(&mut emitter, cancel) {
            Ok(outcome) => outcome,
            Err(error) => MetamorphicOutcome::Failed {
                error: phase_failure(&mut emitter, error)?,
            },
        };
        emitter.progress(phase_progress(0, 1, 1));

        let differential = match self.differential_phase(&mut emitter, cancel) {
            Ok(outcome) => outcome,
            Err(error) => DifferentialOutcome::Failed {
                error: phase_failure(&mut emitter, error)?,
            },
        };
        emitter.progress(phase_progress(1, 1, 1));

        let fuzzing = match self.fuzzing_phase(&mut emitter, cancel) {
            Ok(outcome) => outcome,
            Err(error) => FuzzingOutcome::Failed {
                error: phase_failure(&mut emitter, error)?,
            },
        };
        emitter.progress(100);

        Ok(EvaluationReport {
            model_name: self.model_name.clone(),
            corpus_size: self.images.len(),
            metamorphic,
            differential,
            fuzzing,
        })
    }

    fn metamorphic_phase(
        &self,
        emitter: &mut Emitter<'_>,
        cancel: &CancelToken,
    ) -> Result<MetamorphicOutcome, DefectcheckError> {
        let total_images = self.images.len();
        let mut total_matched = 0;
        let mut total_boxes = 0;

        for (index, path) in self.images.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(DefectcheckError::Cancelled);
            }

            let image = load_rgb(path)?;
            let original_boxes = self.detector.detect_image(&image)?;

            // Rotating the detections predicts what the detector should see
            // on the rotated pixels; the comparison is prediction vs. actual.
            let predicted = rotate_90_clockwise(&original_boxes);
            let rotated_image = imageops::rotate90(&image);
            let rotated_boxes = self.detector.detect_image(&rotated_image)?;

            let count = match_box_sets(&predicted, &rotated_boxes, self.options.metamorphic_iou);
            total_matched += count.matched;
            total_boxes += count.total;

            emitter.status(format!(
                "Metamorphic test ({}/{}) {} - matched {}/{}",
                index + 1,
                total_images,
                display_name(path),
                count.matched,
                count.total,
            ));
            emitter.progress(phase_progress(0, index + 1, total_images));
        }

        let outcome = MetamorphicOutcome::Matched {
            matched: total_matched,
            total: total_boxes,
        };
        emitter.status(format!("Metamorphic test finished: {}", outcome.summary()));
        Ok(outcome)
    }

    fn differential_phase(
        &self,
        emitter: &mut Emitter<'_>,
        cancel: &CancelToken,
    ) -> Result<DifferentialOutcome, DefectcheckError> {
        let Some(baseline) = self.baseline else {
            let outcome = DifferentialOutcome::NoBaseline;
            emitter.status(format!("Differential test skipped: {}", outcome.summary()));
            return Ok(outcome);
        };

        let total_images = self.images.len();
        let mut current_matched = 0;
        let mut previous_matched = 0;
        let mut total_truth = 0;

        for (index, path) in self.images.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(DefectcheckError::Cancelled);
            }

            let truth = self.ground_truth_for(path)?;
            let image = load_rgb(path)?;

            let current = match_box_sets(
                &truth,
                &self.detector.detect_image(&image)?,
                self.options.differential_iou,
            );
            let previous = match_box_sets(
                &truth,
                &baseline.detect_image(&image)?,
                self.options.differential_iou,
            );

            current_matched += current.matched;
            previous_matched += previous.matched;
            total_truth += truth.len();

            emitter.status(format!(
                "Differential test ({}/{}) {} - current {}/{}, previous {}/{}",
                index + 1,
                total_images,
                display_name(path),
                current.matched,
                truth.len(),
                previous.matched,
                truth.len(),
            ));
            emitter.progress(phase_progress(1, index + 1, total_images));
        }

        let outcome = DifferentialOutcome::Compared {
            current_matched,
            previous_matched,
            total_truth,
            images: total_images,
        };
        emitter.status(format!("Differential test finished: {}", outcome.summary()));
        Ok(outcome)
    }

    fn fuzzing_phase(
        &self,
        emitter: &mut Emitter<'_>,
        cancel: &CancelToken,
    ) -> Result<FuzzingOutcome, DefectcheckError> {
        let total_images = self.images.len();
        let mut passed = 0;

        // Corruption randomness follows the run seed so fuzzing fixtures can
        // be replayed; the xor keeps it decorrelated from the sampler.
        let mut rng = match self.options.seed {
            Some(seed) => StdRng::seed_from_u64(seed ^ 0xf0cc),
            None => StdRng::from_rng(&mut rand::rng()),
        };

        for (index, path) in self.images.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(DefectcheckError::Cancelled);
            }

            // Any error from decode or detection counts as a robustness
            // failure for this image; the run always continues.
            let result = load_rgb(path).and_then(|mut image| {
                corrupt_image(&mut image, self.options.noise_sigma, &mut rng);
                self.detector.detect_image(&image)
            });

            match result {
                Ok(_) => {
                    passed += 1;
                    emitter.status(format!(
                        "Fuzzing test ({}/{}) {} - passed",
                        index + 1,
                        total_images,
                        display_name(path),
                    ));
                }
                Err(error) => {
                    emitter.status(format!(
                        "Fuzzing test ({}/{}) {} - FAILED: {error}",
                        index + 1,
                        total_images,
                        display_name(path),
                    ));
                }
            }
            emitter.progress(phase_progress(2, index + 1, total_images));
        }

        let outcome = FuzzingOutcome::Completed {
            passed,
            total: total_images,
        };
        emitter.status(format!("Fuzzing test finished: {}", outcome.summary()));
        Ok(outcome)
    }

    /// Ground-truth boxes for an image, searching the configured label
    /// directories in order. A missing label file is zero boxes, not an
    /// error.
    fn ground_truth_for(
        &self,
        image_path: &std::path::Path,
    ) -> Result<Vec<crate::bbox::BoundingBox>, DefectcheckError> {
        for dir in &self.label_dirs {
            let candidate = label_path_for(image_path, dir);
            if candidate.is_file() {
                return read_label_file(&candidate);
            }
        }
        Ok(Vec::new())
    }
}

/// Absorbs a phase error into its textual form, letting cancellation alone
/// propagate out of the run.
fn phase_failure(
    emitter: &mut Emitter<'_>,
    error: DefectcheckError,
) -> Result<String, DefectcheckError> {
    if matches!(error, DefectcheckError::Cancelled) {
        return Err(DefectcheckError::Cancelled);
    }
    warn!("test phase aborted: {error}");
    emitter.status(format!("Test phase aborted: {error}"));
    Ok(error.to_string())
}

fn display_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Handle to an evaluation running on its worker thread.
pub struct EvaluationHandle {
    /// Stream of progress/status events; safe to drop without stalling the run.
    pub events: Receiver<TestEvent>,
    cancel: CancelToken,
    worker: thread::JoinHandle<Result<EvaluationReport, DefectcheckError>>,
}

impl EvaluationHandle {
    /// Token for cooperative cancellation, checked before each image.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Waits for the run to finish and returns its report.
    pub fn join(self) -> Result<EvaluationReport, DefectcheckError> {
        self.worker
            .join()
            .unwrap_or_else(|_| {
                Err(DefectcheckError::Detector {
                    message: "evaluation worker panicked".to_string(),
                })
            })
    }
}

/// Spawns an evaluation on a dedicated worker thread.
///
/// The detectors move into the worker and are released when it finishes,
/// whether the run completes, fails or is cancelled.
pub fn spawn<D>(
    detector: D,
    baseline: Option<D>,
    images: TestImageSet,
    label_dirs: Vec<PathBuf>,
    model_name: String,
    options: EvalOptions,
) -> EvaluationHandle
where
    D: Detector + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let cancel = CancelToken::new();
    let worker_cancel = cancel.clone();

    let worker = thread::spawn(move || {
        Evaluation::new(
            &detector,
            baseline.as_ref(),
            &images,
            label_dirs,
            model_name,
            options,
        )
        .run(Some(&tx), &worker_cancel)
    });

    EvaluationHandle {
        events: rx,
        cancel,
        worker,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_splits_into_exact_thirds() {
        assert_eq!(phase_progress(0, 0, 4), 0);
        assert_eq!(phase_progress(0, 4, 4), 33);
        assert_eq!(phase_progress(1, 4, 4), 67);
        assert_eq!(phase_progress(2, 4, 4), 100);
        // Empty phases jump straight to their boundary.
        assert_eq!(phase_progress(1, 0, 0), 67);
    }

    #[test]
    fn emitter_progress_is_monotonic() {
        let (tx, rx) = mpsc::channel();
        let mut emitter = Emitter::new(Some(&tx));
        emitter.progress(10);
        emitter.progress(5);
        emitter.progress(10);
        emitter.progress(33);
        drop(emitter);
        drop(tx);

        let values: Vec<_> = rx
            .iter()
            .filter_map(|e| match e {
                TestEvent::Progress(v) => Some(v),
                _ => None,
            })
            .collect();
        assert_eq!(values, vec![10, 33]);
    }

    #[test]
    fn emitter_survives_dropped_receiver() {
        let (tx, rx) = mpsc::channel();
        drop(rx);
        let mut emitter = Emitter::new(Some(&tx));
        emitter.progress(50);
        emitter.status("still running".to_string());
    }

    #[test]
    fn cancel_token_flips_once() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
        assert!(token.clone().is_cancelled());
    }
}
