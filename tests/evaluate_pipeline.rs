//! Integration tests for the three-phase evaluation orchestrator.
//!
//! A stub detector returning canned boxes makes the metamorphic and
//! differential phases deterministic; fuzzing failures are injected by
//! keying the stub on image width, which survives corruption.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use image::RgbImage;

use defectcheck::bbox::BoundingBox;
use defectcheck::detect::Detector;
use defectcheck::error::DefectcheckError;
use defectcheck::evaluate::{
    spawn, CancelToken, DifferentialOutcome, EvalOptions, Evaluation, FuzzingOutcome,
    MetamorphicOutcome, TestEvent,
};
use defectcheck::sampler::TestImageSet;
use defectcheck::store::ModelRecord;

mod common;
use common::{write_bmp, write_label};

/// Detector stub returning a fixed box set.
///
/// Fails when asked to detect on a corrupted buffer (any black pixel, which
/// the occlusion corruption guarantees on our all-white fixtures) whose
/// width is in the fail set.
struct StubDetector {
    boxes: Vec<BoundingBox>,
    fail_corrupted_widths: HashSet<u32>,
}

impl StubDetector {
    fn returning(boxes: Vec<BoundingBox>) -> Self {
        Self {
            boxes,
            fail_corrupted_widths: HashSet::new(),
        }
    }
}

impl Detector for StubDetector {
    fn detect_image(&self, image: &RgbImage) -> Result<Vec<BoundingBox>, DefectcheckError> {
        let corrupted = image.pixels().any(|p| p.0 == [0, 0, 0]);
        if corrupted && self.fail_corrupted_widths.contains(&image.width()) {
            return Err(DefectcheckError::Detector {
                message: "synthetic backend crash".to_string(),
            });
        }
        Ok(self.boxes.clone())
    }
}

/// A centered square box is invariant under the 90-degree rotation mapping,
/// so a stub returning it scores a perfect metamorphic match.
fn centered_box() -> BoundingBox {
    BoundingBox::new(0, 0.5, 0.5, 0.4, 0.4)
}

/// Writes `count` white BMPs with distinct widths and returns the corpus.
fn seed_corpus(dir: &Path, count: usize) -> TestImageSet {
    let mut paths = Vec::new();
    for index in 0..count {
        let path = dir.join(format!("scan_{index:02}.bmp"));
        write_bmp(&path, 100 + index as u32, 40);
        paths.push(path);
    }
    TestImageSet::from_images(paths)
}

fn options_with_seed() -> EvalOptions {
    EvalOptions {
        seed: Some(1),
        ..EvalOptions::default()
    }
}

#[test]
fn identical_baseline_reports_zero_point_difference() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let images = seed_corpus(temp.path(), 5);

    let labels_dir = temp.path().join("labels");
    for index in 0..5 {
        let b = centered_box();
        write_label(
            &labels_dir.join(format!("scan_{index:02}.txt")),
            &[(b.class_id, b.cx, b.cy, b.w, b.h)],
        );
    }

    let current = StubDetector::returning(vec![centered_box()]);
    let baseline = StubDetector::returning(vec![centered_box()]);

    let report = Evaluation::new(
        &current,
        Some(&baseline),
        &images,
        vec![labels_dir],
        "test-model".to_string(),
        options_with_seed(),
    )
    .run(None, &CancelToken::new())
    .expect("run evaluation");

    assert_eq!(
        report.metamorphic,
        MetamorphicOutcome::Matched {
            matched: 5,
            total: 5
        }
    );
    assert_eq!(
        report.differential.summary(),
        "+0.0 percentage points vs previous model over 5 images"
    );
    assert_eq!(report.fuzzing.summary(), "100% Passed out of 5 Images");

    let mut record = ModelRecord::default();
    report.apply_to(&mut record);
    assert_eq!(
        record.metamorphic_test_result,
        "100.0% Matched out of 5 Total"
    );
    assert_eq!(
        record.differential_test_result,
        "+0.0 percentage points vs previous model over 5 images"
    );
    assert_eq!(record.fuzzing_test_result, "100% Passed out of 5 Images");
}

#[test]
fn better_current_model_reports_positive_difference() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let images = seed_corpus(temp.path(), 4);

    let labels_dir = temp.path().join("labels");
    for index in 0..4 {
        let b = centered_box();
        write_label(
            &labels_dir.join(format!("scan_{index:02}.txt")),
            &[(b.class_id, b.cx, b.cy, b.w, b.h)],
        );
    }

    // The baseline detects a far-away box that never reaches the 0.5 IoU bar.
    let current = StubDetector::returning(vec![centered_box()]);
    let baseline = StubDetector::returning(vec![BoundingBox::new(0, 0.05, 0.05, 0.05, 0.05)]);

    let report = Evaluation::new(
        &current,
        Some(&baseline),
        &images,
        vec![labels_dir],
        "test-model".to_string(),
        options_with_seed(),
    )
    .run(None, &CancelToken::new())
    .expect("run evaluation");

    assert_eq!(
        report.differential,
        DifferentialOutcome::Compared {
            current_matched: 4,
            previous_matched: 0,
            total_truth: 4,
            images: 4
        }
    );
    assert_eq!(
        report.differential.summary(),
        "+100.0 percentage points vs previous model over 4 images"
    );
}

#[test]
fn zero_detections_yield_defined_metamorphic_result() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let images = seed_corpus(temp.path(), 3);

    let silent = StubDetector::returning(Vec::new());

    let report = Evaluation::new(
        &silent,
        None,
        &images,
        vec![temp.path().join("labels")],
        "test-model".to_string(),
        options_with_seed(),
    )
    .run(None, &CancelToken::new())
    .expect("run evaluation");

    assert_eq!(
        report.metamorphic.summary(),
        "0 matches found (no bounding boxes detected in either orientation)"
    );
    assert_eq!(report.fuzzing.summary(), "100% Passed out of 3 Images");
}

#[test]
fn no_baseline_short_circuits_and_advances_progress() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let images = seed_corpus(temp.path(), 3);

    let detector = StubDetector::returning(vec![centered_box()]);
    let (tx, rx) = mpsc::channel();

    let report = Evaluation::new(
        &detector,
        None,
        &images,
        Vec::new(),
        "test-model".to_string(),
        options_with_seed(),
    )
    .run(Some(&tx), &CancelToken::new())
    .expect("run evaluation");
    drop(tx);

    assert_eq!(report.differential, DifferentialOutcome::NoBaseline);
    assert_eq!(
        report.differential.summary(),
        "No previous model found, test passed"
    );

    let events: Vec<TestEvent> = rx.iter().collect();
    let progress: Vec<u8> = events
        .iter()
        .filter_map(|e| match e {
            TestEvent::Progress(v) => Some(*v),
            _ => None,
        })
        .collect();

    // Monotonic, reaches the two-thirds boundary when the phase skips, and
    // finishes at 100.
    assert!(progress.windows(2).all(|w| w[0] < w[1]));
    assert!(progress.contains(&67));
    assert_eq!(progress.last(), Some(&100));

    assert!(events.iter().any(|e| matches!(
        e,
        TestEvent::Status(line) if line.contains("No previous model found")
    )));
}

#[test]
fn fuzzing_failures_are_counted_not_propagated() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let images = seed_corpus(temp.path(), 10);

    // Images #7 and #9 (1-indexed) have widths 106 and 108.
    let detector = StubDetector {
        boxes: Vec::new(),
        fail_corrupted_widths: HashSet::from([106, 108]),
    };
    let (tx, rx) = mpsc::channel();

    let report = Evaluation::new(
        &detector,
        None,
        &images,
        Vec::new(),
        "test-model".to_string(),
        options_with_seed(),
    )
    .run(Some(&tx), &CancelToken::new())
    .expect("run evaluation");
    drop(tx);

    assert_eq!(
        report.fuzzing,
        FuzzingOutcome::Completed {
            passed: 8,
            total: 10
        }
    );
    assert_eq!(report.fuzzing.summary(), "80% Passed out of 10 Images");

    let failures = rx
        .iter()
        .filter(|e| matches!(e, TestEvent::Status(line) if line.contains("FAILED")))
        .count();
    assert_eq!(failures, 2);
}

#[test]
fn missing_ground_truth_counts_as_zero_boxes() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let images = seed_corpus(temp.path(), 3);

    let current = StubDetector::returning(vec![centered_box()]);
    let baseline = StubDetector::returning(vec![centered_box()]);

    // No label files exist anywhere.
    let report = Evaluation::new(
        &current,
        Some(&baseline),
        &images,
        vec![temp.path().join("labels")],
        "test-model".to_string(),
        options_with_seed(),
    )
    .run(None, &CancelToken::new())
    .expect("run evaluation");

    assert_eq!(
        report.differential,
        DifferentialOutcome::Compared {
            current_matched: 0,
            previous_matched: 0,
            total_truth: 0,
            images: 3
        }
    );
    assert_eq!(
        report.differential.summary(),
        "+0.0 percentage points vs previous model over 3 images"
    );
}

#[test]
fn cancellation_aborts_the_run() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let images = seed_corpus(temp.path(), 3);

    let detector = StubDetector::returning(vec![centered_box()]);
    let token = CancelToken::new();
    token.cancel();

    let result = Evaluation::new(
        &detector,
        None,
        &images,
        Vec::new(),
        "test-model".to_string(),
        options_with_seed(),
    )
    .run(None, &token);

    assert!(matches!(result, Err(DefectcheckError::Cancelled)));
}

#[test]
fn spawned_run_streams_events_and_joins() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let images = seed_corpus(temp.path(), 3);

    let detector = StubDetector::returning(vec![centered_box()]);
    let handle = spawn(
        detector,
        None,
        images,
        Vec::<PathBuf>::new(),
        "test-model".to_string(),
        options_with_seed(),
    );

    let events: Vec<TestEvent> = handle.events.iter().collect();
    let report = handle.join().expect("join evaluation");

    assert_eq!(report.corpus_size, 3);
    assert_eq!(report.model_name, "test-model");
    assert!(events
        .iter()
        .any(|e| matches!(e, TestEvent::Progress(100))));
}
