//! Defectcheck: regression-test harness for X-ray defect detection models.
//!
//! After the training pipeline produces a model, defectcheck exercises it
//! against a randomly sampled image corpus using three independent
//! strategies and writes one summary per strategy back into the model's
//! metadata record:
//!
//! - **metamorphic**: detections must survive a 90-degree rotation of the
//!   input (rotation invariance),
//! - **differential**: scored against ground truth next to the previous
//!   model (regression check),
//! - **fuzzing**: the detector must not fail on corrupted input
//!   (robustness).
//!
//! # Modules
//!
//! - [`bbox`]: normalized bounding boxes, IoU, rotation transform
//! - [`matching`]: greedy box-set comparison
//! - [`sampler`]: randomized test-corpus selection
//! - [`labels`]: YOLO annotation read side
//! - [`corrupt`]: fuzzing-phase image corruptions
//! - [`detect`]: detector adapters (ONNX backend behind the `onnx` feature)
//! - [`store`]: trained-model store and metadata records
//! - [`dataset`]: training-dataset layout resolution
//! - [`evaluate`]: the three-phase orchestrator
//! - [`error`]: error types for defectcheck operations

pub mod bbox;
pub mod corrupt;
pub mod dataset;
pub mod detect;
pub mod error;
pub mod evaluate;
pub mod labels;
pub mod matching;
pub mod sampler;
pub mod store;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use error::DefectcheckError;

use crate::store::ModelStore;

/// The defectcheck CLI application.
#[derive(Parser)]
#[command(name = "defectcheck")]
#[command(version, author, about)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// List the model store with training metrics and stored test results.
    Models(ModelsArgs),

    /// Run the three-phase evaluation against a trained model.
    #[cfg(feature = "onnx")]
    Evaluate(EvaluateArgs),
}

/// Arguments for the models subcommand.
#[derive(clap::Args)]
struct ModelsArgs {
    /// Model store directory.
    #[arg(long)]
    store: PathBuf,

    /// Output format ('text' or 'json').
    #[arg(long, default_value = "text")]
    output: String,
}

/// Arguments for the evaluate subcommand.
#[cfg(feature = "onnx")]
#[derive(clap::Args)]
struct EvaluateArgs {
    /// Model store directory.
    #[arg(long)]
    store: PathBuf,

    /// Model folder name to evaluate (default: most recent).
    #[arg(long)]
    model: Option<String>,

    /// Training dataset root (contains data.yaml, images/, labels/).
    #[arg(long)]
    dataset: PathBuf,

    /// Directory holding the full raw image pool.
    #[arg(long)]
    pool: PathBuf,

    /// Optional label directory for the raw pool.
    #[arg(long)]
    pool_labels: Option<PathBuf>,

    /// Percentage of the train/val splits to sample.
    #[arg(long, default_value_t = 20.0)]
    split_percent: f64,

    /// Percentage of the raw pool to sample.
    #[arg(long, default_value_t = 5.0)]
    pool_percent: f64,

    /// Seed for reproducible sampling and fuzzing.
    #[arg(long)]
    seed: Option<u64>,

    /// IoU threshold for the metamorphic comparison.
    #[arg(long, default_value_t = 0.3)]
    metamorphic_iou: f64,

    /// IoU threshold for scoring against ground truth.
    #[arg(long, default_value_t = 0.5)]
    differential_iou: f64,

    /// Output format ('text' or 'json').
    #[arg(long, default_value = "text")]
    output: String,
}

/// Run the defectcheck CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<(), DefectcheckError> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Models(args)) => run_models(args),
        #[cfg(feature = "onnx")]
        Some(Commands::Evaluate(args)) => run_evaluate(args),
        None => {
            println!("defectcheck {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Regression-test harness for X-ray defect detection models.");
            println!();
            println!("Run 'defectcheck --help' for usage information.");
            Ok(())
        }
    }
}

/// Execute the models subcommand.
fn run_models(args: ModelsArgs) -> Result<(), DefectcheckError> {
    let store = ModelStore::open(&args.store)?;
    let names = store.model_names()?;

    let mut records = Vec::with_capacity(names.len());
    for name in &names {
        records.push(store.load(name)?);
    }

    match args.output.as_str() {
        "json" => {
            let json = serde_json::to_string_pretty(&records).map_err(|source| {
                DefectcheckError::RecordWrite {
                    path: args.store.clone(),
                    source,
                }
            })?;
            println!("{json}");
        }
        _ => {
            if records.is_empty() {
                println!("Model store is empty.");
            }
            for record in &records {
                println!("{}", record.name);
                println!("  architecture: {}", record.model);
                println!("  trained:      {}", record.date_time_trained);
                println!(
                    "  metrics:      precision {} / recall {} / mAP50 {}",
                    record.precision, record.recall, record.map_50
                );
                println!(
                    "  metamorphic:  {}",
                    text_or_dash(&record.metamorphic_test_result)
                );
                println!(
                    "  differential: {}",
                    text_or_dash(&record.differential_test_result)
                );
                println!(
                    "  fuzzing:      {}",
                    text_or_dash(&record.fuzzing_test_result)
                );
                println!();
            }
        }
    }

    Ok(())
}

fn text_or_dash(value: &str) -> &str {
    if value.is_empty() {
        "-"
    } else {
        value
    }
}

/// Execute the evaluate subcommand.
#[cfg(feature = "onnx")]
fn run_evaluate(args: EvaluateArgs) -> Result<(), DefectcheckError> {
    use crate::dataset::DatasetLayout;
    use crate::detect::onnx::{OnnxDetector, OnnxOptions};
    use crate::evaluate::{self, EvalOptions, TestEvent};
    use crate::sampler::{SampleOptions, TestImageSet};

    let store = ModelStore::open(&args.store)?;
    let mut record = match &args.model {
        Some(name) => store.load(name)?,
        None => store.latest()?,
    };

    let layout = DatasetLayout::discover(&args.dataset)?;

    let sample_opts = SampleOptions {
        split_percent: args.split_percent,
        pool_percent: args.pool_percent,
        seed: args.seed,
    };
    let images = TestImageSet::gather(
        &layout.train_images,
        &layout.val_images,
        &args.pool,
        &sample_opts,
    )?;

    let mut label_dirs = vec![layout.train_labels.clone(), layout.val_labels.clone()];
    if let Some(pool_labels) = &args.pool_labels {
        label_dirs.push(pool_labels.clone());
    }

    let detector = OnnxDetector::load(&record.weights_path(), OnnxOptions::default())?;
    let baseline = match store.comparison_weights(&record)? {
        Some(weights) => Some(OnnxDetector::load(&weights, OnnxOptions::default())?),
        None => None,
    };

    let options = EvalOptions {
        metamorphic_iou: args.metamorphic_iou,
        differential_iou: args.differential_iou,
        seed: args.seed,
        ..EvalOptions::default()
    };

    let handle = evaluate::spawn(
        detector,
        baseline,
        images,
        label_dirs,
        record.name.clone(),
        options,
    );

    for event in handle.events.iter() {
        match event {
            TestEvent::Status(line) => println!("{line}"),
            TestEvent::Progress(value) => log::debug!("progress {value}%"),
        }
    }

    let report = handle.join()?;

    match args.output.as_str() {
        "json" => {
            let json = serde_json::to_string_pretty(&report).map_err(|source| {
                DefectcheckError::RecordWrite {
                    path: args.store.clone(),
                    source,
                }
            })?;
            println!("{json}");
        }
        _ => {
            println!();
            println!("{report}");
        }
    }

    report.apply_to(&mut record);
    record.save()?;

    Ok(())
}
