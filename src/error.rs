use std::path::PathBuf;
use thiserror::Error;

/// The main error type for defectcheck operations.
#[derive(Debug, Error)]
pub enum DefectcheckError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No eligible images to sample in {path}")]
    EmptySampleDirectory { path: PathBuf },

    #[error("Model weights not found: {path}")]
    WeightsNotFound { path: PathBuf },

    #[error("Model store not found: {path}")]
    ModelStoreMissing { path: PathBuf },

    #[error("Model store contains no models: {path}")]
    ModelStoreEmpty { path: PathBuf },

    #[error("No model named '{name}' in store {path}")]
    ModelNotFound { name: String, path: PathBuf },

    #[error("Failed to parse model record {path}: {source}")]
    RecordParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write model record {path}: {source}")]
    RecordWrite {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to parse label file {path} line {line}: {message}")]
    LabelParse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Failed to parse {path}: {source}")]
    DataYamlParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid dataset layout at {path}: {message}")]
    DatasetLayout { path: PathBuf, message: String },

    #[error("Failed to decode image {path}: {message}")]
    ImageDecode { path: PathBuf, message: String },

    #[error("Detector error: {message}")]
    Detector { message: String },

    #[error("Evaluation cancelled")]
    Cancelled,
}
