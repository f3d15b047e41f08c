//! The trained-model store.
//!
//! Each trained model lives in its own folder under the store root, named
//! with its training timestamp, and carries an `info.json` metadata document
//! plus the exported weight artifact. The evaluator reads records, writes the
//! three test-result fields, and resolves the baseline for the differential
//! phase.

use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::DefectcheckError;

/// File name of the metadata document inside a model folder.
pub const RECORD_FILE: &str = "info.json";

/// File name of the exported weight artifact inside a model folder.
pub const WEIGHTS_FILE: &str = "best.onnx";

/// Metadata for one trained model.
///
/// Owned by the training pipeline; the evaluator only writes the three
/// `*_test_result` fields. Every field defaults so records written by older
/// pipeline versions still load.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelRecord {
    pub name: String,
    /// Architecture the model was trained as.
    pub model: String,
    pub date_time_trained: String,
    pub number_of_images: String,
    /// Folder this record was loaded from.
    pub path: String,
    pub epoch: String,
    pub box_loss: String,
    pub cls_loss: String,
    #[serde(rename = "mAP_50")]
    pub map_50: String,
    #[serde(rename = "mAP_50_95")]
    pub map_50_95: String,
    pub precision: String,
    pub recall: String,
    /// Weight artifact this model was fine-tuned from, when known.
    pub starting_model: String,
    pub metamorphic_test_result: String,
    pub differential_test_result: String,
    pub fuzzing_test_result: String,
}

impl ModelRecord {
    /// Loads a record from its `info.json`.
    pub fn load(record_path: &Path) -> Result<Self, DefectcheckError> {
        let content = fs::read_to_string(record_path).map_err(DefectcheckError::Io)?;
        serde_json::from_str(&content).map_err(|source| DefectcheckError::RecordParse {
            path: record_path.to_path_buf(),
            source,
        })
    }

    /// Saves the record back into its folder as `info.json`.
    pub fn save(&self) -> Result<(), DefectcheckError> {
        let folder = PathBuf::from(&self.path);
        fs::create_dir_all(&folder).map_err(DefectcheckError::Io)?;
        let record_path = folder.join(RECORD_FILE);

        let json = serde_json::to_string_pretty(self).map_err(|source| {
            DefectcheckError::RecordWrite {
                path: record_path.clone(),
                source,
            }
        })?;
        fs::write(&record_path, json).map_err(DefectcheckError::Io)?;

        info!("model record saved to {}", record_path.display());
        Ok(())
    }

    /// Path of this model's exported weight artifact.
    pub fn weights_path(&self) -> PathBuf {
        PathBuf::from(&self.path).join(WEIGHTS_FILE)
    }
}

/// A directory of trained-model folders.
#[derive(Clone, Debug)]
pub struct ModelStore {
    root: PathBuf,
}

impl ModelStore {
    /// Opens the store; the root directory must exist.
    pub fn open(root: &Path) -> Result<Self, DefectcheckError> {
        if !root.is_dir() {
            return Err(DefectcheckError::ModelStoreMissing {
                path: root.to_path_buf(),
            });
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Model folder names, most recent first.
    ///
    /// Folder names embed the training timestamp, so a descending
    /// lexicographic sort is newest-first. Placeholder dotfiles are skipped.
    pub fn model_names(&self) -> Result<Vec<String>, DefectcheckError> {
        let mut names = Vec::new();

        for entry in fs::read_dir(&self.root).map_err(DefectcheckError::Io)? {
            let entry = entry.map_err(DefectcheckError::Io)?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if entry.path().is_dir() && !name.starts_with('.') {
                names.push(name);
            }
        }

        names.sort_by(|a, b| b.cmp(a));
        Ok(names)
    }

    /// Loads one record by folder name.
    pub fn load(&self, name: &str) -> Result<ModelRecord, DefectcheckError> {
        let folder = self.root.join(name);
        if !folder.is_dir() {
            return Err(DefectcheckError::ModelNotFound {
                name: name.to_string(),
                path: self.root.clone(),
            });
        }

        let mut record = ModelRecord::load(&folder.join(RECORD_FILE))?;
        // Records travel with their folder; trust the filesystem over a
        // possibly stale stored path.
        record.path = folder.to_string_lossy().into_owned();
        Ok(record)
    }

    /// Loads the most recently trained model.
    pub fn latest(&self) -> Result<ModelRecord, DefectcheckError> {
        let names = self.model_names()?;
        let newest = names.first().ok_or_else(|| DefectcheckError::ModelStoreEmpty {
            path: self.root.clone(),
        })?;
        self.load(newest)
    }

    /// Resolves the weight artifact to compare `current` against.
    ///
    /// Prefers the recorded starting model when it still exists on disk;
    /// otherwise falls back to the second-most-recent store entry, since the
    /// most recent is presumed to be `current` itself. `None` means there is
    /// no baseline and the differential phase short-circuits.
    pub fn comparison_weights(
        &self,
        current: &ModelRecord,
    ) -> Result<Option<PathBuf>, DefectcheckError> {
        if !current.starting_model.is_empty() {
            let starting = PathBuf::from(&current.starting_model);
            if starting.is_file() {
                return Ok(Some(starting));
            }
            info!(
                "starting model {} missing, falling back to store history",
                starting.display()
            );
        }

        let names = self.model_names()?;
        if names.len() < 2 {
            return Ok(None);
        }

        let previous = self.load(&names[1])?;
        Ok(Some(previous.weights_path()))
    }
}
