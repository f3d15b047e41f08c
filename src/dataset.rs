//! Training-dataset layout resolution.
//!
//! The training pipeline writes an Ultralytics-style dataset: a root with
//! `data.yaml` plus `images/{train,val}` and `labels/{train,val}` trees. The
//! evaluator resolves that layout to find its sampling pools and ground-truth
//! labels.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::DefectcheckError;

/// Resolved dataset directories used by an evaluation run.
#[derive(Clone, Debug)]
pub struct DatasetLayout {
    pub train_images: PathBuf,
    pub val_images: PathBuf,
    pub train_labels: PathBuf,
    pub val_labels: PathBuf,
    /// Class names from `data.yaml`, in class-id order.
    pub class_names: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct DataYaml {
    #[serde(default)]
    train: Option<String>,
    #[serde(default)]
    val: Option<String>,
    names: DataYamlNames,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DataYamlNames {
    Sequence(Vec<String>),
    Mapping(BTreeMap<usize, String>),
}

impl DatasetLayout {
    /// Resolves the layout under a dataset root containing `data.yaml`.
    ///
    /// `train`/`val` entries in the yaml are taken relative to the root when
    /// present; otherwise the conventional `images/train` and `images/val`
    /// are assumed. Label directories mirror the image directories with the
    /// `images` component replaced by `labels`.
    pub fn discover(root: &Path) -> Result<Self, DefectcheckError> {
        if !root.is_dir() {
            return Err(DefectcheckError::DatasetLayout {
                path: root.to_path_buf(),
                message: "dataset root must be a directory".to_string(),
            });
        }

        let yaml_path = root.join("data.yaml");
        let parsed: Option<DataYaml> = if yaml_path.is_file() {
            let data = fs::read_to_string(&yaml_path).map_err(DefectcheckError::Io)?;
            Some(serde_yaml::from_str(&data).map_err(|source| {
                DefectcheckError::DataYamlParse {
                    path: yaml_path.clone(),
                    source,
                }
            })?)
        } else {
            None
        };

        let (train_rel, val_rel, class_names) = match parsed {
            Some(yaml) => {
                let names = match yaml.names {
                    DataYamlNames::Sequence(names) => names,
                    DataYamlNames::Mapping(mapping) => flatten_name_mapping(mapping),
                };
                (
                    yaml.train.unwrap_or_else(|| "images/train".to_string()),
                    yaml.val.unwrap_or_else(|| "images/val".to_string()),
                    names,
                )
            }
            None => (
                "images/train".to_string(),
                "images/val".to_string(),
                Vec::new(),
            ),
        };

        let train_images = root.join(&train_rel);
        let val_images = root.join(&val_rel);

        for dir in [&train_images, &val_images] {
            if !dir.is_dir() {
                return Err(DefectcheckError::DatasetLayout {
                    path: dir.clone(),
                    message: "missing image directory".to_string(),
                });
            }
        }

        let train_labels = labels_dir_for(&train_images, root);
        let val_labels = labels_dir_for(&val_images, root);

        Ok(Self {
            train_images,
            val_images,
            train_labels,
            val_labels,
            class_names,
        })
    }
}

/// Maps an image directory to its label directory by swapping the `images`
/// path component for `labels` (the Ultralytics convention).
fn labels_dir_for(images_dir: &Path, root: &Path) -> PathBuf {
    let rel = images_dir.strip_prefix(root).unwrap_or(images_dir);
    let swapped: PathBuf = rel
        .components()
        .map(|c| {
            if c.as_os_str() == "images" {
                std::ffi::OsString::from("labels")
            } else {
                c.as_os_str().to_os_string()
            }
        })
        .collect();
    root.join(swapped)
}

fn flatten_name_mapping(mapping: BTreeMap<usize, String>) -> Vec<String> {
    if mapping.is_empty() {
        return Vec::new();
    }

    let max_index = *mapping.keys().max().expect("checked non-empty");
    let mut names = vec![String::new(); max_index + 1];
    for (index, name) in mapping {
        names[index] = name;
    }
    for (index, name) in names.iter_mut().enumerate() {
        if name.trim().is_empty() {
            *name = format!("class_{}", index);
        }
    }
    names
}
