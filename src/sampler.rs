//! Randomized test-corpus sampling.
//!
//! Each evaluation run draws a bounded random subset of images from the
//! training split, the validation split and the full raw pool, then freezes
//! the combined corpus for all three test phases.

use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use walkdir::WalkDir;

use crate::error::DefectcheckError;
use crate::labels::{has_extension, IMAGE_EXTENSIONS};

/// Options controlling how the test corpus is drawn.
#[derive(Clone, Copy, Debug)]
pub struct SampleOptions {
    /// Percentage of the train and val splits to sample.
    pub split_percent: f64,
    /// Percentage of the raw image pool to sample.
    pub pool_percent: f64,
    /// Optional seed for reproducible corpora.
    pub seed: Option<u64>,
}

impl Default for SampleOptions {
    fn default() -> Self {
        Self {
            split_percent: 20.0,
            pool_percent: 5.0,
            seed: None,
        }
    }
}

/// The frozen image corpus for one evaluation run.
///
/// Immutable once gathered; phases iterate it in order, so a run processes
/// the same images in the same sequence in every phase.
#[derive(Clone, Debug)]
pub struct TestImageSet {
    images: Vec<PathBuf>,
}

impl TestImageSet {
    /// Draws the three pools and combines them into one corpus.
    ///
    /// Pools are sampled independently (train, then val, then raw pool) so a
    /// pinned seed yields the same corpus regardless of pool sizes changing
    /// elsewhere.
    pub fn gather(
        train_dir: &Path,
        val_dir: &Path,
        pool_dir: &Path,
        opts: &SampleOptions,
    ) -> Result<Self, DefectcheckError> {
        let mut images = Vec::new();
        images.extend(sample_images(
            train_dir,
            opts.split_percent,
            opts.seed,
        )?);
        images.extend(sample_images(val_dir, opts.split_percent, opts.seed.map(|s| s ^ 1))?);
        images.extend(sample_images(pool_dir, opts.pool_percent, opts.seed.map(|s| s ^ 2))?);

        Ok(Self { images })
    }

    /// Builds a corpus from an explicit image list (test fixtures).
    pub fn from_images(images: Vec<PathBuf>) -> Self {
        Self { images }
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PathBuf> {
        self.images.iter()
    }
}

/// Samples `percentage` percent of the image files in `directory`, uniformly
/// without replacement, but always at least one.
///
/// Only regular files with image extensions count; dotfiles such as the
/// `.gitignore` placeholders that keep empty data directories in version
/// control are ignored. An empty eligible population is an error rather than
/// an empty sample.
pub fn sample_images(
    directory: &Path,
    percentage: f64,
    seed: Option<u64>,
) -> Result<Vec<PathBuf>, DefectcheckError> {
    let mut files = list_image_files(directory)?;

    if files.is_empty() {
        return Err(DefectcheckError::EmptySampleDirectory {
            path: directory.to_path_buf(),
        });
    }

    let count = sample_count(files.len(), percentage);

    if let Some(seed) = seed {
        let mut rng = StdRng::seed_from_u64(seed);
        files.shuffle(&mut rng);
    } else {
        let mut rng = rand::rng();
        files.shuffle(&mut rng);
    }

    files.truncate(count);
    Ok(files)
}

/// `max(1, floor(total * percentage / 100))`.
pub fn sample_count(total: usize, percentage: f64) -> usize {
    let raw = (total as f64 * (percentage / 100.0)).floor() as usize;
    raw.max(1)
}

fn list_image_files(directory: &Path) -> Result<Vec<PathBuf>, DefectcheckError> {
    let mut files = Vec::new();

    for entry in WalkDir::new(directory).max_depth(1).follow_links(true) {
        let entry = entry.map_err(|source| DefectcheckError::DatasetLayout {
            path: directory.to_path_buf(),
            message: format!("failed while listing directory: {source}"),
        })?;

        let name = entry.file_name().to_string_lossy();
        if entry.file_type().is_file()
            && !name.starts_with('.')
            && has_extension(entry.path(), &IMAGE_EXTENSIONS)
        {
            files.push(entry.path().to_path_buf());
        }
    }

    // Deterministic base order before the shuffle, so a pinned seed is stable
    // across filesystems.
    files.sort();
    Ok(files)
}
