//! Read side of the YOLO annotation format.
//!
//! One box per line, whitespace-separated: `class cx cy w h`, all normalized
//! floats. The evaluator only ever reads labels; writing them belongs to the
//! annotation editor.

use std::fs;
use std::path::{Path, PathBuf};

use crate::bbox::BoundingBox;
use crate::error::DefectcheckError;

/// File extensions treated as images when pairing labels with images.
pub const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "png", "jpeg", "bmp", "webp"];

/// File extension of annotation files.
pub const LABEL_EXTENSION: &str = "txt";

/// Returns the annotation path for an image: same stem, `.txt`, in `labels_dir`.
///
/// The file is not required to exist; differential scoring treats a missing
/// label file as zero ground-truth boxes.
pub fn label_path_for(image_path: &Path, labels_dir: &Path) -> PathBuf {
    let stem = image_path
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_default();
    labels_dir.join(stem).with_extension(LABEL_EXTENSION)
}

/// Reads all bounding boxes from a YOLO label file.
///
/// Blank lines are skipped; any malformed line is an error carrying the path
/// and line number.
pub fn read_label_file(path: &Path) -> Result<Vec<BoundingBox>, DefectcheckError> {
    let content = fs::read_to_string(path).map_err(DefectcheckError::Io)?;
    let mut boxes = Vec::new();

    for (line_idx, line) in content.lines().enumerate() {
        let line_num = line_idx + 1;
        if let Some(parsed) = parse_label_line(line, path, line_num)? {
            boxes.push(parsed);
        }
    }

    Ok(boxes)
}

fn parse_label_line(
    line: &str,
    file_path: &Path,
    line_num: usize,
) -> Result<Option<BoundingBox>, DefectcheckError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    // Take at most 6 tokens so pathological inputs do not allocate unbounded memory.
    let tokens: Vec<&str> = trimmed.split_whitespace().take(6).collect();

    if tokens.len() != 5 {
        return Err(DefectcheckError::LabelParse {
            path: file_path.to_path_buf(),
            line: line_num,
            message: format!("expected 5 fields, found {}", tokens.len()),
        });
    }

    let class_id: u32 = tokens[0]
        .parse()
        .map_err(|_| DefectcheckError::LabelParse {
            path: file_path.to_path_buf(),
            line: line_num,
            message: format!("invalid class id '{}'", tokens[0]),
        })?;

    let mut fields = [0.0f64; 4];
    for (slot, token) in fields.iter_mut().zip(&tokens[1..]) {
        *slot = token.parse().map_err(|_| DefectcheckError::LabelParse {
            path: file_path.to_path_buf(),
            line: line_num,
            message: format!("invalid coordinate '{}'", token),
        })?;
    }

    Ok(Some(BoundingBox::new(
        class_id, fields[0], fields[1], fields[2], fields[3],
    )))
}

/// Returns true if the path has one of the allowed extensions (case-insensitive).
pub fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
        return false;
    };

    allowed
        .iter()
        .any(|allowed_ext| ext.eq_ignore_ascii_case(allowed_ext))
}
