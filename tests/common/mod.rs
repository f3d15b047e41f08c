use std::fs;
use std::path::Path;

/// Builds an in-memory 24-bit BMP filled with one color.
///
/// Real decodable pixels matter here: the evaluator loads, rotates and
/// corrupts these images, so zero-byte placeholders are not enough.
pub fn bmp_bytes(width: u32, height: u32, fill: [u8; 3]) -> Vec<u8> {
    let row_stride = (width * 3).div_ceil(4) * 4;
    let pixel_array_size = row_stride * height;
    let file_size = 54 + pixel_array_size;

    let mut bytes = Vec::with_capacity(file_size as usize);
    bytes.extend_from_slice(b"BM");
    bytes.extend_from_slice(&file_size.to_le_bytes());
    bytes.extend_from_slice(&[0, 0, 0, 0]);
    bytes.extend_from_slice(&54u32.to_le_bytes());

    bytes.extend_from_slice(&40u32.to_le_bytes());
    bytes.extend_from_slice(&(width as i32).to_le_bytes());
    bytes.extend_from_slice(&(height as i32).to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&24u16.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&pixel_array_size.to_le_bytes());
    bytes.extend_from_slice(&2835u32.to_le_bytes());
    bytes.extend_from_slice(&2835u32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());

    // Pixel rows, bottom-up, BGR order, padded to 4 bytes.
    let padding = (row_stride - width * 3) as usize;
    for _ in 0..height {
        for _ in 0..width {
            bytes.extend_from_slice(&[fill[2], fill[1], fill[0]]);
        }
        bytes.extend(std::iter::repeat(0u8).take(padding));
    }
    bytes
}

/// Writes a solid-white BMP, creating parent directories as needed.
pub fn write_bmp(path: &Path, width: u32, height: u32) {
    write_bmp_filled(path, width, height, [255, 255, 255]);
}

pub fn write_bmp_filled(path: &Path, width: u32, height: u32, fill: [u8; 3]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    fs::write(path, bmp_bytes(width, height, fill)).expect("write bmp file");
}

/// Writes a YOLO label file with the given normalized boxes.
#[allow(dead_code)]
pub fn write_label(path: &Path, boxes: &[(u32, f64, f64, f64, f64)]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    let mut content = String::new();
    for (class_id, cx, cy, w, h) in boxes {
        content.push_str(&format!("{class_id} {cx} {cy} {w} {h}\n"));
    }
    fs::write(path, content).expect("write label file");
}
