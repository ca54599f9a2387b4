// ============================================================
// Layer 4 — IDX Dataset Loader
// ============================================================
// Loads MNIST-style datasets stored in the IDX binary format.
//
// How IDX files work:
//   A big-endian header followed by raw unsigned bytes.
//
//   images (magic 0x00000803):
//     u32 magic | u32 count | u32 rows | u32 cols | count*rows*cols bytes
//
//   labels (magic 0x00000801):
//     u32 magic | u32 count | count bytes
//
// The four files are expected under one directory with the
// names used by the original MNIST distribution:
//   train-images-idx3-ubyte   train-labels-idx1-ubyte
//   t10k-images-idx3-ubyte    t10k-labels-idx1-ubyte
//
// A missing, truncated or mislabelled file is fatal.
//
// Reference: http://yann.lecun.com/exdb/mnist/ (file format)
//            Rust Book §9 (Error Handling)

use anyhow::{bail, ensure, Context, Result};
use std::{fs, path::{Path, PathBuf}};

use crate::domain::image_set::{RawImageSet, RawSplits};
use crate::domain::traits::ImageSource;

const IMAGES_MAGIC: u32 = 0x0000_0803;
const LABELS_MAGIC: u32 = 0x0000_0801;

pub const TRAIN_IMAGES: &str = "train-images-idx3-ubyte";
pub const TRAIN_LABELS: &str = "train-labels-idx1-ubyte";
pub const TEST_IMAGES:  &str = "t10k-images-idx3-ubyte";
pub const TEST_LABELS:  &str = "t10k-labels-idx1-ubyte";

/// Loads the train and test splits from a directory of IDX files.
/// Implements the ImageSource trait from Layer 3.
pub struct IdxLoader {
    dir: PathBuf,
}

impl IdxLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn load_split(&self, images_file: &str, labels_file: &str) -> Result<RawImageSet> {
        let (count, rows, cols, pixels) = read_idx_images(&self.dir.join(images_file))?;
        let labels = read_idx_labels(&self.dir.join(labels_file))?;

        ensure!(
            labels.len() == count,
            "'{}' holds {} images but '{}' holds {} labels",
            images_file, count, labels_file, labels.len()
        );

        Ok(RawImageSet { count, rows, cols, pixels, labels })
    }
}

impl ImageSource for IdxLoader {
    fn load_splits(&self) -> Result<RawSplits> {
        tracing::info!("Reading IDX files from '{}'", self.dir.display());
        let train = self.load_split(TRAIN_IMAGES, TRAIN_LABELS)?;
        let test  = self.load_split(TEST_IMAGES, TEST_LABELS)?;
        tracing::info!("Loaded {} train / {} test images", train.count, test.count);
        Ok(RawSplits { train, test })
    }
}

/// Read a big-endian u32 at `offset` and advance past it.
fn read_be_u32(data: &[u8], offset: &mut usize) -> Result<u32> {
    let bytes: [u8; 4] = data
        .get(*offset..*offset + 4)
        .and_then(|b| b.try_into().ok())
        .context("IDX header is truncated")?;
    *offset += 4;
    Ok(u32::from_be_bytes(bytes))
}

/// Parse an IDX image file into (count, rows, cols, pixels).
pub fn read_idx_images(path: &Path) -> Result<(usize, usize, usize, Vec<u8>)> {
    let data = fs::read(path)
        .with_context(|| format!("Cannot read image file '{}'", path.display()))?;
    parse_idx_images(&data)
        .with_context(|| format!("Malformed image file '{}'", path.display()))
}

/// Parse an IDX label file into one byte per sample.
pub fn read_idx_labels(path: &Path) -> Result<Vec<u8>> {
    let data = fs::read(path)
        .with_context(|| format!("Cannot read label file '{}'", path.display()))?;
    parse_idx_labels(&data)
        .with_context(|| format!("Malformed label file '{}'", path.display()))
}

fn parse_idx_images(data: &[u8]) -> Result<(usize, usize, usize, Vec<u8>)> {
    let mut offset = 0usize;
    let magic = read_be_u32(data, &mut offset)?;
    if magic != IMAGES_MAGIC {
        bail!("bad magic number {magic:#010x}, expected {IMAGES_MAGIC:#010x}");
    }
    let count = read_be_u32(data, &mut offset)? as usize;
    let rows  = read_be_u32(data, &mut offset)? as usize;
    let cols  = read_be_u32(data, &mut offset)? as usize;

    let end = count
        .checked_mul(rows)
        .and_then(|n| n.checked_mul(cols))
        .and_then(|body| body.checked_add(offset))
        .with_context(|| format!("header declares an impossible size {count}x{rows}x{cols}"))?;
    ensure!(
        data.len() >= end,
        "expected {} pixel bytes, found {}",
        end - offset,
        data.len() - offset
    );

    Ok((count, rows, cols, data[offset..end].to_vec()))
}

fn parse_idx_labels(data: &[u8]) -> Result<Vec<u8>> {
    let mut offset = 0usize;
    let magic = read_be_u32(data, &mut offset)?;
    if magic != LABELS_MAGIC {
        bail!("bad magic number {magic:#010x}, expected {LABELS_MAGIC:#010x}");
    }
    let count = read_be_u32(data, &mut offset)? as usize;
    let end = offset
        .checked_add(count)
        .with_context(|| format!("header declares an impossible label count {count}"))?;
    ensure!(
        data.len() >= end,
        "expected {} label bytes, found {}",
        count,
        data.len() - offset
    );
    Ok(data[offset..end].to_vec())
}

/// Encode images in IDX format.
#[cfg(test)]
pub fn encode_idx_images(count: usize, rows: usize, cols: usize, pixels: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(16 + pixels.len());
    for v in [IMAGES_MAGIC, count as u32, rows as u32, cols as u32] {
        out.extend_from_slice(&v.to_be_bytes());
    }
    out.extend_from_slice(pixels);
    out
}

/// Encode labels in IDX format.
#[cfg(test)]
pub fn encode_idx_labels(labels: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + labels.len());
    out.extend_from_slice(&LABELS_MAGIC.to_be_bytes());
    out.extend_from_slice(&(labels.len() as u32).to_be_bytes());
    out.extend_from_slice(labels);
    out
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn write_split(dir: &Path, images: &str, labels: &str, count: usize) {
        let pixels: Vec<u8> = (0..count * 4).map(|i| (i % 256) as u8).collect();
        let lbls:   Vec<u8> = (0..count).map(|i| (i % 10) as u8).collect();
        fs::write(dir.join(images), encode_idx_images(count, 2, 2, &pixels)).unwrap();
        fs::write(dir.join(labels), encode_idx_labels(&lbls)).unwrap();
    }

    #[test]
    fn test_loads_both_splits() {
        let dir = tempfile::tempdir().unwrap();
        write_split(dir.path(), TRAIN_IMAGES, TRAIN_LABELS, 6);
        write_split(dir.path(), TEST_IMAGES,  TEST_LABELS,  3);

        let splits = IdxLoader::new(dir.path()).load_splits().unwrap();
        assert_eq!(splits.train.count, 6);
        assert_eq!(splits.train.rows,  2);
        assert_eq!(splits.train.cols,  2);
        assert_eq!(splits.train.pixels.len(), 24);
        assert_eq!(splits.test.labels, vec![0, 1, 2]);
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = IdxLoader::new(dir.path().join("nope")).load_splits();
        assert!(err.is_err());
    }

    #[test]
    fn test_rejects_wrong_magic() {
        let data = encode_idx_labels(&[1, 2, 3]);
        // A label file is not an image file
        assert!(parse_idx_images(&data).is_err());
    }

    #[test]
    fn test_rejects_truncated_images() {
        let mut data = encode_idx_images(2, 2, 2, &[0u8; 8]);
        data.truncate(data.len() - 1);
        assert!(parse_idx_images(&data).is_err());
    }

    #[test]
    fn test_rejects_oversized_image_header() {
        let mut data = Vec::new();
        for v in [IMAGES_MAGIC, u32::MAX, u32::MAX, u32::MAX] {
            data.extend_from_slice(&v.to_be_bytes());
        }
        data.extend_from_slice(&[0u8; 16]);
        assert!(parse_idx_images(&data).is_err());
    }

    #[test]
    fn test_rejects_oversized_label_header() {
        let mut data = Vec::new();
        for v in [LABELS_MAGIC, u32::MAX] {
            data.extend_from_slice(&v.to_be_bytes());
        }
        data.extend_from_slice(&[1, 2, 3]);
        assert!(parse_idx_labels(&data).is_err());
    }

    #[test]
    fn test_rejects_truncated_header() {
        assert!(parse_idx_labels(&[0, 0, 8]).is_err());
    }

    #[test]
    fn test_label_count_mismatch_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write_split(dir.path(), TRAIN_IMAGES, TRAIN_LABELS, 4);
        write_split(dir.path(), TEST_IMAGES,  TEST_LABELS,  2);
        fs::write(dir.path().join(TEST_LABELS), encode_idx_labels(&[1])).unwrap();
        assert!(IdxLoader::new(dir.path()).load_splits().is_err());
    }
}
