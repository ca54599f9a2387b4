// ============================================================
// Layer 4 — Image Preprocessor
// ============================================================
// Turns raw u8 image arrays into model-ready samples.
//
// Steps (applied per sample):
//   1. Validate the split shape (fatal on mismatch)
//   2. Reshape (N, H, W) → (N, H, W, C)
//   3. Cast to f32 and normalise: v / 127.5 - 1.0
//        0   → -1.0
//        255 →  1.0
//   4. One-hot encode the label to a vector of num_classes
//
// Reference: Rust Book §9 (Error Handling), §13 (Iterators)

use anyhow::{ensure, Result};

use crate::data::dataset::ImageSample;
use crate::domain::image_set::{ImageShape, RawImageSet};

/// Map a pixel from [0, 255] to [-1, 1].
pub fn normalize_pixel(value: u8) -> f32 {
    value as f32 / 127.5 - 1.0
}

/// One-hot encode `label` into a vector of length `num_classes`.
pub fn one_hot(label: usize, num_classes: usize) -> Vec<f32> {
    let mut row = vec![0.0f32; num_classes];
    row[label] = 1.0;
    row
}

pub struct Preprocessor {
    shape:       ImageShape,
    num_classes: usize,
}

impl Preprocessor {
    pub fn new(shape: ImageShape, num_classes: usize) -> Self {
        Self { shape, num_classes }
    }

    /// Validate and convert one split. `split` only names the split in errors.
    pub fn prepare(&self, split: &str, raw: &RawImageSet) -> Result<Vec<ImageSample>> {
        self.validate(split, raw)?;

        let per_image = self.shape.num_values();
        let samples = raw
            .pixels
            .chunks_exact(per_image)
            .zip(raw.labels.iter())
            .map(|(pixels, &label)| ImageSample {
                pixels: pixels.iter().copied().map(normalize_pixel).collect(),
                target: one_hot(label as usize, self.num_classes),
            })
            .collect::<Vec<_>>();

        tracing::debug!(
            "Prepared {} split: {} samples of {:?}",
            split,
            samples.len(),
            self.shape
        );
        Ok(samples)
    }

    fn validate(&self, split: &str, raw: &RawImageSet) -> Result<()> {
        let ImageShape { height, width, channels } = self.shape;

        ensure!(!raw.is_empty(), "{split} split is empty");
        ensure!(
            height == width,
            "images must be square, configured {height}x{width}"
        );
        ensure!(
            raw.rows == height && raw.cols == width,
            "{split} images are {}x{}, expected {}x{}",
            raw.rows, raw.cols, height, width
        );
        ensure!(
            raw.pixels.len() == raw.count * self.shape.num_values(),
            "{split} split has {} pixel values, cannot reshape to ({}, {}, {}, {})",
            raw.pixels.len(), raw.count, height, width, channels
        );
        ensure!(
            raw.labels.len() == raw.count,
            "{split} split has {} images but {} labels",
            raw.count, raw.labels.len()
        );
        if let Some(bad) = raw.labels.iter().find(|&&l| l as usize >= self.num_classes) {
            anyhow::bail!(
                "{split} split contains label {bad}, outside 0..{}",
                self.num_classes
            );
        }
        Ok(())
    }
}
