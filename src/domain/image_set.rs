// ============================================================
// Layer 3 — Raw Image Sets
// ============================================================
// The unprocessed output of a dataset source: a flat buffer
// of unsigned 8-bit pixels plus one integer label per sample.
//
// Layout of `pixels` (row-major, sample-major):
//   [s0_r0_c0, s0_r0_c1, ..., s0_rH_cW, s1_r0_c0, ...]
//
// Normalisation and one-hot encoding happen in the data layer
// (preprocessor.rs).

use serde::{Deserialize, Serialize};

/// Spatial shape of one image after reshaping: (H, W, C).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageShape {
    pub height:   usize,
    pub width:    usize,
    pub channels: usize,
}

impl ImageShape {
    /// Square image of `size` x `size` with `channels` channels
    pub fn square(size: usize, channels: usize) -> Self {
        Self { height: size, width: size, channels }
    }

    /// Number of scalar values in one image
    pub fn num_values(&self) -> usize {
        self.height * self.width * self.channels
    }
}

/// One split (train or test) of raw pixels and labels.
#[derive(Debug, Clone)]
pub struct RawImageSet {
    /// Number of samples in the split
    pub count:  usize,
    /// Rows per image as reported by the source
    pub rows:   usize,
    /// Columns per image as reported by the source
    pub cols:   usize,
    /// count * rows * cols (* channels) pixel values
    pub pixels: Vec<u8>,
    /// One class id per sample
    pub labels: Vec<u8>,
}

impl RawImageSet {
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Both splits returned by a dataset source.
#[derive(Debug, Clone)]
pub struct RawSplits {
    pub train: RawImageSet,
    pub test:  RawImageSet,
}
