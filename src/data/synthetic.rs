// ============================================================
// Layer 4 — Synthetic Image Source
// ============================================================
// Generates random square grayscale-style images with labels
// drawn uniformly from 0..num_classes. Useful for smoke-testing
// the whole pipeline without downloading MNIST.
//
// Seeded, so two sources built with the same arguments produce
// byte-identical splits.

use anyhow::{ensure, Result};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::domain::image_set::{RawImageSet, RawSplits};
use crate::domain::traits::ImageSource;

pub struct SyntheticSource {
    train_count: usize,
    test_count:  usize,
    image_size:  usize,
    channels:    usize,
    num_classes: usize,
    seed:        u64,
}

impl SyntheticSource {
    pub fn new(
        train_count: usize,
        test_count:  usize,
        image_size:  usize,
        channels:    usize,
        num_classes: usize,
        seed:        u64,
    ) -> Self {
        Self { train_count, test_count, image_size, channels, num_classes, seed }
    }

    fn generate(&self, rng: &mut StdRng, count: usize) -> RawImageSet {
        let values = count * self.image_size * self.image_size * self.channels;
        let pixels = (0..values).map(|_| rng.gen::<u8>()).collect();
        let labels = (0..count)
            .map(|_| rng.gen_range(0..self.num_classes) as u8)
            .collect();
        RawImageSet {
            count,
            rows: self.image_size,
            cols: self.image_size,
            pixels,
            labels,
        }
    }
}

impl ImageSource for SyntheticSource {
    fn load_splits(&self) -> Result<RawSplits> {
        ensure!(
            (1..=256).contains(&self.num_classes),
            "synthetic labels are stored as u8, got {} classes",
            self.num_classes
        );
        let mut rng = StdRng::seed_from_u64(self.seed);
        let train = self.generate(&mut rng, self.train_count);
        let test  = self.generate(&mut rng, self.test_count);
        tracing::info!(
            "Generated synthetic dataset: {} train / {} test images of {}x{}",
            train.count, test.count, self.image_size, self.image_size
        );
        Ok(RawSplits { train, test })
    }
}
