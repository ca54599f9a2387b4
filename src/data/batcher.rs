// ============================================================
// Layer 4 — Image Batcher
// ============================================================
// Implements Burn's Batcher trait to stack a Vec<ImageSample>
// into two tensors:
//
//   images:  [batch, height, width, channels]   (NHWC)
//   targets: [batch, num_classes]               (one-hot)
//
// All samples share the same shape (validated by the
// preprocessor), so batching is a flatten + reshape.
//
// The loader built here shuffles with a seeded RNG. Burn draws a
// new permutation from that RNG every time `iter()` is called, so
// each epoch (and each evaluation pass) sees a fresh order while
// still visiting every sample exactly once. The last batch of a
// traversal may be smaller than `batch_size`.
//
// Reference: Burn Book §4 (Batcher, DataLoader)

use std::sync::Arc;
use burn::{
    data::dataloader::{batcher::Batcher, DataLoader, DataLoaderBuilder},
    prelude::*,
};

use crate::data::dataset::{ImageDataset, ImageSample};
use crate::domain::image_set::ImageShape;

// ─── ImageBatch ───────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct ImageBatch<B: Backend> {
    /// Normalised pixels, shape [batch_size, height, width, channels]
    pub images: Tensor<B, 4>,

    /// One-hot labels, shape [batch_size, num_classes]
    pub targets: Tensor<B, 2>,
}

// ─── ImageBatcher ─────────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct ImageBatcher<B: Backend> {
    pub device: B::Device,
    pub shape:  ImageShape,
}

impl<B: Backend> ImageBatcher<B> {
    pub fn new(device: B::Device, shape: ImageShape) -> Self {
        Self { device, shape }
    }
}

impl<B: Backend> Batcher<ImageSample, ImageBatch<B>> for ImageBatcher<B> {
    fn batch(&self, items: Vec<ImageSample>) -> ImageBatch<B> {
        let batch_size  = items.len();
        let num_classes = items[0].target.len();
        let ImageShape { height, width, channels } = self.shape;

        let pixels: Vec<f32> = items
            .iter()
            .flat_map(|s| s.pixels.iter().copied())
            .collect();
        let targets: Vec<f32> = items
            .iter()
            .flat_map(|s| s.target.iter().copied())
            .collect();

        let images = Tensor::<B, 4>::from_data(
            TensorData::new(pixels, [batch_size, height, width, channels]),
            &self.device,
        );
        let targets = Tensor::<B, 2>::from_data(
            TensorData::new(targets, [batch_size, num_classes]),
            &self.device,
        );

        ImageBatch { images, targets }
    }
}

/// Build a shuffled, batched loader over one split.
pub fn image_loader<B: Backend>(
    dataset:    ImageDataset,
    shape:      ImageShape,
    batch_size: usize,
    seed:       u64,
    device:     B::Device,
) -> Arc<dyn DataLoader<ImageBatch<B>>> {
    DataLoaderBuilder::new(ImageBatcher::<B>::new(device, shape))
        .batch_size(batch_size)
        .shuffle(seed)
        .build(dataset)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::preprocessor::one_hot;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn samples(count: usize, shape: ImageShape, num_classes: usize) -> Vec<ImageSample> {
        (0..count)
            .map(|i| ImageSample {
                pixels: vec![i as f32; shape.num_values()],
                target: one_hot(i % num_classes, num_classes),
            })
            .collect()
    }

    #[test]
    fn test_batch_shapes_are_nhwc() {
        let shape   = ImageShape::square(4, 1);
        let batcher = ImageBatcher::<TestBackend>::new(Default::default(), shape);
        let batch   = batcher.batch(samples(3, shape, 5));

        assert_eq!(batch.images.dims(),  [3, 4, 4, 1]);
        assert_eq!(batch.targets.dims(), [3, 5]);
    }

    #[test]
    fn test_targets_rows_sum_to_one() {
        let shape   = ImageShape::square(2, 1);
        let batcher = ImageBatcher::<TestBackend>::new(Default::default(), shape);
        let batch   = batcher.batch(samples(4, shape, 3));

        let sums: Vec<f32> = batch.targets.sum_dim(1).into_data().to_vec().unwrap();
        assert!(sums.iter().all(|&s| (s - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_loader_visits_every_sample_once_with_partial_last_batch() {
        let shape   = ImageShape::square(2, 1);
        let dataset = ImageDataset::new(samples(20, shape, 4));
        let loader  = image_loader::<TestBackend>(dataset, shape, 8, 0, Default::default());

        for _ in 0..2 {
            let sizes: Vec<usize> = loader.iter().map(|b| b.images.dims()[0]).collect();
            assert_eq!(sizes.iter().sum::<usize>(), 20);
            assert_eq!(sizes.len(), 3);
            assert!(sizes.contains(&4));

            // Every sample value 0..20 appears exactly once per traversal
            let mut seen: Vec<i64> = loader
                .iter()
                .flat_map(|b| {
                    let first: Vec<f32> = b.images
                        .flatten::<2>(1, 3)
                        .slice([0..b.targets.dims()[0], 0..1])
                        .into_data()
                        .to_vec()
                        .unwrap();
                    first.into_iter().map(|v| v as i64)
                })
                .collect();
            seen.sort_unstable();
            assert_eq!(seen, (0..20).collect::<Vec<_>>());
        }
    }
}
