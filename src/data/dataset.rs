use burn::data::dataset::Dataset;
use std::sync::Arc;

/// One normalised image and its one-hot target.
/// `pixels` is laid out (H, W, C), row-major.
#[derive(Debug, Clone)]
pub struct ImageSample {
    pub pixels: Vec<f32>,
    pub target: Vec<f32>,
}

/// A split of prepared samples. Cloning is cheap (shared storage)
/// so the same split can feed both a training and an evaluation loader.
#[derive(Debug, Clone)]
pub struct ImageDataset {
    samples: Arc<Vec<ImageSample>>,
}

impl ImageDataset {
    pub fn new(samples: Vec<ImageSample>) -> Self {
        Self { samples: Arc::new(samples) }
    }

    pub fn sample_count(&self) -> usize { self.samples.len() }
}

impl Dataset<ImageSample> for ImageDataset {
    fn get(&self, index: usize) -> Option<ImageSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}
