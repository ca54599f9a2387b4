// ============================================================
// Layer 5 — Evaluation / Metric Engine
// ============================================================
// Loss and accuracy shared by the training loop and the
// `evaluate` command.
//
//   loss      mean over the batch of  -Σ_k target_k · log softmax(logits)_k
//   accuracy  correct / total, where a sample is correct when
//             argmax(logits) == argmax(one-hot target)
//
// `evaluate` runs one full traversal of a loader with a model on
// a non-autodiff backend, so no gradients are recorded. A fresh
// accumulator is used per call.
//
// Reference: Burn Book §5 (Training)

use anyhow::Result;
use burn::{
    backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice, NdArray, Wgpu},
    data::dataloader::DataLoader,
    prelude::*,
    tensor::activation::log_softmax,
};

use crate::application::train_use_case::{BackendKind, ModelChoice, TrainConfig};
use crate::data::{batcher::{image_loader, ImageBatch}, dataset::ImageDataset};
use crate::infra::checkpoint::CheckpointManager;
use crate::infra::summary::SummaryWriter;
use crate::ml::classifier::ImageClassifier;

/// Running correct/total counter.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct AccuracyAccumulator {
    correct: usize,
    total:   usize,
}

impl AccuracyAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one (predicted, true) class-index pair.
    #[cfg(test)]
    pub fn record(&mut self, predicted: usize, truth: usize) {
        self.total += 1;
        if predicted == truth {
            self.correct += 1;
        }
    }

    /// Feed a batch that was already reduced to counts on device.
    pub fn record_counts(&mut self, correct: usize, total: usize) {
        debug_assert!(correct <= total, "{correct} correct out of {total}");
        self.correct += correct;
        self.total   += total;
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// correct / total; an empty pass is 0.0
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }
}

/// Mean softmax cross-entropy against one-hot targets → shape [1].
pub fn softmax_cross_entropy<B: Backend>(
    logits:  Tensor<B, 2>,
    targets: Tensor<B, 2>,
) -> Tensor<B, 1> {
    (log_softmax(logits, 1) * targets).sum_dim(1).neg().mean()
}

/// Number of rows whose logits argmax equals the target argmax.
pub fn count_correct<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 2>) -> usize {
    // argmax(1) returns [batch, 1]; flatten to [batch] before comparing
    let predicted = logits.argmax(1).flatten::<1>(0, 1);
    let truth     = targets.argmax(1).flatten::<1>(0, 1);
    let correct: i64 = predicted.equal(truth).int().sum().into_scalar().elem::<i64>();
    correct.max(0) as usize
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    /// In [0, 1]
    pub accuracy:  f64,
    /// Mean of per-batch mean losses; NaN for an empty loader
    pub mean_loss: f64,
}

/// Evaluate `model` over one traversal of `loader`.
///
/// When a writer is given, the mean loss is written to it as `loss`
/// at `step`.
pub fn evaluate<B, M>(
    loader: &dyn DataLoader<ImageBatch<B>>,
    model:  &M,
    writer: Option<(&mut SummaryWriter, u64)>,
) -> Result<Evaluation>
where
    B: Backend,
    M: ImageClassifier<B>,
{
    let mut accuracy = AccuracyAccumulator::new();
    let mut loss_sum = 0.0f64;
    let mut batches  = 0usize;

    for batch in loader.iter() {
        let samples = batch.images.dims()[0];
        let logits  = model.forward(batch.images);

        let loss: f64 = softmax_cross_entropy(logits.clone(), batch.targets.clone())
            .into_scalar()
            .elem::<f64>();
        loss_sum += loss;
        batches  += 1;

        accuracy.record_counts(count_correct(logits, batch.targets), samples);
    }

    let mean_loss = if batches > 0 { loss_sum / batches as f64 } else { f64::NAN };

    if let Some((writer, step)) = writer {
        writer.write(step, "loss", mean_loss)?;
    }

    tracing::debug!(
        "Evaluated {} samples in {} batches: accuracy={:.4} loss={:.4}",
        accuracy.total(), batches, accuracy.accuracy(), mean_loss,
    );

    Ok(Evaluation { accuracy: accuracy.accuracy(), mean_loss })
}

// ─── Checkpoint evaluation ────────────────────────────────────────────────────

/// Rebuild the configured model, restore its checkpoint and evaluate it
/// on `test`. Any restore failure is an error here.
pub fn evaluate_checkpoint(
    cfg:          &TrainConfig,
    test:         ImageDataset,
    ckpt_manager: &CheckpointManager,
) -> Result<Evaluation> {
    match cfg.backend {
        BackendKind::Wgpu    => evaluate_on::<Wgpu>(cfg, test, ckpt_manager, &WgpuDevice::default()),
        BackendKind::NdArray => evaluate_on::<NdArray>(cfg, test, ckpt_manager, &NdArrayDevice::Cpu),
    }
}

fn evaluate_on<B: Backend>(
    cfg:          &TrainConfig,
    test:         ImageDataset,
    ckpt_manager: &CheckpointManager,
    device:       &B::Device,
) -> Result<Evaluation> {
    match cfg.model_choice() {
        ModelChoice::Scratch(model_cfg) => {
            evaluate_restored(cfg, model_cfg.init::<B>(device), test, ckpt_manager, device)
        }
        ModelChoice::Transfer { config, .. } => {
            evaluate_restored(cfg, config.init_untrained::<B>(device), test, ckpt_manager, device)
        }
    }
}

fn evaluate_restored<B: Backend, M: ImageClassifier<B>>(
    cfg:          &TrainConfig,
    model:        M,
    test:         ImageDataset,
    ckpt_manager: &CheckpointManager,
    device:       &B::Device,
) -> Result<Evaluation> {
    let restored = ckpt_manager.restore::<B, M>(
        &model, &cfg.checkpoint_name, &cfg.architecture(), device,
    )?;
    println!("Model loaded");
    tracing::info!(
        "Checkpoint after epoch {} (step {})",
        restored.manifest.epochs_completed, restored.manifest.global_step,
    );

    let loader = image_loader::<B>(test, cfg.image_shape(), cfg.batch_size, cfg.seed, device.clone());
    evaluate(loader.as_ref(), &restored.model, None)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{batcher::image_loader, dataset::ImageDataset, preprocessor::Preprocessor};
    use crate::data::synthetic::SyntheticSource;
    use crate::domain::image_set::ImageShape;
    use crate::domain::traits::ImageSource;
    use crate::infra::summary::read_scalars;
    use crate::ml::efficientnet::{tiny_config, EfficientNet};
    use burn::backend::{ndarray::NdArrayDevice, NdArray};
    use tempfile::tempdir;

    type TestBackend = NdArray<f32>;

    fn tensor2(rows: Vec<f32>, shape: [usize; 2]) -> Tensor<TestBackend, 2> {
        Tensor::from_data(TensorData::new(rows, shape), &Default::default())
    }

    #[test]
    fn test_accumulator_counts_pairs() {
        let mut acc = AccuracyAccumulator::new();
        acc.record(1, 1);
        acc.record(2, 0);
        acc.record(3, 3);
        acc.record(0, 4);
        assert_eq!(acc.total(), 4);
        assert!((acc.accuracy() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_empty_accumulator_is_zero() {
        assert_eq!(AccuracyAccumulator::new().accuracy(), 0.0);
    }

    #[test]
    fn test_record_counts_accumulates_batches() {
        let mut acc = AccuracyAccumulator::new();
        acc.record_counts(5, 5);
        acc.record_counts(2, 5);
        assert_eq!(acc.total(), 10);
        assert!((acc.accuracy() - 0.7).abs() < 1e-12);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "7 correct out of 5")]
    fn test_more_correct_than_total_is_a_bug() {
        AccuracyAccumulator::new().record_counts(7, 5);
    }

    #[test]
    fn test_cross_entropy_of_uniform_logits() {
        // Equal logits → loss = ln(k)
        let logits  = tensor2(vec![0.0; 8], [2, 4]);
        let targets = tensor2(vec![1., 0., 0., 0., 0., 0., 1., 0.], [2, 4]);
        let loss: f32 = softmax_cross_entropy(logits, targets).into_scalar();
        assert!((loss - 4.0f32.ln()).abs() < 1e-5);
    }

    #[test]
    fn test_cross_entropy_is_small_for_confident_correct_logits() {
        let logits  = tensor2(vec![20., 0., 0., 0., 20., 0.], [2, 3]);
        let targets = tensor2(vec![1., 0., 0., 0., 1., 0.], [2, 3]);
        let loss: f32 = softmax_cross_entropy(logits, targets).into_scalar();
        assert!(loss < 1e-6);
    }

    #[test]
    fn test_count_correct() {
        let logits  = tensor2(vec![0.9, 0.1, 0.2, 0.8, 0.7, 0.3], [3, 2]);
        let targets = tensor2(vec![1., 0., 1., 0., 1., 0.],      [3, 2]);
        assert_eq!(count_correct(logits, targets), 2);
    }

    #[test]
    fn test_evaluate_writes_mean_loss_when_given_a_writer() {
        let dir    = tempdir().unwrap();
        let device = NdArrayDevice::Cpu;
        let shape  = ImageShape::square(28, 1);

        let splits = SyntheticSource::new(4, 10, 28, 1, 10, 3).load_splits().unwrap();
        let test   = Preprocessor::new(shape, 10).prepare("test", &splits.test).unwrap();
        let loader = image_loader::<TestBackend>(ImageDataset::new(test), shape, 4, 0, device.clone());

        let model: EfficientNet<TestBackend> = tiny_config().init(&device);
        let mut writer = SummaryWriter::create(dir.path()).unwrap();

        let eval = evaluate(loader.as_ref(), &model, Some((&mut writer, 7))).unwrap();
        writer.flush().unwrap();

        assert!((0.0..=1.0).contains(&eval.accuracy));
        assert!(eval.mean_loss.is_finite());

        let rows = read_scalars(writer.csv_path()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].step, 7);
        assert_eq!(rows[0].name, "loss");
        assert!((rows[0].value - eval.mean_loss).abs() < 1e-4);
    }

    #[test]
    fn test_evaluate_without_writer_is_silent() {
        let device = NdArrayDevice::Cpu;
        let shape  = ImageShape::square(28, 1);
        let splits = SyntheticSource::new(4, 3, 28, 1, 10, 5).load_splits().unwrap();
        let train  = Preprocessor::new(shape, 10).prepare("train", &splits.train).unwrap();
        let loader = image_loader::<TestBackend>(ImageDataset::new(train), shape, 2, 0, device.clone());

        let model: EfficientNet<TestBackend> = tiny_config().init(&device);
        let eval = evaluate(loader.as_ref(), &model, None).unwrap();
        assert!((0.0..=1.0).contains(&eval.accuracy));
    }
}
