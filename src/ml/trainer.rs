// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Epoch loop using Burn's DataLoader and Adam.
//
// Per batch:
//   1. global_step += 1
//   2. logits = model.forward(images)        (autodiff backend)
//      loss   = mean softmax cross-entropy
//   3. loss.backward() → GradientsParams
//   4. Adam step on every trainable parameter
//   5. `loss` → train summary, printed
//
// Per epoch:
//   - model.valid() → inference-mode model on the inner backend
//     (dropout off, batch norm on running statistics)
//   - accuracy on the train split, accuracy + loss on the test split
//   - `accuracy` → train and test summaries, both flushed
//   - checkpoint every N epochs when configured
//
// All mutable run state lives in TrainingContext; the loop owns
// nothing else.
//
// Key Burn insight:
//   - Training uses B (Autodiff<...>) for gradients
//   - model.valid() returns the model on B::InnerBackend
//   - Evaluation loaders must also use B::InnerBackend
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use anyhow::Result;
use burn::{
    backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice, Autodiff, NdArray, Wgpu},
    data::dataloader::DataLoader,
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use std::{ops::Range, path::Path, sync::Arc};

use crate::application::train_use_case::{BackendKind, ModelChoice, TrainConfig};
use crate::data::{batcher::{image_loader, ImageBatch}, dataset::ImageDataset};
use crate::domain::step::GlobalStep;
use crate::infra::checkpoint::{restore_or_keep, CheckpointManager, TrainingProgress};
use crate::infra::summary::SummaryWriter;
use crate::ml::classifier::ImageClassifier;
use crate::ml::metrics::{evaluate, softmax_cross_entropy};
use crate::ml::params::report_parameters;

/// Mutable state threaded through a training run.
pub struct TrainingContext<O> {
    pub step:          GlobalStep,
    pub train_writer:  SummaryWriter,
    pub test_writer:   SummaryWriter,
    pub optimizer:     O,
    pub learning_rate: f64,
}

/// Loaders for one run. Evaluation loaders live on the inner backend.
pub struct SplitLoaders<B: AutodiffBackend> {
    pub train:      Arc<dyn DataLoader<ImageBatch<B>>>,
    pub train_eval: Arc<dyn DataLoader<ImageBatch<B::InnerBackend>>>,
    pub test:       Arc<dyn DataLoader<ImageBatch<B::InnerBackend>>>,
}

impl<B: AutodiffBackend> SplitLoaders<B> {
    pub fn new(
        train:      ImageDataset,
        test:       ImageDataset,
        cfg:        &TrainConfig,
        device:     &B::Device,
    ) -> Self {
        let shape = cfg.image_shape();
        Self {
            train: image_loader::<B>(
                train.clone(), shape, cfg.batch_size, cfg.seed, device.clone(),
            ),
            train_eval: image_loader::<B::InnerBackend>(
                train, shape, cfg.batch_size, cfg.seed.wrapping_add(1), device.clone(),
            ),
            test: image_loader::<B::InnerBackend>(
                test, shape, cfg.batch_size, cfg.seed.wrapping_add(2), device.clone(),
            ),
        }
    }
}

/// Save after every `every`-th completed epoch.
pub struct PeriodicCheckpoint<'a> {
    pub manager:      &'a CheckpointManager,
    pub name:         &'a str,
    pub architecture: &'a str,
    pub every:        usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochSummary {
    /// Zero-based epoch index
    pub epoch:          usize,
    pub train_accuracy: f64,
    pub test_accuracy:  f64,
    pub test_loss:      f64,
    pub global_step:    u64,
}

/// Run `epochs` over the training split and return the trained model.
pub fn train_epochs<B, M, O>(
    mut model:  M,
    loaders:    &SplitLoaders<B>,
    ctx:        &mut TrainingContext<O>,
    epochs:     Range<usize>,
    checkpoint: Option<&PeriodicCheckpoint<'_>>,
) -> Result<(M, Vec<EpochSummary>)>
where
    B: AutodiffBackend,
    M: ImageClassifier<B> + AutodiffModule<B>,
    M::InnerModule: ImageClassifier<B::InnerBackend>,
    O: Optimizer<M, B>,
{
    let mut history = Vec::with_capacity(epochs.len());

    for epoch in epochs {
        println!("epoch: {epoch}");

        // ── Training phase ────────────────────────────────────────────────────
        for batch in loaders.train.iter() {
            let step = ctx.step.advance();

            let logits = model.forward(batch.images);
            let loss   = softmax_cross_entropy(logits, batch.targets);
            let loss_val: f64 = loss.clone().into_scalar().elem::<f64>();

            // Backward pass + Adam update
            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = ctx.optimizer.step(ctx.learning_rate, model, grads);

            ctx.train_writer.write(step, "loss", loss_val)?;
            println!("  step {step:>6} | loss {loss_val:.4}");
        }

        // ── Evaluation phase ──────────────────────────────────────────────────
        let model_valid = model.valid();
        let step        = ctx.step.get();

        let train_eval = evaluate(loaders.train_eval.as_ref(), &model_valid, None)?;
        let test_eval  = evaluate(
            loaders.test.as_ref(),
            &model_valid,
            Some((&mut ctx.test_writer, step)),
        )?;

        ctx.train_writer.write(step, "accuracy", train_eval.accuracy)?;
        ctx.test_writer.write(step, "accuracy", test_eval.accuracy)?;
        println!("Train accuracy: {:.4}", train_eval.accuracy);
        println!("Test accuracy:  {:.4} (loss {:.4})", test_eval.accuracy, test_eval.mean_loss);
        ctx.train_writer.flush()?;
        ctx.test_writer.flush()?;

        // ── Periodic checkpoint ───────────────────────────────────────────────
        if let Some(ck) = checkpoint {
            if ck.every > 0 && (epoch + 1) % ck.every == 0 {
                let path = ck.manager.save::<B, M>(
                    &model,
                    ck.name,
                    ck.architecture,
                    TrainingProgress { epochs_completed: epoch + 1, global_step: step },
                )?;
                tracing::info!("Checkpoint saved to '{}' after epoch {}", path.display(), epoch);
            }
        }

        history.push(EpochSummary {
            epoch,
            train_accuracy: train_eval.accuracy,
            test_accuracy:  test_eval.accuracy,
            test_loss:      test_eval.mean_loss,
            global_step:    step,
        });
    }

    Ok((model, history))
}

// ─── Full pipeline ────────────────────────────────────────────────────────────

/// Pick the backend, build the configured model and train it.
pub fn run_training(
    cfg:          &TrainConfig,
    train:        ImageDataset,
    test:         ImageDataset,
    ckpt_manager: &CheckpointManager,
) -> Result<Vec<EpochSummary>> {
    match cfg.backend {
        BackendKind::Wgpu => {
            let device = WgpuDevice::default();
            tracing::info!("Using WGPU device: {:?}", device);
            fit::<Autodiff<Wgpu>>(cfg, train, test, ckpt_manager, &device)
        }
        BackendKind::NdArray => {
            let device = NdArrayDevice::Cpu;
            tracing::info!("Using NdArray device: {:?}", device);
            fit::<Autodiff<NdArray>>(cfg, train, test, ckpt_manager, &device)
        }
    }
}

fn fit<B: AutodiffBackend>(
    cfg:          &TrainConfig,
    train:        ImageDataset,
    test:         ImageDataset,
    ckpt_manager: &CheckpointManager,
    device:       &B::Device,
) -> Result<Vec<EpochSummary>> {
    let architecture = cfg.architecture();
    match cfg.model_choice() {
        ModelChoice::Scratch(model_cfg) => {
            let model = model_cfg.init::<B>(device);
            fit_model(cfg, model, &architecture, train, test, ckpt_manager, device)
        }
        ModelChoice::Transfer { config, weights } => {
            let model = config.init::<B>(&weights, device)?;
            fit_model(cfg, model, &architecture, train, test, ckpt_manager, device)
        }
    }
}

fn fit_model<B, M>(
    cfg:          &TrainConfig,
    model:        M,
    architecture: &str,
    train:        ImageDataset,
    test:         ImageDataset,
    ckpt_manager: &CheckpointManager,
    device:       &B::Device,
) -> Result<Vec<EpochSummary>>
where
    B: AutodiffBackend,
    M: ImageClassifier<B> + AutodiffModule<B>,
    M::InnerModule: ImageClassifier<B::InnerBackend>,
{
    report_parameters::<B, M>(&model);

    // ── Restore (missing or unreadable checkpoint → fresh start) ──────────────
    let (model, manifest) = restore_or_keep::<B, M>(
        ckpt_manager, model, &cfg.checkpoint_name, architecture, device,
    )?;
    // The step always continues; the epoch range only shrinks with --resume
    let (start_epoch, step) = match manifest {
        Some(m) if cfg.resume => (m.epochs_completed, GlobalStep::resume_from(m.global_step)),
        Some(m)               => (0, GlobalStep::resume_from(m.global_step)),
        None                  => (0, GlobalStep::new()),
    };
    if start_epoch >= cfg.epochs {
        println!("All {} epochs already completed", cfg.epochs);
    }

    // ── Adam optimiser ────────────────────────────────────────────────────────
    // m = β1*m + (1-β1)*g        (mean)
    // v = β2*v + (1-β2)*g²       (variance)
    // θ = θ - lr * m / (√v + ε)  (update)
    let optimizer = AdamConfig::new()
        .with_beta_1(0.9)
        .with_beta_2(0.999)
        .with_epsilon(1e-8)
        .init::<B, M>();

    let logs = Path::new(&cfg.logs_dir);
    let mut ctx = TrainingContext {
        step,
        train_writer:  SummaryWriter::create(logs.join("train"))?,
        test_writer:   SummaryWriter::create(logs.join("test"))?,
        optimizer,
        learning_rate: cfg.lr,
    };

    let loaders  = SplitLoaders::<B>::new(train, test, cfg, device);
    let periodic = cfg.checkpoint_every.map(|every| PeriodicCheckpoint {
        manager: ckpt_manager,
        name:    &cfg.checkpoint_name,
        architecture,
        every,
    });

    let (model, history) = train_epochs(
        model,
        &loaders,
        &mut ctx,
        start_epoch..cfg.epochs,
        periodic.as_ref(),
    )?;

    // ── Final save ────────────────────────────────────────────────────────────
    let progress = TrainingProgress {
        epochs_completed: cfg.epochs.max(start_epoch),
        global_step:      ctx.step.get(),
    };
    let path = ckpt_manager.save::<B, M>(&model, &cfg.checkpoint_name, architecture, progress)?;
    tracing::info!("Final checkpoint saved to '{}'", path.display());
    tracing::info!("Training complete!");

    Ok(history)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::train_use_case::TrainConfig;
    use crate::data::{preprocessor::Preprocessor, synthetic::SyntheticSource};
    use crate::domain::traits::ImageSource;
    use crate::infra::summary::read_scalars;
    use crate::ml::efficientnet::{tiny_config, EfficientNet};
    use tempfile::{tempdir, TempDir};

    type TestBackend = Autodiff<NdArray<f32>>;

    fn datasets(train: usize, test: usize) -> (ImageDataset, ImageDataset) {
        let cfg    = TrainConfig::default();
        let splits = SyntheticSource::new(train, test, 28, 1, 10, 11).load_splits().unwrap();
        let prep   = Preprocessor::new(cfg.image_shape(), cfg.num_classes);
        (
            ImageDataset::new(prep.prepare("train", &splits.train).unwrap()),
            ImageDataset::new(prep.prepare("test",  &splits.test).unwrap()),
        )
    }

    fn small_config(dir: &TempDir, epochs: usize) -> TrainConfig {
        TrainConfig {
            batch_size:        8,
            epochs,
            width_coefficient: 0.25,
            depth_coefficient: 0.25,
            checkpoint_dir:    dir.path().join("weights").to_string_lossy().into_owned(),
            logs_dir:          dir.path().join("logs").to_string_lossy().into_owned(),
            backend:           BackendKind::NdArray,
            ..TrainConfig::default()
        }
    }

    fn context(dir: &TempDir) -> TrainingContext<impl Optimizer<EfficientNet<TestBackend>, TestBackend>> {
        TrainingContext {
            step:          GlobalStep::new(),
            train_writer:  SummaryWriter::create(dir.path().join("train")).unwrap(),
            test_writer:   SummaryWriter::create(dir.path().join("test")).unwrap(),
            optimizer:     AdamConfig::new()
                .with_epsilon(1e-8)
                .init::<TestBackend, EfficientNet<TestBackend>>(),
            learning_rate: 1e-3,
        }
    }

    #[test]
    fn test_one_epoch_of_sixteen_images() {
        let dir    = tempdir().unwrap();
        let cfg    = small_config(&dir, 1);
        let device = NdArrayDevice::Cpu;
        let (train, test) = datasets(16, 4);

        let model: EfficientNet<TestBackend> = tiny_config().init(&device);
        let loaders = SplitLoaders::<TestBackend>::new(train, test, &cfg, &device);
        let mut ctx = context(&dir);

        let (_, history) = train_epochs(model, &loaders, &mut ctx, 0..1, None).unwrap();

        assert_eq!(ctx.step.get(), 2);
        assert_eq!(history.len(), 1);
        assert!((0.0..=1.0).contains(&history[0].train_accuracy));
        assert!((0.0..=1.0).contains(&history[0].test_accuracy));

        let train_rows = read_scalars(ctx.train_writer.csv_path()).unwrap();
        let losses: Vec<u64> = train_rows.iter()
            .filter(|r| r.name == "loss")
            .map(|r| r.step)
            .collect();
        assert_eq!(losses, vec![1, 2]);
        assert!(train_rows.iter().any(|r| r.name == "accuracy" && r.step == 2));

        let test_rows = read_scalars(ctx.test_writer.csv_path()).unwrap();
        let names: Vec<&str> = test_rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["loss", "accuracy"]);
    }

    #[test]
    fn test_global_step_is_epochs_times_batches() {
        let dir    = tempdir().unwrap();
        let cfg    = small_config(&dir, 2);
        let device = NdArrayDevice::Cpu;
        // 20 samples at batch 8 → 3 batches (last one partial)
        let (train, test) = datasets(20, 4);

        let model: EfficientNet<TestBackend> = tiny_config().init(&device);
        let loaders = SplitLoaders::<TestBackend>::new(train, test, &cfg, &device);
        let mut ctx = context(&dir);

        let (_, history) = train_epochs(model, &loaders, &mut ctx, 0..2, None).unwrap();
        assert_eq!(ctx.step.get(), 6);
        assert_eq!(history[0].global_step, 3);
        assert_eq!(history[1].global_step, 6);
    }

    #[test]
    fn test_periodic_checkpoint_records_progress() {
        let dir     = tempdir().unwrap();
        let cfg     = small_config(&dir, 2);
        let device  = NdArrayDevice::Cpu;
        let manager = CheckpointManager::new(dir.path().join("weights"));
        let (train, test) = datasets(8, 4);

        let model: EfficientNet<TestBackend> = tiny_config().init(&device);
        let loaders  = SplitLoaders::<TestBackend>::new(train, test, &cfg, &device);
        let mut ctx  = context(&dir);
        let periodic = PeriodicCheckpoint {
            manager:      &manager,
            name:         "periodic",
            architecture: "tiny",
            every:        1,
        };

        let (model, _) = train_epochs(model, &loaders, &mut ctx, 0..2, Some(&periodic)).unwrap();

        let restored = manager
            .restore::<TestBackend, _>(&model, "periodic", "tiny", &device)
            .unwrap();
        assert_eq!(restored.manifest.epochs_completed, 2);
        assert_eq!(restored.manifest.global_step, 2);
    }

    #[test]
    fn test_repeated_run_trains_all_epochs_again() {
        let dir     = tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path().join("weights"));
        let cfg     = small_config(&dir, 1);

        let (train, test) = datasets(8, 4);
        let first = run_training(&cfg, train.clone(), test.clone(), &manager).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].global_step, 1);

        // Weights and step are restored, but the full epoch loop runs again
        let second = run_training(&cfg, train, test, &manager).unwrap();
        assert_eq!(second.len(), cfg.epochs);
        assert_eq!(second[0].epoch, 0);
        assert_eq!(second[0].global_step, 2);
    }

    #[test]
    fn test_run_training_resumes_from_checkpoint() {
        let dir     = tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path().join("weights"));

        let (train, test) = datasets(8, 4);
        let first = run_training(&small_config(&dir, 1), train.clone(), test.clone(), &manager)
            .unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].global_step, 1);

        // With --resume the second run picks up after epoch 1
        let resumed = TrainConfig { resume: true, ..small_config(&dir, 2) };
        let second  = run_training(&resumed, train, test, &manager).unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].epoch, 1);
        assert_eq!(second[0].global_step, 2);
    }
}
