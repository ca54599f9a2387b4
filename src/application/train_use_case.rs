// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Load raw train/test splits   (Layer 4 - data)
//   Step 2: Validate + normalise         (Layer 4 - data)
//   Step 3: Build datasets               (Layer 4 - data)
//   Step 4: Save config                  (Layer 6 - infra)
//   Step 5: Build model, restore, train  (Layer 5 - ml)
//
// Reference: Burn Book §5 (Training)

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::data::{
    dataset::ImageDataset,
    loader::IdxLoader,
    preprocessor::Preprocessor,
    synthetic::SyntheticSource,
};
use crate::domain::{image_set::ImageShape, traits::ImageSource};
use crate::infra::checkpoint::{validate_name, CheckpointManager, WEIGHTS_EXTENSION};
use crate::ml::{
    classifier::TransferConfig,
    efficientnet::EfficientNetConfig,
    trainer::{run_training, EpochSummary},
};

/// Compute backend for tensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// GPU through WGPU
    Wgpu,
    /// CPU
    NdArray,
}

/// Which network a config describes.
#[derive(Debug, Clone)]
pub enum ModelChoice {
    Scratch(EfficientNetConfig),
    /// `weights` is the pretrained file stem (recorder adds the extension)
    Transfer { config: TransferConfig, weights: PathBuf },
}

// ─── Training Configuration ──────────────────────────────────────────────────
// All constants for a training run.
// Serialisable so it can be saved next to the checkpoint and reloaded
// by `evaluate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Directory with the four MNIST IDX files
    pub data_dir:           String,
    /// Use N seeded random training images instead of `data_dir`
    pub synthetic:          Option<usize>,
    pub checkpoint_dir:     String,
    pub checkpoint_name:    String,
    pub logs_dir:           String,
    pub image_size:         usize,
    pub channels:           usize,
    pub num_classes:        usize,
    pub batch_size:         usize,
    pub epochs:             usize,
    pub lr:                 f64,
    pub seed:               u64,
    /// Save every N completed epochs (a final save always happens)
    pub checkpoint_every:   Option<usize>,
    /// Continue after the epochs recorded in the checkpoint instead of
    /// running all `epochs` again
    #[serde(default)]
    pub resume:             bool,
    pub width_coefficient:  f64,
    pub depth_coefficient:  f64,
    pub dropout:            f64,
    /// Pretrained EfficientNet checkpoint to fine-tune from
    pub pretrained:         Option<String>,
    /// Output classes of the pretrained network
    pub pretrained_classes: usize,
    pub freeze_backbone:    bool,
    pub backend:            BackendKind,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            data_dir:           "data/mnist".to_string(),
            synthetic:          None,
            checkpoint_dir:     "weights".to_string(),
            checkpoint_name:    "last_saver".to_string(),
            logs_dir:           "logs".to_string(),
            image_size:         28,
            channels:           1,
            num_classes:        10,
            batch_size:         8192,
            epochs:             100,
            lr:                 1e-3,
            seed:               0,
            checkpoint_every:   None,
            resume:             false,
            width_coefficient:  1.0,
            depth_coefficient:  1.0,
            dropout:            0.2,
            pretrained:         None,
            pretrained_classes: 1000,
            freeze_backbone:    false,
            backend:            BackendKind::Wgpu,
        }
    }
}

impl TrainConfig {
    pub fn image_shape(&self) -> ImageShape {
        ImageShape::square(self.image_size, self.channels)
    }

    pub fn efficientnet_config(&self, num_classes: usize) -> EfficientNetConfig {
        EfficientNetConfig::new(num_classes, self.channels)
            .with_width_coefficient(self.width_coefficient)
            .with_depth_coefficient(self.depth_coefficient)
            .with_dropout(self.dropout)
    }

    pub fn model_choice(&self) -> ModelChoice {
        match &self.pretrained {
            None => ModelChoice::Scratch(self.efficientnet_config(self.num_classes)),
            Some(path) => {
                let backbone = self.efficientnet_config(self.pretrained_classes);
                let config   = TransferConfig::new(backbone, self.num_classes)
                    .with_freeze_backbone(self.freeze_backbone);
                let stem = path
                    .strip_suffix(&format!(".{WEIGHTS_EXTENSION}"))
                    .unwrap_or(path);
                ModelChoice::Transfer { config, weights: PathBuf::from(stem) }
            }
        }
    }

    /// Fingerprint stored in checkpoint manifests
    pub fn architecture(&self) -> String {
        match self.model_choice() {
            ModelChoice::Scratch(cfg)             => cfg.fingerprint(),
            ModelChoice::Transfer { config, .. } => config.fingerprint(),
        }
    }

    /// Reject values no run could succeed with.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.image_size  > 0, "image size must be positive");
        ensure!(self.channels    > 0, "channels must be positive");
        ensure!(self.num_classes > 1, "need at least two classes");
        ensure!(self.num_classes <= 256, "labels are stored as bytes: at most 256 classes");
        ensure!(self.batch_size  > 0, "batch size must be positive");
        ensure!(self.lr > 0.0, "learning rate must be positive");
        ensure!(
            self.width_coefficient > 0.0 && self.depth_coefficient > 0.0,
            "width and depth coefficients must be positive"
        );
        ensure!((0.0..1.0).contains(&self.dropout), "dropout must be in [0, 1)");
        ensure!(self.checkpoint_every != Some(0), "checkpoint interval must be positive");
        ensure!(self.synthetic != Some(0), "synthetic dataset must not be empty");
        validate_name(&self.checkpoint_name)?;
        Ok(())
    }

    /// Where the raw splits come from.
    pub fn image_source(&self) -> Box<dyn ImageSource> {
        match self.synthetic {
            // Same 6:1 train/test ratio as MNIST
            Some(n) => Box::new(SyntheticSource::new(
                n,
                (n / 6).max(1),
                self.image_size,
                self.channels,
                self.num_classes,
                self.seed,
            )),
            None => Box::new(IdxLoader::new(&self.data_dir)),
        }
    }
}

/// Load and prepare both splits.
pub fn prepare_datasets(cfg: &TrainConfig) -> Result<(ImageDataset, ImageDataset)> {
    let splits = cfg.image_source().load_splits()?;

    let preprocessor = Preprocessor::new(cfg.image_shape(), cfg.num_classes);
    let train = ImageDataset::new(preprocessor.prepare("train", &splits.train)?);
    let test  = ImageDataset::new(preprocessor.prepare("test",  &splits.test)?);
    tracing::debug!(
        "Prepared {} train / {} test samples",
        train.sample_count(), test.sample_count(),
    );
    Ok((train, test))
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the full training pipeline end to end
    pub fn execute(&self) -> Result<Vec<EpochSummary>> {
        let cfg = &self.config;
        cfg.validate()?;

        // ── Steps 1-3: splits → datasets ──────────────────────────────────────
        let (train, test) = prepare_datasets(cfg)?;

        // ── Step 4: Save config for `evaluate` ────────────────────────────────
        let ckpt_manager = CheckpointManager::new(&cfg.checkpoint_dir);
        ckpt_manager.save_config(cfg)?;

        // ── Step 5: Run training loop (Layer 5) ───────────────────────────────
        run_training(cfg, train, test, &ckpt_manager)
    }
}
