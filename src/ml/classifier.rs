// ============================================================
// Layer 5 — Classifier Seam
// ============================================================
// The training loop and evaluator work against `ImageClassifier`,
// so they never care which network they drive.
//
// Two providers exist:
//
//   EfficientNet        — trained from scratch
//                         (see efficientnet.rs)
//
//   TransferClassifier  — an EfficientNet feature extractor
//                         restored from an existing checkpoint
//                         (trained on `source_classes` outputs),
//                         plus a freshly initialised `fc` layer
//                         for the target classes. The backbone
//                         may be frozen so only `fc` learns.
//
// Reference: Burn Book §3 (Modules)
//            Burn Book §5 (Records)

use anyhow::{Context, Result};
use burn::{
    nn::{Linear, LinearConfig},
    prelude::*,
    record::Recorder,
};
use std::path::Path;

use crate::infra::checkpoint::CheckpointRecorder;
use crate::ml::efficientnet::{EfficientNet, EfficientNetConfig, EfficientNetFeatures};

/// Anything that maps a batch of NHWC images to class logits.
pub trait ImageClassifier<B: Backend>: Module<B> {
    /// images: [batch, H, W, C] → logits: [batch, num_classes]
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2>;
}

#[derive(Config, Debug)]
pub struct TransferConfig {
    /// Architecture of the pretrained network, including its own class count
    pub backbone: EfficientNetConfig,
    /// Classes of the new task
    pub num_classes: usize,
    #[config(default = false)]
    pub freeze_backbone: bool,
}

impl TransferConfig {
    pub fn fingerprint(&self) -> String {
        format!("transfer({} -> classes={})", self.backbone.fingerprint(), self.num_classes)
    }

    /// Build the classifier and load backbone weights from `weights`
    /// (path without the `.mpk.gz` extension).
    pub fn init<B: Backend>(
        &self,
        weights: &Path,
        device:  &B::Device,
    ) -> Result<TransferClassifier<B>> {
        let record = CheckpointRecorder::new()
            .load(weights.to_path_buf(), device)
            .map_err(|e| anyhow::anyhow!("{e:?}"))
            .with_context(|| {
                format!("Cannot load pretrained weights from '{}'", weights.display())
            })?;
        let pretrained: EfficientNet<B> = self.backbone.init(device);
        let pretrained = pretrained.load_record(record);
        tracing::info!("Pretrained backbone loaded from '{}'", weights.display());

        Ok(self.assemble(pretrained.features, device))
    }

    /// Same topology with a randomly initialised backbone. Used when a
    /// full checkpoint of this classifier is about to be restored anyway.
    pub fn init_untrained<B: Backend>(&self, device: &B::Device) -> TransferClassifier<B> {
        self.assemble(self.backbone.init_features(device), device)
    }

    fn assemble<B: Backend>(
        &self,
        features: EfficientNetFeatures<B>,
        device:   &B::Device,
    ) -> TransferClassifier<B> {
        let features = if self.freeze_backbone {
            features.no_grad()
        } else {
            features
        };
        let fc = LinearConfig::new(self.backbone.feature_dim(), self.num_classes).init(device);
        TransferClassifier { features, fc }
    }
}

#[derive(Module, Debug)]
pub struct TransferClassifier<B: Backend> {
    pub features: EfficientNetFeatures<B>,
    pub fc:       Linear<B>,
}

impl<B: Backend> ImageClassifier<B> for TransferClassifier<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        self.fc.forward(self.features.forward(images))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::efficientnet::tiny_config_for;
    use burn::backend::NdArray;
    use burn::record::FullPrecisionSettings;
    use burn::record::NamedMpkGzFileRecorder;
    use tempfile::tempdir;

    type TestBackend = NdArray<f32>;

    fn transfer_config(freeze: bool) -> TransferConfig {
        TransferConfig::new(tiny_config_for(3), 10)
            .with_freeze_backbone(freeze)
    }

    #[test]
    fn test_transfer_forward_uses_new_head() {
        let device = Default::default();
        let model: TransferClassifier<TestBackend> =
            transfer_config(false).init_untrained(&device);
        let images = Tensor::<TestBackend, 4>::zeros([2, 28, 28, 1], &device);
        assert_eq!(model.forward(images).dims(), [2, 10]);
    }

    #[test]
    fn test_transfer_loads_pretrained_backbone() {
        let dir    = tempdir().unwrap();
        let device = Default::default();
        let source: EfficientNet<TestBackend> = tiny_config_for(3).init(&device);
        let path   = dir.path().join("source");
        NamedMpkGzFileRecorder::<FullPrecisionSettings>::new()
            .record(source.clone().into_record(), path.clone())
            .unwrap();

        let model: TransferClassifier<TestBackend> =
            transfer_config(false).init(&path, &device).unwrap();

        // The pooled features of both networks must be identical
        let images   = Tensor::<TestBackend, 4>::ones([1, 28, 28, 1], &device);
        let expected = source.features.forward(images.clone());
        let actual   = model.features.forward(images);
        expected.into_data().assert_approx_eq(&actual.into_data(), 5);
    }

    #[test]
    fn test_missing_pretrained_weights_is_an_error() {
        let dir    = tempdir().unwrap();
        let device = Default::default();
        let result: Result<TransferClassifier<TestBackend>> =
            transfer_config(true).init(&dir.path().join("absent"), &device);
        assert!(result.is_err());
    }

    #[test]
    fn test_frozen_backbone_keeps_head_trainable() {
        let device = Default::default();
        let model: TransferClassifier<burn::backend::Autodiff<TestBackend>> =
            transfer_config(true).init_untrained(&device);
        assert!(!model.features.stem.conv.weight.is_require_grad());
        assert!(model.fc.weight.is_require_grad());
    }
}
