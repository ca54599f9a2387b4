// ============================================================
// Layer 2 — Evaluate / Params Use Cases
// ============================================================
// evaluate: reload the config saved by `train`, restore the
//           checkpoint and report test accuracy and loss
// params:   build the configured network and print its size

use anyhow::Result;

use crate::application::train_use_case::{prepare_datasets, BackendKind, TrainConfig};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::{
    metrics::{evaluate_checkpoint, Evaluation},
    params::{report_configured, ParameterReport},
};

pub struct EvaluateUseCase {
    checkpoint_dir: String,
    /// Overrides the backend recorded in train_config.json
    backend:        Option<BackendKind>,
}

impl EvaluateUseCase {
    pub fn new(checkpoint_dir: String, backend: Option<BackendKind>) -> Self {
        Self { checkpoint_dir, backend }
    }

    pub fn execute(&self) -> Result<Evaluation> {
        let ckpt_manager = CheckpointManager::new(&self.checkpoint_dir);
        let mut cfg = ckpt_manager.load_config()?;
        if let Some(backend) = self.backend {
            cfg.backend = backend;
        }
        // The run may have been moved since it was trained
        cfg.checkpoint_dir = self.checkpoint_dir.clone();
        cfg.validate()?;

        let (_, test) = prepare_datasets(&cfg)?;
        let eval = evaluate_checkpoint(&cfg, test, &ckpt_manager)?;

        println!("Test accuracy: {:.4}", eval.accuracy);
        println!("Test loss:     {:.4}", eval.mean_loss);
        Ok(eval)
    }
}

pub struct ParamsUseCase {
    config: TrainConfig,
}

impl ParamsUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<ParameterReport> {
        self.config.validate()?;
        Ok(report_configured(&self.config))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::train_use_case::TrainUseCase;
    use tempfile::tempdir;

    fn tiny_run(dir: &std::path::Path) -> TrainConfig {
        TrainConfig {
            synthetic:         Some(12),
            batch_size:        8,
            epochs:            1,
            width_coefficient: 0.25,
            depth_coefficient: 0.25,
            checkpoint_dir:    dir.join("weights").to_string_lossy().into_owned(),
            logs_dir:          dir.join("logs").to_string_lossy().into_owned(),
            backend:           BackendKind::NdArray,
            ..Default::default()
        }
    }

    #[test]
    fn test_evaluate_after_training() {
        let dir = tempdir().unwrap();
        let cfg = tiny_run(dir.path());
        TrainUseCase::new(cfg.clone()).execute().unwrap();

        let eval = EvaluateUseCase::new(cfg.checkpoint_dir.clone(), None)
            .execute()
            .unwrap();
        assert!((0.0..=1.0).contains(&eval.accuracy));
        assert!(eval.mean_loss.is_finite());
    }

    #[test]
    fn test_evaluate_without_training_fails() {
        let dir = tempdir().unwrap();
        let result = EvaluateUseCase::new(
            dir.path().join("weights").to_string_lossy().into_owned(),
            Some(BackendKind::NdArray),
        )
        .execute();
        assert!(result.is_err());
    }

    #[test]
    fn test_params_reports_positive_count() {
        let dir = tempdir().unwrap();
        let report = ParamsUseCase::new(tiny_run(dir.path())).execute().unwrap();
        assert!(report.total > 0);
    }
}
