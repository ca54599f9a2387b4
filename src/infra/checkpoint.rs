// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores model weights with Burn's named MessagePack
// recorder (gzip, full precision so a restore is bit-exact).
//
// Files per checkpoint name:
//   weights/
//     last_saver.mpk.gz    ← all parameters + batch-norm statistics
//     last_saver.json      ← manifest: architecture, parameter
//                            count, epochs completed, global step
//     train_config.json    ← run configuration (for `evaluate`)
//
// Both checkpoint files are first written under a temporary name
// and then renamed over the previous version, so an interrupted
// save never leaves a half-written checkpoint behind.
//
// Restoring is classified:
//   NotFound       no weights file
//   Corrupt        manifest missing/unreadable, weights undecodable
//   ShapeMismatch  manifest describes a different network
//
// Burn's load_record does not compare shapes, so the manifest is
// what guards against loading a checkpoint into the wrong network.
//
// Reference: Burn Book §5 (Records and Checkpointing)
//            Rust Book §9 (Error Handling)

use anyhow::{bail, Context, Result};
use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkGzFileRecorder, Recorder, RecorderError},
};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

use crate::application::train_use_case::TrainConfig;

/// Recorder used for checkpoints and pretrained weights.
pub type CheckpointRecorder = NamedMpkGzFileRecorder<FullPrecisionSettings>;

/// Extension the recorder appends to every path it is given
pub const WEIGHTS_EXTENSION: &str = "mpk.gz";

const CONFIG_FILE:    &str = "train_config.json";
const PARTIAL_SUFFIX: &str = "-partial";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointManifest {
    /// Fingerprint of the network that produced the weights
    pub architecture:     String,
    pub num_params:       usize,
    pub epochs_completed: usize,
    pub global_step:      u64,
}

/// How far training had progressed when a checkpoint was taken
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrainingProgress {
    pub epochs_completed: usize,
    pub global_step:      u64,
}

#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("no checkpoint at '{0}'")]
    NotFound(PathBuf),

    #[error("checkpoint '{path}' is unreadable: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("checkpoint '{path}' does not fit this model: {reason}")]
    ShapeMismatch { path: PathBuf, reason: String },
}

/// A successfully restored model plus the manifest it came with.
#[derive(Debug)]
pub struct Restored<M> {
    pub model:    M,
    pub manifest: CheckpointManifest,
}

/// Checkpoint names become file stems; the recorder rewrites anything
/// after a dot, so dots and separators are rejected.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(['.', '/', '\\']) {
        bail!("Invalid checkpoint name '{name}': use letters, digits, '-' or '_'");
    }
    Ok(())
}

/// True when `manifest` was last written before `weights`. `save` renames the
/// manifest after the weights, so this only happens when a save was cut short.
fn manifest_predates_weights(manifest: &Path, weights: &Path) -> bool {
    let modified = |p: &Path| fs::metadata(p).and_then(|m| m.modified()).ok();
    match (modified(manifest), modified(weights)) {
        (Some(m), Some(w)) => m < w,
        _ => false,
    }
}

/// Manages saving and loading of model checkpoints.
/// All files are stored in the configured directory.
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Creates the directory if it doesn't already exist.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        // A real failure surfaces on the first save
        fs::create_dir_all(&dir).ok();
        Self { dir }
    }

    /// `<dir>/<name>.mpk.gz`
    pub fn weights_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{WEIGHTS_EXTENSION}"))
    }

    /// `<dir>/<name>.json`
    pub fn manifest_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    /// Write weights and manifest, replacing any previous checkpoint
    /// with the same name.
    pub fn save<B: Backend, M: Module<B>>(
        &self,
        model:        &M,
        name:         &str,
        architecture: &str,
        progress:     TrainingProgress,
    ) -> Result<PathBuf> {
        validate_name(name)?;
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create '{}'", self.dir.display()))?;

        // ── Partials ──────────────────────────────────────────────────────────
        let partial_stem     = self.dir.join(format!("{name}{PARTIAL_SUFFIX}"));
        let partial_file     = self.dir.join(format!("{name}{PARTIAL_SUFFIX}.{WEIGHTS_EXTENSION}"));
        let manifest_partial = self.dir.join(format!("{name}{PARTIAL_SUFFIX}.json"));
        let weights          = self.weights_path(name);
        let manifest_path    = self.manifest_path(name);

        CheckpointRecorder::new()
            .record(model.clone().into_record(), partial_stem)
            .map_err(|e| anyhow::anyhow!("{e:?}"))
            .with_context(|| format!("Failed to write '{}'", partial_file.display()))?;

        let manifest = CheckpointManifest {
            architecture:     architecture.to_string(),
            num_params:       model.num_params(),
            epochs_completed: progress.epochs_completed,
            global_step:      progress.global_step,
        };
        fs::write(&manifest_partial, serde_json::to_string_pretty(&manifest)?)
            .with_context(|| format!("Failed to write '{}'", manifest_partial.display()))?;

        // ── Commit ────────────────────────────────────────────────────────────
        // Manifest goes last: a manifest older than its weights marks a torn save.
        fs::rename(&partial_file, &weights)
            .with_context(|| format!("Failed to move checkpoint into '{}'", weights.display()))?;
        fs::rename(&manifest_partial, &manifest_path)
            .with_context(|| format!("Failed to move manifest into '{}'", manifest_path.display()))?;

        tracing::debug!(
            "Saved checkpoint '{}' (epochs={}, step={})",
            weights.display(), progress.epochs_completed, progress.global_step,
        );
        Ok(weights)
    }

    /// Load the named checkpoint into a copy of `model`.
    pub fn restore<B: Backend, M: Module<B>>(
        &self,
        model:        &M,
        name:         &str,
        architecture: &str,
        device:       &B::Device,
    ) -> Result<Restored<M>, RestoreError> {
        let weights = self.weights_path(name);
        if !weights.is_file() {
            return Err(RestoreError::NotFound(weights));
        }

        let manifest_path = self.manifest_path(name);
        let manifest: CheckpointManifest = fs::read_to_string(&manifest_path)
            .map_err(|e| e.to_string())
            .and_then(|json| serde_json::from_str(&json).map_err(|e| e.to_string()))
            .map_err(|reason| RestoreError::Corrupt {
                path:   manifest_path.clone(),
                reason,
            })?;

        if manifest_predates_weights(&manifest_path, &weights) {
            return Err(RestoreError::Corrupt {
                path:   manifest_path,
                reason: "manifest is older than the weights it describes".to_string(),
            });
        }

        if manifest.architecture != architecture {
            return Err(RestoreError::ShapeMismatch {
                path:   weights,
                reason: format!(
                    "saved for architecture '{}', current is '{}'",
                    manifest.architecture, architecture
                ),
            });
        }
        let expected = model.num_params();
        if manifest.num_params != expected {
            return Err(RestoreError::ShapeMismatch {
                path:   weights,
                reason: format!(
                    "saved with {} parameters, current model has {}",
                    manifest.num_params, expected
                ),
            });
        }

        let record = CheckpointRecorder::new()
            .load(self.dir.join(name), device)
            .map_err(|e| match e {
                RecorderError::FileNotFound(_) => RestoreError::NotFound(weights.clone()),
                other => RestoreError::Corrupt {
                    path:   weights.clone(),
                    reason: format!("{other:?}"),
                },
            })?;

        Ok(Restored {
            model: model.clone().load_record(record),
            manifest,
        })
    }

    /// Save the training configuration to JSON.
    ///
    /// Must be called before training starts so `evaluate` can
    /// reconstruct the exact model architecture.
    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        let path = self.dir.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(cfg)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;
        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config(&self) -> Result<TrainConfig> {
        let path = self.dir.join(CONFIG_FILE);
        let json = fs::read_to_string(&path).with_context(|| {
            format!(
                "Cannot read config from '{}'. Have you run 'train' first?",
                path.display()
            )
        })?;
        serde_json::from_str(&json)
            .with_context(|| format!("Cannot parse '{}'", path.display()))
    }
}

/// Startup restore policy: a missing or unreadable checkpoint is not an
/// error, training simply starts from the current parameters. A checkpoint
/// for a different network is fatal.
pub fn restore_or_keep<B: Backend, M: Module<B>>(
    manager:      &CheckpointManager,
    model:        M,
    name:         &str,
    architecture: &str,
    device:       &B::Device,
) -> Result<(M, Option<CheckpointManifest>)> {
    match manager.restore::<B, M>(&model, name, architecture, device) {
        Ok(restored) => {
            println!("Model loaded");
            tracing::info!(
                "Resuming after epoch {} at step {}",
                restored.manifest.epochs_completed, restored.manifest.global_step,
            );
            Ok((restored.model, Some(restored.manifest)))
        }
        Err(err @ (RestoreError::NotFound(_) | RestoreError::Corrupt { .. })) => {
            println!("Model not loaded");
            tracing::info!("{err}");
            Ok((model, None))
        }
        Err(err) => Err(err.into()),
    }
}
