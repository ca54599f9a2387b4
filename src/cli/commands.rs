// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the subcommands `train`, `params` and `evaluate`
// and all their configurable flags.
//
// Every flag defaults to the reference run (28x28 grayscale
// MNIST, batch 8192, 100 epochs, Adam 1e-3), so running the
// binary with no arguments trains with those constants.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand, ValueEnum};
use crate::application::train_use_case::{BackendKind, TrainConfig};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train (or resume training) the classifier
    Train(TrainArgs),

    /// Print the parameter count of the configured network
    Params(TrainArgs),

    /// Evaluate the saved checkpoint on the test split
    Evaluate(EvaluateArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendArg {
    /// GPU via WGPU
    Wgpu,
    /// CPU via ndarray
    Ndarray,
}

impl From<BackendArg> for BackendKind {
    fn from(b: BackendArg) -> Self {
        match b {
            BackendArg::Wgpu    => BackendKind::Wgpu,
            BackendArg::Ndarray => BackendKind::NdArray,
        }
    }
}

/// All arguments for the `train` and `params` commands.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Directory containing the four MNIST IDX files
    #[arg(long, default_value = "data/mnist")]
    pub data_dir: String,

    /// Train on N random images instead of MNIST (smoke runs)
    #[arg(long)]
    pub synthetic: Option<usize>,

    /// Directory for checkpoints and train_config.json
    #[arg(long, default_value = "weights")]
    pub checkpoint_dir: String,

    /// Checkpoint file stem
    #[arg(long, default_value = "last_saver")]
    pub checkpoint_name: String,

    /// Summary directory (train/ and test/ streams)
    #[arg(long, default_value = "logs")]
    pub logs_dir: String,

    /// Height and width of the square input images
    #[arg(long, default_value_t = 28)]
    pub image_size: usize,

    #[arg(long, default_value_t = 1)]
    pub channels: usize,

    #[arg(long, default_value_t = 10)]
    pub num_classes: usize,

    #[arg(long, default_value_t = 8192)]
    pub batch_size: usize,

    /// Number of full passes through the training data
    #[arg(long, default_value_t = 100)]
    pub epochs: usize,

    /// Adam learning rate
    #[arg(long, default_value_t = 1e-3)]
    pub lr: f64,

    /// Seed for shuffling and synthetic data
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Also save a checkpoint every N epochs
    #[arg(long)]
    pub checkpoint_every: Option<usize>,

    /// Skip the epochs already recorded in the checkpoint
    #[arg(long)]
    pub resume: bool,

    /// EfficientNet width coefficient (1.0 = B0)
    #[arg(long = "width", default_value_t = 1.0)]
    pub width_coefficient: f64,

    /// EfficientNet depth coefficient (1.0 = B0)
    #[arg(long = "depth", default_value_t = 1.0)]
    pub depth_coefficient: f64,

    /// Dropout before the classifier
    #[arg(long, default_value_t = 0.2)]
    pub dropout: f64,

    /// Fine-tune from this EfficientNet checkpoint instead of training from scratch
    #[arg(long)]
    pub pretrained: Option<String>,

    /// Number of classes the pretrained network was trained on
    #[arg(long, default_value_t = 1000)]
    pub pretrained_classes: usize,

    /// Only train the new classification head
    #[arg(long, requires = "pretrained")]
    pub freeze_backbone: bool,

    #[arg(long, value_enum, default_value_t = BackendArg::Wgpu)]
    pub backend: BackendArg,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// The application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            data_dir:           a.data_dir,
            synthetic:          a.synthetic,
            checkpoint_dir:     a.checkpoint_dir,
            checkpoint_name:    a.checkpoint_name,
            logs_dir:           a.logs_dir,
            image_size:         a.image_size,
            channels:           a.channels,
            num_classes:        a.num_classes,
            batch_size:         a.batch_size,
            epochs:             a.epochs,
            lr:                 a.lr,
            seed:               a.seed,
            checkpoint_every:   a.checkpoint_every,
            resume:             a.resume,
            width_coefficient:  a.width_coefficient,
            depth_coefficient:  a.depth_coefficient,
            dropout:            a.dropout,
            pretrained:         a.pretrained,
            pretrained_classes: a.pretrained_classes,
            freeze_backbone:    a.freeze_backbone,
            backend:            a.backend.into(),
        }
    }
}

#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Directory where `train` saved its checkpoint and config
    #[arg(long, default_value = "weights")]
    pub checkpoint_dir: String,

    /// Override the backend used for training
    #[arg(long, value_enum)]
    pub backend: Option<BackendArg>,
}
