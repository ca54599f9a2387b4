// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction. Arguments are parsed
// with `clap`; all work is delegated to Layer 2 (application).
//
// Commands:
//   1. `train`    — train (or resume) the classifier
//   2. `params`   — print the parameter count
//   3. `evaluate` — evaluate the saved checkpoint
//
// With no subcommand the binary trains with the default
// constants.
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, EvaluateArgs, TrainArgs};

use crate::application::train_use_case::TrainConfig;

#[derive(Parser, Debug)]
#[command(
    name = "efficientnet-trainer",
    version,
    about = "Train an EfficientNet classifier on MNIST-style image data."
)]
pub struct Cli {
    /// The subcommand to run (defaults to `train`)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            None                         => run_train(TrainConfig::default()),
            Some(Commands::Train(args))    => run_train(args.into()),
            Some(Commands::Params(args))   => run_params(args),
            Some(Commands::Evaluate(args)) => run_evaluate(args),
        }
    }
}

fn run_train(config: TrainConfig) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!(
        "Starting training: {} epochs, batch size {}, checkpoints in '{}'",
        config.epochs, config.batch_size, config.checkpoint_dir,
    );
    let history = TrainUseCase::new(config).execute()?;

    match history.last() {
        Some(last) => println!(
            "Training complete. Final test accuracy: {:.4}. Checkpoint saved.",
            last.test_accuracy
        ),
        None => println!("Training complete. Checkpoint saved."),
    }
    Ok(())
}

fn run_params(args: TrainArgs) -> Result<()> {
    use crate::application::evaluate_use_case::ParamsUseCase;

    ParamsUseCase::new(args.into()).execute()?;
    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    use crate::application::evaluate_use_case::EvaluateUseCase;

    EvaluateUseCase::new(args.checkpoint_dir, args.backend.map(Into::into)).execute()?;
    Ok(())
}
