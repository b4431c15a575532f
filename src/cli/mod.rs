// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Typical session:
//   1. `preprocess` — NIfTI volumes → .npy slices
//   2. `train`      — fit the U-Net, keep the best checkpoints
//   3. `evaluate`   — Dice on the validation split
//   4. `infer`      — segment a scan and animate it
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, EvaluateArgs, InferArgs, PreprocessArgs, TrainArgs};

use crate::domain::dice::format_dice;

#[derive(Parser, Debug)]
#[command(
    name = "lung-tumor-seg",
    version = "0.1.0",
    about = "Train a U-Net to segment lung tumours in CT slices, then animate its predictions."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Preprocess(args) => run_preprocess(args),
            Commands::Train(args)      => run_train(args),
            Commands::Evaluate(args)   => run_evaluate(args),
            Commands::Infer(args)      => run_infer(args),
        }
    }
}

fn run_preprocess(args: PreprocessArgs) -> Result<()> {
    use crate::application::preprocess_use_case::PreprocessUseCase;

    tracing::info!("Preprocessing volumes from: {}", args.input_dir);
    let report = PreprocessUseCase::new(args.into()).execute()?;

    println!(
        "Preprocessing complete: {} train / {} val subjects, {} slices ({} with tumour).",
        report.train_subjects, report.val_subjects, report.slices_written, report.tumour_slices,
    );
    Ok(())
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Starting training on slices in: {}", args.data_root);
    let summary = TrainUseCase::new(args.into()).execute()?;

    let last_dice = summary.last.and_then(|m| m.val_dice);
    println!(
        "Training complete. Best epoch {} (loss {:.4}), final val Dice {}.",
        summary.best_epoch, summary.best_loss, format_dice(last_dice),
    );
    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    use crate::application::evaluate_use_case::EvaluateUseCase;

    let report = EvaluateUseCase::new(args.into()).execute()?;
    println!("\n{report}");
    Ok(())
}

fn run_infer(args: InferArgs) -> Result<()> {
    use crate::application::infer_use_case::InferUseCase;

    let report = InferUseCase::new(args.into()).execute()?;
    println!(
        "Wrote {} frames ({} with tumour). Animation: {}",
        report.frames, report.tumour_slices, report.gif_path.display(),
    );
    Ok(())
}
