// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction, parsed with clap.
// Business logic is delegated to Layer 2 (application).
//
//   train   — train (or --resume) on trajectory records, write checkpoints
//   predict — serve one JSON request from a checkpoint
//   verify  — integrity-check a checkpoint, print its header
//   synth   — write a synthetic JSONL dataset
//
// Reference: Rust Book §12 (CLI programs)

pub mod commands;

use anyhow::{bail, Context, Result};
use clap::Parser;
use commands::{Commands, PredictArgs, SynthArgs, TrainArgs, VerifyArgs};

use crate::ml::trainer::CancelToken;

#[derive(Parser, Debug)]
#[command(
    name = "trajpred",
    version,
    about = "Train a trajectory prediction model with a safety score, then serve gated forecasts."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)   => run_train(args),
            Commands::Predict(args) => run_predict(args),
            Commands::Verify(args)  => run_verify(args),
            Commands::Synth(args)   => run_synth(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::{TrainRequest, TrainUseCase};

    tracing::info!("Starting training on: {}", args.data.display());
    let request  = TrainRequest::try_from(args)?;
    let use_case = TrainUseCase::new(request);
    ctrlc::set_handler(interrupt_handler(use_case.cancel_token()))
        .context("Cannot install the Ctrl-C handler")?;
    let report = use_case.execute()?;

    match (&report.best_checkpoint, report.best_val_loss) {
        (Some(path), Some(loss)) => println!(
            "Training complete: {} epochs, best val_loss {:.4} → {}",
            report.epochs_completed,
            loss,
            path.display()
        ),
        _ => println!("Training stopped after {} epochs; no checkpoint written.", report.epochs_completed),
    }
    if report.interrupted {
        println!("Interrupted; rerun with --resume to continue after epoch {}.", report.epochs_completed);
    }
    Ok(())
}

/// Ctrl-C stops training between batches; the partial epoch is dropped.
fn interrupt_handler(token: CancelToken) -> impl FnMut() + Send + 'static {
    move || {
        tracing::warn!("Interrupt received; stopping after the current batch");
        token.cancel();
    }
}

fn run_predict(args: PredictArgs) -> Result<()> {
    use crate::application::predict_use_case::{response_json, PredictUseCase};
    use crate::domain::error::PipelineError;

    let use_case = PredictUseCase::new(&args.checkpoint, (&args).into())?;
    let request  = PredictUseCase::read_request(&args.request)?;
    let outcome  = use_case.predict(&request);

    println!("{}", serde_json::to_string_pretty(&response_json(&outcome)?)?);
    match outcome {
        Ok(_) => Ok(()),
        Err(e @ PipelineError::SafetyViolation { .. }) => bail!("prediction rejected: {e}"),
        Err(e) => Err(e.into()),
    }
}

fn run_verify(args: VerifyArgs) -> Result<()> {
    use crate::application::predict_use_case::verify_checkpoint;

    let header = verify_checkpoint(&args.checkpoint)?;
    println!("Checkpoint OK");
    println!("{}", serde_json::to_string_pretty(&header)?);
    Ok(())
}

fn run_synth(args: SynthArgs) -> Result<()> {
    use crate::application::synth_use_case::SynthUseCase;

    let config  = args.config()?;
    let written = SynthUseCase::new(args.output.clone(), args.count, config).execute()?;
    println!("Wrote {written} records to {}", args.output.display());
    Ok(())
}
