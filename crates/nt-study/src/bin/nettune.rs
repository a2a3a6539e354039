use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use nt_study::{
    accuracy_from_objective, run_search, MedianPruner, OrchestratorConfig, Report, Study,
    TrialOrchestrator,
};
use nt_types::{CancelToken, Direction};

/// Hyperparameter search driver for the external network trainer.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// base configuration template
    #[arg(long)]
    base_config: PathBuf,
    /// training dataset passed to the trainer
    #[arg(long)]
    training_data: PathBuf,
    /// network generator executable
    #[arg(long)]
    generator: PathBuf,
    /// trainer executable
    #[arg(long)]
    trainer: PathBuf,
    /// number of new trials to run
    #[arg(long, default_value_t = 100)]
    trials: usize,
    /// study store; resumed if it already exists
    #[arg(long, default_value = "study.jsonl")]
    store: PathBuf,
    /// directory for trained checkpoints
    #[arg(long, default_value = "models")]
    models_dir: PathBuf,
    /// directory for trial-scoped configs and artifacts
    #[arg(long, default_value = "work")]
    work_dir: PathBuf,
    /// where to write the final report
    #[arg(long, default_value = "hyperparameter_report.json")]
    report: PathBuf,
    /// where to write the best configuration
    #[arg(long, default_value = "best_network.conf")]
    best_config: PathBuf,
    /// base seed for reproducible sampling
    #[arg(long, default_value_t = 42)]
    seed: u64,
    /// wall-clock bound per trial, in seconds
    #[arg(long)]
    trial_timeout: Option<u64>,
    /// epochs per trial
    #[arg(long, default_value_t = 100)]
    epochs: i64,
    /// trials exempt from pruning while the study is small
    #[arg(long, default_value_t = 5)]
    startup_trials: usize,
    /// steps within a trial exempt from pruning
    #[arg(long, default_value_t = 10)]
    warmup_steps: u64,
    /// beyond warm-up, evaluate pruning every Nth step
    #[arg(long, default_value_t = 1)]
    interval_steps: u64,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || {
            eprintln!("\ninterrupt received, finishing current bookkeeping");
            cancel.cancel();
        })
        .context("installing interrupt handler")?;
    }

    let pruner = MedianPruner::new(Direction::Minimize)
        .n_startup_trials(args.startup_trials)
        .n_warmup_steps(args.warmup_steps)
        .interval_steps(args.interval_steps);

    let orchestrator = TrialOrchestrator::new(
        OrchestratorConfig {
            base_config: args.base_config.clone(),
            training_data: args.training_data.clone(),
            generator: args.generator.clone(),
            trainer: args.trainer.clone(),
            work_dir: args.work_dir.clone(),
            models_dir: args.models_dir.clone(),
            trial_timeout: args.trial_timeout.map(Duration::from_secs),
            seed: args.seed,
            epochs: args.epochs,
        },
        pruner,
    )
    .context("setting up the trial orchestrator")?;

    let mut study = Study::open(&args.store).context("opening the study store")?;

    info!(
        trials = args.trials,
        store = %args.store.display(),
        data = %args.training_data.display(),
        "starting hyperparameter search"
    );

    let ran = run_search(&mut study, &orchestrator, args.trials, &cancel)?;
    if cancel.is_cancelled() {
        info!(ran, "search interrupted");
    } else {
        info!(ran, "search finished");
    }

    let Some(best) = study.best_trial() else {
        error!("no successful trials completed");
        return Ok(());
    };

    println!("\nBest trial:");
    println!(
        "  Trial #{} with {:.2}% accuracy",
        best.trial_number,
        accuracy_from_objective(best.objective)
    );
    println!("\nBest hyperparameters:");
    for (name, value) in best.assignment.iter() {
        println!("  {name}: {value}");
    }

    orchestrator
        .write_config(&best.assignment, &args.best_config)
        .context("writing the best configuration")?;
    println!("\nBest configuration saved to {}", args.best_config.display());

    if let Some(report) = Report::from_study(&study, &orchestrator.sampled_names()) {
        report.write(&args.report).context("writing the report")?;
        println!("Detailed report saved to {}", args.report.display());
    }

    Ok(())
}
