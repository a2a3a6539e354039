//! Per-trial control flow: sample, materialize, generate, train, score,
//! clean up, report.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, error, info, warn};

use nt_config::{materialize, validate_template, ConfigDocument};
use nt_proc::{Generator, StopReason, TrainControl, TrainerSupervisor};
use nt_search::NetworkSpace;
use nt_types::{Assignment, CancelToken, NtResult, TrialResult, TrialStatus};

use crate::pruner::MedianPruner;
use crate::study::{accuracy_from_objective, intermediate_value, objective_from_accuracy, Study};

/// Everything the orchestrator needs to run trials against one trainer
/// setup.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Base configuration template; tuned keys are overwritten per trial.
    pub base_config: PathBuf,
    /// Training dataset handed to the trainer.
    pub training_data: PathBuf,
    /// External generator executable.
    pub generator: PathBuf,
    /// External trainer executable.
    pub trainer: PathBuf,
    /// Trial-scoped configs and intermediate artifacts live here.
    pub work_dir: PathBuf,
    /// Trained checkpoints are kept here, one per trial.
    pub models_dir: PathBuf,
    /// Wall-clock bound on a single trial.
    pub trial_timeout: Option<Duration>,
    /// Base seed; each trial derives its own rng from it.
    pub seed: u64,
    /// Fixed epoch count written into every trial configuration.
    pub epochs: i64,
}

/// Lifecycle phases of one trial. `Failed` is reachable from any of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrialPhase {
    Sampling,
    Materializing,
    Generating,
    Training,
    Scoring,
    Cleanup,
}

impl std::fmt::Display for TrialPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Sampling => "sampling",
            Self::Materializing => "materializing",
            Self::Generating => "generating",
            Self::Training => "training",
            Self::Scoring => "scoring",
            Self::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}

/// Runs single trials to completion. Trial-scoped failures come back as
/// `Failed`/`TimedOut` results carrying the sentinel objective; only
/// configuration and persistence problems escape as errors.
pub struct TrialOrchestrator {
    space: NetworkSpace,
    template: ConfigDocument,
    generator: Generator,
    trainer: TrainerSupervisor,
    pruner: MedianPruner,
    work_dir: PathBuf,
    models_dir: PathBuf,
    trial_timeout: Option<Duration>,
    seed: u64,
}

impl TrialOrchestrator {
    /// Loads and validates the template up front: a malformed template
    /// must abort the run before any subprocess is spawned.
    pub fn new(config: OrchestratorConfig, pruner: MedianPruner) -> NtResult<Self> {
        let template = ConfigDocument::load(&config.base_config)?;
        validate_template(&template)?;

        fs::create_dir_all(&config.work_dir)?;
        fs::create_dir_all(&config.models_dir)?;

        Ok(Self {
            space: NetworkSpace::new(6, 11, config.epochs),
            template,
            generator: Generator::new(&config.generator, &config.work_dir),
            trainer: TrainerSupervisor::new(&config.trainer, &config.training_data),
            pruner,
            work_dir: config.work_dir,
            models_dir: config.models_dir,
            trial_timeout: config.trial_timeout,
            seed: config.seed,
        })
    }

    /// Names of the sampled primitives, for the report's importance map.
    pub fn sampled_names(&self) -> Vec<String> {
        self.space.sampled_names()
    }

    /// Re-materialize an assignment (e.g. the best trial's) to `path`.
    pub fn write_config(&self, assignment: &Assignment, path: &Path) -> NtResult<()> {
        let doc = materialize(&self.template, assignment)?;
        doc.write_atomic(path)?;
        Ok(())
    }

    /// Run the next trial for `study`. Cleanup of trial-scoped files runs
    /// on every exit path, fatal errors included.
    pub fn run_trial(&self, study: &Study, cancel: &CancelToken) -> NtResult<TrialResult> {
        let number = study.next_trial_number();
        info!(trial = number, "starting trial");

        debug!(trial = number, phase = %TrialPhase::Sampling, "sampling configuration");
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(number));
        let assignment = self.space.sample(&mut rng)?;
        for (name, value) in assignment.iter() {
            debug!(trial = number, parameter = %name, value = %value, "sampled");
        }

        let config_path = self.work_dir.join(format!("trial_{number}.conf"));
        let artifact_path = self.generator.expected_artifact(&config_path, 1);
        let checkpoint_path = self.models_dir.join(format!("trial_{number}.nn"));

        let mut trial = TrialResult::new(number, assignment);
        let outcome = self.execute(&mut trial, &config_path, &checkpoint_path, study, cancel);

        debug!(trial = number, phase = %TrialPhase::Cleanup, "removing trial-scoped files");
        self.cleanup(number, &[&config_path, &artifact_path]);

        match outcome {
            Ok(()) => {}
            Err(e) if e.is_trial_scoped() => {
                error!(trial = number, error = %e, "trial failed");
                trial.mark_failed(e.to_string());
            }
            Err(e) => return Err(e),
        }

        self.log_outcome(&trial, study);
        Ok(trial)
    }

    fn execute(
        &self,
        trial: &mut TrialResult,
        config_path: &Path,
        checkpoint_path: &Path,
        study: &Study,
        cancel: &CancelToken,
    ) -> NtResult<()> {
        let number = trial.trial_number;

        debug!(trial = number, phase = %TrialPhase::Materializing, config = %config_path.display(), "writing trial configuration");
        let doc = materialize(&self.template, &trial.assignment)?;
        doc.write_atomic(config_path)?;

        debug!(trial = number, phase = %TrialPhase::Generating, "generating network");
        let artifact = self.generator.generate(config_path)?;

        debug!(trial = number, phase = %TrialPhase::Training, "training network");
        let deadline = self.trial_timeout.map(|t| Instant::now() + t);
        let outcome = self.trainer.train(&artifact, checkpoint_path, deadline, cancel, |record| {
            if self
                .pruner
                .should_prune(study, record.step, intermediate_value(record))
            {
                TrainControl::Prune
            } else {
                TrainControl::Continue
            }
        })?;
        trial.records = outcome.records.clone();

        match outcome.stopped {
            Some(StopReason::Pruned) => {
                info!(
                    trial = number,
                    step = trial.final_record().map_or(0, |r| r.step),
                    "trial pruned against study median"
                );
                trial.mark_pruned();
            }
            Some(StopReason::DeadlineExpired) => {
                warn!(trial = number, "trial exceeded its time limit");
                trial.mark_timed_out();
            }
            Some(StopReason::Cancelled) => {
                info!(trial = number, "trial interrupted");
                trial.mark_failed("interrupted".to_string());
            }
            None => {
                debug!(trial = number, phase = %TrialPhase::Scoring, "scoring trial");
                match trial.final_record().copied() {
                    Some(record) => {
                        trial.mark_completed(objective_from_accuracy(record.accuracy));
                        info!(
                            trial = number,
                            accuracy = record.accuracy,
                            loss = record.loss,
                            "trial completed"
                        );
                    }
                    // The supervisor reports NoProgress before we get here;
                    // kept as a guard for the state machine.
                    None => trial.mark_failed("no metrics parsed".to_string()),
                }
            }
        }

        Ok(())
    }

    /// Attempted unconditionally; failures are logged, never propagated.
    fn cleanup(&self, number: u64, paths: &[&Path]) {
        for path in paths {
            match fs::remove_file(path) {
                Ok(()) => debug!(trial = number, file = %path.display(), "cleaned up"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(trial = number, file = %path.display(), "cleanup failed: {e}");
                }
            }
        }
    }

    /// Structured progress line comparing this trial to the best recorded
    /// before it.
    fn log_outcome(&self, trial: &TrialResult, study: &Study) {
        if trial.status != TrialStatus::Completed {
            return;
        }
        let accuracy = accuracy_from_objective(trial.objective);
        match study.best_trial() {
            Some(best) if study.direction().improves(trial.objective, best.objective) => {
                info!(
                    trial = trial.trial_number,
                    accuracy,
                    previous_best = accuracy_from_objective(best.objective),
                    "new best trial"
                );
            }
            Some(best) => {
                info!(
                    trial = trial.trial_number,
                    accuracy,
                    best = accuracy_from_objective(best.objective),
                    "best unchanged"
                );
            }
            None => info!(trial = trial.trial_number, accuracy, "first completed trial"),
        }
    }
}

/// The search loop: strictly one trial at a time, each read to completion
/// and recorded before the next starts. Cancellation stops before the next
/// trial; already-recorded trials are preserved.
pub fn run_search(
    study: &mut Study,
    orchestrator: &TrialOrchestrator,
    n_trials: usize,
    cancel: &CancelToken,
) -> NtResult<usize> {
    let mut ran = 0;
    for _ in 0..n_trials {
        if cancel.is_cancelled() {
            info!("search interrupted, stopping before next trial");
            break;
        }
        let trial = orchestrator.run_trial(study, cancel)?;
        study.record(trial)?;
        ran += 1;
    }
    Ok(ran)
}
