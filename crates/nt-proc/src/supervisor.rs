//! Supervision of the external trainer process.
//!
//! Stdout is streamed by a reader thread into a bounded channel consumed
//! with `recv_timeout`, so prune decisions, cancellation, and the per-trial
//! deadline are observed between lines and a dead process never leaves the
//! loop blocked on a closed stream. Stderr is buffered on a side thread and
//! surfaced when the trainer fails.

use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, RecvTimeoutError};
use nt_types::{CancelToken, MetricRecord, TrainingError};
use tracing::{debug, info, warn};

use crate::progress::parse_progress_line;

/// Caller's verdict after each parsed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainControl {
    Continue,
    Prune,
}

/// Why a supervised run was stopped before the trainer finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Pruned,
    Cancelled,
    DeadlineExpired,
}

/// Everything observed from one training run.
#[derive(Debug, Clone, Default)]
pub struct TrainingOutcome {
    pub records: Vec<MetricRecord>,
    pub best_accuracy: Option<f64>,
    pub best_loss: Option<f64>,
    /// Set when the run was stopped early; `None` means the trainer ran to
    /// completion and exited cleanly.
    pub stopped: Option<StopReason>,
}

impl TrainingOutcome {
    pub fn final_record(&self) -> Option<&MetricRecord> {
        self.records.last()
    }
}

/// Spawns and supervises `<trainer> --train --save <checkpoint> <artifact>
/// <training-data>`.
#[derive(Debug, Clone)]
pub struct TrainerSupervisor {
    program: PathBuf,
    training_data: PathBuf,
    poll_interval: Duration,
}

impl TrainerSupervisor {
    pub fn new(program: impl Into<PathBuf>, training_data: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            training_data: training_data.into(),
            poll_interval: Duration::from_millis(200),
        }
    }

    /// How often the supervise loop wakes to check cancellation, deadline,
    /// and child liveness while no output arrives.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Run one training session. `on_record` is called after every parsed
    /// progress record; returning [`TrainControl::Prune`] kills the child
    /// and ends the session with [`StopReason::Pruned`].
    ///
    /// Early stops (prune, cancel, deadline) return `Ok` with
    /// `outcome.stopped` set. Natural completion maps a non-zero exit to
    /// [`TrainingError::NonZeroExit`] and a clean exit with no parsed
    /// records to [`TrainingError::NoProgress`].
    pub fn train<F>(
        &self,
        artifact: &Path,
        checkpoint: &Path,
        deadline: Option<Instant>,
        cancel: &CancelToken,
        mut on_record: F,
    ) -> Result<TrainingOutcome, TrainingError>
    where
        F: FnMut(&MetricRecord) -> TrainControl,
    {
        debug!(
            trainer = %self.program.display(),
            artifact = %artifact.display(),
            "starting training"
        );

        let mut child = Command::new(&self.program)
            .arg("--train")
            .arg("--save")
            .arg(checkpoint)
            .arg(artifact)
            .arg(&self.training_data)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| TrainingError::Spawn(e.to_string()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TrainingError::Spawn("stdout not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| TrainingError::Spawn("stderr not captured".into()))?;

        let (tx, rx) = bounded::<String>(64);
        let stdout_reader = thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
        let stderr_reader = thread::spawn(move || {
            let mut buf = String::new();
            let _ = BufReader::new(stderr).read_to_string(&mut buf);
            buf
        });

        let mut outcome = TrainingOutcome::default();
        let mut child_exited = false;

        let stopped = loop {
            if cancel.is_cancelled() {
                break Some(StopReason::Cancelled);
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                break Some(StopReason::DeadlineExpired);
            }

            match rx.recv_timeout(self.poll_interval) {
                Ok(line) => {
                    let Some(record) = parse_progress_line(&line) else {
                        continue;
                    };
                    if outcome
                        .records
                        .last()
                        .is_some_and(|last| record.step <= last.step)
                    {
                        debug!(step = record.step, "dropping non-increasing progress step");
                        continue;
                    }

                    let best_accuracy = outcome
                        .best_accuracy
                        .map_or(record.accuracy, |b| b.max(record.accuracy));
                    let best_loss = outcome.best_loss.map_or(record.loss, |b| b.min(record.loss));
                    outcome.best_accuracy = Some(best_accuracy);
                    outcome.best_loss = Some(best_loss);
                    outcome.records.push(record);

                    info!(
                        step = record.step,
                        loss = record.loss,
                        accuracy = record.accuracy,
                        lr = record.learning_rate,
                        best_accuracy,
                        best_loss,
                        "training progress"
                    );

                    if on_record(&record) == TrainControl::Prune {
                        break Some(StopReason::Pruned);
                    }
                }
                // The pipe can outlive the child (e.g. an inherited
                // grandchild); one extra poll after exit drains stragglers,
                // then reading stops rather than waiting on a dead stream.
                Err(RecvTimeoutError::Timeout) => {
                    if child_exited {
                        break None;
                    }
                    child_exited = matches!(child.try_wait(), Ok(Some(_)));
                }
                Err(RecvTimeoutError::Disconnected) => break None,
            }
        };

        if let Some(reason) = stopped {
            outcome.stopped = Some(reason);
            let _ = child.kill();
            let _ = child.wait();
            debug!(?reason, "training stopped early");
            // A grandchild of the trainer can keep the pipes open past the
            // kill; the reader threads are detached here so an early stop
            // never waits on a stream we no longer care about.
            drop(stdout_reader);
            drop(stderr_reader);
            return Ok(outcome);
        }

        let status = child.wait()?;
        drop(stdout_reader);
        let stderr_output = stderr_reader.join().unwrap_or_default();

        if !status.success() {
            return Err(match status.code() {
                Some(code) => TrainingError::NonZeroExit {
                    code,
                    stderr: stderr_output.trim().to_string(),
                },
                None => TrainingError::Signalled,
            });
        }
        if outcome.records.is_empty() {
            warn!("trainer exited cleanly without reporting any progress");
            return Err(TrainingError::NoProgress);
        }

        Ok(outcome)
    }
}
