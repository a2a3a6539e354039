//! Median-based early stopping across trials.

use nt_types::Direction;
use tracing::debug;

/// The cross-trial history view the pruner reads. Implemented by
/// [`crate::Study`] over its step index; kept as a trait so the policy is
/// testable without a study on disk.
pub trait StepHistory {
    /// Number of trials that ran to completion.
    fn completed_trials(&self) -> usize;

    /// Values other trials recorded at exactly `step`.
    fn values_at(&self, step: u64) -> &[f64];
}

/// Prunes a running trial whose intermediate value is strictly worse than
/// the median of what other trials recorded at the same step.
#[derive(Debug, Clone)]
pub struct MedianPruner {
    direction: Direction,
    n_startup_trials: usize,
    n_warmup_steps: u64,
    interval_steps: u64,
}

impl MedianPruner {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            n_startup_trials: 5,
            n_warmup_steps: 10,
            interval_steps: 1,
        }
    }

    /// Trials are exempt while fewer than `n` trials have completed.
    pub fn n_startup_trials(mut self, n: usize) -> Self {
        self.n_startup_trials = n;
        self
    }

    /// Steps `<= n` within a trial are exempt.
    pub fn n_warmup_steps(mut self, n: u64) -> Self {
        self.n_warmup_steps = n;
        self
    }

    /// Beyond warm-up, evaluate only at steps that are a multiple of `n`.
    pub fn interval_steps(mut self, n: u64) -> Self {
        self.interval_steps = n;
        self
    }

    /// Decide whether the trial reporting `value` at `step` should stop.
    pub fn should_prune(&self, history: &dyn StepHistory, step: u64, value: f64) -> bool {
        if history.completed_trials() < self.n_startup_trials {
            return false;
        }
        if step <= self.n_warmup_steps {
            return false;
        }
        if self.interval_steps > 1 && step % self.interval_steps != 0 {
            return false;
        }

        let Some(median) = median(history.values_at(step)) else {
            return false;
        };
        let prune = self.direction.is_worse(value, median);
        if prune {
            debug!(step, value, median, "intermediate value worse than study median");
        }
        prune
    }
}

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}
