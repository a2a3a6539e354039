//! The persisted, resumable collection of trial outcomes.

use std::collections::BTreeMap;
use std::path::Path;

use nt_types::{Direction, MetricRecord, NtResult, StoreError, TrialResult, TrialStatus};
use tracing::{debug, info};
use uuid::Uuid;

use crate::pruner::StepHistory;
use crate::store::StudyStore;

/// The study minimizes; accuracy is negated so that higher accuracy sorts
/// as a better (smaller) objective.
pub fn objective_from_accuracy(accuracy: f64) -> f64 {
    -accuracy
}

pub fn accuracy_from_objective(objective: f64) -> f64 {
    -objective
}

/// Intermediate value a trial reports to the pruner at each step, on the
/// same scale as the final objective.
pub fn intermediate_value(record: &MetricRecord) -> f64 {
    -record.accuracy
}

/// All trials of one optimization run, keyed by strictly-increasing trial
/// number and mirrored to a durable store. Also maintains the step index
/// the pruning policy reads for cross-trial medians.
#[derive(Debug)]
pub struct Study {
    id: Uuid,
    direction: Direction,
    store: StudyStore,
    trials: BTreeMap<u64, TrialResult>,
    step_index: BTreeMap<u64, Vec<f64>>,
}

impl Study {
    /// Open a study backed by `path`, loading any previously recorded
    /// trials. Resumed trial numbers are never replayed.
    pub fn open(path: &Path) -> NtResult<Self> {
        let (store, loaded) = StudyStore::open(path)?;

        let mut study = Self {
            id: Uuid::new_v4(),
            direction: Direction::Minimize,
            store,
            trials: BTreeMap::new(),
            step_index: BTreeMap::new(),
        };

        let resumed = loaded.len();
        for trial in loaded {
            study.index_records(&trial);
            let number = trial.trial_number;
            if study.trials.insert(number, trial).is_some() {
                return Err(StoreError::DuplicateTrial(number).into());
            }
        }
        if resumed > 0 {
            info!(
                trials = resumed,
                next = study.next_trial_number(),
                "resuming study"
            );
        }
        Ok(study)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Persist and index one finished trial.
    pub fn record(&mut self, trial: TrialResult) -> NtResult<()> {
        let number = trial.trial_number;
        if self.trials.contains_key(&number) {
            return Err(StoreError::DuplicateTrial(number).into());
        }
        self.store.append(&trial)?;
        self.index_records(&trial);
        debug!(trial = number, status = ?trial.status, "trial recorded");
        self.trials.insert(number, trial);
        Ok(())
    }

    /// Numbers are allocated monotonically past everything ever recorded.
    pub fn next_trial_number(&self) -> u64 {
        self.trials.keys().next_back().map_or(0, |n| n + 1)
    }

    pub fn n_trials(&self) -> usize {
        self.trials.len()
    }

    pub fn n_completed(&self) -> usize {
        self.trials
            .values()
            .filter(|t| t.status == TrialStatus::Completed)
            .count()
    }

    pub fn trials(&self) -> impl Iterator<Item = &TrialResult> {
        self.trials.values()
    }

    /// The completed trial with the best objective under the study
    /// direction.
    pub fn best_trial(&self) -> Option<&TrialResult> {
        self.trials
            .values()
            .filter(|t| t.status == TrialStatus::Completed)
            .fold(None, |best, t| match best {
                Some(b) if !self.direction.improves(t.objective, b.objective) => Some(b),
                _ => Some(t),
            })
    }

    /// Terminal trials contribute their per-step values to the median
    /// index; a running trial is never in it, so pruning always compares
    /// against *other* trials.
    fn index_records(&mut self, trial: &TrialResult) {
        if !trial.status.is_terminal() {
            return;
        }
        for record in &trial.records {
            self.step_index
                .entry(record.step)
                .or_default()
                .push(intermediate_value(record));
        }
    }
}

impl StepHistory for Study {
    fn completed_trials(&self) -> usize {
        self.n_completed()
    }

    fn values_at(&self, step: u64) -> &[f64] {
        self.step_index.get(&step).map_or(&[], |v| v.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nt_types::Assignment;

    fn completed(number: u64, accuracy: f64) -> TrialResult {
        let mut t = TrialResult::new(number, Assignment::new());
        t.records.push(MetricRecord {
            step: 12,
            loss: 0.5,
            accuracy,
            learning_rate: 0.01,
        });
        t.mark_completed(objective_from_accuracy(accuracy));
        t
    }

    #[test]
    fn numbering_continues_after_resume() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("study.jsonl");

        {
            let mut study = Study::open(&path).unwrap();
            for n in 0..10 {
                study.record(completed(n, 50.0 + n as f64)).unwrap();
            }
        }

        let mut study = Study::open(&path).unwrap();
        assert_eq!(study.n_trials(), 10);
        for expected in 10..15 {
            assert_eq!(study.next_trial_number(), expected);
            study
                .record(completed(expected, 40.0 + expected as f64))
                .unwrap();
        }
        assert_eq!(study.n_trials(), 15);

        // The first ten are unchanged.
        let objectives: Vec<f64> = study.trials().take(10).map(|t| t.objective).collect();
        let expected: Vec<f64> = (0..10).map(|n| -(50.0 + n as f64)).collect();
        assert_eq!(objectives, expected);
    }

    #[test]
    fn best_trial_is_minimal_objective() {
        let dir = tempfile::tempdir().unwrap();
        let mut study = Study::open(&dir.path().join("study.jsonl")).unwrap();

        study.record(completed(0, 70.0)).unwrap();
        study.record(completed(1, 91.5)).unwrap();
        study.record(completed(2, 84.0)).unwrap();

        let mut failed = TrialResult::new(3, Assignment::new());
        failed.mark_failed("generator exploded".into());
        study.record(failed).unwrap();

        let best = study.best_trial().unwrap();
        assert_eq!(best.trial_number, 1);
        assert_eq!(accuracy_from_objective(best.objective), 91.5);
    }

    #[test]
    fn failed_trials_never_win() {
        let dir = tempfile::tempdir().unwrap();
        let mut study = Study::open(&dir.path().join("study.jsonl")).unwrap();

        let mut failed = TrialResult::new(0, Assignment::new());
        failed.mark_failed("boom".into());
        study.record(failed).unwrap();

        assert!(study.best_trial().is_none());
    }

    #[test]
    fn duplicate_trial_numbers_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut study = Study::open(&dir.path().join("study.jsonl")).unwrap();

        study.record(completed(0, 50.0)).unwrap();
        assert!(study.record(completed(0, 60.0)).is_err());
    }

    #[test]
    fn step_index_holds_other_trials_values() {
        let dir = tempfile::tempdir().unwrap();
        let mut study = Study::open(&dir.path().join("study.jsonl")).unwrap();

        study.record(completed(0, 80.0)).unwrap();
        study.record(completed(1, 90.0)).unwrap();

        let mut pruned = TrialResult::new(2, Assignment::new());
        pruned.records.push(MetricRecord {
            step: 12,
            loss: 1.0,
            accuracy: 20.0,
            learning_rate: 0.01,
        });
        pruned.mark_pruned();
        study.record(pruned).unwrap();

        let values = study.values_at(12);
        assert_eq!(values.len(), 3);
        assert!(values.contains(&-80.0));
        assert!(values.contains(&-20.0));
        assert!(study.values_at(13).is_empty());

        assert_eq!(study.completed_trials(), 2);
    }

    #[test]
    fn index_survives_resume() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("study.jsonl");
        {
            let mut study = Study::open(&path).unwrap();
            study.record(completed(0, 75.0)).unwrap();
        }
        let study = Study::open(&path).unwrap();
        assert_eq!(study.values_at(12), &[-75.0]);
    }
}
