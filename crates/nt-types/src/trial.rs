//! Trial records, metrics, and lifecycle tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::params::Assignment;

/// Sentinel objective for trials that produced no usable result. Under
/// `Direction::Minimize` this is infinitely bad, so failed trials can never
/// be selected as best.
pub const WORST_OBJECTIVE: f64 = f64::INFINITY;

/// Whether we are maximizing or minimizing the objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Minimize,
    Maximize,
}

impl Default for Direction {
    fn default() -> Self {
        Self::Minimize
    }
}

impl Direction {
    /// `candidate` improves on `incumbent` under this direction.
    pub fn improves(&self, candidate: f64, incumbent: f64) -> bool {
        match self {
            Self::Minimize => candidate < incumbent,
            Self::Maximize => candidate > incumbent,
        }
    }

    /// `value` is strictly worse than `reference` under this direction.
    pub fn is_worse(&self, value: f64, reference: f64) -> bool {
        match self {
            Self::Minimize => value > reference,
            Self::Maximize => value < reference,
        }
    }
}

/// One observed training step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub step: u64,
    pub loss: f64,
    pub accuracy: f64,
    pub learning_rate: f64,
}

/// Terminal (or in-flight) state of a trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialStatus {
    Running,
    Completed,
    Failed,
    Pruned,
    TimedOut,
}

impl TrialStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// JSON has no Infinity: the sentinel objective is stored as `null` and
/// restored on load.
mod objective_serde {
    use super::WORST_OBJECTIVE;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_some(value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(WORST_OBJECTIVE))
    }
}

/// Outcome of a single trial: the sampled assignment, the observed metric
/// history, and the scalar objective. Mutated only by the owning
/// orchestrator; frozen once the status leaves `Running`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub trial_number: u64,
    pub assignment: Assignment,
    pub records: Vec<MetricRecord>,
    #[serde(with = "objective_serde")]
    pub objective: f64,
    pub status: TrialStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl TrialResult {
    pub fn new(trial_number: u64, assignment: Assignment) -> Self {
        Self {
            trial_number,
            assignment,
            records: Vec::new(),
            objective: WORST_OBJECTIVE,
            status: TrialStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            error: None,
        }
    }

    pub fn mark_completed(&mut self, objective: f64) {
        self.objective = objective;
        self.status = TrialStatus::Completed;
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: String) {
        self.objective = WORST_OBJECTIVE;
        self.status = TrialStatus::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }

    pub fn mark_pruned(&mut self) {
        self.objective = WORST_OBJECTIVE;
        self.status = TrialStatus::Pruned;
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_timed_out(&mut self) {
        self.objective = WORST_OBJECTIVE;
        self.status = TrialStatus::TimedOut;
        self.finished_at = Some(Utc::now());
    }

    pub fn final_record(&self) -> Option<&MetricRecord> {
        self.records.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_comparisons() {
        assert!(Direction::Minimize.improves(0.1, 0.2));
        assert!(!Direction::Minimize.improves(0.2, 0.1));
        assert!(Direction::Maximize.improves(0.2, 0.1));

        assert!(Direction::Minimize.is_worse(0.3, 0.2));
        assert!(!Direction::Minimize.is_worse(0.2, 0.2));
        assert!(Direction::Maximize.is_worse(0.1, 0.2));
    }

    #[test]
    fn trial_lifecycle() {
        let mut trial = TrialResult::new(0, Assignment::new());
        assert_eq!(trial.status, TrialStatus::Running);
        assert_eq!(trial.objective, WORST_OBJECTIVE);

        trial.records.push(MetricRecord {
            step: 1,
            loss: 0.9,
            accuracy: 40.0,
            learning_rate: 0.01,
        });
        trial.mark_completed(-40.0);

        assert_eq!(trial.status, TrialStatus::Completed);
        assert_eq!(trial.objective, -40.0);
        assert!(trial.finished_at.is_some());
        assert_eq!(trial.final_record().unwrap().step, 1);
    }

    #[test]
    fn failed_trial_carries_sentinel() {
        let mut trial = TrialResult::new(3, Assignment::new());
        trial.mark_completed(-87.0);
        trial.mark_failed("trainer exited with code 1".into());

        assert_eq!(trial.status, TrialStatus::Failed);
        assert_eq!(trial.objective, WORST_OBJECTIVE);
        assert_eq!(trial.error.as_deref(), Some("trainer exited with code 1"));
    }

    #[test]
    fn sentinel_objective_survives_json() {
        let mut trial = TrialResult::new(7, Assignment::new());
        trial.mark_failed("boom".into());

        let json = serde_json::to_string(&trial).unwrap();
        let back: TrialResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.objective, WORST_OBJECTIVE);
        assert_eq!(back.status, TrialStatus::Failed);
    }

    #[test]
    fn finite_objective_round_trips() {
        let mut trial = TrialResult::new(7, Assignment::new());
        trial.mark_completed(-91.25);

        let json = serde_json::to_string(&trial).unwrap();
        let back: TrialResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.objective, -91.25);
    }
}
