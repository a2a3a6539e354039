//! The final study report: best configuration, full history, optional
//! parameter importance, and run metadata.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use nt_types::{Assignment, NtResult, TrialResult, TrialStatus};

use crate::study::{accuracy_from_objective, Study};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub trial: u64,
    pub accuracy: f64,
    pub params: Assignment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub date: DateTime<Utc>,
    pub version: String,
    pub study_id: Uuid,
}

/// Serializable summary of one finished optimization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub best_accuracy: f64,
    pub best_params: Assignment,
    pub n_trials: usize,
    pub optimization_history: Vec<ReportEntry>,
    pub importance: Option<BTreeMap<String, f64>>,
    pub system_info: SystemInfo,
}

impl Report {
    /// Build the report; `None` until at least one trial completed.
    /// `sampled_names` are the primitives eligible for the importance map.
    pub fn from_study(study: &Study, sampled_names: &[String]) -> Option<Self> {
        let best = study.best_trial()?;

        let optimization_history = study
            .trials()
            .filter(|t| t.status == TrialStatus::Completed)
            .map(|t| ReportEntry {
                trial: t.trial_number,
                accuracy: accuracy_from_objective(t.objective),
                params: t.assignment.clone(),
            })
            .collect();

        Some(Self {
            best_accuracy: accuracy_from_objective(best.objective),
            best_params: best.assignment.clone(),
            n_trials: study.n_trials(),
            optimization_history,
            importance: parameter_importance(study, sampled_names),
            system_info: SystemInfo {
                date: Utc::now(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                study_id: study.id(),
            },
        })
    }

    pub fn write(&self, path: &Path) -> NtResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        debug!(report = %path.display(), "report written");
        Ok(())
    }
}

/// Normalized |Pearson correlation| of each sampled primitive against the
/// objective over completed trials. `None` with fewer than two completed
/// trials or when no parameter varies.
fn parameter_importance(
    study: &Study,
    sampled_names: &[String],
) -> Option<BTreeMap<String, f64>> {
    let completed: Vec<&TrialResult> = study
        .trials()
        .filter(|t| t.status == TrialStatus::Completed)
        .collect();
    if completed.len() < 2 {
        return None;
    }

    let mut scores = BTreeMap::new();
    for name in sampled_names {
        // Conditionally-active parameters are scored over the trials that
        // sampled them.
        let pairs: Vec<(f64, f64)> = completed
            .iter()
            .filter_map(|t| t.assignment.get_f64(name).map(|v| (v, t.objective)))
            .collect();
        if pairs.len() < 2 {
            continue;
        }
        if let Some(r) = pearson(&pairs) {
            scores.insert(name.clone(), r.abs());
        }
    }

    let total: f64 = scores.values().sum();
    if total <= 0.0 {
        return None;
    }
    for score in scores.values_mut() {
        *score /= total;
    }
    Some(scores)
}

fn pearson(pairs: &[(f64, f64)]) -> Option<f64> {
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let denom = (var_x * var_y).sqrt();
    if denom == 0.0 {
        return None;
    }
    let r = cov / denom;
    r.is_finite().then_some(r)
}
