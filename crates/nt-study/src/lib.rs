//! # nt-study
//!
//! The study layer of NetTune: durable, resumable trial bookkeeping, the
//! median pruning policy, the per-trial orchestrator that ties sampling,
//! materialization, generation, and supervised training together, and the
//! final report.

mod orchestrator;
mod pruner;
mod report;
mod store;
mod study;

pub use orchestrator::{run_search, OrchestratorConfig, TrialOrchestrator};
pub use pruner::{MedianPruner, StepHistory};
pub use report::{Report, ReportEntry, SystemInfo};
pub use store::StudyStore;
pub use study::{accuracy_from_objective, intermediate_value, objective_from_accuracy, Study};
