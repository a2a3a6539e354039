//! # nt-search
//!
//! Search space definitions and dependency-constrained sampling for NetTune.
//!
//! Provides the generic ordered-parameter search space (continuous,
//! log-uniform, and integer domains with clip/activation rules that read the
//! in-progress assignment) and the concrete tuning space for the layered
//! network trainer, including its derived parameters.

mod netspace;
mod space;

pub use netspace::{NetworkSpace, DEFAULT_EPOCHS};
pub use space::{ActiveIf, ClipRule, Domain, ParameterSpec, SearchSpace};
