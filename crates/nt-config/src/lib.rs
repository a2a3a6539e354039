//! # nt-config
//!
//! Section/key=value configuration documents for the external trainer:
//! order-preserving parsing and rendering, tuned-key materialization from a
//! sampled assignment, and atomic on-disk writes.

mod document;
mod materialize;

pub use document::ConfigDocument;
pub use materialize::{materialize, validate_template, SECTION_ARCHITECTURE,
    SECTION_HYPERPARAMETERS, SECTION_LR_SCHEDULER};
