//! # nt-proc
//!
//! External collaborators of the tuning driver: the network generator and
//! the trainer. The generator is a short-lived invocation checked for its
//! exit code and expected artifact; the trainer is supervised live, its
//! stdout streamed through a cancellable channel and parsed into metric
//! records while stderr is buffered for failure reporting.

mod generator;
mod progress;
mod supervisor;

pub use generator::Generator;
pub use progress::parse_progress_line;
pub use supervisor::{StopReason, TrainControl, TrainerSupervisor, TrainingOutcome};
