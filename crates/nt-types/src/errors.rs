use thiserror::Error;

/// Main error type for the NetTune system
#[derive(Error, Debug)]
pub enum NtError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Sampling error: {0}")]
    Sampling(#[from] SamplingError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Training error: {0}")]
    Training(#[from] TrainingError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl NtError {
    /// Whether the error is recovered at trial scope (the trial gets the
    /// sentinel worst objective and the search continues) as opposed to
    /// fatal for the whole run.
    ///
    /// Raw IO errors only reach the orchestrator from per-trial file work
    /// (config write, cleanup); store IO is wrapped in [`StoreError`] and
    /// stays fatal.
    pub fn is_trial_scoped(&self) -> bool {
        matches!(
            self,
            Self::Generation(_) | Self::Training(_) | Self::Io(_)
        )
    }
}

/// Configuration-template errors. Always fatal: detected before any
/// subprocess runs.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read template {path}: {message}")]
    TemplateRead { path: String, message: String },

    #[error("line {line}: entry outside any section: {content}")]
    OrphanEntry { line: usize, content: String },

    #[error("line {line}: malformed entry: {content}")]
    MalformedEntry { line: usize, content: String },

    #[error("missing required section [{0}]")]
    MissingSection(String),
}

/// Search-space errors. An unsatisfiable dependency between parameters is a
/// programming error in the space definition, fatal before any trial runs.
#[derive(Error, Debug)]
pub enum SamplingError {
    #[error("parameter {param} depends on {depends_on}, which is not sampled at that point")]
    UnsatisfiedDependency { param: String, depends_on: String },

    #[error("parameter {param}: dependency {depends_on} did not sample an integer")]
    NonIntegerDependency { param: String, depends_on: String },

    #[error("parameter {param} has an empty range [{low}, {high}]")]
    EmptyRange { param: String, low: i64, high: i64 },
}

/// Failures of the external generator collaborator. Trial-scoped.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("generator could not be started: {0}")]
    Spawn(String),

    #[error("generator exited with code {code}: {stderr}")]
    NonZeroExit { code: i32, stderr: String },

    #[error("expected artifact {0} was not created")]
    MissingArtifact(String),
}

/// Failures of the external trainer collaborator. Trial-scoped.
#[derive(Error, Debug)]
pub enum TrainingError {
    #[error("trainer could not be started: {0}")]
    Spawn(String),

    #[error("trainer exited with code {code}: {stderr}")]
    NonZeroExit { code: i32, stderr: String },

    #[error("trainer exited cleanly but emitted no parseable progress line")]
    NoProgress,

    #[error("trainer terminated by signal")]
    Signalled,

    #[error("IO error while supervising trainer: {0}")]
    Io(#[from] std::io::Error),
}

/// Study-store errors. Fatal: the run cannot continue meaningfully if the
/// store is unreadable or unwritable.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("cannot open study store {path}: {message}")]
    Open { path: String, message: String },

    #[error("corrupt study store {path} at line {line}: {message}")]
    Corrupt { path: String, line: usize, message: String },

    #[error("cannot append to study store {path}: {message}")]
    Append { path: String, message: String },

    #[error("duplicate trial number {0} in study store")]
    DuplicateTrial(u64),
}

/// Result type alias for NetTune operations
pub type NtResult<T> = Result<T, NtError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = GenerationError::NonZeroExit {
            code: 2,
            stderr: "bad config".to_string(),
        };
        assert!(error.to_string().contains("code 2"));
        assert!(error.to_string().contains("bad config"));
    }

    #[test]
    fn test_error_conversion() {
        let training_error = TrainingError::NoProgress;
        let nt_error: NtError = training_error.into();

        match nt_error {
            NtError::Training(_) => (),
            _ => panic!("Expected Training error"),
        }
    }

    #[test]
    fn trial_scoped_classification() {
        let gen: NtError = GenerationError::MissingArtifact("trial_0_1.nn".into()).into();
        assert!(gen.is_trial_scoped());

        let train: NtError = TrainingError::NoProgress.into();
        assert!(train.is_trial_scoped());

        let config: NtError = ConfigError::MissingSection("hyperparameters".into()).into();
        assert!(!config.is_trial_scoped());

        let store: NtError = StoreError::DuplicateTrial(3).into();
        assert!(!store.is_trial_scoped());

        let sampling: NtError = SamplingError::UnsatisfiedDependency {
            param: "hidden_size_1".into(),
            depends_on: "hidden_size_0".into(),
        }
        .into();
        assert!(!sampling.is_trial_scoped());
    }
}
