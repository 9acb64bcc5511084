use crate::cache::CacheError;
use crate::fingerprint::RuleKeyError;
use crate::model::BuildTarget;
use crate::rules::RuleError;
use crate::steps::StepExecutionError;
use crate::worker::TaskResultError;
use std::path::PathBuf;
use thiserror::Error;

/// Why a single rule failed to build.
///
#[derive(Error, Debug)]
pub enum BuildFailure {
    #[error(transparent)]
    Fingerprint(RuleKeyError),

    #[error(transparent)]
    Describe(RuleError),

    #[error(transparent)]
    StepFailed(StepExecutionError),

    #[error("{target} did not produce its output {path:?}")]
    MissingOutput { target: BuildTarget, path: PathBuf },

    #[error("{target} recorded an artifact outside of its gen directory: {path:?}")]
    ArtifactOutsideOutputDir { target: BuildTarget, path: PathBuf },

    #[error("Could not collect the artifacts of {target}: {err}")]
    CollectArtifacts {
        target: BuildTarget,
        #[source]
        err: CacheError,
    },

    #[error("I/O error while building {target} at {path:?}: {err}")]
    Io {
        target: BuildTarget,
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },

    #[error("{target} panicked while building: {message}")]
    Panicked { target: BuildTarget, message: String },

    #[error(transparent)]
    InvalidState(TaskResultError),
}

impl BuildFailure {
    /// Whether the rule failed because one of its inputs could not be read.
    pub fn is_input_unavailable(&self) -> bool {
        matches!(
            self,
            BuildFailure::Fingerprint(RuleKeyError::InputUnavailable { .. })
        )
    }
}

impl From<RuleKeyError> for BuildFailure {
    fn from(err: RuleKeyError) -> Self {
        BuildFailure::Fingerprint(err)
    }
}

impl From<RuleError> for BuildFailure {
    fn from(err: RuleError) -> Self {
        BuildFailure::Describe(err)
    }
}

impl From<StepExecutionError> for BuildFailure {
    fn from(err: StepExecutionError) -> Self {
        BuildFailure::StepFailed(err)
    }
}

impl From<TaskResultError> for BuildFailure {
    fn from(err: TaskResultError) -> Self {
        BuildFailure::InvalidState(err)
    }
}
