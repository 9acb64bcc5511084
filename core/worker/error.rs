use super::TaskResultError;
use crate::model::BuildTarget;
use thiserror::*;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Worker was handed {0}, which is not part of the rule graph")]
    UnknownTarget(BuildTarget),

    #[error(transparent)]
    TaskResultError(TaskResultError),
}

impl From<TaskResultError> for WorkerError {
    fn from(err: TaskResultError) -> Self {
        Self::TaskResultError(err)
    }
}
