//! # Steps
//!
//! A step is the atomic unit of work in a rule's build. Rules produce a finite list of steps,
//! and the [StepRunner] executes them strictly in order, stopping at the first failure.
//!
//! Steps may only write inside the output area of the rule that owns them (its `gen` and
//! `scratch` directories). Every write target is checked against the [StepContext] before
//! anything touches the filesystem.
//!
mod exec;
mod fs;
mod runner;

pub use exec::*;
pub use fs::*;
pub use runner::*;

use crate::model::{BuildTarget, RulePaths};
use crate::util::fs::is_within;
use std::path::{Path, PathBuf};
use thiserror::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    MakeCleanDir(MakeCleanDirStep),
    Mkdir(MkdirStep),
    WriteFile(WriteFileStep),
    Copy(CopyStep),
    Exec(ExecStep),
}

impl Step {
    pub fn make_clean_dir<P: Into<PathBuf>>(path: P) -> Self {
        Self::MakeCleanDir(MakeCleanDirStep::new(path))
    }

    pub fn mkdir<P: Into<PathBuf>>(path: P) -> Self {
        Self::Mkdir(MkdirStep::new(path))
    }

    pub fn write_file<P: Into<PathBuf>, C: Into<Vec<u8>>>(path: P, contents: C) -> Self {
        Self::WriteFile(WriteFileStep::new(path, contents))
    }

    pub fn copy<S: Into<PathBuf>, D: Into<PathBuf>>(src: S, dst: D) -> Self {
        Self::Copy(CopyStep::new(src, dst))
    }

    /// A human-readable summary of what this step does.
    pub fn description(&self) -> String {
        match self {
            Step::MakeCleanDir(step) => step.description(),
            Step::Mkdir(step) => step.description(),
            Step::WriteFile(step) => step.description(),
            Step::Copy(step) => step.description(),
            Step::Exec(step) => step.description(),
        }
    }

    pub async fn run(&self, ctx: &StepContext) -> Result<(), StepError> {
        match self {
            Step::MakeCleanDir(step) => step.run(ctx).await,
            Step::Mkdir(step) => step.run(ctx).await,
            Step::WriteFile(step) => step.run(ctx).await,
            Step::Copy(step) => step.run(ctx).await,
            Step::Exec(step) => step.run(ctx).await,
        }
    }
}

impl From<MakeCleanDirStep> for Step {
    fn from(step: MakeCleanDirStep) -> Self {
        Self::MakeCleanDir(step)
    }
}

impl From<MkdirStep> for Step {
    fn from(step: MkdirStep) -> Self {
        Self::Mkdir(step)
    }
}

impl From<WriteFileStep> for Step {
    fn from(step: WriteFileStep) -> Self {
        Self::WriteFile(step)
    }
}

impl From<CopyStep> for Step {
    fn from(step: CopyStep) -> Self {
        Self::Copy(step)
    }
}

impl From<ExecStep> for Step {
    fn from(step: ExecStep) -> Self {
        Self::Exec(step)
    }
}

/// What a step needs to know about the rule it runs for.
///
#[derive(Debug, Clone)]
pub struct StepContext {
    target: BuildTarget,
    workspace_root: PathBuf,
    working_dir: PathBuf,
    writable_roots: Vec<PathBuf>,
}

impl StepContext {
    pub fn new<P: Into<PathBuf>>(target: BuildTarget, workspace_root: P, paths: &RulePaths) -> Self {
        Self {
            target,
            workspace_root: workspace_root.into(),
            working_dir: paths.scratch_dir().to_path_buf(),
            writable_roots: paths
                .writable_roots()
                .iter()
                .map(|root| root.to_path_buf())
                .collect(),
        }
    }

    pub fn target(&self) -> &BuildTarget {
        &self.target
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// The directory processes run in unless a step says otherwise.
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn check_writable(&self, path: &Path) -> Result<(), StepError> {
        if self
            .writable_roots
            .iter()
            .any(|root| is_within(path, root))
        {
            return Ok(());
        }
        Err(StepError::EscapesOutputArea {
            target: self.target.clone(),
            path: path.to_path_buf(),
        })
    }
}

#[derive(Error, Debug)]
pub enum StepError {
    #[error("{path:?} is outside of the output area of {target}")]
    EscapesOutputArea { target: BuildTarget, path: PathBuf },

    #[error("I/O error on {path:?}: {err}")]
    Io {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },

    #[error("Could not spawn {program:?}: {err}")]
    CouldNotSpawn {
        program: String,
        #[source]
        err: std::io::Error,
    },

    #[error("{program:?} exited with {status}\n{stderr}")]
    ProcessFailed {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
}

impl StepError {
    pub(crate) fn io(path: &Path) -> impl FnOnce(std::io::Error) -> StepError + '_ {
        move |err| StepError::Io {
            path: path.to_path_buf(),
            err,
        }
    }
}
