use crate::model::BuildTarget;
use std::fmt;
use std::path::PathBuf;
use thiserror::*;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Target {0} is defined more than once")]
    DuplicateTarget(BuildTarget),

    #[error("Targets {first} and {second} would share an output directory at {path:?}")]
    OutputPathConflict {
        first: BuildTarget,
        second: BuildTarget,
        path: PathBuf,
    },

    #[error("{target} depends on {dep}, which is not defined")]
    UnknownDependency {
        target: BuildTarget,
        dep: BuildTarget,
    },

    #[error("{target} declares {dep} as a dependency more than once")]
    DuplicateDependency {
        target: BuildTarget,
        dep: BuildTarget,
    },

    #[error("{target} reads outputs of {dep} without depending on it")]
    UndeclaredOutputDependency {
        target: BuildTarget,
        dep: BuildTarget,
    },

    #[error("Dependency cycle detected: {0}")]
    Cycle(DependencyCycle),
}

/// The targets that form a dependency cycle, starting from the smallest one and following
/// dependency edges.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyCycle {
    targets: Vec<BuildTarget>,
}

impl DependencyCycle {
    pub(crate) fn new(targets: Vec<BuildTarget>) -> Self {
        Self { targets }
    }

    pub fn targets(&self) -> &[BuildTarget] {
        &self.targets
    }

    pub fn contains(&self, target: &BuildTarget) -> bool {
        self.targets.contains(target)
    }
}

impl fmt::Display for DependencyCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for target in &self.targets {
            write!(f, "{} -> ", target)?;
        }
        match self.targets.first() {
            Some(first) => write!(f, "{}", first),
            None => Ok(()),
        }
    }
}
