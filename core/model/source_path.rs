use super::BuildTarget;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// A reference to a file a rule reads.
///
/// Either a path relative to the workspace root, or a path inside the output directory of one of
/// the rule's dependencies.
///
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SourcePath {
    Workspace(PathBuf),
    BuildTargetOutput { target: BuildTarget, path: PathBuf },
}

impl SourcePath {
    pub fn workspace<P: Into<PathBuf>>(path: P) -> Self {
        Self::Workspace(path.into())
    }

    pub fn output<P: Into<PathBuf>>(target: BuildTarget, path: P) -> Self {
        Self::BuildTargetOutput {
            target,
            path: path.into(),
        }
    }

    /// The path of the file, relative to whichever root it belongs to.
    pub fn relative_path(&self) -> &Path {
        match self {
            SourcePath::Workspace(path) => path,
            SourcePath::BuildTargetOutput { path, .. } => path,
        }
    }

    pub fn producing_target(&self) -> Option<&BuildTarget> {
        match self {
            SourcePath::Workspace(_) => None,
            SourcePath::BuildTargetOutput { target, .. } => Some(target),
        }
    }

    pub fn file_name(&self) -> Option<&str> {
        self.relative_path().file_name().and_then(|f| f.to_str())
    }
}

impl fmt::Display for SourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourcePath::Workspace(path) => write!(f, "{}", path.display()),
            SourcePath::BuildTargetOutput { target, path } => {
                write!(f, "{}/{}", target, path.display())
            }
        }
    }
}

impl From<&str> for SourcePath {
    fn from(value: &str) -> Self {
        Self::Workspace(value.into())
    }
}

impl From<PathBuf> for SourcePath {
    fn from(value: PathBuf) -> Self {
        Self::Workspace(value)
    }
}
