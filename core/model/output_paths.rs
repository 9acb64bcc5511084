use super::BuildTarget;
use std::path::{Path, PathBuf};

pub const GEN_DIR: &str = "gen";
pub const SCRATCH_DIR: &str = "scratch";

/// Derives the per-target output locations under a single output root.
///
/// Every target gets two directories:
///
/// * `<root>/gen/<base_path>/<short_name>[#flavors]__`, where its artifacts live, and
/// * `<root>/scratch/<base_path>/<short_name>[#flavors]__`, for intermediate files that are never
///   cached.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    output_root: PathBuf,
}

impl OutputPaths {
    pub fn new<P: Into<PathBuf>>(output_root: P) -> Self {
        Self {
            output_root: output_root.into(),
        }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    pub fn gen_dir(&self, target: &BuildTarget) -> PathBuf {
        self.output_root
            .join(GEN_DIR)
            .join(target.relative_dir())
    }

    pub fn scratch_dir(&self, target: &BuildTarget) -> PathBuf {
        self.output_root
            .join(SCRATCH_DIR)
            .join(target.relative_dir())
    }

    pub fn rule_paths(&self, target: &BuildTarget) -> RulePaths {
        RulePaths {
            gen_dir: self.gen_dir(target),
            scratch_dir: self.scratch_dir(target),
        }
    }
}

/// The output locations of a single rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RulePaths {
    gen_dir: PathBuf,
    scratch_dir: PathBuf,
}

impl RulePaths {
    pub fn gen_dir(&self) -> &Path {
        &self.gen_dir
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// The only directories a rule's steps are allowed to write to.
    pub fn writable_roots(&self) -> [&Path; 2] {
        [&self.gen_dir, &self.scratch_dir]
    }
}
