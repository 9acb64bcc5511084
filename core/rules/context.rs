use crate::model::{BuildTarget, OutputPaths, RulePaths, SourcePath};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The read side of a rule's build: resolves source references to absolute paths and knows
/// where every dependency keeps its outputs.
///
/// Created right before a rule's steps are produced, and discarded once they finish.
///
#[derive(Debug, Clone)]
pub struct BuildContext {
    target: BuildTarget,
    workspace_root: PathBuf,
    output_paths: OutputPaths,
    paths: RulePaths,
    dependency_outputs: BTreeMap<BuildTarget, Vec<PathBuf>>,
}

impl BuildContext {
    pub fn new<P: Into<PathBuf>>(
        target: BuildTarget,
        workspace_root: P,
        output_paths: OutputPaths,
        dependency_outputs: BTreeMap<BuildTarget, Vec<PathBuf>>,
    ) -> Self {
        let paths = output_paths.rule_paths(&target);
        Self {
            target,
            workspace_root: workspace_root.into(),
            output_paths,
            paths,
            dependency_outputs,
        }
    }

    pub fn target(&self) -> &BuildTarget {
        &self.target
    }

    pub fn paths(&self) -> &RulePaths {
        &self.paths
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// The absolute path of a source reference.
    pub fn resolve(&self, source: &SourcePath) -> PathBuf {
        match source {
            SourcePath::Workspace(path) => self.workspace_root.join(path),
            SourcePath::BuildTargetOutput { target, path } => {
                self.output_paths.gen_dir(target).join(path)
            }
        }
    }

    pub fn gen_dir_of(&self, dep: &BuildTarget) -> PathBuf {
        self.output_paths.gen_dir(dep)
    }

    /// The declared outputs of every dependency, keyed by dependency.
    pub fn dependency_outputs(&self) -> &BTreeMap<BuildTarget, Vec<PathBuf>> {
        &self.dependency_outputs
    }
}

/// The write side of a rule's build: the artifacts a rule claims as its outputs.
///
#[derive(Debug, Clone)]
pub struct BuildableContext {
    gen_dir: PathBuf,
    artifacts: Vec<PathBuf>,
}

impl BuildableContext {
    pub fn new<P: Into<PathBuf>>(gen_dir: P) -> Self {
        Self {
            gen_dir: gen_dir.into(),
            artifacts: vec![],
        }
    }

    /// Claim a file or directory as an artifact of this rule. Relative paths are relative to
    /// the rule's `gen` directory.
    pub fn record_artifact<P: AsRef<Path>>(&mut self, path: P) {
        let path = self.gen_dir.join(path);
        if !self.artifacts.contains(&path) {
            self.artifacts.push(path);
        }
    }

    pub fn recorded_artifacts(&self) -> &[PathBuf] {
        &self.artifacts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_workspace_and_dependency_sources() {
        let target: BuildTarget = "//app:bin".parse().unwrap();
        let dep: BuildTarget = "//gen:foo".parse().unwrap();
        let ctx = BuildContext::new(
            target,
            "/ws",
            OutputPaths::new("/out"),
            BTreeMap::new(),
        );
        assert_eq!(
            ctx.resolve(&SourcePath::workspace("app/main.swift")),
            PathBuf::from("/ws/app/main.swift")
        );
        assert_eq!(
            ctx.resolve(&SourcePath::output(dep, "com/x/Foo.java")),
            PathBuf::from("/out/gen/gen/foo__/com/x/Foo.java")
        );
        assert_eq!(ctx.paths().gen_dir(), Path::new("/out/gen/app/bin__"));
    }

    #[test]
    fn artifacts_are_recorded_once_relative_to_the_gen_dir() {
        let mut buildable = BuildableContext::new("/out/gen/a/b__");
        buildable.record_artifact("x.txt");
        buildable.record_artifact("/out/gen/a/b__/x.txt");
        buildable.record_artifact("/out/gen/a/b__/y.txt");
        assert_eq!(
            buildable.recorded_artifacts(),
            &[
                PathBuf::from("/out/gen/a/b__/x.txt"),
                PathBuf::from("/out/gen/a/b__/y.txt")
            ]
        );
    }
}
