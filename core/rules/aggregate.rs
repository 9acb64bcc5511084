use super::{BuildContext, BuildableContext, RuleDescriber};
use crate::fingerprint::Contribution;
use crate::model::{BuildTarget, RulePaths, SourcePath};
use crate::steps::Step;
use std::path::PathBuf;

/// Collects the declared outputs of every dependency into its own `gen` directory, under
/// `<dependency base path>/<dependency name>__/`.
///
/// Its only artifact is its whole `gen` directory.
///
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Aggregate;

impl Aggregate {
    pub fn new() -> Self {
        Self
    }
}

impl RuleDescriber for Aggregate {
    fn kind(&self) -> &str {
        "aggregate"
    }

    fn inputs(&self) -> Vec<SourcePath> {
        vec![]
    }

    fn rule_key_fields(&self) -> Vec<Contribution> {
        vec![]
    }

    fn outputs(&self, _target: &BuildTarget, paths: &RulePaths) -> Vec<PathBuf> {
        vec![paths.gen_dir().to_path_buf()]
    }

    fn build_steps(
        &self,
        ctx: &BuildContext,
        buildable: &mut BuildableContext,
    ) -> anyhow::Result<Vec<Step>> {
        let gen_dir = ctx.paths().gen_dir();
        let mut steps = vec![];

        for (dep, outputs) in ctx.dependency_outputs() {
            let dep_gen_dir = ctx.gen_dir_of(dep);
            let dst_root = gen_dir.join(dep.relative_dir());
            steps.push(Step::mkdir(&dst_root));

            for output in outputs {
                let relative = output.strip_prefix(&dep_gen_dir).map_err(|_| {
                    anyhow::anyhow!(
                        "{} declares an output outside of its gen directory: {}",
                        dep,
                        output.display()
                    )
                })?;
                if relative.as_os_str().is_empty() {
                    steps.push(Step::copy(output, &dst_root));
                } else {
                    steps.push(Step::copy(output, dst_root.join(relative)));
                }
            }
        }

        buildable.record_artifact(gen_dir);
        Ok(steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::OutputPaths;
    use std::collections::BTreeMap;

    #[test]
    fn copies_every_dependency_output() {
        let target: BuildTarget = "//dist:all".parse().unwrap();
        let foo: BuildTarget = "//gen:foo".parse().unwrap();
        let bar: BuildTarget = "//lib:bar".parse().unwrap();
        let mut dependency_outputs = BTreeMap::new();
        dependency_outputs.insert(
            foo,
            vec![PathBuf::from("/out/gen/gen/foo__/com/x/Foo.java")],
        );
        dependency_outputs.insert(bar, vec![PathBuf::from("/out/gen/lib/bar__")]);
        let ctx = BuildContext::new(
            target,
            "/ws",
            OutputPaths::new("/out"),
            dependency_outputs,
        );
        let mut buildable = BuildableContext::new(ctx.paths().gen_dir());

        let steps = Aggregate.build_steps(&ctx, &mut buildable).unwrap();

        let descriptions: Vec<String> = steps.iter().map(Step::description).collect();
        assert_eq!(
            descriptions,
            vec![
                "mkdir -p /out/gen/dist/all__/gen/foo__",
                "cp -r /out/gen/gen/foo__/com/x/Foo.java /out/gen/dist/all__/gen/foo__/com/x/Foo.java",
                "mkdir -p /out/gen/dist/all__/lib/bar__",
                "cp -r /out/gen/lib/bar__ /out/gen/dist/all__/lib/bar__",
            ]
        );
        assert_eq!(
            buildable.recorded_artifacts(),
            &[PathBuf::from("/out/gen/dist/all__")]
        );
    }

    #[test]
    fn outputs_outside_a_dependency_gen_dir_are_refused() {
        let target: BuildTarget = "//dist:all".parse().unwrap();
        let foo: BuildTarget = "//gen:foo".parse().unwrap();
        let mut dependency_outputs = BTreeMap::new();
        dependency_outputs.insert(foo, vec![PathBuf::from("/etc/passwd")]);
        let ctx = BuildContext::new(
            target,
            "/ws",
            OutputPaths::new("/out"),
            dependency_outputs,
        );
        let mut buildable = BuildableContext::new(ctx.paths().gen_dir());

        assert!(Aggregate.build_steps(&ctx, &mut buildable).is_err());
    }
}
