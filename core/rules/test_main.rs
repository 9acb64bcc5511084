use super::tool::{self, Placeholders, Tool};
use super::{BuildContext, BuildableContext, RuleDescriber, RuleError};
use crate::fingerprint::Contribution;
use crate::model::{BuildTarget, RulePaths, SourcePath};
use crate::steps::Step;
use std::path::PathBuf;

/// Generates the entrypoint that runs a package's tests, as Go's `go test` does before it can
/// compile a test binary.
///
/// The generator is given the package path and every test source, and must write the file at
/// `{{OUT}}`, which is `<gen_dir>/<short_name>_test_main.<ext>`.
///
#[derive(Builder, Debug, Clone, PartialEq, Eq)]
#[builder(
    setter(into),
    build_fn(validate = "Self::validate", error = "RuleError")
)]
pub struct TestMain {
    test_sources: Vec<SourcePath>,

    test_package: String,

    generator: Tool,

    #[builder(default = "\"go\".to_string()")]
    extension: String,
}

impl TestMain {
    pub fn builder() -> TestMainBuilder {
        TestMainBuilder::default()
    }

    pub fn test_package(&self) -> &str {
        &self.test_package
    }

    fn test_sources(&self) -> Vec<SourcePath> {
        let mut srcs = self.test_sources.clone();
        srcs.sort();
        srcs.dedup();
        srcs
    }

    fn output_path(&self, target: &BuildTarget, paths: &RulePaths) -> PathBuf {
        paths.gen_dir().join(format!(
            "{}_test_main.{}",
            target.short_name(),
            self.extension
        ))
    }
}

impl TestMainBuilder {
    fn validate(&self) -> Result<(), RuleError> {
        if let Some(extension) = &self.extension {
            super::validate_extension(extension)?;
        }
        Ok(())
    }
}

impl RuleDescriber for TestMain {
    fn kind(&self) -> &str {
        "test_main"
    }

    fn inputs(&self) -> Vec<SourcePath> {
        self.test_sources()
    }

    fn rule_key_fields(&self) -> Vec<Contribution> {
        vec![
            Contribution::new("test_package", self.test_package.as_str()),
            Contribution::new("generator", self.generator.to_field_value()),
            Contribution::new("extension", self.extension.as_str()),
        ]
    }

    fn outputs(&self, target: &BuildTarget, paths: &RulePaths) -> Vec<PathBuf> {
        vec![self.output_path(target, paths)]
    }

    fn build_steps(
        &self,
        ctx: &BuildContext,
        buildable: &mut BuildableContext,
    ) -> anyhow::Result<Vec<Step>> {
        let out = self.output_path(ctx.target(), ctx.paths());
        let srcs: Vec<String> = self
            .test_sources()
            .iter()
            .map(|src| ctx.resolve(src).to_string_lossy().to_string())
            .collect();

        let placeholders = Placeholders::new()
            .set(tool::PACKAGE, self.test_package.as_str())
            .set_list(tool::SRCS, srcs)
            .set(tool::OUT, out.to_string_lossy())
            .set(tool::OUT_DIR, ctx.paths().gen_dir().to_string_lossy());

        buildable.record_artifact(&out);

        Ok(vec![self.generator.to_step(&placeholders).into()])
    }
}
