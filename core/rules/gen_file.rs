use super::tool::{self, Placeholders, Tool};
use super::{BuildContext, BuildableContext, RuleDescriber, RuleError};
use crate::fingerprint::Contribution;
use crate::model::{BuildTarget, RulePaths, SourcePath};
use crate::steps::Step;
use std::path::PathBuf;

/// Generates a single file from a single input with a fixed command, the way interface
/// definition compilers (AIDL, protobuf, thrift) are usually run.
///
/// The generated file lands in `<gen_dir>/<import path as directories>/<input stem>.<ext>`, so
/// an input `Foo.idl` with import path `com.x` produces `com/x/Foo.java`.
///
#[derive(Builder, Debug, Clone, PartialEq, Eq)]
#[builder(
    setter(into),
    build_fn(validate = "Self::validate", error = "RuleError")
)]
pub struct GenFile {
    input: SourcePath,

    import_path: String,

    tool: Tool,

    #[builder(default = "\"java\".to_string()")]
    output_extension: String,
}

impl GenFile {
    pub fn builder() -> GenFileBuilder {
        GenFileBuilder::default()
    }

    pub fn input(&self) -> &SourcePath {
        &self.input
    }

    pub fn import_path(&self) -> &str {
        &self.import_path
    }

    fn import_dir(&self) -> PathBuf {
        self.import_path.split('.').collect()
    }

    fn output_path(&self, paths: &RulePaths) -> PathBuf {
        let stem = self
            .input
            .relative_path()
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        paths
            .gen_dir()
            .join(self.import_dir())
            .join(format!("{}.{}", stem, self.output_extension))
    }
}

impl GenFileBuilder {
    fn validate(&self) -> Result<(), RuleError> {
        if let Some(import_path) = &self.import_path {
            if import_path
                .split('.')
                .any(|part| part.is_empty() || part.contains(|c| c == '/' || c == '\\'))
            {
                return Err(RuleError::InvalidImportPath(import_path.clone()));
            }
        }
        if let Some(input) = &self.input {
            if input.relative_path().file_stem().is_none() {
                return Err(RuleError::InputWithoutFileName(input.clone()));
            }
        }
        if let Some(extension) = &self.output_extension {
            super::validate_extension(extension)?;
        }
        Ok(())
    }
}

impl RuleDescriber for GenFile {
    fn kind(&self) -> &str {
        "gen_file"
    }

    fn inputs(&self) -> Vec<SourcePath> {
        vec![self.input.clone()]
    }

    fn rule_key_fields(&self) -> Vec<Contribution> {
        vec![
            Contribution::new("import_path", self.import_path.as_str()),
            Contribution::new("tool", self.tool.to_field_value()),
            Contribution::new("output_extension", self.output_extension.as_str()),
        ]
    }

    fn outputs(&self, _target: &BuildTarget, paths: &RulePaths) -> Vec<PathBuf> {
        vec![self.output_path(paths)]
    }

    fn build_steps(
        &self,
        ctx: &BuildContext,
        buildable: &mut BuildableContext,
    ) -> anyhow::Result<Vec<Step>> {
        let out = self.output_path(ctx.paths());
        let out_dir = ctx.paths().gen_dir().join(self.import_dir());

        let placeholders = Placeholders::new()
            .set(tool::SRC, ctx.resolve(&self.input).to_string_lossy())
            .set(tool::OUT, out.to_string_lossy())
            .set(tool::OUT_DIR, out_dir.to_string_lossy())
            .set(tool::IMPORT_PATH, self.import_path.as_str());

        buildable.record_artifact(&out);

        Ok(vec![
            Step::mkdir(out_dir),
            self.tool.to_step(&placeholders).into(),
        ])
    }
}
