use super::tool::{self, Placeholders, Tool};
use super::{BuildContext, BuildableContext, RuleDescriber, RuleError};
use crate::fingerprint::{Contribution, FieldValue};
use crate::model::{BuildTarget, RulePaths, SourcePath};
use crate::steps::Step;
use globset::{GlobBuilder, GlobMatcher};
use std::path::PathBuf;

/// Compiles the subset of its sources that carry a given extension into a single module.
///
/// Source lists often mix languages (headers, resources, other languages' files), and only the
/// matching ones are handed to the compiler, and only those affect the rule key. Extensions
/// match case-insensitively. The module name defaults to the target's short name.
///
#[derive(Builder, Debug, Clone, PartialEq, Eq)]
#[builder(
    setter(into),
    build_fn(validate = "Self::validate", error = "RuleError")
)]
pub struct FilteredCompile {
    srcs: Vec<SourcePath>,

    extension: String,

    compiler: Tool,

    #[builder(default)]
    compiler_flags: Vec<String>,

    #[builder(setter(strip_option), default)]
    module_name: Option<String>,

    #[builder(default = "\"o\".to_string()")]
    output_extension: String,
}

impl FilteredCompile {
    pub fn builder() -> FilteredCompileBuilder {
        FilteredCompileBuilder::default()
    }

    pub fn module_name(&self, target: &BuildTarget) -> String {
        self.module_name
            .clone()
            .unwrap_or_else(|| target.short_name().to_string())
    }

    fn matcher(&self) -> Option<GlobMatcher> {
        source_matcher(&self.extension).ok()
    }

    /// The sources with a matching extension, sorted and without duplicates.
    pub fn filtered_srcs(&self) -> Vec<SourcePath> {
        let matcher = match self.matcher() {
            Some(matcher) => matcher,
            None => return vec![],
        };
        let mut srcs: Vec<SourcePath> = self
            .srcs
            .iter()
            .filter(|src| src.file_name().map_or(false, |name| matcher.is_match(name)))
            .cloned()
            .collect();
        srcs.sort();
        srcs.dedup();
        srcs
    }

    fn output_path(&self, target: &BuildTarget, paths: &RulePaths) -> PathBuf {
        paths.gen_dir().join(format!(
            "{}.{}",
            self.module_name(target),
            self.output_extension
        ))
    }
}

fn source_matcher(extension: &str) -> Result<GlobMatcher, globset::Error> {
    Ok(GlobBuilder::new(&format!("*.{}", extension))
        .case_insensitive(true)
        .literal_separator(true)
        .build()?
        .compile_matcher())
}

impl FilteredCompileBuilder {
    fn validate(&self) -> Result<(), RuleError> {
        if let Some(extension) = &self.extension {
            super::validate_extension(extension)?;
            source_matcher(extension)
                .map_err(|_| RuleError::InvalidExtension(extension.clone()))?;
        }
        if let Some(extension) = &self.output_extension {
            super::validate_extension(extension)?;
        }
        Ok(())
    }
}

impl RuleDescriber for FilteredCompile {
    fn kind(&self) -> &str {
        "filtered_compile"
    }

    fn inputs(&self) -> Vec<SourcePath> {
        self.filtered_srcs()
    }

    fn rule_key_fields(&self) -> Vec<Contribution> {
        vec![
            Contribution::new("extension", self.extension.to_lowercase()),
            Contribution::new("compiler", self.compiler.to_field_value()),
            Contribution::new("compiler_flags", FieldValue::list(self.compiler_flags.iter())),
            Contribution::new("module_name", self.module_name.clone()),
            Contribution::new("output_extension", self.output_extension.as_str()),
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
            .filtered_srcs()
            .iter()
            .map(|src| ctx.resolve(src).to_string_lossy().to_string())
            .collect();

        let placeholders = Placeholders::new()
            .set_list(tool::SRCS, srcs)
            .set_list(tool::FLAGS, self.compiler_flags.iter().cloned())
            .set(tool::MODULE_NAME, self.module_name(ctx.target()))
            .set(tool::OUT, out.to_string_lossy())
            .set(tool::OUT_DIR, ctx.paths().gen_dir().to_string_lossy());

        buildable.record_artifact(&out);

        Ok(vec![self.compiler.to_step(&placeholders).into()])
    }
}
