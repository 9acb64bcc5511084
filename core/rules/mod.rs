//! # Build rules
//!
//! A [BuildRule] is a node in the rule graph: a target, the targets it depends on, and a
//! [RuleKind] that knows which sources the rule reads, what goes into its rule key, where its
//! outputs go, and which steps produce them.
//!
//! The built-in kinds cover the common shapes of rules (generating a file from a single input,
//! compiling a filtered set of sources, generating a test entrypoint, and aggregating other
//! rules' outputs). Anything else plugs in through [RuleDescriber] as a `RuleKind::Custom`.
//!
mod aggregate;
mod context;
mod filtered_compile;
mod gen_file;
mod test_main;
mod tool;

pub use aggregate::*;
pub use context::*;
pub use filtered_compile::*;
pub use gen_file::*;
pub use test_main::*;
pub use tool::*;

use crate::fingerprint::Contribution;
use crate::model::{BuildTarget, RulePaths, SourcePath};
use crate::steps::Step;
use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::*;

/// The contract every kind of rule implements.
///
/// Describers must be pure: given the same arguments and context they return the same inputs,
/// fields, outputs and steps.
///
pub trait RuleDescriber: Debug + Send + Sync {
    /// A stable name for this kind of rule. It is part of the rule key.
    fn kind(&self) -> &str;

    /// Every source this rule reads.
    fn inputs(&self) -> Vec<SourcePath>;

    /// The declared fields that affect this rule's outputs.
    fn rule_key_fields(&self) -> Vec<Contribution>;

    /// The paths this rule claims as its outputs.
    fn outputs(&self, target: &BuildTarget, paths: &RulePaths) -> Vec<PathBuf>;

    /// The ordered steps that build this rule from a clean output directory. Steps must record
    /// the artifacts they produce in `buildable`.
    fn build_steps(
        &self,
        ctx: &BuildContext,
        buildable: &mut BuildableContext,
    ) -> anyhow::Result<Vec<Step>>;
}

#[derive(Debug, Clone)]
pub enum RuleKind {
    GenFile(GenFile),
    FilteredCompile(FilteredCompile),
    TestMain(TestMain),
    Aggregate(Aggregate),
    Custom(Arc<dyn RuleDescriber>),
}

impl From<GenFile> for RuleKind {
    fn from(rule: GenFile) -> Self {
        Self::GenFile(rule)
    }
}

impl From<FilteredCompile> for RuleKind {
    fn from(rule: FilteredCompile) -> Self {
        Self::FilteredCompile(rule)
    }
}

impl From<TestMain> for RuleKind {
    fn from(rule: TestMain) -> Self {
        Self::TestMain(rule)
    }
}

impl From<Aggregate> for RuleKind {
    fn from(rule: Aggregate) -> Self {
        Self::Aggregate(rule)
    }
}

impl From<Arc<dyn RuleDescriber>> for RuleKind {
    fn from(rule: Arc<dyn RuleDescriber>) -> Self {
        Self::Custom(rule)
    }
}

#[derive(Debug, Clone)]
pub struct BuildRule {
    target: BuildTarget,
    deps: Vec<BuildTarget>,
    kind: RuleKind,
}

impl BuildRule {
    pub fn new<K: Into<RuleKind>>(target: BuildTarget, deps: Vec<BuildTarget>, kind: K) -> Self {
        Self {
            target,
            deps,
            kind: kind.into(),
        }
    }

    pub fn custom<D>(target: BuildTarget, deps: Vec<BuildTarget>, describer: D) -> Self
    where
        D: RuleDescriber + 'static,
    {
        Self::new(target, deps, RuleKind::Custom(Arc::new(describer)))
    }

    pub fn target(&self) -> &BuildTarget {
        &self.target
    }

    /// The dependencies of this rule, in the order they were declared.
    pub fn deps(&self) -> &[BuildTarget] {
        &self.deps
    }

    pub fn kind(&self) -> &RuleKind {
        &self.kind
    }

    fn describer(&self) -> &dyn RuleDescriber {
        match &self.kind {
            RuleKind::GenFile(rule) => rule,
            RuleKind::FilteredCompile(rule) => rule,
            RuleKind::TestMain(rule) => rule,
            RuleKind::Aggregate(rule) => rule,
            RuleKind::Custom(rule) => rule.as_ref(),
        }
    }

    pub fn kind_name(&self) -> &str {
        self.describer().kind()
    }

    pub fn inputs(&self) -> Vec<SourcePath> {
        self.describer().inputs()
    }

    pub fn rule_key_fields(&self) -> Vec<Contribution> {
        self.describer().rule_key_fields()
    }

    pub fn outputs(&self, paths: &RulePaths) -> Vec<PathBuf> {
        self.describer().outputs(&self.target, paths)
    }

    pub fn build_steps(
        &self,
        ctx: &BuildContext,
        buildable: &mut BuildableContext,
    ) -> Result<Vec<Step>, RuleError> {
        self.describer()
            .build_steps(ctx, buildable)
            .map_err(|err| RuleError::DescriberFailed {
                target: self.target.clone(),
                err,
            })
    }
}

#[derive(Error, Debug)]
pub enum RuleError {
    #[error("Attempted to build a rule while missing fields: {0:?}")]
    BuilderError(derive_builder::UninitializedFieldError),

    #[error("Invalid import path {0:?}: it must be a dot-separated list of names")]
    InvalidImportPath(String),

    #[error("Invalid source extension {0:?}: it must be a non-empty alphanumeric string")]
    InvalidExtension(String),

    #[error("Input {0} does not name a file")]
    InputWithoutFileName(SourcePath),

    #[error("Could not produce the build steps of {target}: {err}")]
    DescriberFailed {
        target: BuildTarget,
        #[source]
        err: anyhow::Error,
    },
}

impl From<derive_builder::UninitializedFieldError> for RuleError {
    fn from(err: derive_builder::UninitializedFieldError) -> Self {
        Self::BuilderError(err)
    }
}

pub(crate) fn validate_extension(extension: &str) -> Result<(), RuleError> {
    if extension.is_empty() || !extension.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(RuleError::InvalidExtension(extension.to_string()));
    }
    Ok(())
}
