//! # Rule keys
//!
//! A rule key is the SHA-256 of the canonical encoding of a list of named, typed contributions:
//!
//! * `target` and `kind`, identifying the rule,
//! * one `arg:<name>` entry per field the rule declares,
//! * `inputs`, the content hash of every source the rule reads (sorted by path), and
//! * `deps`, the rule key of every dependency in declared order.
//!
//! Contributions are sorted by name before hashing, so the order in which a rule lists its
//! fields never matters. The encoding starts with [RULE_KEY_VERSION], and any change to how keys
//! are computed must bump it.
//!
mod field_value;
mod file_hasher;

pub use field_value::*;
pub use file_hasher::*;

use crate::model::{BuildTarget, RuleKey, SourcePath};
use crate::rules::BuildRule;
use field_value::write_bytes;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use thiserror::*;
use tracing::*;

pub const RULE_KEY_VERSION: &str = "anvil-rulekey-v1";

/// Hash a list of contributions into a [RuleKey].
///
/// Contributions are stable-sorted by name, so two contributions sharing a name keep the order
/// they were given in.
///
pub fn hash_contributions(contributions: &[Contribution]) -> RuleKey {
    let mut sorted: Vec<&Contribution> = contributions.iter().collect();
    sorted.sort_by(|a, b| a.name().cmp(b.name()));

    let mut hasher = Sha256::new();
    let mut header = vec![];
    write_bytes(&mut header, RULE_KEY_VERSION.as_bytes());
    field_value::write_len(&mut header, sorted.len());
    hasher.update(&header);

    let mut buffer = vec![];
    for contribution in sorted {
        buffer.clear();
        write_bytes(&mut buffer, contribution.name().as_bytes());
        contribution.value().encode_into(&mut buffer);
        hasher.update(&buffer);
    }

    RuleKey::from_bytes(hasher.finalize().into())
}

/// Computes rule keys for the rules of a single build.
///
#[derive(Debug)]
pub struct Fingerprinter {
    workspace_root: PathBuf,
    hasher: FileHasher,
}

impl Fingerprinter {
    pub fn new<P: Into<PathBuf>>(workspace_root: P) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            hasher: FileHasher::new(),
        }
    }

    /// Compute the key of `rule`, given the keys of its dependencies in the order `rule`
    /// declares them.
    #[tracing::instrument(name = "Fingerprinter::compute_rule_key", skip(self, rule, dep_keys), fields(target = %rule.target()))]
    pub async fn compute_rule_key(
        &self,
        rule: &BuildRule,
        dep_keys: &[RuleKey],
    ) -> Result<RuleKey, RuleKeyError> {
        let contributions = self.contributions(rule, dep_keys).await?;
        let key = hash_contributions(&contributions);
        debug!("{} has rule key {}", rule.target(), key);
        Ok(key)
    }

    /// Every contribution that goes into the key of `rule`.
    pub async fn contributions(
        &self,
        rule: &BuildRule,
        dep_keys: &[RuleKey],
    ) -> Result<Vec<Contribution>, RuleKeyError> {
        let target = rule.target();
        if rule.deps().len() != dep_keys.len() {
            return Err(RuleKeyError::MissingDependencyKeys {
                target: target.clone(),
                expected: rule.deps().len(),
                given: dep_keys.len(),
            });
        }

        let mut contributions = vec![
            Contribution::new("target", target.to_string()),
            Contribution::new("kind", rule.kind_name()),
        ];

        for field in rule.rule_key_fields() {
            contributions.push(Contribution::new(
                format!("arg:{}", field.name()),
                field.value().clone(),
            ));
        }

        let mut inputs = rule.inputs();
        inputs.sort();
        inputs.dedup();
        let mut hashed_inputs = Vec::with_capacity(inputs.len());
        for input in &inputs {
            hashed_inputs.push(self.input_value(rule, dep_keys, input).await?);
        }
        contributions.push(Contribution::new("inputs", FieldValue::List(hashed_inputs)));

        let deps = rule
            .deps()
            .iter()
            .zip(dep_keys)
            .map(|(dep, key)| {
                FieldValue::List(vec![dep.to_string().into(), FieldValue::RuleKey(*key)])
            })
            .collect();
        contributions.push(Contribution::new("deps", FieldValue::List(deps)));

        Ok(contributions)
    }

    async fn input_value(
        &self,
        rule: &BuildRule,
        dep_keys: &[RuleKey],
        input: &SourcePath,
    ) -> Result<FieldValue, RuleKeyError> {
        match input {
            SourcePath::Workspace(path) => {
                let absolute = self.workspace_root.join(path);
                let digest = self.hasher.hash(&absolute).await.map_err(|err| {
                    RuleKeyError::InputUnavailable {
                        target: rule.target().clone(),
                        path: absolute.clone(),
                        err,
                    }
                })?;
                Ok(FieldValue::FileHash {
                    path: path.clone(),
                    digest,
                })
            }
            // NOTE: outputs of other rules are keyed by the rule that produced them, since that
            // key already covers everything their contents depend on.
            SourcePath::BuildTargetOutput { target, path } => {
                let position = rule
                    .deps()
                    .iter()
                    .position(|dep| dep == target)
                    .ok_or_else(|| RuleKeyError::UndeclaredDependency {
                        target: rule.target().clone(),
                        dep: target.clone(),
                    })?;
                Ok(FieldValue::List(vec![
                    target.to_string().into(),
                    FieldValue::RuleKey(dep_keys[position]),
                    path.clone().into(),
                ]))
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum RuleKeyError {
    #[error("Input {path:?} of {target} is unavailable: {err}")]
    InputUnavailable {
        target: BuildTarget,
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },

    #[error("{target} declares {expected} dependencies but {given} dependency keys were provided")]
    MissingDependencyKeys {
        target: BuildTarget,
        expected: usize,
        given: usize,
    },

    #[error("{target} reads an output of {dep}, which is not one of its dependencies")]
    UndeclaredDependency { target: BuildTarget, dep: BuildTarget },
}
