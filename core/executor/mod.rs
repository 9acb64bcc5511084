//! # Rule Execution
//!
//! An `Executor` takes a rule whose key is known and makes its outputs available, either by
//! materializing them from the artifact cache or by running the rule's steps.
//!
mod error;
pub mod local;

pub use error::*;

use crate::model::RuleKey;
use crate::rules::BuildRule;
use async_trait::async_trait;

#[async_trait]
pub trait Executor {
    type Context: Sync + Send + Clone + Sized;

    fn new(ctx: Self::Context) -> Self
    where
        Self: Sized;

    /// Try to materialize the outputs of `rule` from the cache. Returns `true` on a hit.
    ///
    /// Cache failures are never fatal: they count as a miss.
    async fn fetch(&mut self, rule: &BuildRule, key: RuleKey) -> bool;

    /// Build `rule` from a clean output directory, and store its artifacts under `key`.
    async fn build(&mut self, rule: &BuildRule, key: RuleKey) -> Result<(), BuildFailure>;
}
