//! # Anvil Core
//!
//! The flow begins by creating a `Config` and a `RuleGraph`, and using them to build a new
//! `BuildEngine`. From there, the `BuildEngine` will orchestrate a `TaskQueue` and a `WorkerPool`
//! to fingerprint, fetch or build any number of `BuildTarget`s, and return a `BuildReport`.
//!
//! Every rule is keyed by a `RuleKey`: a digest over its declared fields, the contents of its
//! inputs and the keys of its dependencies. Rules whose key is already present in the
//! `ArtifactCache` are materialized from it instead of being rebuilt.
//!

pub mod cache;
pub(crate) mod config;
pub(crate) mod drive;
pub mod events;
pub(crate) mod executor;
pub mod fingerprint;
pub mod graph;
pub mod model;
pub mod observers;
pub(crate) mod report;
pub mod rules;
pub mod steps;
pub(crate) mod sync;
pub(crate) mod util;
pub(crate) mod worker;

pub use config::*;
pub use drive::*;
pub use executor::BuildFailure;
pub use model::{BuildTarget, CacheStatus, RuleKey, SourcePath};
pub use report::*;
pub use worker::RuleState;

#[macro_use]
extern crate derive_builder;

#[cfg(test)]
#[macro_use]
extern crate assert_matches;

#[cfg(test)]
extern crate quickcheck;
#[cfg(test)]
#[macro_use(quickcheck)]
extern crate quickcheck_macros;
