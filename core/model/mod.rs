//! # Build identities and output locations
//!
//! Everything in here is immutable once created, and cheap to clone and compare.
//!
mod build_target;
mod output_paths;
mod rule_key;
mod source_path;

pub use build_target::*;
pub use output_paths::*;
pub use rule_key::*;
pub use source_path::*;

use serde::{Deserialize, Serialize};

/// Whether a rule's outputs were produced by running its steps in this build (`Fresh`) or
/// materialized from the artifact cache (`Cached`).
///
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CacheStatus {
    #[default]
    Fresh,
    Cached,
}
