//! # Build Observers
//!
//! Observers run after a build has finished, each on its own task. They only get to look at the
//! `BuildReport`: whatever they do (or fail to do) never changes the outcome of the build.
//!
mod vcs_stats;

pub use vcs_stats::*;

use crate::report::BuildReport;
use crate::sync::Arc;
use async_trait::async_trait;

#[async_trait]
pub trait BuildObserver: Send + Sync {
    /// A short name to tell observers apart in logs.
    fn name(&self) -> &str;

    async fn on_build_finished(&self, report: Arc<BuildReport>) -> anyhow::Result<()>;
}
