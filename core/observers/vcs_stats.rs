use super::BuildObserver;
use crate::events::event::VcsEvent;
use crate::events::EventChannel;
use crate::report::BuildReport;
use crate::sync::Arc;
use crate::Config;
use async_trait::async_trait;
use std::collections::BTreeSet;
use thiserror::*;
use tracing::*;

/// A snapshot of the working copy a build ran in, relative to the mainline.
///
#[derive(Builder, Default, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[builder(build_fn(error = "VcsError"))]
pub struct VersionControlStats {
    #[builder(default)]
    paths_changed: BTreeSet<String>,

    #[builder(setter(into))]
    current_revision_id: String,

    /// The mainline revision the current revision branched from, which is not necessarily the
    /// latest mainline revision.
    #[builder(setter(into))]
    branched_from_master_revision_id: String,

    branched_from_master_ts_millis: i64,

    #[builder(default)]
    base_bookmarks: BTreeSet<String>,
}

impl VersionControlStats {
    pub fn builder() -> VersionControlStatsBuilder {
        VersionControlStatsBuilder::default()
    }

    pub fn paths_changed(&self) -> &BTreeSet<String> {
        &self.paths_changed
    }

    pub fn current_revision_id(&self) -> &str {
        &self.current_revision_id
    }

    pub fn branched_from_master_revision_id(&self) -> &str {
        &self.branched_from_master_revision_id
    }

    pub fn branched_from_master_ts_millis(&self) -> i64 {
        self.branched_from_master_ts_millis
    }

    pub fn base_bookmarks(&self) -> &BTreeSet<String> {
        &self.base_bookmarks
    }
}

/// The queries the stats generator needs from a version control system.
///
#[async_trait]
pub trait VersionControlCli: Send + Sync {
    async fn is_supported(&self) -> bool;

    async fn changed_files(&self, from_dir: &str) -> Result<BTreeSet<String>, VcsError>;

    async fn current_revision_id(&self) -> Result<String, VcsError>;

    async fn revision_id(&self, name: &str) -> Result<String, VcsError>;

    async fn common_ancestor(&self, a: &str, b: &str) -> Result<String, VcsError>;

    /// The `tracked` bookmarks that sit between `start` and `end`.
    async fn tracked_bookmarks_off_revision_id(
        &self,
        start: &str,
        end: &str,
        tracked: &BTreeSet<String>,
    ) -> Result<BTreeSet<String>, VcsError>;

    async fn timestamp_seconds(&self, revision_id: &str) -> Result<i64, VcsError>;
}

pub trait VersionControlCliFactory: Send + Sync {
    fn create_cli(&self) -> Box<dyn VersionControlCli>;
}

/// Computes `VersionControlStats` for the workspace once a build has finished, and posts them
/// to the event channel.
///
pub struct VersionControlStatsGenerator {
    factory: Arc<dyn VersionControlCliFactory>,
    event_channel: Arc<EventChannel>,
    tracked_bookmarks: BTreeSet<String>,
    mainline_revision: String,
}

impl VersionControlStatsGenerator {
    pub fn new(config: &Config, factory: Arc<dyn VersionControlCliFactory>) -> Self {
        Self {
            factory,
            event_channel: config.event_channel(),
            tracked_bookmarks: config.tracked_bookmarks().clone(),
            mainline_revision: config.mainline_revision().to_string(),
        }
    }

    /// Returns `None` when the workspace is not in a supported repository.
    #[tracing::instrument(name = "VersionControlStatsGenerator::generate_stats", skip(self))]
    pub async fn generate_stats(&self) -> Result<Option<VersionControlStats>, VcsError> {
        info!("Starting generation of version control stats");
        let cli = self.factory.create_cli();

        if !cli.is_supported().await {
            warn!("Skipping generation of version control stats as unsupported repository type");
            return Ok(None);
        }

        let paths_changed = cli.changed_files(".").await?;
        let current_revision_id = cli.current_revision_id().await?;
        let latest_master_revision_id = cli.revision_id(&self.mainline_revision).await?;

        let branched_from_master_revision_id = cli
            .common_ancestor(&current_revision_id, &latest_master_revision_id)
            .await?;

        let base_bookmarks = cli
            .tracked_bookmarks_off_revision_id(
                &latest_master_revision_id,
                &current_revision_id,
                &self.tracked_bookmarks,
            )
            .await?;

        let seconds = cli
            .timestamp_seconds(&branched_from_master_revision_id)
            .await?;
        let branched_from_master_ts_millis = seconds
            .checked_mul(1000)
            .ok_or(VcsError::TimestampOutOfRange(seconds))?;

        let stats = VersionControlStats::builder()
            .paths_changed(paths_changed)
            .current_revision_id(current_revision_id)
            .branched_from_master_revision_id(branched_from_master_revision_id)
            .branched_from_master_ts_millis(branched_from_master_ts_millis)
            .base_bookmarks(base_bookmarks)
            .build()?;

        info!("Version control stats generated successfully: {:?}", stats);
        self.event_channel
            .send(VcsEvent::StatsGenerated(stats.clone()));

        Ok(Some(stats))
    }
}

#[async_trait]
impl BuildObserver for VersionControlStatsGenerator {
    fn name(&self) -> &str {
        "version-control-stats"
    }

    async fn on_build_finished(&self, _report: Arc<BuildReport>) -> anyhow::Result<()> {
        self.generate_stats().await?;
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum VcsError {
    #[error("Version control command failed: {0}")]
    CommandFailed(anyhow::Error),

    #[error("Revision timestamp {0}s can not be expressed in milliseconds")]
    TimestampOutOfRange(i64),

    #[error("Attempted to build version control stats while missing fields: {0:?}")]
    BuilderError(derive_builder::UninitializedFieldError),
}

impl From<derive_builder::UninitializedFieldError> for VcsError {
    fn from(err: derive_builder::UninitializedFieldError) -> Self {
        Self::BuilderError(err)
    }
}

impl From<anyhow::Error> for VcsError {
    fn from(err: anyhow::Error) -> Self {
        Self::CommandFailed(err)
    }
}
