use crate::events::EventChannel;
use crate::model::OutputPaths;
use crate::sync::Arc;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Instant;
use thiserror::*;

/// The bookmarks reported on by the version control stats observer unless configured otherwise.
pub const DEFAULT_TRACKED_BOOKMARKS: &[&str] = &["remote/master"];

/// A collection of flags and options that affect how Anvil runs. This is not specific to a
/// single build, and it is shared by every component of the engine.
///
#[derive(Builder, Debug, Clone)]
#[builder(build_fn(error = "ConfigError"))]
pub struct Config {
    /// The root of the workspace. Source paths are resolved relative to it.
    #[builder(setter(into), default = "self.default_workspace_root()")]
    workspace_root: PathBuf,

    /// The directory under which every rule gets its `gen` and `scratch` directories.
    #[builder(setter(into), default = "self.default_output_root()")]
    output_root: PathBuf,

    /// The location of the local artifact cache.
    #[builder(setter(into), default = "self.default_artifact_cache_root()")]
    artifact_cache_root: PathBuf,

    /// The maximum number of local workers to spawn in the local worker pool.
    #[builder(default = "self.default_max_workers()")]
    max_local_workers: usize,

    /// Whether rules may be fetched from (and stored into) the artifact cache.
    #[builder(default = "true")]
    enable_artifact_cache: bool,

    /// The bookmarks that version control stats are computed against.
    #[builder(default = "self.default_tracked_bookmarks()")]
    tracked_bookmarks: BTreeSet<String>,

    /// The revision name treated as the mainline when computing version control stats.
    #[builder(setter(into), default = "\"master\".to_string()")]
    mainline_revision: String,

    /// The time at which this configuration was created. We will use this to compute the total
    /// build time.
    #[builder(default = "self.default_created_at()")]
    created_at: Instant,

    /// The Event Channel be used across the application.
    /// NOTE(@ostera): this is safe to clone since it is really an [Arc] to a queue.
    #[builder(default = "self.default_event_channel()")]
    event_channel: Arc<EventChannel>,
}

impl Default for Config {
    fn default() -> Self {
        Self::builder().build().unwrap()
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    pub fn workspace_root(&self) -> &PathBuf {
        &self.workspace_root
    }

    pub fn output_root(&self) -> &PathBuf {
        &self.output_root
    }

    pub fn output_paths(&self) -> OutputPaths {
        OutputPaths::new(&self.output_root)
    }

    pub fn artifact_cache_root(&self) -> &PathBuf {
        &self.artifact_cache_root
    }

    pub fn max_local_workers(&self) -> usize {
        self.max_local_workers
    }

    pub fn enable_artifact_cache(&self) -> bool {
        self.enable_artifact_cache
    }

    pub fn tracked_bookmarks(&self) -> &BTreeSet<String> {
        &self.tracked_bookmarks
    }

    pub fn mainline_revision(&self) -> &str {
        &self.mainline_revision
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn event_channel(&self) -> Arc<EventChannel> {
        self.event_channel.clone()
    }
}

impl ConfigBuilder {
    fn _workspace_root(&self) -> PathBuf {
        self.workspace_root
            .clone()
            .unwrap_or_else(|| self.default_workspace_root())
    }

    fn _output_root(&self) -> PathBuf {
        self.output_root
            .clone()
            .unwrap_or_else(|| self.default_output_root())
    }

    fn default_workspace_root(&self) -> PathBuf {
        PathBuf::from(".")
    }

    fn default_output_root(&self) -> PathBuf {
        self._workspace_root().join("anvil-out")
    }

    fn default_artifact_cache_root(&self) -> PathBuf {
        self._output_root().join("cache")
    }

    fn default_max_workers(&self) -> usize {
        num_cpus::get()
    }

    fn default_tracked_bookmarks(&self) -> BTreeSet<String> {
        DEFAULT_TRACKED_BOOKMARKS
            .iter()
            .map(|b| b.to_string())
            .collect()
    }

    fn default_created_at(&self) -> Instant {
        Instant::now()
    }

    fn default_event_channel(&self) -> Arc<EventChannel> {
        EventChannel::new().into()
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Attempted to build a Config struct while missing fields: {0:?}")]
    BuilderError(derive_builder::UninitializedFieldError),
}

impl From<derive_builder::UninitializedFieldError> for ConfigError {
    fn from(err: derive_builder::UninitializedFieldError) -> Self {
        Self::BuilderError(err)
    }
}
