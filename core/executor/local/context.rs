use crate::cache::ArtifactCache;
use crate::events::EventChannel;
use crate::graph::RuleGraph;
use crate::sync::Arc;
use std::path::PathBuf;

#[derive(Clone)]
pub struct LocalExecutorContext {
    pub(crate) artifact_cache: Arc<dyn ArtifactCache>,
    pub(crate) event_channel: Arc<EventChannel>,
    pub(crate) graph: Arc<RuleGraph>,
    pub(crate) workspace_root: PathBuf,
}

impl LocalExecutorContext {
    pub fn new(
        artifact_cache: Arc<dyn ArtifactCache>,
        event_channel: Arc<EventChannel>,
        graph: Arc<RuleGraph>,
        workspace_root: PathBuf,
    ) -> Self {
        Self {
            artifact_cache,
            event_channel,
            graph,
            workspace_root,
        }
    }
}

impl std::fmt::Debug for LocalExecutorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalExecutorContext")
            .field("graph", &self.graph.len())
            .field("workspace_root", &self.workspace_root)
            .finish()
    }
}
