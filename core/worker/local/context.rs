use tracing::instrument;

use crate::cache::ArtifactCache;
use crate::config::Config;
use crate::events::EventChannel;
use crate::executor::local::LocalExecutorContext;
use crate::fingerprint::Fingerprinter;
use crate::graph::RuleGraph;
use crate::model::BuildTarget;
use crate::sync::Arc;
use crate::worker::{Context, Coordinator, TaskQueue, TaskResults};
use std::path::PathBuf;

/// A shared execution context for the workers of one build. This includes all of subsystems
/// that need to be available for workers to execute their work correctly:
/// * the Task Queue from which they pull rules to work on
/// * the Task Results where they record the state of each rule
/// * the Rule Graph where they can look up the rules they were handed
/// * a Coordinator that helps initialize the shutdown sequence
/// * an Event Channel where they can report events
///
#[derive(Clone)]
pub struct LocalSharedContext {
    pub(crate) artifact_cache: Arc<dyn ArtifactCache>,
    pub(crate) coordinator: Arc<Coordinator>,
    pub(crate) event_channel: Arc<EventChannel>,
    pub(crate) fingerprinter: Arc<Fingerprinter>,
    pub(crate) graph: Arc<RuleGraph>,
    pub(crate) task_queue: Arc<TaskQueue>,
    pub(crate) task_results: Arc<TaskResults>,
    pub(crate) workspace_root: PathBuf,
}

impl LocalSharedContext {
    #[instrument(name = "SharedContext::new", skip(config, graph, artifact_cache))]
    pub fn new(
        config: &Config,
        graph: Arc<RuleGraph>,
        artifact_cache: Arc<dyn ArtifactCache>,
        requested: &[BuildTarget],
    ) -> Self {
        let coordinator = Arc::new(Coordinator::new());
        let task_results = Arc::new(TaskResults::new());
        let event_channel = config.event_channel();

        let task_queue = Arc::new(TaskQueue::new(
            graph.clone(),
            requested,
            task_results.clone(),
            coordinator.clone(),
            event_channel.clone(),
        ));

        Self {
            artifact_cache,
            coordinator,
            event_channel,
            fingerprinter: Arc::new(Fingerprinter::new(config.workspace_root())),
            graph,
            task_queue,
            task_results,
            workspace_root: config.workspace_root().clone(),
        }
    }
}

impl Context for LocalSharedContext {
    fn results(&self) -> Arc<TaskResults> {
        self.task_results.clone()
    }
}

impl From<LocalSharedContext> for LocalExecutorContext {
    fn from(ctx: LocalSharedContext) -> Self {
        LocalExecutorContext::new(
            ctx.artifact_cache,
            ctx.event_channel,
            ctx.graph,
            ctx.workspace_root,
        )
    }
}

impl std::fmt::Debug for LocalSharedContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSharedContext")
            .field("graph", &self.graph.len())
            .field("remaining", &self.task_queue.remaining())
            .field("workspace_root", &self.workspace_root)
            .finish()
    }
}
