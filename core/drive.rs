use super::*;
use crate::cache::{ArtifactCache, DirArtifactCache, NoopArtifactCache};
use crate::events::event::WorkflowEvent;
use crate::executor::local::LocalExecutor;
use crate::graph::RuleGraph;
use crate::model::BuildTarget;
use crate::observers::BuildObserver;
use crate::sync::Arc;
use crate::worker::local::{LocalSharedContext, LocalWorker};
use crate::worker::{WorkerPool, WorkerPoolError};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use thiserror::*;
use tokio::task::JoinHandle;
use tracing::{instrument, *};

type DefaultWorker = LocalWorker<LocalExecutor>;

/// # The Build Engine
///
/// This struct orchestrates the top-level flow of Anvil.
///
/// Every call to `build` gets a fresh set of shared state for the `WorkerPool`: a `TaskQueue`
/// seeded with the transitive closure of the requested targets, and the `TaskResults` the
/// workers record into. The rule graph, the artifact cache and the observers are shared across
/// builds, so a second build of an unchanged graph is served from the cache.
///
pub struct BuildEngine {
    config: Config,
    graph: Arc<RuleGraph>,
    artifact_cache: Arc<dyn ArtifactCache>,
    worker_pool: WorkerPool<DefaultWorker>,
    observers: Vec<Arc<dyn BuildObserver>>,
    observer_tasks: Vec<JoinHandle<()>>,
}

impl BuildEngine {
    #[instrument(name = "BuildEngine::new", skip(config, graph, artifact_cache))]
    pub fn new(config: Config, graph: RuleGraph, artifact_cache: Arc<dyn ArtifactCache>) -> Self {
        let artifact_cache = if config.enable_artifact_cache() {
            artifact_cache
        } else {
            debug!("Artifact cache is disabled");
            Arc::new(NoopArtifactCache)
        };

        let worker_pool = WorkerPool::new(&config);

        Self {
            config,
            graph: Arc::new(graph),
            artifact_cache,
            worker_pool,
            observers: vec![],
            observer_tasks: vec![],
        }
    }

    /// An engine backed by a local artifact cache at `Config.artifact_cache_root`.
    pub fn with_local_cache(config: Config, graph: RuleGraph) -> Self {
        let cache = Arc::new(DirArtifactCache::new(config.artifact_cache_root().clone()));
        Self::new(config, graph, cache)
    }

    pub fn with_observer<O: BuildObserver + 'static>(mut self, observer: O) -> Self {
        self.observers.push(Arc::new(observer));
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn graph(&self) -> &RuleGraph {
        &self.graph
    }

    /// Build the `targets` and all of their transitive dependencies.
    ///
    /// Rule failures do not make this fail: they are recorded in the `BuildReport`, and every
    /// rule that does not depend on a failed rule still gets built.
    ///
    #[instrument(name = "BuildEngine::build", skip(self))]
    pub async fn build(&mut self, targets: &[BuildTarget]) -> Result<BuildReport, EngineError> {
        if let Some(unknown) = targets.iter().find(|target| !self.graph.contains(target)) {
            return Err(EngineError::UnknownTarget(unknown.clone()));
        }

        let event_channel = self.config.event_channel();
        event_channel.send(WorkflowEvent::build_started());
        let started_at = Instant::now();

        let shared_ctx = LocalSharedContext::new(
            &self.config,
            self.graph.clone(),
            self.artifact_cache.clone(),
            targets,
        );

        let results = match self.worker_pool.execute(shared_ctx).await {
            Ok(results) => results,
            Err(err) => {
                event_channel.send(WorkflowEvent::build_completed(false));
                return Err(err.into());
            }
        };

        let report = BuildReport::new(targets.to_vec(), results.snapshot(), started_at.elapsed());
        event_channel.send(WorkflowEvent::build_completed(report.is_success()));

        info!(
            "Finished {} rules in {:?} ({} built, {} cached, {} failed)",
            results.len(),
            report.elapsed(),
            report.count(CacheStatus::Fresh),
            report.count(CacheStatus::Cached),
            report.failures().count()
        );

        self.notify_observers(&report);

        Ok(report)
    }

    /// Wait until every observer spawned so far is done.
    pub async fn wait_for_observers(&mut self) {
        for task in self.observer_tasks.drain(..) {
            if let Err(err) = task.await {
                warn!("Observer task did not finish: {}", err);
            }
        }
    }

    fn notify_observers(&mut self, report: &BuildReport) {
        if self.observers.is_empty() {
            return;
        }

        let report = Arc::new(report.clone());
        for observer in &self.observers {
            let observer = observer.clone();
            let report = report.clone();
            self.observer_tasks.push(tokio::spawn(async move {
                let name = observer.name().to_string();
                match AssertUnwindSafe(observer.on_build_finished(report))
                    .catch_unwind()
                    .await
                {
                    Ok(Ok(())) => debug!("Observer {} finished", name),
                    Ok(Err(err)) => warn!("Observer {} failed: {:?}", name, err),
                    Err(_) => warn!("Observer {} panicked", name),
                }
            }));
        }
    }
}

impl std::fmt::Debug for BuildEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildEngine")
            .field("config", &self.config)
            .field("rules", &self.graph.len())
            .field("workers", &self.worker_pool.num_workers())
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{0} is not part of the rule graph")]
    UnknownTarget(BuildTarget),

    #[error(transparent)]
    WorkerPoolError(WorkerPoolError),
}

impl From<WorkerPoolError> for EngineError {
    fn from(err: WorkerPoolError) -> Self {
        Self::WorkerPoolError(err)
    }
}
