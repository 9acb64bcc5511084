mod context;

pub use context::*;

use super::{BuildFailure, Executor};
use crate::cache::ArtifactSet;
use crate::events::{CacheEvent, WorkerEvent};
use crate::model::{BuildTarget, RuleKey, RulePaths};
use crate::rules::{BuildContext, BuildRule, BuildableContext};
use crate::steps::{StepContext, StepRunner};
use crate::util::fs::{clean_dir, is_within};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::*;

/// Executes rules on this machine, with their outputs in the rule's `gen` directory.
///
pub struct LocalExecutor {
    ctx: LocalExecutorContext,
}

#[async_trait]
impl Executor for LocalExecutor {
    type Context = LocalExecutorContext;

    fn new(ctx: LocalExecutorContext) -> Self {
        Self { ctx }
    }

    #[tracing::instrument(name = "LocalExecutor::fetch", skip(self, rule), fields(target = %rule.target()))]
    async fn fetch(&mut self, rule: &BuildRule, key: RuleKey) -> bool {
        let target = rule.target();
        let paths = self.rule_paths(target);

        let artifacts = match self.ctx.artifact_cache.lookup(&key).await {
            Ok(Some(artifacts)) => artifacts,
            Ok(None) => {
                self.ctx.event_channel.send(WorkerEvent::CacheMiss {
                    target: target.clone(),
                    rule_key: key,
                });
                return false;
            }
            Err(err) => {
                warn!("Cache lookup for {} failed, building it instead: {}", target, err);
                self.ctx.event_channel.send(CacheEvent::LookupFailed {
                    rule_key: key,
                    error: err.to_string(),
                });
                self.ctx.event_channel.send(WorkerEvent::CacheMiss {
                    target: target.clone(),
                    rule_key: key,
                });
                return false;
            }
        };

        let materialized = async {
            clean_dir(paths.gen_dir()).await.map_err(|err| err.to_string())?;
            artifacts
                .materialize(paths.gen_dir())
                .await
                .map_err(|err| err.to_string())
        }
        .await;

        if let Err(err) = materialized {
            warn!("Could not materialize {} from the cache, building it instead: {}", target, err);
            self.ctx.event_channel.send(WorkerEvent::CacheMiss {
                target: target.clone(),
                rule_key: key,
            });
            return false;
        }

        if let Some(missing) = self.first_missing(rule.outputs(&paths)).await {
            warn!(
                "Cache entry for {} lacks the declared output {:?}, building it instead",
                target, missing
            );
            self.ctx.event_channel.send(WorkerEvent::CacheMiss {
                target: target.clone(),
                rule_key: key,
            });
            return false;
        }

        self.ctx.event_channel.send(WorkerEvent::CacheHit {
            target: target.clone(),
            rule_key: key,
        });
        true
    }

    #[tracing::instrument(name = "LocalExecutor::build", skip(self, rule), fields(target = %rule.target()))]
    async fn build(&mut self, rule: &BuildRule, key: RuleKey) -> Result<(), BuildFailure> {
        let target = rule.target();
        let paths = self.rule_paths(target);

        for dir in paths.writable_roots() {
            clean_dir(dir).await.map_err(|err| BuildFailure::Io {
                target: target.clone(),
                path: dir.to_path_buf(),
                err,
            })?;
        }

        let build_ctx = BuildContext::new(
            target.clone(),
            &self.ctx.workspace_root,
            self.ctx.graph.output_paths().clone(),
            self.dependency_outputs(rule),
        );
        let mut buildable = BuildableContext::new(paths.gen_dir());
        let steps = rule.build_steps(&build_ctx, &mut buildable)?;

        let step_ctx = StepContext::new(target.clone(), &self.ctx.workspace_root, &paths);
        StepRunner::run(&step_ctx, &steps, &self.ctx.event_channel).await?;

        self.validate_outputs(rule, &paths, buildable.recorded_artifacts())
            .await?;

        let mut cacheable = rule.outputs(&paths);
        cacheable.extend(buildable.recorded_artifacts().iter().cloned());
        cacheable.sort();
        cacheable.dedup();

        let artifacts = ArtifactSet::collect(paths.gen_dir(), &cacheable)
            .await
            .map_err(|err| BuildFailure::CollectArtifacts {
                target: target.clone(),
                err,
            })?;

        match self.ctx.artifact_cache.store(&key, &artifacts).await {
            Ok(()) => self.ctx.event_channel.send(CacheEvent::Stored {
                rule_key: key,
                file_count: artifacts.len(),
            }),
            Err(err) => {
                warn!("Could not store {} in the cache: {}", target, err);
                self.ctx.event_channel.send(CacheEvent::StoreFailed {
                    rule_key: key,
                    error: err.to_string(),
                });
            }
        }

        Ok(())
    }
}

impl LocalExecutor {
    fn rule_paths(&self, target: &BuildTarget) -> RulePaths {
        self.ctx.graph.output_paths().rule_paths(target)
    }

    /// The declared outputs of every dependency of `rule`.
    fn dependency_outputs(&self, rule: &BuildRule) -> BTreeMap<BuildTarget, Vec<PathBuf>> {
        rule.deps()
            .iter()
            .filter_map(|dep| self.ctx.graph.get(dep))
            .map(|dep| {
                let outputs = dep.outputs(&self.rule_paths(dep.target()));
                (dep.target().clone(), outputs)
            })
            .collect()
    }

    /// Declared outputs and recorded artifacts must all exist inside the rule's `gen`
    /// directory. Both end up in the cache entry.
    async fn validate_outputs(
        &self,
        rule: &BuildRule,
        paths: &RulePaths,
        recorded: &[PathBuf],
    ) -> Result<(), BuildFailure> {
        let target = rule.target();
        let declared = rule.outputs(paths);

        for artifact in declared.iter().chain(recorded) {
            if !is_within(artifact, paths.gen_dir()) {
                return Err(BuildFailure::ArtifactOutsideOutputDir {
                    target: target.clone(),
                    path: artifact.clone(),
                });
            }
        }

        let expected = declared.into_iter().chain(recorded.iter().cloned());
        if let Some(path) = self.first_missing(expected).await {
            return Err(BuildFailure::MissingOutput {
                target: target.clone(),
                path,
            });
        }

        Ok(())
    }

    async fn first_missing<I: IntoIterator<Item = PathBuf>>(&self, paths: I) -> Option<PathBuf> {
        for path in paths {
            if !exists(&path).await {
                return Some(path);
            }
        }
        None
    }
}

async fn exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{ArtifactCache, CacheError, InMemoryArtifactCache};
    use crate::events::{Event, EventChannel};
    use crate::fingerprint::Contribution;
    use crate::graph::RuleGraph;
    use crate::model::{OutputPaths, SourcePath};
    use crate::rules::RuleDescriber;
    use crate::steps::Step;
    use crate::sync::Arc;
    use assert_fs::prelude::*;

    #[derive(Debug)]
    struct Writes {
        file: &'static str,
        contents: &'static str,
        record: bool,
    }

    impl RuleDescriber for Writes {
        fn kind(&self) -> &str {
            "writes"
        }
        fn inputs(&self) -> Vec<SourcePath> {
            vec![]
        }
        fn rule_key_fields(&self) -> Vec<Contribution> {
            vec![Contribution::new("contents", self.contents)]
        }
        fn outputs(&self, _target: &BuildTarget, paths: &RulePaths) -> Vec<PathBuf> {
            vec![paths.gen_dir().join(self.file)]
        }
        fn build_steps(
            &self,
            ctx: &BuildContext,
            buildable: &mut BuildableContext,
        ) -> anyhow::Result<Vec<Step>> {
            let out = ctx.paths().gen_dir().join(self.file);
            if self.record {
                buildable.record_artifact(&out);
            }
            Ok(vec![Step::write_file(out, self.contents)])
        }
    }

    #[derive(Debug)]
    struct Unreachable;

    #[async_trait]
    impl ArtifactCache for Unreachable {
        async fn lookup(&self, _key: &RuleKey) -> Result<Option<ArtifactSet>, CacheError> {
            Err(anyhow::anyhow!("connection refused").into())
        }
        async fn store(&self, _key: &RuleKey, _artifacts: &ArtifactSet) -> Result<(), CacheError> {
            Err(anyhow::anyhow!("connection refused").into())
        }
    }

    fn setup(
        root: &Path,
        describer: Writes,
        cache: Arc<dyn ArtifactCache>,
    ) -> (LocalExecutor, BuildRule, Arc<EventChannel>) {
        let target: BuildTarget = "//pkg:out".parse().unwrap();
        let rule = BuildRule::custom(target, vec![], describer);
        let graph = RuleGraph::new(vec![rule.clone()], &OutputPaths::new(root.join("out"))).unwrap();
        let ec = Arc::new(EventChannel::new());
        let ctx = LocalExecutorContext::new(cache, ec.clone(), Arc::new(graph), root.to_path_buf());
        (LocalExecutor::new(ctx), rule, ec)
    }

    fn key() -> RuleKey {
        RuleKey::from_bytes([42; 32])
    }

    #[tokio::test]
    async fn builds_and_stores_recorded_artifacts() {
        let root = assert_fs::TempDir::new().unwrap();
        let cache = Arc::new(InMemoryArtifactCache::new());
        let (mut executor, rule, _ec) = setup(
            root.path(),
            Writes {
                file: "hello.txt",
                contents: "hello",
                record: true,
            },
            cache.clone(),
        );

        assert!(!executor.fetch(&rule, key()).await);
        executor.build(&rule, key()).await.unwrap();

        root.child("out/gen/pkg/out__/hello.txt").assert("hello");
        let stored = cache.lookup(&key()).await.unwrap().unwrap();
        assert_eq!(stored.get("hello.txt"), Some(&b"hello"[..]));
    }

    #[tokio::test]
    async fn hits_are_materialized_into_a_clean_gen_dir() {
        let root = assert_fs::TempDir::new().unwrap();
        root.child("out/gen/pkg/out__/stale.txt").write_str("stale").unwrap();
        let cache = Arc::new(InMemoryArtifactCache::new());
        let mut artifacts = ArtifactSet::new();
        artifacts.insert("hello.txt", "cached").unwrap();
        cache.store(&key(), &artifacts).await.unwrap();

        let (mut executor, rule, ec) = setup(
            root.path(),
            Writes {
                file: "hello.txt",
                contents: "hello",
                record: true,
            },
            cache,
        );

        assert!(executor.fetch(&rule, key()).await);
        root.child("out/gen/pkg/out__/hello.txt").assert("cached");
        assert!(!root.path().join("out/gen/pkg/out__/stale.txt").exists());
        assert!(ec
            .consumer()
            .drain()
            .iter()
            .any(|e| matches!(e, Event::WorkerEvent(WorkerEvent::CacheHit { .. }))));
    }

    #[tokio::test]
    async fn cache_failures_degrade_to_a_rebuild() {
        let root = assert_fs::TempDir::new().unwrap();
        let (mut executor, rule, ec) = setup(
            root.path(),
            Writes {
                file: "hello.txt",
                contents: "hello",
                record: true,
            },
            Arc::new(Unreachable),
        );

        assert!(!executor.fetch(&rule, key()).await);
        assert!(executor.build(&rule, key()).await.is_ok());
        root.child("out/gen/pkg/out__/hello.txt").assert("hello");

        let events = ec.consumer().drain();
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::CacheEvent(CacheEvent::LookupFailed { .. }))));
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::CacheEvent(CacheEvent::StoreFailed { .. }))));
    }

    #[tokio::test]
    async fn declared_outputs_must_exist() {
        let root = assert_fs::TempDir::new().unwrap();
        #[derive(Debug)]
        struct Lies;
        impl RuleDescriber for Lies {
            fn kind(&self) -> &str {
                "lies"
            }
            fn inputs(&self) -> Vec<SourcePath> {
                vec![]
            }
            fn rule_key_fields(&self) -> Vec<Contribution> {
                vec![]
            }
            fn outputs(&self, _target: &BuildTarget, paths: &RulePaths) -> Vec<PathBuf> {
                vec![paths.gen_dir().join("never-written")]
            }
            fn build_steps(
                &self,
                _ctx: &BuildContext,
                _buildable: &mut BuildableContext,
            ) -> anyhow::Result<Vec<Step>> {
                Ok(vec![])
            }
        }

        let target: BuildTarget = "//pkg:lies".parse().unwrap();
        let rule = BuildRule::custom(target, vec![], Lies);
        let graph =
            RuleGraph::new(vec![rule.clone()], &OutputPaths::new(root.path().join("out"))).unwrap();
        let cache = Arc::new(InMemoryArtifactCache::new());
        let ctx = LocalExecutorContext::new(
            cache.clone(),
            Arc::new(EventChannel::new()),
            Arc::new(graph),
            root.path().to_path_buf(),
        );
        let mut executor = LocalExecutor::new(ctx);

        assert_matches!(
            executor.build(&rule, key()).await,
            Err(BuildFailure::MissingOutput { .. })
        );
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn declared_outputs_survive_a_fetch_without_being_recorded() {
        let root = assert_fs::TempDir::new().unwrap();
        let cache = Arc::new(InMemoryArtifactCache::new());
        let (mut executor, rule, _ec) = setup(
            root.path(),
            Writes {
                file: "hello.txt",
                contents: "hello",
                record: false,
            },
            cache.clone(),
        );

        executor.build(&rule, key()).await.unwrap();
        let stored = cache.lookup(&key()).await.unwrap().unwrap();
        assert_eq!(stored.get("hello.txt"), Some(&b"hello"[..]));

        assert!(executor.fetch(&rule, key()).await);
        root.child("out/gen/pkg/out__/hello.txt").assert("hello");
    }

    #[tokio::test]
    async fn incomplete_entries_are_misses() {
        let root = assert_fs::TempDir::new().unwrap();
        let cache = Arc::new(InMemoryArtifactCache::new());
        let mut artifacts = ArtifactSet::new();
        artifacts.insert("unrelated.txt", "x").unwrap();
        cache.store(&key(), &artifacts).await.unwrap();

        let (mut executor, rule, ec) = setup(
            root.path(),
            Writes {
                file: "hello.txt",
                contents: "hello",
                record: true,
            },
            cache,
        );

        assert!(!executor.fetch(&rule, key()).await);
        assert!(ec
            .consumer()
            .drain()
            .iter()
            .any(|e| matches!(e, Event::WorkerEvent(WorkerEvent::CacheMiss { .. }))));
    }
}
