use crate::events::event::WorkerEvent;
use crate::executor::{BuildFailure, Executor};
use crate::model::{BuildTarget, CacheStatus, RuleKey};
use crate::rules::BuildRule;
use crate::sync::Arc;
use crate::worker::{RuleState, Worker, WorkerError};
use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use tracing::*;

use super::LocalSharedContext;

/// A Local build execution worker.
///
/// The `LocalWorker` takes one rule at a time out of the `TaskQueue` that lives in the
/// `LocalSharedContext`, and drives it to a terminal state:
///
/// ```text
/// next rule -> compute rule key -> fetch from cache --hit--> Fetched
///                                                   --miss-> build -> Built
/// ```
///
/// Any failure along the way (including a panic) is recorded as that rule's failure, and the
/// queue takes care of skipping everything that depends on it. The worker stops once the queue
/// has nothing left to hand out.
///
pub struct LocalWorker<E: Executor> {
    id: usize,
    ctx: LocalSharedContext,
    executor: E,
}

#[async_trait(?Send)]
impl<E, ECtx> Worker for LocalWorker<E>
where
    E: Executor<Context = ECtx>,
    ECtx: From<LocalSharedContext> + Sync + Send + Clone + Sized,
{
    type Context = LocalSharedContext;

    fn new(id: usize, ctx: Self::Context) -> Result<Self, WorkerError> {
        let executor = E::new(ctx.clone().into());
        Ok(Self { id, ctx, executor })
    }

    async fn run(&mut self) -> Result<(), WorkerError> {
        while let Some(target) = self.ctx.task_queue.next().await {
            match self.handle(&target).await {
                Ok(success) => self.ctx.task_queue.complete(&target, success),
                Err(err) => {
                    error!("Worker {} could not handle {}: {}", self.id, target, err);
                    self.ctx.task_queue.abort();
                    return Err(err);
                }
            }
        }
        debug!("Worker {} is done", self.id);
        Ok(())
    }
}

impl<E: Executor> LocalWorker<E> {
    /// Drive `target` to a terminal state, and return whether it succeeded.
    #[tracing::instrument(name = "LocalWorker::handle", skip(self))]
    pub async fn handle(&mut self, target: &BuildTarget) -> Result<bool, WorkerError> {
        self.ctx.event_channel.send(WorkerEvent::RuleStarted {
            target: target.clone(),
        });

        let graph = self.ctx.graph.clone();
        let rule = graph
            .get(target)
            .ok_or_else(|| WorkerError::UnknownTarget(target.clone()))?;

        let outcome = match AssertUnwindSafe(self.build_rule(rule)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => Err(BuildFailure::Panicked {
                target: target.clone(),
                message: panic_message(&*panic),
            }),
        };

        match outcome {
            Ok((rule_key, cache_status)) => {
                self.ctx.event_channel.send(WorkerEvent::RuleCompleted {
                    target: target.clone(),
                    rule_key,
                    cache_status,
                });
                Ok(true)
            }
            Err(BuildFailure::InvalidState(err)) => Err(err.into()),
            Err(failure) => {
                warn!("{} failed: {}", target, failure);
                self.ctx.event_channel.send(WorkerEvent::RuleFailed {
                    target: target.clone(),
                    error: failure.to_string(),
                });
                self.ctx
                    .task_results
                    .transition(target, RuleState::Failed(Arc::new(failure)))?;
                Ok(false)
            }
        }
    }

    async fn build_rule(
        &mut self,
        rule: &BuildRule,
    ) -> Result<(RuleKey, CacheStatus), BuildFailure> {
        let target = rule.target();

        // NOTE: every dependency is Fetched or Built by now, so each of them has a key. If one
        // does not, the fingerprinter will refuse to compute a key.
        let dep_keys: Vec<RuleKey> = rule
            .deps()
            .iter()
            .filter_map(|dep| self.ctx.task_results.rule_key(dep))
            .collect();

        let rule_key = self
            .ctx
            .fingerprinter
            .compute_rule_key(rule, &dep_keys)
            .await?;
        self.ctx.event_channel.send(WorkerEvent::RuleKeyComputed {
            target: target.clone(),
            rule_key,
        });
        self.ctx
            .task_results
            .transition(target, RuleState::KeyComputed(rule_key))?;

        if self.executor.fetch(rule, rule_key).await {
            self.ctx
                .task_results
                .transition(target, RuleState::Fetched(rule_key))?;
            return Ok((rule_key, CacheStatus::Cached));
        }

        self.ctx
            .task_results
            .transition(target, RuleState::Building(rule_key))?;
        self.executor.build(rule, rule_key).await?;
        self.ctx
            .task_results
            .transition(target, RuleState::Built(rule_key))?;

        Ok((rule_key, CacheStatus::Fresh))
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
