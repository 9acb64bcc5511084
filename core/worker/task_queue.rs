use super::*;
use crate::events::event::QueueEvent;
use crate::events::EventChannel;
use crate::graph::RuleGraph;
use crate::model::BuildTarget;
use crate::sync::atomic::{AtomicUsize, Ordering};
use crate::sync::{Arc, Mutex};
use crossbeam::deque::{Injector, Steal};
use dashmap::{DashMap, DashSet};
use fxhash::FxHashSet;
use std::collections::VecDeque;
use tokio::sync::Notify;
use tracing::{instrument, *};

/// A thread-safe queue of rules that are ready to run, to be consumed by workers.
///
/// The queue is built once per build from the transitive closure of the requested targets. A
/// rule is only pushed onto the ready queue once all of its dependencies completed
/// successfully, and every rule is handed out at most once. When a rule fails, everything that
/// depends on it is marked as skipped instead.
///
#[derive(Debug)]
pub struct TaskQueue {
    graph: Arc<RuleGraph>,

    /// Every target in this build, with the number of its dependencies that are yet to finish.
    pending_deps: DashMap<BuildTarget, usize>,

    /// The queue from which workers pull work.
    ready_queue: Injector<BuildTarget>,

    /// Targets that were already given to a worker.
    handed_out: DashSet<BuildTarget>,

    /// Targets that have not reached a terminal state yet.
    remaining: AtomicUsize,

    wakeup: Notify,

    task_results: Arc<TaskResults>,
    coordinator: Arc<Coordinator>,
    event_channel: Arc<EventChannel>,

    // NOTE: only used to serialize the calls to `try_next` and prevent handing out the same
    // target twice.
    _queue_lock: Mutex<()>,
}

impl TaskQueue {
    #[instrument(name = "TaskQueue::new", skip(graph, task_results, coordinator, event_channel))]
    pub fn new(
        graph: Arc<RuleGraph>,
        requested: &[BuildTarget],
        task_results: Arc<TaskResults>,
        coordinator: Arc<Coordinator>,
        event_channel: Arc<EventChannel>,
    ) -> TaskQueue {
        let closure = graph.transitive_closure(requested);
        let pending_deps = DashMap::with_capacity(closure.len());
        let ready_queue = Injector::new();

        for target in graph
            .all_targets_in_topological_order()
            .iter()
            .filter(|target| closure.contains(*target))
        {
            task_results.add_expected_target(target.clone());
            let deps = graph.dependencies_of(target).map_or(0, |deps| deps.len());
            pending_deps.insert(target.clone(), deps);
            if deps == 0 {
                ready_queue.push(target.clone());
                event_channel.send(QueueEvent::RuleQueued {
                    target: target.clone(),
                });
            }
        }

        debug!("Queued {} rules", closure.len());

        TaskQueue {
            remaining: AtomicUsize::new(closure.len()),
            graph,
            pending_deps,
            ready_queue,
            handed_out: DashSet::new(),
            wakeup: Notify::new(),
            task_results,
            coordinator,
            event_channel,
            _queue_lock: Mutex::new(()),
        }
    }

    /// The number of targets that have not finished yet.
    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::SeqCst)
    }

    /// Whether workers should stop asking for work.
    pub fn is_finished(&self) -> bool {
        self.remaining() == 0 || self.coordinator.should_shutdown()
    }

    /// Take the next ready target, if any, without waiting.
    #[instrument(name = "TaskQueue::try_next", skip(self))]
    pub fn try_next(&self) -> Option<BuildTarget> {
        let _lock = match self._queue_lock.lock() {
            Ok(lock) => lock,
            Err(poisoned) => poisoned.into_inner(),
        };
        loop {
            match self.ready_queue.steal() {
                Steal::Success(target) => {
                    if !self.handed_out.insert(target.clone()) {
                        continue;
                    }
                    debug!("Handing out {}", target);
                    return Some(target);
                }
                Steal::Retry => continue,
                Steal::Empty => return None,
            }
        }
    }

    /// Wait for the next ready target. Returns `None` once every target reached a terminal
    /// state, or when the build was aborted.
    pub async fn next(&self) -> Option<BuildTarget> {
        loop {
            let notified = self.wakeup.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_finished() {
                return None;
            }

            if let Some(target) = self.try_next() {
                return Some(target);
            }

            notified.await;
        }
    }

    /// Record that `target` reached a terminal state.
    ///
    /// On success, the dependents whose dependencies are now all complete are queued. On
    /// failure, every transitive dependent still pending is marked as skipped.
    ///
    #[instrument(name = "TaskQueue::complete", skip(self))]
    pub fn complete(&self, target: &BuildTarget, success: bool) {
        if success {
            self.queue_ready_dependents(target);
        } else {
            self.skip_dependents(target);
        }
        self.remaining.fetch_sub(1, Ordering::SeqCst);
        self.wakeup.notify_waiters();
    }

    /// Stop handing out work. Rules that are already running will still finish.
    pub fn abort(&self) {
        warn!("Aborting build");
        self.coordinator.signal_shutdown();
        self.wakeup.notify_waiters();
    }

    fn queue_ready_dependents(&self, target: &BuildTarget) {
        for dependent in self.graph.dependents_of(target) {
            let ready = match self.pending_deps.get_mut(dependent) {
                Some(mut count) => {
                    *count = count.saturating_sub(1);
                    *count == 0
                }
                None => continue,
            };

            if ready && self.task_results.is_pending(dependent) {
                self.ready_queue.push(dependent.clone());
                self.event_channel.send(QueueEvent::RuleQueued {
                    target: dependent.clone(),
                });
            }
        }
    }

    fn skip_dependents(&self, failed: &BuildTarget) {
        let mut seen = FxHashSet::default();
        let mut pending: VecDeque<&BuildTarget> =
            self.graph.dependents_of(failed).iter().collect();

        while let Some(target) = pending.pop_front() {
            if !self.pending_deps.contains_key(target) || !seen.insert(target) {
                continue;
            }

            let skipped = RuleState::DependencyFailed {
                dep: failed.clone(),
            };
            // NOTE: a rule can sit below more than one failure. Only the first one to get
            // here gets to skip it.
            if self.task_results.transition(target, skipped).is_ok() {
                debug!("Skipping {} because {} failed", target, failed);
                self.event_channel.send(QueueEvent::RuleSkipped {
                    target: target.clone(),
                    failed_dependency: failed.clone(),
                });
                self.remaining.fetch_sub(1, Ordering::SeqCst);
            }

            pending.extend(self.graph.dependents_of(target));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Event;
    use crate::model::OutputPaths;
    use crate::rules::{Aggregate, BuildRule};

    fn t(s: &str) -> BuildTarget {
        s.parse().unwrap()
    }

    fn rule(target: &str, deps: &[&str]) -> BuildRule {
        BuildRule::new(t(target), deps.iter().map(|d| t(d)).collect(), Aggregate)
    }

    /// ```text
    /// //app:bin -> //lib:a -> //lib:c
    ///           -> //lib:b -> //lib:c
    /// //other:x
    /// ```
    fn diamond() -> Arc<RuleGraph> {
        let graph = RuleGraph::new(
            vec![
                rule("//app:bin", &["//lib:a", "//lib:b"]),
                rule("//lib:a", &["//lib:c"]),
                rule("//lib:b", &["//lib:c"]),
                rule("//lib:c", &[]),
                rule("//other:x", &[]),
            ],
            &OutputPaths::new("/out"),
        )
        .unwrap();
        Arc::new(graph)
    }

    fn queue(graph: Arc<RuleGraph>, requested: &[&str]) -> (TaskQueue, Arc<TaskResults>) {
        let results = Arc::new(TaskResults::new());
        let requested: Vec<BuildTarget> = requested.iter().map(|r| t(r)).collect();
        let q = TaskQueue::new(
            graph,
            &requested,
            results.clone(),
            Arc::new(Coordinator::new()),
            Arc::new(EventChannel::new()),
        );
        (q, results)
    }

    #[test]
    fn only_the_requested_closure_is_queued() {
        let (q, results) = queue(diamond(), &["//lib:a"]);
        assert_eq!(q.remaining(), 2);
        assert_eq!(results.len(), 2);
        assert!(results.get(&t("//other:x")).is_none());
        assert_eq!(q.try_next(), Some(t("//lib:c")));
        assert_eq!(q.try_next(), None);
    }

    #[test]
    fn dependents_wait_for_all_their_dependencies() {
        let (q, _results) = queue(diamond(), &["//app:bin"]);

        assert_eq!(q.try_next(), Some(t("//lib:c")));
        assert_eq!(q.try_next(), None);

        q.complete(&t("//lib:c"), true);
        let mut next = vec![q.try_next().unwrap(), q.try_next().unwrap()];
        next.sort();
        assert_eq!(next, vec![t("//lib:a"), t("//lib:b")]);

        q.complete(&t("//lib:a"), true);
        assert_eq!(q.try_next(), None);

        q.complete(&t("//lib:b"), true);
        assert_eq!(q.try_next(), Some(t("//app:bin")));

        q.complete(&t("//app:bin"), true);
        assert!(q.is_finished());
    }

    #[test]
    fn failures_skip_every_transitive_dependent() {
        let (q, results) = queue(diamond(), &["//app:bin", "//other:x"]);
        let mut first = vec![q.try_next().unwrap(), q.try_next().unwrap()];
        first.sort();
        assert_eq!(first, vec![t("//lib:c"), t("//other:x")]);

        q.complete(&t("//lib:c"), false);

        for skipped in ["//lib:a", "//lib:b", "//app:bin"] {
            assert_matches!(
                results.get(&t(skipped)),
                Some(RuleState::DependencyFailed { dep }) if dep == t("//lib:c")
            );
        }
        assert_eq!(q.try_next(), None);

        // The unrelated target is unaffected.
        assert_matches!(results.get(&t("//other:x")), Some(RuleState::Pending));
        assert_eq!(q.remaining(), 1);
        q.complete(&t("//other:x"), true);
        assert!(q.is_finished());
    }

    #[test]
    fn skipping_announces_the_failed_dependency() {
        let graph = diamond();
        let results = Arc::new(TaskResults::new());
        let ec = Arc::new(EventChannel::new());
        let consumer = ec.consumer();
        let q = TaskQueue::new(
            graph,
            &[t("//lib:a")],
            results,
            Arc::new(Coordinator::new()),
            ec,
        );
        q.try_next();
        q.complete(&t("//lib:c"), false);

        let events = consumer.drain();
        assert!(events.contains(&Event::QueueEvent(QueueEvent::RuleSkipped {
            target: t("//lib:a"),
            failed_dependency: t("//lib:c"),
        })));
    }

    #[test]
    fn targets_are_handed_out_once() {
        let (q, _results) = queue(diamond(), &["//other:x"]);
        // Pushing a target again must not hand it out twice.
        q.ready_queue.push(t("//other:x"));
        assert_eq!(q.try_next(), Some(t("//other:x")));
        assert_eq!(q.try_next(), None);
    }

    #[tokio::test]
    async fn next_ends_once_everything_completed() {
        let (q, _results) = queue(diamond(), &["//lib:c"]);
        let target = q.next().await.unwrap();
        q.complete(&target, true);
        assert_eq!(q.next().await, None);
    }

    #[tokio::test]
    async fn next_wakes_up_when_work_becomes_ready() {
        let (q, _results) = queue(diamond(), &["//lib:a"]);
        let q = Arc::new(q);
        let c = q.next().await.unwrap();

        let waiter = {
            let q = q.clone();
            tokio::spawn(async move { q.next().await })
        };
        tokio::task::yield_now().await;
        q.complete(&c, true);

        assert_eq!(waiter.await.unwrap(), Some(t("//lib:a")));
    }

    #[tokio::test]
    async fn aborted_queues_hand_out_nothing() {
        let (q, _results) = queue(diamond(), &["//app:bin"]);
        q.abort();
        assert_eq!(q.next().await, None);
    }

    #[test]
    fn empty_builds_are_finished_right_away() {
        let (q, results) = queue(diamond(), &[]);
        assert!(q.is_finished());
        assert!(results.is_empty());
    }

    #[cfg(shuttle)]
    #[test]
    fn conc_no_double_consumption() {
        use crate::sync::*;
        use std::collections::{HashMap, HashSet};

        const ITER: usize = 1_000;

        shuttle::check_random(
            move || {
                let rules: Vec<BuildRule> = (0..20)
                    .map(|i| rule(&format!("//pkg:t{}", i), &[]))
                    .collect();
                let graph = Arc::new(RuleGraph::new(rules, &OutputPaths::new("/out")).unwrap());
                let requested: Vec<BuildTarget> =
                    graph.all_targets_in_topological_order().to_vec();
                let q = Arc::new(TaskQueue::new(
                    graph,
                    &requested,
                    Arc::new(TaskResults::new()),
                    Arc::new(Coordinator::new()),
                    Arc::new(EventChannel::new()),
                ));

                // Consume the queue from different threads and collect the results
                let consumed: Arc<RwLock<HashMap<usize, HashSet<BuildTarget>>>> =
                    Arc::new(RwLock::new(HashMap::default()));
                let mut handles = vec![];
                for id in 0..4 {
                    let q = q.clone();
                    let consumed = consumed.clone();
                    let handle = thread::spawn(move || {
                        let mut targets = HashSet::new();
                        while let Some(target) = q.try_next() {
                            q.complete(&target, true);
                            targets.insert(target);
                        }
                        (*consumed.write().unwrap()).insert(id, targets);
                    });
                    handles.push(handle);
                }

                for handle in handles {
                    handle.join().unwrap()
                }
                assert!(q.is_finished());

                // Every target was consumed by exactly one thread
                let consumed = consumed.read().unwrap();
                let total: usize = consumed.values().map(|set| set.len()).sum();
                let all: HashSet<&BuildTarget> = consumed.values().flatten().collect();
                assert_eq!(total, 20);
                assert_eq!(all.len(), 20);
            },
            ITER,
        );
    }
}
