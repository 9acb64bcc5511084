use crate::model::{BuildTarget, CacheStatus, RuleKey};
use crate::observers::VersionControlStats;
use std::time::Instant;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum QueueEvent {
    RuleQueued {
        target: BuildTarget,
    },
    /// The rule will never be scheduled because one of its dependencies failed.
    RuleSkipped {
        target: BuildTarget,
        failed_dependency: BuildTarget,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum WorkerEvent {
    RuleStarted {
        target: BuildTarget,
    },
    RuleKeyComputed {
        target: BuildTarget,
        rule_key: RuleKey,
    },
    CacheHit {
        target: BuildTarget,
        rule_key: RuleKey,
    },
    CacheMiss {
        target: BuildTarget,
        rule_key: RuleKey,
    },
    StepStarted {
        target: BuildTarget,
        index: usize,
        description: String,
    },
    RuleCompleted {
        target: BuildTarget,
        rule_key: RuleKey,
        cache_status: CacheStatus,
    },
    RuleFailed {
        target: BuildTarget,
        error: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum CacheEvent {
    LookupFailed { rule_key: RuleKey, error: String },
    StoreFailed { rule_key: RuleKey, error: String },
    Stored { rule_key: RuleKey, file_count: usize },
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum WorkflowEvent {
    BuildStarted(Instant),
    BuildCompleted { at: Instant, success: bool },
}

impl WorkflowEvent {
    pub(crate) fn build_completed(success: bool) -> Self {
        Self::BuildCompleted {
            at: Instant::now(),
            success,
        }
    }
    pub(crate) fn build_started() -> Self {
        Self::BuildStarted(Instant::now())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum VcsEvent {
    StatsGenerated(VersionControlStats),
}

#[derive(Default, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Event {
    /// The "nothing happened" event.
    #[default]
    Noop,
    QueueEvent(QueueEvent),
    WorkerEvent(WorkerEvent),
    CacheEvent(CacheEvent),
    WorkflowEvent(WorkflowEvent),
    VcsEvent(VcsEvent),
}

impl From<QueueEvent> for Event {
    fn from(value: QueueEvent) -> Self {
        Event::QueueEvent(value)
    }
}

impl From<WorkerEvent> for Event {
    fn from(value: WorkerEvent) -> Self {
        Event::WorkerEvent(value)
    }
}

impl From<CacheEvent> for Event {
    fn from(value: CacheEvent) -> Self {
        Event::CacheEvent(value)
    }
}

impl From<WorkflowEvent> for Event {
    fn from(value: WorkflowEvent) -> Self {
        Event::WorkflowEvent(value)
    }
}

impl From<VcsEvent> for Event {
    fn from(value: VcsEvent) -> Self {
        Event::VcsEvent(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::Arbitrary;

    impl Arbitrary for Event {
        fn arbitrary(g: &mut quickcheck::Gen) -> Self {
            let target = BuildTarget::arbitrary(g);
            let step_started = WorkerEvent::StepStarted {
                target: target.clone(),
                index: usize::arbitrary(g),
                description: String::arbitrary(g),
            };
            let queued = QueueEvent::RuleQueued { target };

            g.choose(&[Self::Noop, step_started.into(), queued.into()])
                .unwrap()
                .clone()
        }
    }
}
