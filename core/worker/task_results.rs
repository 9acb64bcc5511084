use crate::executor::BuildFailure;
use crate::model::{BuildTarget, CacheStatus, RuleKey};
use crate::sync::Arc;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::*;
use tracing::*;

/// Where a rule is in its lifecycle within one build.
///
/// ```text
/// Pending -> KeyComputed -> Fetched
///                        -> Building -> Built
///                                    -> Failed
/// Pending -> DependencyFailed
/// ```
///
/// A rule may also fail from any non-terminal state, for example when its key can not be
/// computed.
///
#[derive(Debug, Clone)]
pub enum RuleState {
    Pending,
    KeyComputed(RuleKey),
    Building(RuleKey),
    Fetched(RuleKey),
    Built(RuleKey),
    Failed(Arc<BuildFailure>),
    /// Never scheduled, because `dep` (a direct or transitive dependency) failed.
    DependencyFailed { dep: BuildTarget },
}

impl RuleState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RuleState::Fetched(_)
                | RuleState::Built(_)
                | RuleState::Failed(_)
                | RuleState::DependencyFailed { .. }
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RuleState::Fetched(_) | RuleState::Built(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            RuleState::Failed(_) | RuleState::DependencyFailed { .. }
        )
    }

    pub fn rule_key(&self) -> Option<RuleKey> {
        match self {
            RuleState::KeyComputed(key)
            | RuleState::Building(key)
            | RuleState::Fetched(key)
            | RuleState::Built(key) => Some(*key),
            _ => None,
        }
    }

    pub fn cache_status(&self) -> Option<CacheStatus> {
        match self {
            RuleState::Fetched(_) => Some(CacheStatus::Cached),
            RuleState::Built(_) => Some(CacheStatus::Fresh),
            _ => None,
        }
    }

    pub fn can_transition_to(&self, next: &RuleState) -> bool {
        use RuleState::*;
        match (self, next) {
            (Pending, KeyComputed(_)) => true,
            (Pending, DependencyFailed { .. }) => true,
            (KeyComputed(a), Fetched(b)) | (KeyComputed(a), Building(b)) => a == b,
            (Building(a), Built(b)) => a == b,
            (from, Failed(_)) => !from.is_terminal(),
            _ => false,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            RuleState::Pending => "pending",
            RuleState::KeyComputed(_) => "key-computed",
            RuleState::Building(_) => "building",
            RuleState::Fetched(_) => "fetched",
            RuleState::Built(_) => "built",
            RuleState::Failed(_) => "failed",
            RuleState::DependencyFailed { .. } => "dependency-failed",
        }
    }
}

impl fmt::Display for RuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleState::Failed(failure) => write!(f, "failed: {}", failure),
            RuleState::DependencyFailed { dep } => write!(f, "skipped, {} failed", dep),
            state => match state.rule_key() {
                Some(key) => write!(f, "{} ({})", state.name(), key),
                None => f.write_str(state.name()),
            },
        }
    }
}

/// The state of every rule of a build, shared across workers.
///
/// Every transition happens atomically per target, and only legal transitions are accepted, so
/// a target can never be built twice or leave a terminal state.
///
#[derive(Debug, Default)]
pub struct TaskResults {
    states: DashMap<BuildTarget, RuleState>,
}

impl TaskResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Start tracking `target` as `Pending`. Tracking a target twice has no effect.
    pub fn add_expected_target(&self, target: BuildTarget) {
        self.states.entry(target).or_insert(RuleState::Pending);
    }

    pub fn get(&self, target: &BuildTarget) -> Option<RuleState> {
        self.states.get(target).map(|state| state.value().clone())
    }

    pub fn is_pending(&self, target: &BuildTarget) -> bool {
        matches!(self.get(target), Some(RuleState::Pending))
    }

    pub fn rule_key(&self, target: &BuildTarget) -> Option<RuleKey> {
        self.states.get(target).and_then(|state| state.rule_key())
    }

    #[tracing::instrument(name = "TaskResults::transition", skip(self))]
    pub fn transition(&self, target: &BuildTarget, next: RuleState) -> Result<(), TaskResultError> {
        let mut state = self
            .states
            .get_mut(target)
            .ok_or_else(|| TaskResultError::UnknownTarget(target.clone()))?;

        if !state.can_transition_to(&next) {
            return Err(TaskResultError::IllegalTransition {
                target: target.clone(),
                from: state.name(),
                to: next.name(),
            });
        }

        trace!("{}: {} -> {}", target, state.name(), next.name());
        *state = next;
        Ok(())
    }

    /// A copy of every state, sorted by target.
    pub fn snapshot(&self) -> BTreeMap<BuildTarget, RuleState> {
        self.states
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

#[derive(Error, Debug)]
pub enum TaskResultError {
    #[error("{0} is not part of this build")]
    UnknownTarget(BuildTarget),

    #[error("{target} can not go from {from} to {to}")]
    IllegalTransition {
        target: BuildTarget,
        from: &'static str,
        to: &'static str,
    },
}
