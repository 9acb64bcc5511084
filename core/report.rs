use crate::executor::BuildFailure;
use crate::model::{BuildTarget, CacheStatus, RuleKey};
use crate::worker::RuleState;
use std::collections::BTreeMap;
use std::time::Duration;

/// The outcome of a single build: the final state of every rule that took part in it.
///
/// Rules outside of the transitive closure of the requested targets are not part of the report.
///
#[derive(Debug, Clone)]
pub struct BuildReport {
    requested: Vec<BuildTarget>,
    states: BTreeMap<BuildTarget, RuleState>,
    elapsed: Duration,
}

impl BuildReport {
    pub(crate) fn new(
        requested: Vec<BuildTarget>,
        states: BTreeMap<BuildTarget, RuleState>,
        elapsed: Duration,
    ) -> Self {
        Self {
            requested,
            states,
            elapsed,
        }
    }

    /// Whether every rule in the build was fetched or built.
    pub fn is_success(&self) -> bool {
        self.states.values().all(RuleState::is_success)
    }

    pub fn requested(&self) -> &[BuildTarget] {
        &self.requested
    }

    pub fn outcome(&self, target: &BuildTarget) -> Option<&RuleState> {
        self.states.get(target)
    }

    pub fn outcomes(&self) -> impl Iterator<Item = (&BuildTarget, &RuleState)> {
        self.states.iter()
    }

    /// Every rule that did not succeed, including the ones skipped because a dependency failed.
    pub fn failures(&self) -> impl Iterator<Item = (&BuildTarget, &RuleState)> {
        self.states.iter().filter(|(_, state)| state.is_failure())
    }

    /// The rules that failed on their own, with the reason why.
    pub fn root_causes(&self) -> impl Iterator<Item = (&BuildTarget, &BuildFailure)> {
        self.states.iter().filter_map(|(target, state)| match state {
            RuleState::Failed(failure) => Some((target, failure.as_ref())),
            _ => None,
        })
    }

    pub fn rule_key(&self, target: &BuildTarget) -> Option<RuleKey> {
        self.states.get(target).and_then(RuleState::rule_key)
    }

    pub fn cache_status(&self, target: &BuildTarget) -> Option<CacheStatus> {
        self.states.get(target).and_then(RuleState::cache_status)
    }

    pub fn count(&self, status: CacheStatus) -> usize {
        self.states
            .values()
            .filter(|state| state.cache_status() == Some(status))
            .count()
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}
