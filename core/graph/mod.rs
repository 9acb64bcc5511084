//! # The Rule Graph
//!
//! Owns every `BuildRule` of a build and the dependency edges between them. Rules only refer
//! to each other by `BuildTarget`, so every edge is a lookup against this graph.
//!
//! A `RuleGraph` is validated once at construction: duplicate targets, dangling or repeated
//! dependencies, colliding output directories and cycles are all rejected before any work is
//! scheduled.
//!
mod error;

pub use error::*;

use crate::model::{BuildTarget, OutputPaths};
use crate::rules::BuildRule;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::PathBuf;
use tracing::*;

#[derive(Debug, Clone)]
pub struct RuleGraph {
    rules: BTreeMap<BuildTarget, BuildRule>,

    /// Edges go from a rule to each of its dependencies.
    graph: DiGraph<BuildTarget, ()>,

    index: BTreeMap<BuildTarget, NodeIndex>,

    dependents: BTreeMap<BuildTarget, Vec<BuildTarget>>,

    topological_order: Vec<BuildTarget>,

    output_paths: OutputPaths,
}

impl RuleGraph {
    #[tracing::instrument(name = "RuleGraph::new", skip(rules, output_paths))]
    pub fn new(rules: Vec<BuildRule>, output_paths: &OutputPaths) -> Result<Self, GraphError> {
        let mut by_target = BTreeMap::new();
        for rule in rules {
            let target = rule.target().clone();
            if by_target.insert(target.clone(), rule).is_some() {
                return Err(GraphError::DuplicateTarget(target));
            }
        }

        Self::check_output_paths(&by_target, output_paths)?;
        Self::check_dependencies(&by_target)?;

        let mut graph = DiGraph::with_capacity(by_target.len(), 0);
        let mut index = BTreeMap::new();
        for target in by_target.keys() {
            index.insert(target.clone(), graph.add_node(target.clone()));
        }

        let mut dependents: BTreeMap<BuildTarget, Vec<BuildTarget>> = BTreeMap::new();
        for (target, rule) in &by_target {
            for dep in rule.deps() {
                graph.add_edge(index[target], index[dep], ());
                dependents
                    .entry(dep.clone())
                    .or_default()
                    .push(target.clone());
            }
        }
        for targets in dependents.values_mut() {
            targets.sort();
        }

        if let Some(cycle) = Self::find_cycle(&graph, &by_target) {
            return Err(GraphError::Cycle(cycle));
        }

        let topological_order = Self::topological_order(&by_target, &dependents);
        debug!("Rule graph has {} rules", topological_order.len());

        Ok(Self {
            rules: by_target,
            graph,
            index,
            dependents,
            topological_order,
            output_paths: output_paths.clone(),
        })
    }

    pub fn get(&self, target: &BuildTarget) -> Option<&BuildRule> {
        self.rules.get(target)
    }

    pub fn contains(&self, target: &BuildTarget) -> bool {
        self.rules.contains_key(target)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> impl Iterator<Item = &BuildRule> {
        self.rules.values()
    }

    pub fn output_paths(&self) -> &OutputPaths {
        &self.output_paths
    }

    /// The direct dependencies of `target`, in the order they were declared.
    pub fn dependencies_of(&self, target: &BuildTarget) -> Option<&[BuildTarget]> {
        self.rules.get(target).map(|rule| rule.deps())
    }

    /// The rules that depend directly on `target`, sorted.
    pub fn dependents_of(&self, target: &BuildTarget) -> &[BuildTarget] {
        self.dependents
            .get(target)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every target, with each dependency strictly before its dependents. Independent targets
    /// are ordered by `BuildTarget`, so the order is the same on every run.
    pub fn all_targets_in_topological_order(&self) -> &[BuildTarget] {
        &self.topological_order
    }

    /// The requested targets together with all of their transitive dependencies. Targets
    /// that are not in the graph are ignored.
    pub fn transitive_closure(&self, requested: &[BuildTarget]) -> BTreeSet<BuildTarget> {
        let mut closure = BTreeSet::new();
        let mut pending: Vec<NodeIndex> = requested
            .iter()
            .filter_map(|target| self.index.get(target).copied())
            .collect();

        while let Some(node) = pending.pop() {
            if closure.insert(self.graph[node].clone()) {
                pending.extend(self.graph.neighbors(node));
            }
        }

        closure
    }

    fn check_output_paths(
        rules: &BTreeMap<BuildTarget, BuildRule>,
        output_paths: &OutputPaths,
    ) -> Result<(), GraphError> {
        let mut dirs: Vec<(PathBuf, &BuildTarget)> = Vec::with_capacity(rules.len() * 2);
        for target in rules.keys() {
            dirs.push((output_paths.gen_dir(target), target));
            dirs.push((output_paths.scratch_dir(target), target));
        }
        dirs.sort();

        // NOTE: after sorting, any directory nested in another one sorts right after
        // it or after another directory nested in it, so comparing neighbours is enough.
        for pair in dirs.windows(2) {
            let (first_dir, first) = &pair[0];
            let (second_dir, second) = &pair[1];
            if first != second && second_dir.starts_with(first_dir) {
                return Err(GraphError::OutputPathConflict {
                    first: (*first).clone(),
                    second: (*second).clone(),
                    path: second_dir.clone(),
                });
            }
        }

        Ok(())
    }

    fn check_dependencies(rules: &BTreeMap<BuildTarget, BuildRule>) -> Result<(), GraphError> {
        for (target, rule) in rules {
            let mut seen = BTreeSet::new();
            for dep in rule.deps() {
                if !rules.contains_key(dep) {
                    return Err(GraphError::UnknownDependency {
                        target: target.clone(),
                        dep: dep.clone(),
                    });
                }
                if !seen.insert(dep) {
                    return Err(GraphError::DuplicateDependency {
                        target: target.clone(),
                        dep: dep.clone(),
                    });
                }
            }

            for input in rule.inputs() {
                if let Some(producer) = input.producing_target() {
                    if !seen.contains(producer) {
                        return Err(GraphError::UndeclaredOutputDependency {
                            target: target.clone(),
                            dep: producer.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Find the cycle through the smallest target that is part of any cycle, if there is one.
    fn find_cycle(
        graph: &DiGraph<BuildTarget, ()>,
        rules: &BTreeMap<BuildTarget, BuildRule>,
    ) -> Option<DependencyCycle> {
        let component = tarjan_scc(graph)
            .into_iter()
            .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
            .map(|scc| {
                scc.into_iter()
                    .map(|node| graph[node].clone())
                    .collect::<BTreeSet<BuildTarget>>()
            })
            .min_by(|a, b| a.iter().next().cmp(&b.iter().next()))?;

        let start = component.iter().next()?.clone();

        // Shortest way back to `start`, following dependencies in declaration order.
        let mut parents: BTreeMap<&BuildTarget, &BuildTarget> = BTreeMap::new();
        let mut queue = VecDeque::from([&start]);
        let mut last = None;
        'search: while let Some(current) = queue.pop_front() {
            for dep in rules.get(current).map(|rule| rule.deps()).unwrap_or(&[]) {
                if !component.contains(dep) {
                    continue;
                }
                if *dep == start {
                    last = Some(current);
                    break 'search;
                }
                if !parents.contains_key(dep) {
                    parents.insert(dep, current);
                    queue.push_back(dep);
                }
            }
        }

        let mut targets = vec![];
        let mut current = last?;
        while *current != start {
            targets.push(current.clone());
            current = *parents.get(current)?;
        }
        targets.push(start);
        targets.reverse();

        Some(DependencyCycle::new(targets))
    }

    fn topological_order(
        rules: &BTreeMap<BuildTarget, BuildRule>,
        dependents: &BTreeMap<BuildTarget, Vec<BuildTarget>>,
    ) -> Vec<BuildTarget> {
        let mut pending: BTreeMap<&BuildTarget, usize> = rules
            .iter()
            .map(|(target, rule)| (target, rule.deps().len()))
            .collect();

        let mut ready: BTreeSet<&BuildTarget> = pending
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(target, _)| *target)
            .collect();

        let mut order = Vec::with_capacity(rules.len());
        while let Some(target) = ready.pop_first() {
            order.push(target.clone());
            for dependent in dependents.get(target).map(Vec::as_slice).unwrap_or(&[]) {
                if let Some(count) = pending.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(dependent);
                    }
                }
            }
        }

        order
    }
}
