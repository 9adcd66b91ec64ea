//! In-degree-decrement bookkeeping behind the concurrency-capped
//! scheduler (§4.9 point 3: "a job is ready when all its dependencies are
//! done"). Kept separate from [`crate::orchestrator`] so the pure
//! state-transition logic (what becomes ready, what gets skipped) can be
//! unit-tested without spinning up threads or an `Engine`.

use std::collections::{HashMap, HashSet, VecDeque};

use pq_common::QueryId;

use crate::graph::DependencyGraph;

#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome<T> {
    Success(T),
    Failed(String),
    Cancelled,
    /// Never ran: a dependency failed, was cancelled, or was itself
    /// skipped.
    Skipped { failed_dependency: QueryId },
}

impl<T> JobOutcome<T> {
    pub fn is_terminal_failure(&self) -> bool {
        !matches!(self, JobOutcome::Success(_))
    }
}

/// Shared mutable scheduling state, guarded by a single mutex in
/// [`crate::orchestrator::RefreshOrchestrator::refresh`]. Generic over the
/// per-job result type `T` (`pq_engine::QueryExecutionResult` in
/// production, a plain marker in unit tests) so the cascade logic can be
/// exercised without a real engine.
pub struct SchedulerState<T> {
    pub deps_of: HashMap<QueryId, Vec<QueryId>>,
    pub dependents: HashMap<QueryId, Vec<QueryId>>,
    pub remaining: HashMap<QueryId, usize>,
    pub ready: VecDeque<QueryId>,
    pub poisoned: HashSet<QueryId>,
    pub outcomes: HashMap<QueryId, JobOutcome<T>>,
    pub in_flight: usize,
    total: usize,
}

impl<T> SchedulerState<T> {
    pub fn new(graph: &DependencyGraph) -> Self {
        let remaining: HashMap<QueryId, usize> = graph.nodes.iter().map(|id| (id.clone(), graph.deps_of.get(id).map(|d| d.len()).unwrap_or(0))).collect();
        let ready: VecDeque<QueryId> = remaining.iter().filter(|(_, c)| **c == 0).map(|(id, _)| id.clone()).collect();
        Self {
            deps_of: graph.deps_of.clone(),
            dependents: graph.dependents(),
            remaining,
            ready,
            poisoned: HashSet::new(),
            outcomes: HashMap::new(),
            in_flight: 0,
            total: graph.nodes.len(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.outcomes.len() == self.total
    }

    /// Records `id`'s outcome and cascades through its dependents: each
    /// dependent whose last unresolved dependency was `id` either becomes
    /// ready (if nothing it depends on is poisoned) or is itself marked
    /// `Skipped` and cascaded further (§4.9's "ready when all dependencies
    /// are done" extended to "a poisoned dependency resolves its
    /// dependents too, just not successfully").
    ///
    /// Returns the ids newly made ready and the ids newly skipped, in the
    /// order discovered, for the caller to turn into events.
    pub fn resolve(&mut self, id: QueryId, outcome: JobOutcome<T>) -> (Vec<QueryId>, Vec<(QueryId, QueryId)>) {
        let failed = outcome.is_terminal_failure();
        self.outcomes.insert(id.clone(), outcome);
        if failed {
            self.poisoned.insert(id.clone());
        }

        let mut newly_ready = Vec::new();
        let mut newly_skipped = Vec::new();
        let mut cascade: VecDeque<QueryId> = VecDeque::new();
        cascade.push_back(id);

        while let Some(finished) = cascade.pop_front() {
            let Some(dependents) = self.dependents.get(&finished).cloned() else { continue };
            for dependent in dependents {
                if self.outcomes.contains_key(&dependent) {
                    continue;
                }
                let count = self.remaining.entry(dependent.clone()).or_insert(0);
                if *count > 0 {
                    *count -= 1;
                }
                if *count != 0 {
                    continue;
                }
                let deps = self.deps_of.get(&dependent).cloned().unwrap_or_default();
                if let Some(bad) = deps.iter().find(|d| self.poisoned.contains(*d)) {
                    self.poisoned.insert(dependent.clone());
                    self.outcomes.insert(dependent.clone(), JobOutcome::Skipped { failed_dependency: bad.clone() });
                    newly_skipped.push((dependent.clone(), bad.clone()));
                    cascade.push_back(dependent);
                } else {
                    self.ready.push_back(dependent.clone());
                    newly_ready.push(dependent);
                }
            }
        }
        (newly_ready, newly_skipped)
    }
}
