//! Dependency-DAG construction over registered queries (§4.9 point 1-2):
//! a query depends on whatever its `QueryRef` source names and whatever
//! `merge`/`append` steps reference, found the same way `pq-engine`'s
//! `Engine::execute_inner` finds them, but collected ahead of time instead
//! of discovered step-by-step during a run.

use std::collections::{HashMap, HashSet};

use pq_engine::ExecutionContext;
use pq_common::{PqError, Query, QueryId, QueryOperation, QuerySource};

/// Direct dependencies of one query: the `QueryRef` it reads from (if
/// any) plus every `merge`/`append` step's right-hand query ids.
pub fn direct_dependencies(query: &Query) -> Vec<QueryId> {
    let mut deps = Vec::new();
    if let QuerySource::QueryRef { query_id } = &query.source {
        deps.push(query_id.clone());
    }
    for step in &query.steps {
        match &step.operation {
            QueryOperation::Merge(spec) => deps.push(spec.right_query.clone()),
            QueryOperation::Append { query_ids } => deps.extend(query_ids.iter().cloned()),
            _ => {}
        }
    }
    deps
}

/// The transitive dependency closure rooted at `roots`, plus the direct
/// edges between them. `deps_of[q]` is `q`'s direct dependency list,
/// restricted to ids reachable from `roots`.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    pub nodes: Vec<QueryId>,
    pub deps_of: HashMap<QueryId, Vec<QueryId>>,
}

impl DependencyGraph {
    /// Queries with no unresolved dependency at all — the scheduler's
    /// initial ready set.
    pub fn roots_with_no_deps(&self) -> Vec<QueryId> {
        self.nodes.iter().filter(|id| self.deps_of.get(*id).map(|d| d.is_empty()).unwrap_or(true)).cloned().collect()
    }

    /// Reverse adjacency: for each query, the queries that depend on it.
    pub fn dependents(&self) -> HashMap<QueryId, Vec<QueryId>> {
        let mut dependents: HashMap<QueryId, Vec<QueryId>> = self.nodes.iter().map(|id| (id.clone(), Vec::new())).collect();
        for (id, deps) in &self.deps_of {
            for dep in deps {
                dependents.entry(dep.clone()).or_default().push(id.clone());
            }
        }
        dependents
    }

    /// Kahn's-algorithm topological layers (§4.9 point 2, §8 scenario 6's
    /// ordering guarantee): layer 0 has no dependencies, layer N depends
    /// only on layers `< N`. Used by callers/tests that want a
    /// deterministic "before/after" check without re-deriving it from
    /// completion order; the live scheduler in [`crate::scheduler`] uses
    /// the same in-degree bookkeeping but with finer-grained concurrency
    /// than whole-layer barriers.
    pub fn topo_layers(&self) -> Vec<Vec<QueryId>> {
        let mut remaining: HashMap<QueryId, usize> = self.nodes.iter().map(|id| (id.clone(), self.deps_of.get(id).map(|d| d.len()).unwrap_or(0))).collect();
        let dependents = self.dependents();
        let mut layers = Vec::new();
        let mut done: HashSet<QueryId> = HashSet::new();
        while done.len() < self.nodes.len() {
            let layer: Vec<QueryId> = remaining
                .iter()
                .filter(|(id, count)| **count == 0 && !done.contains(*id))
                .map(|(id, _)| id.clone())
                .collect();
            if layer.is_empty() {
                break; // a cycle slipped through construction; build() already guards against this
            }
            for id in &layer {
                done.insert(id.clone());
                for dependent in dependents.get(id).into_iter().flatten() {
                    if let Some(count) = remaining.get_mut(dependent) {
                        *count = count.saturating_sub(1);
                    }
                }
            }
            layers.push(layer);
        }
        layers
    }
}

/// Builds the dependency graph reachable from `roots`, failing with
/// `CycleError { path }` (carrying the full cycle path, per §9) the
/// moment a back-edge is found during the depth-first walk.
pub fn build_graph(ctx: &ExecutionContext, roots: &[QueryId]) -> Result<DependencyGraph, PqError> {
    let mut deps_of: HashMap<QueryId, Vec<QueryId>> = HashMap::new();
    let mut visited: HashSet<QueryId> = HashSet::new();
    let mut path: Vec<QueryId> = Vec::new();

    fn visit(ctx: &ExecutionContext, id: &QueryId, deps_of: &mut HashMap<QueryId, Vec<QueryId>>, visited: &mut HashSet<QueryId>, path: &mut Vec<QueryId>) -> Result<(), PqError> {
        if let Some(pos) = path.iter().position(|p| p == id) {
            let mut cycle = path[pos..].to_vec();
            cycle.push(id.clone());
            return Err(PqError::CycleError { path: cycle.join(" -> ") });
        }
        if visited.contains(id) {
            return Ok(());
        }
        let query = ctx.query(id)?;
        let deps = direct_dependencies(query);
        path.push(id.clone());
        for dep in &deps {
            visit(ctx, dep, deps_of, visited, path)?;
        }
        path.pop();
        visited.insert(id.clone());
        deps_of.insert(id.clone(), deps);
        Ok(())
    }

    for root in roots {
        visit(ctx, root, &mut deps_of, &mut visited, &mut path)?;
    }

    let nodes: Vec<QueryId> = deps_of.keys().cloned().collect();
    Ok(DependencyGraph { nodes, deps_of })
}
