//! `RefreshOrchestrator` (C7, §4.9): builds the dependency DAG for a set
//! of root query ids, schedules jobs across it with a concurrency cap,
//! shares one `Engine`/`Session`/`queryResults` map across every job so
//! dependents reuse an already-computed result (point 4-5), and supports
//! cooperative cancellation (point 6).

use std::collections::HashMap;
use std::sync::{Condvar, Mutex};

use dashmap::DashMap;

use pq_common::{CancelToken, PqError, QueryId};
use pq_engine::{Engine, ExecutionContext, ExecutionOptions, ProgressEvent, QueryExecutionResult, QueryExecutionSession};

use crate::events::RefreshEvent;
use crate::graph::build_graph;
use crate::scheduler::{JobOutcome, SchedulerState};

#[derive(Debug, Clone)]
pub struct RefreshOptions {
    /// Maximum number of queries run in parallel (§4.9 point 3).
    pub concurrency: usize,
    pub execution: ExecutionOptions,
}

impl Default for RefreshOptions {
    fn default() -> Self {
        Self { concurrency: 4, execution: ExecutionOptions::default() }
    }
}

pub type RefreshOutcome = JobOutcome<QueryExecutionResult>;

#[derive(Debug, Default)]
pub struct RefreshReport {
    pub outcomes: HashMap<QueryId, RefreshOutcome>,
}

impl RefreshReport {
    pub fn succeeded(&self, query_id: &str) -> bool {
        matches!(self.outcomes.get(query_id), Some(JobOutcome::Success(_)))
    }

    pub fn result(&self, query_id: &str) -> Option<&QueryExecutionResult> {
        match self.outcomes.get(query_id) {
            Some(JobOutcome::Success(r)) => Some(r),
            _ => None,
        }
    }
}

fn noop_progress(_event: ProgressEvent) {}

pub struct RefreshOrchestrator<'a> {
    ctx: &'a ExecutionContext,
}

impl<'a> RefreshOrchestrator<'a> {
    pub fn new(ctx: &'a ExecutionContext) -> Self {
        Self { ctx }
    }

    /// Refreshes every query reachable from `roots`. Individual query
    /// failures do not abort the whole call — they're recorded in the
    /// returned report as `Failed`/`Cancelled`/`Skipped` outcomes; the
    /// `Err` path here is reserved for graph-construction failures
    /// (`UnknownQuery`, `CycleError`) that make scheduling impossible at
    /// all.
    pub fn refresh(
        &self,
        roots: &[QueryId],
        options: &RefreshOptions,
        cancel: &CancelToken,
        on_event: &(dyn Fn(RefreshEvent) + Send + Sync),
    ) -> Result<RefreshReport, PqError> {
        let graph = build_graph(self.ctx, roots)?;
        let session = QueryExecutionSession::new(chrono::Utc::now());
        let results: DashMap<QueryId, QueryExecutionResult> = DashMap::new();

        let state: Mutex<SchedulerState<QueryExecutionResult>> = Mutex::new(SchedulerState::new(&graph));
        let condvar = Condvar::new();

        {
            let guard = state.lock().unwrap();
            for id in &guard.ready {
                on_event(RefreshEvent::JobQueued { query_id: id.clone() });
            }
        }

        let concurrency = options.concurrency.max(1);
        std::thread::scope(|scope| {
            for _ in 0..concurrency {
                scope.spawn(|| self.worker(&state, &condvar, &session, &results, options, cancel, on_event));
            }
        });

        let outcomes = state.into_inner().unwrap().outcomes;
        Ok(RefreshReport { outcomes })
    }

    #[allow(clippy::too_many_arguments)]
    fn worker(
        &self,
        state: &Mutex<SchedulerState<QueryExecutionResult>>,
        condvar: &Condvar,
        session: &QueryExecutionSession,
        results: &DashMap<QueryId, QueryExecutionResult>,
        options: &RefreshOptions,
        cancel: &CancelToken,
        on_event: &(dyn Fn(RefreshEvent) + Send + Sync),
    ) {
        loop {
            let query_id = {
                let mut guard = state.lock().unwrap();
                loop {
                    if guard.is_complete() {
                        return;
                    }
                    if let Some(id) = guard.ready.pop_front() {
                        guard.in_flight += 1;
                        break id;
                    }
                    if guard.in_flight == 0 {
                        // Nothing ready and nothing in flight but not complete:
                        // unreachable for a DAG built by `build_graph`, but bail
                        // rather than spin forever if it ever happens.
                        return;
                    }
                    guard = condvar.wait(guard).unwrap();
                }
            };

            #[cfg(feature = "tracing")]
            tracing::debug!(query_id = %query_id, "job starting");
            on_event(RefreshEvent::JobStart { query_id: query_id.clone() });

            let outcome = if cancel.is_cancelled() {
                on_event(RefreshEvent::JobCancelled { query_id: query_id.clone(), reason: "refresh cancelled".to_string() });
                JobOutcome::Cancelled
            } else {
                let engine = Engine::new(self.ctx, session, results);
                match engine.execute(query_id.as_str(), &options.execution, cancel, &mut noop_progress) {
                    Ok(result) => {
                        on_event(RefreshEvent::JobComplete { query_id: query_id.clone() });
                        JobOutcome::Success(result)
                    }
                    Err(e) if e.is_cancelled() => {
                        on_event(RefreshEvent::JobCancelled { query_id: query_id.clone(), reason: "cancelled".to_string() });
                        JobOutcome::Cancelled
                    }
                    Err(e) => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(query_id = %query_id, error = %e, "job failed");
                        on_event(RefreshEvent::JobError { query_id: query_id.clone(), error: e.clone() });
                        JobOutcome::Failed(e.to_string())
                    }
                }
            };

            let (newly_ready, newly_skipped) = {
                let mut guard = state.lock().unwrap();
                guard.in_flight -= 1;
                guard.resolve(query_id, outcome)
            };
            for id in &newly_ready {
                on_event(RefreshEvent::JobQueued { query_id: id.clone() });
            }
            for (id, bad) in &newly_skipped {
                on_event(RefreshEvent::JobCancelled { query_id: id.clone(), reason: format!("dependency '{bad}' failed") });
            }
            condvar.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pq_common::{Query, QuerySource, Value};

    fn range_query(id: &str, v: i64) -> Query {
        Query {
            id: id.to_string(),
            name: id.to_string(),
            source: QuerySource::Range { values: vec![vec![Value::Text("n".into())], vec![Value::Int(v)]], has_headers: true },
            steps: vec![],
            refresh_policy: None,
        }
    }

    fn query_ref(id: &str, of: &str) -> Query {
        Query { id: id.to_string(), name: id.to_string(), source: QuerySource::QueryRef { query_id: of.to_string() }, steps: vec![], refresh_policy: None }
    }

    #[test]
    fn refreshes_a_chain_and_dedupes_the_shared_root() {
        let mut ctx = ExecutionContext::new();
        ctx.register_query(range_query("a", 1));
        ctx.register_query(query_ref("b", "a"));
        ctx.register_query(query_ref("c", "b"));

        let orchestrator = RefreshOrchestrator::new(&ctx);
        let events = Mutex::new(Vec::new());
        let cancel = CancelToken::new();
        let report = orchestrator
            .refresh(&["c".to_string()], &RefreshOptions::default(), &cancel, &|e| events.lock().unwrap().push(e))
            .unwrap();

        assert!(report.succeeded("a"));
        assert!(report.succeeded("b"));
        assert!(report.succeeded("c"));

        let events = events.into_inner().unwrap();
        let pos = |id: &str, want_start: bool| {
            events
                .iter()
                .position(|e| match e {
                    RefreshEvent::JobStart { query_id } if want_start => query_id == id,
                    RefreshEvent::JobComplete { query_id } if !want_start => query_id == id,
                    _ => false,
                })
                .unwrap()
        };
        assert!(pos("a", false) < pos("b", true));
        assert!(pos("b", false) < pos("c", true));
    }

    #[test]
    fn shared_root_requested_by_two_dependents_runs_once() {
        let mut ctx = ExecutionContext::new();
        ctx.register_query(range_query("a", 1));
        ctx.register_query(query_ref("b", "a"));
        ctx.register_query(query_ref("c", "a"));

        let orchestrator = RefreshOrchestrator::new(&ctx);
        let events = Mutex::new(Vec::new());
        let cancel = CancelToken::new();
        orchestrator
            .refresh(&["b".to_string(), "c".to_string()], &RefreshOptions::default(), &cancel, &|e| events.lock().unwrap().push(e))
            .unwrap();

        let events = events.into_inner().unwrap();
        let starts_of_a = events.iter().filter(|e| matches!(e, RefreshEvent::JobStart { query_id } if query_id == "a")).count();
        assert_eq!(starts_of_a, 1);
    }

    #[test]
    fn cycle_is_reported_before_any_job_runs() {
        let mut ctx = ExecutionContext::new();
        ctx.register_query(query_ref("a", "b"));
        ctx.register_query(query_ref("b", "a"));

        let orchestrator = RefreshOrchestrator::new(&ctx);
        let cancel = CancelToken::new();
        let err = orchestrator.refresh(&["a".to_string()], &RefreshOptions::default(), &cancel, &|_| {}).unwrap_err();
        assert!(matches!(err, PqError::CycleError { .. }));
    }

    #[test]
    fn unknown_query_skips_its_dependent() {
        let mut ctx = ExecutionContext::new();
        ctx.register_query(query_ref("b", "missing"));

        let orchestrator = RefreshOrchestrator::new(&ctx);
        let cancel = CancelToken::new();
        let err = orchestrator.refresh(&["b".to_string()], &RefreshOptions::default(), &cancel, &|_| {}).unwrap_err();
        assert!(matches!(err, PqError::UnknownQuery(_)));
    }

    #[test]
    fn pre_cancelled_token_cancels_every_job() {
        let mut ctx = ExecutionContext::new();
        ctx.register_query(range_query("a", 1));
        ctx.register_query(query_ref("b", "a"));

        let orchestrator = RefreshOrchestrator::new(&ctx);
        let cancel = CancelToken::new();
        cancel.cancel();
        let report = orchestrator.refresh(&["b".to_string()], &RefreshOptions::default(), &cancel, &|_| {}).unwrap();
        assert!(matches!(report.outcomes["a"], JobOutcome::Cancelled));
        assert!(matches!(report.outcomes["b"], JobOutcome::Skipped { .. } | JobOutcome::Cancelled));
    }
}
