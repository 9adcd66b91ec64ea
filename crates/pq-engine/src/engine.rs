//! The execution engine (C6, §4.8): ties the data model, operator
//! library, folding planner, cache, and connectors together into a
//! single `Engine::execute` call for one query `Q` against a context
//! `C = { queries, queryResults, ... }`.

use dashmap::DashMap;

use pq_cache::validate::SourceState as CachedSourceState;
use pq_cache::{CacheKeyInput, CacheKeyOptions, DependencySignature, SetOptions};
use pq_common::{
    CacheMeta, CancelToken, Column, ConnectorMeta, FoldingRecord, ITable, Provenance, PqError, Query,
    QueryExecutionMeta, QueryId, QueryOperation, QuerySource, QueryStep, SqlDialect, Table, Value,
};
use pq_connector::{ConnectorRequest, Credentials, ExecContext, StateContext};
use pq_folding::{odata, sql, FoldKind};
use pq_operators::Dependencies;
use pq_streaming::{run_wide_op, StreamEvent, StreamingOptions};

use crate::context::ExecutionContext;
use crate::options::{CacheMode, ExecutionOptions, ValidationMode};
use crate::progress::ProgressEvent;
use crate::result::{CachedResult, QueryExecutionResult};
use crate::session::QueryExecutionSession;

/// Maps a query's source to the connector id that serves it (§6.1's
/// `"file" | "http" | "odata" | "sql"` examples, extended to the other
/// source kinds §3 names). `Range`, `Table`, and `QueryRef` never call a
/// connector — they're served from inline data, a host-resolved workbook
/// table, or another query's own result.
fn connector_id_for_source(source: &QuerySource) -> Option<&'static str> {
    match source {
        QuerySource::Range { .. } | QuerySource::Table { .. } | QuerySource::QueryRef { .. } => None,
        QuerySource::Csv { .. } | QuerySource::Json { .. } | QuerySource::Parquet { .. } | QuerySource::Folder { .. } => Some("file"),
        QuerySource::Database { .. } => Some("sql"),
        QuerySource::Api { .. } => Some("http"),
        QuerySource::Odata { .. } => Some("odata"),
        QuerySource::SharePoint { .. } => Some("sharepoint"),
    }
}

fn range_to_table(values: &[Vec<Value>], has_headers: bool) -> Result<Table, PqError> {
    let width = values.iter().map(|r| r.len()).max().unwrap_or(0);
    if has_headers {
        let header = values.first();
        let names: Vec<String> = match header {
            Some(row) => (0..width).map(|i| row.get(i).map(|v| v.stringify()).unwrap_or_default()).collect(),
            None => Vec::new(),
        };
        let names = pq_common::make_unique_column_names(&names);
        let columns = names.into_iter().map(Column::any).collect();
        let rows = values.iter().skip(1).cloned().collect();
        Table::new(columns, rows)
    } else {
        let columns = (0..width).map(|i| Column::any(format!("Column{}", i + 1))).collect();
        Table::new(columns, values.to_vec())
    }
}

enum FoldPlan {
    Sql(sql::SqlFoldPlan),
    Odata(odata::ODataFoldPlan),
}

impl FoldPlan {
    fn local_step_offset(&self) -> usize {
        match self {
            FoldPlan::Sql(p) => p.local_step_offset,
            FoldPlan::Odata(p) => p.local_step_offset,
        }
    }

    fn kind(&self) -> FoldKind {
        match self {
            FoldPlan::Sql(p) => p.kind,
            FoldPlan::Odata(p) => p.kind,
        }
    }

    fn record(&self, dialect: Option<SqlDialect>) -> FoldingRecord {
        match self {
            FoldPlan::Sql(p) => FoldingRecord::Sql {
                dialect: dialect.unwrap_or(SqlDialect::Postgres),
                sql: p.sql.clone(),
                params: p.params.clone(),
                local_steps: p.local_step_ids.clone(),
                local_step_offset: p.local_step_offset,
            },
            FoldPlan::Odata(p) => FoldingRecord::Odata {
                url: p.url.clone(),
                local_steps: p.local_step_ids.clone(),
                local_step_offset: p.local_step_offset,
            },
        }
    }
}

/// One query execution run. Borrows the registered queries/connectors/
/// hooks (`ExecutionContext`), the credential/permission caches and clock
/// (`QueryExecutionSession`), and a `queryResults` map shared with
/// whatever else is running in the same session — `pq-orchestrator`
/// passes the same map across every job in a refresh so dependents reuse
/// a result instead of recomputing it (§4.9 point 4); a lone
/// `Engine::execute` call still benefits from it for a query with
/// repeated `merge`/`append` references to the same dependency.
pub struct Engine<'a> {
    ctx: &'a ExecutionContext,
    session: &'a QueryExecutionSession,
    results: &'a DashMap<QueryId, QueryExecutionResult>,
}

impl<'a> Engine<'a> {
    pub fn new(ctx: &'a ExecutionContext, session: &'a QueryExecutionSession, results: &'a DashMap<QueryId, QueryExecutionResult>) -> Self {
        Self { ctx, session, results }
    }

    pub fn execute(
        &self,
        query_id: &str,
        options: &ExecutionOptions,
        cancel: &CancelToken,
        on_event: &mut dyn FnMut(ProgressEvent),
    ) -> Result<QueryExecutionResult, PqError> {
        let mut stack = Vec::new();
        self.execute_inner(query_id, options, cancel, on_event, &mut stack)
    }

    fn execute_inner(
        &self,
        query_id: &str,
        options: &ExecutionOptions,
        cancel: &CancelToken,
        on_event: &mut dyn FnMut(ProgressEvent),
        stack: &mut Vec<QueryId>,
    ) -> Result<QueryExecutionResult, PqError> {
        if let Some(cached) = self.results.get(query_id) {
            return Ok(cached.clone());
        }
        if stack.iter().any(|id| id == query_id) {
            let mut path = stack.clone();
            path.push(query_id.to_string());
            return Err(PqError::CycleError { path: path.join(" -> ") });
        }
        cancel.check()?;
        stack.push(query_id.to_string());
        let outcome = self.run_query(query_id, options, cancel, on_event, stack);
        stack.pop();
        if let Ok(result) = &outcome {
            self.results.insert(query_id.to_string(), result.clone());
        }
        outcome
    }

    fn run_query(
        &self,
        query_id: &str,
        options: &ExecutionOptions,
        cancel: &CancelToken,
        on_event: &mut dyn FnMut(ProgressEvent),
        stack: &mut Vec<QueryId>,
    ) -> Result<QueryExecutionResult, PqError> {
        let query = self.ctx.query(query_id)?.clone();
        let started_at = self.session.now;

        if let QuerySource::QueryRef { query_id: referenced } = &query.source {
            let mut base = self.execute_inner(referenced, options, cancel, on_event, stack)?;
            for step in &query.steps {
                cancel.check()?;
                on_event(ProgressEvent::StepStart { query_id: query_id.to_string(), step_id: step.id.clone() });
                let deps = self.resolve_step_dependencies(&query, step, options, cancel, on_event, stack, &mut base.meta.sources)?;
                base.table = self.apply_step(&base.table, step, &deps, query_id, on_event)?;
                on_event(ProgressEvent::StepComplete { query_id: query_id.to_string(), step_id: step.id.clone() });
            }
            if let Some(limit) = options.limit {
                base.table = pq_operators::slice::take(&base.table, limit)?;
            }
            base.meta.query_id = query_id.to_string();
            base.meta.output_schema = base.table.columns().to_vec();
            base.meta.output_row_count = base.table.row_count();
            base.meta.completed_at = self.session.now;
            return Ok(base);
        }

        // step 2: cache lookup
        let cache_key = self.signature_for(&query, options, &mut Vec::new());
        if !matches!(options.cache_mode, CacheMode::Bypass | CacheMode::Refresh) {
            if let (Some(key), Some(store)) = (&cache_key, self.ctx.cache_store.as_ref()) {
                if let Some(value) = store.get(key) {
                    match serde_json::from_value::<CachedResult>(value) {
                        Ok(cached) => {
                            if self.validate_cached(&cached.meta, &query, options, cancel)? {
                                on_event(ProgressEvent::CacheHit { query_id: query_id.to_string() });
                                let mut meta = cached.meta;
                                meta.cache = Some(CacheMeta { key: key.clone(), hit: true });
                                return Ok(QueryExecutionResult { table: cached.table, meta });
                            }
                        }
                        Err(_err) => {
                            #[cfg(feature = "tracing")]
                            tracing::warn!(query_id, cache_key = %key, error = %_err, "cached entry failed to deserialize, evicting");
                            store.delete(key)
                        }
                    }
                }
            }
            on_event(ProgressEvent::CacheMiss { query_id: query_id.to_string() });
        }

        // step 3: fold
        self.emit_privacy_diagnostics(&query, on_event);
        let connector_id = connector_id_for_source(&query.source);
        let fold_plan = if options.fold { self.build_fold_plan(&query, connector_id, cancel)? } else { None };
        let local_offset = fold_plan.as_ref().map(FoldPlan::local_step_offset).unwrap_or(0);

        // step 4: load source
        let (mut table, connector_meta) = self.load_source(&query, query_id, connector_id, &fold_plan, cancel, on_event)?;
        let mut sources = Vec::new();
        sources.extend(connector_meta);

        // step 5: run remaining steps
        for step in &query.steps[local_offset..] {
            cancel.check()?;
            #[cfg(feature = "tracing")]
            tracing::debug!(query_id, step_id = %step.id, "executing step");
            on_event(ProgressEvent::StepStart { query_id: query_id.to_string(), step_id: step.id.clone() });
            let deps = self.resolve_step_dependencies(&query, step, options, cancel, on_event, stack, &mut sources)?;
            table = self.apply_step(&table, step, &deps, query_id, on_event)?;
            on_event(ProgressEvent::StepComplete { query_id: query_id.to_string(), step_id: step.id.clone() });
        }

        // step 6: limit
        if let Some(limit) = options.limit {
            table = pq_operators::slice::take(&table, limit)?;
        }

        // step 7: metadata
        let completed_at = self.session.now;
        let dialect = match &query.source {
            QuerySource::Database { dialect, .. } => *dialect,
            _ => None,
        };
        let folding = fold_plan.as_ref().map(|p| p.record(dialect)).unwrap_or(FoldingRecord::None);
        let meta = QueryExecutionMeta {
            query_id: query_id.to_string(),
            started_at,
            completed_at,
            refreshed_at: completed_at,
            sources,
            output_schema: table.columns().to_vec(),
            output_row_count: table.row_count(),
            cache: cache_key.clone().map(|key| CacheMeta { key, hit: false }),
            folding,
        };
        let result = QueryExecutionResult { table, meta };

        // step 8: cache set
        if let (Some(key), Some(store)) = (&cache_key, self.ctx.cache_store.as_ref()) {
            let envelope: CachedResult = result.clone().into();
            if let Ok(value) = serde_json::to_value(&envelope) {
                store.set(key, value, SetOptions::default());
                on_event(ProgressEvent::CacheSet { query_id: query_id.to_string() });
            }
        }

        Ok(result)
    }

    fn apply_step(
        &self,
        table: &Table,
        step: &QueryStep,
        deps: &Dependencies,
        query_id: &str,
        on_event: &mut dyn FnMut(ProgressEvent),
    ) -> Result<Table, PqError> {
        let options = StreamingOptions::default();
        run_wide_op(table, &step.operation, deps, &options, &mut |event| match event {
            StreamEvent::Batch { rows } => on_event(ProgressEvent::StreamBatch { query_id: query_id.to_string(), step_id: step.id.clone(), rows }),
            StreamEvent::Spill { operator } => {
                on_event(ProgressEvent::StreamSpill { query_id: query_id.to_string(), step_id: step.id.clone(), operator: operator.to_string() })
            }
        })
    }

    /// Recurses into a `merge`/`append` step's right-hand queries, folding
    /// their already-published result into `deps` and enforcing the
    /// privacy firewall (§5, §7's `PrivacyBlocked`: fatal for the
    /// operation) before the combine is allowed to run at all.
    fn resolve_step_dependencies(
        &self,
        query: &Query,
        step: &QueryStep,
        options: &ExecutionOptions,
        cancel: &CancelToken,
        on_event: &mut dyn FnMut(ProgressEvent),
        stack: &mut Vec<QueryId>,
        sources: &mut Vec<ConnectorMeta>,
    ) -> Result<Dependencies, PqError> {
        let mut deps = Dependencies::new();
        let right_ids: Vec<QueryId> = match &step.operation {
            QueryOperation::Merge(spec) => vec![spec.right_query.clone()],
            QueryOperation::Append { query_ids } => query_ids.clone(),
            _ => return Ok(deps),
        };
        let left_ids: Vec<String> = sources.iter().map(|m| m.provenance.source_id.clone()).collect();
        for right_id in right_ids {
            let right_result = self.execute_inner(&right_id, options, cancel, on_event, stack)?;
            let right_ids_for_privacy: Vec<String> = right_result.meta.sources.iter().map(|m| m.provenance.source_id.clone()).collect();
            for l in &left_ids {
                for r in &right_ids_for_privacy {
                    if !self.ctx.privacy.may_combine(l, r) {
                        let reason = format!("sources '{l}' and '{r}' have disparate privacy levels");
                        on_event(ProgressEvent::PrivacyFirewall { query_id: query.id.clone(), step_id: step.id.clone(), reason: reason.clone() });
                        return Err(PqError::PrivacyBlocked(reason));
                    }
                }
            }
            sources.extend(right_result.meta.sources.iter().cloned());
            deps.insert(right_id, right_result.table);
        }
        Ok(deps)
    }

    /// Upfront check (§4.6's folding-time privacy diagnostic): for a
    /// `Database` source, a sibling `merge`/`append` that targets the same
    /// connection but a privacy-disparate one is flagged before folding or
    /// execution is attempted at all, since folding it would hide the
    /// combine from the engine's own enforcement in
    /// `resolve_step_dependencies`.
    fn emit_privacy_diagnostics(&self, query: &Query, on_event: &mut dyn FnMut(ProgressEvent)) {
        let QuerySource::Database { connection: left_conn, .. } = &query.source else { return };
        let Some(connector) = connector_id_for_source(&query.source).and_then(|id| self.ctx.connectors.get(id).ok()) else { return };
        let Some(left_identity) = connector.get_connection_identity(left_conn) else { return };
        for step in &query.steps {
            let right_ids: Vec<&QueryId> = match &step.operation {
                QueryOperation::Merge(spec) => vec![&spec.right_query],
                QueryOperation::Append { query_ids } => query_ids.iter().collect(),
                _ => continue,
            };
            for right_id in right_ids {
                let Some(right) = self.ctx.queries.get(right_id) else { continue };
                let QuerySource::Database { connection: right_conn, .. } = &right.source else { continue };
                let Some(right_identity) = connector.get_connection_identity(right_conn) else { continue };
                if left_identity == right_identity && !self.ctx.privacy.may_combine(&left_identity, &right_identity) {
                    on_event(ProgressEvent::PrivacyFirewall {
                        query_id: query.id.clone(),
                        step_id: step.id.clone(),
                        reason: format!("sources '{left_identity}' and '{right_identity}' have disparate privacy levels"),
                    });
                }
            }
        }
    }

    fn build_fold_plan(&self, query: &Query, connector_id: Option<&'static str>, cancel: &CancelToken) -> Result<Option<FoldPlan>, PqError> {
        cancel.check()?;
        match &query.source {
            QuerySource::Database { sql: base_sql, dialect: Some(dialect), connection: left_conn, .. } => {
                let connector = connector_id.and_then(|id| self.ctx.connectors.get(id).ok());
                let left_identity = connector.and_then(|c| c.get_connection_identity(left_conn));
                // Best-effort schema discovery (§4.8 step 3): informational only today, no
                // folding decision currently depends on it, but connectors that support it
                // get a chance to warm their own schema cache ahead of a real read.
                if let Some(connector) = connector {
                    let _ = connector.get_schema(&ConnectorRequest::Source(&query.source), &ExecContext {
                        signal: cancel.clone(),
                        credentials: None,
                        now: self.session.now,
                    });
                }
                let resolver = |right_query_id: &QueryId| -> Option<String> {
                    let right = self.ctx.queries.get(right_query_id)?;
                    if !right.steps.is_empty() {
                        return None;
                    }
                    let QuerySource::Database { connection: right_conn, sql: right_sql, .. } = &right.source else {
                        return None;
                    };
                    let connector = connector?;
                    let left_identity = left_identity.as_deref()?;
                    let right_identity = connector.get_connection_identity(right_conn)?;
                    if left_identity != right_identity || !self.ctx.privacy.may_combine(left_identity, &right_identity) {
                        return None;
                    }
                    Some(right_sql.clone())
                };
                let plan = sql::fold_sql_prefix(base_sql, *dialect, &query.steps, &resolver);
                Ok(Some(FoldPlan::Sql(plan)))
            }
            QuerySource::Odata { url, .. } => Ok(Some(FoldPlan::Odata(odata::fold_odata_prefix(url, &query.steps)))),
            _ => Ok(None),
        }
    }

    fn load_source(
        &self,
        query: &Query,
        query_id: &str,
        connector_id: Option<&'static str>,
        fold_plan: &Option<FoldPlan>,
        cancel: &CancelToken,
        on_event: &mut dyn FnMut(ProgressEvent),
    ) -> Result<(Table, Option<ConnectorMeta>), PqError> {
        match &query.source {
            QuerySource::Range { values, has_headers } => Ok((range_to_table(values, *has_headers)?, None)),
            QuerySource::Table { name } => {
                let adapter = self
                    .ctx
                    .table_adapter
                    .as_ref()
                    .ok_or_else(|| PqError::connector_failure("table", "no table adapter registered"))?;
                Ok((adapter.get_table(name)?, None))
            }
            QuerySource::QueryRef { .. } => unreachable!("QueryRef sources are handled in run_query before load_source is called"),
            _ => {
                let connector_id = connector_id.ok_or_else(|| PqError::connector_failure("unknown", "source has no connector mapping"))?;
                let connector = self.ctx.connectors.get(connector_id)?;
                on_event(ProgressEvent::SourceStart { query_id: query_id.to_string(), connector_id: connector_id.to_string() });

                let details = serde_json::json!({ "queryId": query_id });
                let kind = connector.permission_kind().to_string();
                let allowed = self.session.permission(connector_id, &kind, &details, || self.ctx.permission_hook.on_permission_request(&kind, &details));
                if !allowed {
                    return Err(PqError::PermissionDenied { kind });
                }

                let request = self.build_request(query, fold_plan);
                let credentials = self.resolve_credentials(connector_id, &request)?;
                let exec_ctx = ExecContext { signal: cancel.clone(), credentials: credentials.clone(), now: self.session.now };
                let state_ctx = StateContext { signal: cancel.clone(), credentials, known_etag: None, known_source_timestamp: None };
                // Probe freshness ahead of the read so the resulting cache entry carries
                // an ETag/timestamp to validate against later (§4.8 step 4).
                let _ = connector.get_source_state(&request, &state_ctx);

                let outcome = connector.execute(&request, &exec_ctx)?;
                on_event(ProgressEvent::SourceComplete { query_id: query_id.to_string(), connector_id: connector_id.to_string() });
                Ok((outcome.table, Some(outcome.meta)))
            }
        }
    }

    fn build_request<'q>(&self, query: &'q Query, fold_plan: &Option<FoldPlan>) -> ConnectorRequest<'q> {
        match fold_plan {
            Some(FoldPlan::Sql(plan)) if plan.kind != FoldKind::Local => {
                ConnectorRequest::FoldedSql { base: &query.source, sql: plan.sql.clone(), params: plan.params.clone() }
            }
            Some(FoldPlan::Odata(plan)) if plan.kind != FoldKind::Local => ConnectorRequest::FoldedOdata { base: &query.source, url: plan.url.clone() },
            _ => ConnectorRequest::Source(&query.source),
        }
    }

    fn resolve_credentials(&self, connector_id: &str, request: &ConnectorRequest<'_>) -> Result<Option<Credentials>, PqError> {
        let connector = self.ctx.connectors.get(connector_id)?;
        let cache_key = connector.get_cache_key(request);
        let request_key = serde_json::json!({ "connector": connector_id, "key": cache_key });
        Ok(self
            .session
            .credentials(connector_id, &request_key, || self.ctx.credential_hook.on_credential_request(connector_id, &request_key)))
    }

    fn validate_cached(&self, meta: &QueryExecutionMeta, query: &Query, options: &ExecutionOptions, cancel: &CancelToken) -> Result<bool, PqError> {
        if options.validation_mode != ValidationMode::SourceState {
            return Ok(true);
        }
        let Some(connector_id) = connector_id_for_source(&query.source) else { return Ok(true) };
        let Ok(connector) = self.ctx.connectors.get(connector_id) else { return Ok(true) };
        let Some(primary) = meta.sources.first() else { return Ok(true) };

        let request = ConnectorRequest::Source(&query.source);
        let credentials = self.resolve_credentials(connector_id, &request)?;
        let state_ctx = StateContext {
            signal: cancel.clone(),
            credentials,
            known_etag: primary.etag.clone(),
            known_source_timestamp: primary.source_timestamp,
        };
        let fresh = connector.get_source_state(&request, &state_ctx)?;
        let cached_state = CachedSourceState { etag: primary.etag.clone(), source_timestamp: primary.source_timestamp };
        let fresh_state = fresh.map(|s| CachedSourceState { etag: s.etag, source_timestamp: s.source_timestamp });
        Ok(pq_cache::is_still_valid(&cached_state, fresh_state.as_ref()))
    }

    /// Computes a query's cache-key signature without executing it,
    /// recursing into `merge`/`append` dependencies for the bottom-up
    /// `$cacheable` propagation of §4.7. `Range`/`Table`/`QueryRef`
    /// sources have no connector and therefore no stable external
    /// identity to validate a cache entry against — they are always
    /// uncacheable, which falls out naturally from
    /// `connector_id_for_source` returning `None` for them rather than
    /// needing a special case here.
    fn signature_for(&self, query: &Query, options: &ExecutionOptions, stack: &mut Vec<QueryId>) -> Option<String> {
        if stack.iter().any(|id| id == &query.id) {
            return None;
        }
        stack.push(query.id.clone());

        let source_signature = self.source_signature_for(query);
        let step_operations: Vec<serde_json::Value> = query.steps.iter().filter_map(|s| serde_json::to_value(&s.operation).ok()).collect();
        let mut dependencies = Vec::new();
        for step in &query.steps {
            let right_ids: Vec<&QueryId> = match &step.operation {
                QueryOperation::Merge(spec) => vec![&spec.right_query],
                QueryOperation::Append { query_ids } => query_ids.iter().collect(),
                _ => continue,
            };
            for right_id in right_ids {
                let signature = self.ctx.queries.get(right_id).and_then(|right_query| self.signature_for(right_query, options, stack));
                dependencies.push(DependencySignature { query_id: right_id.clone(), signature });
            }
        }

        stack.pop();
        let input = CacheKeyInput {
            source_signature,
            step_operations,
            options: CacheKeyOptions { limit: options.limit, max_step_index: None },
            privacy_mode: options.privacy_mode.clone(),
            dependencies,
        };
        pq_cache::compute_cache_key(&input)
    }

    fn source_signature_for(&self, query: &Query) -> Option<serde_json::Value> {
        let connector_id = connector_id_for_source(&query.source)?;
        let connector = self.ctx.connectors.get(connector_id).ok()?;
        let request = ConnectorRequest::Source(&query.source);
        let connector_cache_key = connector.get_cache_key(&request);
        let credentials = self.resolve_credentials(connector_id, &request).ok()?;
        let credential_id = credentials.and_then(|c| c.credential_id);
        Some(pq_cache::source_signature(connector_cache_key, credential_id.as_deref()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use pq_common::{CancelToken, Column, Predicate, Comparison, CompareOp, Direction, QueryStep, RefreshPolicy, SortKey, Value};
    use pq_connector::testing::StaticConnector;

    use super::*;
    use crate::options::ExecutionOptions;
    use crate::session::QueryExecutionSession;

    fn range_query(id: &str, values: Vec<Vec<Value>>) -> Query {
        Query { id: id.to_string(), name: id.to_string(), source: QuerySource::Range { values, has_headers: true }, steps: vec![], refresh_policy: None }
    }

    #[test]
    fn executes_a_plain_range_query() {
        let mut ctx = ExecutionContext::new();
        ctx.register_query(range_query(
            "q1",
            vec![vec![Value::Text("a".into())], vec![Value::Int(1)], vec![Value::Int(2)]],
        ));
        let session = QueryExecutionSession::new(Utc::now());
        let results = DashMap::new();
        let engine = Engine::new(&ctx, &session, &results);
        let mut events = Vec::new();
        let out = engine.execute("q1", &ExecutionOptions::default(), &CancelToken::new(), &mut |e| events.push(e)).unwrap();
        assert_eq!(out.table.row_count(), 2);
        assert_eq!(out.table.columns()[0].name, "a");
    }

    #[test]
    fn unknown_query_is_reported() {
        let ctx = ExecutionContext::new();
        let session = QueryExecutionSession::new(Utc::now());
        let results = DashMap::new();
        let engine = Engine::new(&ctx, &session, &results);
        let mut events = Vec::new();
        let err = engine.execute("missing", &ExecutionOptions::default(), &CancelToken::new(), &mut |e| events.push(e)).unwrap_err();
        assert!(matches!(err, PqError::UnknownQuery(_)));
    }

    #[test]
    fn self_referencing_query_ref_is_a_cycle() {
        let mut ctx = ExecutionContext::new();
        ctx.register_query(Query {
            id: "q1".to_string(),
            name: "q1".to_string(),
            source: QuerySource::QueryRef { query_id: "q1".to_string() },
            steps: vec![],
            refresh_policy: None,
        });
        let session = QueryExecutionSession::new(Utc::now());
        let results = DashMap::new();
        let engine = Engine::new(&ctx, &session, &results);
        let mut events = Vec::new();
        let err = engine.execute("q1", &ExecutionOptions::default(), &CancelToken::new(), &mut |e| events.push(e)).unwrap_err();
        assert!(matches!(err, PqError::CycleError { .. }));
    }

    #[test]
    fn merge_pulls_dependency_through_query_ref_source() {
        let mut ctx = ExecutionContext::new();
        ctx.register_query(range_query("left", vec![vec![Value::Text("k".into())], vec![Value::Int(1)]]));
        ctx.register_query(range_query(
            "right",
            vec![vec![Value::Text("k".into()), Value::Text("v".into())], vec![Value::Int(1), Value::Text("x".into())]],
        ));
        ctx.register_query(Query {
            id: "merged".to_string(),
            name: "merged".to_string(),
            source: QuerySource::QueryRef { query_id: "left".to_string() },
            steps: vec![QueryStep {
                id: "s1".to_string(),
                name: "merge".to_string(),
                operation: QueryOperation::Merge(pq_common::MergeSpec {
                    right_query: "right".to_string(),
                    join_type: pq_common::JoinType::Inner,
                    left_keys: vec!["k".to_string()],
                    right_keys: vec!["k".to_string()],
                    join_mode: pq_common::JoinMode::Flat,
                    new_column_name: None,
                    right_columns: None,
                    comparer: Some(pq_common::Comparer::Ordinal),
                    comparers: vec![],
                    algorithm_hint: None,
                }),
            }],
            refresh_policy: None,
        });
        let session = QueryExecutionSession::new(Utc::now());
        let results = DashMap::new();
        let engine = Engine::new(&ctx, &session, &results);
        let mut events = Vec::new();
        let out = engine.execute("merged", &ExecutionOptions::default(), &CancelToken::new(), &mut |e| events.push(e)).unwrap();
        assert_eq!(out.table.column_count(), 2);
        assert_eq!(out.table.row_count(), 1);
    }

    #[test]
    fn cache_hit_avoids_a_second_connector_read() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct CountingConnector {
            inner: StaticConnector,
            reads: Arc<AtomicUsize>,
        }
        impl pq_connector::Connector for CountingConnector {
            fn id(&self) -> &str {
                self.inner.id()
            }
            fn permission_kind(&self) -> &str {
                self.inner.permission_kind()
            }
            fn get_cache_key(&self, request: &ConnectorRequest<'_>) -> serde_json::Value {
                self.inner.get_cache_key(request)
            }
            fn execute(&self, request: &ConnectorRequest<'_>, ectx: &ExecContext) -> Result<pq_connector::ConnectorResult, PqError> {
                self.reads.fetch_add(1, Ordering::SeqCst);
                self.inner.execute(request, ectx)
            }
        }

        let table = Table::new(vec![Column::any("a")], vec![vec![Value::Int(1)]]).unwrap();
        let reads = Arc::new(AtomicUsize::new(0));
        let mut ctx = ExecutionContext::new();
        ctx.connectors.register(Arc::new(CountingConnector { inner: StaticConnector::new("file", table).with_etag("v1"), reads: reads.clone() }));
        ctx.cache_store = Some(Arc::new(pq_cache::InMemoryCacheStore::new(Arc::new(pq_cache::SystemClock))));
        ctx.register_query(Query {
            id: "q1".to_string(),
            name: "q1".to_string(),
            source: QuerySource::Csv { path: "x.csv".to_string(), options: Default::default() },
            steps: vec![],
            refresh_policy: None,
        });

        let session = QueryExecutionSession::new(Utc::now());
        let results = DashMap::new();
        let engine = Engine::new(&ctx, &session, &results);

        let mut events = Vec::new();
        engine.execute("q1", &ExecutionOptions::default(), &CancelToken::new(), &mut |e| events.push(e)).unwrap();
        assert_eq!(reads.load(Ordering::SeqCst), 1);

        results.clear();
        let mut events2 = Vec::new();
        let second = engine.execute("q1", &ExecutionOptions::default(), &CancelToken::new(), &mut |e| events2.push(e)).unwrap();
        assert_eq!(reads.load(Ordering::SeqCst), 1);
        assert!(second.meta.cache.as_ref().unwrap().hit);
    }

    #[test]
    fn sort_and_filter_steps_apply_in_order() {
        let mut ctx = ExecutionContext::new();
        ctx.register_query(Query {
            id: "q1".to_string(),
            name: "q1".to_string(),
            source: QuerySource::Range {
                values: vec![
                    vec![Value::Text("n".into())],
                    vec![Value::Int(3)],
                    vec![Value::Int(1)],
                    vec![Value::Int(2)],
                ],
                has_headers: true,
            },
            steps: vec![
                QueryStep {
                    id: "f".to_string(),
                    name: "filter".to_string(),
                    operation: QueryOperation::FilterRows {
                        predicate: Predicate::Comparison(Comparison { column: "n".to_string(), op: CompareOp::Ge, value: Some(Value::Int(2)), case_sensitive: None }),
                    },
                },
                QueryStep {
                    id: "s".to_string(),
                    name: "sort".to_string(),
                    operation: QueryOperation::SortRows { sort_by: vec![SortKey { column: "n".to_string(), direction: Direction::Asc, nulls: pq_common::NullsOrder::Last }] },
                },
            ],
            refresh_policy: None,
        });
        let session = QueryExecutionSession::new(Utc::now());
        let results = DashMap::new();
        let engine = Engine::new(&ctx, &session, &results);
        let mut events = Vec::new();
        let out = engine.execute("q1", &ExecutionOptions::default(), &CancelToken::new(), &mut |e| events.push(e)).unwrap();
        assert_eq!(out.table.row_count(), 2);
        assert_eq!(out.table.cell(0, 0), Value::Int(2));
        assert_eq!(out.table.cell(1, 0), Value::Int(3));
    }

    #[test]
    fn privacy_firewall_blocks_cross_level_merge() {
        let mut ctx = ExecutionContext::new();
        ctx.privacy.classify("file:static", crate::privacy::PrivacyLevel::Private);
        ctx.privacy.classify("http:static", crate::privacy::PrivacyLevel::Organizational);
        ctx.connectors.register(Arc::new(StaticConnector::new("file", Table::new(vec![Column::any("k")], vec![vec![Value::Int(1)]]).unwrap()).with_etag("left")));
        let right_table = Table::new(vec![Column::any("k")], vec![vec![Value::Int(1)]]).unwrap();
        ctx.connectors.register(Arc::new(StaticConnector::new("http", right_table)));

        ctx.register_query(Query {
            id: "left".to_string(),
            name: "left".to_string(),
            source: QuerySource::Csv { path: "left.csv".to_string(), options: Default::default() },
            steps: vec![QueryStep {
                id: "m".to_string(),
                name: "merge".to_string(),
                operation: QueryOperation::Merge(pq_common::MergeSpec {
                    right_query: "right".to_string(),
                    join_type: pq_common::JoinType::Inner,
                    left_keys: vec!["k".to_string()],
                    right_keys: vec!["k".to_string()],
                    join_mode: pq_common::JoinMode::Flat,
                    new_column_name: None,
                    right_columns: None,
                    comparer: Some(pq_common::Comparer::Ordinal),
                    comparers: vec![],
                    algorithm_hint: None,
                }),
            }],
            refresh_policy: None,
        });
        // Point "right" at the "http" connector, whose fixed source_id is
        // "http:static"; classify both left/right provenance ids explicitly
        // for a clean deny.
        ctx.register_query(Query {
            id: "right".to_string(),
            name: "right".to_string(),
            source: QuerySource::Api { url: "https://example.com/right".to_string(), method: None, headers: None, auth: None },
            steps: vec![],
            refresh_policy: None,
        });

        let session = QueryExecutionSession::new(Utc::now());
        let results = DashMap::new();
        let engine = Engine::new(&ctx, &session, &results);
        let mut events = Vec::new();
        let err = engine.execute("left", &ExecutionOptions::default(), &CancelToken::new(), &mut |e| events.push(e)).unwrap_err();
        assert!(matches!(err, PqError::PrivacyBlocked(_)));
        assert!(events.iter().any(|e| matches!(e, ProgressEvent::PrivacyFirewall { .. })));
    }

    // silence unused import warnings in case a future edit trims a test above
    #[allow(dead_code)]
    fn _use(_: RefreshPolicy) {}
}
