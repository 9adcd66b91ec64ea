//! Folds a step prefix into one SQL query (§4.6). Iterates the step list
//! left to right, accumulating into a [`Builder`]; the first step that
//! doesn't fit the supported subset stops the loop, and everything from
//! there on is returned as `local_steps`.

use pq_common::{AggOp, DataType, Direction, QueryId, QueryOperation, QueryStep, SqlDialect, Value};

use super::dialect::{apply_sqlserver_limit, rewrite_placeholders, LimitParamPosition};
use super::expr::{quote_ident, render_arithmetic, render_predicate};
use crate::FoldKind;

/// Lets the fold loop ask "is `right_query` a `Database` source on the
/// same connection as the one I'm folding against?" without pulling a
/// full query graph into this crate. `pq-engine` supplies the closure;
/// it returns the right-hand query's already-rendered SQL text (so a
/// foldable `merge`/`append` can inline it as a subquery) only when the
/// connection identities match.
pub trait SiblingResolver {
    fn same_connection_sql(&self, right_query: &QueryId) -> Option<String>;
}

impl<F: Fn(&QueryId) -> Option<String>> SiblingResolver for F {
    fn same_connection_sql(&self, right_query: &QueryId) -> Option<String> {
        self(right_query)
    }
}

pub struct SqlFoldPlan {
    pub kind: FoldKind,
    pub sql: String,
    pub params: Vec<Value>,
    /// Ids of the steps that must still run locally, in original order.
    pub local_step_ids: Vec<String>,
    /// Index into the original step list where local execution resumes.
    pub local_step_offset: usize,
}

struct Builder {
    base_sql: String,
    select: Option<Vec<String>>, // rendered column expressions; None = SELECT *
    distinct: bool,
    wheres: Vec<String>,
    params: Vec<Value>,
    group_by: Vec<String>,
    select_is_aggregated: bool,
    order_by: Vec<(String, Direction)>,
    limit: Option<usize>,
    offset: Option<usize>,
}

impl Builder {
    fn new(base_sql: &str) -> Self {
        Self {
            base_sql: base_sql.to_string(),
            select: None,
            distinct: false,
            wheres: Vec::new(),
            params: Vec::new(),
            group_by: Vec::new(),
            select_is_aggregated: false,
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    fn render(&self) -> String {
        let select = match &self.select {
            Some(cols) if !cols.is_empty() => cols.join(", "),
            _ => "*".to_string(),
        };
        let distinct = if self.distinct { "DISTINCT " } else { "" };
        let mut sql = format!("SELECT {distinct}{select} FROM ({}) AS _src", self.base_sql);
        if !self.wheres.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.wheres.join(" AND "));
        }
        if !self.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.group_by.join(", "));
        }
        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            let parts: Vec<String> = self
                .order_by
                .iter()
                .map(|(c, d)| format!("{c} {}", if *d == Direction::Asc { "ASC" } else { "DESC" }))
                .collect();
            sql.push_str(&parts.join(", "));
        }
        sql
    }
}

fn sql_type(dt: DataType) -> Option<&'static str> {
    Some(match dt {
        DataType::Text => "TEXT",
        DataType::Number => "DOUBLE PRECISION",
        DataType::Boolean => "BOOLEAN",
        DataType::Date => "DATE",
        DataType::DateTime => "TIMESTAMP",
        DataType::DateTimeZone => "TIMESTAMPTZ",
        DataType::Time => "TIME",
        DataType::Decimal => "DECIMAL",
        DataType::Binary => "BLOB",
        DataType::Any | DataType::Duration => return None,
    })
}

fn agg_fn(op: AggOp) -> &'static str {
    match op {
        AggOp::Sum => "SUM",
        AggOp::Count => "COUNT",
        AggOp::Average => "AVG",
        AggOp::Min => "MIN",
        AggOp::Max => "MAX",
        AggOp::CountDistinct => "COUNT",
    }
}

/// Matches `pq_operators::group::default_agg_name`'s local-execution naming
/// so a hybrid plan's column names agree whether an aggregate folded or ran
/// locally.
fn default_agg_name(op: AggOp, col: Option<&str>) -> String {
    let op_name = match op {
        AggOp::Sum => "sum",
        AggOp::Count => "count",
        AggOp::Average => "average",
        AggOp::Min => "min",
        AggOp::Max => "max",
        AggOp::CountDistinct => "countDistinct",
    };
    match col {
        Some(c) => format!("{op_name} of {c}"),
        None => op_name.to_string(),
    }
}

/// Attempts to fold one step into `builder`. Returns `true` if it folded.
fn fold_step(builder: &mut Builder, op: &QueryOperation, resolver: &dyn SiblingResolver) -> bool {
    match op {
        QueryOperation::SelectColumns { columns } => {
            if builder.select_is_aggregated {
                return false;
            }
            builder.select = Some(columns.iter().map(|c| quote_ident(c)).collect());
            true
        }
        QueryOperation::RenameColumn { old, new } => {
            if builder.select_is_aggregated {
                return false;
            }
            let target = quote_ident(old);
            match &mut builder.select {
                Some(cols) => {
                    if let Some(slot) = cols.iter_mut().find(|c| **c == target) {
                        *slot = format!("{target} AS {}", quote_ident(new));
                        true
                    } else {
                        false
                    }
                }
                None => false,
            }
        }
        QueryOperation::ChangeType { column, data_type } => {
            let Some(ty) = sql_type(*data_type) else { return false };
            let target = quote_ident(column);
            match &mut builder.select {
                Some(cols) => {
                    if let Some(slot) = cols.iter_mut().find(|c| **c == target) {
                        *slot = format!("CAST({target} AS {ty}) AS {target}");
                        true
                    } else {
                        false
                    }
                }
                None => false,
            }
        }
        QueryOperation::FilterRows { predicate } => {
            let mut params = Vec::new();
            match render_predicate(predicate, &mut params) {
                Some(clause) => {
                    builder.wheres.push(clause);
                    builder.params.extend(params);
                    true
                }
                None => false,
            }
        }
        QueryOperation::SortRows { sort_by } => {
            builder.order_by = sort_by.iter().map(|k| (quote_ident(&k.column), k.direction)).collect();
            true
        }
        QueryOperation::GroupBy { keys, aggs } => {
            if builder.select_is_aggregated {
                return false;
            }
            let mut cols: Vec<String> = keys.iter().map(|k| quote_ident(k)).collect();
            for agg in aggs {
                let expr = match &agg.column {
                    Some(c) if agg.op == AggOp::CountDistinct => format!("COUNT(DISTINCT {})", quote_ident(c)),
                    Some(c) => format!("{}({})", agg_fn(agg.op), quote_ident(c)),
                    None => "COUNT(*)".to_string(),
                };
                let alias = agg.as_name.clone().unwrap_or_else(|| default_agg_name(agg.op, agg.column.as_deref()));
                cols.push(format!("{expr} AS {}", quote_ident(&alias)));
            }
            builder.group_by = keys.iter().map(|k| quote_ident(k)).collect();
            builder.select = Some(cols);
            builder.select_is_aggregated = true;
            true
        }
        QueryOperation::Take { n } => {
            builder.limit = Some(builder.limit.map_or(*n, |existing| existing.min(*n)));
            true
        }
        QueryOperation::Skip { n } => {
            builder.offset = Some(builder.offset.unwrap_or(0) + n);
            true
        }
        QueryOperation::RemoveRows { offset, count } => {
            if *offset != 0 {
                return false;
            }
            builder.offset = Some(builder.offset.unwrap_or(0) + count);
            true
        }
        QueryOperation::DistinctRows { columns } => {
            if columns.is_some() {
                return false; // only whole-row DISTINCT folds
            }
            builder.distinct = true;
            true
        }
        QueryOperation::AddColumn { name, formula } => {
            let Some(expr) = render_arithmetic(formula) else { return false };
            match &mut builder.select {
                Some(cols) => {
                    cols.push(format!("{expr} AS {}", quote_ident(name)));
                    true
                }
                None => false,
            }
        }
        QueryOperation::Merge(spec) => {
            let Some(right_sql) = resolver.same_connection_sql(&spec.right_query) else { return false };
            if spec.left_keys.len() != spec.right_keys.len() {
                return false;
            }
            let join_kw = match spec.join_type {
                pq_common::JoinType::Inner => "INNER JOIN",
                pq_common::JoinType::Left => "LEFT JOIN",
                pq_common::JoinType::Right => "RIGHT JOIN",
                pq_common::JoinType::Full => "FULL JOIN",
            };
            let on: Vec<String> = spec
                .left_keys
                .iter()
                .zip(&spec.right_keys)
                .map(|(l, r)| format!("_src.{} = _r.{}", quote_ident(l), quote_ident(r)))
                .collect();
            builder.base_sql = format!(
                "SELECT * FROM ({}) AS _src {join_kw} ({right_sql}) AS _r ON {}",
                builder.base_sql,
                on.join(" AND ")
            );
            true
        }
        QueryOperation::Append { query_ids } => {
            let mut parts = vec![builder.base_sql.clone()];
            for id in query_ids {
                let Some(sql) = resolver.same_connection_sql(id) else { return false };
                parts.push(sql);
            }
            builder.base_sql = parts.join(" UNION ALL ");
            true
        }
        _ => false,
    }
}

/// Folds as much of `steps` as possible into one SQL statement for
/// `dialect`, starting from `base_sql` (the `Database` source's own
/// `sql` field).
pub fn fold_sql_prefix(base_sql: &str, dialect: SqlDialect, steps: &[QueryStep], resolver: &dyn SiblingResolver) -> SqlFoldPlan {
    let mut builder = Builder::new(base_sql);
    let mut folded = 0;
    for step in steps {
        if fold_step(&mut builder, &step.operation, resolver) {
            folded += 1;
        } else {
            break;
        }
    }

    let kind = if folded == 0 {
        FoldKind::Local
    } else if folded == steps.len() {
        FoldKind::Remote
    } else {
        FoldKind::Hybrid
    };

    let mut sql = builder.render();
    let mut params = builder.params.clone();

    match dialect {
        SqlDialect::SqlServer => {
            let (with_limit, pos) = apply_sqlserver_limit(&sql, builder.limit);
            sql = with_limit;
            match pos {
                LimitParamPosition::Front => params.insert(0, Value::Int(builder.limit.unwrap() as i64)),
                LimitParamPosition::Back => params.push(Value::Int(builder.limit.unwrap() as i64)),
                LimitParamPosition::None => {}
            }
            // Offset via SQL Server requires an ORDER BY; best-effort: append
            // OFFSET/FETCH only when the caller already produced an ORDER BY.
            if let Some(offset) = builder.offset {
                if !builder.order_by.is_empty() && !sql.contains("OFFSET") {
                    sql.push_str(" OFFSET ? ROWS");
                    params.push(Value::Int(offset as i64));
                }
            }
        }
        _ => {
            if let Some(limit) = builder.limit {
                sql.push_str(" LIMIT ?");
                params.push(Value::Int(limit as i64));
            }
            if let Some(offset) = builder.offset {
                sql.push_str(" OFFSET ?");
                params.push(Value::Int(offset as i64));
            }
        }
    }

    let sql = rewrite_placeholders(dialect, &sql);

    let local_step_ids = steps[folded..].iter().map(|s| s.id.clone()).collect();
    SqlFoldPlan { kind, sql, params, local_step_ids, local_step_offset: folded }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pq_common::{Comparison, CompareOp, Predicate, QueryOperation, QueryStep, SortKey, NullsOrder};

    fn never_folds(_: &QueryId) -> Option<String> {
        None
    }

    fn step(id: &str, op: QueryOperation) -> QueryStep {
        QueryStep { id: id.to_string(), name: id.to_string(), operation: op }
    }

    #[test]
    fn filters_fold_into_a_where_clause_with_a_param() {
        let steps = vec![step(
            "s1",
            QueryOperation::FilterRows {
                predicate: Predicate::Comparison(Comparison {
                    column: "Region".into(),
                    op: CompareOp::Equals,
                    value: Some(Value::Text("East".into())),
                    case_sensitive: None,
                }),
            },
        )];
        let plan = fold_sql_prefix("SELECT * FROM orders", SqlDialect::Postgres, &steps, &never_folds);
        assert_eq!(plan.kind, FoldKind::Remote);
        assert!(plan.sql.contains("WHERE \"Region\" = $1"));
        assert_eq!(plan.params, vec![Value::Text("East".into())]);
    }

    #[test]
    fn hybrid_plan_stops_at_the_first_nonfoldable_step() {
        // fill_down has no QueryOperation case in fold_step, so it always stops.
        let steps = vec![
            step(
                "s1",
                QueryOperation::FilterRows {
                    predicate: Predicate::Comparison(Comparison {
                        column: "Region".into(),
                        op: CompareOp::Equals,
                        value: Some(Value::Text("East".into())),
                        case_sensitive: None,
                    }),
                },
            ),
            step("s2", QueryOperation::FillDown { columns: vec!["Region".into()] }),
            step(
                "s3",
                QueryOperation::SortRows {
                    sort_by: vec![SortKey { column: "Sales".into(), direction: Direction::Desc, nulls: NullsOrder::Last }],
                },
            ),
        ];
        let plan = fold_sql_prefix("SELECT * FROM orders", SqlDialect::Postgres, &steps, &never_folds);
        assert_eq!(plan.kind, FoldKind::Hybrid);
        assert_eq!(plan.local_step_offset, 1);
        assert_eq!(plan.local_step_ids, vec!["s2".to_string(), "s3".to_string()]);
    }

    #[test]
    fn take_folds_to_a_postgres_limit() {
        let steps = vec![step("s1", QueryOperation::Take { n: 5 })];
        let plan = fold_sql_prefix("SELECT * FROM t", SqlDialect::Postgres, &steps, &never_folds);
        assert!(plan.sql.ends_with("LIMIT $1"));
        assert_eq!(plan.params, vec![Value::Int(5)]);
    }

    #[test]
    fn take_wraps_with_sqlserver_top() {
        let steps = vec![step("s1", QueryOperation::Take { n: 5 })];
        let plan = fold_sql_prefix("SELECT * FROM t", SqlDialect::SqlServer, &steps, &never_folds);
        assert!(plan.sql.starts_with("SELECT TOP (@p1)"));
    }

    #[test]
    fn sqlserver_filter_and_take_keep_params_aligned_with_placeholder_order() {
        let steps = vec![
            step(
                "s1",
                QueryOperation::FilterRows {
                    predicate: Predicate::Comparison(Comparison {
                        column: "Region".into(),
                        op: CompareOp::Equals,
                        value: Some(Value::Text("East".into())),
                        case_sensitive: None,
                    }),
                },
            ),
            step("s2", QueryOperation::Take { n: 5 }),
        ];
        let plan = fold_sql_prefix("SELECT * FROM orders", SqlDialect::SqlServer, &steps, &never_folds);
        assert_eq!(plan.kind, FoldKind::Remote);
        // TOP wraps the whole statement, so its placeholder (@p1) precedes the
        // WHERE clause's (@p2) in the rendered SQL; params must match that order.
        let top_pos = plan.sql.find("@p1").unwrap();
        let where_pos = plan.sql.find("@p2").unwrap();
        assert!(top_pos < where_pos);
        assert_eq!(plan.params, vec![Value::Int(5), Value::Text("East".into())]);
    }
}
