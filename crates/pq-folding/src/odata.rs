//! OData folding (§4.6): `select_columns`, `filter_rows`, `sort_rows`,
//! `take` fold into `$select`/`$filter`/`$orderby`/`$top` query parameters.
//! Everything else stops the fold, same left-to-right prefix rule as SQL.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use pq_common::{CompareOp, Comparison, Direction, Predicate, QueryOperation, QueryStep};

use crate::FoldKind;

/// OData query values use `%20` for spaces but leave separators like `,`
/// readable, matching the wire examples in the spec (`$select=Id,Name`).
const ODATA_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b',')
    .remove(b'.')
    .remove(b'_')
    .remove(b'-')
    .remove(b'\'');

fn encode(s: &str) -> String {
    utf8_percent_encode(s, ODATA_VALUE).to_string()
}

pub struct ODataFoldPlan {
    pub kind: FoldKind,
    /// `base_url` with the folded `$select`/`$filter`/`$orderby`/`$top`
    /// query string appended.
    pub url: String,
    pub local_step_ids: Vec<String>,
    pub local_step_offset: usize,
}

#[derive(Default)]
struct Builder {
    select: Option<Vec<String>>,
    filters: Vec<String>,
    order_by: Vec<(String, Direction)>,
    top: Option<usize>,
}

fn render_filter_comparison(cmp: &Comparison) -> Option<String> {
    let Some(value) = &cmp.value else {
        return match cmp.op {
            CompareOp::IsNull => Some(format!("{} eq null", cmp.column)),
            CompareOp::IsNotNull => Some(format!("{} ne null", cmp.column)),
            _ => None,
        };
    };
    let literal = odata_literal(value);
    Some(match cmp.op {
        CompareOp::Equals => format!("{} eq {literal}", cmp.column),
        CompareOp::NotEquals => format!("{} ne {literal}", cmp.column),
        CompareOp::Lt => format!("{} lt {literal}", cmp.column),
        CompareOp::Le => format!("{} le {literal}", cmp.column),
        CompareOp::Gt => format!("{} gt {literal}", cmp.column),
        CompareOp::Ge => format!("{} ge {literal}", cmp.column),
        CompareOp::Contains => format!("contains({}, {literal})", cmp.column),
        CompareOp::StartsWith => format!("startswith({}, {literal})", cmp.column),
        CompareOp::EndsWith => format!("endswith({}, {literal})", cmp.column),
        CompareOp::IsNull | CompareOp::IsNotNull => return None,
    })
}

fn odata_literal(v: &pq_common::Value) -> String {
    use pq_common::Value;
    match v {
        Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Boolean(b) => b.to_string(),
        other => other.stringify(),
    }
}

fn render_filter(pred: &Predicate) -> Option<String> {
    match pred {
        Predicate::Comparison(cmp) => render_filter_comparison(cmp),
        Predicate::And(preds) => {
            if preds.is_empty() {
                return None;
            }
            let parts: Option<Vec<String>> = preds.iter().map(render_filter).collect();
            Some(format!("({})", parts?.join(" and ")))
        }
        Predicate::Or(preds) => {
            if preds.is_empty() {
                return None;
            }
            let parts: Option<Vec<String>> = preds.iter().map(render_filter).collect();
            Some(format!("({})", parts?.join(" or ")))
        }
        Predicate::Not(inner) => Some(format!("not ({})", render_filter(inner)?)),
    }
}

fn fold_step(builder: &mut Builder, op: &QueryOperation) -> bool {
    match op {
        QueryOperation::SelectColumns { columns } => {
            builder.select = Some(columns.clone());
            true
        }
        QueryOperation::FilterRows { predicate } => match render_filter(predicate) {
            Some(clause) => {
                builder.filters.push(clause);
                true
            }
            None => false,
        },
        QueryOperation::SortRows { sort_by } => {
            builder.order_by = sort_by.iter().map(|k| (k.column.clone(), k.direction)).collect();
            true
        }
        QueryOperation::Take { n } => {
            builder.top = Some(builder.top.map_or(*n, |existing| existing.min(*n)));
            true
        }
        _ => false,
    }
}

pub fn fold_odata_prefix(base_url: &str, steps: &[QueryStep]) -> ODataFoldPlan {
    let mut builder = Builder::default();
    let mut folded = 0;
    for step in steps {
        if fold_step(&mut builder, &step.operation) {
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

    let mut params: Vec<(&'static str, String)> = Vec::new();
    if let Some(cols) = &builder.select {
        if !cols.is_empty() {
            params.push(("$select", encode(&cols.join(","))));
        }
    }
    if !builder.filters.is_empty() {
        params.push(("$filter", encode(&builder.filters.join(" and "))));
    }
    if !builder.order_by.is_empty() {
        let rendered: Vec<String> = builder
            .order_by
            .iter()
            .map(|(c, d)| if *d == Direction::Desc { format!("{c} desc") } else { c.clone() })
            .collect();
        params.push(("$orderby", encode(&rendered.join(","))));
    }
    if let Some(top) = builder.top {
        params.push(("$top", top.to_string()));
    }

    let url = if params.is_empty() {
        base_url.to_string()
    } else {
        let query: Vec<String> = params.iter().map(|(k, v)| format!("{k}={v}")).collect();
        format!("{base_url}?{}", query.join("&"))
    };

    let local_step_ids = steps[folded..].iter().map(|s| s.id.clone()).collect();
    ODataFoldPlan { kind, url, local_step_ids, local_step_offset: folded }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pq_common::{CompareOp, Comparison, Direction, NullsOrder, Predicate, QueryOperation, QueryStep, SortKey, Value};

    fn step(id: &str, op: QueryOperation) -> QueryStep {
        QueryStep { id: id.to_string(), name: id.to_string(), operation: op }
    }

    #[test]
    fn folds_select_filter_sort_take_into_one_url() {
        let steps = vec![
            step("s1", QueryOperation::SelectColumns { columns: vec!["Id".into(), "Name".into()] }),
            step(
                "s2",
                QueryOperation::FilterRows {
                    predicate: Predicate::Comparison(Comparison {
                        column: "Price".into(),
                        op: CompareOp::Gt,
                        value: Some(Value::Int(20)),
                        case_sensitive: None,
                    }),
                },
            ),
            step(
                "s3",
                QueryOperation::SortRows {
                    sort_by: vec![SortKey { column: "Price".into(), direction: Direction::Desc, nulls: NullsOrder::Last }],
                },
            ),
            step("s4", QueryOperation::Take { n: 2 }),
        ];
        let plan = fold_odata_prefix("https://example.com/odata/Products", &steps);
        assert_eq!(plan.kind, FoldKind::Remote);
        assert_eq!(
            plan.url,
            "https://example.com/odata/Products?$select=Id,Name&$filter=Price%20gt%2020&$orderby=Price%20desc&$top=2"
        );
    }
}
