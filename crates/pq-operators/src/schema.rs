//! Forward schema propagation (§4.2: "when schema is known... each operator
//! produces the specified successor schema; otherwise the operator may
//! produce an unknown schema"). Operators whose output shape depends on
//! runtime data (`pivot`, the no-`columns` form of `split_column`) or on a
//! dependency table the compiler doesn't have in hand here (`merge`,
//! `append`, `expand_table_column`) return `None` rather than guess.

use pq_common::{Column, DataType, MissingColumnPolicy, NameCaseOp, QueryOperation};

pub fn schema_after(op: &QueryOperation, schema: &[Column]) -> Option<Vec<Column>> {
    use QueryOperation::*;
    match op {
        SelectColumns { columns } => columns
            .iter()
            .map(|name| schema.iter().find(|c| &c.name == name).cloned())
            .collect(),
        RemoveColumns { columns } => Some(schema.iter().filter(|c| !columns.contains(&c.name)).cloned().collect()),
        RenameColumn { old, new } => {
            let mut out = schema.to_vec();
            let c = out.iter_mut().find(|c| &c.name == old)?;
            c.name = new.clone();
            Some(out)
        }
        ReorderColumns { columns, missing } => {
            let mut front = Vec::with_capacity(columns.len());
            for name in columns {
                match schema.iter().find(|c| &c.name == name) {
                    Some(c) => front.push(c.clone()),
                    None => match missing {
                        MissingColumnPolicy::Error => return None,
                        MissingColumnPolicy::Ignore => continue,
                        MissingColumnPolicy::UseNull => front.push(Column::any(name.clone())),
                    },
                }
            }
            let named: std::collections::HashSet<&str> = columns.iter().map(|s| s.as_str()).collect();
            front.extend(schema.iter().filter(|c| !named.contains(c.name.as_str())).cloned());
            Some(front)
        }
        ChangeType { column, data_type } => {
            let mut out = schema.to_vec();
            out.iter_mut().find(|c| &c.name == column)?.data_type = *data_type;
            Some(out)
        }
        FilterRows { .. }
        | SortRows { .. }
        | DistinctRows { .. }
        | RemoveRowsWithErrors { .. }
        | Take { .. }
        | Skip { .. }
        | RemoveRows { .. }
        | FillDown { .. }
        | ReplaceValues { .. }
        | ReplaceErrorValues { .. } => Some(schema.to_vec()),
        AddColumn { name, .. } => {
            let mut out = schema.to_vec();
            out.push(Column::any(name.clone()));
            Some(pq_common::make_unique_column_names(&out.iter().map(|c| c.name.clone()).collect::<Vec<_>>())
                .into_iter()
                .zip(out)
                .map(|(n, c)| Column { name: n, ..c })
                .collect())
        }
        AddIndexColumn { name, .. } => {
            let mut out = schema.to_vec();
            out.push(Column::new(name.clone(), DataType::Number));
            Some(out)
        }
        CombineColumns { columns, new_name, .. } => {
            let mut out: Vec<Column> = schema.iter().filter(|c| !columns.contains(&c.name)).cloned().collect();
            out.push(Column::any(new_name.clone()));
            Some(out)
        }
        SplitColumn { column, new_columns, .. } => {
            let names = new_columns.as_ref()?;
            let idx = schema.iter().position(|c| &c.name == column)?;
            let mut out = schema.to_vec();
            let replacement: Vec<Column> = names.iter().map(Column::any).collect();
            out.splice(idx..=idx, replacement);
            Some(out)
        }
        TransformColumns { transforms } => {
            let mut out = schema.to_vec();
            for t in transforms {
                if let Some(dt) = t.retype {
                    out.iter_mut().find(|c| c.name == t.column)?.data_type = dt;
                }
            }
            Some(out)
        }
        TransformColumnNames { op } => {
            let names: Vec<String> = schema
                .iter()
                .map(|c| match op {
                    NameCaseOp::Upper => c.name.to_uppercase(),
                    NameCaseOp::Lower => c.name.to_lowercase(),
                    NameCaseOp::Trim => c.name.trim().to_string(),
                })
                .collect();
            let names = pq_common::make_unique_column_names(&names);
            Some(names.into_iter().zip(schema).map(|(n, c)| Column::new(n, c.data_type)).collect())
        }
        PromoteHeaders | DemoteHeaders => None,
        Pivot { .. } => None,
        Unpivot { columns, name_col, value_col } => {
            let mut out: Vec<Column> = schema.iter().filter(|c| !columns.contains(&c.name)).cloned().collect();
            out.push(Column::any(name_col.clone()));
            out.push(Column::any(value_col.clone()));
            Some(out)
        }
        GroupBy { keys, aggs } => {
            let mut out: Vec<Column> = keys
                .iter()
                .map(|k| schema.iter().find(|c| &c.name == k).cloned())
                .collect::<Option<_>>()?;
            for a in aggs {
                let name = a.as_name.clone().unwrap_or_else(|| crate::group::default_agg_name(a.op, a.column.as_deref()));
                out.push(Column::new(name, DataType::Number));
            }
            Some(out)
        }
        Merge(_) | ExpandTableColumn { .. } | Append { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pq_common::{AggOp, Aggregation};

    #[test]
    fn select_columns_reorders_schema() {
        let schema = vec![Column::any("a"), Column::any("b")];
        let out = schema_after(&QueryOperation::SelectColumns { columns: vec!["b".into(), "a".into()] }, &schema).unwrap();
        assert_eq!(out[0].name, "b");
    }

    #[test]
    fn group_by_names_aggregation_columns() {
        let schema = vec![Column::any("dept"), Column::any("salary")];
        let op = QueryOperation::GroupBy {
            keys: vec!["dept".into()],
            aggs: vec![Aggregation { op: AggOp::Sum, column: Some("salary".into()), as_name: None }],
        };
        let out = schema_after(&op, &schema).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].name, "sum of salary");
    }

    #[test]
    fn pivot_schema_is_unknown() {
        let schema = vec![Column::any("a")];
        let op = QueryOperation::Pivot { row_col: "a".into(), value_col: "a".into(), agg: AggOp::Sum };
        assert!(schema_after(&op, &schema).is_none());
    }
}
