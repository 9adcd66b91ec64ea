//! The serializable query IR (§3): `Query`, `QuerySource`, `QueryStep`, and
//! the `QueryOperation` tagged union covering every operator in §4.2/§4.3.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::column::DataType;

pub type QueryId = String;

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub id: QueryId,
    pub name: String,
    pub source: QuerySource,
    #[cfg_attr(feature = "serde", serde(default))]
    pub steps: Vec<QueryStep>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub refresh_policy: Option<RefreshPolicy>,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RefreshPolicy {
    pub enabled: bool,
    pub cron: Option<String>,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", serde(tag = "type", rename_all = "camelCase"))]
pub enum QuerySource {
    Range {
        values: Vec<Vec<crate::value::Value>>,
        has_headers: bool,
    },
    Table {
        name: String,
    },
    Csv {
        path: String,
        #[cfg_attr(feature = "serde", serde(default))]
        options: CsvSourceOptions,
    },
    Json {
        path: String,
        json_path: Option<String>,
    },
    Parquet {
        path: String,
        options: Option<serde_json::Value>,
    },
    Folder {
        path: String,
        opts: Option<serde_json::Value>,
    },
    Database {
        connection_id: Option<String>,
        connection: serde_json::Value,
        sql: String,
        dialect: Option<SqlDialect>,
        columns: Option<Vec<String>>,
    },
    Api {
        url: String,
        method: Option<String>,
        headers: Option<Vec<(String, String)>>,
        auth: Option<serde_json::Value>,
    },
    Odata {
        url: String,
        headers: Option<Vec<(String, String)>>,
        auth: Option<serde_json::Value>,
        rows_path: Option<String>,
    },
    SharePoint {
        site_url: String,
        mode: String,
        opts: Option<serde_json::Value>,
    },
    QueryRef {
        query_id: QueryId,
    },
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CsvSourceOptions {
    pub delimiter: Option<char>,
    pub has_headers: Option<bool>,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum SqlDialect {
    Postgres,
    SqlServer,
    Mysql,
    Sqlite,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct QueryStep {
    pub id: String,
    pub name: String,
    pub operation: QueryOperation,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum Direction {
    Asc,
    Desc,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum NullsOrder {
    First,
    Last,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub column: String,
    pub direction: Direction,
    #[cfg_attr(feature = "serde", serde(default = "default_nulls"))]
    pub nulls: NullsOrder,
}

fn default_nulls() -> NullsOrder {
    NullsOrder::Last
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum AggOp {
    Sum,
    Count,
    Average,
    Min,
    Max,
    CountDistinct,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    pub op: AggOp,
    /// `None` column means `count(*)`.
    pub column: Option<String>,
    pub as_name: Option<String>,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum CompareOp {
    Equals,
    NotEquals,
    Lt,
    Le,
    Gt,
    Ge,
    Contains,
    StartsWith,
    EndsWith,
    IsNull,
    IsNotNull,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub column: String,
    pub op: CompareOp,
    /// Absent for `isNull`/`isNotNull`.
    pub value: Option<crate::value::Value>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub case_sensitive: Option<bool>,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Comparison(Comparison),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum JoinMode {
    Flat,
    Nested,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum JoinAlgorithmHint {
    Dynamic,
    SortMerge,
    LeftHash,
    RightHash,
    PairwiseHash,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum Comparer {
    Ordinal,
    OrdinalIgnoreCase,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct MergeSpec {
    pub right_query: QueryId,
    pub join_type: JoinType,
    pub left_keys: Vec<String>,
    pub right_keys: Vec<String>,
    pub join_mode: JoinMode,
    pub new_column_name: Option<String>,
    pub right_columns: Option<Vec<String>>,
    pub comparer: Option<Comparer>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub comparers: Vec<Comparer>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub algorithm_hint: Option<JoinAlgorithmHint>,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum MissingColumnPolicy {
    Error,
    Ignore,
    UseNull,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum NameCaseOp {
    Upper,
    Lower,
    Trim,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnTransform {
    pub column: String,
    /// Sandboxed per-row/per-value formula text, bound to `_`.
    pub formula: String,
    pub retype: Option<DataType>,
}

/// The operator library's tagged union (§4.2, §4.3). One variant per row
/// of the operator table; `pq-operators` implements `apply` over these.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", serde(tag = "op", rename_all = "camelCase"))]
pub enum QueryOperation {
    SelectColumns { columns: Vec<String> },
    RemoveColumns { columns: Vec<String> },
    RenameColumn { old: String, new: String },
    ReorderColumns { columns: Vec<String>, missing: MissingColumnPolicy },
    ChangeType { column: String, data_type: DataType },
    FilterRows { predicate: Predicate },
    SortRows { sort_by: Vec<SortKey> },
    DistinctRows { columns: Option<Vec<String>> },
    RemoveRowsWithErrors { columns: Option<Vec<String>> },
    GroupBy { keys: Vec<String>, aggs: Vec<Aggregation> },
    AddColumn { name: String, formula: String },
    AddIndexColumn { name: String, initial: i64, increment: i64 },
    CombineColumns { columns: Vec<String>, delimiter: String, new_name: String },
    SplitColumn { column: String, delimiter: String, new_columns: Option<Vec<String>> },
    TransformColumns { transforms: Vec<ColumnTransform> },
    TransformColumnNames { op: NameCaseOp },
    FillDown { columns: Vec<String> },
    ReplaceValues { column: String, find: crate::value::Value, replace: crate::value::Value },
    ReplaceErrorValues { replacements: Vec<(String, crate::value::Value)> },
    PromoteHeaders,
    DemoteHeaders,
    Take { n: usize },
    Skip { n: usize },
    RemoveRows { offset: usize, count: usize },
    Pivot { row_col: String, value_col: String, agg: AggOp },
    Unpivot { columns: Vec<String>, name_col: String, value_col: String },
    Merge(MergeSpec),
    ExpandTableColumn {
        column: String,
        columns: Option<Vec<String>>,
        new_column_names: Option<Vec<String>>,
    },
    Append { query_ids: Vec<QueryId> },
}
