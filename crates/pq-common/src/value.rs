//! The value domain (§4.1) and its canonical, byte-stable encoding.
//!
//! `Value::value_key` is the backbone of join-key equality, `distinct_rows`,
//! and cache-signature determinism (I5, I6): any two structurally-equal
//! values must produce identical keys, and the encoding must not collide
//! across types (a null never equals a legal piece of text, etc).

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::table::{ITable, Table};

/// Reason carried by an in-cell error sentinel. Unlike `PqError`, this
/// never aborts a pipeline — it travels inside a `Value::Error` cell until
/// `remove_rows_with_errors` or `replace_error_values` handles it.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ErrorValue {
    pub reason: String,
}

impl ErrorValue {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error: {}", self.reason)
    }
}

/// A fixed-point decimal: `mantissa * 10^-scale`. Kept as a home-grown
/// pair rather than pulling in a decimal crate — the canonical form only
/// needs lossless round-tripping and deterministic string rendering.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Decimal {
    pub mantissa: i128,
    pub scale: u8,
}

impl Decimal {
    pub fn new(mantissa: i128, scale: u8) -> Self {
        Self { mantissa, scale }
    }

    pub fn to_f64(self) -> f64 {
        self.mantissa as f64 / 10f64.powi(self.scale as i32)
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scale == 0 {
            return write!(f, "{}", self.mantissa);
        }
        let neg = self.mantissa < 0;
        let abs = self.mantissa.unsigned_abs();
        let s = abs.to_string();
        let scale = self.scale as usize;
        let s = if s.len() <= scale {
            format!("{}{}", "0".repeat(scale - s.len() + 1), s)
        } else {
            s
        };
        let (int_part, frac_part) = s.split_at(s.len() - scale);
        write!(f, "{}{}.{}", if neg { "-" } else { "" }, int_part, frac_part)
    }
}

/// A value in the query engine's data model (§4.1). Every variant has a
/// canonical form; equality/ordering is defined via `value_key` /
/// `partial_cmp`, never via derived struct equality on the floats/dates
/// directly, so null-safety and cross-type rules stay centralized.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Boolean(bool),
    Int(i64),
    Number(f64),
    /// Large integers that don't fit (or shouldn't be coerced into) `i64`.
    BigInt(i128),
    Text(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    /// Date/time with an explicit UTC offset (`datetimezone`).
    DateTimeZone(DateTime<Utc>),
    Time(NaiveTime),
    /// Duration in whole milliseconds (canonical form is UTC-seconds based).
    Duration(chrono::Duration),
    Decimal(Decimal),
    Binary(Vec<u8>),
    Error(ErrorValue),
    Table(Table),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    /// The canonical, byte-stable encoding used for equality, hashing, and
    /// join keys (§4.1). Prefixed per-variant so values of different types
    /// never collide, including the empty-string edge case.
    pub fn value_key(&self) -> String {
        match self {
            Value::Null => "n:\u{0}".to_string(),
            Value::Boolean(b) => format!("b:{b}"),
            Value::Int(i) => format!("#:{}", canonical_number(*i as f64)),
            Value::Number(n) => format!("#:{}", canonical_number(*n)),
            Value::BigInt(i) => format!("#:{i}"),
            Value::Decimal(d) => format!("#:{}", canonical_number(d.to_f64())),
            Value::Text(s) => format!("t:{s}"),
            Value::Date(d) => format!("d:{}", d.and_time(NaiveTime::MIN).and_utc().timestamp()),
            Value::DateTime(dt) => format!("d:{}", dt.and_utc().timestamp()),
            Value::DateTimeZone(dt) => format!("d:{}", dt.timestamp()),
            Value::Time(t) => format!("ti:{}", t.num_seconds_from_midnight()),
            Value::Duration(du) => format!("du:{}", du.num_milliseconds()),
            Value::Binary(b) => format!("bin:{}", hex_encode(b)),
            Value::Error(e) => format!("err:{}", e.reason),
            Value::Table(t) => format!("tbl:{}", table_key(t)),
        }
    }

    /// Null-safe key-equality: `null == null` for join/group/distinct
    /// purposes (I5), unlike `PartialOrd` which places nulls last.
    pub fn key_eq(&self, other: &Value) -> bool {
        self.value_key() == other.value_key()
    }

    /// Case-insensitive key used by `comparer=ordinalIgnoreCase` merges.
    pub fn value_key_ci(&self) -> String {
        match self {
            Value::Text(s) => format!("t:{}", s.to_lowercase()),
            other => other.value_key(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Number(n) => Some(*n),
            Value::BigInt(i) => Some(*i as f64),
            Value::Decimal(d) => Some(d.to_f64()),
            Value::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn stringify(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Boolean(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Number(n) => n.to_string(),
            Value::BigInt(i) => i.to_string(),
            Value::Decimal(d) => d.to_string(),
            Value::Text(s) => s.clone(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::DateTime(dt) => dt.format("%Y-%m-%dT%H:%M:%S").to_string(),
            Value::DateTimeZone(dt) => dt.to_rfc3339(),
            Value::Time(t) => t.format("%H:%M:%S").to_string(),
            Value::Duration(d) => d.num_seconds().to_string(),
            Value::Binary(b) => hex_encode(b),
            Value::Error(e) => e.to_string(),
            Value::Table(t) => format!("Table[{} rows]", t.row_count()),
        }
    }
}

use chrono::Timelike;

fn canonical_number(n: f64) -> String {
    if n == n.trunc() && n.is_finite() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n:e}")
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn table_key(t: &Table) -> String {
    // Length-prefixed sequence of row keys, per §4.1's composite-key rule.
    let mut parts = Vec::with_capacity(t.row_count());
    for row in t.iter_rows() {
        let keyed: Vec<String> = row.iter().map(|v| v.value_key()).collect();
        parts.push(format!("{}|{}", keyed.len(), keyed.join(",")));
    }
    format!("{}#{}", parts.len(), parts.join(";"))
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.value_key() == other.value_key()
    }
}
impl Eq for Value {}

impl PartialOrd for Value {
    /// Partial spreadsheet-style ordering: numbers < text (by Excel's
    /// type-rank convention is ignored here — within like types we compare
    /// naturally); nulls sort last regardless of type (distinct from
    /// `key_eq`, which treats them as equal to each other).
    fn partial_cmp(&self, other: &Value) -> Option<Ordering> {
        use Value::*;
        match (self, other) {
            (Null, Null) => Some(Ordering::Equal),
            (Null, _) => Some(Ordering::Greater),
            (_, Null) => Some(Ordering::Less),
            (Boolean(a), Boolean(b)) => a.partial_cmp(b),
            (Text(a), Text(b)) => a.partial_cmp(b),
            (Binary(a), Binary(b)) => a.partial_cmp(b),
            (Date(a), Date(b)) => a.partial_cmp(b),
            (DateTime(a), DateTime(b)) => a.partial_cmp(b),
            (DateTimeZone(a), DateTimeZone(b)) => a.partial_cmp(b),
            (Time(a), Time(b)) => a.partial_cmp(b),
            (Duration(a), Duration(b)) => a.partial_cmp(b),
            (Error(_), Error(_)) => Some(Ordering::Equal),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => self.stringify().partial_cmp(&other.stringify()),
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.stringify())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}
impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}
impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}
impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}
impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_is_key_equal_to_null() {
        assert!(Value::Null.key_eq(&Value::Null));
    }

    #[test]
    fn null_never_key_equals_text() {
        assert!(!Value::Null.key_eq(&Value::Text(String::new())));
    }

    #[test]
    fn int_and_number_share_a_canonical_key() {
        assert!(Value::Int(4).key_eq(&Value::Number(4.0)));
    }

    #[test]
    fn nulls_sort_last() {
        assert_eq!(
            Value::Null.partial_cmp(&Value::Int(1)),
            Some(Ordering::Greater)
        );
    }

    #[test]
    fn ci_key_lowercases_text_only() {
        assert_eq!(Value::Text("ABC".into()).value_key_ci(), "t:abc");
        assert_eq!(Value::Int(1).value_key_ci(), Value::Int(1).value_key());
    }

    #[test]
    fn decimal_display_round_trips_fraction() {
        let d = Decimal::new(12345, 2);
        assert_eq!(d.to_string(), "123.45");
    }
}
