//! Column identity and typing (§3).

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Any,
    Text,
    Number,
    Boolean,
    Date,
    DateTime,
    DateTimeZone,
    Time,
    Duration,
    Decimal,
    Binary,
}

impl Default for DataType {
    fn default() -> Self {
        DataType::Any
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Column {
    pub name: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub data_type: DataType,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }

    pub fn any(name: impl Into<String>) -> Self {
        Self::new(name, DataType::Any)
    }
}

/// Disambiguate a list of column names by appending `"·N"` to later
/// duplicates, in input order, idempotently (§4.1). The smallest `N >= 2`
/// not already present *anywhere in the output so far* is chosen, so
/// re-running this over an already-unique list is a no-op.
pub fn make_unique_column_names(names: &[String]) -> Vec<String> {
    let mut used: std::collections::HashSet<String> = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(names.len());
    for name in names {
        if used.insert(name.clone()) {
            out.push(name.clone());
            continue;
        }
        let mut n: u32 = 2;
        loop {
            let candidate = format!("{name}\u{00B7}{n}");
            if used.insert(candidate.clone()) {
                out.push(candidate);
                break;
            }
            n += 1;
        }
    }
    out
}
