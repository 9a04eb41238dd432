use crate::types::Feature;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// One sort key of a query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortBy {
    /// The store's natural (feature id) order.
    Natural,
    /// Natural order reversed.
    Reverse,
    Property { name: String, order: SortOrder },
}

impl SortBy {
    pub fn asc(name: impl Into<String>) -> Self {
        SortBy::Property {
            name: name.into(),
            order: SortOrder::Ascending,
        }
    }

    pub fn desc(name: impl Into<String>) -> Self {
        SortBy::Property {
            name: name.into(),
            order: SortOrder::Descending,
        }
    }

    pub fn property_name(&self) -> Option<&str> {
        match self {
            SortBy::Property { name, .. } => Some(name),
            _ => None,
        }
    }

    fn compare(&self, a: &Feature, b: &Feature) -> Ordering {
        match self {
            SortBy::Natural => a.id().cmp(b.id()),
            SortBy::Reverse => b.id().cmp(a.id()),
            SortBy::Property { name, order } => {
                let ord = a.get(name).compare(b.get(name));
                match order {
                    SortOrder::Ascending => ord,
                    SortOrder::Descending => ord.reverse(),
                }
            }
        }
    }
}

impl fmt::Display for SortBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortBy::Natural => f.write_str("NATURAL"),
            SortBy::Reverse => f.write_str("REVERSE"),
            SortBy::Property { name, order } => {
                let dir = match order {
                    SortOrder::Ascending => "ASC",
                    SortOrder::Descending => "DESC",
                };
                write!(f, "{} {}", name, dir)
            }
        }
    }
}

/// Compare two features over a list of sort keys.
///
/// With `tie_break` set, features that compare equal on every key are
/// ordered by id so that paging over the result is deterministic.
pub fn compare_features(keys: &[SortBy], a: &Feature, b: &Feature, tie_break: bool) -> Ordering {
    let ord = keys
        .iter()
        .map(|k| k.compare(a, b))
        .find(|o| *o != Ordering::Equal)
        .unwrap_or(Ordering::Equal);
    if ord == Ordering::Equal && tie_break {
        a.id().cmp(b.id())
    } else {
        ord
    }
}
