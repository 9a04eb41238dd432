//! Boolean predicates over features.
//!
//! Stores treat a [`Filter`] as a black box: they call [`Filter::evaluate`]
//! per feature, or translate it into a native query when they can. Id filters
//! are the common currency of locking and change events.

use crate::types::{Envelope, Feature, FeatureId, Value};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Filter {
    /// Matches everything.
    #[default]
    Include,
    /// Matches nothing.
    Exclude,
    /// Matches features whose id is in the set.
    Id(BTreeSet<FeatureId>),
    Compare {
        property: String,
        op: CompareOp,
        value: Value,
    },
    IsNull(String),
    /// Matches features whose geometry bounds intersect the envelope.
    /// `None` means the default geometry, or any geometry when there is none.
    Bbox {
        property: Option<String>,
        envelope: Envelope,
    },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn ids<I, T>(ids: I) -> Filter
    where
        I: IntoIterator<Item = T>,
        T: Into<FeatureId>,
    {
        Filter::Id(ids.into_iter().map(Into::into).collect())
    }

    pub fn compare(property: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Filter {
        Filter::Compare {
            property: property.into(),
            op,
            value: value.into(),
        }
    }

    pub fn equals(property: impl Into<String>, value: impl Into<Value>) -> Filter {
        Filter::compare(property, CompareOp::Eq, value)
    }

    pub fn bbox(envelope: Envelope) -> Filter {
        Filter::Bbox {
            property: None,
            envelope,
        }
    }

    /// Conjunction, folding away `Include` and short-circuiting on `Exclude`.
    pub fn and(self, other: Filter) -> Filter {
        match (self, other) {
            (Filter::Include, f) | (f, Filter::Include) => f,
            (Filter::Exclude, _) | (_, Filter::Exclude) => Filter::Exclude,
            (Filter::And(mut a), Filter::And(b)) => {
                a.extend(b);
                Filter::And(a)
            }
            (Filter::And(mut a), f) => {
                a.push(f);
                Filter::And(a)
            }
            (f, Filter::And(mut b)) => {
                b.insert(0, f);
                Filter::And(b)
            }
            (a, b) => Filter::And(vec![a, b]),
        }
    }

    /// Disjunction, folding away `Exclude` and short-circuiting on `Include`.
    pub fn or(self, other: Filter) -> Filter {
        match (self, other) {
            (Filter::Exclude, f) | (f, Filter::Exclude) => f,
            (Filter::Include, _) | (_, Filter::Include) => Filter::Include,
            (Filter::Or(mut a), Filter::Or(b)) => {
                a.extend(b);
                Filter::Or(a)
            }
            (a, b) => Filter::Or(vec![a, b]),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Filter {
        match self {
            Filter::Include => Filter::Exclude,
            Filter::Exclude => Filter::Include,
            Filter::Not(inner) => *inner,
            f => Filter::Not(Box::new(f)),
        }
    }

    pub fn is_include(&self) -> bool {
        matches!(self, Filter::Include)
    }

    /// The id set when this is a pure id filter.
    pub fn id_set(&self) -> Option<&BTreeSet<FeatureId>> {
        match self {
            Filter::Id(ids) => Some(ids),
            _ => None,
        }
    }

    /// Every property name the filter reads.
    pub fn referenced_properties(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_properties(&mut out);
        out
    }

    fn collect_properties(&self, out: &mut BTreeSet<String>) {
        match self {
            Filter::Compare { property, .. } | Filter::IsNull(property) => {
                out.insert(property.clone());
            }
            Filter::Bbox {
                property: Some(p), ..
            } => {
                out.insert(p.clone());
            }
            Filter::And(fs) | Filter::Or(fs) => fs.iter().for_each(|f| f.collect_properties(out)),
            Filter::Not(f) => f.collect_properties(out),
            _ => {}
        }
    }

    pub fn evaluate(&self, feature: &Feature) -> bool {
        match self {
            Filter::Include => true,
            Filter::Exclude => false,
            Filter::Id(ids) => ids.contains(feature.id()),
            Filter::Compare {
                property,
                op,
                value,
            } => {
                let actual = feature.get(property);
                if actual.is_null() || value.is_null() {
                    // Null never compares, except for inequality with a non-null.
                    return *op == CompareOp::Ne && actual.is_null() != value.is_null();
                }
                let ord = actual.compare(value);
                match op {
                    CompareOp::Eq => actual.loosely_equals(value),
                    CompareOp::Ne => !actual.loosely_equals(value),
                    CompareOp::Lt => ord == Ordering::Less,
                    CompareOp::Le => ord != Ordering::Greater,
                    CompareOp::Gt => ord == Ordering::Greater,
                    CompareOp::Ge => ord != Ordering::Less,
                }
            }
            Filter::IsNull(property) => feature.get(property).is_null(),
            Filter::Bbox { property, envelope } => {
                let bounds = match property {
                    Some(p) => feature.get(p).as_geometry().and_then(|g| g.bounds()),
                    None => feature.bounds(),
                };
                bounds.map_or(false, |b| b.intersects(envelope))
            }
            Filter::And(fs) => fs.iter().all(|f| f.evaluate(feature)),
            Filter::Or(fs) => fs.iter().any(|f| f.evaluate(feature)),
            Filter::Not(f) => !f.evaluate(feature),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Include => f.write_str("INCLUDE"),
            Filter::Exclude => f.write_str("EXCLUDE"),
            Filter::Id(ids) => {
                let ids: Vec<&str> = ids.iter().map(FeatureId::as_str).collect();
                write!(f, "[{}]", ids.join(", "))
            }
            Filter::Compare {
                property,
                op,
                value,
            } => write!(f, "{} {} {:?}", property, op, value),
            Filter::IsNull(p) => write!(f, "{} IS NULL", p),
            Filter::Bbox { property, envelope } => write!(
                f,
                "BBOX({}, {}, {}, {}, {})",
                property.as_deref().unwrap_or("*"),
                envelope.min_x,
                envelope.min_y,
                envelope.max_x,
                envelope.max_y
            ),
            Filter::And(fs) | Filter::Or(fs) => {
                let sep = if matches!(self, Filter::And(_)) {
                    " AND "
                } else {
                    " OR "
                };
                let parts: Vec<String> = fs.iter().map(|x| format!("({})", x)).collect();
                f.write_str(&parts.join(sep))
            }
            Filter::Not(inner) => write!(f, "NOT ({})", inner),
        }
    }
}
