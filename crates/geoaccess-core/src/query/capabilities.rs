//! What a resource can do natively with a [`Query`](super::Query).
//!
//! Defaults are conservative: no paging, no sorting, no joins, reliable ids
//! and no caller-supplied ids. A consumer falls back to client-side
//! emulation (see [`crate::reader::apply_query`]) for anything not advertised.

use crate::query::{Query, SortBy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

fn default_reliable_fid() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryCapabilities {
    /// Native `start_index` paging. Implies a stable natural order.
    #[serde(default)]
    pub offset_supported: bool,
    #[serde(default)]
    pub natural_order_supported: bool,
    #[serde(default)]
    pub sortable_properties: BTreeSet<String>,
    /// The same record keeps the same id across reads.
    #[serde(default = "default_reliable_fid")]
    pub reliable_fid_supported: bool,
    #[serde(default)]
    pub use_provided_fid_supported: bool,
    #[serde(default)]
    pub join_supported: bool,
    #[serde(default)]
    pub version_supported: bool,
}

impl Default for QueryCapabilities {
    fn default() -> Self {
        Self {
            offset_supported: false,
            natural_order_supported: false,
            sortable_properties: BTreeSet::new(),
            reliable_fid_supported: default_reliable_fid(),
            use_provided_fid_supported: false,
            join_supported: false,
            version_supported: false,
        }
    }
}

impl QueryCapabilities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Paging requires a stable order, so this also turns on natural order.
    pub fn with_offset(mut self, supported: bool) -> Self {
        self.offset_supported = supported;
        if supported {
            self.natural_order_supported = true;
        }
        self
    }

    pub fn with_natural_order(mut self, supported: bool) -> Self {
        self.natural_order_supported = supported;
        self
    }

    pub fn with_sortable<I, S>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sortable_properties
            .extend(properties.into_iter().map(Into::into));
        self
    }

    pub fn with_reliable_fid(mut self, supported: bool) -> Self {
        self.reliable_fid_supported = supported;
        self
    }

    pub fn with_use_provided_fid(mut self, supported: bool) -> Self {
        self.use_provided_fid_supported = supported;
        self
    }

    pub fn with_join(mut self, supported: bool) -> Self {
        self.join_supported = supported;
        self
    }

    pub fn with_version(mut self, supported: bool) -> Self {
        self.version_supported = supported;
        self
    }

    pub fn is_offset_supported(&self) -> bool {
        self.offset_supported
    }

    pub fn is_reliable_fid_supported(&self) -> bool {
        self.reliable_fid_supported
    }

    pub fn is_use_provided_fid_supported(&self) -> bool {
        self.use_provided_fid_supported
    }

    /// Whether every key of `sort_by` can be satisfied natively.
    /// An empty list is always satisfiable.
    pub fn supports_sorting(&self, sort_by: &[SortBy]) -> bool {
        sort_by.iter().all(|key| match key {
            SortBy::Natural | SortBy::Reverse => self.natural_order_supported,
            SortBy::Property { name, .. } => self.sortable_properties.contains(name),
        })
    }

    /// Whether the store can answer `query` without any client-side work on
    /// ordering and paging.
    pub fn handles_natively(&self, query: &Query) -> bool {
        self.supports_sorting(query.sort_by())
            && (query.start_index().is_none() || self.offset_supported)
            && (query.joins().is_empty() || self.join_supported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conservative_defaults() {
        let caps = QueryCapabilities::new();
        assert!(!caps.is_offset_supported());
        assert!(caps.supports_sorting(&[]));
        assert!(caps.supports_sorting(&Vec::new()));
        assert!(!caps.supports_sorting(&[SortBy::asc("name")]));
        assert!(!caps.supports_sorting(&[SortBy::Natural]));
        assert!(caps.is_reliable_fid_supported());
        assert!(!caps.is_use_provided_fid_supported());
    }

    #[test]
    fn test_offset_implies_natural_order() {
        let caps = QueryCapabilities::new().with_offset(true);
        assert!(caps.supports_sorting(&[SortBy::Natural, SortBy::Reverse]));
    }

    #[test]
    fn test_sortable_properties() {
        let caps = QueryCapabilities::new().with_sortable(["name", "lanes"]);
        assert!(caps.supports_sorting(&[SortBy::asc("name"), SortBy::desc("lanes")]));
        assert!(!caps.supports_sorting(&[SortBy::asc("name"), SortBy::asc("width")]));
    }

    #[test]
    fn test_deserialize_keeps_reliable_default() {
        let caps: QueryCapabilities = serde_json::from_str("{}").unwrap();
        assert_eq!(caps, QueryCapabilities::default());
    }

    #[test]
    fn test_handles_natively() {
        let paged = Query::builder("road").start_index(10).build();
        assert!(!QueryCapabilities::new().handles_natively(&paged));
        assert!(QueryCapabilities::new()
            .with_offset(true)
            .handles_natively(&paged));
        assert!(QueryCapabilities::new().handles_natively(&Query::ALL));
    }
}
