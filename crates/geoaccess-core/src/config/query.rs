use crate::query::QueryCapabilities;
use serde::{Deserialize, Serialize};

/// Which query features a store answers natively
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Native `start_index` paging (default: true)
    #[serde(default = "default_true")]
    pub offset_supported: bool,

    /// Native sorting on any attribute (default: true)
    #[serde(default = "default_true")]
    pub sorting_supported: bool,

    /// Keep caller-supplied feature ids on insert (default: true)
    #[serde(default = "default_true")]
    pub use_provided_fid_supported: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            offset_supported: true,
            sorting_supported: true,
            use_provided_fid_supported: true,
        }
    }
}

impl QueryConfig {
    /// Everything off; results are paged and sorted client-side.
    pub fn minimal() -> Self {
        Self {
            offset_supported: false,
            sorting_supported: false,
            use_provided_fid_supported: false,
        }
    }

    /// Capabilities for a resource with the given attribute names.
    pub fn capabilities<'a, I>(&self, attributes: I) -> QueryCapabilities
    where
        I: IntoIterator<Item = &'a str>,
    {
        let caps = QueryCapabilities::new()
            .with_offset(self.offset_supported)
            .with_natural_order(self.offset_supported || self.sorting_supported)
            .with_use_provided_fid(self.use_provided_fid_supported);
        if self.sorting_supported {
            caps.with_sortable(attributes)
        } else {
            caps
        }
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::SortBy;

    #[test]
    fn test_minimal_capabilities_are_conservative() {
        let caps = QueryConfig::minimal().capabilities(["name"]);
        assert_eq!(caps, QueryCapabilities::default());
    }

    #[test]
    fn test_default_capabilities() {
        let caps = QueryConfig::default().capabilities(["name", "lanes"]);
        assert!(caps.is_offset_supported());
        assert!(caps.supports_sorting(&[SortBy::asc("lanes"), SortBy::Natural]));
        assert!(!caps.supports_sorting(&[SortBy::asc("width")]));
        assert!(caps.is_use_provided_fid_supported());
    }
}
