use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Free-form configuration bag attached to a query.
///
/// Keys are plain strings; values are JSON so that hints survive
/// serialization of the query that carries them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hints(BTreeMap<String, serde_json::Value>);

impl Hints {
    /// Ask the store to keep caller-supplied feature ids on insert.
    pub const USE_PROVIDED_FID: &'static str = "use_provided_fid";
    /// Always return mandatory attributes even when not requested.
    pub const INCLUDE_MANDATORY_PROPS: &'static str = "include_mandatory_props";
    /// Maximum number of features a store should buffer per fetch.
    pub const FETCH_SIZE: &'static str = "fetch_size";

    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn flag(&self, key: &str) -> bool {
        self.get(key)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_defaults_to_false() {
        let hints = Hints::new().with(Hints::USE_PROVIDED_FID, true).with(Hints::FETCH_SIZE, 100);
        assert!(hints.flag(Hints::USE_PROVIDED_FID));
        assert!(!hints.flag(Hints::INCLUDE_MANDATORY_PROPS));
        assert!(!hints.flag(Hints::FETCH_SIZE));
    }
}
