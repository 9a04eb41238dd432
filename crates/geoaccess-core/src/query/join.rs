use crate::filter::Filter;
use crate::query::Properties;
use crate::types::{Feature, Value};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinKind {
    Inner,
    Outer,
}

/// Join predicate: `local` on the primary resource equals `foreign` on the
/// joined one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JoinOn {
    pub local: String,
    pub foreign: String,
}

impl JoinOn {
    pub fn new(local: impl Into<String>, foreign: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            foreign: foreign.into(),
        }
    }

    /// Whether a primary and a joined feature satisfy the predicate.
    /// Null never joins.
    pub fn matches(&self, primary: &Feature, joined: &Feature) -> bool {
        let left = primary.get(&self.local);
        let right = joined.get(&self.foreign);
        !matches!(left, Value::Null) && left.loosely_equals(right)
    }
}

/// Secondary resource attached to a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Join {
    type_name: String,
    kind: JoinKind,
    on: JoinOn,
    /// Disambiguates the joined resource when joining a resource to itself.
    alias: Option<String>,
    /// Restricted to the joined resource's own attributes.
    filter: Filter,
    properties: Properties,
}

impl Join {
    pub fn inner(type_name: impl Into<String>, on: JoinOn) -> Self {
        Self::new(type_name, JoinKind::Inner, on)
    }

    pub fn outer(type_name: impl Into<String>, on: JoinOn) -> Self {
        Self::new(type_name, JoinKind::Outer, on)
    }

    fn new(type_name: impl Into<String>, kind: JoinKind, on: JoinOn) -> Self {
        Self {
            type_name: type_name.into(),
            kind,
            on,
            alias: None,
            filter: Filter::Include,
            properties: Properties::All,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_properties<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.properties = Properties::only(names);
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn kind(&self) -> JoinKind {
        self.kind
    }

    pub fn on(&self) -> &JoinOn {
        &self.on
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// The alias when set, otherwise the joined type name.
    pub fn effective_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.type_name)
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }
}
