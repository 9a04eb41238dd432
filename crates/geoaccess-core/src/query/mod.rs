//! Read requests against a feature resource.
//!
//! A [`Query`] is an immutable value. New queries come from a
//! [`QueryBuilder`]; derived queries come from [`Query::to_builder`], which
//! leaves the source query untouched. [`Query::ALL`] and [`Query::FIDS`] are the
//! two canonical constants and can be shared freely across threads.

mod capabilities;
mod hints;
mod join;
mod sort;

pub use capabilities::QueryCapabilities;
pub use hints::Hints;
pub use join::{Join, JoinKind, JoinOn};
pub use sort::{compare_features, SortBy, SortOrder};

use crate::filter::Filter;
use crate::types::Crs;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Attribute projection of a query.
///
/// `All` and `Only(vec![])` are both legal and mean different things: the
/// first returns every attribute, the second returns ids only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Properties {
    All,
    Only(Vec<String>),
}

impl Properties {
    /// Id-only projection.
    pub const NONE: Properties = Properties::Only(Vec::new());

    pub fn only<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Properties::Only(names.into_iter().map(Into::into).collect())
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Properties::All)
    }

    /// The requested names, `None` when every attribute is requested.
    pub fn names(&self) -> Option<&[String]> {
        match self {
            Properties::All => None,
            Properties::Only(names) => Some(names),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Version {
    Latest,
    Index(u32),
    DateTime(DateTime<Utc>),
    Tag(String),
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Version::Latest => f.write_str("LATEST"),
            Version::Index(i) => write!(f, "{}", i),
            Version::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            Version::Tag(tag) => f.write_str(tag),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    type_name: Option<String>,
    namespace: Option<String>,
    alias: Option<String>,
    /// Diagnostic label; not part of equality.
    handle: Option<String>,
    properties: Properties,
    filter: Filter,
    /// `None` means unbounded.
    max_features: Option<usize>,
    start_index: Option<usize>,
    sort_by: Vec<SortBy>,
    version: Option<Version>,
    /// Overrides the CRS the data is reported in; no reprojection happens.
    crs: Option<Crs>,
    /// Reproject results into this CRS.
    crs_reproject: Option<Crs>,
    hints: Hints,
    joins: Vec<Join>,
}

impl Query {
    /// Every feature, every attribute.
    pub const ALL: Query = Query::blank(Properties::All);

    /// Every feature, ids only.
    pub const FIDS: Query = Query::blank(Properties::NONE);

    const fn blank(properties: Properties) -> Query {
        Query {
            type_name: None,
            namespace: None,
            alias: None,
            handle: None,
            properties,
            filter: Filter::Include,
            max_features: None,
            start_index: None,
            sort_by: Vec::new(),
            version: None,
            crs: None,
            crs_reproject: None,
            hints: Hints::new(),
            joins: Vec::new(),
        }
    }

    pub fn builder(type_name: impl Into<String>) -> QueryBuilder {
        QueryBuilder::new().type_name(type_name)
    }

    /// Every feature of `type_name` matching `filter`.
    pub fn filtered(type_name: impl Into<String>, filter: Filter) -> Query {
        Query::builder(type_name).filter(filter).build()
    }

    /// A builder seeded with this query's values.
    pub fn to_builder(&self) -> QueryBuilder {
        QueryBuilder {
            query: self.clone(),
        }
    }

    pub fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }

    /// Whether this query can run against `type_name`. An absent type
    /// name means the consumer's own resource.
    pub fn targets(&self, type_name: &str) -> bool {
        self.type_name.as_deref().map_or(true, |t| t == type_name)
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn handle(&self) -> Option<&str> {
        self.handle.as_deref()
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// The requested names; check [`Query::retrieve_all_properties`] first,
    /// since `None` here means "all".
    pub fn property_names(&self) -> Option<&[String]> {
        self.properties.names()
    }

    pub fn retrieve_all_properties(&self) -> bool {
        self.properties.is_all()
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn max_features(&self) -> Option<usize> {
        self.max_features
    }

    pub fn is_max_features_unlimited(&self) -> bool {
        self.max_features.is_none()
    }

    pub fn start_index(&self) -> Option<usize> {
        self.start_index
    }

    pub fn sort_by(&self) -> &[SortBy] {
        &self.sort_by
    }

    pub fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }

    pub fn crs(&self) -> Option<&Crs> {
        self.crs.as_ref()
    }

    pub fn crs_reproject(&self) -> Option<&Crs> {
        self.crs_reproject.as_ref()
    }

    pub fn hints(&self) -> &Hints {
        &self.hints
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }
}

impl Default for Query {
    fn default() -> Self {
        Query::ALL
    }
}

impl PartialEq for Query {
    fn eq(&self, other: &Self) -> bool {
        self.properties == other.properties
            && self.max_features == other.max_features
            && self.filter == other.filter
            && self.type_name == other.type_name
            && self.version == other.version
            && self.crs == other.crs
            && self.crs_reproject == other.crs_reproject
            && self.sort_by == other.sort_by
            && self.start_index == other.start_index
            && self.namespace == other.namespace
            && self.alias == other.alias
            && self.hints == other.hints
            && self.joins == other.joins
    }
}

// Filters and hints carry floats and JSON, so they stay out of the hash.
// Equal queries still hash equally.
impl Hash for Query {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.properties.hash(state);
        self.max_features.hash(state);
        self.type_name.hash(state);
        self.version.hash(state);
        self.crs.hash(state);
        self.crs_reproject.hash(state);
        self.sort_by.hash(state);
        self.start_index.hash(state);
        self.namespace.hash(state);
        self.alias.hash(state);
        for join in &self.joins {
            join.type_name().hash(state);
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Query[")?;
        if let Some(handle) = &self.handle {
            write!(f, "handle={}, ", handle)?;
        }
        match (&self.namespace, &self.type_name) {
            (Some(ns), Some(t)) => write!(f, "type={}:{}", ns, t)?,
            (None, Some(t)) => write!(f, "type={}", t)?,
            (_, None) => write!(f, "type=<default>")?,
        }
        match &self.properties {
            Properties::All => write!(f, ", properties=*")?,
            Properties::Only(names) => write!(f, ", properties=[{}]", names.join(", "))?,
        }
        write!(f, ", filter={}", self.filter)?;
        if let Some(max) = self.max_features {
            write!(f, ", max={}", max)?;
        }
        if let Some(start) = self.start_index {
            write!(f, ", start={}", start)?;
        }
        if !self.sort_by.is_empty() {
            let keys: Vec<String> = self.sort_by.iter().map(ToString::to_string).collect();
            write!(f, ", sort=[{}]", keys.join(", "))?;
        }
        if let Some(version) = &self.version {
            write!(f, ", version={}", version)?;
        }
        if let Some(crs) = &self.crs {
            write!(f, ", crs={}", crs)?;
        }
        if let Some(crs) = &self.crs_reproject {
            write!(f, ", reproject={}", crs)?;
        }
        for join in &self.joins {
            write!(f, ", join={}", join.effective_name())?;
        }
        write!(f, "]")
    }
}

/// Assembles a [`Query`]. Starts from the shape of [`Query::ALL`].
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn type_name(mut self, type_name: impl Into<String>) -> Self {
        self.query.type_name = Some(type_name.into());
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.query.namespace = Some(namespace.into());
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.query.alias = Some(alias.into());
        self
    }

    pub fn handle(mut self, handle: impl Into<String>) -> Self {
        self.query.handle = Some(handle.into());
        self
    }

    pub fn properties<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query.properties = Properties::only(names);
        self
    }

    pub fn all_properties(mut self) -> Self {
        self.query.properties = Properties::All;
        self
    }

    pub fn ids_only(mut self) -> Self {
        self.query.properties = Properties::NONE;
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.query.filter = filter;
        self
    }

    pub fn max_features(mut self, max: usize) -> Self {
        self.query.max_features = Some(max);
        self
    }

    pub fn unlimited(mut self) -> Self {
        self.query.max_features = None;
        self
    }

    pub fn start_index(mut self, start: usize) -> Self {
        self.query.start_index = Some(start);
        self
    }

    /// Append a sort key.
    pub fn sort(mut self, key: SortBy) -> Self {
        self.query.sort_by.push(key);
        self
    }

    /// Replace all sort keys.
    pub fn sort_by(mut self, keys: Vec<SortBy>) -> Self {
        self.query.sort_by = keys;
        self
    }

    pub fn version(mut self, version: Version) -> Self {
        self.query.version = Some(version);
        self
    }

    pub fn crs(mut self, crs: Crs) -> Self {
        self.query.crs = Some(crs);
        self
    }

    pub fn crs_reproject(mut self, crs: Crs) -> Self {
        self.query.crs_reproject = Some(crs);
        self
    }

    pub fn hint(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.query.hints = std::mem::take(&mut self.query.hints).with(key, value);
        self
    }

    pub fn hints(mut self, hints: Hints) -> Self {
        self.query.hints = hints;
        self
    }

    pub fn join(mut self, join: Join) -> Self {
        self.query.joins.push(join);
        self
    }

    pub fn build(self) -> Query {
        self.query
    }
}
