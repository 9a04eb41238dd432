//! Feature records and their attribute values.

use crate::types::envelope::{Coordinate, Envelope};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Stable identity of a feature within its resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeatureId(String);

impl FeatureId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FeatureId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for FeatureId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Simple planar geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Geometry {
    Point(Coordinate),
    LineString(Vec<Coordinate>),
    /// Exterior ring only.
    Polygon(Vec<Coordinate>),
}

impl Geometry {
    pub fn point(x: f64, y: f64) -> Self {
        Geometry::Point(Coordinate::new(x, y))
    }

    pub fn line(coords: &[(f64, f64)]) -> Self {
        Geometry::LineString(coords.iter().map(|&(x, y)| Coordinate::new(x, y)).collect())
    }

    pub fn bounds(&self) -> Option<Envelope> {
        match self {
            Geometry::Point(c) => Some(Envelope::from_coordinate(*c)),
            Geometry::LineString(coords) | Geometry::Polygon(coords) => {
                Envelope::from_coordinates(coords)
            }
        }
    }
}

/// Attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Geometry(Geometry),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_geometry(&self) -> Option<&Geometry> {
        match self {
            Value::Geometry(g) => Some(g),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Float(_) => 2,
            Value::Text(_) => 3,
            Value::Timestamp(_) => 4,
            Value::Geometry(_) => 5,
        }
    }

    /// Total order used for sorting.
    ///
    /// Nulls sort first, integers and floats compare numerically, and values
    /// of unrelated types fall back to a fixed type order. Geometries compare
    /// by the lower-left corner of their bounds.
    pub fn compare(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).total_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.total_cmp(&(*b as f64)),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
            (Value::Geometry(a), Value::Geometry(b)) => match (a.bounds(), b.bounds()) {
                (Some(ea), Some(eb)) => ea
                    .min_x
                    .total_cmp(&eb.min_x)
                    .then(ea.min_y.total_cmp(&eb.min_y)),
                (ea, eb) => ea.is_some().cmp(&eb.is_some()),
            },
            _ => self.rank().cmp(&other.rank()),
        }
    }

    /// Equality with numeric coercion between `Int` and `Float`.
    pub fn loosely_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(_), Value::Float(_)) | (Value::Float(_), Value::Int(_)) => {
                self.compare(other) == Ordering::Equal
            }
            _ => self == other,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Geometry> for Value {
    fn from(v: Geometry) -> Self {
        Value::Geometry(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

/// A typed record: identity plus attribute values keyed by attribute name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    id: FeatureId,
    values: BTreeMap<String, Value>,
    /// Ask the store to keep `id` on insert instead of generating one.
    #[serde(default)]
    use_provided_id: bool,
}

impl Feature {
    pub fn new(id: impl Into<FeatureId>) -> Self {
        Self {
            id: id.into(),
            values: BTreeMap::new(),
            use_provided_id: false,
        }
    }

    /// Builder-style attribute setter.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Mark the id as caller-supplied so the store keeps it on insert.
    pub fn with_provided_id(mut self) -> Self {
        self.use_provided_id = true;
        self
    }

    pub fn id(&self) -> &FeatureId {
        &self.id
    }

    pub fn uses_provided_id(&self) -> bool {
        self.use_provided_id
    }

    pub fn set_id(&mut self, id: FeatureId) {
        self.id = id;
    }

    /// Value of an attribute; absent attributes read as `Null`.
    pub fn get(&self, name: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.values.get(name).unwrap_or(&NULL)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    /// Keep only the named attributes.
    pub fn retain_attributes(&mut self, names: &[String]) {
        self.values.retain(|k, _| names.iter().any(|n| n == k));
    }

    /// Union of the bounds of every geometry attribute.
    pub fn bounds(&self) -> Option<Envelope> {
        self.values
            .values()
            .filter_map(Value::as_geometry)
            .map(Geometry::bounds)
            .fold(None, Envelope::merge)
    }
}
