use crate::error::{GeoAccessError, Result};
use crate::types::envelope::Crs;
use crate::types::feature::{Feature, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Qualified resource name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Name {
    pub namespace: Option<String>,
    pub local: String,
}

impl Name {
    pub fn new(local: impl Into<String>) -> Self {
        Self {
            namespace: None,
            local: local.into(),
        }
    }

    pub fn with_namespace(namespace: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            local: local.into(),
        }
    }

    pub fn local(&self) -> &str {
        &self.local
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}:{}", ns, self.local),
            None => f.write_str(&self.local),
        }
    }
}

impl From<&str> for Name {
    fn from(s: &str) -> Self {
        Name::new(s)
    }
}

/// Attribute binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttributeType {
    Bool,
    Int,
    Float,
    Text,
    Timestamp,
    Geometry,
}

impl AttributeType {
    /// Whether a non-null value can be stored under this binding.
    /// Integers are accepted by float attributes.
    pub fn accepts(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (AttributeType::Bool, Value::Bool(_))
                | (AttributeType::Int, Value::Int(_))
                | (AttributeType::Float, Value::Float(_) | Value::Int(_))
                | (AttributeType::Text, Value::Text(_))
                | (AttributeType::Timestamp, Value::Timestamp(_))
                | (AttributeType::Geometry, Value::Geometry(_))
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDescriptor {
    pub name: String,
    pub binding: AttributeType,
    #[serde(default = "default_nillable")]
    pub nillable: bool,
}

fn default_nillable() -> bool {
    true
}

impl AttributeDescriptor {
    pub fn new(name: impl Into<String>, binding: AttributeType) -> Self {
        Self {
            name: name.into(),
            binding,
            nillable: true,
        }
    }

    pub fn required(mut self) -> Self {
        self.nillable = false;
        self
    }
}

/// Structural description shared by every feature of a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureType {
    name: Name,
    attributes: Vec<AttributeDescriptor>,
    #[serde(default)]
    default_geometry: Option<String>,
    #[serde(default)]
    crs: Option<Crs>,
}

impl FeatureType {
    pub fn new(name: impl Into<Name>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            default_geometry: None,
            crs: None,
        }
    }

    /// Append an attribute; the first geometry attribute becomes the default geometry.
    pub fn with_attribute(mut self, descriptor: AttributeDescriptor) -> Self {
        if descriptor.binding == AttributeType::Geometry && self.default_geometry.is_none() {
            self.default_geometry = Some(descriptor.name.clone());
        }
        self.attributes.push(descriptor);
        self
    }

    pub fn attribute(self, name: impl Into<String>, binding: AttributeType) -> Self {
        self.with_attribute(AttributeDescriptor::new(name, binding))
    }

    pub fn with_crs(mut self, crs: Crs) -> Self {
        self.crs = Some(crs);
        self
    }

    pub fn with_name(mut self, name: Name) -> Self {
        self.name = name;
        self
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn type_name(&self) -> &str {
        &self.name.local
    }

    pub fn attributes(&self) -> &[AttributeDescriptor] {
        &self.attributes
    }

    pub fn descriptor(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn default_geometry(&self) -> Option<&str> {
        self.default_geometry.as_deref()
    }

    pub fn crs(&self) -> Option<&Crs> {
        self.crs.as_ref()
    }

    /// Check a value against the named attribute.
    pub fn check_value(&self, attribute: &str, value: &Value) -> Result<()> {
        let descriptor = self.descriptor(attribute).ok_or_else(|| {
            GeoAccessError::InvalidArgument(format!(
                "{} has no attribute '{}'",
                self.name, attribute
            ))
        })?;
        if value.is_null() {
            if descriptor.nillable {
                return Ok(());
            }
            return Err(GeoAccessError::InvalidArgument(format!(
                "attribute '{}' of {} is not nillable",
                attribute, self.name
            )));
        }
        if !descriptor.binding.accepts(value) {
            return Err(GeoAccessError::InvalidArgument(format!(
                "attribute '{}' of {} expects {:?}, got {:?}",
                attribute, self.name, descriptor.binding, value
            )));
        }
        Ok(())
    }

    /// Validate a whole feature: no unknown attributes, required attributes present.
    pub fn validate(&self, feature: &Feature) -> Result<()> {
        for (name, value) in feature.values() {
            self.check_value(name, value)?;
        }
        for descriptor in self.attributes.iter().filter(|a| !a.nillable) {
            if feature.get(&descriptor.name).is_null() {
                return Err(GeoAccessError::InvalidArgument(format!(
                    "feature {} is missing required attribute '{}'",
                    feature.id(),
                    descriptor.name
                )));
            }
        }
        Ok(())
    }

    /// A copy restricted to the named attributes, in the requested order.
    pub fn retype(&self, names: &[String]) -> Result<FeatureType> {
        let mut attributes = Vec::with_capacity(names.len());
        for name in names {
            let descriptor = self.descriptor(name).ok_or_else(|| {
                GeoAccessError::InvalidArgument(format!(
                    "{} has no attribute '{}'",
                    self.name, name
                ))
            })?;
            attributes.push(descriptor.clone());
        }
        let default_geometry = self
            .default_geometry
            .as_ref()
            .filter(|g| names.contains(g))
            .cloned();
        Ok(FeatureType {
            name: self.name.clone(),
            attributes,
            default_geometry,
            crs: self.crs.clone(),
        })
    }
}
