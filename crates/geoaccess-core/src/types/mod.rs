pub mod envelope;
pub mod feature;
pub mod schema;

pub use envelope::{Coordinate, Crs, Envelope};
pub use feature::{Feature, FeatureId, Geometry, Value};
pub use schema::{AttributeDescriptor, AttributeType, FeatureType, Name};
