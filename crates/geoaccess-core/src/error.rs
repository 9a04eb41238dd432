use std::io;
use thiserror::Error;

/// Broad classes of failure a caller can branch on.
///
/// Every [`GeoAccessError`] maps onto exactly one kind, so calling code can
/// decide between aborting, retrying, or asking for other credentials
/// without matching on individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The caller misused the API: mutating an immutable value, using a
    /// closed transaction, passing an argument that does not fit the schema.
    Usage,
    /// The resource does not offer the requested capability (write, lock,
    /// join, reprojection).
    Capability,
    /// A lock held under another authorization prevented the operation.
    Authorization,
    /// The backing storage failed.
    DataSource,
}

#[derive(Error, Debug)]
pub enum GeoAccessError {
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{resource} does not support {capability}")]
    MissingCapability {
        capability: &'static str,
        resource: String,
    },

    #[error("Feature {feature_id} of {type_name} is locked under another authorization")]
    LockConflict {
        type_name: String,
        feature_id: String,
    },

    #[error("Authorization required for feature {feature_id} of {type_name}")]
    Unauthorized {
        type_name: String,
        feature_id: String,
    },

    #[error("Data source error: {message}")]
    DataSource {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, GeoAccessError>;

impl GeoAccessError {
    /// Which class of failure this is.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GeoAccessError::Unsupported(_)
            | GeoAccessError::InvalidArgument(_)
            | GeoAccessError::NotFound(_) => ErrorKind::Usage,
            GeoAccessError::MissingCapability { .. } => ErrorKind::Capability,
            GeoAccessError::LockConflict { .. } | GeoAccessError::Unauthorized { .. } => {
                ErrorKind::Authorization
            }
            GeoAccessError::DataSource { .. }
            | GeoAccessError::Io(_)
            | GeoAccessError::Serialization(_)
            | GeoAccessError::Other(_) => ErrorKind::DataSource,
        }
    }

    /// Wrap a backend failure, keeping it as the error source.
    pub fn data_source<E>(message: impl Into<String>, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        GeoAccessError::DataSource {
            message: message.into(),
            source: Some(Box::new(cause)),
        }
    }

    /// A backend failure with no underlying cause.
    pub fn data_source_msg(message: impl Into<String>) -> Self {
        GeoAccessError::DataSource {
            message: message.into(),
            source: None,
        }
    }

    pub fn missing_capability(capability: &'static str, resource: impl Into<String>) -> Self {
        GeoAccessError::MissingCapability {
            capability,
            resource: resource.into(),
        }
    }
}

impl From<serde_json::Error> for GeoAccessError {
    fn from(err: serde_json::Error) -> Self {
        GeoAccessError::Serialization(err.to_string())
    }
}

// Backends with their own error enums convert into the data source kind so
// callers only ever match one type:
//
// impl From<MyBackendError> for GeoAccessError {
//     fn from(err: MyBackendError) -> Self {
//         GeoAccessError::data_source("my backend failed", err)
//     }
// }
