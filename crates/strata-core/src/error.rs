use crate::resource::JsonApiData;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A single field-level validation failure reported by a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Short human-readable summary (usually the field name or rule)
    pub title: String,
    /// Longer explanation of what went wrong
    pub detail: String,
}

impl ValidationError {
    pub fn new(title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            detail: detail.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title, self.detail)
    }
}

/// Unified error type for all persistence operations
#[derive(Error, Debug)]
pub enum Error {
    /// DSL syntax or semantic violation (unknown field, illegal operator,
    /// mixed logical operators, malformed value)
    #[error("Bad query: {message}")]
    BadQuery {
        message: String,
        /// The offending query fragment, when one can be pinpointed
        fragment: Option<String>,
        /// Offending parameter names, when known
        bad_params: Vec<String>,
    },

    /// A point lookup found zero rows, or the backend reported "not found"
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    /// Uniqueness violation on insert; carries the conflicting resource
    /// as raw JSON:API data when the backend supplied it
    #[error("Duplicate resource: {message}")]
    DuplicateResource {
        message: String,
        duplicate: Option<Box<JsonApiData>>,
    },

    /// Storage returned a shape that violates invariants (multiple rows for
    /// a point query, leftover staged data after construction, ...)
    #[error("Corrupt data: {0}")]
    CorruptData(String),

    /// The registry could not resolve a datasource name
    #[error("Unknown datasource: {0}")]
    UnknownDatasource(String),

    /// Public-facing translation of `UnknownDatasource`
    #[error("Unknown resource type: {0}")]
    UnknownResourceType(String),

    /// A resource failed its own validation before a save was attempted
    #[error("Bad input: {message}")]
    BadInput {
        message: String,
        errors: Vec<ValidationError>,
    },

    /// The remote API answered with a 5xx (or otherwise unusable) response
    #[error("Server error: {0}")]
    Server(String),

    /// The remote API rejected the request with a non-404/409 4xx response
    #[error("User error: {0}")]
    User(String),

    /// The request never produced a usable response (connection refused,
    /// TLS failure, malformed URL, ...)
    #[error("Transport error: {0}")]
    Transport(String),

    /// A storage driver failed below the adapter boundary
    #[error("Backend error: {0}")]
    Backend(String),
}

impl Error {
    /// Create a `BadQuery` error with no pinpointed fragment
    pub fn bad_query(message: impl Into<String>) -> Self {
        Error::BadQuery {
            message: message.into(),
            fragment: None,
            bad_params: Vec::new(),
        }
    }

    /// Create a `BadQuery` error citing the offending fragment
    pub fn bad_query_fragment(message: impl Into<String>, fragment: impl Into<String>) -> Self {
        Error::BadQuery {
            message: message.into(),
            fragment: Some(fragment.into()),
            bad_params: Vec::new(),
        }
    }

    /// Create a `BadQuery` error naming the offending parameters
    pub fn bad_query_params(message: impl Into<String>, bad_params: Vec<String>) -> Self {
        Error::BadQuery {
            message: message.into(),
            fragment: None,
            bad_params,
        }
    }

    /// Create a "not found" error with a custom message
    pub fn not_found(message: impl Into<String>) -> Self {
        Error::ResourceNotFound(message.into())
    }

    /// Create a duplicate-resource error carrying the existing resource
    pub fn duplicate(message: impl Into<String>, duplicate: Option<JsonApiData>) -> Self {
        Error::DuplicateResource {
            message: message.into(),
            duplicate: duplicate.map(Box::new),
        }
    }

    /// Create a bad-input error from field-level validation errors
    pub fn bad_input(message: impl Into<String>, errors: Vec<ValidationError>) -> Self {
        Error::BadInput {
            message: message.into(),
            errors,
        }
    }

    /// True if this error means "the thing you looked for does not exist"
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::ResourceNotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
