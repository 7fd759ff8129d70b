//! Query error types
//!
//! Provides structured error handling for every stage of a range query:
//! request validation, memory planning, storage reads, span construction and
//! result accumulation.

use crate::error::{EncodingError, StorageError};
use std::fmt;

/// Query error with context
#[derive(Debug)]
pub struct QueryError {
    /// Error kind for programmatic handling
    pub kind: QueryErrorKind,
    /// Human-readable message
    pub message: String,
    /// Optional source error
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl QueryError {
    /// Create a new query error
    pub fn new(kind: QueryErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Add source error for error chaining
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Create a bad request error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::ValidationError, message)
    }

    /// Create a resource limit error
    pub fn resource_limit(message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::ResourceLimit, message)
    }

    /// Create a data integrity error
    pub fn data_integrity(message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::DataIntegrity, message)
    }

    /// Create an upstream (storage) error
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::Upstream, message)
    }

    /// Create a cancellation error
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::Cancelled, message)
    }

    /// Create a timeout error
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::Timeout, message)
    }

    /// Returns true if retrying with a larger budget or narrower range may help
    pub fn is_resource_limit(&self) -> bool {
        self.kind == QueryErrorKind::ResourceLimit
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for QueryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<StorageError> for QueryError {
    fn from(err: StorageError) -> Self {
        QueryError::upstream("storage read failed").with_source(err)
    }
}

impl From<EncodingError> for QueryError {
    fn from(err: EncodingError) -> Self {
        QueryError::data_integrity(err.to_string()).with_source(err)
    }
}

/// Categories of query errors for programmatic handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Request was malformed (unknown selector, bad sample duration, ...)
    ValidationError,
    /// Memory budget insufficient or a memory reservation failed
    ResourceLimit,
    /// Stored data is inconsistent (out-of-order or mismatched blocks)
    DataIntegrity,
    /// The storage collaborator failed a read
    Upstream,
    /// Query was cancelled by the caller
    Cancelled,
    /// A storage read exceeded its deadline
    Timeout,
}

impl fmt::Display for QueryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryErrorKind::ValidationError => write!(f, "ValidationError"),
            QueryErrorKind::ResourceLimit => write!(f, "ResourceLimit"),
            QueryErrorKind::DataIntegrity => write!(f, "DataIntegrity"),
            QueryErrorKind::Upstream => write!(f, "Upstream"),
            QueryErrorKind::Cancelled => write!(f, "Cancelled"),
            QueryErrorKind::Timeout => write!(f, "Timeout"),
        }
    }
}

/// Result type alias for query operations
pub type QueryResult<T> = std::result::Result<T, QueryError>;
