//! Error types for the sessionroute core library.
//!
//! Uses hierarchical domain-specific errors following the thiserror pattern.

use thiserror::Error;

/// Result type alias for sessionroute operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for sessionroute.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source log error
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Record decode error
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Enrichment error
    #[error("Enrich error: {0}")]
    Enrich(#[from] EnrichError),

    /// Routing error
    #[error("Routing error: {0}")]
    Route(#[from] RouteError),

    /// Publish error
    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Shutdown requested
    #[error("Shutdown requested")]
    Shutdown,
}

/// Source log errors.
#[derive(Error, Debug)]
pub enum SourceError {
    /// Failed to connect to broker
    #[error("Connection failed to {broker}: {message}")]
    ConnectionFailed { broker: String, message: String },

    /// Log does not exist
    #[error("Log `{log}` not found: {message}")]
    LogNotFound { log: String, message: String },

    /// Log exists but has no partitions
    #[error("Log `{log}` has zero partitions")]
    NoPartitions { log: String },

    /// Metadata request failed
    #[error("Metadata fetch failed: {0}")]
    Metadata(String),

    /// Watermark request failed for a partition
    #[error("Watermark fetch failed for partition {partition}: {message}")]
    Watermarks { partition: i32, message: String },

    /// Cursor no longer valid; the position it referenced has aged out
    #[error("Cursor expired for partition {partition} at position {position}")]
    CursorExpired { partition: i32, position: i64 },

    /// Position is below the oldest retained record; a resume is not possible
    #[error("Position {position} on partition {partition} is no longer retained")]
    NotRetained { partition: i32, position: i64 },

    /// Fetch failed
    #[error("Fetch failed on partition {partition}: {message}")]
    Fetch { partition: i32, message: String },

    /// Partition assignment error
    #[error("Partition assignment error: {0}")]
    Assignment(String),
}

/// Record decode errors.
///
/// Carries the offending field name (dotted path for nested line items) or
/// the parse position for malformed input.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Payload is not well-formed JSON
    #[error("Malformed payload at line {line}, column {column}: {message}")]
    Malformed {
        line: usize,
        column: usize,
        message: String,
    },

    /// Top-level value is not an object
    #[error("Payload is not a JSON object")]
    NotAnObject,

    /// A required field is absent
    #[error("Missing required field `{field}`")]
    MissingField { field: String },

    /// A field is present but has the wrong type
    #[error("Field `{field}` has wrong type, expected {expected}")]
    WrongType {
        field: String,
        expected: &'static str,
    },

    /// A numeric field is outside its valid range
    #[error("Field `{field}` is out of range: {message}")]
    OutOfRange { field: String, message: String },
}

/// Enrichment errors.
#[derive(Error, Debug)]
pub enum EnrichError {
    /// Quantity aggregation overflowed
    #[error("Quantity sum overflowed at line item {index}")]
    QuantityOverflow { index: usize },
}

/// Routing errors.
#[derive(Error, Debug)]
pub enum RouteError {
    /// A required classification tag is absent from the routing table.
    /// This is a startup-time configuration fault, never a per-record one.
    #[error("Routing table is missing destination for tag `{tag}`")]
    MissingRoute { tag: String },

    /// A routing table entry maps a tag to an empty destination name
    #[error("Routing table has empty destination for tag `{tag}`")]
    EmptyDestination { tag: String },
}

/// Publish errors.
#[derive(Error, Debug)]
pub enum PublishError {
    /// Record could not be serialized for the wire
    #[error("Serialization failed: {0}")]
    Serialize(String),

    /// A single delivery attempt failed
    #[error("Delivery to `{log}` failed: {message}")]
    Delivery { log: String, message: String },

    /// All retry attempts failed; the record is dropped for this run
    #[error("Delivery to `{log}` failed after {attempts} attempts: {message}")]
    RetriesExhausted {
        log: String,
        attempts: u32,
        message: String,
    },
}

// Conversion implementations for external error types

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Config("invalid value".into());
        assert_eq!(err.to_string(), "Configuration error: invalid value");

        let source_err = SourceError::ConnectionFailed {
            broker: "localhost:9092".into(),
            message: "connection refused".into(),
        };
        let err: Error = source_err.into();
        assert!(err.to_string().contains("Connection failed"));
    }

    #[test]
    fn test_decode_error_carries_field() {
        let err = DecodeError::MissingField {
            field: "session_id".into(),
        };
        assert!(err.to_string().contains("session_id"));

        let err = DecodeError::WrongType {
            field: "browse_history[2].quantity".into(),
            expected: "integer or numeric string",
        };
        assert!(err.to_string().contains("browse_history[2].quantity"));
    }

    #[test]
    fn test_route_error() {
        let err = RouteError::MissingRoute {
            tag: "International".into(),
        };
        assert!(err.to_string().contains("International"));
    }

    #[test]
    fn test_publish_error_reports_attempts() {
        let err = PublishError::RetriesExhausted {
            log: "sessions-usa".into(),
            attempts: 3,
            message: "broker unavailable".into(),
        };
        assert!(err.to_string().contains("3 attempts"));
    }
}
