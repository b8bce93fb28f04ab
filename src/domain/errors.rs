//! Domain errors

use thiserror::Error;

/// Errors raised while reading, coercing, or watching the local `.ini`
/// configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration file not found at {0}")]
    FileNotFound(String),

    #[error("required section '{0}' missing from configuration")]
    MissingSection(String),

    #[error("required option '{section}.{option}' missing from configuration")]
    MissingOption { section: String, option: String },

    #[error("failed to parse configuration file: {0}")]
    Parse(#[from] ini::Error),

    #[error("failed to write configuration file: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by the BACnet reader, distinguishing a genuine
/// communication failure from the segmentation-refusal case the reader
/// handles internally via an array-index fallback.
#[derive(Error, Debug)]
pub enum BacnetError {
    #[error("no response from {address} for {object}.{property}")]
    Timeout {
        address: String,
        object: String,
        property: String,
    },

    #[error("device aborted request: {reason}")]
    Abort { reason: AbortReason },

    #[error("device rejected request: {0}")]
    Reject(String),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Subset of BACnet abort reasons the reader cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    SegmentationNotSupported,
    Other,
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbortReason::SegmentationNotSupported => write!(f, "segmentation-not-supported"),
            AbortReason::Other => write!(f, "other"),
        }
    }
}

/// Errors from the property normalizer. Normalization failures are not
/// meant to abort a discovery cycle; callers fold these into
/// [`crate::domain::value_objects::NormalizedValue::not_supported`]
/// rather than propagating them, but the type exists for the cases
/// (tests, logging) that want the detail.
#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("malformed octet string for property '{property}': {reason}")]
    MalformedOctetString { property: String, reason: String },

    #[error("unrecognized value shape for property '{0}'")]
    Unrecognized(String),
}

/// Errors from the document store adapter.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("database connection failed: {0}")]
    Connection(String),

    #[error("database operation failed: {0}")]
    Operation(#[from] mongodb::error::Error),

    #[error("change stream closed without a resume token")]
    MissingResumeToken,
}

/// Top-level error type returned by service cycles and the runtime.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Bacnet(#[from] BacnetError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("object graph io error: {0}")]
    ObjectGraphIo(#[from] std::io::Error),

    #[error("object graph encoding error: {0}")]
    ObjectGraphEncoding(#[from] bincode::Error),

    #[error("device commit failed: {0}")]
    CommitFailed(String),

    #[error("task cancelled")]
    Cancelled,
}
