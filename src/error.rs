//! Error types for thingmirror
//!
//! This module provides the error taxonomy used across the crate:
//! - [`Error`] - crate-wide error returned by fallible operations
//! - [`FetchError`] - transport and HTTP status failures from the remote source
//! - [`SnapshotError`] - failures of on-disk snapshot naming and rotation
//!
//! Failures are never allowed to escape the processing of a single artifact;
//! the sync engine converts them into a logged [`SyncOutcome::Failed`](crate::types::SyncOutcome).

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for thingmirror operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for thingmirror
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "api_key")
        key: Option<String>,
    },

    /// Remote fetch failed
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Snapshot layout error
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Archive creation or extraction failed
    #[error("archive error: {0}")]
    Archive(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Failures talking to the remote source
///
/// Addresses carried by these variants are already credential-redacted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The remote refused access (HTTP 403, e.g. a takedown)
    #[error("access to {address} is forbidden")]
    Forbidden {
        /// The address that was requested
        address: String,
    },

    /// The remote has no such resource (HTTP 404)
    #[error("{address} was not found")]
    NotFound {
        /// The address that was requested
        address: String,
    },

    /// The remote failed (HTTP 5xx)
    #[error("server error {status} from {address}")]
    ServerError {
        /// The address that was requested
        address: String,
        /// HTTP status code
        status: u16,
    },

    /// Any other non-success status
    #[error("unexpected status {status} from {address}")]
    Status {
        /// The address that was requested
        address: String,
        /// HTTP status code
        status: u16,
    },

    /// Could not connect, or the connection dropped mid-transfer
    #[error("connection error: {0}")]
    Connection(String),

    /// The response body could not be understood
    #[error("invalid response from {address}: {reason}")]
    InvalidResponse {
        /// The address that was requested
        address: String,
        /// What was wrong with the body
        reason: String,
    },
}

/// On-disk snapshot layout errors
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// No free name could be found for a rename target
    #[error("could not find a free name for {path} after {attempts} attempts")]
    RenameExhausted {
        /// The desired target path
        path: PathBuf,
        /// Number of suffixes tried
        attempts: u32,
    },

    /// A path could not be used as a snapshot location
    #[error("invalid path {path}: {reason}")]
    InvalidPath {
        /// The offending path
        path: PathBuf,
        /// Why the path is unusable
        reason: String,
    },
}

impl From<zip::result::ZipError> for Error {
    fn from(e: zip::result::ZipError) -> Self {
        Error::Archive(e.to_string())
    }
}

impl From<walkdir::Error> for Error {
    fn from(e: walkdir::Error) -> Self {
        Error::Archive(format!("failed to walk snapshot directory: {}", e))
    }
}
