//! Error types for netrecon.
//!
//! Parse errors are fatal and surface before any probing starts. Probe
//! outcomes (closed, filtered, unreachable, TLS refused) are never errors.

use thiserror::Error;

/// Malformed or inconsistent target / port input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("invalid port spec: {0}")]
    InvalidPortSpec(String),
}

/// Errors returned by the scan entry points.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("scan cancelled")]
    Cancelled,

    #[error("scan worker failed: {0}")]
    Worker(String),
}

/// Errors raised while rendering a report to disk.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ParseResult<T> = Result<T, ParseError>;
