//! Backend error classification.
//!
//! Backends return a [`BackendError`] tagged with an [`ErrorKind`]; the executor
//! only looks at the kind's [`Severity`] to decide between retry and parking.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How a failed attempt should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// Transient. Worth another automatic attempt.
    Soft,
    /// Permanent given the current state. Needs user action.
    Hard,
}

/// Operational classification of a backend failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Connection refused, reset, DNS failure.
    Network,
    /// The request did not complete in time.
    Timeout,
    /// The origin asked us to slow down.
    RateLimited,
    /// Local store I/O failed while saving downloaded data.
    Storage,
    /// Anything the backend could not classify.
    Unexpected,
    Authentication,
    BadRequest,
    NotFound,
    /// Account, origin or backend wiring is missing or invalid.
    Configuration,
}

impl ErrorKind {
    pub fn severity(self) -> Severity {
        match self {
            ErrorKind::Network
            | ErrorKind::Timeout
            | ErrorKind::RateLimited
            | ErrorKind::Storage
            | ErrorKind::Unexpected => Severity::Soft,
            ErrorKind::Authentication
            | ErrorKind::BadRequest
            | ErrorKind::NotFound
            | ErrorKind::Configuration => Severity::Hard,
        }
    }

    /// Failures that are counted as process-level exceptions, not just bad luck.
    pub fn is_unexpected(self) -> bool {
        matches!(self, ErrorKind::Storage | ErrorKind::Unexpected)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::Timeout => "timeout",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Storage => "storage",
            ErrorKind::Unexpected => "unexpected",
            ErrorKind::Authentication => "authentication",
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Configuration => "configuration",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure returned by a backend operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct BackendError {
    pub kind: ErrorKind,
    pub message: String,
}

impl BackendError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authentication, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    pub fn severity(&self) -> Severity {
        self.kind.severity()
    }
}
