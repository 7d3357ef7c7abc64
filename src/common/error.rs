//! Error types for keyfleet

use std::net::SocketAddr;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Protocol Errors ===
    #[error("Malformed message: {len} bytes is shorter than the frame header")]
    MalformedMessage { len: usize },

    #[error("Key already owned: {0}")]
    KeyAlreadyOwned(String),

    #[error("Unknown claimant at {0}")]
    UnknownClaimant(SocketAddr),

    // === Caller Errors ===
    #[error("Coordinator is not armed")]
    NotReady,

    #[error("Key too long: {len} bytes (max {max})")]
    KeyTooLong { len: usize, max: usize },

    #[error("Ownership of {key} not settled after {attempts} attempts")]
    OwnershipFailed { key: String, attempts: u32 },

    #[error("Operation cancelled")]
    Cancelled,

    // === Lifecycle Errors ===
    #[error("Coordinator already started")]
    AlreadyStarted,

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // === Network Errors ===
    #[error("HTTP error: {0}")]
    Http(String),

    // === Generic ===
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Operation timeout: {0}")]
    Timeout(String),
}

impl Error {
    /// Is this a retryable error?
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Timeout(_) | Error::NotReady | Error::OwnershipFailed { .. }
        )
    }

    /// Does this error take the coordinator down?
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Io(_))
    }

    /// Convert to HTTP status code
    pub fn to_http_status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Error::KeyTooLong { .. } | Error::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            Error::NotReady | Error::OwnershipFailed { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Error::Timeout(_) | Error::Cancelled => StatusCode::REQUEST_TIMEOUT,
            Error::Http(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e.to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::InvalidConfig(e.to_string())
    }
}
