//! Crate-wide error type.
//!
//! Mirrors the error kinds of the spec rather than a single opaque
//! `anyhow::Error`: callers that need to branch on "retry later" vs "give
//! up" can match on [`Error`] instead of string-sniffing a message.

use std::fmt;
use std::time::Duration;

/// Network-level failure, sub-discriminated so callers can tell a timeout
/// from a refused connection without parsing text.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("dns resolution failed: {0}")]
    Dns(String),
    #[error("connection refused or reset")]
    ConnectionFailed,
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("operation cancelled")]
    Cancelled,
    #[error(transparent)]
    Other(#[from] reqwest::Error),
}

impl NetworkError {
    /// Classifies a `reqwest::Error` the way the transport needs to: is
    /// this retriable network noise, or something else? `elapsed` is the
    /// wall-clock time the caller actually waited before the error
    /// surfaced, so a timeout reports how long it really took rather than
    /// a placeholder.
    pub fn from_reqwest(err: reqwest::Error, elapsed: Duration) -> Self {
        if err.is_timeout() {
            NetworkError::Timeout(elapsed)
        } else if err.is_connect() {
            NetworkError::ConnectionFailed
        } else {
            NetworkError::Other(err)
        }
    }
}

/// Top-level error type for the crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{context}: invalid input: {message}")]
    InvalidInput { context: &'static str, message: String },

    #[error("{context}: not found")]
    NotFound { context: &'static str },

    #[error("{context}: network error: {source}")]
    Network {
        context: &'static str,
        #[source]
        source: NetworkError,
    },

    #[error("{context}: http {status}: {body_excerpt}")]
    HttpStatus { context: &'static str, status: u16, body_excerpt: String },

    #[error("{context}: rate limiter wait cancelled")]
    RateLimited { context: &'static str },

    #[error("{context}: circuit open for host {host}")]
    CircuitOpen { context: &'static str, host: String },

    #[error("{context}: could not classify protocol for source")]
    ProtocolUnknown { context: &'static str },

    #[error("{context}: decode error: {message}")]
    Decode { context: &'static str, message: String },

    #[error("{context}: cache validator rejected artifact: {message}")]
    ValidationFailed { context: &'static str, message: String },

    #[error("{context}: {failures} of {total} sources failed")]
    Aggregate {
        context: &'static str,
        failures: usize,
        total: usize,
        per_source: Vec<(String, String)>,
    },
}

impl Error {
    pub fn invalid_input(context: &'static str, message: impl Into<String>) -> Self {
        Error::InvalidInput { context, message: message.into() }
    }

    pub fn not_found(context: &'static str) -> Self {
        Error::NotFound { context }
    }

    pub fn network(context: &'static str, source: NetworkError) -> Self {
        Error::Network { context, source }
    }

    pub fn http_status(context: &'static str, status: u16, body_excerpt: impl Into<String>) -> Self {
        Error::HttpStatus { context, status, body_excerpt: body_excerpt.into() }
    }

    pub fn decode(context: &'static str, message: impl fmt::Display) -> Self {
        Error::Decode { context, message: message.to_string() }
    }

    /// `true` for kinds a higher layer may legitimately retry later:
    /// `Network`, `HttpStatus` 429/503/504, and `CircuitOpen`. `RateLimited`
    /// means the caller itself cancelled while waiting for a token, not a
    /// condition retrying would resolve.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Network { .. } | Error::CircuitOpen { .. } => true,
            Error::HttpStatus { status, .. } => matches!(status, 429 | 503 | 504),
            _ => false,
        }
    }

    /// Wraps this error with additional operation context, the way the
    /// spec describes leaf errors bubbling up through `"get provider: …"`
    /// style prefixes — implemented as a fresh context string rather than
    /// string concatenation so `Display` stays structured.
    pub fn with_context(self, context: &'static str) -> Self {
        match self {
            Error::InvalidInput { message, .. } => Error::InvalidInput { context, message },
            Error::NotFound { .. } => Error::NotFound { context },
            Error::Network { source, .. } => Error::Network { context, source },
            Error::HttpStatus { status, body_excerpt, .. } => {
                Error::HttpStatus { context, status, body_excerpt }
            }
            Error::RateLimited { .. } => Error::RateLimited { context },
            Error::CircuitOpen { host, .. } => Error::CircuitOpen { context, host },
            Error::ProtocolUnknown { .. } => Error::ProtocolUnknown { context },
            Error::Decode { message, .. } => Error::Decode { context, message },
            Error::ValidationFailed { message, .. } => Error::ValidationFailed { context, message },
            Error::Aggregate { failures, total, per_source, .. } => {
                Error::Aggregate { context, failures, total, per_source }
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
