//! Centralized error types for the castbridge core library.
//!
//! Expected runtime conditions (unknown device, no active provider, backend
//! failures during a session) are reported as state snapshots, not errors.
//! The types here cover the remaining contract-level failures:
//! - Defines structured error types using `thiserror`
//! - Provides machine-readable codes for the host transport

use serde::Serialize;
use thiserror::Error;

use crate::provider::BackendError;

/// Trait for error types that provide machine-readable error codes.
///
/// Implement this trait to provide consistent error codes across different
/// error conversion paths.
pub trait ErrorCode {
    /// Returns a machine-readable error code for host responses.
    fn code(&self) -> &'static str;
}

impl ErrorCode for BackendError {
    fn code(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "backend_unavailable",
            Self::Rejected(_) => "backend_rejected",
            Self::InvalidRequest(_) => "backend_invalid_request",
        }
    }
}

/// Application-wide error type for castbridge.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum CastError {
    /// The session actor has shut down (after `dispose`) and can no longer
    /// accept commands.
    #[error("Cast session is closed")]
    SessionClosed,

    /// No provider with the given identifier is registered.
    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    /// Configuration values failed validation.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A vendor backend reported a failure outside of a provider session.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl ErrorCode for CastError {
    fn code(&self) -> &'static str {
        match self {
            Self::SessionClosed => "session_closed",
            Self::ProviderNotFound(_) => "provider_not_found",
            Self::Configuration(_) => "configuration_error",
            Self::Backend(_) => "backend_error",
        }
    }
}

impl From<BackendError> for CastError {
    fn from(err: BackendError) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Convenient Result alias for application-wide operations.
pub type CastResult<T> = Result<T, CastError>;
