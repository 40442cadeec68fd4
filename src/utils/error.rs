//! Error types and handling
//!
//! Common error types used across the recorder, plus the closed error
//! taxonomy carried by session finish notifications.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Endpoint resolution failed: {0}")]
    Resolution(String),

    #[error("Capture launch failed: {0}")]
    CaptureLaunch(String),

    #[error("Mux step '{step}' failed: {diagnostic}")]
    MuxStep { step: String, diagnostic: String },

    #[error("Integrity check failed: {0}")]
    Integrity(String),

    #[error("Invalid session transition: {0}")]
    InvalidTransition(String),
}

impl AppError {
    /// Map this error onto the notification taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Resolution(_) => ErrorKind::ResolutionFailure,
            AppError::CaptureLaunch(_) => ErrorKind::CaptureLaunchFailure,
            AppError::MuxStep { .. } => ErrorKind::MuxStepFailure,
            AppError::Integrity(_) => ErrorKind::IntegrityFailure,
            AppError::Io(_) | AppError::Config(_) | AppError::InvalidTransition(_) => {
                ErrorKind::Internal
            }
        }
    }
}

/// Why a capture session failed.
///
/// Liveness timeouts and lock contention are deliberately absent: both are
/// routine negative outcomes, not failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    ResolutionFailure,
    CaptureLaunchFailure,
    MuxStepFailure,
    IntegrityFailure,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::ResolutionFailure => "ResolutionFailure",
            ErrorKind::CaptureLaunchFailure => "CaptureLaunchFailure",
            ErrorKind::MuxStepFailure => "MuxStepFailure",
            ErrorKind::IntegrityFailure => "IntegrityFailure",
            ErrorKind::Internal => "Internal",
        };
        f.write_str(name)
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
