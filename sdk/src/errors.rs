//! Error types and handling
//!
//! This module provides the error taxonomy shared by the Sophie engine.
//! All errors implement the `SophieErrorExt` trait which provides a
//! user-facing hint that is safe to speak aloud.
//!
//! # Categories
//!
//! - **Configuration**: missing or invalid settings, missing credentials.
//!   A missing credential disables the collaborator that needs it; every
//!   other command keeps working.
//! - **Validation**: malformed operation specs, disallowed operations.
//!   Returned as structured results, never crashes the loop.
//! - **Transient service**: network, speech or model failures. Surfaced as
//!   a fixed apologetic response, no automatic retry.
//! - **Persistence**: durable write failures. Logged, the in-memory state is
//!   kept and the next write retries.
//!
//! # Examples
//!
//! ```
//! use sdk::errors::{EngineError, SophieErrorExt};
//!
//! let error = EngineError::OperationNotAllowed("delete_sheet".to_string());
//! assert_eq!(error.user_hint(), "This operation is not permitted");
//! ```

use thiserror::Error;

/// Trait for Sophie error extensions
pub trait SophieErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint is safe to speak aloud: no secrets, no file paths.
    fn user_hint(&self) -> &str;
}

/// Main engine error type
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing credential: {0}")]
    MissingCredential(String),

    // Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Operation not allowed: {0}")]
    OperationNotAllowed(String),

    #[error("A document path is required")]
    FileRequired,

    #[error("Document not found: {0:?}")]
    FileNotFound(std::path::PathBuf),

    // Transient service errors
    #[error("Service error: {0}")]
    TransientService(String),

    #[error("Call to {0} timed out")]
    Timeout(String),

    // Persistence errors
    #[error("Persistence error: {0}")]
    Persistence(String),

    // Keyring errors
    #[error("Keyring error: {0}")]
    KeyringError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SophieErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",
            Self::MissingCredential(_) => "Set the required API key to enable this feature",

            Self::Validation(_) => "The request was malformed. Check its format",
            Self::OperationNotAllowed(_) => "This operation is not permitted",
            Self::FileRequired => "Specify which document to use",
            Self::FileNotFound(_) => "The document does not exist. Create it first",

            Self::TransientService(_) => "The service is unavailable right now. Try again later",
            Self::Timeout(_) => "The service took too long to respond. Try again",

            Self::Persistence(_) => "Conversation history could not be saved",
            Self::KeyringError(_) => "Failed to access secure storage. Check system keychain",
            Self::Internal(_) => "Something went wrong. Please try again",
        }
    }
}
