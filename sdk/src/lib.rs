//! Sophie SDK
//!
//! Shared error taxonomy and wire types for the Sophie assistant.
//! The engine depends on this crate; collaborator adapters can too.

/// Error types and handling
pub mod errors;

/// Operation and search wire types
pub mod types;

// Re-export commonly used types
pub use errors::{EngineError, SophieErrorExt};
pub use types::{OperationSpec, SearchHit};
