//! Sophie Engine Library
//!
//! Session orchestration and command dispatch for the Sophie assistant.
//! Used by both the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Secret management module
pub mod secrets;

/// Bounded, durable conversation memory
pub mod memory;

/// Allowlisted spreadsheet operations
pub mod gateway;

/// LLM provider abstraction layer
pub mod llm;

/// Web search and page summaries
pub mod search;

/// Script detection and translation
pub mod translate;

/// Speech capture and output adapters
pub mod speech;

/// Platform-specific application launching
pub mod platform;

/// Ordered command dispatcher
pub mod dispatch;

/// Input arbitration and the voice state machine
pub mod session;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
