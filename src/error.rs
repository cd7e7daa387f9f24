//! Error types for Instantly
//!
//! This module defines all error types used throughout the agent core.
//! Uses `thiserror` for ergonomic error handling with automatic `Display` and
//! `Error` trait implementations.
//!
//! Sandbox and registry code never swallow errors: they restore whatever they
//! touched and then propagate. The agent loop additionally turns every tool
//! failure into a terminal event before re-raising it.

use thiserror::Error;

use crate::bus::EventType;

/// The primary error type for Instantly operations.
#[derive(Error, Debug)]
pub enum InstantlyError {
    /// Missing or invalid setup (bad config values, missing working directory, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Lookup of an unregistered tool or unknown record
    #[error("Not found: {0}")]
    NotFound(String),

    /// A tool with the same name is already registered
    #[error("Duplicate name: {0} is already registered")]
    DuplicateName(String),

    /// Malformed tool invocation (unknown operation, missing argument, etc.)
    #[error("Validation error: {0}")]
    Validation(String),

    /// A sandboxed call exceeded its memory, CPU time or file size ceiling
    #[error("Resource limit exceeded: {0}")]
    ResourceLimit(String),

    /// Tool-internal failure
    #[error("Execution error: {0}")]
    Execution(String),

    /// Remote API answered with an error (non-2xx, malformed payload)
    #[error("API error: {0}")]
    Api(String),

    /// LLM provider failure
    #[error("Provider error: {0}")]
    Provider(String),

    /// One or more event listeners failed during dispatch.
    ///
    /// Every listener has run to completion by the time this is returned.
    #[error("Listener error on {event_type}: {}", failures.join("; "))]
    Listener {
        /// Tag of the event being dispatched
        event_type: EventType,
        /// One message per failed listener, in subscription order
        failures: Vec<String>,
    },

    /// Session/task record persistence errors
    #[error("Session error: {0}")]
    Session(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// SQLite errors from the sqlite tool
    #[cfg(feature = "tool-sqlite")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl InstantlyError {
    /// Returns `true` if the failure is transient and the call may be retried.
    ///
    /// Validation, configuration and resource-limit failures are never retried
    /// automatically; the caller decides whether to relax limits and try again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            InstantlyError::Api(_) | InstantlyError::Http(_) | InstantlyError::Provider(_)
        )
    }

    /// Returns `true` for lookups of unknown tools or records.
    pub fn is_not_found(&self) -> bool {
        matches!(self, InstantlyError::NotFound(_))
    }
}

/// A specialized `Result` type for Instantly operations.
pub type Result<T> = std::result::Result<T, InstantlyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = InstantlyError::Config("missing working dir".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing working dir");
    }

    #[test]
    fn test_duplicate_name_display() {
        let err = InstantlyError::DuplicateName("echo".to_string());
        assert_eq!(err.to_string(), "Duplicate name: echo is already registered");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: InstantlyError = io_err.into();
        assert!(matches!(err, InstantlyError::Io(_)));
    }

    #[test]
    fn test_listener_error_lists_every_failure() {
        let err = InstantlyError::Listener {
            event_type: EventType::StateChange,
            failures: vec!["first".into(), "second".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("StateChangeEvent"));
        assert!(msg.contains("first; second"));
    }

    #[test]
    fn test_is_retryable() {
        assert!(InstantlyError::Api("502".into()).is_retryable());
        assert!(InstantlyError::Provider("overloaded".into()).is_retryable());

        assert!(!InstantlyError::Validation("bad op".into()).is_retryable());
        assert!(!InstantlyError::ResourceLimit("cpu".into()).is_retryable());
        assert!(!InstantlyError::Config("x".into()).is_retryable());
        assert!(!InstantlyError::NotFound("x".into()).is_retryable());
    }

    #[test]
    fn test_is_not_found() {
        assert!(InstantlyError::NotFound("missing".into()).is_not_found());
        assert!(!InstantlyError::Execution("boom".into()).is_not_found());
    }

    #[test]
    fn test_result_type() {
        fn returns_result() -> Result<i32> {
            Ok(42)
        }
        assert_eq!(returns_result().unwrap(), 42);
    }
}
