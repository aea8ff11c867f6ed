//! Error types for the LiveView sync client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use mcp_live_sync::{ProtocolSession, Result};
//!
//! async fn example(session: &mut ProtocolSession) -> Result<()> {
//!     session.connect().await?;
//!     session.join().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidInput`] |
//! | Handshake | [`Error::Auth`], [`Error::Network`], [`Error::Connect`] |
//! | Channel | [`Error::Protocol`], [`Error::Timeout`], [`Error::SessionClosed`], [`Error::InvalidState`] |
//! | Payload | [`Error::Extraction`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::MessageRef;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging. None of these are
/// retried internally.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when session configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Invalid converter input.
    ///
    /// Returned when the source document is not a server map.
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// Description of the problem.
        message: String,
    },

    // ========================================================================
    // Handshake Errors
    // ========================================================================
    /// No usable CSRF token after scraping.
    ///
    /// Usually means the session cookie has expired.
    #[error("Authentication failed: {message}")]
    Auth {
        /// Description of the authentication failure.
        message: String,
    },

    /// Transport-level failure during token fetch or connect.
    #[error("Network error: {message}")]
    Network {
        /// Description of the network failure.
        message: String,
    },

    /// Socket reported an error before reaching the open state.
    #[error("Connect failed: {message}")]
    Connect {
        /// Description of the connect failure.
        message: String,
    },

    // ========================================================================
    // Channel Errors
    // ========================================================================
    /// Error reply or missing protocol identifier.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Server-supplied reason or description of the violation.
        message: String,
    },

    /// Correlated request got no reply within its deadline.
    #[error("{operation} (ref {message_ref}) timed out after {timeout_ms}ms")]
    Timeout {
        /// Operation that timed out.
        operation: String,
        /// Reference of the request that timed out.
        message_ref: MessageRef,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Session or socket closed while a request was outstanding.
    #[error("Session closed")]
    SessionClosed,

    /// Operation invoked in a state that does not allow it.
    #[error("Invalid session state: expected {expected}, found {actual}")]
    InvalidState {
        /// State the operation requires.
        expected: &'static str,
        /// State the session was in.
        actual: &'static str,
    },

    // ========================================================================
    // Payload Errors
    // ========================================================================
    /// Payload missing from the render tree or not valid JSON.
    #[error("Extraction failed: {message}")]
    Extraction {
        /// Description of the extraction failure.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid input error.
    #[inline]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Creates an authentication error.
    #[inline]
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[inline]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Creates a connect error.
    #[inline]
    pub fn connect(message: impl Into<String>) -> Self {
        Self::Connect {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(operation: impl Into<String>, message_ref: MessageRef, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            message_ref,
            timeout_ms,
        }
    }

    /// Creates an invalid state error.
    #[inline]
    pub fn invalid_state(expected: &'static str, actual: &'static str) -> Self {
        Self::InvalidState { expected, actual }
    }

    /// Creates an extraction error.
    #[inline]
    pub fn extraction(message: impl Into<String>) -> Self {
        Self::Extraction {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns `true` if this is a protocol error.
    #[inline]
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Self::Protocol { .. })
    }

    /// Returns `true` if this error happened while establishing the session.
    #[inline]
    #[must_use]
    pub fn is_handshake_error(&self) -> bool {
        matches!(
            self,
            Self::Auth { .. } | Self::Network { .. } | Self::Connect { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::Connect { .. } | Self::SessionClosed | Self::WebSocket(_)
        )
    }

    /// Returns `true` unless the error came from reading or parsing local
    /// input, which callers report as [`Error::InvalidInput`].
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::InvalidInput { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================
