//! Reply payload of a correlated request.
//!
//! A `phx_reply` frame carries:
//!
//! Success:
//! ```json
//! { "status": "ok", "response": { ... } }
//! ```
//!
//! Error:
//! ```json
//! { "status": "error", "response": { "reason": "join crashed" } }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};

// ============================================================================
// Reply
// ============================================================================

/// Payload of a `phx_reply` frame.
#[derive(Debug, Clone, Deserialize)]
pub struct Reply {
    /// Reply status.
    pub status: ReplyStatus,

    /// Response body (render tree for joins, diff for events).
    #[serde(default)]
    pub response: Value,
}

impl Reply {
    /// Parses a reply from a frame payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the payload has no usable status.
    pub fn from_payload(payload: Value) -> Result<Self> {
        serde_json::from_value(payload)
            .map_err(|e| Error::protocol(format!("Malformed reply payload: {e}")))
    }

    /// Returns `true` if this is a success reply.
    #[inline]
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == ReplyStatus::Ok
    }

    /// Returns the server-supplied reason of an error reply.
    ///
    /// Falls back to the raw response text when no `reason` key is present.
    #[must_use]
    pub fn reason(&self) -> String {
        match self.response.get("reason").and_then(Value::as_str) {
            Some(reason) => reason.to_string(),
            None if self.response.is_null() => "unknown error".to_string(),
            None => self.response.to_string(),
        }
    }

    /// Extracts the response, returning an error for error replies.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] carrying the server's reason.
    pub fn into_result(self) -> Result<Value> {
        match self.status {
            ReplyStatus::Ok => Ok(self.response),
            ReplyStatus::Error => Err(Error::protocol(self.reason())),
        }
    }
}

// ============================================================================
// ReplyStatus
// ============================================================================

/// Reply status discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    /// Successful reply.
    Ok,
    /// Error reply.
    Error,
}

// ============================================================================
// Tests
// ============================================================================
