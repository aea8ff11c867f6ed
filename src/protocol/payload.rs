//! Outbound payload builders.
//!
//! # Join
//!
//! ```json
//! {
//!   "url": "https://host/settings",
//!   "params": { "_csrf_token": "...", "_mounts": 0, "_mount_attempts": 0 },
//!   "session": "...",
//!   "static": "...",
//!   "sticky": false
//! }
//! ```
//!
//! # Form event
//!
//! ```json
//! { "type": "form", "event": "save_config", "value": "config_json=...", "meta": {} }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::Result;

// ============================================================================
// Constants
// ============================================================================

/// LiveView event that stores a new MCP configuration.
pub const SAVE_CONFIG_EVENT: &str = "save_config";

/// Form field carrying the serialized configuration.
pub const CONFIG_FIELD: &str = "config_json";

// ============================================================================
// JoinPayload
// ============================================================================

/// Payload of the `phx_join` frame.
#[derive(Debug, Clone, Serialize)]
pub struct JoinPayload {
    /// Page URL the LiveView is mounted on.
    pub url: String,
    /// Connect params.
    pub params: JoinParams,
    /// Signed session token (`data-phx-session`).
    pub session: String,
    /// Signed static token (`data-phx-static`).
    #[serde(rename = "static")]
    pub static_token: String,
    /// Always `false`: the view is not sticky.
    pub sticky: bool,
}

/// Connect params of a join.
#[derive(Debug, Clone, Serialize)]
pub struct JoinParams {
    /// CSRF token from the page's meta tag.
    #[serde(rename = "_csrf_token")]
    pub csrf_token: String,
    /// Mount counter, always `0` for a fresh join.
    #[serde(rename = "_mounts")]
    pub mounts: u32,
    /// Mount attempt counter, always `0` for a fresh join.
    #[serde(rename = "_mount_attempts")]
    pub mount_attempts: u32,
}

impl JoinPayload {
    /// Creates a join payload for a first mount.
    #[must_use]
    pub fn new(
        url: impl Into<String>,
        csrf_token: impl Into<String>,
        session: impl Into<String>,
        static_token: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            params: JoinParams {
                csrf_token: csrf_token.into(),
                mounts: 0,
                mount_attempts: 0,
            },
            session: session.into(),
            static_token: static_token.into(),
            sticky: false,
        }
    }

    /// Converts the payload into a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Json`] if serialization fails.
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

// ============================================================================
// FormEvent
// ============================================================================

/// Payload of a synthetic form submission.
#[derive(Debug, Clone, Serialize)]
pub struct FormEvent {
    /// Always `"form"`.
    #[serde(rename = "type")]
    pub event_type: &'static str,
    /// `phx-submit` event name.
    pub event: String,
    /// URL-encoded form body.
    pub value: String,
    /// Event metadata, always empty.
    pub meta: Map<String, Value>,
}

impl FormEvent {
    /// Creates a form event from an already encoded body.
    #[must_use]
    pub fn new(event: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            event_type: "form",
            event: event.into(),
            value: value.into(),
            meta: Map::new(),
        }
    }

    /// Creates the `save_config` submission for a configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Json`] if the configuration cannot be serialized.
    pub fn save_config(config: &Value) -> Result<Self> {
        let json = serde_json::to_string(config)?;
        Ok(Self::new(
            SAVE_CONFIG_EVENT,
            format!("{CONFIG_FIELD}={}", form_encode(&json)),
        ))
    }

    /// Converts the payload into a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Json`] if serialization fails.
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Percent-encodes a form value with spaces as `+`.
#[must_use]
pub fn form_encode(value: &str) -> String {
    urlencoding::encode(value).replace("%20", "+")
}

// ============================================================================
// Tests
// ============================================================================
