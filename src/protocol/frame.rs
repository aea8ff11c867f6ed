//! Channel frame type.
//!
//! Every message on the socket is a JSON array of five elements:
//!
//! ```json
//! [joinRef, ref, topic, event, payload]
//! ```
//!
//! `joinRef` and `ref` may be `null`; heartbeats carry no join reference.

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::identifiers::{JoinRef, MessageRef, Topic};

// ============================================================================
// Event Names
// ============================================================================

/// Reserved event names of the channel protocol.
pub mod events {
    /// Join a channel topic.
    pub const JOIN: &str = "phx_join";
    /// Reply to a correlated request.
    pub const REPLY: &str = "phx_reply";
    /// Channel crashed on the server.
    pub const ERROR: &str = "phx_error";
    /// Channel closed by the server.
    pub const CLOSE: &str = "phx_close";
    /// Keep-alive ping.
    pub const HEARTBEAT: &str = "heartbeat";
    /// Client event pushed to a LiveView.
    pub const EVENT: &str = "event";
    /// Rendered diff pushed by a LiveView.
    pub const DIFF: &str = "diff";
}

/// Topic used by heartbeats.
pub const HEARTBEAT_TOPIC: &str = "phoenix";

// ============================================================================
// Frame
// ============================================================================

/// One protocol frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Join reference of the channel, `None` for heartbeats.
    pub join_ref: Option<JoinRef>,
    /// Correlation reference, `None` for server pushes.
    pub message_ref: Option<MessageRef>,
    /// Channel topic.
    pub topic: Topic,
    /// Event name.
    pub event: String,
    /// Event payload.
    pub payload: Value,
}

impl Frame {
    /// Creates a frame.
    #[inline]
    #[must_use]
    pub fn new(
        join_ref: Option<JoinRef>,
        message_ref: Option<MessageRef>,
        topic: Topic,
        event: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            join_ref,
            message_ref,
            topic,
            event: event.into(),
            payload,
        }
    }

    /// Creates a heartbeat frame: `[null, ref, "phoenix", "heartbeat", {}]`.
    #[inline]
    #[must_use]
    pub fn heartbeat(message_ref: MessageRef) -> Self {
        Self::new(
            None,
            Some(message_ref),
            Topic::new(HEARTBEAT_TOPIC),
            events::HEARTBEAT,
            Value::Object(Map::new()),
        )
    }

    /// Returns `true` if this frame is a reply to a correlated request.
    #[inline]
    #[must_use]
    pub fn is_reply(&self) -> bool {
        self.event == events::REPLY
    }

    /// Serializes the frame to its text form.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Json`] if the payload cannot be serialized.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses a frame from its text form.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Json`] if the text is not a 5-element array.
    pub fn decode(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

impl Serialize for Frame {
    fn serialize<S: Serializer>(&self, serializer: S) -> StdResult<S::Ok, S::Error> {
        (
            &self.join_ref,
            &self.message_ref,
            &self.topic,
            &self.event,
            &self.payload,
        )
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Frame {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> StdResult<Self, D::Error> {
        let (join_ref, message_ref, topic, event, payload) =
            <(Option<JoinRef>, Option<MessageRef>, Topic, String, Value)>::deserialize(
                deserializer,
            )?;

        Ok(Self {
            join_ref,
            message_ref,
            topic,
            event,
            payload,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
