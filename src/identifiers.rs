//! Type-safe identifiers for channel messages.
//!
//! Newtype wrappers keep message references, join references and topics
//! from being mixed up at compile time.
//!
//! On the wire every reference is a decimal string (`"7"`), matching the
//! V2 JSON serializer of the channel protocol.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

// ============================================================================
// MessageRef
// ============================================================================

/// Per-message correlation reference.
///
/// Unique within one session; produced by [`RefCounter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageRef(u64);

impl MessageRef {
    /// Creates a reference from a raw counter value.
    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw counter value.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for MessageRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for MessageRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(RefVisitor).map(Self)
    }
}

// ============================================================================
// JoinRef
// ============================================================================

/// Reference of the join frame, repeated on every frame of the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JoinRef(u64);

impl JoinRef {
    /// Join references reuse the reference of the join frame itself.
    #[inline]
    #[must_use]
    pub const fn from_message_ref(message_ref: MessageRef) -> Self {
        Self(message_ref.0)
    }
}

impl fmt::Display for JoinRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for JoinRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for JoinRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(RefVisitor).map(Self)
    }
}

/// Accepts `"12"` as well as `12`.
struct RefVisitor;

impl Visitor<'_> for RefVisitor {
    type Value = u64;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a numeric reference as string or integer")
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<u64, E> {
        Ok(value)
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<u64, E> {
        u64::try_from(value).map_err(|_| E::custom("negative reference"))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<u64, E> {
        value
            .parse()
            .map_err(|_| E::invalid_value(de::Unexpected::Str(value), &self))
    }
}

// ============================================================================
// Topic
// ============================================================================

/// Channel topic, e.g. `lv:phx-F8x2` or `phoenix`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(String);

impl Topic {
    /// Prefix of LiveView channel topics.
    pub const LIVE_VIEW_PREFIX: &'static str = "lv:";

    /// Creates a topic from any string.
    #[inline]
    #[must_use]
    pub fn new(topic: impl Into<String>) -> Self {
        Self(topic.into())
    }

    /// Creates the LiveView topic for a DOM element id.
    #[inline]
    #[must_use]
    pub fn live_view(element_id: &str) -> Self {
        Self(format!("{}{element_id}", Self::LIVE_VIEW_PREFIX))
    }

    /// Returns the topic as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// RefCounter
// ============================================================================

/// Session-scoped, strictly increasing reference source.
///
/// Shared between the session and the heartbeat in the event loop, so it is
/// atomic rather than behind a lock.
#[derive(Debug, Default)]
pub struct RefCounter(AtomicU64);

impl RefCounter {
    /// Creates a counter whose first reference is `1`.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Returns the next unused reference.
    #[inline]
    pub fn next(&self) -> MessageRef {
        MessageRef(self.0.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Returns the most recently issued reference, if any.
    #[inline]
    #[must_use]
    pub fn last(&self) -> Option<MessageRef> {
        match self.0.load(Ordering::Relaxed) {
            0 => None,
            value => Some(MessageRef(value)),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
