//! Channel protocol message types.
//!
//! This module defines the frames exchanged with the LiveView server over
//! the socket.
//!
//! # Protocol Overview
//!
//! | Frame | Direction | Purpose |
//! |-------|-----------|---------|
//! | `phx_join` | Local → Remote | Attach to a LiveView topic |
//! | `event` | Local → Remote | Push a client event (form submit) |
//! | `heartbeat` | Local → Remote | Keep the socket alive |
//! | `phx_reply` | Remote → Local | Reply to a correlated request |
//! | `diff` / `phx_error` / `phx_close` | Remote → Local | Server pushes |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `frame` | 5-tuple frame and reserved event names |
//! | `payload` | Join and form-event payload builders |
//! | `reply` | Reply payload and status |

// ============================================================================
// Submodules
// ============================================================================

/// 5-tuple frame encoding.
pub mod frame;

/// Outbound payload builders.
pub mod payload;

/// Reply payload types.
pub mod reply;

// ============================================================================
// Re-exports
// ============================================================================

pub use frame::{Frame, HEARTBEAT_TOPIC, events};
pub use payload::{FormEvent, JoinParams, JoinPayload, form_encode};
pub use reply::{Reply, ReplyStatus};
