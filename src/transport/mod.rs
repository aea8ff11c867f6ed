//! WebSocket transport layer.
//!
//! This module owns the single socket between the client and the LiveView
//! server.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐                              ┌─────────────────┐
//! │  Session (Rust)  │                              │  LiveView host  │
//! │                  │         WebSocket            │                 │
//! │  socket::open    │─────────────────────────────►│  /live/websocket│
//! │  → Connection    │◄────────────────────────────►│                 │
//! └──────────────────┘                              └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `socket::open` - Upgrade with CSRF query, cookie and origin
//! 2. `Connection` - Event loop starts, heartbeat armed
//! 3. `Connection::request` - Correlated request/reply
//! 4. `Connection::close` - Stop heartbeat, close socket, fail pending
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | Event loop, correlation and heartbeat |
//! | `socket` | Handshake |

// ============================================================================
// Submodules
// ============================================================================

/// Connection event loop.
pub mod connection;

/// Socket handshake.
pub mod socket;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{Connection, PendingKey, TransportState};
pub use socket::open;
