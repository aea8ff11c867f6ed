//! MCP Live Sync - MCP server configuration over a Phoenix LiveView channel.
//!
//! The host application keeps its MCP server configuration inside a
//! server-rendered LiveView page and has no documented API. This library
//! speaks the LiveView channel protocol directly to read and write it.
//!
//! # Architecture
//!
//! ```text
//! cookie ─► TokenScraper ─► socket::open ─► Connection ─► phx_join ─► rendered tree
//!                                              │                          │
//!                                          heartbeat                 extract_config
//!                                              │
//!                          ConfigConverter ─► save_config form event
//! ```
//!
//! Key design principles:
//!
//! - One [`ProtocolSession`] owns one socket and one event loop
//! - Replies are correlated by `(topic, ref)` in a single table
//! - Every correlated call has its own deadline
//! - Extraction tries two known tree positions, then a bounded search
//!
//! # Quick Start
//!
//! ```no_run
//! use mcp_live_sync::{ProtocolSession, Result, SessionConfig, extract_config};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = SessionConfig::builder()
//!         .base_url("https://app.example.com")
//!         .build()?;
//!
//!     let mut session = ProtocolSession::new(config, "_app_key=...")?;
//!     session.connect().await?;
//!     let response = session.join().await?;
//!     println!("{}", extract_config(&response)?);
//!
//!     session.close().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`convert`] | Source → restricted schema conversion |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Message/join references and topics |
//! | [`protocol`] | Frame and payload types |
//! | [`render`] | Render tree and configuration extraction |
//! | [`session`] | Tokens, configuration, session state machine |
//! | [`transport`] | Socket handshake and event loop |

// ============================================================================
// Modules
// ============================================================================

/// Configuration conversion for the write path.
pub mod convert;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers for channel messages.
pub mod identifiers;

/// Channel protocol message types.
pub mod protocol;

/// Render tree and extraction.
pub mod render;

/// Protocol session.
///
/// Use [`ProtocolSession::new`] with a [`SessionConfig`] to start.
pub mod session;

/// WebSocket transport layer.
///
/// Internal module handling the socket and its event loop.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Conversion types
pub use convert::{ConfigConverter, Conversion, EnvLookup, Outcome, ProcessEnv, Rejection};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{JoinRef, MessageRef, Topic};

// Render types
pub use render::{RenderNode, extract, extract_config};

// Session types
pub use session::{ProtocolSession, SessionConfig, SessionConfigBuilder, SessionState, Tokens};

// Transport types
pub use transport::TransportState;
