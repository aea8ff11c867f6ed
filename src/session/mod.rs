//! Protocol session: tokens, handshake and correlated calls.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `config` | [`SessionConfig`] and its builder |
//! | `core` | [`ProtocolSession`] state machine |
//! | `tokens` | [`TokenScraper`] and [`Tokens`] |

// ============================================================================
// Submodules
// ============================================================================

/// Session configuration.
pub mod config;

/// Session state machine.
pub mod core;

/// Token scraping.
pub mod tokens;

// ============================================================================
// Re-exports
// ============================================================================

pub use config::{SessionConfig, SessionConfigBuilder};
pub use self::core::{ProtocolSession, SessionState};
pub use tokens::{TokenScraper, Tokens};
