//! MCP configuration conversion for the write path.
//!
//! The session never sees unconverted entries: the CLI runs
//! [`ConfigConverter::convert`] first and submits only
//! [`Conversion::config`].
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `converter` | Field allow-list, command whitelist, accept/reject report |
//! | `env` | `${NAME}` / `${NAME:-default}` expansion over [`EnvLookup`] |

// ============================================================================
// Submodules
// ============================================================================

/// Schema conversion.
pub mod converter;

/// Placeholder expansion.
pub mod env;

// ============================================================================
// Re-exports
// ============================================================================

pub use converter::{
    ALLOWED_COMMANDS, ConfigConverter, Conversion, Outcome, Rejection, RestrictedConfig,
    ServerEntry, Transport,
};
pub use env::{EnvLookup, Expansion, ProcessEnv, expand_placeholders};
