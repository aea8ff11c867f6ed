//! Render-tree model and configuration extraction.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `tree` | [`RenderNode`] leaf/branch type |
//! | `extract` | Fixed-path lookup, bounded search, entity decoding |

// ============================================================================
// Submodules
// ============================================================================

/// Configuration extraction.
pub mod extract;

/// Render-tree type.
pub mod tree;

// ============================================================================
// Re-exports
// ============================================================================

pub use extract::{MAX_SEARCH_DEPTH, PAYLOAD_MARKER, decode_entities, extract, extract_config};
pub use tree::RenderNode;
