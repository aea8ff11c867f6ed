//! MCP configuration extraction from a join reply.
//!
//! The configuration is rendered as an HTML-escaped JSON string somewhere
//! inside the view. Lookup order, first match wins:
//!
//! 1. `rendered.0.8.3` (current layout)
//! 2. `rendered.0.7.3` (previous layout)
//! 3. depth-first search, depth 10 at most, for a leaf mentioning `mcpServers`
//!
//! The fixed paths break whenever the host reshuffles its template, so the
//! search stays as the fallback.

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;
use tracing::{debug, trace};

use crate::error::{Error, Result};

use super::RenderNode;

// ============================================================================
// Constants
// ============================================================================

/// Current location of the configuration.
const PRIMARY_PATH: [&str; 4] = ["rendered", "0", "8", "3"];

/// Location used by the previous page layout.
const LEGACY_PATH: [&str; 4] = ["rendered", "0", "7", "3"];

/// Substring identifying the configuration during the search.
pub const PAYLOAD_MARKER: &str = "mcpServers";

/// Deepest level the search inspects; the root is level 0.
pub const MAX_SEARCH_DEPTH: usize = 10;

/// Entities decoded in the found text. `&amp;` must stay last.
const ENTITIES: [(&str, &str); 5] = [
    ("&quot;", "\""),
    ("&#39;", "'"),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&amp;", "&"),
];

// ============================================================================
// Public Functions
// ============================================================================

/// Extracts the raw configuration JSON from a join reply.
///
/// Returns `None` if no candidate is found. The result is not parsed.
#[must_use]
pub fn extract(tree: &RenderNode) -> Option<String> {
    let candidate = fixed_path(tree, &PRIMARY_PATH)
        .inspect(|_| trace!("Configuration found at primary path"))
        .or_else(|| {
            fixed_path(tree, &LEGACY_PATH).inspect(|_| debug!("Configuration found at legacy path"))
        })
        .or_else(|| {
            search(tree, 0).inspect(|_| debug!("Configuration found by tree search"))
        })?;

    Some(decode_entities(candidate))
}

/// Extracts and parses the configuration from a join reply.
///
/// # Errors
///
/// Returns [`Error::Extraction`] if nothing is found or the text is not JSON.
pub fn extract_config(response: &Value) -> Result<Value> {
    let raw = extract(&RenderNode::from(response))
        .ok_or_else(|| Error::extraction("MCP configuration not found in rendered view"))?;

    serde_json::from_str(&raw)
        .map_err(|e| Error::extraction(format!("Configuration is not valid JSON: {e}")))
}

/// Decodes the five HTML entities the server escapes.
#[must_use]
pub fn decode_entities(text: &str) -> String {
    ENTITIES
        .iter()
        .fold(text.to_string(), |acc, (entity, literal)| {
            acc.replace(entity, literal)
        })
}

// ============================================================================
// Internal Functions
// ============================================================================

fn fixed_path<'a>(tree: &'a RenderNode, path: &[&str]) -> Option<&'a str> {
    tree.path(path)
        .and_then(RenderNode::as_leaf)
        .filter(|text| text.contains('{'))
}

fn search(node: &RenderNode, depth: usize) -> Option<&str> {
    if depth > MAX_SEARCH_DEPTH {
        return None;
    }

    match node {
        RenderNode::Leaf(text) => text.contains(PAYLOAD_MARKER).then_some(text.as_str()),
        RenderNode::Branch(_) => node.children().find_map(|child| search(child, depth + 1)),
    }
}

// ============================================================================
// Tests
// ============================================================================
