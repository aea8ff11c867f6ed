//! Closed render-tree type.
//!
//! LiveView replies carry the rendered view as nested JSON objects keyed by
//! numeric strings. The extractor only cares about two shapes, so the tree
//! is narrowed to a leaf/branch variant on conversion.
//!
//! Branch children keep render order: arrays in index order, object keys
//! that are integers in numeric order before any other keys.

// ============================================================================
// Imports
// ============================================================================

use std::cmp::Ordering;

use serde_json::Value;

// ============================================================================
// RenderNode
// ============================================================================

/// One node of a render tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderNode {
    /// Text leaf (numbers and booleans are kept as their JSON text).
    Leaf(String),
    /// Ordered children; arrays become branches keyed by index.
    Branch(Vec<(String, RenderNode)>),
}

impl RenderNode {
    /// Returns the child stored under `key`, if this is a branch.
    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&RenderNode> {
        match self {
            Self::Branch(children) => children
                .iter()
                .find_map(|(name, child)| (name == key).then_some(child)),
            Self::Leaf(_) => None,
        }
    }

    /// Follows a path of keys from this node.
    #[must_use]
    pub fn path(&self, keys: &[&str]) -> Option<&RenderNode> {
        keys.iter().try_fold(self, |node, key| node.get(key))
    }

    /// Returns the children of a branch in render order.
    pub fn children(&self) -> impl Iterator<Item = &RenderNode> {
        let children = match self {
            Self::Branch(children) => children.as_slice(),
            Self::Leaf(_) => &[][..],
        };
        children.iter().map(|(_, child)| child)
    }

    /// Returns the text of a leaf.
    #[inline]
    #[must_use]
    pub fn as_leaf(&self) -> Option<&str> {
        match self {
            Self::Leaf(text) => Some(text),
            Self::Branch(_) => None,
        }
    }
}

impl From<&Value> for RenderNode {
    fn from(value: &Value) -> Self {
        match value {
            Value::String(text) => Self::Leaf(text.clone()),
            Value::Null => Self::Leaf(String::new()),
            Value::Bool(_) | Value::Number(_) => Self::Leaf(value.to_string()),
            Value::Array(items) => Self::Branch(
                items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| (index.to_string(), Self::from(item)))
                    .collect(),
            ),
            Value::Object(map) => {
                let mut children: Vec<_> = map
                    .iter()
                    .map(|(key, item)| (key.clone(), Self::from(item)))
                    .collect();
                children.sort_by(|(a, _), (b, _)| render_key_order(a, b));
                Self::Branch(children)
            }
        }
    }
}

impl From<Value> for RenderNode {
    fn from(value: Value) -> Self {
        Self::from(&value)
    }
}

/// Integer keys first in numeric order, then the rest lexically.
fn render_key_order(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

// ============================================================================
// Tests
// ============================================================================
