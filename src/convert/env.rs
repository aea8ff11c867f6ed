//! Environment placeholder expansion.
//!
//! Supports `${NAME}` and `${NAME:-default}`. Lookups go through
//! [`EnvLookup`] so conversion can be tested without touching the process
//! environment.

// ============================================================================
// Imports
// ============================================================================

use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use regex::{Captures, Regex};

// ============================================================================
// Patterns
// ============================================================================

static PLACEHOLDER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").expect("valid placeholder pattern")
});

// ============================================================================
// EnvLookup
// ============================================================================

/// Key-value lookup used to resolve placeholders.
pub trait EnvLookup {
    /// Returns the value of `name`, or `None` if unset.
    fn lookup(&self, name: &str) -> Option<String>;
}

/// Lookup backed by the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvLookup for ProcessEnv {
    fn lookup(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl EnvLookup for HashMap<String, String> {
    fn lookup(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

impl EnvLookup for BTreeMap<String, String> {
    fn lookup(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

impl<T: EnvLookup + ?Sized> EnvLookup for &T {
    fn lookup(&self, name: &str) -> Option<String> {
        (**self).lookup(name)
    }
}

// ============================================================================
// Expansion
// ============================================================================

/// Result of expanding one string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expansion {
    /// Expanded text.
    pub value: String,
    /// Names referenced without a value or default.
    pub unresolved: Vec<String>,
}

/// Expands every placeholder in `text`.
///
/// Unset or empty variables take the default when one is given; without a
/// default an unset variable becomes the empty string and is reported.
#[must_use]
pub fn expand_placeholders(text: &str, env: &impl EnvLookup) -> Expansion {
    let mut unresolved = Vec::new();

    let value = PLACEHOLDER_PATTERN
        .replace_all(text, |caps: &Captures<'_>| {
            let name = &caps[1];
            let default = caps.get(2).map(|m| m.as_str());

            match (env.lookup(name), default) {
                (Some(value), Some(default)) if value.is_empty() => default.to_string(),
                (Some(value), _) => value,
                (None, Some(default)) => default.to_string(),
                (None, None) => {
                    unresolved.push(name.to_string());
                    String::new()
                }
            }
        })
        .into_owned();

    Expansion { value, unresolved }
}

// ============================================================================
// Tests
// ============================================================================
