//! Source-schema to restricted-schema conversion.
//!
//! Accepts the common desktop-client layout:
//!
//! ```json
//! { "mcpServers": { "fs": { "command": "npx", "args": ["-y", "@mcp/fs"], "env": {} } } }
//! ```
//!
//! and produces the layout the host accepts:
//!
//! | Field | Rule |
//! |-------|------|
//! | `command` | required, `npx` or `uvx` |
//! | `args` | optional array of strings |
//! | `env` | optional string map, placeholders expanded |
//! | `transport` | `{ "type": "stdio" }` unless given as such |
//!
//! Anything else is dropped with a warning. Remote (`url`) servers are
//! rejected.

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{Error, Result};

use super::env::{EnvLookup, expand_placeholders};

// ============================================================================
// Constants
// ============================================================================

/// Launch commands the host allows.
pub const ALLOWED_COMMANDS: [&str; 2] = ["npx", "uvx"];

/// Entry fields kept in the restricted schema.
pub const ALLOWED_FIELDS: [&str; 4] = ["command", "args", "env", "transport"];

/// Transport type the host supports.
pub const STDIO_TRANSPORT: &str = "stdio";

/// Top-level key of both schemas.
pub const SERVERS_KEY: &str = "mcpServers";

// ============================================================================
// Output Types
// ============================================================================

/// Restricted configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RestrictedConfig {
    /// Accepted servers by name.
    #[serde(rename = "mcpServers")]
    pub servers: BTreeMap<String, ServerEntry>,
}

impl RestrictedConfig {
    /// Converts the document into a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// One accepted server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerEntry {
    /// Whitelisted launch command.
    pub command: String,
    /// Command arguments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    /// Environment with placeholders resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<BTreeMap<String, String>>,
    /// Transport descriptor.
    pub transport: Transport,
}

/// Transport descriptor of an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transport {
    /// Transport type; always `stdio`.
    #[serde(rename = "type")]
    pub kind: String,
}

impl Default for Transport {
    fn default() -> Self {
        Self {
            kind: STDIO_TRANSPORT.to_string(),
        }
    }
}

/// A rejected server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// Server name.
    pub name: String,
    /// Why the entry was rejected.
    pub reason: String,
    /// How to fix it.
    pub suggestion: String,
}

impl Rejection {
    fn new(name: &str, reason: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            reason: reason.into(),
            suggestion: suggestion.into(),
        }
    }
}

/// Overall result of a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every entry was accepted (including an empty input).
    AllAccepted,
    /// Some entries were rejected.
    Partial,
    /// No entry was accepted.
    NoneAccepted,
}

/// Converter output.
#[derive(Debug, Clone, Default)]
pub struct Conversion {
    /// Document to submit.
    pub config: RestrictedConfig,
    /// Rejected entries.
    pub rejected: Vec<Rejection>,
    /// Non-fatal diagnostics.
    pub warnings: Vec<String>,
}

impl Conversion {
    /// Returns the accepted server names.
    #[must_use]
    pub fn accepted(&self) -> Vec<&str> {
        self.config.servers.keys().map(String::as_str).collect()
    }

    /// Classifies the conversion.
    #[must_use]
    pub fn outcome(&self) -> Outcome {
        match (self.config.servers.is_empty(), self.rejected.is_empty()) {
            (_, true) => Outcome::AllAccepted,
            (false, false) => Outcome::Partial,
            (true, false) => Outcome::NoneAccepted,
        }
    }
}

// ============================================================================
// ConfigConverter
// ============================================================================

/// Converts source documents using an injected environment.
#[derive(Debug, Clone)]
pub struct ConfigConverter<E> {
    env: E,
}

impl<E: EnvLookup> ConfigConverter<E> {
    /// Creates a converter resolving placeholders through `env`.
    #[inline]
    #[must_use]
    pub fn new(env: E) -> Self {
        Self { env }
    }

    /// Converts a source document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the document is not an object of
    /// servers. Individual bad entries are rejected, not errors.
    pub fn convert(&self, source: &Value) -> Result<Conversion> {
        let servers = Self::servers(source)?;
        let mut conversion = Conversion::default();

        for (name, entry) in servers {
            match self.convert_entry(name, entry, &mut conversion.warnings) {
                Ok(server) => {
                    debug!(server = %name, "Server accepted");
                    conversion.config.servers.insert(name.clone(), server);
                }
                Err(rejection) => {
                    warn!(server = %name, reason = %rejection.reason, "Server rejected");
                    conversion.rejected.push(rejection);
                }
            }
        }

        Ok(conversion)
    }

    fn servers(source: &Value) -> Result<&Map<String, Value>> {
        let root = source
            .as_object()
            .ok_or_else(|| Error::invalid_input("Configuration must be a JSON object"))?;

        match root.get(SERVERS_KEY) {
            Some(Value::Object(servers)) => Ok(servers),
            Some(_) => Err(Error::invalid_input(format!("\"{SERVERS_KEY}\" must be an object"))),
            None => Ok(root),
        }
    }

    fn convert_entry(
        &self,
        name: &str,
        entry: &Value,
        warnings: &mut Vec<String>,
    ) -> std::result::Result<ServerEntry, Rejection> {
        let fields = entry.as_object().ok_or_else(|| {
            Rejection::new(
                name,
                "entry is not an object",
                "describe the server as { \"command\": ..., \"args\": [...] }",
            )
        })?;

        if fields.contains_key("url") {
            return Err(Rejection::new(
                name,
                "remote servers (url) are not supported",
                "run the server locally through npx or uvx",
            ));
        }

        let transport = Self::transport(name, fields.get("transport"))?;
        let command = Self::command(name, fields.get("command"))?;
        let args = Self::args(name, fields.get("args"))?;
        let mut entry_warnings = Vec::new();
        let env = match fields.get("env") {
            Some(env) => Some(self.env(name, env, &mut entry_warnings)?),
            None => None,
        };

        for field in fields.keys().filter(|f| !ALLOWED_FIELDS.contains(&f.as_str())) {
            entry_warnings.push(format!("{name}: dropped unsupported field \"{field}\""));
        }
        warnings.append(&mut entry_warnings);

        Ok(ServerEntry {
            command,
            args,
            env,
            transport,
        })
    }

    fn transport(name: &str, value: Option<&Value>) -> std::result::Result<Transport, Rejection> {
        let Some(value) = value else {
            return Ok(Transport::default());
        };

        match value.get("type").and_then(Value::as_str) {
            Some(STDIO_TRANSPORT) => Ok(Transport::default()),
            Some(other) => Err(Rejection::new(
                name,
                format!("transport \"{other}\" is not supported"),
                "remove \"transport\" or set it to { \"type\": \"stdio\" }",
            )),
            None => Err(Rejection::new(
                name,
                "transport must be an object with a \"type\"",
                "remove \"transport\" or set it to { \"type\": \"stdio\" }",
            )),
        }
    }

    fn command(name: &str, value: Option<&Value>) -> std::result::Result<String, Rejection> {
        let suggestion = format!(
            "launch the server with one of: {} (e.g. \"command\": \"npx\", \"args\": [\"-y\", \"<package>\"])",
            ALLOWED_COMMANDS.join(", ")
        );

        match value {
            Some(Value::String(command)) if ALLOWED_COMMANDS.contains(&command.as_str()) => {
                Ok(command.clone())
            }
            Some(Value::String(command)) => Err(Rejection::new(
                name,
                format!("command \"{command}\" is not allowed"),
                suggestion,
            )),
            Some(_) => Err(Rejection::new(name, "command must be a string", suggestion)),
            None => Err(Rejection::new(name, "missing command", suggestion)),
        }
    }

    fn args(name: &str, value: Option<&Value>) -> std::result::Result<Option<Vec<String>>, Rejection> {
        let Some(value) = value else {
            return Ok(None);
        };

        value
            .as_array()
            .and_then(|items| {
                items
                    .iter()
                    .map(|item| item.as_str().map(str::to_string))
                    .collect::<Option<Vec<_>>>()
            })
            .map(Some)
            .ok_or_else(|| {
                Rejection::new(
                    name,
                    "args must be an array of strings",
                    "quote every argument, e.g. [\"-y\", \"@scope/server\"]",
                )
            })
    }

    fn env(
        &self,
        name: &str,
        value: &Value,
        warnings: &mut Vec<String>,
    ) -> std::result::Result<BTreeMap<String, String>, Rejection> {
        let vars = value.as_object().ok_or_else(|| {
            Rejection::new(
                name,
                "env must be an object",
                "use { \"NAME\": \"value\" } pairs",
            )
        })?;

        let mut resolved = BTreeMap::new();
        for (key, raw) in vars {
            let text = match raw {
                Value::String(text) => text.clone(),
                Value::Number(_) | Value::Bool(_) => {
                    warnings.push(format!("{name}: env \"{key}\" converted to string"));
                    raw.to_string()
                }
                _ => {
                    return Err(Rejection::new(
                        name,
                        format!("env \"{key}\" must be a string"),
                        "use { \"NAME\": \"value\" } pairs",
                    ));
                }
            };

            let expansion = expand_placeholders(&text, &self.env);
            for missing in &expansion.unresolved {
                warnings.push(format!(
                    "{name}: env \"{key}\" references unset variable {missing}; using empty string"
                ));
            }
            resolved.insert(key.clone(), expansion.value);
        }

        Ok(resolved)
    }
}

// ============================================================================
// Tests
// ============================================================================
