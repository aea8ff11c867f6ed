//! Session configuration and builder.
//!
//! Provides a fluent API for configuring a [`ProtocolSession`].
//!
//! # Example
//!
//! ```no_run
//! use mcp_live_sync::SessionConfig;
//!
//! # fn example() -> mcp_live_sync::Result<()> {
//! let config = SessionConfig::builder()
//!     .base_url("https://app.example.com")
//!     .page_path("/settings/mcp")
//!     .build()?;
//! # Ok(())
//! # }
//! ```
//!
//! [`ProtocolSession`]: super::ProtocolSession

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Page that embeds the LiveView and its tokens.
pub const DEFAULT_PAGE_PATH: &str = "/settings";

/// LiveView socket endpoint.
pub const DEFAULT_SOCKET_PATH: &str = "/live/websocket";

/// Channel serializer version sent as `vsn`.
pub const DEFAULT_PROTOCOL_VERSION: &str = "2.0.0";

/// Desktop browser signature; the host serves a different page to unknown clients.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Deadline for every correlated request.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(10);

/// Keep-alive period.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Deadline for the token page fetch and the socket handshake.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// SessionConfig
// ============================================================================

/// Validated session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    base_url: Url,
    page_path: String,
    socket_path: String,
    protocol_version: String,
    user_agent: String,
    reply_timeout: Duration,
    heartbeat_interval: Duration,
    http_timeout: Duration,
}

impl SessionConfig {
    /// Creates a new builder.
    #[inline]
    #[must_use]
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::new()
    }

    /// Returns the base URL of the host.
    #[inline]
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Returns the user agent sent on every request.
    #[inline]
    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Returns the deadline for correlated requests.
    #[inline]
    #[must_use]
    pub const fn reply_timeout(&self) -> Duration {
        self.reply_timeout
    }

    /// Returns the keep-alive period.
    #[inline]
    #[must_use]
    pub const fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    /// Returns the HTTP and handshake deadline.
    #[inline]
    #[must_use]
    pub const fn http_timeout(&self) -> Duration {
        self.http_timeout
    }

    /// Returns the URL of the page carrying the tokens.
    #[must_use]
    pub fn page_url(&self) -> String {
        self.join_path(&self.page_path)
    }

    /// Returns the `Origin` header value.
    #[must_use]
    pub fn origin(&self) -> String {
        self.base_url.origin().ascii_serialization()
    }

    /// Returns the socket URL with its connect query.
    ///
    /// Format: `wss://host/live/websocket?_csrf_token=..&_mounts=0&_mount_attempts=0&_live_referer=undefined&vsn=2.0.0`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the resulting URL is invalid.
    pub fn socket_url(&self, csrf_token: &str) -> Result<Url> {
        let scheme = match self.base_url.scheme() {
            "https" => "wss",
            _ => "ws",
        };
        let http_url = self.join_path(&self.socket_path);
        let ws_url = format!("{scheme}{}", &http_url[self.base_url.scheme().len()..]);

        let mut url =
            Url::parse(&ws_url).map_err(|e| Error::config(format!("Invalid socket URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("_csrf_token", csrf_token)
            .append_pair("_mounts", "0")
            .append_pair("_mount_attempts", "0")
            .append_pair("_live_referer", "undefined")
            .append_pair("vsn", &self.protocol_version);

        Ok(url)
    }

    fn join_path(&self, path: &str) -> String {
        format!(
            "{}{}",
            self.base_url.as_str().trim_end_matches('/'),
            path
        )
    }
}

// ============================================================================
// SessionConfigBuilder
// ============================================================================

/// Builder for [`SessionConfig`].
#[derive(Debug, Clone)]
pub struct SessionConfigBuilder {
    base_url: Option<String>,
    page_path: String,
    socket_path: String,
    protocol_version: String,
    user_agent: String,
    reply_timeout: Duration,
    heartbeat_interval: Duration,
    http_timeout: Duration,
}

impl Default for SessionConfigBuilder {
    fn default() -> Self {
        Self {
            base_url: None,
            page_path: DEFAULT_PAGE_PATH.to_string(),
            socket_path: DEFAULT_SOCKET_PATH.to_string(),
            protocol_version: DEFAULT_PROTOCOL_VERSION.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

impl SessionConfigBuilder {
    /// Creates a builder with default paths and timeouts.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the host base URL (`https://host[:port]`).
    #[inline]
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the path of the token page.
    #[inline]
    #[must_use]
    pub fn page_path(mut self, path: impl Into<String>) -> Self {
        self.page_path = path.into();
        self
    }

    /// Sets the path of the socket endpoint.
    #[inline]
    #[must_use]
    pub fn socket_path(mut self, path: impl Into<String>) -> Self {
        self.socket_path = path.into();
        self
    }

    /// Sets the `vsn` query parameter.
    #[inline]
    #[must_use]
    pub fn protocol_version(mut self, version: impl Into<String>) -> Self {
        self.protocol_version = version.into();
        self
    }

    /// Sets the user agent.
    #[inline]
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Sets the deadline for correlated requests.
    #[inline]
    #[must_use]
    pub fn reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    /// Sets the keep-alive period.
    #[inline]
    #[must_use]
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Sets the HTTP and handshake deadline.
    #[inline]
    #[must_use]
    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Builds the configuration with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the base URL is missing or not `http(s)`
    /// - [`Error::Config`] if a path does not start with `/`
    /// - [`Error::Config`] if a timeout or interval is zero
    pub fn build(self) -> Result<SessionConfig> {
        let base_url = self.validate_base_url()?;
        Self::validate_path("page path", &self.page_path)?;
        Self::validate_path("socket path", &self.socket_path)?;

        if self.reply_timeout.is_zero()
            || self.heartbeat_interval.is_zero()
            || self.http_timeout.is_zero()
        {
            return Err(Error::config("Timeouts and intervals must be non-zero"));
        }

        Ok(SessionConfig {
            base_url,
            page_path: self.page_path,
            socket_path: self.socket_path,
            protocol_version: self.protocol_version,
            user_agent: self.user_agent,
            reply_timeout: self.reply_timeout,
            heartbeat_interval: self.heartbeat_interval,
            http_timeout: self.http_timeout,
        })
    }
}

// ============================================================================
// Validation
// ============================================================================

impl SessionConfigBuilder {
    fn validate_base_url(&self) -> Result<Url> {
        let raw = self.base_url.as_deref().ok_or_else(|| {
            Error::config(
                "Base URL is required. Use .base_url() to set it.\n\
                 Example: SessionConfig::builder().base_url(\"https://app.example.com\")",
            )
        })?;

        let url = Url::parse(raw).map_err(|e| Error::config(format!("Invalid base URL {raw}: {e}")))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::config(format!(
                "Base URL must use http or https, got: {}",
                url.scheme()
            )));
        }

        if url.host_str().is_none() {
            return Err(Error::config(format!("Base URL has no host: {raw}")));
        }

        Ok(url)
    }

    fn validate_path(name: &str, path: &str) -> Result<()> {
        if path.starts_with('/') {
            Ok(())
        } else {
            Err(Error::config(format!("{name} must start with '/': {path}")))
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
