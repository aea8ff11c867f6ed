//! Protocol session state machine.
//!
//! ```text
//! Idle ──connect──► TokensFetched ──open──► Connected ──join──► Joined
//!   │                     │                     │                  │
//!   └──────── any error ──┴──────► Failed ◄─────┴──────────────────┘
//!
//! any state ──close──► Closed
//! ```
//!
//! Tokens are scraped once per session; every correlated request carries a
//! fresh reference from the session's [`RefCounter`].

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::identifiers::{JoinRef, RefCounter, Topic};
use crate::protocol::{FormEvent, Frame, JoinPayload, events};
use crate::transport::{self, Connection, TransportState};

use super::config::SessionConfig;
use super::tokens::{TokenScraper, Tokens};

// ============================================================================
// SessionState
// ============================================================================

/// Lifecycle state of a [`ProtocolSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, nothing fetched.
    Idle,
    /// Tokens scraped, socket not open.
    TokensFetched,
    /// Socket open, channel not joined.
    Connected,
    /// Channel joined; events may be submitted.
    Joined,
    /// Closed by the caller.
    Closed,
    /// An operation failed; only `close` is allowed.
    Failed,
}

impl SessionState {
    /// Returns the lowercase state name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::TokensFetched => "tokens-fetched",
            Self::Connected => "connected",
            Self::Joined => "joined",
            Self::Closed => "closed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ProtocolSession
// ============================================================================

/// One authenticated LiveView session.
///
/// # Example
///
/// ```no_run
/// use mcp_live_sync::{ProtocolSession, SessionConfig};
///
/// # async fn example() -> mcp_live_sync::Result<()> {
/// let config = SessionConfig::builder()
///     .base_url("https://app.example.com")
///     .build()?;
///
/// let mut session = ProtocolSession::new(config, "_app_key=...")?;
/// session.connect().await?;
/// let rendered = session.join().await?;
/// session.close().await;
/// # Ok(())
/// # }
/// ```
pub struct ProtocolSession {
    config: SessionConfig,
    cookie: String,
    scraper: TokenScraper,
    tokens: Option<Tokens>,
    refs: Arc<RefCounter>,
    connection: Option<Connection>,
    connecting: bool,
    join_ref: Option<JoinRef>,
    topic: Option<Topic>,
    state: SessionState,
}

impl fmt::Debug for ProtocolSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolSession")
            .field("state", &self.state)
            .field("transport", &self.transport_state())
            .field("topic", &self.topic)
            .field("join_ref", &self.join_ref)
            .finish_non_exhaustive()
    }
}

impl ProtocolSession {
    /// Creates an idle session.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the cookie is empty
    /// - [`Error::Network`] if the HTTP client cannot be built
    pub fn new(config: SessionConfig, cookie: impl Into<String>) -> Result<Self> {
        let cookie = cookie.into();
        if cookie.trim().is_empty() {
            return Err(Error::config("Session cookie is empty"));
        }

        let scraper = TokenScraper::new(&config)?;

        Ok(Self {
            config,
            cookie,
            scraper,
            tokens: None,
            refs: Arc::new(RefCounter::new()),
            connection: None,
            connecting: false,
            join_ref: None,
            topic: None,
            state: SessionState::Idle,
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Returns the lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Returns the socket state.
    #[must_use]
    pub fn transport_state(&self) -> TransportState {
        match &self.connection {
            Some(connection) => connection.state(),
            None if self.connecting => TransportState::Connecting,
            None => TransportState::Disconnected,
        }
    }

    /// Returns the scraped tokens, if fetched.
    #[inline]
    #[must_use]
    pub fn tokens(&self) -> Option<&Tokens> {
        self.tokens.as_ref()
    }

    /// Returns the join reference, set once a join was attempted.
    #[inline]
    #[must_use]
    pub fn join_ref(&self) -> Option<JoinRef> {
        self.join_ref
    }

    /// Returns the joined topic.
    #[inline]
    #[must_use]
    pub fn topic(&self) -> Option<&Topic> {
        self.topic.as_ref()
    }

    /// Returns the number of requests awaiting a reply.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.connection
            .as_ref()
            .map_or(0, Connection::pending_count)
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Scrapes tokens and opens the socket.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] unless the session is idle
    /// - [`Error::Network`] if the token page cannot be fetched
    /// - [`Error::Auth`] if the page has no CSRF token (no socket is opened)
    /// - [`Error::Connect`] if the socket handshake fails
    pub async fn connect(&mut self) -> Result<()> {
        self.expect_state(SessionState::Idle)?;

        let result = self.connect_inner().await;
        self.connecting = false;
        self.track(result)
    }

    async fn connect_inner(&mut self) -> Result<()> {
        let tokens = self.scraper.fetch_tokens(&self.cookie).await?;
        let tokens = self.tokens.insert(tokens);

        let Some(csrf) = tokens.csrf.clone() else {
            return Err(Error::auth(
                "No CSRF token on the page; the session cookie may have expired",
            ));
        };

        self.transition(SessionState::TokensFetched);
        self.connecting = true;

        let connection =
            transport::open(&self.config, &csrf, &self.cookie, Arc::clone(&self.refs)).await?;
        self.connection = Some(connection);

        self.transition(SessionState::Connected);
        Ok(())
    }

    /// Joins the LiveView channel and returns the join response.
    ///
    /// The response carries the `rendered` tree.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] unless the session is connected
    /// - [`Error::Protocol`] if no element id was scraped or the server
    ///   replies with an error
    /// - [`Error::Timeout`] if no reply arrives in time
    pub async fn join(&mut self) -> Result<Value> {
        self.expect_state(SessionState::Connected)?;

        let result = self.join_inner().await;
        self.track(result)
    }

    async fn join_inner(&mut self) -> Result<Value> {
        let tokens = self.tokens.as_ref().ok_or_else(|| Error::auth("Tokens not fetched"))?;
        let element_id = tokens
            .element_id
            .as_deref()
            .ok_or_else(|| Error::protocol("No LiveView element id on the page; cannot derive topic"))?;

        let topic = Topic::live_view(element_id);
        let payload = JoinPayload::new(
            self.config.page_url(),
            tokens.csrf.as_deref().unwrap_or_default(),
            tokens.session_or_empty(),
            tokens.static_or_empty(),
        )
        .to_value()?;

        let message_ref = self.refs.next();
        let join_ref = JoinRef::from_message_ref(message_ref);
        self.join_ref = Some(join_ref);

        let frame = Frame::new(
            Some(join_ref),
            Some(message_ref),
            topic.clone(),
            events::JOIN,
            payload,
        );

        debug!(%topic, %message_ref, "Joining channel");
        let response = self
            .connection()?
            .request(frame, "join", self.config.reply_timeout())
            .await?
            .into_result()?;

        self.topic = Some(topic);
        self.transition(SessionState::Joined);
        Ok(response)
    }

    /// Pushes a correlated event on the joined channel and returns the reply.
    ///
    /// # Arguments
    ///
    /// * `topic` - Must be the joined topic
    /// * `event` - Frame event name (`"event"` for LiveView client events)
    /// * `payload` - Frame payload
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] unless the session is joined
    /// - [`Error::Protocol`] for a foreign topic or an error reply
    /// - [`Error::Timeout`] if no reply arrives in time
    pub async fn submit_event(&mut self, topic: &Topic, event: &str, payload: Value) -> Result<Value> {
        self.expect_state(SessionState::Joined)?;

        if self.topic.as_ref() != Some(topic) {
            return Err(Error::protocol(format!(
                "Topic {topic} is not the joined channel"
            )));
        }

        let result = self.submit_inner(topic, event, payload).await;
        self.track(result)
    }

    async fn submit_inner(&mut self, topic: &Topic, event: &str, payload: Value) -> Result<Value> {
        let message_ref = self.refs.next();
        let frame = Frame::new(self.join_ref, Some(message_ref), topic.clone(), event, payload);

        debug!(%topic, %message_ref, event, "Submitting event");
        self.connection()?
            .request(frame, event, self.config.reply_timeout())
            .await?
            .into_result()
    }

    /// Submits a `save_config` form carrying `config`.
    ///
    /// # Errors
    ///
    /// Same as [`ProtocolSession::submit_event`].
    pub async fn save_config(&mut self, config: &Value) -> Result<Value> {
        let topic = self
            .topic
            .clone()
            .ok_or_else(|| Error::invalid_state(SessionState::Joined.as_str(), self.state.as_str()))?;
        let payload = FormEvent::save_config(config)?.to_value()?;

        self.submit_event(&topic, events::EVENT, payload).await
    }

    /// Closes the session.
    ///
    /// Stops the heartbeat, closes the socket and fails outstanding
    /// requests. Closing twice is a no-op.
    pub async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }

        if let Some(connection) = self.connection.take() {
            connection.close().await;
        }

        self.transition(SessionState::Closed);
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn connection(&self) -> Result<&Connection> {
        self.connection.as_ref().ok_or(Error::SessionClosed)
    }

    fn expect_state(&self, expected: SessionState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(Error::invalid_state(expected.as_str(), self.state.as_str()))
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug!(from = %self.state, to = %next, transport = %self.transport_state(), "Session state");
        if next == SessionState::Joined {
            info!(topic = ?self.topic.as_ref().map(Topic::as_str), "Channel joined");
        }
        self.state = next;
    }

    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            warn!(error = %e, state = %self.state, "Session operation failed");
            self.transition(SessionState::Failed);
        }
        result
    }
}

impl Drop for ProtocolSession {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.shutdown();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
