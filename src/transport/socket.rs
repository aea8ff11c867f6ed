//! Socket handshake.
//!
//! Opens the LiveView WebSocket the way a browser tab would:
//!
//! 1. Build `wss://host/live/websocket?_csrf_token=..&vsn=2.0.0`
//! 2. Attach `Cookie`, `Origin` and `User-Agent` to the upgrade request
//! 3. Complete the upgrade within the handshake deadline
//! 4. Hand the stream to [`Connection`]

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::{COOKIE, ORIGIN, USER_AGENT};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::identifiers::RefCounter;
use crate::session::SessionConfig;

use super::Connection;

// ============================================================================
// Public Functions
// ============================================================================

/// Opens the channel socket and starts its event loop.
///
/// # Arguments
///
/// * `config` - Session configuration (URLs, timeouts, user agent)
/// * `csrf_token` - CSRF token placed in the connect query
/// * `cookie` - Session cookie sent with the upgrade request
/// * `refs` - Session reference counter, shared with the heartbeat
///
/// # Errors
///
/// - [`Error::Network`] if the TCP/TLS connection cannot be established
/// - [`Error::Connect`] if the upgrade is refused or times out
pub async fn open(
    config: &SessionConfig,
    csrf_token: &str,
    cookie: &str,
    refs: Arc<RefCounter>,
) -> Result<Connection> {
    let url = config.socket_url(csrf_token)?;
    debug!(host = url.host_str().unwrap_or_default(), path = url.path(), "Opening socket");

    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|e| Error::connect(format!("Invalid socket request: {e}")))?;

    let headers = request.headers_mut();
    headers.insert(COOKIE, header_value(cookie, "Cookie")?);
    headers.insert(ORIGIN, header_value(&config.origin(), "Origin")?);
    headers.insert(USER_AGENT, header_value(config.user_agent(), "User-Agent")?);

    let handshake = timeout(
        config.http_timeout(),
        tokio_tungstenite::connect_async(request),
    )
    .await
    .map_err(|_| {
        Error::connect(format!(
            "Handshake timed out after {}ms",
            config.http_timeout().as_millis()
        ))
    })?;

    let (ws_stream, response) = handshake.map_err(map_handshake_error)?;

    info!(status = response.status().as_u16(), "Socket open");

    Ok(Connection::new(ws_stream, config.heartbeat_interval(), refs))
}

// ============================================================================
// Internal Functions
// ============================================================================

fn header_value(value: &str, name: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| Error::config(format!("{name} contains invalid header characters")))
}

fn map_handshake_error(err: WsError) -> Error {
    match err {
        WsError::Io(e) => Error::network(format!("Socket connection failed: {e}")),
        WsError::Tls(e) => Error::network(format!("TLS handshake failed: {e}")),
        WsError::Http(response) => Error::connect(format!(
            "Upgrade rejected with HTTP {}",
            response.status().as_u16()
        )),
        other => Error::connect(other.to_string()),
    }
}

// ============================================================================
// Tests
// ============================================================================
