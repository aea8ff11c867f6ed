//! Channel connection and event loop.
//!
//! This module owns the LiveView socket, including request/reply
//! correlation and the keep-alive.
//!
//! # Event Loop
//!
//! The connection spawns a tokio task that handles:
//!
//! - Incoming frames from the server (replies, diffs, channel errors)
//! - Outgoing frames from the session, in call order
//! - Reply correlation by `(topic, ref)`
//! - The heartbeat timer

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, timeout};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::{MessageRef, RefCounter, Topic};
use crate::protocol::{Frame, HEARTBEAT_TOPIC, Reply, events};

// ============================================================================
// Constants
// ============================================================================

/// Maximum pending requests before rejecting new ones.
const MAX_PENDING_REQUESTS: usize = 100;

/// Grace period for the event loop to close the socket before it is aborted.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

// ============================================================================
// Types
// ============================================================================

/// Correlation key of a pending request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PendingKey {
    /// Topic the reply must arrive on.
    pub topic: Topic,
    /// Reference the reply must carry.
    pub message_ref: MessageRef,
}

/// Map of pending keys to reply channels.
type CorrelationMap = FxHashMap<PendingKey, oneshot::Sender<Result<Reply>>>;

// ============================================================================
// TransportState
// ============================================================================

/// Socket state as seen by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// No socket, or the socket has closed.
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Socket open; frames may be sent.
    Connected,
}

impl TransportState {
    /// Returns the lowercase state name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ConnectionCommand
// ============================================================================

/// Internal commands for the event loop.
enum ConnectionCommand {
    /// Write a frame; `pending` is set for correlated requests.
    Send {
        frame: Frame,
        pending: Option<PendingKey>,
    },
    /// Close the socket and stop the loop.
    Shutdown,
}

// ============================================================================
// Connection
// ============================================================================

/// Socket connection to the LiveView server.
///
/// Handles reply correlation and the heartbeat.
/// The connection spawns an internal event loop task.
///
/// # Thread Safety
///
/// `Connection` is `Send + Sync` and can be shared across tasks.
#[derive(Clone)]
pub struct Connection {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    /// Correlation map (shared with event loop).
    correlation: Arc<Mutex<CorrelationMap>>,
    /// Socket state (shared with event loop).
    state: Arc<Mutex<TransportState>>,
    /// Event loop task, taken on close.
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("state", &*self.state.lock())
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Creates a new connection from an open WebSocket stream.
    ///
    /// Spawns the event loop task internally. The first heartbeat goes out
    /// one `heartbeat_interval` after this call.
    pub fn new<S>(
        ws_stream: WebSocketStream<S>,
        heartbeat_interval: Duration,
        refs: Arc<RefCounter>,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let correlation = Arc::new(Mutex::new(CorrelationMap::default()));
        let state = Arc::new(Mutex::new(TransportState::Connected));

        let task = tokio::spawn(Self::run_event_loop(
            ws_stream,
            command_rx,
            Arc::clone(&correlation),
            Arc::clone(&state),
            heartbeat_interval,
            refs,
        ));

        Self {
            command_tx,
            correlation,
            state,
            task: Arc::new(Mutex::new(Some(task))),
        }
    }

    /// Sends a correlated frame and waits for its reply.
    ///
    /// The frame must carry a message reference. The pending entry is
    /// removed on every outcome.
    ///
    /// # Arguments
    ///
    /// * `frame` - Frame to send
    /// * `operation` - Name used in timeout errors and logs
    /// * `reply_timeout` - Maximum time to wait for the reply
    ///
    /// # Errors
    ///
    /// - [`Error::SessionClosed`] if the connection is closed
    /// - [`Error::Timeout`] if no reply arrives within `reply_timeout`
    /// - [`Error::Protocol`] if the frame has no reference, the key is
    ///   already pending, or too many requests are pending
    pub async fn request(
        &self,
        frame: Frame,
        operation: &str,
        reply_timeout: Duration,
    ) -> Result<Reply> {
        let message_ref = frame
            .message_ref
            .ok_or_else(|| Error::protocol(format!("{operation} frame has no message ref")))?;
        let key = PendingKey {
            topic: frame.topic.clone(),
            message_ref,
        };

        let (response_tx, response_rx) = oneshot::channel();
        self.register(key.clone(), response_tx)?;

        // The loop marks the state before draining, so a closed loop is seen here.
        if *self.state.lock() != TransportState::Connected {
            self.correlation.lock().remove(&key);
            return Err(Error::SessionClosed);
        }

        if self
            .command_tx
            .send(ConnectionCommand::Send {
                frame,
                pending: Some(key.clone()),
            })
            .is_err()
        {
            self.correlation.lock().remove(&key);
            return Err(Error::SessionClosed);
        }

        match timeout(reply_timeout, response_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::SessionClosed),
            Err(_) => {
                self.correlation.lock().remove(&key);
                debug!(%message_ref, topic = %key.topic, "Removed timed-out correlation");

                Err(Error::timeout(
                    operation,
                    message_ref,
                    reply_timeout.as_millis() as u64,
                ))
            }
        }
    }

    /// Returns the number of pending requests.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.correlation.lock().len()
    }

    /// Returns `true` if a request is pending for `topic` and `message_ref`.
    #[must_use]
    pub fn is_pending(&self, topic: &Topic, message_ref: MessageRef) -> bool {
        self.correlation.lock().contains_key(&PendingKey {
            topic: topic.clone(),
            message_ref,
        })
    }

    /// Returns the socket state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> TransportState {
        *self.state.lock()
    }

    /// Asks the event loop to close the socket without waiting for it.
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(ConnectionCommand::Shutdown);
    }

    /// Closes the socket and stops the heartbeat.
    ///
    /// Outstanding requests fail with [`Error::SessionClosed`]. Safe to call
    /// more than once.
    pub async fn close(&self) {
        self.shutdown();

        let task = self.task.lock().take();
        if let Some(mut task) = task
            && timeout(CLOSE_GRACE, &mut task).await.is_err()
        {
            warn!("Event loop did not stop in time; aborting");
            task.abort();
        }

        *self.state.lock() = TransportState::Disconnected;
        Self::fail_pending_requests(&self.correlation);
    }

    /// Inserts a correlation entry after checking limits.
    fn register(&self, key: PendingKey, response_tx: oneshot::Sender<Result<Reply>>) -> Result<()> {
        let mut correlation = self.correlation.lock();

        if correlation.len() >= MAX_PENDING_REQUESTS {
            warn!(
                pending = correlation.len(),
                max = MAX_PENDING_REQUESTS,
                "Too many pending requests"
            );
            return Err(Error::protocol(format!(
                "Too many pending requests: {}/{}",
                correlation.len(),
                MAX_PENDING_REQUESTS
            )));
        }

        if correlation.contains_key(&key) {
            return Err(Error::protocol(format!(
                "Request {} already pending on {}",
                key.message_ref, key.topic
            )));
        }

        correlation.insert(key, response_tx);
        Ok(())
    }

    /// Event loop that handles WebSocket I/O.
    async fn run_event_loop<S>(
        ws_stream: WebSocketStream<S>,
        mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
        correlation: Arc<Mutex<CorrelationMap>>,
        state: Arc<Mutex<TransportState>>,
        heartbeat_interval: Duration,
        refs: Arc<RefCounter>,
    ) where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        let mut heartbeat = interval_at(Instant::now() + heartbeat_interval, heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                // Incoming frames from server
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            Self::handle_incoming_frame(&text, &correlation);
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!("WebSocket closed by remote");
                            break;
                        }

                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket error");
                            break;
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            break;
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                // Commands from session
                command = command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Send { frame, pending }) => {
                            Self::handle_send_command(frame, pending, &mut ws_write, &correlation)
                                .await;
                        }

                        Some(ConnectionCommand::Shutdown) => {
                            debug!("Shutdown command received");
                            let _ = ws_write.close().await;
                            break;
                        }

                        None => {
                            debug!("Command channel closed");
                            break;
                        }
                    }
                }

                // Keep-alive
                _ = heartbeat.tick() => {
                    if *state.lock() != TransportState::Connected {
                        continue;
                    }

                    let frame = Frame::heartbeat(refs.next());
                    trace!(message_ref = ?frame.message_ref, "Heartbeat");
                    Self::handle_send_command(frame, None, &mut ws_write, &correlation).await;
                }
            }
        }

        *state.lock() = TransportState::Disconnected;

        // Fail all pending requests on shutdown
        Self::fail_pending_requests(&correlation);

        debug!("Event loop terminated");
    }

    /// Handles an incoming text frame from the server.
    fn handle_incoming_frame(text: &str, correlation: &Arc<Mutex<CorrelationMap>>) {
        let frame = match Frame::decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Failed to parse incoming frame");
                return;
            }
        };

        match frame.event.as_str() {
            events::REPLY => Self::handle_reply(frame, correlation),

            events::ERROR | events::CLOSE => {
                warn!(topic = %frame.topic, event = %frame.event, "Channel terminated by server");
                Self::fail_topic_requests(
                    correlation,
                    &frame.topic,
                    &format!("channel {} received {}", frame.topic, frame.event),
                );
            }

            _ => {
                trace!(topic = %frame.topic, event = %frame.event, "Server push ignored");
            }
        }
    }

    /// Resolves the pending request matching a reply frame.
    fn handle_reply(frame: Frame, correlation: &Arc<Mutex<CorrelationMap>>) {
        let Some(message_ref) = frame.message_ref else {
            warn!(topic = %frame.topic, "Reply without message ref");
            return;
        };

        let key = PendingKey {
            topic: frame.topic,
            message_ref,
        };
        let tx = correlation.lock().remove(&key);

        match tx {
            Some(tx) => {
                let _ = tx.send(Reply::from_payload(frame.payload));
            }
            None if key.topic.as_str() == HEARTBEAT_TOPIC => {
                trace!(%message_ref, "Heartbeat acknowledged");
            }
            None => {
                warn!(%message_ref, topic = %key.topic, "Reply for unknown request");
            }
        }
    }

    /// Writes a frame to the socket.
    async fn handle_send_command<S>(
        frame: Frame,
        pending: Option<PendingKey>,
        ws_write: &mut SplitSink<WebSocketStream<S>, Message>,
        correlation: &Arc<Mutex<CorrelationMap>>,
    ) where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let result = match frame.encode() {
            Ok(text) => ws_write
                .send(Message::Text(text.into()))
                .await
                .map_err(Error::from),
            Err(e) => Err(e),
        };

        match (result, pending) {
            (Ok(()), _) => {
                trace!(topic = %frame.topic, event = %frame.event, "Frame sent");
            }
            (Err(e), Some(key)) => {
                if let Some(tx) = correlation.lock().remove(&key) {
                    let _ = tx.send(Err(e));
                }
            }
            (Err(e), None) => {
                warn!(error = %e, event = %frame.event, "Failed to send frame");
            }
        }
    }

    /// Fails pending requests on one topic with a protocol error.
    fn fail_topic_requests(correlation: &Arc<Mutex<CorrelationMap>>, topic: &Topic, reason: &str) {
        let failed: Vec<_> = {
            let mut correlation = correlation.lock();
            let keys: Vec<PendingKey> = correlation
                .keys()
                .filter(|key| &key.topic == topic)
                .cloned()
                .collect();
            keys.into_iter()
                .filter_map(|key| correlation.remove(&key))
                .collect()
        };

        for tx in failed {
            let _ = tx.send(Err(Error::protocol(reason)));
        }
    }

    /// Fails all pending requests with a session-closed error.
    fn fail_pending_requests(correlation: &Arc<Mutex<CorrelationMap>>) {
        let pending: Vec<_> = correlation.lock().drain().collect();
        let count = pending.len();

        for (_, tx) in pending {
            let _ = tx.send(Err(Error::SessionClosed));
        }

        if count > 0 {
            debug!(count, "Failed pending requests on shutdown");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use tokio::io::{DuplexStream, duplex};
    use tokio_tungstenite::tungstenite::protocol::Role;

    use crate::identifiers::JoinRef;

    const LONG: Duration = Duration::from_secs(60);

    async fn pair(heartbeat: Duration) -> (Connection, WebSocketStream<DuplexStream>, Arc<RefCounter>) {
        let (client_io, server_io) = duplex(64 * 1024);
        let client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
        let server = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
        let refs = Arc::new(RefCounter::new());
        (Connection::new(client, heartbeat, Arc::clone(&refs)), server, refs)
    }

    async fn next_frame(server: &mut WebSocketStream<DuplexStream>) -> Frame {
        loop {
            match server.next().await.expect("stream open").expect("frame") {
                Message::Text(text) => return Frame::decode(&text).expect("decode"),
                _ => continue,
            }
        }
    }

    async fn reply(server: &mut WebSocketStream<DuplexStream>, to: &Frame, payload: serde_json::Value) {
        let frame = Frame::new(
            to.join_ref,
            to.message_ref,
            to.topic.clone(),
            events::REPLY,
            payload,
        );
        server
            .send(Message::Text(frame.encode().expect("encode").into()))
            .await
            .expect("send");
    }

    fn join_frame(refs: &RefCounter) -> Frame {
        let message_ref = refs.next();
        Frame::new(
            Some(JoinRef::from_message_ref(message_ref)),
            Some(message_ref),
            Topic::live_view("phx-test"),
            events::JOIN,
            json!({}),
        )
    }

    #[test]
    fn test_constants() {
        assert_eq!(MAX_PENDING_REQUESTS, 100);
        assert_eq!(TransportState::Connected.to_string(), "connected");
    }

    #[tokio::test]
    async fn test_request_reply_correlation() {
        let (connection, mut server, refs) = pair(LONG).await;
        let frame = join_frame(&refs);

        let client = connection.clone();
        let request = tokio::spawn(async move { client.request(frame, "join", LONG).await });

        let sent = next_frame(&mut server).await;
        assert_eq!(sent.event, events::JOIN);
        assert_eq!(connection.pending_count(), 1);

        reply(&mut server, &sent, json!({ "status": "ok", "response": { "x": 1 } })).await;

        let reply = request.await.expect("join task").expect("reply");
        assert!(reply.is_ok());
        assert_eq!(reply.response["x"], 1);
        assert_eq!(connection.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_reply_on_wrong_topic_is_ignored() {
        let (connection, mut server, refs) = pair(LONG).await;
        let frame = join_frame(&refs);

        let client = connection.clone();
        let request =
            tokio::spawn(async move { client.request(frame, "join", Duration::from_millis(300)).await });

        let mut sent = next_frame(&mut server).await;
        sent.topic = Topic::new("lv:other");
        reply(&mut server, &sent, json!({ "status": "ok", "response": {} })).await;

        let err = request.await.expect("join task").expect_err("no matching reply");
        assert!(err.is_timeout());
        assert_eq!(connection.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_timeout_removes_pending() {
        let (connection, mut server, refs) = pair(LONG).await;
        let frame = join_frame(&refs);
        let topic = frame.topic.clone();
        let message_ref = frame.message_ref.expect("ref");

        let err = connection
            .request(frame, "join", Duration::from_millis(50))
            .await
            .expect_err("timeout");

        assert!(err.is_timeout());
        assert!(!connection.is_pending(&topic, message_ref));

        // A late reply with the stale ref matches nothing.
        let sent = next_frame(&mut server).await;
        reply(&mut server, &sent, json!({ "status": "ok", "response": {} })).await;
        assert_eq!(connection.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_key_rejected() {
        let (connection, _server, refs) = pair(LONG).await;
        let frame = join_frame(&refs);
        let duplicate = frame.clone();

        let client = connection.clone();
        let _first = tokio::spawn(async move { client.request(frame, "join", LONG).await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let err = connection
            .request(duplicate, "join", LONG)
            .await
            .expect_err("duplicate");
        assert!(err.is_protocol_error());
    }

    #[tokio::test]
    async fn test_heartbeat_sent() {
        let (_connection, mut server, _refs) = pair(Duration::from_millis(20)).await;

        let frame = next_frame(&mut server).await;
        assert_eq!(frame.topic.as_str(), HEARTBEAT_TOPIC);
        assert_eq!(frame.event, events::HEARTBEAT);
        assert_eq!(frame.join_ref, None);
        assert!(frame.message_ref.is_some());
    }

    #[tokio::test]
    async fn test_close_fails_pending() {
        let (connection, mut server, refs) = pair(LONG).await;
        let frame = join_frame(&refs);

        let client = connection.clone();
        let request = tokio::spawn(async move { client.request(frame, "join", LONG).await });
        let _ = next_frame(&mut server).await;

        connection.close().await;
        connection.close().await;

        let err = request.await.expect("join task").expect_err("closed");
        assert!(matches!(err, Error::SessionClosed));
        assert_eq!(connection.state(), TransportState::Disconnected);
    }

    #[tokio::test]
    async fn test_request_after_close() {
        let (connection, _server, refs) = pair(LONG).await;
        connection.close().await;

        let err = connection
            .request(join_frame(&refs), "join", LONG)
            .await
            .expect_err("closed");
        assert!(matches!(err, Error::SessionClosed));
        assert_eq!(connection.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_channel_error_fails_topic() {
        let (connection, mut server, refs) = pair(LONG).await;
        let frame = join_frame(&refs);

        let client = connection.clone();
        let request = tokio::spawn(async move { client.request(frame, "join", LONG).await });

        let sent = next_frame(&mut server).await;
        let crash = Frame::new(sent.join_ref, None, sent.topic.clone(), events::ERROR, json!({}));
        server
            .send(Message::Text(crash.encode().expect("encode").into()))
            .await
            .expect("send");

        let err = request.await.expect("join task").expect_err("channel error");
        assert!(err.is_protocol_error());
    }

    #[tokio::test]
    async fn test_send_failure_fails_request() {
        let (client_io, server_io) = duplex(1024);
        drop(server_io);
        let client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
        let (mut sink, _stream) = client.split();

        let topic = Topic::live_view("phx-abc");
        let key = PendingKey {
            topic: topic.clone(),
            message_ref: MessageRef::new(1),
        };
        let correlation = Arc::new(Mutex::new(CorrelationMap::default()));
        let (tx, rx) = oneshot::channel();
        correlation.lock().insert(key.clone(), tx);

        let frame = Frame::new(None, Some(key.message_ref), topic, events::EVENT, json!({}));
        Connection::handle_send_command(frame, Some(key), &mut sink, &correlation).await;

        let err = rx.await.expect("reply sent").expect_err("write failed");
        assert!(matches!(err, Error::WebSocket(_)), "got {err:?}");
        assert!(err.is_connection_error());
        assert!(correlation.lock().is_empty());
    }
}
