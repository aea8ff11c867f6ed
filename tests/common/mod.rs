//! Shared helpers for integration tests.
//!
//! [`FakeLiveView`] serves the token page over plain HTTP and the channel
//! socket over WebSocket on the same local port, following a [`Script`].
//!
//! Each integration test file compiles common/ as its own module, so not
//! every helper is used in every file.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use mcp_live_sync::SessionConfig;

pub const CSRF: &str = "csrf-abc";
pub const ELEMENT_ID: &str = "phx-F1a2b3";
pub const COOKIE: &str = "_app_key=test";

// ============================================================================
// Script
// ============================================================================

/// How the fake server answers the token page.
#[derive(Debug, Clone)]
pub enum Page {
    Html(String),
    Redirect(&'static str),
}

/// How the fake server answers `phx_join`.
#[derive(Debug, Clone)]
pub enum JoinReply {
    Ok(Value),
    Error(&'static str),
    Silent,
    Delayed(Duration, Value),
}

/// How the fake server answers client `event` pushes.
#[derive(Debug, Clone)]
pub enum EventReply {
    Ok(Value),
    Error(&'static str),
    Silent,
}

/// Scripted server behavior.
#[derive(Debug, Clone)]
pub struct Script {
    pub page: Page,
    pub join: JoinReply,
    pub event: EventReply,
}

impl Script {
    /// Full page and a join reply rendering `config` at the primary path.
    pub fn with_config(config: &str) -> Self {
        Self {
            page: Page::Html(page_html(Some(CSRF), Some(ELEMENT_ID))),
            join: JoinReply::Ok(rendered_response(config)),
            event: EventReply::Ok(json!({})),
        }
    }

    /// Joinable page whose `event` pushes are answered by `event`.
    pub fn with_event_reply(event: EventReply) -> Self {
        Self {
            event,
            ..Self::with_config(r#"{"mcpServers":{}}"#)
        }
    }
}

/// LiveView page carrying the requested tokens.
pub fn page_html(csrf: Option<&str>, element_id: Option<&str>) -> String {
    let meta = csrf
        .map(|token| format!(r#"<meta name="csrf-token" content="{token}">"#))
        .unwrap_or_default();
    let id = element_id
        .map(|id| format!(r#" id="{id}""#))
        .unwrap_or_default();

    format!(
        "<html><head>{meta}</head><body>\
         <div{id} data-phx-main data-phx-session=\"SESSION\" data-phx-static=\"STATIC\"></div>\
         </body></html>"
    )
}

/// Join response whose rendered tree holds `config` HTML-escaped.
pub fn rendered_response(config: &str) -> Value {
    let escaped = config.replace('&', "&amp;").replace('"', "&quot;");
    json!({
        "rendered": {
            "0": { "8": { "3": escaped } },
            "s": ["<div>", "</div>"]
        }
    })
}

// ============================================================================
// FakeLiveView
// ============================================================================

/// Local LiveView stand-in.
pub struct FakeLiveView {
    addr: SocketAddr,
    socket_connections: Arc<AtomicUsize>,
    page_requests: Arc<AtomicUsize>,
    frames: mpsc::UnboundedReceiver<Value>,
    task: JoinHandle<()>,
}

impl FakeLiveView {
    pub async fn start(script: Script) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("should bind fake server");
        let addr = listener.local_addr().expect("local addr");
        let socket_connections = Arc::new(AtomicUsize::new(0));
        let page_requests = Arc::new(AtomicUsize::new(0));
        let (frames_tx, frames) = mpsc::unbounded_channel();

        let counters = Counters {
            sockets: Arc::clone(&socket_connections),
            pages: Arc::clone(&page_requests),
        };
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let script = script.clone();
                let counters = counters.clone();
                let frames_tx = frames_tx.clone();
                tokio::spawn(handle_stream(stream, script, counters, frames_tx));
            }
        });

        Self {
            addr,
            socket_connections,
            page_requests,
            frames,
            task,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn config(&self) -> SessionConfig {
        self.config_with_timeout(Duration::from_secs(5))
    }

    pub fn config_with_timeout(&self, reply_timeout: Duration) -> SessionConfig {
        SessionConfig::builder()
            .base_url(self.base_url())
            .reply_timeout(reply_timeout)
            .http_timeout(Duration::from_secs(5))
            .build()
            .expect("valid config")
    }

    /// Number of WebSocket upgrades accepted so far.
    pub fn socket_connections(&self) -> usize {
        self.socket_connections.load(Ordering::SeqCst)
    }

    /// Number of token page requests served so far.
    pub fn page_requests(&self) -> usize {
        self.page_requests.load(Ordering::SeqCst)
    }

    /// Next non-heartbeat frame the client sent.
    pub async fn next_frame(&mut self) -> Value {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(5), self.frames.recv())
                .await
                .expect("frame within timeout")
                .expect("server alive");
            if frame[3] != "heartbeat" {
                return frame;
            }
        }
    }
}

impl Drop for FakeLiveView {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// ============================================================================
// Handlers
// ============================================================================

#[derive(Clone)]
struct Counters {
    sockets: Arc<AtomicUsize>,
    pages: Arc<AtomicUsize>,
}

async fn handle_stream(
    stream: TcpStream,
    script: Script,
    counters: Counters,
    frames_tx: mpsc::UnboundedSender<Value>,
) {
    let Some(head) = peek_head(&stream).await else {
        return;
    };

    if head.to_ascii_lowercase().contains("upgrade: websocket") {
        counters.sockets.fetch_add(1, Ordering::SeqCst);
        serve_socket(stream, script, frames_tx).await;
    } else {
        counters.pages.fetch_add(1, Ordering::SeqCst);
        serve_page(stream, &script.page).await;
    }
}

async fn peek_head(stream: &TcpStream) -> Option<String> {
    let mut buf = vec![0u8; 8192];
    for _ in 0..100 {
        let n = stream.peek(&mut buf).await.ok()?;
        let head = String::from_utf8_lossy(&buf[..n]).into_owned();
        if head.contains("\r\n\r\n") {
            return Some(head);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    None
}

async fn serve_page(mut stream: TcpStream, page: &Page) {
    let mut received = Vec::new();
    let mut buf = [0u8; 1024];
    while !received.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => received.extend_from_slice(&buf[..n]),
        }
    }

    let response = match page {
        Page::Html(body) => format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        ),
        Page::Redirect(location) => format!(
            "HTTP/1.1 302 Found\r\nLocation: {location}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
        ),
    };

    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

async fn serve_socket(stream: TcpStream, script: Script, frames_tx: mpsc::UnboundedSender<Value>) {
    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };

    while let Some(Ok(message)) = ws.next().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let Ok(frame) = serde_json::from_str::<Value>(&text) else {
            continue;
        };
        let _ = frames_tx.send(frame.clone());

        let reply = match frame[3].as_str() {
            Some("phx_join") => match &script.join {
                JoinReply::Ok(response) => Some(reply(&frame, "ok", response.clone())),
                JoinReply::Error(reason) => Some(reply(&frame, "error", json!({ "reason": reason }))),
                JoinReply::Silent => None,
                JoinReply::Delayed(delay, response) => {
                    tokio::time::sleep(*delay).await;
                    Some(reply(&frame, "ok", response.clone()))
                }
            },
            Some("heartbeat") => Some(reply(&frame, "ok", json!({}))),
            Some("event") => match &script.event {
                EventReply::Ok(response) => Some(reply(&frame, "ok", response.clone())),
                EventReply::Error(reason) => {
                    Some(reply(&frame, "error", json!({ "reason": reason })))
                }
                EventReply::Silent => None,
            },
            _ => None,
        };

        if let Some(reply) = reply {
            if ws.send(Message::text(reply.to_string())).await.is_err() {
                break;
            }
        }
    }
}

fn reply(frame: &Value, status: &str, response: Value) -> Value {
    json!([
        frame[0],
        frame[1],
        frame[2],
        "phx_reply",
        { "status": status, "response": response }
    ])
}
