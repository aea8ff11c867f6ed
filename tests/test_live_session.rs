//! Integration tests for the session lifecycle against a local LiveView.
//!
//! Covers token scraping, the socket handshake, join, extraction and
//! `save_config` submission end to end.

mod common;

use std::collections::HashMap;
use std::time::Duration;

use serde_json::{Value, json};

use common::{
    COOKIE, CSRF, ELEMENT_ID, EventReply, FakeLiveView, JoinReply, Page, Script, page_html,
};
use mcp_live_sync::{
    ConfigConverter, Error, ProtocolSession, SessionState, Topic, TransportState, extract_config,
};

#[tokio::test]
async fn read_path_extracts_rendered_config() {
    let server = FakeLiveView::start(Script::with_config(
        r#"{"mcpServers":{"fs":{"command":"npx","args":["-y","a&b"]}}}"#,
    ))
    .await;

    let mut session = ProtocolSession::new(server.config(), COOKIE).expect("session");
    session.connect().await.expect("connect");
    assert_eq!(session.state(), SessionState::Connected);
    assert_eq!(session.tokens().and_then(|t| t.csrf.as_deref()), Some(CSRF));

    let response = session.join().await.expect("join");
    assert_eq!(session.state(), SessionState::Joined);
    assert_eq!(session.topic(), Some(&Topic::live_view(ELEMENT_ID)));

    let config = extract_config(&response).expect("extract");
    assert_eq!(config["mcpServers"]["fs"]["args"][1], "a&b");

    session.close().await;
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(session.transport_state(), TransportState::Disconnected);
    assert_eq!(server.socket_connections(), 1);
    assert_eq!(server.page_requests(), 1);
}

#[tokio::test]
async fn empty_server_list_extracts() {
    let server = FakeLiveView::start(Script::with_config(r#"{"mcpServers":{}}"#)).await;

    let mut session = ProtocolSession::new(server.config(), COOKIE).expect("session");
    session.connect().await.expect("connect");
    let response = session.join().await.expect("join");

    assert_eq!(extract_config(&response).expect("extract"), json!({"mcpServers": {}}));
    session.close().await;
}

#[tokio::test]
async fn join_frame_carries_tokens() {
    let mut server = FakeLiveView::start(Script::with_config(r#"{"mcpServers":{}}"#)).await;

    let mut session = ProtocolSession::new(server.config(), COOKIE).expect("session");
    session.connect().await.expect("connect");
    session.join().await.expect("join");

    let frame = server.next_frame().await;
    assert_eq!(frame[0], frame[1]);
    assert!(frame[1].is_string());
    assert_eq!(frame[2], format!("lv:{ELEMENT_ID}"));
    assert_eq!(frame[3], "phx_join");
    assert_eq!(frame[4]["session"], "SESSION");
    assert_eq!(frame[4]["static"], "STATIC");
    assert_eq!(frame[4]["params"]["_csrf_token"], CSRF);
    assert_eq!(frame[4]["params"]["_mounts"], 0);
    assert_eq!(frame[4]["url"], format!("{}/settings", server.base_url()));

    session.close().await;
}

#[tokio::test]
async fn redirect_fails_auth_without_socket() {
    let server = FakeLiveView::start(Script {
        page: Page::Redirect("/users/log_in"),
        join: JoinReply::Silent,
        event: EventReply::Ok(json!({})),
    })
    .await;

    let mut session = ProtocolSession::new(server.config(), COOKIE).expect("session");
    let err = session.connect().await.expect_err("redirect");

    assert!(matches!(err, Error::Auth { .. }), "got {err:?}");
    assert_eq!(session.state(), SessionState::Failed);
    assert_eq!(server.socket_connections(), 0);
}

#[tokio::test]
async fn missing_element_id_fails_join() {
    let server = FakeLiveView::start(Script {
        page: Page::Html(page_html(Some(CSRF), None)),
        join: JoinReply::Silent,
        event: EventReply::Ok(json!({})),
    })
    .await;

    let mut session = ProtocolSession::new(server.config(), COOKIE).expect("session");
    session.connect().await.expect("connect");
    let err = session.join().await.expect_err("no element id");

    assert!(err.is_protocol_error(), "got {err:?}");
    assert_ne!(session.state(), SessionState::Joined);
    session.close().await;
}

#[tokio::test]
async fn join_error_reply_is_protocol_error() {
    let server = FakeLiveView::start(Script {
        page: Page::Html(page_html(Some(CSRF), Some(ELEMENT_ID))),
        join: JoinReply::Error("unauthorized"),
        event: EventReply::Ok(json!({})),
    })
    .await;

    let mut session = ProtocolSession::new(server.config(), COOKIE).expect("session");
    session.connect().await.expect("connect");
    let err = session.join().await.expect_err("error reply");

    assert!(err.to_string().contains("unauthorized"), "got {err}");
    assert_eq!(session.state(), SessionState::Failed);
    assert!(session.topic().is_none());
    session.close().await;
}

#[tokio::test]
async fn join_timeout_then_stale_reply_is_ignored() {
    let server = FakeLiveView::start(Script {
        page: Page::Html(page_html(Some(CSRF), Some(ELEMENT_ID))),
        join: JoinReply::Delayed(Duration::from_millis(400), json!({"rendered": {}})),
        event: EventReply::Ok(json!({})),
    })
    .await;

    let config = server.config_with_timeout(Duration::from_millis(100));
    let mut session = ProtocolSession::new(config, COOKIE).expect("session");
    session.connect().await.expect("connect");

    let err = session.join().await.expect_err("timeout");
    assert!(err.is_timeout(), "got {err:?}");
    assert_eq!(session.pending_count(), 0);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(session.pending_count(), 0);
    assert_eq!(session.state(), SessionState::Failed);

    session.close().await;
}

#[tokio::test]
async fn save_config_submits_form_event() {
    let mut server = FakeLiveView::start(Script::with_config(r#"{"mcpServers":{}}"#)).await;

    let source = json!({
        "mcpServers": {
            "fs": { "command": "npx", "args": ["-y", "@mcp/fs"] }
        }
    });
    let conversion = ConfigConverter::new(HashMap::<String, String>::new())
        .convert(&source)
        .expect("convert");
    let document = conversion.config.to_value().expect("document");

    let mut session = ProtocolSession::new(server.config(), COOKIE).expect("session");
    session.connect().await.expect("connect");
    session.join().await.expect("join");
    session.save_config(&document).await.expect("save");

    let join = server.next_frame().await;
    let event = server.next_frame().await;

    assert_eq!(event[0], join[0]);
    assert_eq!(event[2], join[2]);
    assert_eq!(event[3], "event");
    assert_eq!(event[4]["type"], "form");
    assert_eq!(event[4]["event"], "save_config");

    let value = event[4]["value"].as_str().expect("form value");
    let encoded = value.strip_prefix("config_json=").expect("field prefix");
    let decoded = urlencoding::decode(&encoded.replace('+', " ")).expect("decode").into_owned();
    let submitted: Value = serde_json::from_str(&decoded).expect("json");
    assert_eq!(submitted, document);
    assert_eq!(submitted["mcpServers"]["fs"]["transport"]["type"], "stdio");

    session.close().await;
}

#[tokio::test]
async fn operations_out_of_order_are_rejected() {
    let server = FakeLiveView::start(Script::with_config(r#"{"mcpServers":{}}"#)).await;

    let mut session = ProtocolSession::new(server.config(), COOKIE).expect("session");
    let err = session.join().await.expect_err("join before connect");
    assert!(matches!(err, Error::InvalidState { .. }));
    assert_eq!(session.state(), SessionState::Idle);

    session.connect().await.expect("connect");
    let err = session
        .save_config(&json!({"mcpServers": {}}))
        .await
        .expect_err("save before join");
    assert!(matches!(err, Error::InvalidState { .. }));

    session.close().await;
    session.close().await;
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn save_config_error_reply_fails_session() {
    let script = Script::with_event_reply(EventReply::Error("invalid config"));
    let server = FakeLiveView::start(script).await;

    let mut session = ProtocolSession::new(server.config(), COOKIE).expect("session");
    session.connect().await.expect("connect");
    session.join().await.expect("join");

    let err = session
        .save_config(&json!({"mcpServers": {}}))
        .await
        .expect_err("error reply");

    assert!(err.is_protocol_error(), "got {err:?}");
    assert!(err.to_string().contains("invalid config"), "got {err}");
    assert_eq!(session.pending_count(), 0);
    assert_eq!(session.state(), SessionState::Failed);

    session.close().await;
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn save_config_timeout_clears_pending() {
    let server = FakeLiveView::start(Script::with_event_reply(EventReply::Silent)).await;

    let config = server.config_with_timeout(Duration::from_millis(200));
    let mut session = ProtocolSession::new(config, COOKIE).expect("session");
    session.connect().await.expect("connect");
    session.join().await.expect("join");

    let err = session
        .save_config(&json!({"mcpServers": {}}))
        .await
        .expect_err("timeout");

    assert!(err.is_timeout(), "got {err:?}");
    assert_eq!(session.pending_count(), 0);
    assert_eq!(session.state(), SessionState::Failed);

    let err = session
        .save_config(&json!({"mcpServers": {}}))
        .await
        .expect_err("failed session");
    assert!(matches!(err, Error::InvalidState { .. }), "got {err:?}");

    session.close().await;
}
