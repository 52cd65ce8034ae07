use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use httpmock::prelude::*;
use serde_json::json;
use tempfile::tempdir;
use vaul3t_access::{Identity, RateLimitEntry};
use vaul3t_bot::{
    build_dispatcher, Cli, ConversationState, GatedDispatcher, TelegramApiClient,
    TelegramClientConfig, TelegramRuntime, TelegramRuntimeConfig,
};

const BOT_TOKEN: &str = "42:token";

fn cli_for(server: &MockServer, state_dir: &Path) -> Cli {
    Cli::try_parse_from([
        "vaul3t-bot".to_string(),
        "--telegram-bot-token".to_string(),
        BOT_TOKEN.to_string(),
        "--telegram-api-base".to_string(),
        server.base_url(),
        "--lookup-api-base".to_string(),
        server.base_url(),
        "--request-timeout-ms".to_string(),
        "2000".to_string(),
        "--state-dir".to_string(),
        state_dir.display().to_string(),
    ])
    .expect("cli should parse")
}

fn runtime_for(server: &MockServer, cli: &Cli) -> (TelegramRuntime, Arc<GatedDispatcher>) {
    let dispatcher = Arc::new(build_dispatcher(cli).expect("dispatcher"));
    let client = TelegramApiClient::new(TelegramClientConfig {
        api_base: server.base_url(),
        bot_token: BOT_TOKEN.to_string(),
        request_timeout_ms: 2_000,
    })
    .expect("telegram client");
    let runtime = TelegramRuntime::new(
        Arc::new(client),
        Arc::clone(&dispatcher),
        TelegramRuntimeConfig {
            poll_timeout_seconds: 0,
            error_backoff: Duration::from_millis(10),
        },
    );
    (runtime, dispatcher)
}

#[tokio::test]
async fn integration_first_lookup_provisions_free_tier_and_delivers_report() {
    let server = MockServer::start();
    let temp = tempdir().expect("tempdir");
    let state_dir = temp.path().join("state");
    let cli = cli_for(&server, &state_dir);

    let updates = server.mock(|when, then| {
        when.method(GET)
            .path(format!("/bot{BOT_TOKEN}/getUpdates"))
            .query_param("offset", "0");
        then.status(200).json_body(json!({
            "ok": true,
            "result": [
                {"update_id": 500, "message": {"from": {"id": 42}, "chat": {"id": 42}, "text": "/instagram"}},
                {"update_id": 501, "message": {"from": {"id": 42}, "chat": {"id": 42}, "text": "alice"}}
            ]
        }));
    });
    let free_tier_notice = server.mock(|when, then| {
        when.method(POST)
            .path(format!("/bot{BOT_TOKEN}/sendMessage"))
            .body_includes("free tier activated: 4 requests left");
        then.status(200)
            .json_body(json!({"ok": true, "result": {"message_id": 10}}));
    });
    let prompt = server.mock(|when, then| {
        when.method(POST)
            .path(format!("/bot{BOT_TOKEN}/sendMessage"))
            .body_includes("Please enter the Instagram username to search for:");
        then.status(200)
            .json_body(json!({"ok": true, "result": {"message_id": 11}}));
    });
    let placeholder = server.mock(|when, then| {
        when.method(POST)
            .path(format!("/bot{BOT_TOKEN}/sendMessage"))
            .body_includes("Please wait");
        then.status(200)
            .json_body(json!({"ok": true, "result": {"message_id": 12}}));
    });
    let report = server.mock(|when, then| {
        when.method(POST)
            .path(format!("/bot{BOT_TOKEN}/sendMessage"))
            .json_body_includes(json!({"chat_id": 42, "parse_mode": "MarkdownV2"}).to_string())
            .body_includes("can_sms_reset: True")
            .body_includes(" username: alice")
            .body_includes("autosend_disabled: N/A");
        then.status(200)
            .json_body(json!({"ok": true, "result": {"message_id": 13}}));
    });
    let delete_placeholder = server.mock(|when, then| {
        when.method(POST)
            .path(format!("/bot{BOT_TOKEN}/deleteMessage"))
            .json_body_includes(json!({"chat_id": 42, "message_id": 12}).to_string());
        then.status(200).json_body(json!({"ok": true, "result": true}));
    });
    let lookup = server.mock(|when, then| {
        when.method(GET)
            .path("/v1/osint/instagram")
            .query_param("username", "alice")
            .header("authorization", "vaul3t-free-tier");
        then.status(200).json_body(json!({
            "data": {"can_sms_reset": true, "user": {"username": "alice", "id": "1"}}
        }));
    });

    let (mut runtime, dispatcher) = runtime_for(&server, &cli);
    let cycle = runtime.poll_once().await.expect("poll");
    runtime.drain().await;

    assert_eq!(cycle.updates, 2);
    assert_eq!(cycle.dispatched, 2);
    assert_eq!(runtime.next_offset(), 502);
    updates.assert_calls(1);
    free_tier_notice.assert_calls(1);
    prompt.assert_calls(1);
    placeholder.assert_calls(1);
    lookup.assert_calls(1);
    report.assert_calls(1);
    delete_placeholder.assert_calls(1);

    let identity = Identity::from(42_i64);
    assert_eq!(dispatcher.conversation_state(&identity), ConversationState::Idle);

    let tokens: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(state_dir.join("tokens/user_tokens.json")).expect("tokens"),
    )
    .expect("token json");
    assert_eq!(tokens["42"], json!("vaul3t-free-tier"));

    let ledger: std::collections::BTreeMap<String, RateLimitEntry> = serde_json::from_str(
        &std::fs::read_to_string(state_dir.join("rate_limits.json")).expect("ledger"),
    )
    .expect("ledger json");
    assert_eq!(ledger["42"].count, 1);
}

#[tokio::test]
async fn regression_remote_failure_sends_generic_reply_and_returns_to_idle() {
    let server = MockServer::start();
    let temp = tempdir().expect("tempdir");
    let cli = cli_for(&server, &temp.path().join("state"));

    server.mock(|when, then| {
        when.method(GET)
            .path(format!("/bot{BOT_TOKEN}/getUpdates"))
            .query_param("offset", "0");
        then.status(200).json_body(json!({
            "ok": true,
            "result": [
                {"update_id": 7, "message": {"from": {"id": 42}, "chat": {"id": 42}, "text": "/instagram alice"}}
            ]
        }));
    });
    let notice = server.mock(|when, then| {
        when.method(POST)
            .path(format!("/bot{BOT_TOKEN}/sendMessage"))
            .body_includes("free tier activated");
        then.status(200)
            .json_body(json!({"ok": true, "result": {"message_id": 2}}));
    });
    let placeholder = server.mock(|when, then| {
        when.method(POST)
            .path(format!("/bot{BOT_TOKEN}/sendMessage"))
            .body_includes("Please wait");
        then.status(200)
            .json_body(json!({"ok": true, "result": {"message_id": 3}}));
    });
    let generic = server.mock(|when, then| {
        when.method(POST)
            .path(format!("/bot{BOT_TOKEN}/sendMessage"))
            .body_includes("Error, contact Admin");
        then.status(200)
            .json_body(json!({"ok": true, "result": {"message_id": 4}}));
    });
    server.mock(|when, then| {
        when.method(POST).path(format!("/bot{BOT_TOKEN}/deleteMessage"));
        then.status(200).json_body(json!({"ok": true, "result": true}));
    });
    let lookup = server.mock(|when, then| {
        when.method(GET).path("/v1/osint/instagram");
        then.status(502).body("bad gateway");
    });

    let (mut runtime, dispatcher) = runtime_for(&server, &cli);
    runtime.poll_once().await.expect("poll");
    runtime.drain().await;

    lookup.assert_calls(1);
    generic.assert_calls(1);
    notice.assert_calls(1);
    placeholder.assert_calls(1);
    assert_eq!(runtime.next_offset(), 8);
    assert!(dispatcher
        .conversation_state(&Identity::from(42_i64))
        .is_idle());
}
