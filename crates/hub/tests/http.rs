// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Integration tests for the hub HTTP API.
//!
//! Uses `axum_test::TestServer` — no real TCP needed. The gateway side is
//! exercised at the hub level in `src/hub/instance_tests.rs`; here the
//! focus is auth, ownership, host provisioning, and error mapping.

mod common;

use axum::http::StatusCode;
use axum_test::TestServer;

use common::{test_state, FakeProvider};
use std::sync::Arc;
use tether_hub::auth::cookie;
use tether_hub::config::AuthMode;
use tether_hub::state::AppState;
use tether_hub::store::hosts::HostStatus;
use tether_hub::store::now_ts;
use tether_hub::transport::auth::DEV_USER_HEADER;
use tether_hub::transport::build_router;

fn test_server(state: Arc<AppState>) -> TestServer {
    TestServer::new(build_router(state)).expect("create test server")
}

async fn dev_server() -> (TestServer, Arc<AppState>, Arc<FakeProvider>) {
    let (state, provider) = test_state(AuthMode::Dev).await;
    (test_server(Arc::clone(&state)), state, provider)
}

/// A valid-looking OpenSSH public key line (the blob only has to be
/// well-formed base64).
const PUBLIC_KEY: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA laptop";

// ── Health and auth ───────────────────────────────────────────────────

#[tokio::test]
async fn health_needs_no_auth() {
    let (server, _, _) = dev_server().await;
    let resp = server.get("/api/v1/health").await;
    resp.assert_status(StatusCode::OK);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["status"], "running");
}

#[tokio::test]
async fn hosts_require_auth() {
    let (state, _) = test_state(AuthMode::Prod).await;
    let server = test_server(state);
    let resp = server.get("/hosts").await;
    resp.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn dev_header_is_ignored_in_prod_mode() {
    let (state, _) = test_state(AuthMode::Prod).await;
    let server = test_server(state);
    let resp = server.get("/hosts").add_header(DEV_USER_HEADER, "usr-1").await;
    resp.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn session_cookie_authenticates_in_prod_mode() {
    let (state, _) = test_state(AuthMode::Prod).await;
    let secret = state.config.session_cookie_secret.clone();
    let server = test_server(state);

    let value = cookie::issue(&secret, "usr-1", now_ts() + 3600);
    let resp = server
        .get("/hosts")
        .add_header("cookie", format!("{}={value}", cookie::COOKIE_NAME))
        .await;
    resp.assert_status(StatusCode::OK);

    // Expired cookie is rejected.
    let expired = cookie::issue(&secret, "usr-1", now_ts() - 1);
    let resp = server
        .get("/hosts")
        .add_header("cookie", format!("{}={expired}", cookie::COOKIE_NAME))
        .await;
    resp.assert_status(StatusCode::UNAUTHORIZED);
}

// ── Identity resolution ───────────────────────────────────────────────

#[tokio::test]
async fn resolve_identity_sets_session_cookie() {
    let (server, state, _) = dev_server().await;
    let resp = server
        .post("/auth/resolve")
        .json(&serde_json::json!({
            "provider": "google",
            "provider_user_id": "sub-1",
            "email": "alice@example.com",
        }))
        .await;
    resp.assert_status(StatusCode::OK);
    let body: serde_json::Value = resp.json();
    let user_id = body["user_id"].as_str().expect("user_id").to_owned();

    let set_cookie = resp.header("set-cookie");
    let set_cookie = set_cookie.to_str().expect("cookie header");
    assert!(set_cookie.starts_with(cookie::COOKIE_NAME));
    assert!(set_cookie.contains("HttpOnly"));

    // The cookie value round-trips through the verifier.
    let value = set_cookie
        .split(';')
        .next()
        .and_then(|pair| pair.split_once('='))
        .map(|(_, v)| v)
        .expect("cookie value");
    let verified = cookie::verify(&state.config.session_cookie_secret, value, now_ts());
    assert_eq!(verified.as_deref(), Some(user_id.as_str()));
}

#[tokio::test]
async fn conflicting_identities_are_a_409() {
    let (server, state, _) = dev_server().await;
    let user_a = state.store.create_user().await.expect("user a");
    let user_b = state.store.create_user().await.expect("user b");
    state.store.upsert_email_identity("alice@example.com", &user_a.id).await.expect("email");
    state.store.upsert_auth_identity("google", "sub-1", &user_b.id, true).await.expect("identity");

    let resp = server
        .post("/auth/resolve")
        .json(&serde_json::json!({
            "provider": "google",
            "provider_user_id": "sub-1",
            "email": "alice@example.com",
        }))
        .await;
    resp.assert_status(StatusCode::CONFLICT);
}

// ── Host lifecycle ────────────────────────────────────────────────────

#[tokio::test]
async fn manual_host_returns_gateway_token_once() {
    let (server, state, _) = dev_server().await;
    let resp = server
        .post("/hosts")
        .add_header(DEV_USER_HEADER, "usr-1")
        .json(&serde_json::json!({ "manual": true }))
        .await;
    resp.assert_status(StatusCode::CREATED);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["status"], "provisioning");
    let token = body["gateway_token"].as_str().expect("token").to_owned();
    let gateway_id = body["gateway_id"].as_str().expect("gateway id").to_owned();

    // Only the MAC is stored.
    let gateway = state.store.get_gateway(&gateway_id).await.expect("query").expect("row");
    assert_ne!(gateway.auth_token_hash, token);
    assert!(tether_hub::auth::token::verify_token(
        &state.config.gateway_token_salt,
        &token,
        &gateway.auth_token_hash
    ));
}

#[tokio::test]
async fn provisioned_host_requires_credentials() {
    let (server, _, _) = dev_server().await;
    let resp = server
        .post("/hosts")
        .add_header(DEV_USER_HEADER, "usr-1")
        .json(&serde_json::json!({}))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn provisioned_host_records_droplet_and_address() {
    let (server, state, provider) = dev_server().await;
    server
        .post("/credentials")
        .add_header(DEV_USER_HEADER, "usr-1")
        .json(&serde_json::json!({ "access_token": "do-access" }))
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let resp = server
        .post("/hosts")
        .add_header(DEV_USER_HEADER, "usr-1")
        .json(&serde_json::json!({}))
        .await;
    resp.assert_status(StatusCode::CREATED);
    let body: serde_json::Value = resp.json();
    assert!(body.get("gateway_token").is_none());
    let host_id = body["host_id"].as_str().expect("host id");

    let host = state.store.get_host(host_id).await.expect("query").expect("row");
    assert_eq!(host.status, HostStatus::Provisioning);
    assert_ne!(host.droplet_id, 0);
    assert_eq!(host.ipv4.as_deref(), Some("198.51.100.7"));

    // The cloud-init payload carries the gateway credentials.
    let created = provider.created.lock().expect("lock");
    assert_eq!(created.len(), 1);
    assert!(created[0].user_data.contains("TETHER_GATEWAY_TOKEN="));
}

#[tokio::test]
async fn provider_create_failure_rolls_back_rows() {
    let (server, state, provider) = dev_server().await;
    server
        .post("/credentials")
        .add_header(DEV_USER_HEADER, "usr-1")
        .json(&serde_json::json!({ "access_token": "do-access" }))
        .await
        .assert_status(StatusCode::NO_CONTENT);
    provider.fail_create.store(true, std::sync::atomic::Ordering::Relaxed);

    let resp = server
        .post("/hosts")
        .add_header(DEV_USER_HEADER, "usr-1")
        .json(&serde_json::json!({}))
        .await;
    resp.assert_status(StatusCode::BAD_GATEWAY);

    let hosts = state.store.list_hosts_for_user("usr-1").await.expect("list");
    assert!(hosts.is_empty());
}

#[tokio::test]
async fn delete_keeps_rows_when_provider_fails() {
    let (server, state, provider) = dev_server().await;
    server
        .post("/credentials")
        .add_header(DEV_USER_HEADER, "usr-1")
        .json(&serde_json::json!({ "access_token": "do-access" }))
        .await
        .assert_status(StatusCode::NO_CONTENT);
    let resp = server
        .post("/hosts")
        .add_header(DEV_USER_HEADER, "usr-1")
        .json(&serde_json::json!({}))
        .await;
    let host_id = resp.json::<serde_json::Value>()["host_id"]
        .as_str()
        .expect("host id")
        .to_owned();

    provider.fail_delete.store(true, std::sync::atomic::Ordering::Relaxed);
    let resp = server.delete(&format!("/hosts/{host_id}")).add_header(DEV_USER_HEADER, "usr-1").await;
    resp.assert_status(StatusCode::BAD_GATEWAY);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"], "will retry");

    // Rows retained in deleting for reconciliation to retry.
    let host = state.store.get_host(&host_id).await.expect("query").expect("row");
    assert_eq!(host.status, HostStatus::Deleting);
    assert!(provider.deleted_ids().is_empty());
}

#[tokio::test]
async fn delete_manual_host_cascades_immediately() {
    let (server, state, provider) = dev_server().await;
    let resp = server
        .post("/hosts")
        .add_header(DEV_USER_HEADER, "usr-1")
        .json(&serde_json::json!({ "manual": true }))
        .await;
    let host_id = resp.json::<serde_json::Value>()["host_id"]
        .as_str()
        .expect("host id")
        .to_owned();

    let resp = server.delete(&format!("/hosts/{host_id}")).add_header(DEV_USER_HEADER, "usr-1").await;
    resp.assert_status(StatusCode::OK);
    assert!(state.store.get_host(&host_id).await.expect("query").is_none());
    // No provider call for a manual host.
    assert!(provider.deleted_ids().is_empty());
}

#[tokio::test]
async fn foreign_hosts_are_invisible() {
    let (server, _, _) = dev_server().await;
    let resp = server
        .post("/hosts")
        .add_header(DEV_USER_HEADER, "usr-1")
        .json(&serde_json::json!({ "manual": true }))
        .await;
    let host_id = resp.json::<serde_json::Value>()["host_id"]
        .as_str()
        .expect("host id")
        .to_owned();

    let resp = server.get(&format!("/hosts/{host_id}")).add_header(DEV_USER_HEADER, "usr-2").await;
    resp.assert_status(StatusCode::NOT_FOUND);
    let resp =
        server.delete(&format!("/hosts/{host_id}")).add_header(DEV_USER_HEADER, "usr-2").await;
    resp.assert_status(StatusCode::NOT_FOUND);
}

// ── Sessions over a disconnected gateway ──────────────────────────────

#[tokio::test]
async fn session_create_without_gateway_is_a_502() {
    let (server, state, _) = dev_server().await;
    let resp = server
        .post("/hosts")
        .add_header(DEV_USER_HEADER, "usr-1")
        .json(&serde_json::json!({ "manual": true }))
        .await;
    let host_id = resp.json::<serde_json::Value>()["host_id"]
        .as_str()
        .expect("host id")
        .to_owned();

    let resp = server
        .post(&format!("/hosts/{host_id}/sessions"))
        .add_header(DEV_USER_HEADER, "usr-1")
        .json(&serde_json::json!({
            "title": "Demo",
            "agent_type": "claude-code",
            "workdir": "/home/vibe",
        }))
        .await;
    resp.assert_status(StatusCode::BAD_GATEWAY);
    let body: serde_json::Value = resp.json();
    assert!(body["error"].as_str().expect("error").contains("not connected"));

    // The provisional row is marked errored.
    let sessions = state.store.list_sessions_for_host(&host_id).await.expect("list");
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].status, tether_hub::store::sessions::SessionStatus::Error);
}

#[tokio::test]
async fn snapshot_without_gateway_is_a_502() {
    let (server, _, _) = dev_server().await;
    let resp = server
        .post("/hosts")
        .add_header(DEV_USER_HEADER, "usr-1")
        .json(&serde_json::json!({ "manual": true }))
        .await;
    let host_id = resp.json::<serde_json::Value>()["host_id"]
        .as_str()
        .expect("host id")
        .to_owned();

    let resp = server
        .get(&format!("/hosts/{host_id}/sessions/ses-1/snapshot"))
        .add_header(DEV_USER_HEADER, "usr-1")
        .await;
    resp.assert_status(StatusCode::BAD_GATEWAY);
}

// ── SSH keys ──────────────────────────────────────────────────────────

#[tokio::test]
async fn authorize_key_rejects_garbage_and_needs_gateway() {
    let (server, state, _) = dev_server().await;
    let resp = server
        .post("/hosts")
        .add_header(DEV_USER_HEADER, "usr-1")
        .json(&serde_json::json!({ "manual": true }))
        .await;
    let host_id = resp.json::<serde_json::Value>()["host_id"]
        .as_str()
        .expect("host id")
        .to_owned();

    let resp = server
        .post(&format!("/hosts/{host_id}/keys"))
        .add_header(DEV_USER_HEADER, "usr-1")
        .json(&serde_json::json!({ "public_key": "not-a-key", "label": "x" }))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);

    // Valid key, but the gateway is offline: 502 and no row recorded.
    let resp = server
        .post(&format!("/hosts/{host_id}/keys"))
        .add_header(DEV_USER_HEADER, "usr-1")
        .json(&serde_json::json!({ "public_key": PUBLIC_KEY, "label": "laptop" }))
        .await;
    resp.assert_status(StatusCode::BAD_GATEWAY);
    assert!(state.store.list_keys(&host_id).await.expect("list").is_empty());
}

#[tokio::test]
async fn key_list_falls_back_to_store_when_gateway_offline() {
    let (server, state, _) = dev_server().await;
    let resp = server
        .post("/hosts")
        .add_header(DEV_USER_HEADER, "usr-1")
        .json(&serde_json::json!({ "manual": true }))
        .await;
    let host_id = resp.json::<serde_json::Value>()["host_id"]
        .as_str()
        .expect("host id")
        .to_owned();
    state
        .store
        .upsert_key(
            &host_id,
            "SHA256:k1",
            PUBLIC_KEY,
            "laptop",
            tether_hub::store::keys::KeyKind::User,
            None,
        )
        .await
        .expect("insert");

    let resp =
        server.get(&format!("/hosts/{host_id}/keys")).add_header(DEV_USER_HEADER, "usr-1").await;
    resp.assert_status(StatusCode::OK);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["keys"][0]["fingerprint"], "SHA256:k1");
}

// ── Generic command entrypoint ────────────────────────────────────────

#[tokio::test]
async fn gateway_command_validates_envelope_and_ownership() {
    let (server, _, _) = dev_server().await;
    let resp = server
        .post("/hosts")
        .add_header(DEV_USER_HEADER, "usr-1")
        .json(&serde_json::json!({ "manual": true }))
        .await;
    let gateway_id = resp.json::<serde_json::Value>()["gateway_id"]
        .as_str()
        .expect("gateway id")
        .to_owned();

    // Unknown gateway → 404.
    let resp = server
        .post("/gw/gw-nope/command")
        .add_header(DEV_USER_HEADER, "usr-1")
        .json(&serde_json::json!({ "type": "ssh.list", "request_id": "r1" }))
        .await;
    resp.assert_status(StatusCode::NOT_FOUND);

    // Foreign owner → 404.
    let resp = server
        .post(&format!("/gw/{gateway_id}/command"))
        .add_header(DEV_USER_HEADER, "usr-2")
        .json(&serde_json::json!({ "type": "ssh.list", "request_id": "r1" }))
        .await;
    resp.assert_status(StatusCode::NOT_FOUND);

    // Unparseable envelope → 400.
    let resp = server
        .post(&format!("/gw/{gateway_id}/command"))
        .add_header(DEV_USER_HEADER, "usr-1")
        .json(&serde_json::json!({ "type": "not.a.command" }))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);

    // Well-formed but the gateway is offline → 502.
    let resp = server
        .post(&format!("/gw/{gateway_id}/command"))
        .add_header(DEV_USER_HEADER, "usr-1")
        .json(&serde_json::json!({ "type": "ssh.list", "request_id": "r1" }))
        .await;
    resp.assert_status(StatusCode::BAD_GATEWAY);
}
