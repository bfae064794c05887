// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the hub router.
//!
//! Session, key, and command endpoints are thin shells over the hub's
//! command surface: resolve → 200 with the resolved event (or a typed
//! body), reject → 502 with `{"error": …}`. No retries happen here.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use tether_proto::message::{
    Command, Event, SessionCreate, SessionEnd, SnapshotRequest, SshAuthorize, SshKeyInfo,
    SshList, SshRevoke,
};
use tether_proto::SCHEMA_VERSION;

use crate::auth::{cookie, token};
use crate::error::HubError;
use crate::hub::Hub;
use crate::provider::CreateDroplet;
use crate::reconcile;
use crate::state::AppState;
use crate::store::hosts::{Host, HostStatus};
use crate::store::keys::KeyKind;
use crate::store::now_ts;
use crate::store::users::IdentityOutcome;
use crate::transport::auth;

/// Session cookie lifetime issued at identity resolution.
const COOKIE_TTL_SECS: i64 = 30 * 24 * 3600;

// ── Request/Response types ────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct ResolveIdentityRequest {
    pub provider: String,
    pub provider_user_id: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct ResolveIdentityResponse {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct PutCredentialsRequest {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateHostRequest {
    /// Manually attached host: no cloud resource, credentials returned
    /// to the caller for installation by hand.
    #[serde(default)]
    pub manual: bool,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateHostResponse {
    pub host_id: String,
    pub gateway_id: String,
    pub status: HostStatus,
    /// Present only for manual hosts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub title: String,
    pub agent_type: String,
    pub workdir: String,
    #[serde(default)]
    pub agent_config: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub status: crate::store::sessions::SessionStatus,
}

#[derive(Debug, Serialize)]
pub struct EndSessionResponse {
    pub session_id: String,
    pub ended: bool,
}

#[derive(Debug, Deserialize)]
pub struct AuthorizeKeyRequest {
    pub public_key: String,
    pub label: String,
    #[serde(default)]
    pub support: bool,
    #[serde(default)]
    pub expires_at: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct AuthorizeKeyResponse {
    pub fingerprint: String,
}

#[derive(Debug, Serialize)]
pub struct KeyListResponse {
    pub keys: Vec<SshKeyInfo>,
}

#[derive(Debug, Serialize)]
pub struct RevokeKeyResponse {
    pub fingerprint: String,
    pub revoked: bool,
}

#[derive(Debug, Serialize)]
pub struct DeleteHostResponse {
    pub host_id: String,
    pub deleted: bool,
}

// ── Helpers ───────────────────────────────────────────────────────────

fn request_id() -> String {
    format!("req-{}", uuid::Uuid::new_v4())
}

/// OpenSSH-style fingerprint: SHA256 over the base64 key blob.
fn key_fingerprint(public_key: &str) -> Option<String> {
    let blob = public_key.split_whitespace().nth(1)?;
    let bytes = base64::engine::general_purpose::STANDARD.decode(blob).ok()?;
    let digest = ring::digest::digest(&ring::digest::SHA256, &bytes);
    Some(format!("SHA256:{}", STANDARD_NO_PAD.encode(digest.as_ref())))
}

/// Fetch a host and enforce ownership. Absent row and foreign owner are
/// indistinguishable to the caller.
async fn owned_host(state: &AppState, user_id: &str, host_id: &str) -> Result<Host, Response> {
    match state.store.get_host(host_id).await {
        Ok(Some(host)) if host.user_id == user_id => Ok(host),
        Ok(_) => Err(HubError::NotFound.to_http_response("host not found").into_response()),
        Err(e) => {
            tracing::error!(host_id, err = %e, "host lookup failed");
            Err(HubError::Internal.to_http_response("store failure").into_response())
        }
    }
}

/// The hub instance serving a host's gateway.
async fn hub_for_host(state: &AppState, host_id: &str) -> Result<Hub, Response> {
    match state.store.get_gateway_by_host(host_id).await {
        Ok(Some(gateway)) => Ok(state.registry.hub_for(&gateway.id).await),
        Ok(None) => {
            Err(HubError::NotFound.to_http_response("gateway not found").into_response())
        }
        Err(e) => {
            tracing::error!(host_id, err = %e, "gateway lookup failed");
            Err(HubError::Internal.to_http_response("store failure").into_response())
        }
    }
}

// ── Handlers ──────────────────────────────────────────────────────────

/// `GET /api/v1/health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "running".to_owned() })
}

/// `POST /auth/resolve` — called by the identity service after an OAuth
/// exchange. Resolves (provider, subject, email) to a user, minting one
/// if needed, and sets the session cookie. Conflicting identities are a
/// 409 with no writes.
pub async fn resolve_identity(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResolveIdentityRequest>,
) -> Response {
    match state.store.resolve_identity(&req.provider, &req.provider_user_id, &req.email).await {
        Ok(IdentityOutcome::Resolved(user)) => {
            let expires = now_ts() + COOKIE_TTL_SECS;
            let value = cookie::issue(&state.config.session_cookie_secret, &user.id, expires);
            let set_cookie = format!(
                "{}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={COOKIE_TTL_SECS}",
                cookie::COOKIE_NAME
            );
            (
                StatusCode::OK,
                [(header::SET_COOKIE, set_cookie)],
                Json(ResolveIdentityResponse { user_id: user.id }),
            )
                .into_response()
        }
        Ok(IdentityOutcome::Conflict) => HubError::IdentityConflict
            .to_http_response("identity belongs to a different user")
            .into_response(),
        Err(e) => {
            tracing::error!(err = %e, "identity resolution failed");
            HubError::Internal.to_http_response("store failure").into_response()
        }
    }
}

/// `POST /credentials` — store the caller's provider tokens, encrypted.
pub async fn put_credentials(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<PutCredentialsRequest>,
) -> Response {
    let user_id = match auth::authenticate_user(&state, &headers) {
        Ok(user_id) => user_id,
        Err(code) => return code.to_http_response("unauthorized").into_response(),
    };
    match state
        .store
        .put_provider_tokens(&state.kek, &user_id, &req.access_token, req.refresh_token.as_deref())
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            tracing::error!(err = %e, "failed to store provider tokens");
            HubError::Internal.to_http_response("store failure").into_response()
        }
    }
}

/// `POST /hosts` — provision (or manually attach) a host.
pub async fn create_host(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateHostRequest>,
) -> Response {
    let user_id = match auth::authenticate_user(&state, &headers) {
        Ok(user_id) => user_id,
        Err(code) => return code.to_http_response("unauthorized").into_response(),
    };

    let region = req.region.unwrap_or_else(|| state.config.provider_region.clone());
    let size = req.size.unwrap_or_else(|| state.config.provider_size.clone());
    let deadline = now_ts() + state.config.provision_timeout_secs as i64;

    let setup = async {
        let host = state.store.create_host(&user_id, &region, &size, deadline).await?;
        let plaintext = token::mint_token()?;
        let hash = token::token_hash(&state.config.gateway_token_salt, &plaintext);
        let gateway = state.store.create_gateway(&host.id, &hash).await?;
        Ok::<_, anyhow::Error>((host, gateway, plaintext))
    };
    let (host, gateway, plaintext) = match setup.await {
        Ok(created) => created,
        Err(e) => {
            tracing::error!(err = %e, "host setup failed");
            return HubError::Internal.to_http_response("store failure").into_response();
        }
    };

    if req.manual {
        return (
            StatusCode::CREATED,
            Json(CreateHostResponse {
                host_id: host.id,
                gateway_id: gateway.id,
                status: HostStatus::Provisioning,
                gateway_token: Some(plaintext),
            }),
        )
            .into_response();
    }

    let tokens = match state.store.get_provider_tokens(&state.kek, &user_id).await {
        Ok(Some(tokens)) => tokens,
        Ok(None) => {
            let _ = state.store.delete_host_cascade(&host.id).await;
            return HubError::InvalidPayload
                .to_http_response("no provider credentials on file")
                .into_response();
        }
        Err(e) => {
            tracing::error!(err = %e, "credential lookup failed");
            let _ = state.store.delete_host_cascade(&host.id).await;
            return HubError::Internal.to_http_response("store failure").into_response();
        }
    };

    let user_data = format!(
        "#cloud-config\nwrite_files:\n  - path: /etc/tether/gateway.env\n    content: |\n      TETHER_GATEWAY_ID={}\n      TETHER_GATEWAY_TOKEN={plaintext}\n",
        gateway.id
    );
    let create = CreateDroplet { name: host.id.clone(), region, size, user_data };
    let droplet = match state.provider.create_droplet(&tokens.access_token, &create).await {
        Ok(droplet) => droplet,
        Err(e) => {
            tracing::warn!(host_id = %host.id, err = %e, "provider create failed");
            let _ = state.store.delete_host_cascade(&host.id).await;
            return HubError::ProviderFailure.to_http_response(e.to_string()).into_response();
        }
    };

    let persist = async {
        state.store.update_host_droplet(&host.id, droplet.id).await?;
        if let Some(ref ip) = droplet.ipv4 {
            state.store.update_host_ipv4(&host.id, ip).await?;
        }
        Ok::<_, anyhow::Error>(())
    };
    if let Err(e) = persist.await {
        // Release the resource we just created, best effort.
        tracing::error!(host_id = %host.id, err = %e, "persisting droplet failed, rolling back");
        let _ = state.provider.delete_droplet(&tokens.access_token, droplet.id).await;
        let _ = state.store.delete_host_cascade(&host.id).await;
        return HubError::ProviderFailure.to_http_response("provisioning failed").into_response();
    }

    (
        StatusCode::CREATED,
        Json(CreateHostResponse {
            host_id: host.id,
            gateway_id: gateway.id,
            status: HostStatus::Provisioning,
            gateway_token: None,
        }),
    )
        .into_response()
}

/// `GET /hosts`
pub async fn list_hosts(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let user_id = match auth::authenticate_user(&state, &headers) {
        Ok(user_id) => user_id,
        Err(code) => return code.to_http_response("unauthorized").into_response(),
    };
    match state.store.list_hosts_for_user(&user_id).await {
        Ok(hosts) => Json(hosts).into_response(),
        Err(e) => {
            tracing::error!(err = %e, "host list failed");
            HubError::Internal.to_http_response("store failure").into_response()
        }
    }
}

/// `GET /hosts/{host_id}`
pub async fn get_host(
    State(state): State<Arc<AppState>>,
    Path(host_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let user_id = match auth::authenticate_user(&state, &headers) {
        Ok(user_id) => user_id,
        Err(code) => return code.to_http_response("unauthorized").into_response(),
    };
    match owned_host(&state, &user_id, &host_id).await {
        Ok(host) => Json(host).into_response(),
        Err(resp) => resp,
    }
}

/// `DELETE /hosts/{host_id}` — cloud-first two-phase destroy. The host
/// moves to `deleting` before any provider call; rows are removed only
/// once the provider delete succeeds. On provider failure the rows stay
/// and reconciliation retries.
pub async fn delete_host(
    State(state): State<Arc<AppState>>,
    Path(host_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let user_id = match auth::authenticate_user(&state, &headers) {
        Ok(user_id) => user_id,
        Err(code) => return code.to_http_response("unauthorized").into_response(),
    };
    let host = match owned_host(&state, &user_id, &host_id).await {
        Ok(host) => host,
        Err(resp) => return resp,
    };

    if let Err(e) = state.store.update_host_status(&host.id, HostStatus::Deleting).await {
        tracing::error!(host_id = %host.id, err = %e, "failed to mark host deleting");
        return HubError::Internal.to_http_response("store failure").into_response();
    }
    if let Ok(Some(gateway)) = state.store.get_gateway_by_host(&host.id).await {
        state.registry.shutdown_hub(&gateway.id).await;
    }

    match reconcile::destroy_host(&state, &host).await {
        Ok(()) => {
            Json(DeleteHostResponse { host_id: host.id, deleted: true }).into_response()
        }
        Err(e) => {
            tracing::warn!(host_id = %host.id, err = %e, "provider delete failed, will retry");
            HubError::ProviderFailure.to_http_response("will retry").into_response()
        }
    }
}

/// `POST /hosts/{host_id}/sessions`
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Path(host_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<CreateSessionRequest>,
) -> Response {
    let user_id = match auth::authenticate_user(&state, &headers) {
        Ok(user_id) => user_id,
        Err(code) => return code.to_http_response("unauthorized").into_response(),
    };
    let host = match owned_host(&state, &user_id, &host_id).await {
        Ok(host) => host,
        Err(resp) => return resp,
    };
    let hub = match hub_for_host(&state, &host.id).await {
        Ok(hub) => hub,
        Err(resp) => return resp,
    };

    let session = match state
        .store
        .create_session(&host.id, &user_id, &req.title, &req.workdir, &req.agent_type)
        .await
    {
        Ok(session) => session,
        Err(e) => {
            tracing::error!(err = %e, "session insert failed");
            return HubError::Internal.to_http_response("store failure").into_response();
        }
    };

    let envelope = Command::SessionCreate(SessionCreate {
        schema_version: SCHEMA_VERSION.to_owned(),
        request_id: session.id.clone(),
        session_id: session.id.clone(),
        name: req.title,
        workdir: req.workdir,
        agent: req.agent_type,
        agent_config: req.agent_config,
    });
    match hub.command(envelope).await {
        Ok(_) => (
            StatusCode::CREATED,
            Json(CreateSessionResponse {
                session_id: session.id,
                status: crate::store::sessions::SessionStatus::Starting,
            }),
        )
            .into_response(),
        Err(err) => {
            let _ = state
                .store
                .update_session_status(&session.id, crate::store::sessions::SessionStatus::Error)
                .await;
            err.to_http_response().into_response()
        }
    }
}

/// `DELETE /hosts/{host_id}/sessions/{session_id}`
pub async fn end_session(
    State(state): State<Arc<AppState>>,
    Path((host_id, session_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let user_id = match auth::authenticate_user(&state, &headers) {
        Ok(user_id) => user_id,
        Err(code) => return code.to_http_response("unauthorized").into_response(),
    };
    let host = match owned_host(&state, &user_id, &host_id).await {
        Ok(host) => host,
        Err(resp) => return resp,
    };
    let session = match state.store.get_session(&session_id).await {
        Ok(Some(session)) if session.host_id == host.id && session.user_id == user_id => session,
        Ok(_) => return HubError::NotFound.to_http_response("session not found").into_response(),
        Err(e) => {
            tracing::error!(err = %e, "session lookup failed");
            return HubError::Internal.to_http_response("store failure").into_response();
        }
    };
    let hub = match hub_for_host(&state, &host.id).await {
        Ok(hub) => hub,
        Err(resp) => return resp,
    };

    let envelope = Command::SessionEnd(SessionEnd {
        schema_version: SCHEMA_VERSION.to_owned(),
        request_id: request_id(),
        session_id: session.id.clone(),
    });
    match hub.command(envelope).await {
        Ok(_) => {
            Json(EndSessionResponse { session_id: session.id, ended: true }).into_response()
        }
        Err(err) => err.to_http_response().into_response(),
    }
}

/// `GET /hosts/{host_id}/sessions/{session_id}/snapshot`
pub async fn session_snapshot(
    State(state): State<Arc<AppState>>,
    Path((host_id, session_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let user_id = match auth::authenticate_user(&state, &headers) {
        Ok(user_id) => user_id,
        Err(code) => return code.to_http_response("unauthorized").into_response(),
    };
    let host = match owned_host(&state, &user_id, &host_id).await {
        Ok(host) => host,
        Err(resp) => return resp,
    };
    let hub = match hub_for_host(&state, &host.id).await {
        Ok(hub) => hub,
        Err(resp) => return resp,
    };

    let envelope = Command::SessionSnapshot(SnapshotRequest {
        schema_version: SCHEMA_VERSION.to_owned(),
        request_id: request_id(),
        session_id,
    });
    match hub.command(envelope).await {
        Ok(event) => Json(event).into_response(),
        Err(err) => err.to_http_response().into_response(),
    }
}

/// `POST /hosts/{host_id}/keys` — install a key on the host, then record
/// it. The row is written only after the gateway acks.
pub async fn authorize_key(
    State(state): State<Arc<AppState>>,
    Path(host_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<AuthorizeKeyRequest>,
) -> Response {
    let user_id = match auth::authenticate_user(&state, &headers) {
        Ok(user_id) => user_id,
        Err(code) => return code.to_http_response("unauthorized").into_response(),
    };
    let host = match owned_host(&state, &user_id, &host_id).await {
        Ok(host) => host,
        Err(resp) => return resp,
    };
    let Some(fingerprint) = key_fingerprint(&req.public_key) else {
        return HubError::InvalidPayload.to_http_response("unparseable public key").into_response();
    };
    let hub = match hub_for_host(&state, &host.id).await {
        Ok(hub) => hub,
        Err(resp) => return resp,
    };

    let envelope = Command::SshAuthorize(SshAuthorize {
        schema_version: SCHEMA_VERSION.to_owned(),
        request_id: request_id(),
        public_key: req.public_key.clone(),
        label: req.label.clone(),
        expires_at: req.expires_at,
    });
    if let Err(err) = hub.command(envelope).await {
        return err.to_http_response().into_response();
    }

    let kind = if req.support { KeyKind::Support } else { KeyKind::User };
    if let Err(e) = state
        .store
        .upsert_key(&host.id, &fingerprint, &req.public_key, &req.label, kind, req.expires_at)
        .await
    {
        tracing::error!(err = %e, "key insert failed");
        return HubError::Internal.to_http_response("store failure").into_response();
    }
    (StatusCode::CREATED, Json(AuthorizeKeyResponse { fingerprint })).into_response()
}

/// `DELETE /hosts/{host_id}/keys/{fingerprint}`
pub async fn revoke_key(
    State(state): State<Arc<AppState>>,
    Path((host_id, fingerprint)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let user_id = match auth::authenticate_user(&state, &headers) {
        Ok(user_id) => user_id,
        Err(code) => return code.to_http_response("unauthorized").into_response(),
    };
    let host = match owned_host(&state, &user_id, &host_id).await {
        Ok(host) => host,
        Err(resp) => return resp,
    };
    let hub = match hub_for_host(&state, &host.id).await {
        Ok(hub) => hub,
        Err(resp) => return resp,
    };

    let envelope = Command::SshRevoke(SshRevoke {
        schema_version: SCHEMA_VERSION.to_owned(),
        request_id: request_id(),
        fingerprint: fingerprint.clone(),
    });
    if let Err(err) = hub.command(envelope).await {
        return err.to_http_response().into_response();
    }

    match state.store.delete_key(&host.id, &fingerprint).await {
        Ok(revoked) => Json(RevokeKeyResponse { fingerprint, revoked }).into_response(),
        Err(e) => {
            tracing::error!(err = %e, "key delete failed");
            HubError::Internal.to_http_response("store failure").into_response()
        }
    }
}

/// `GET /hosts/{host_id}/keys` — live list from the gateway when it is
/// connected, falling back to the stored mirror when it is not.
pub async fn list_keys(
    State(state): State<Arc<AppState>>,
    Path(host_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let user_id = match auth::authenticate_user(&state, &headers) {
        Ok(user_id) => user_id,
        Err(code) => return code.to_http_response("unauthorized").into_response(),
    };
    let host = match owned_host(&state, &user_id, &host_id).await {
        Ok(host) => host,
        Err(resp) => return resp,
    };
    let hub = match hub_for_host(&state, &host.id).await {
        Ok(hub) => hub,
        Err(resp) => return resp,
    };

    let envelope = Command::SshList(SshList {
        schema_version: SCHEMA_VERSION.to_owned(),
        request_id: request_id(),
    });
    match hub.command(envelope).await {
        Ok(Event::SshKeys(reply)) => Json(KeyListResponse { keys: reply.keys }).into_response(),
        Ok(other) => {
            tracing::warn!(event = ?other, "unexpected ssh.list resolution");
            HubError::Internal.to_http_response("unexpected gateway reply").into_response()
        }
        Err(err) if err.kind == HubError::GatewayDisconnected => {
            match state.store.list_keys(&host.id).await {
                Ok(rows) => {
                    let keys = rows
                        .into_iter()
                        .map(|row| SshKeyInfo {
                            fingerprint: row.fingerprint,
                            public_key: row.public_key,
                            label: row.label,
                            expires_at: row.expires_at,
                        })
                        .collect();
                    Json(KeyListResponse { keys }).into_response()
                }
                Err(e) => {
                    tracing::error!(err = %e, "key list failed");
                    HubError::Internal.to_http_response("store failure").into_response()
                }
            }
        }
        Err(err) => err.to_http_response().into_response(),
    }
}

/// `POST /gw/{gateway_id}/command` — the generic command entrypoint:
/// parse the envelope, forward ack-tracked, return the raw resolved
/// event, 502 on rejection.
pub async fn gateway_command(
    State(state): State<Arc<AppState>>,
    Path(gateway_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let user_id = match auth::authenticate_user(&state, &headers) {
        Ok(user_id) => user_id,
        Err(code) => return code.to_http_response("unauthorized").into_response(),
    };

    // Ownership: the caller must own the host this gateway serves.
    let gateway = match state.store.get_gateway(&gateway_id).await {
        Ok(Some(gateway)) => gateway,
        Ok(None) => {
            return HubError::NotFound.to_http_response("gateway not found").into_response()
        }
        Err(e) => {
            tracing::error!(err = %e, "gateway lookup failed");
            return HubError::Internal.to_http_response("store failure").into_response();
        }
    };
    if owned_host(&state, &user_id, &gateway.host_id).await.is_err() {
        return HubError::NotFound.to_http_response("gateway not found").into_response();
    }

    let envelope: Command = match serde_json::from_value(body) {
        Ok(envelope) => envelope,
        Err(e) => {
            return HubError::InvalidPayload
                .to_http_response(format!("bad envelope: {e}"))
                .into_response()
        }
    };

    let hub = state.registry.hub_for(&gateway.id).await;
    match hub.command(envelope).await {
        Ok(event) => Json(event).into_response(),
        Err(err) => err.to_http_response().into_response(),
    }
}
