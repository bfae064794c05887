// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cloud provider client.
//!
//! The hub only needs four operations from the provider; they are behind
//! a trait so host handlers and reconciliation can run against a fake.
//! The HTTP implementation speaks the DigitalOcean droplet API.

use std::fmt;

use futures_util::future::BoxFuture;
use reqwest::Client;
use serde::Deserialize;

/// A provisioned compute resource as the provider reports it.
#[derive(Debug, Clone)]
pub struct Droplet {
    pub id: i64,
    pub ipv4: Option<String>,
}

/// Fresh tokens from an OAuth refresh.
#[derive(Debug, Clone)]
pub struct RefreshedTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

/// Provider API failure, keeping the HTTP status when there was one so
/// callers can tell an expired token from an outage.
#[derive(Debug)]
pub struct ProviderError {
    pub status: Option<u16>,
    pub message: String,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { status: None, message: message.into() }
    }

    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self { status: Some(status), message: message.into() }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == Some(401)
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "provider returned {status}: {}", self.message),
            None => write!(f, "provider request failed: {}", self.message),
        }
    }
}

impl std::error::Error for ProviderError {}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::with_status(status.as_u16(), err.to_string()),
            None => Self::new(err.to_string()),
        }
    }
}

/// Parameters for a droplet create call.
#[derive(Debug, Clone)]
pub struct CreateDroplet {
    pub name: String,
    pub region: String,
    pub size: String,
    /// Cloud-init payload that installs and starts the gateway.
    pub user_data: String,
}

/// The provider surface the hub depends on.
pub trait ProviderApi: Send + Sync {
    fn create_droplet<'a>(
        &'a self,
        token: &'a str,
        req: &'a CreateDroplet,
    ) -> BoxFuture<'a, Result<Droplet, ProviderError>>;

    fn delete_droplet<'a>(
        &'a self,
        token: &'a str,
        droplet_id: i64,
    ) -> BoxFuture<'a, Result<(), ProviderError>>;

    fn get_droplet<'a>(
        &'a self,
        token: &'a str,
        droplet_id: i64,
    ) -> BoxFuture<'a, Result<Droplet, ProviderError>>;

    fn refresh_token<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> BoxFuture<'a, Result<RefreshedTokens, ProviderError>>;
}

/// Base image for provisioned hosts.
const DROPLET_IMAGE: &str = "ubuntu-24-04-x64";

/// reqwest-backed provider client.
pub struct HttpProvider {
    base_url: String,
    client: Client,
}

impl HttpProvider {
    pub fn new(base_url: String) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self { base_url: base_url.trim_end_matches('/').to_owned(), client }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[derive(Deserialize)]
struct DropletEnvelope {
    droplet: DropletBody,
}

#[derive(Deserialize)]
struct DropletBody {
    id: i64,
    #[serde(default)]
    networks: Networks,
}

#[derive(Deserialize, Default)]
struct Networks {
    #[serde(default)]
    v4: Vec<V4Network>,
}

#[derive(Deserialize)]
struct V4Network {
    ip_address: String,
    #[serde(rename = "type")]
    kind: String,
}

impl DropletBody {
    fn public_ipv4(&self) -> Option<String> {
        self.networks.v4.iter().find(|n| n.kind == "public").map(|n| n.ip_address.clone())
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

async fn check(resp: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ProviderError::with_status(status.as_u16(), body))
}

impl ProviderApi for HttpProvider {
    fn create_droplet<'a>(
        &'a self,
        token: &'a str,
        req: &'a CreateDroplet,
    ) -> BoxFuture<'a, Result<Droplet, ProviderError>> {
        Box::pin(async move {
            let body = serde_json::json!({
                "name": req.name,
                "region": req.region,
                "size": req.size,
                "image": DROPLET_IMAGE,
                "user_data": req.user_data,
            });
            let resp = self
                .client
                .post(self.url("/v2/droplets"))
                .bearer_auth(token)
                .json(&body)
                .send()
                .await?;
            let envelope: DropletEnvelope = check(resp).await?.json().await?;
            Ok(Droplet { id: envelope.droplet.id, ipv4: envelope.droplet.public_ipv4() })
        })
    }

    fn delete_droplet<'a>(
        &'a self,
        token: &'a str,
        droplet_id: i64,
    ) -> BoxFuture<'a, Result<(), ProviderError>> {
        Box::pin(async move {
            let resp = self
                .client
                .delete(self.url(&format!("/v2/droplets/{droplet_id}")))
                .bearer_auth(token)
                .send()
                .await?;
            // Treat an already-gone droplet as deleted.
            if resp.status().as_u16() == 404 {
                return Ok(());
            }
            check(resp).await?;
            Ok(())
        })
    }

    fn get_droplet<'a>(
        &'a self,
        token: &'a str,
        droplet_id: i64,
    ) -> BoxFuture<'a, Result<Droplet, ProviderError>> {
        Box::pin(async move {
            let resp = self
                .client
                .get(self.url(&format!("/v2/droplets/{droplet_id}")))
                .bearer_auth(token)
                .send()
                .await?;
            let envelope: DropletEnvelope = check(resp).await?.json().await?;
            Ok(Droplet { id: envelope.droplet.id, ipv4: envelope.droplet.public_ipv4() })
        })
    }

    fn refresh_token<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> BoxFuture<'a, Result<RefreshedTokens, ProviderError>> {
        Box::pin(async move {
            let body = serde_json::json!({
                "grant_type": "refresh_token",
                "refresh_token": refresh_token,
            });
            let resp =
                self.client.post(self.url("/v1/oauth/token")).json(&body).send().await?;
            let tokens: TokenResponse = check(resp).await?.json().await?;
            Ok(RefreshedTokens {
                access_token: tokens.access_token,
                refresh_token: tokens.refresh_token,
            })
        })
    }
}
