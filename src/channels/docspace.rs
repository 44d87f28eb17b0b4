//! Docspace document-creation API client.
//!
//! Authentication is a tenant token minted from the app id/secret pair;
//! like the messaging platform, errors ride in HTTP 200 bodies under a
//! `code` field.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

use crate::config::DocspaceConfig;
use crate::storage::TokenCache;

const TOKEN_SAFETY_MARGIN_SECS: u64 = 120;
const DEFAULT_TOKEN_TTL_SECS: u64 = 7_200;

pub struct DocspaceClient {
    client: reqwest::Client,
    api_base: String,
    app_id: String,
    app_secret: String,
    token_cache: TokenCache,
}

#[derive(Debug, Deserialize)]
struct TenantTokenResponse {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
    tenant_access_token: Option<String>,
    expire: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct CreateDocResponse {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
    data: Option<CreateDocData>,
}

#[derive(Debug, Deserialize)]
struct CreateDocData {
    url: Option<String>,
    doc_token: Option<String>,
}

impl DocspaceClient {
    /// Build the client if outbound credentials are configured; `None`
    /// disables document creation without affecting inbound decoding.
    pub fn from_config(config: &DocspaceConfig) -> Option<Self> {
        let app_secret = config.app_secret.clone()?;
        Some(Self {
            client: reqwest::Client::new(),
            api_base: config.api_base.clone(),
            app_id: config.app_id.clone(),
            app_secret,
            token_cache: TokenCache::new(),
        })
    }

    async fn tenant_token(&self) -> Result<String> {
        if let Some(token) = self.token_cache.get() {
            return Ok(token);
        }

        let url = format!("{}/auth/v3/tenant_access_token/internal", self.api_base);
        let resp = self
            .client
            .post(url)
            .json(&serde_json::json!({
                "app_id": self.app_id,
                "app_secret": self.app_secret,
            }))
            .send()
            .await
            .context("docspace token request failed")?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("docspace token request failed ({status}): {}", body.trim());
        }
        let body = resp
            .json::<TenantTokenResponse>()
            .await
            .context("docspace token decode failed")?;
        if body.code != 0 {
            anyhow::bail!("docspace token rejected ({}): {}", body.code, body.msg);
        }
        let token = body
            .tenant_access_token
            .filter(|t| !t.is_empty())
            .context("docspace token response carried no tenant_access_token")?;

        let ttl = body
            .expire
            .unwrap_or(DEFAULT_TOKEN_TTL_SECS)
            .saturating_sub(TOKEN_SAFETY_MARGIN_SECS)
            .max(1);
        self.token_cache.put(token.clone(), Duration::from_secs(ttl));
        Ok(token)
    }

    /// Create a document and return a human-shareable reference: the
    /// document URL when the platform provides one, its token otherwise.
    pub async fn create_document(&self, title: &str, content: &str) -> Result<String> {
        let token = self.tenant_token().await?;
        let url = format!("{}/doc/v2/create", self.api_base);
        let payload = serde_json::json!({
            "title": title,
            "content": content,
        });

        let resp = self
            .client
            .post(url)
            .bearer_auth(&token)
            .json(&payload)
            .send()
            .await
            .context("docspace create-document request failed")?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("docspace create-document failed ({status}): {}", body.trim());
        }
        let body = resp
            .json::<CreateDocResponse>()
            .await
            .context("docspace create-document decode failed")?;
        if body.code != 0 {
            if body.code == 99991663 {
                // Tenant token invalid/expired.
                self.token_cache.clear();
            }
            anyhow::bail!("docspace create-document rejected ({}): {}", body.code, body.msg);
        }

        let data = body
            .data
            .context("docspace create-document response carried no data")?;
        data.url
            .or(data.doc_token)
            .context("docspace create-document response carried no url or doc_token")
    }
}
