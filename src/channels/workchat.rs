//! Workchat send-message API client.
//!
//! The platform wraps errors in HTTP 200 responses with an `errcode`
//! field, so success is judged on the body, not the status line alone.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

use crate::config::WorkchatConfig;
use crate::storage::TokenCache;

/// Tokens advertise a ~2h lifetime; refresh two minutes early so a
/// token never expires mid-request.
const TOKEN_SAFETY_MARGIN_SECS: u64 = 120;
const DEFAULT_TOKEN_TTL_SECS: u64 = 7_200;

pub struct WorkchatClient {
    client: reqwest::Client,
    api_base: String,
    corp_id: String,
    corp_secret: String,
    agent_id: String,
    token_cache: TokenCache,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
    access_token: Option<String>,
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

impl WorkchatClient {
    /// Build the client if outbound credentials are configured; `None`
    /// disables the reply leg without affecting inbound decoding.
    pub fn from_config(config: &WorkchatConfig) -> Option<Self> {
        let corp_secret = config.corp_secret.clone()?;
        let agent_id = config.agent_id.clone()?;
        Some(Self {
            client: reqwest::Client::new(),
            api_base: config.api_base.clone(),
            corp_id: config.credentials.receiver_id.clone(),
            corp_secret,
            agent_id,
            token_cache: TokenCache::new(),
        })
    }

    async fn access_token(&self) -> Result<String> {
        if let Some(token) = self.token_cache.get() {
            return Ok(token);
        }

        let url = format!("{}/gettoken", self.api_base);
        let resp = self
            .client
            .get(url)
            .query(&[("corpid", self.corp_id.as_str()), ("corpsecret", self.corp_secret.as_str())])
            .send()
            .await
            .context("workchat token request failed")?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("workchat token request failed ({status}): {}", body.trim());
        }
        let body = resp
            .json::<TokenResponse>()
            .await
            .context("workchat token decode failed")?;
        if body.errcode != 0 {
            anyhow::bail!("workchat token rejected ({}): {}", body.errcode, body.errmsg);
        }
        let token = body
            .access_token
            .filter(|t| !t.is_empty())
            .context("workchat token response carried no access_token")?;

        let ttl = body
            .expires_in
            .unwrap_or(DEFAULT_TOKEN_TTL_SECS)
            .saturating_sub(TOKEN_SAFETY_MARGIN_SECS)
            .max(1);
        self.token_cache.put(token.clone(), Duration::from_secs(ttl));
        Ok(token)
    }

    /// Send a plain text message to one platform user.
    pub async fn send_text(&self, to_user: &str, content: &str) -> Result<()> {
        let token = self.access_token().await?;
        let url = format!("{}/message/send", self.api_base);
        let payload = serde_json::json!({
            "touser": to_user,
            "msgtype": "text",
            "agentid": self.agent_id,
            "text": { "content": content },
        });

        let resp = self
            .client
            .post(url)
            .query(&[("access_token", token.as_str())])
            .json(&payload)
            .send()
            .await
            .context("workchat send request failed")?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("workchat send failed ({status}): {}", body.trim());
        }
        let body = resp
            .json::<SendResponse>()
            .await
            .context("workchat send decode failed")?;
        if body.errcode != 0 {
            // A stale token is the one failure worth clearing state for;
            // the caller decides whether to re-send.
            if body.errcode == 40014 || body.errcode == 42001 {
                self.token_cache.clear();
            }
            anyhow::bail!("workchat send rejected ({}): {}", body.errcode, body.errmsg);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IntegrationCredentials;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(api_base: String) -> WorkchatConfig {
        WorkchatConfig {
            credentials: IntegrationCredentials {
                shared_token: "tok".into(),
                aes_key_seed: "seed".into(),
                receiver_id: "wwCORP123".into(),
            },
            corp_secret: Some("secret".into()),
            agent_id: Some("1000002".into()),
            api_base,
        }
    }

    fn client(server: &MockServer) -> WorkchatClient {
        WorkchatClient::from_config(&test_config(server.uri())).unwrap()
    }

    #[test]
    fn outbound_disabled_without_credentials() {
        let mut config = test_config("http://unused".into());
        config.corp_secret = None;
        assert!(WorkchatClient::from_config(&config).is_none());
    }

    #[tokio::test]
    async fn send_text_fetches_token_then_posts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gettoken"))
            .and(query_param("corpid", "wwCORP123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "errcode": 0, "errmsg": "ok",
                "access_token": "at-1", "expires_in": 7200
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/message/send"))
            .and(query_param("access_token", "at-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "errcode": 0, "errmsg": "ok"
            })))
            .expect(2)
            .mount(&server)
            .await;

        let client = client(&server);
        client.send_text("user1", "hello").await.unwrap();
        // Second send reuses the cached token: gettoken is hit exactly once.
        client.send_text("user2", "again").await.unwrap();
    }

    #[tokio::test]
    async fn platform_errcode_surfaces_as_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gettoken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "errcode": 40001, "errmsg": "invalid credential"
            })))
            .mount(&server)
            .await;

        let err = client(&server).send_text("user1", "hi").await.unwrap_err();
        assert!(err.to_string().contains("40001"));
    }

    #[tokio::test]
    async fn http_failure_surfaces_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gettoken"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let err = client(&server).send_text("user1", "hi").await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("503"));
        assert!(msg.contains("upstream down"));
    }

    #[tokio::test]
    async fn expired_token_errcode_clears_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gettoken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "errcode": 0, "access_token": "at-stale", "expires_in": 7200
            })))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/message/send"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "errcode": 42001, "errmsg": "access_token expired"
            })))
            .mount(&server)
            .await;

        let client = client(&server);
        assert!(client.send_text("user1", "hi").await.is_err());
        // Cache was cleared, so the next attempt re-fetches the token.
        assert!(client.send_text("user1", "hi").await.is_err());
    }
}
