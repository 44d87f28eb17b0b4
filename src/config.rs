//! Environment-driven configuration. There is no config file: every
//! deployment target for this service injects secrets through process
//! environment variables, so that is the only source.
//!
//! Secret values are never printed in full — the masked summary reports
//! presence and length only.

use anyhow::{Context, Result};

use crate::crypto;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_WORKCHAT_API_BASE: &str = "https://qyapi.workchat.com/cgi-bin";
const DEFAULT_DOCSPACE_API_BASE: &str = "https://open.docspace.com/open-apis";
const DEFAULT_SUMMARIZER_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_SUMMARIZER_MODEL: &str = "gpt-4o-mini";

/// Codec credentials for one integration: the signature token, the AES
/// key seed and the receiver id embedded in plaintext frames. Immutable
/// after load.
#[derive(Debug, Clone)]
pub struct IntegrationCredentials {
    pub shared_token: String,
    /// 43-char base64 seed; `seed + "="` must decode to 32 key bytes.
    pub aes_key_seed: String,
    pub receiver_id: String,
}

#[derive(Debug, Clone)]
pub struct WorkchatConfig {
    pub credentials: IntegrationCredentials,
    /// Secret for the send-message API; outbound replies are disabled
    /// without it.
    pub corp_secret: Option<String>,
    pub agent_id: Option<String>,
    pub api_base: String,
}

#[derive(Debug, Clone)]
pub struct DocspaceConfig {
    pub credentials: IntegrationCredentials,
    pub app_id: String,
    /// Secret for the tenant-token API; document creation is disabled
    /// without it.
    pub app_secret: Option<String>,
    pub api_base: String,
}

#[derive(Debug, Clone)]
pub struct SummarizerConfig {
    pub api_key: String,
    pub api_url: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub workchat: WorkchatConfig,
    pub docspace: DocspaceConfig,
    pub summarizer: Option<SummarizerConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(&|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Split out from
    /// [`Self::from_env`] so tests never mutate process environment.
    fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |name: &str| {
            get(name).with_context(|| format!("missing required environment variable {name}"))
        };

        let workchat_creds = IntegrationCredentials {
            shared_token: require("DOCRELAY_WORKCHAT_TOKEN")?,
            aes_key_seed: require("DOCRELAY_WORKCHAT_AES_KEY")?,
            receiver_id: require("DOCRELAY_WORKCHAT_CORP_ID")?,
        };
        validate_key_seed(&workchat_creds.aes_key_seed, "DOCRELAY_WORKCHAT_AES_KEY")?;

        let docspace_creds = IntegrationCredentials {
            shared_token: require("DOCRELAY_DOCSPACE_TOKEN")?,
            aes_key_seed: require("DOCRELAY_DOCSPACE_AES_KEY")?,
            receiver_id: require("DOCRELAY_DOCSPACE_APP_ID")?,
        };
        validate_key_seed(&docspace_creds.aes_key_seed, "DOCRELAY_DOCSPACE_AES_KEY")?;

        let summarizer = get("DOCRELAY_SUMMARIZER_API_KEY").map(|api_key| SummarizerConfig {
            api_key,
            api_url: get("DOCRELAY_SUMMARIZER_API_URL")
                .unwrap_or_else(|| DEFAULT_SUMMARIZER_API_URL.to_string()),
            model: get("DOCRELAY_SUMMARIZER_MODEL")
                .unwrap_or_else(|| DEFAULT_SUMMARIZER_MODEL.to_string()),
        });

        Ok(Self {
            gateway: GatewayConfig {
                host: get("DOCRELAY_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
                port: get("DOCRELAY_PORT")
                    .and_then(|v| v.parse::<u16>().ok())
                    .unwrap_or(DEFAULT_PORT),
            },
            workchat: WorkchatConfig {
                credentials: workchat_creds,
                corp_secret: get("DOCRELAY_WORKCHAT_CORP_SECRET"),
                agent_id: get("DOCRELAY_WORKCHAT_AGENT_ID"),
                api_base: trim_base(
                    get("DOCRELAY_WORKCHAT_API_BASE")
                        .unwrap_or_else(|| DEFAULT_WORKCHAT_API_BASE.to_string()),
                ),
            },
            docspace: DocspaceConfig {
                app_id: docspace_creds.receiver_id.clone(),
                credentials: docspace_creds,
                app_secret: get("DOCRELAY_DOCSPACE_APP_SECRET"),
                api_base: trim_base(
                    get("DOCRELAY_DOCSPACE_API_BASE")
                        .unwrap_or_else(|| DEFAULT_DOCSPACE_API_BASE.to_string()),
                ),
            },
            summarizer,
        })
    }

    /// Masked overview for startup logs and `config check`. Secrets show
    /// as presence + length only.
    pub fn summary(&self) -> String {
        let mask = |v: &str| format!("set ({} chars)", v.len());
        let opt_mask = |v: &Option<String>| {
            v.as_deref().map_or_else(|| "not set".to_string(), mask)
        };
        format!(
            "gateway: {}:{}\n\
             workchat: corp_id={} token={} aes_key={} corp_secret={} agent_id={}\n\
             docspace: app_id={} token={} aes_key={} app_secret={}\n\
             summarizer: {}",
            self.gateway.host,
            self.gateway.port,
            self.workchat.credentials.receiver_id,
            mask(&self.workchat.credentials.shared_token),
            mask(&self.workchat.credentials.aes_key_seed),
            opt_mask(&self.workchat.corp_secret),
            self.workchat.agent_id.as_deref().unwrap_or("not set"),
            self.docspace.app_id,
            mask(&self.docspace.credentials.shared_token),
            mask(&self.docspace.credentials.aes_key_seed),
            opt_mask(&self.docspace.app_secret),
            self.summarizer.as_ref().map_or("disabled".to_string(), |s| {
                format!("{} via {} (key {})", s.model, s.api_url, mask(&s.api_key))
            }),
        )
    }
}

fn validate_key_seed(seed: &str, var: &str) -> Result<()> {
    crypto::decode_aes_key(seed)
        .map(|_| ())
        .with_context(|| format!("{var} is not a valid 43-char base64 AES key seed"))
}

fn trim_base(url: String) -> String {
    url.trim_end_matches('/').to_string()
}
