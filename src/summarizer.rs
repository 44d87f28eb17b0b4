//! Text-completion client for the enrichment hop. Speaks the
//! OpenAI-compatible chat-completions shape; the summarization prompt is
//! fixed here, the model and endpoint come from configuration.

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::config::SummarizerConfig;

const SYSTEM_PROMPT: &str = "Summarize the user's message into a short document: \
    a one-line title on the first line, then a concise summary. \
    Keep the original language of the message.";

pub struct Summarizer {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

impl Summarizer {
    pub fn from_config(config: &SummarizerConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        }
    }

    /// Summarize a message. Returns the raw completion text; the caller
    /// splits title from body.
    pub async fn summarize(&self, text: &str) -> Result<String> {
        let payload = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": text },
            ],
        });

        let resp = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .context("summarizer request failed")?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("summarizer request failed ({status}): {}", body.trim());
        }

        let body = resp
            .json::<ChatResponse>()
            .await
            .context("summarizer response decode failed")?;
        let content = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .context("summarizer response carried no choices")?;
        Ok(content.trim().to_string())
    }
}

/// Split a completion into (title, body). The first non-empty line is the
/// title; everything after it is the body, falling back to the title when
/// the model returned a single line.
pub fn split_title(completion: &str) -> (String, String) {
    let mut lines = completion.lines().filter(|l| !l.trim().is_empty());
    let title = lines.next().unwrap_or("Summary").trim();
    let title = title.trim_start_matches('#').trim();
    let body = lines.collect::<Vec<_>>().join("\n");
    if body.is_empty() {
        (title.to_string(), completion.trim().to_string())
    } else {
        (title.to_string(), body)
    }
}
