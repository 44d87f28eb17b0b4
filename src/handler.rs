//! Decrypted-message handling: classify the plaintext into a closed set
//! of message kinds, then run the relay pipeline (summarize → create a
//! document → notify the sender).
//!
//! Classification never fails a request that already passed signature and
//! decryption checks — unknown shapes land in `Unhandled` and are logged,
//! not rejected.

use anyhow::{Context, Result};
use serde_json::Value;
use std::sync::Arc;

use crate::channels::{DocspaceClient, WorkchatClient};
use crate::envelope::xml;
use crate::summarizer::{split_title, Summarizer};

/// A decrypted inbound message, reduced to the kinds this service acts
/// on. The explicit `Unhandled` arm replaces the source system's silent
/// fallthrough on unknown types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    Text { sender: String, content: String },
    Unhandled { kind: String },
}

impl InboundMessage {
    /// Short label for the callback journal.
    pub fn kind(&self) -> String {
        match self {
            Self::Text { .. } => "text".to_string(),
            Self::Unhandled { kind } => format!("unhandled:{kind}"),
        }
    }
}

/// Classify a workchat plaintext frame message (an inner XML document
/// with `MsgType`, `FromUserName`, `Content` elements).
pub fn parse_workchat_message(plaintext: &str) -> InboundMessage {
    let element = |name: &str| xml::read_element_text(plaintext, name).ok().flatten();

    let msg_type = element("MsgType").unwrap_or_else(|| "unknown".to_string());
    if msg_type != "text" {
        return InboundMessage::Unhandled { kind: msg_type };
    }
    match (element("FromUserName"), element("Content")) {
        (Some(sender), Some(content)) => InboundMessage::Text { sender, content },
        _ => InboundMessage::Unhandled {
            kind: "text-without-body".to_string(),
        },
    }
}

/// Classify a docspace plaintext frame message (an inner JSON event with
/// `type`, `sender`, `text` fields).
pub fn parse_docspace_message(plaintext: &str) -> InboundMessage {
    let Ok(value) = serde_json::from_str::<Value>(plaintext) else {
        return InboundMessage::Unhandled {
            kind: "unparsable".to_string(),
        };
    };
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();
    if kind != "message" {
        return InboundMessage::Unhandled { kind };
    }
    match (
        value.get("sender").and_then(Value::as_str),
        value.get("text").and_then(Value::as_str),
    ) {
        (Some(sender), Some(text)) => InboundMessage::Text {
            sender: sender.to_string(),
            content: text.to_string(),
        },
        _ => InboundMessage::Unhandled {
            kind: "message-without-body".to_string(),
        },
    }
}

/// Immediate acknowledgement for the callback response. Only text
/// messages get one; everything else is acknowledged silently.
pub fn ack_text(msg: &InboundMessage) -> Option<String> {
    match msg {
        InboundMessage::Text { .. } => {
            Some("Working on it — your summary document will follow shortly.".to_string())
        }
        InboundMessage::Unhandled { .. } => None,
    }
}

/// Everything the relay pipeline may call. All legs are optional so the
/// gateway degrades gracefully when outbound credentials are absent.
#[derive(Clone, Default)]
pub struct RelayContext {
    pub summarizer: Option<Arc<Summarizer>>,
    pub docspace: Option<Arc<DocspaceClient>>,
    pub workchat: Option<Arc<WorkchatClient>>,
}

/// The enrichment pipeline, run after the callback response is sent:
/// summarize the message, store the summary as a document, tell the
/// sender where it is. Each hop is awaited in turn; a failure anywhere
/// aborts the rest and surfaces upward unmodified.
pub async fn enrich_and_relay(
    ctx: &RelayContext,
    origin: &'static str,
    msg: InboundMessage,
) -> Result<()> {
    let InboundMessage::Text { sender, content } = msg else {
        tracing::debug!(origin, "no relay action for non-text message");
        return Ok(());
    };

    let Some(summarizer) = ctx.summarizer.as_ref() else {
        tracing::info!(origin, "summarizer not configured, message dropped after ack");
        return Ok(());
    };
    let completion = summarizer
        .summarize(&content)
        .await
        .context("summarization failed")?;
    let (title, body) = split_title(&completion);

    let Some(docspace) = ctx.docspace.as_ref() else {
        tracing::info!(origin, "docspace credentials not configured, summary not stored");
        return Ok(());
    };
    let doc_ref = docspace
        .create_document(&title, &body)
        .await
        .context("document creation failed")?;
    tracing::info!(origin, %doc_ref, "summary document created");

    // Only the messaging platform has a send API; document-platform
    // senders see their result in the document itself.
    if origin == "workchat" {
        if let Some(workchat) = ctx.workchat.as_ref() {
            workchat
                .send_text(&sender, &format!("Your summary is ready: {doc_ref}"))
                .await
                .context("notification send failed")?;
        }
    }
    Ok(())
}
