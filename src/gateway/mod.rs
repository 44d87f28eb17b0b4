//! Axum-based HTTP gateway for the two callback surfaces.
//!
//! Every inbound request runs the same synchronous pipeline: verify the
//! signature against the raw ciphertext, decrypt, parse the frame, then
//! hand the message to the relay. The enrichment hops (summarize, create
//! document, notify) run in a spawned task so callback responses never
//! wait on upstream APIs — the platforms redeliver callbacks that take
//! too long to acknowledge.

use crate::channels::{DocspaceClient, WorkchatClient};
use crate::config::Config;
use crate::crypto::{CodecError, SecureChannel};
use crate::envelope::json as json_envelope;
use crate::envelope::xml as xml_envelope;
use crate::handler::{self, RelayContext};
use crate::storage::{RecentCallbacks, RECENT_CALLBACKS_CAPACITY};
use crate::summarizer::Summarizer;
use anyhow::Result;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Maximum request body size (64KB) — callback envelopes are small.
pub const MAX_BODY_SIZE: usize = 65_536;
/// Request timeout (30s) — prevents slow-loris attacks.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

const XML_CONTENT_TYPE: &str = "application/xml; charset=utf-8";

/// Shared state for all axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub workchat_codec: Arc<SecureChannel>,
    pub docspace_codec: Arc<SecureChannel>,
    pub relay: RelayContext,
    pub recent: Arc<RecentCallbacks>,
}

/// Build runtime state from validated configuration.
pub fn build_state(config: &Config) -> Result<AppState> {
    let workchat_codec = SecureChannel::workchat(
        &config.workchat.credentials.shared_token,
        &config.workchat.credentials.aes_key_seed,
        &config.workchat.credentials.receiver_id,
    )?;
    let docspace_codec = SecureChannel::docspace(
        &config.docspace.credentials.shared_token,
        &config.docspace.credentials.aes_key_seed,
        &config.docspace.credentials.receiver_id,
    )?;

    let relay = RelayContext {
        summarizer: config
            .summarizer
            .as_ref()
            .map(|c| Arc::new(Summarizer::from_config(c))),
        docspace: DocspaceClient::from_config(&config.docspace).map(Arc::new),
        workchat: WorkchatClient::from_config(&config.workchat).map(Arc::new),
    };

    Ok(AppState {
        workchat_codec: Arc::new(workchat_codec),
        docspace_codec: Arc::new(docspace_codec),
        relay,
        recent: Arc::new(RecentCallbacks::new(RECENT_CALLBACKS_CAPACITY)),
    })
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/callback/workchat",
            get(handle_workchat_verify).post(handle_workchat_message),
        )
        .route("/callback/docspace", post(handle_docspace_event))
        .route("/health", get(handle_health))
        .route("/debug/recent", get(handle_debug_recent))
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        ))
}

/// Run the HTTP gateway.
pub async fn run_gateway(config: Config) -> Result<()> {
    let state = build_state(&config)?;
    let relay = &state.relay;
    let summarizer_on = relay.summarizer.is_some();
    let workchat_out = relay.workchat.is_some();
    let docspace_out = relay.docspace.is_some();

    let addr: SocketAddr = format!("{}:{}", config.gateway.host, config.gateway.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let display_addr = listener.local_addr()?;

    println!("🔏 docrelay gateway listening on http://{display_addr}");
    println!("  GET  /callback/workchat — echo verification");
    println!("  POST /callback/workchat — encrypted message callback");
    println!("  POST /callback/docspace — event callback");
    println!("  GET  /health       — health check");
    println!("  GET  /debug/recent — recent callback journal (metadata only)");
    println!(
        "  Relay legs: summarizer={} docspace-docs={} workchat-send={}",
        on_off(summarizer_on),
        on_off(docspace_out),
        on_off(workchat_out),
    );
    if !summarizer_on {
        println!("  ⚠️  No summarizer API key — messages are acknowledged but not relayed.");
    }
    println!("  Press Ctrl+C to stop.\n");

    let app = build_router(state);
    axum::serve(listener, app).await?;
    Ok(())
}

fn on_off(v: bool) -> &'static str {
    if v {
        "on"
    } else {
        "off"
    }
}

/// Map a codec failure onto the platform-facing response. Detail stays in
/// the server log; callers get the minimal body the platforms expect.
fn codec_error_response(platform: &'static str, err: &CodecError) -> Response {
    match err {
        CodecError::SignatureMismatch => {
            tracing::warn!(platform, "callback signature mismatch");
            (StatusCode::UNAUTHORIZED, "invalid signature").into_response()
        }
        CodecError::MalformedEnvelope(detail) => {
            tracing::warn!(platform, %detail, "malformed callback envelope");
            (StatusCode::BAD_REQUEST, "malformed envelope").into_response()
        }
        CodecError::Decryption(detail) => {
            tracing::warn!(platform, %detail, "callback decryption failed");
            (StatusCode::BAD_REQUEST, "invalid payload").into_response()
        }
        CodecError::ReceiverMismatch { frame, expected } => {
            tracing::warn!(platform, %frame, %expected, "callback receiver id mismatch");
            (StatusCode::BAD_REQUEST, "receiver mismatch").into_response()
        }
        CodecError::Encryption(detail) => {
            tracing::error!(platform, %detail, "reply encryption failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "reply encoding failed").into_response()
        }
        CodecError::InvalidKey(_) | CodecError::InvalidCredentials(_) => {
            // Construction-time failures; unreachable once the state is built.
            tracing::error!(platform, "codec credential failure on a live request");
            (StatusCode::INTERNAL_SERVER_ERROR, "codec unavailable").into_response()
        }
    }
}

fn spawn_relay(state: &AppState, origin: &'static str, msg: handler::InboundMessage) {
    let relay = state.relay.clone();
    tokio::spawn(async move {
        if let Err(err) = handler::enrich_and_relay(&relay, origin, msg).await {
            tracing::error!(origin, "relay pipeline failed: {err:#}");
        }
    });
}

// ══════════════════════════════════════════════════════════════════════════════
// AXUM HANDLERS
// ══════════════════════════════════════════════════════════════════════════════

/// Workchat callback query parameters. The GET handshake additionally
/// carries `echostr`; POSTs carry the ciphertext in the body instead.
#[derive(serde::Deserialize)]
pub struct WorkchatCallbackQuery {
    pub msg_signature: Option<String>,
    pub timestamp: Option<String>,
    pub nonce: Option<String>,
    pub echostr: Option<String>,
}

/// GET /callback/workchat — endpoint-ownership echo verification.
async fn handle_workchat_verify(
    State(state): State<AppState>,
    Query(params): Query<WorkchatCallbackQuery>,
) -> Response {
    let (Some(signature), Some(timestamp), Some(nonce), Some(echostr)) = (
        params.msg_signature.as_deref(),
        params.timestamp.as_deref(),
        params.nonce.as_deref(),
        params.echostr.as_deref(),
    ) else {
        return (StatusCode::BAD_REQUEST, "missing verification parameters").into_response();
    };

    // The signature covers the still-encrypted echostr.
    if !state.workchat_codec.verify(timestamp, nonce, echostr, signature) {
        tracing::warn!("workchat echo verification failed — signature mismatch");
        state.recent.record("workchat", "echo", false);
        return (StatusCode::FORBIDDEN, "invalid signature").into_response();
    }

    match state.workchat_codec.decrypt_unverified(echostr) {
        Ok(frame) => {
            tracing::info!("workchat echo verification succeeded");
            state.recent.record("workchat", "echo", true);
            (StatusCode::OK, frame.message_text()).into_response()
        }
        Err(err) => {
            state.recent.record("workchat", "echo", false);
            codec_error_response("workchat", &err)
        }
    }
}

/// POST /callback/workchat — encrypted message callback. Replies with a
/// freshly encrypted and signed ack envelope for text messages, a bare
/// `success` for everything else.
async fn handle_workchat_message(
    State(state): State<AppState>,
    Query(params): Query<WorkchatCallbackQuery>,
    body: String,
) -> Response {
    let (Some(signature), Some(timestamp), Some(nonce)) = (
        params.msg_signature.as_deref(),
        params.timestamp.as_deref(),
        params.nonce.as_deref(),
    ) else {
        return (StatusCode::BAD_REQUEST, "missing signature parameters").into_response();
    };

    let ciphertext = match xml_envelope::extract_encrypted(&body) {
        Ok(ct) => ct,
        Err(err) => {
            state.recent.record("workchat", "malformed", false);
            return codec_error_response("workchat", &err);
        }
    };

    let frame = match state
        .workchat_codec
        .verify_and_decrypt(&ciphertext, timestamp, nonce, signature)
    {
        Ok(frame) => frame,
        Err(err) => {
            state.recent.record("workchat", "rejected", false);
            return codec_error_response("workchat", &err);
        }
    };

    let msg = handler::parse_workchat_message(&frame.message_text());
    state.recent.record("workchat", msg.kind(), true);
    let ack = handler::ack_text(&msg);
    spawn_relay(&state, "workchat", msg);

    match ack {
        Some(text) => {
            let reply_timestamp = chrono::Utc::now().timestamp().to_string();
            let reply_nonce = uuid::Uuid::new_v4().simple().to_string();
            match state
                .workchat_codec
                .encrypt_and_sign(text.as_bytes(), &reply_timestamp, &reply_nonce)
            {
                Ok(sealed) => {
                    let reply = xml_envelope::render_reply(
                        &sealed.ciphertext,
                        &sealed.signature,
                        &reply_timestamp,
                        &reply_nonce,
                    );
                    (
                        StatusCode::OK,
                        [(header::CONTENT_TYPE, XML_CONTENT_TYPE)],
                        reply,
                    )
                        .into_response()
                }
                Err(err) => codec_error_response("workchat", &err),
            }
        }
        None => (StatusCode::OK, "success").into_response(),
    }
}

/// POST /callback/docspace — event callback. The `url_verification`
/// handshake is answered before any signature work; real events are
/// verified, decrypted and acknowledged with a bare `success`.
async fn handle_docspace_event(State(state): State<AppState>, body: Bytes) -> Response {
    let inbound = match json_envelope::decode_inbound(&body) {
        Ok(inbound) => inbound,
        Err(err) => {
            state.recent.record("docspace", "malformed", false);
            return codec_error_response("docspace", &err);
        }
    };

    let (ciphertext, timestamp, nonce, signature) = match inbound {
        json_envelope::DocspaceInbound::UrlVerification { challenge } => {
            tracing::info!("docspace url_verification handshake");
            state.recent.record("docspace", "url_verification", true);
            return Json(json_envelope::challenge_response(&challenge)).into_response();
        }
        json_envelope::DocspaceInbound::Encrypted {
            ciphertext,
            timestamp,
            nonce,
            signature,
        } => (ciphertext, timestamp, nonce, signature),
    };

    let frame = match state
        .docspace_codec
        .verify_and_decrypt(&ciphertext, &timestamp, &nonce, &signature)
    {
        Ok(frame) => frame,
        Err(err) => {
            state.recent.record("docspace", "rejected", false);
            return codec_error_response("docspace", &err);
        }
    };

    let msg = handler::parse_docspace_message(&frame.message_text());
    state.recent.record("docspace", msg.kind(), true);
    spawn_relay(&state, "docspace", msg);

    (StatusCode::OK, "success").into_response()
}

/// GET /health — always public (no secrets leaked).
async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    let body = serde_json::json!({
        "status": "ok",
        "relay": {
            "summarizer": state.relay.summarizer.is_some(),
            "docspace": state.relay.docspace.is_some(),
            "workchat": state.relay.workchat.is_some(),
        },
    });
    Json(body)
}

/// GET /debug/recent — bounded journal of recent callbacks, newest first.
async fn handle_debug_recent(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.recent.snapshot())
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD as B64;
    use base64::Engine as _;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    const TOKEN: &str = "mytoken";
    const CORP_ID: &str = "wwCORP123";
    const APP_ID: &str = "app_abc";

    fn test_seed() -> String {
        let mut seed = B64.encode(b"0123456789abcdefghijklmnopqrstuv");
        seed.pop();
        seed
    }

    fn test_state() -> AppState {
        AppState {
            workchat_codec: Arc::new(
                SecureChannel::workchat(TOKEN, &test_seed(), CORP_ID).unwrap(),
            ),
            docspace_codec: Arc::new(
                SecureChannel::docspace(TOKEN, &test_seed(), APP_ID).unwrap(),
            ),
            relay: RelayContext::default(),
            recent: Arc::new(RecentCallbacks::new(10)),
        }
    }

    fn router(state: &AppState) -> Router {
        build_router(state.clone())
    }

    async fn body_text(resp: Response) -> String {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn get(uri: &str) -> axum::http::Request<axum::body::Body> {
        axum::http::Request::builder()
            .method("GET")
            .uri(uri)
            .body(axum::body::Body::empty())
            .unwrap()
    }

    fn post(uri: &str, body: impl Into<axum::body::Body>) -> axum::http::Request<axum::body::Body> {
        axum::http::Request::builder()
            .method("POST")
            .uri(uri)
            .body(body.into())
            .unwrap()
    }

    // ── GET /callback/workchat ────────────────────────────────────────

    #[tokio::test]
    async fn workchat_echo_round_trips() {
        let state = test_state();
        // The platform frames and encrypts a random echo string, then
        // signs the ciphertext.
        let sealed = state
            .workchat_codec
            .encrypt_and_sign(b"echo-plaintext-42", "1700000000", "n1")
            .unwrap();
        let uri = format!(
            "/callback/workchat?msg_signature={}&timestamp=1700000000&nonce=n1&echostr={}",
            sealed.signature,
            urlencoding::encode(&sealed.ciphertext),
        );

        let resp = router(&state).oneshot(get(&uri)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_text(resp).await, "echo-plaintext-42");
    }

    #[tokio::test]
    async fn workchat_echo_rejects_bad_signature() {
        let state = test_state();
        let sealed = state
            .workchat_codec
            .encrypt_and_sign(b"echo", "1700000000", "n1")
            .unwrap();
        let uri = format!(
            "/callback/workchat?msg_signature=badbadbad&timestamp=1700000000&nonce=n1&echostr={}",
            urlencoding::encode(&sealed.ciphertext),
        );

        let resp = router(&state).oneshot(get(&uri)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn workchat_echo_rejects_missing_params() {
        let state = test_state();
        let resp = router(&state)
            .oneshot(get("/callback/workchat?timestamp=1&nonce=n"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    // ── POST /callback/workchat ───────────────────────────────────────

    const INNER_TEXT: &str = "<xml>\
        <FromUserName><![CDATA[zhangsan]]></FromUserName>\
        <MsgType><![CDATA[text]]></MsgType>\
        <Content><![CDATA[summarize the thread]]></Content>\
        </xml>";

    fn workchat_post_request(state: &AppState, inner: &str) -> axum::http::Request<axum::body::Body> {
        let sealed = state
            .workchat_codec
            .encrypt_and_sign(inner.as_bytes(), "1700000000", "n1")
            .unwrap();
        let body = format!(
            "<xml><Encrypt><![CDATA[{}]]></Encrypt></xml>",
            sealed.ciphertext
        );
        let uri = format!(
            "/callback/workchat?msg_signature={}&timestamp=1700000000&nonce=n1",
            sealed.signature
        );
        post(&uri, body)
    }

    #[tokio::test]
    async fn workchat_text_message_gets_encrypted_ack() {
        let state = test_state();
        let resp = router(&state)
            .oneshot(workchat_post_request(&state, INNER_TEXT))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let reply = body_text(resp).await;
        let ciphertext = xml_envelope::extract_encrypted(&reply).unwrap();
        let signature = xml_envelope::read_element_text(&reply, "MsgSignature")
            .unwrap()
            .unwrap();
        let timestamp = xml_envelope::read_element_text(&reply, "TimeStamp")
            .unwrap()
            .unwrap();
        let nonce = xml_envelope::read_element_text(&reply, "Nonce").unwrap().unwrap();

        let frame = state
            .workchat_codec
            .verify_and_decrypt(&ciphertext, &timestamp, &nonce, &signature)
            .unwrap();
        assert!(frame.message_text().contains("Working on it"));
    }

    #[tokio::test]
    async fn workchat_unhandled_message_gets_plain_success() {
        let state = test_state();
        let inner = "<xml><MsgType><![CDATA[image]]></MsgType></xml>";
        let resp = router(&state)
            .oneshot(workchat_post_request(&state, inner))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_text(resp).await, "success");
    }

    #[tokio::test]
    async fn workchat_post_rejects_bad_signature() {
        let state = test_state();
        let sealed = state
            .workchat_codec
            .encrypt_and_sign(INNER_TEXT.as_bytes(), "1700000000", "n1")
            .unwrap();
        let body = format!(
            "<xml><Encrypt><![CDATA[{}]]></Encrypt></xml>",
            sealed.ciphertext
        );
        // Signature computed for a different nonce.
        let uri = format!(
            "/callback/workchat?msg_signature={}&timestamp=1700000000&nonce=other",
            sealed.signature
        );
        let resp = router(&state).oneshot(post(&uri, body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn workchat_post_rejects_missing_encrypt_element() {
        let state = test_state();
        let resp = router(&state)
            .oneshot(post(
                "/callback/workchat?msg_signature=s&timestamp=t&nonce=n",
                "<xml><NoCipher/></xml>",
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn workchat_post_rejects_undecryptable_ciphertext() {
        let state = test_state();
        let ciphertext = "AAAA"; // valid base64, far too short
        let signature = state.workchat_codec.sign("t", "n", ciphertext);
        let body = format!("<xml><Encrypt><![CDATA[{ciphertext}]]></Encrypt></xml>");
        let uri = format!("/callback/workchat?msg_signature={signature}&timestamp=t&nonce=n");
        let resp = router(&state).oneshot(post(&uri, body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    // ── POST /callback/docspace ───────────────────────────────────────

    #[tokio::test]
    async fn docspace_url_verification_echoes_challenge() {
        let state = test_state();
        let resp = router(&state)
            .oneshot(post(
                "/callback/docspace",
                r#"{"type":"url_verification","challenge":"abc123"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
        assert_eq!(body, serde_json::json!({"challenge": "abc123"}));
    }

    #[tokio::test]
    async fn docspace_message_event_is_acknowledged() {
        let state = test_state();
        let inner = r#"{"type":"message","sender":"u1","text":"hello"}"#;
        let sealed = state
            .docspace_codec
            .encrypt_and_sign(inner.as_bytes(), "1700000000", "n1")
            .unwrap();
        let body = serde_json::to_string(&json_envelope::encode_reply(
            &sealed.ciphertext,
            "1700000000",
            "n1",
            &sealed.signature,
        ))
        .unwrap();

        let resp = router(&state)
            .oneshot(post("/callback/docspace", body))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_text(resp).await, "success");
    }

    #[tokio::test]
    async fn docspace_rejects_bad_signature() {
        let state = test_state();
        let sealed = state
            .docspace_codec
            .encrypt_and_sign(b"{}", "1700000000", "n1")
            .unwrap();
        let body = serde_json::to_string(&json_envelope::encode_reply(
            &sealed.ciphertext,
            "1700000000",
            "n1",
            "wrong-signature",
        ))
        .unwrap();

        let resp = router(&state)
            .oneshot(post("/callback/docspace", body))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn docspace_rejects_non_json_body() {
        let state = test_state();
        let resp = router(&state)
            .oneshot(post("/callback/docspace", "<xml>wrong shape</xml>"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    // ── Diagnostics ───────────────────────────────────────────────────

    #[tokio::test]
    async fn health_reports_relay_legs() {
        let state = test_state();
        let resp = router(&state).oneshot(get("/health")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["relay"]["summarizer"], false);
    }

    #[tokio::test]
    async fn debug_recent_journals_callbacks() {
        let state = test_state();
        let app = router(&state);
        app.clone()
            .oneshot(post(
                "/callback/docspace",
                r#"{"type":"url_verification","challenge":"c"}"#,
            ))
            .await
            .unwrap();

        let resp = app.oneshot(get("/debug/recent")).await.unwrap();
        let body: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
        let entries = body.as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["platform"], "docspace");
        assert_eq!(entries[0]["kind"], "url_verification");
        assert_eq!(entries[0]["ok"], true);
        // Journal entries are metadata only.
        assert!(entries[0].get("message").is_none());
    }
}
