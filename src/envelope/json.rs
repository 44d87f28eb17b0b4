//! Docspace transport envelope: flat JSON with the ciphertext and the
//! signature parameters as top-level fields. The `url_verification`
//! handshake arrives unencrypted and must short-circuit before any
//! signature or codec work.

use serde_json::Value;

use crate::crypto::CodecError;

/// A decoded inbound docspace callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocspaceInbound {
    /// Endpoint-ownership handshake; echo the challenge back verbatim.
    UrlVerification { challenge: String },
    /// A signed, encrypted event payload.
    Encrypted {
        ciphertext: String,
        timestamp: String,
        nonce: String,
        signature: String,
    },
}

/// Decode an inbound callback body.
///
/// The handshake check runs first: a `url_verification` body carries no
/// signature fields, so verifying before dispatch would reject it.
pub fn decode_inbound(body: &[u8]) -> Result<DocspaceInbound, CodecError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| CodecError::MalformedEnvelope(format!("invalid JSON body: {e}")))?;

    if value.get("type").and_then(Value::as_str) == Some("url_verification") {
        let challenge = value
            .get("challenge")
            .and_then(Value::as_str)
            .ok_or_else(|| CodecError::MalformedEnvelope("url_verification without challenge".into()))?;
        return Ok(DocspaceInbound::UrlVerification {
            challenge: challenge.to_string(),
        });
    }

    Ok(DocspaceInbound::Encrypted {
        ciphertext: required_string(&value, "encrypt")?,
        timestamp: required_string(&value, "timestamp")?,
        nonce: required_string(&value, "nonce")?,
        signature: required_string(&value, "signature")?,
    })
}

/// Response body for the handshake.
pub fn challenge_response(challenge: &str) -> Value {
    serde_json::json!({ "challenge": challenge })
}

/// Wrap a sealed reply payload back into the wire shape.
pub fn encode_reply(ciphertext: &str, timestamp: &str, nonce: &str, signature: &str) -> Value {
    serde_json::json!({
        "encrypt": ciphertext,
        "timestamp": timestamp,
        "nonce": nonce,
        "signature": signature,
    })
}

/// Fetch a top-level field as a string. The platform serializes the
/// timestamp as a number in some API versions, so numbers are accepted
/// and stringified.
fn required_string(value: &Value, name: &str) -> Result<String, CodecError> {
    match value.get(name) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(_) | None => Err(CodecError::MalformedEnvelope(format!(
            "missing or invalid field '{name}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_verification_bypasses_everything() {
        let body = br#"{"type":"url_verification","challenge":"abc123"}"#;
        let inbound = decode_inbound(body).unwrap();
        assert_eq!(
            inbound,
            DocspaceInbound::UrlVerification {
                challenge: "abc123".into()
            }
        );
        assert_eq!(
            challenge_response("abc123"),
            serde_json::json!({"challenge": "abc123"})
        );
    }

    #[test]
    fn url_verification_without_challenge_is_malformed() {
        let err = decode_inbound(br#"{"type":"url_verification"}"#).unwrap_err();
        assert!(matches!(err, CodecError::MalformedEnvelope(_)));
    }

    #[test]
    fn encrypted_envelope_decodes() {
        let body = br#"{"encrypt":"Y2lwaGVy","timestamp":"1700000000","nonce":"n1","signature":"sig"}"#;
        let inbound = decode_inbound(body).unwrap();
        assert_eq!(
            inbound,
            DocspaceInbound::Encrypted {
                ciphertext: "Y2lwaGVy".into(),
                timestamp: "1700000000".into(),
                nonce: "n1".into(),
                signature: "sig".into(),
            }
        );
    }

    #[test]
    fn numeric_timestamp_is_stringified() {
        let body = br#"{"encrypt":"Y2lwaGVy","timestamp":1700000000,"nonce":"n1","signature":"sig"}"#;
        let DocspaceInbound::Encrypted { timestamp, .. } = decode_inbound(body).unwrap() else {
            panic!("expected encrypted envelope");
        };
        assert_eq!(timestamp, "1700000000");
    }

    #[test]
    fn missing_fields_are_malformed() {
        for body in [
            br#"{"timestamp":"t","nonce":"n","signature":"s"}"#.as_slice(),
            br#"{"encrypt":"c","nonce":"n","signature":"s"}"#.as_slice(),
            br#"{"encrypt":"c","timestamp":"t","signature":"s"}"#.as_slice(),
            br#"{"encrypt":"c","timestamp":"t","nonce":"n"}"#.as_slice(),
        ] {
            let err = decode_inbound(body).unwrap_err();
            assert!(matches!(err, CodecError::MalformedEnvelope(_)));
        }
    }

    #[test]
    fn invalid_json_is_malformed() {
        let err = decode_inbound(b"{not json").unwrap_err();
        assert!(matches!(err, CodecError::MalformedEnvelope(_)));
    }

    #[test]
    fn reply_encoding_round_trips() {
        let reply = encode_reply("Y2lwaGVy", "1700000000", "n1", "sig");
        let body = serde_json::to_vec(&reply).unwrap();
        let inbound = decode_inbound(&body).unwrap();
        assert_eq!(
            inbound,
            DocspaceInbound::Encrypted {
                ciphertext: "Y2lwaGVy".into(),
                timestamp: "1700000000".into(),
                nonce: "n1".into(),
                signature: "sig".into(),
            }
        );
    }
}
