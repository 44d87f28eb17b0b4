//! Secure webhook message codec.
//!
//! Everything protocol-mandated but cryptographically unusual lives behind
//! this module: key-as-IV CBC, 32-byte PKCS#7 blocks, tolerant frame
//! parsing. Callers see a [`SecureChannel`] per integration and the
//! [`CodecError`] taxonomy, nothing else.

pub mod cipher;
pub mod frame;
pub mod signature;

use thiserror::Error;

pub use cipher::{decode_aes_key, IvMode, PayloadCipher};
pub use frame::{build_frame, parse_frame, Frame};

/// Typed failures of the webhook codec. Cryptographic failures are
/// terminal for a request: retrying with the same ciphertext and key
/// cannot succeed, so none of these are ever retried.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("signature mismatch")]
    SignatureMismatch,
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),
    #[error("decryption failed: {0}")]
    Decryption(String),
    #[error("encryption failed: {0}")]
    Encryption(String),
    #[error("receiver id mismatch: frame carries '{frame}', expected '{expected}'")]
    ReceiverMismatch { frame: String, expected: String },
    #[error("invalid key material: {0}")]
    InvalidKey(String),
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),
}

/// Which digest scheme signs this integration's callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureScheme {
    /// Lexicographically sorted inputs, SHA-1 (workchat).
    SortedSha1,
    /// Fixed-order `timestamp + nonce + token + ciphertext`, SHA-256 (docspace).
    OrderedSha256,
}

/// What to do when a decrypted frame carries a receiver id that does not
/// match the configured one. The two platforms disagree, so the policy is
/// fixed per integration at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MismatchPolicy {
    /// Hard failure: reject the request with [`CodecError::ReceiverMismatch`].
    Enforce,
    /// Log at warn level and continue processing.
    Warn,
}

/// Per-integration secure codec: shared token, AES key, receiver id and
/// the integration's signature/IV/padding conventions.
#[derive(Debug)]
pub struct SecureChannel {
    token: String,
    receiver_id: String,
    cipher: PayloadCipher,
    scheme: SignatureScheme,
    mismatch_policy: MismatchPolicy,
}

impl SecureChannel {
    /// Codec for the corporate messaging platform: sorted SHA-1 signatures,
    /// key-as-IV, 32-byte padding blocks, hard receiver-id enforcement.
    pub fn workchat(token: &str, key_seed: &str, receiver_id: &str) -> Result<Self, CodecError> {
        Self::new(
            token,
            receiver_id,
            PayloadCipher::new(key_seed, IvMode::KeyPrefix, 32)?,
            SignatureScheme::SortedSha1,
            MismatchPolicy::Enforce,
        )
    }

    /// Codec for the document platform: ordered SHA-256 signatures,
    /// IV prepended to the ciphertext, 16-byte padding blocks, log-only
    /// receiver-id handling.
    pub fn docspace(token: &str, key_seed: &str, receiver_id: &str) -> Result<Self, CodecError> {
        Self::new(
            token,
            receiver_id,
            PayloadCipher::new(key_seed, IvMode::CiphertextPrefix, 16)?,
            SignatureScheme::OrderedSha256,
            MismatchPolicy::Warn,
        )
    }

    fn new(
        token: &str,
        receiver_id: &str,
        cipher: PayloadCipher,
        scheme: SignatureScheme,
        mismatch_policy: MismatchPolicy,
    ) -> Result<Self, CodecError> {
        // An empty token would make every reply signature forgeable from
        // public data; refuse to construct rather than sign with it.
        if token.trim().is_empty() {
            return Err(CodecError::InvalidCredentials("shared token is empty".into()));
        }
        if receiver_id.trim().is_empty() {
            return Err(CodecError::InvalidCredentials("receiver id is empty".into()));
        }
        Ok(Self {
            token: token.to_string(),
            receiver_id: receiver_id.to_string(),
            cipher,
            scheme,
            mismatch_policy,
        })
    }

    pub fn receiver_id(&self) -> &str {
        &self.receiver_id
    }

    /// Compute this integration's signature over the given parameters.
    pub fn sign(&self, timestamp: &str, nonce: &str, ciphertext: &str) -> String {
        match self.scheme {
            SignatureScheme::SortedSha1 => {
                signature::sign_sorted(&self.token, timestamp, nonce, ciphertext)
            }
            SignatureScheme::OrderedSha256 => {
                signature::sign_ordered(&self.token, timestamp, nonce, ciphertext)
            }
        }
    }

    /// Verify a caller-supplied signature over the raw ciphertext field.
    pub fn verify(&self, timestamp: &str, nonce: &str, ciphertext: &str, candidate: &str) -> bool {
        match self.scheme {
            SignatureScheme::SortedSha1 => {
                signature::verify_sorted(&self.token, timestamp, nonce, ciphertext, candidate)
            }
            SignatureScheme::OrderedSha256 => {
                signature::verify_ordered(&self.token, timestamp, nonce, ciphertext, candidate)
            }
        }
    }

    /// Full inbound pipeline: verify the signature, decrypt, parse the
    /// frame and apply the receiver-id policy.
    pub fn verify_and_decrypt(
        &self,
        ciphertext_b64: &str,
        timestamp: &str,
        nonce: &str,
        candidate_signature: &str,
    ) -> Result<Frame, CodecError> {
        if !self.verify(timestamp, nonce, ciphertext_b64, candidate_signature) {
            return Err(CodecError::SignatureMismatch);
        }
        self.decrypt_unverified(ciphertext_b64)
    }

    /// Decrypt and frame-parse without a signature check. Only the echo
    /// handshake path should pair this with a separately verified
    /// signature; message callbacks go through [`Self::verify_and_decrypt`].
    pub fn decrypt_unverified(&self, ciphertext_b64: &str) -> Result<Frame, CodecError> {
        let plaintext = self.cipher.decrypt(ciphertext_b64)?;
        let frame = parse_frame(&plaintext);

        if !frame.receiver_id.is_empty() && frame.receiver_id != self.receiver_id.as_bytes() {
            match self.mismatch_policy {
                MismatchPolicy::Enforce => {
                    return Err(CodecError::ReceiverMismatch {
                        frame: frame.receiver_id_text(),
                        expected: self.receiver_id.clone(),
                    });
                }
                MismatchPolicy::Warn => {
                    tracing::warn!(
                        expected = %self.receiver_id,
                        got = %frame.receiver_id_text(),
                        "frame receiver id does not match configured receiver id"
                    );
                }
            }
        }
        Ok(frame)
    }

    /// Full outbound pipeline: frame the message with a fresh nonce,
    /// encrypt, and sign the resulting ciphertext.
    pub fn encrypt_and_sign(
        &self,
        message: &[u8],
        timestamp: &str,
        nonce: &str,
    ) -> Result<SealedPayload, CodecError> {
        use rand::Rng;

        let mut random = [0u8; 16];
        rand::rng().fill_bytes(&mut random);
        let framed = build_frame(random, message, self.receiver_id.as_bytes());
        let ciphertext = self.cipher.encrypt(&framed)?;
        let signature = self.sign(timestamp, nonce, &ciphertext);
        Ok(SealedPayload {
            ciphertext,
            signature,
        })
    }
}

/// An encrypted, signed reply payload ready for envelope wrapping.
#[derive(Debug, Clone)]
pub struct SealedPayload {
    pub ciphertext: String,
    pub signature: String,
}
