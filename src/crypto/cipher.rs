//! AES-256-CBC payload encryption with the protocol's non-standard framing.
//!
//! The cipher layer's own padding is disabled; padding is PKCS#7 applied by
//! this module over the plaintext frame, at block size 32 for workchat and
//! 16 for docspace. The IV is never transmitted as a separate field:
//! workchat reuses the first 16 bytes of the key as IV, docspace prepends
//! the IV to the ciphertext. Both choices are fixed by the external
//! protocols and must be reproduced byte-for-byte for interoperability.

use aes::Aes256;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::Rng;

use super::CodecError;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// AES-256 key length in bytes.
pub const AES_KEY_LEN: usize = 32;
/// AES block size; CBC operates on 16-byte blocks regardless of the
/// frame-level padding block size.
const CBC_BLOCK: usize = 16;
/// A well-formed payload is never shorter than this in either scheme:
/// workchat pads frames to a multiple of 32, docspace prepends a 16-byte
/// IV to at least one cipher block.
const MIN_CIPHERTEXT_LEN: usize = 32;

/// Where the CBC initialization vector comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IvMode {
    /// IV = first 16 bytes of the AES key (workchat).
    KeyPrefix,
    /// IV = first 16 bytes of the ciphertext buffer (docspace).
    CiphertextPrefix,
}

/// Decode the 43-character base64 key seed into raw AES-256 key material.
///
/// The platforms hand out the seed without its trailing `=`; restoring it
/// must yield exactly 32 bytes or the credentials are unusable.
pub fn decode_aes_key(seed: &str) -> Result<[u8; AES_KEY_LEN], CodecError> {
    let raw = B64
        .decode(format!("{seed}="))
        .map_err(|e| CodecError::InvalidKey(format!("key seed is not valid base64: {e}")))?;
    let len = raw.len();
    raw.try_into()
        .map_err(|_| CodecError::InvalidKey(format!("key seed decodes to {len} bytes, expected {AES_KEY_LEN}")))
}

/// Symmetric payload codec for one integration.
#[derive(Debug)]
pub struct PayloadCipher {
    key: [u8; AES_KEY_LEN],
    iv_mode: IvMode,
    pad_block: usize,
}

impl PayloadCipher {
    pub fn new(seed: &str, iv_mode: IvMode, pad_block: usize) -> Result<Self, CodecError> {
        debug_assert!(pad_block % CBC_BLOCK == 0 && pad_block > 0);
        Ok(Self {
            key: decode_aes_key(seed)?,
            iv_mode,
            pad_block,
        })
    }

    /// Decrypt a base64 ciphertext into frame bytes, stripping the
    /// frame-level PKCS#7 padding.
    pub fn decrypt(&self, ciphertext_b64: &str) -> Result<Vec<u8>, CodecError> {
        let raw = B64
            .decode(ciphertext_b64.trim())
            .map_err(|e| CodecError::Decryption(format!("ciphertext is not valid base64: {e}")))?;
        if raw.len() < MIN_CIPHERTEXT_LEN {
            return Err(CodecError::Decryption(format!(
                "ciphertext too short: {} bytes",
                raw.len()
            )));
        }

        let (iv, body): (&[u8], &[u8]) = match self.iv_mode {
            IvMode::KeyPrefix => (&self.key[..CBC_BLOCK], &raw[..]),
            IvMode::CiphertextPrefix => (&raw[..CBC_BLOCK], &raw[CBC_BLOCK..]),
        };

        let dec = Aes256CbcDec::new_from_slices(&self.key, iv)
            .map_err(|e| CodecError::Decryption(format!("cipher init failed: {e}")))?;
        let mut frame = dec
            .decrypt_padded_vec_mut::<NoPadding>(body)
            .map_err(|_| {
                CodecError::Decryption(format!(
                    "ciphertext body is not a multiple of the cipher block ({} bytes)",
                    body.len()
                ))
            })?;

        strip_frame_padding(&mut frame, self.pad_block);
        Ok(frame)
    }

    /// Pad and encrypt frame bytes, returning base64 ciphertext.
    pub fn encrypt(&self, frame: &[u8]) -> Result<String, CodecError> {
        let mut padded = frame.to_vec();
        apply_frame_padding(&mut padded, self.pad_block);

        match self.iv_mode {
            IvMode::KeyPrefix => {
                let enc = Aes256CbcEnc::new_from_slices(&self.key, &self.key[..CBC_BLOCK])
                    .map_err(|e| CodecError::Encryption(format!("cipher init failed: {e}")))?;
                let ct = enc.encrypt_padded_vec_mut::<NoPadding>(&padded);
                Ok(B64.encode(ct))
            }
            IvMode::CiphertextPrefix => {
                let mut iv = [0u8; CBC_BLOCK];
                rand::rng().fill_bytes(&mut iv);
                let enc = Aes256CbcEnc::new_from_slices(&self.key, &iv)
                    .map_err(|e| CodecError::Encryption(format!("cipher init failed: {e}")))?;
                let ct = enc.encrypt_padded_vec_mut::<NoPadding>(&padded);
                let mut out = Vec::with_capacity(CBC_BLOCK + ct.len());
                out.extend_from_slice(&iv);
                out.extend_from_slice(&ct);
                Ok(B64.encode(out))
            }
        }
    }
}

/// PKCS#7 at an arbitrary block size. A frame whose length is already a
/// multiple of the block still receives a full block of padding.
fn apply_frame_padding(buf: &mut Vec<u8>, block: usize) {
    let pad = block - (buf.len() % block);
    buf.extend(std::iter::repeat(pad as u8).take(pad));
}

/// Tolerant PKCS#7 strip. Invalid padding retains the buffer unmodified:
/// the external protocols require best-effort parsing of anomalous frames
/// rather than rejecting the whole request.
fn strip_frame_padding(buf: &mut Vec<u8>, block: usize) {
    let Some(&last) = buf.last() else {
        return;
    };
    let pad = last as usize;
    if pad == 0 || pad > block || pad > buf.len() {
        tracing::debug!("frame padding byte {pad} out of range, keeping buffer as-is");
        return;
    }
    if buf[buf.len() - pad..].iter().all(|&b| b == last) {
        buf.truncate(buf.len() - pad);
    } else {
        tracing::debug!("frame padding bytes inconsistent, keeping buffer as-is");
    }
}
