//! Plaintext frame layout shared by both integrations:
//!
//! ```text
//! random(16) || message_len(u32 BE) || message || receiver_id
//! ```
//!
//! Parsing is deliberately tolerant: the external platforms occasionally
//! emit frames with bogus lengths, and the protocol expects receivers to
//! fall back to best-effort extraction instead of rejecting the request.

/// Offset of the big-endian message length.
const LEN_OFFSET: usize = 16;
/// Minimum length for a structurally valid frame: nonce + length field.
const MIN_FRAMED_LEN: usize = 20;

/// A parsed plaintext frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub random: [u8; 16],
    pub message: Vec<u8>,
    /// Trailing tenant/app identifier; empty when the frame carried none
    /// or when parsing fell back to best-effort extraction.
    pub receiver_id: Vec<u8>,
}

impl Frame {
    /// Frame message as text, replacing any invalid UTF-8.
    pub fn message_text(&self) -> String {
        String::from_utf8_lossy(&self.message).into_owned()
    }

    /// Receiver identifier as text, for comparison and logging.
    pub fn receiver_id_text(&self) -> String {
        String::from_utf8_lossy(&self.receiver_id).into_owned()
    }
}

/// Serialize a frame. Padding is not applied here; the cipher layer pads
/// the result to its block size before encryption.
pub fn build_frame(random: [u8; 16], message: &[u8], receiver_id: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(MIN_FRAMED_LEN + message.len() + receiver_id.len());
    buf.extend_from_slice(&random);
    buf.extend_from_slice(&(message.len() as u32).to_be_bytes());
    buf.extend_from_slice(message);
    buf.extend_from_slice(receiver_id);
    buf
}

/// Parse a decrypted buffer into a frame.
///
/// Structurally valid buffers split into nonce, length-prefixed message and
/// trailing receiver id. Anything else degrades to treating the post-nonce
/// remainder as the message, with no length or identifier validation.
pub fn parse_frame(buf: &[u8]) -> Frame {
    if buf.len() < MIN_FRAMED_LEN {
        // Too short to carry a length field; salvage what we can.
        let mut random = [0u8; 16];
        let message = if buf.len() >= 16 {
            random.copy_from_slice(&buf[..16]);
            buf[16..].to_vec()
        } else {
            buf.to_vec()
        };
        return Frame {
            random,
            message,
            receiver_id: Vec::new(),
        };
    }

    let mut random = [0u8; 16];
    random.copy_from_slice(&buf[..LEN_OFFSET]);

    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&buf[LEN_OFFSET..MIN_FRAMED_LEN]);
    let message_len = u32::from_be_bytes(len_bytes) as usize;

    if message_len == 0 || message_len > buf.len() - MIN_FRAMED_LEN {
        // Length field is lying; best-effort fallback on the remainder.
        return Frame {
            random,
            message: buf[LEN_OFFSET..].to_vec(),
            receiver_id: Vec::new(),
        };
    }

    Frame {
        random,
        message: buf[MIN_FRAMED_LEN..MIN_FRAMED_LEN + message_len].to_vec(),
        receiver_id: buf[MIN_FRAMED_LEN + message_len..].to_vec(),
    }
}
