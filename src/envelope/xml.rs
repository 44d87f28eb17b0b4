//! Workchat transport envelope: XML documents with the ciphertext in an
//! `<Encrypt>` CDATA section. Signature parameters travel in the query
//! string, not the body, so this module only ever sees the document.

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::crypto::CodecError;

/// Pull the base64 ciphertext out of an inbound callback document.
pub fn extract_encrypted(body: &str) -> Result<String, CodecError> {
    read_element_text(body, "Encrypt")?
        .ok_or_else(|| CodecError::MalformedEnvelope("missing <Encrypt> element".into()))
}

/// Read the text or CDATA content of the first `name` element, `None` if
/// the document has no such element.
pub fn read_element_text(body: &str, name: &str) -> Result<Option<String>, CodecError> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut inside = false;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => inside = e.name().as_ref() == name.as_bytes(),
            Ok(Event::End(_)) => inside = false,
            Ok(Event::CData(t)) if inside => {
                return Ok(Some(String::from_utf8_lossy(&t.into_inner()).into_owned()));
            }
            Ok(Event::Text(t)) if inside => {
                let text = t
                    .unescape()
                    .map_err(|e| CodecError::MalformedEnvelope(format!("bad XML text: {e}")))?;
                if !text.trim().is_empty() {
                    return Ok(Some(text.trim().to_string()));
                }
            }
            Ok(Event::Eof) => return Ok(None),
            Err(e) => {
                return Err(CodecError::MalformedEnvelope(format!("XML parse error: {e}")));
            }
            _ => {}
        }
    }
}

/// Render the reply envelope. Every value is CDATA-wrapped except the
/// timestamp, which the platform expects as a bare integer; the contents
/// are base64/hex/uuid so no CDATA terminator can appear in them.
pub fn render_reply(ciphertext: &str, signature: &str, timestamp: &str, nonce: &str) -> String {
    format!(
        "<xml><Encrypt><![CDATA[{ciphertext}]]></Encrypt>\
         <MsgSignature><![CDATA[{signature}]]></MsgSignature>\
         <TimeStamp>{timestamp}</TimeStamp>\
         <Nonce><![CDATA[{nonce}]]></Nonce></xml>"
    )
}
