//! Transport envelope adapters: the XML shape used by workchat callbacks
//! and the JSON shape used by docspace events. Both extract the raw
//! ciphertext field for signature verification and re-wrap sealed reply
//! payloads; neither touches the codec itself.

pub mod json;
pub mod xml;
