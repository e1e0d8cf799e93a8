#![forbid(unsafe_code)]

//! Message kinds and the codecs shared by the bindings.

use std::io::{Read, Write};

use base64::Engine;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use samlsec_core::Error;

/// Parameter carrying a protocol request.
pub const SAML_REQUEST: &str = "SAMLRequest";
/// Parameter carrying a protocol response.
pub const SAML_RESPONSE: &str = "SAMLResponse";
pub const RELAY_STATE: &str = "RelayState";
pub const SIG_ALG: &str = "SigAlg";
pub const SIGNATURE: &str = "Signature";

/// Whether a binding carries a request or a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamlMessageType {
    Request,
    Response,
}

impl SamlMessageType {
    /// The form or query parameter carrying this kind of message.
    pub const fn param_name(&self) -> &'static str {
        match self {
            Self::Request => SAML_REQUEST,
            Self::Response => SAML_RESPONSE,
        }
    }
}

/// A message received over a binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMessage {
    pub xml: String,
    pub message_type: SamlMessageType,
    pub relay_state: Option<String>,
}

pub(crate) fn base64_encode(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

/// Decode a base64 parameter value.
///
/// Spaces are read as `+`, which form decoding produces from an unescaped
/// plus sign; line breaks are dropped.
pub(crate) fn base64_decode(parameter: &str, value: &str) -> Result<Vec<u8>, Error> {
    let clean: String = value
        .chars()
        .filter_map(|c| match c {
            ' ' => Some('+'),
            '\r' | '\n' | '\t' => None,
            c => Some(c),
        })
        .collect();
    base64::engine::general_purpose::STANDARD
        .decode(clean)
        .map_err(|e| Error::format(parameter, format!("invalid base64: {e}")))
}

pub(crate) fn utf8(parameter: &str, bytes: Vec<u8>) -> Result<String, Error> {
    String::from_utf8(bytes).map_err(|e| Error::format(parameter, format!("invalid UTF-8: {e}")))
}

/// Compress with raw DEFLATE (no zlib or gzip header).
pub(crate) fn deflate(data: &[u8]) -> Result<Vec<u8>, Error> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Inflate a raw DEFLATE stream.
pub(crate) fn inflate(parameter: &str, data: &[u8]) -> Result<Vec<u8>, Error> {
    let mut decoder = DeflateDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| Error::format(parameter, format!("corrupt DEFLATE stream: {e}")))?;
    Ok(out)
}
