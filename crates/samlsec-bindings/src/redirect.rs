#![forbid(unsafe_code)]

//! HTTP-Redirect binding.
//!
//! Messages travel DEFLATE-compressed and base64-encoded in the query
//! string. A signed query carries `SigAlg` and `Signature`, where the
//! signature covers the exact bytes
//! `SAMLRequest=..&RelayState=..&SigAlg=..` (or `SAMLResponse=..`) as
//! they appear on the wire.

use samlsec_core::Error;
use samlsec_crypto::{ShaHashingAlgorithm, SignatureProviderFactory};
use samlsec_keys::{Key, KeyCandidateSet};

use crate::message::{
    base64_decode, base64_encode, deflate, inflate, utf8, SamlMessageType, RELAY_STATE,
    SAML_REQUEST, SAML_RESPONSE, SIGNATURE, SIG_ALG,
};

/// Builds the query string for a redirect.
///
/// Holds either a request or a response, never both.
#[derive(Debug, Clone, Default)]
pub struct HttpRedirectBindingBuilder {
    request: Option<String>,
    response: Option<String>,
    relay_state: Option<String>,
    signing_key: Option<Key>,
    sha: ShaHashingAlgorithm,
}

impl HttpRedirectBindingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) -> Option<&str> {
        self.request.as_deref()
    }

    pub fn response(&self) -> Option<&str> {
        self.response.as_deref()
    }

    pub fn relay_state(&self) -> Option<&str> {
        self.relay_state.as_deref()
    }

    /// Set the request XML. Fails with [`Error::Argument`] if a response
    /// is already set.
    pub fn set_request(&mut self, xml: impl Into<String>) -> Result<(), Error> {
        if is_present(&self.response) {
            return Err(Error::Argument(
                "cannot set a request when a response is already set".into(),
            ));
        }
        self.request = Some(xml.into());
        Ok(())
    }

    /// Set the response XML. Fails with [`Error::Argument`] if a request
    /// is already set.
    pub fn set_response(&mut self, xml: impl Into<String>) -> Result<(), Error> {
        if is_present(&self.request) {
            return Err(Error::Argument(
                "cannot set a response when a request is already set".into(),
            ));
        }
        self.response = Some(xml.into());
        Ok(())
    }

    pub fn set_relay_state(&mut self, relay_state: impl Into<String>) {
        self.relay_state = Some(relay_state.into());
    }

    /// Sign the query with `key`, which must hold an RSA private key.
    pub fn set_signing_key(&mut self, key: Key) {
        self.signing_key = Some(key);
    }

    /// Digest strength used when signing (SHA256 unless set).
    pub fn set_sha_hashing_algorithm(&mut self, sha: ShaHashingAlgorithm) {
        self.sha = sha;
    }

    /// The query string, without a leading `?`.
    ///
    /// Empty when neither a request nor a response is set.
    pub fn to_query(&self) -> Result<String, Error> {
        let (message_type, xml) = match (&self.request, &self.response) {
            (Some(request), _) if !request.is_empty() => (SamlMessageType::Request, request),
            (_, Some(response)) if !response.is_empty() => (SamlMessageType::Response, response),
            _ => return Ok(String::new()),
        };

        let encoded = base64_encode(&deflate(xml.as_bytes())?);
        let mut query = format!(
            "{}={}",
            message_type.param_name(),
            urlencoding::encode(&encoded)
        );

        if let Some(relay_state) = self.relay_state.as_deref().filter(|r| !r.is_empty()) {
            let value = match message_type {
                SamlMessageType::Request => base64_encode(relay_state.as_bytes()),
                SamlMessageType::Response => relay_state.to_owned(),
            };
            query.push_str(&format!("&{RELAY_STATE}={}", urlencoding::encode(&value)));
        }

        if let Some(key) = &self.signing_key {
            let signing_key = key.to_signing_key().ok_or_else(|| {
                Error::Configuration("redirect signing key has no private key".into())
            })?;
            let provider = SignatureProviderFactory::for_signing_key(&signing_key, self.sha)?;
            query.push_str(&format!("&{SIG_ALG}={}", urlencoding::encode(provider.uri())));
            let signature = provider.sign_data(&signing_key, query.as_bytes())?;
            query.push_str(&format!(
                "&{SIGNATURE}={}",
                urlencoding::encode(&base64_encode(&signature))
            ));
            tracing::debug!(alg = provider.uri(), "signed redirect query");
        }

        Ok(query)
    }

    /// `destination` with the query appended.
    pub fn to_url(&self, destination: &str) -> Result<String, Error> {
        let query = self.to_query()?;
        if query.is_empty() {
            return Ok(destination.to_owned());
        }
        let separator = if destination.contains('?') { '&' } else { '?' };
        Ok(format!("{destination}{separator}{query}"))
    }
}

fn is_present(value: &Option<String>) -> bool {
    value.as_deref().map_or(false, |v| !v.is_empty())
}

/// One query parameter as received.
#[derive(Debug, Clone)]
struct Param {
    /// `name=value` exactly as it appeared in the query.
    raw: String,
    value: String,
}

/// Reads a redirect-binding URL or query string.
#[derive(Debug, Clone)]
pub struct HttpRedirectBindingParser {
    raw_query: String,
    message_type: SamlMessageType,
    message_param: Param,
    message: String,
    relay_state: Option<Param>,
    sig_alg: Option<Param>,
    signature: Option<Param>,
}

impl HttpRedirectBindingParser {
    /// Parse a full URL or a bare query string (with or without `?`).
    ///
    /// The message is decoded immediately; malformed input fails with
    /// [`Error::Format`] naming the parameter.
    pub fn parse(input: &str) -> Result<Self, Error> {
        let raw_query = if has_url_scheme(input) {
            let url = url::Url::parse(input)
                .map_err(|e| Error::format("url", format!("invalid URL: {e}")))?;
            url.query().unwrap_or("").to_owned()
        } else {
            input.strip_prefix('?').unwrap_or(input).to_owned()
        };

        let mut request = None;
        let mut response = None;
        let mut relay_state = None;
        let mut sig_alg = None;
        let mut signature = None;

        for segment in raw_query.split('&').filter(|s| !s.is_empty()) {
            let (name, value) = segment.split_once('=').unwrap_or((segment, ""));
            let slot = match form_decode("query", name)?.as_str() {
                SAML_REQUEST => &mut request,
                SAML_RESPONSE => &mut response,
                RELAY_STATE => &mut relay_state,
                SIG_ALG => &mut sig_alg,
                SIGNATURE => &mut signature,
                _ => continue,
            };
            if slot.is_some() {
                return Err(Error::format(
                    form_decode("query", name)?,
                    "parameter appears more than once",
                ));
            }
            *slot = Some(Param {
                raw: segment.to_owned(),
                value: form_decode(name, value)?,
            });
        }

        let (message_type, message_param) = match (request, response) {
            (Some(p), None) => (SamlMessageType::Request, p),
            (None, Some(p)) => (SamlMessageType::Response, p),
            (Some(_), Some(_)) => {
                return Err(Error::format(
                    SAML_REQUEST,
                    "both SAMLRequest and SAMLResponse are present",
                ))
            }
            (None, None) => {
                return Err(Error::format(
                    SAML_REQUEST,
                    "missing SAMLRequest or SAMLResponse",
                ))
            }
        };

        let name = message_type.param_name();
        let compressed = base64_decode(name, &message_param.value)?;
        let message = utf8(name, inflate(name, &compressed)?)?;
        tracing::debug!(param = name, signed = sig_alg.is_some(), "parsed redirect binding");

        Ok(Self {
            raw_query,
            message_type,
            message_param,
            message,
            relay_state,
            sig_alg,
            signature,
        })
    }

    pub fn message_type(&self) -> SamlMessageType {
        self.message_type
    }

    pub fn is_request(&self) -> bool {
        self.message_type == SamlMessageType::Request
    }

    pub fn is_response(&self) -> bool {
        self.message_type == SamlMessageType::Response
    }

    /// True when both `SigAlg` and `Signature` are present.
    pub fn is_signed(&self) -> bool {
        self.sig_alg.is_some() && self.signature.is_some()
    }

    /// The decoded message XML.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// `RelayState` as it appeared on the wire, percent-decoded.
    pub fn relay_state(&self) -> Option<&str> {
        self.relay_state.as_ref().map(|p| p.value.as_str())
    }

    /// `RelayState` with the binding's encoding removed: base64-decoded
    /// for requests, unchanged for responses.
    pub fn relay_state_decoded(&self) -> Result<Option<String>, Error> {
        let Some(relay_state) = self.relay_state() else {
            return Ok(None);
        };
        match self.message_type {
            SamlMessageType::Request => {
                let bytes = base64_decode(RELAY_STATE, relay_state)?;
                utf8(RELAY_STATE, bytes).map(Some)
            }
            SamlMessageType::Response => Ok(Some(relay_state.to_owned())),
        }
    }

    pub fn sig_alg(&self) -> Option<&str> {
        self.sig_alg.as_ref().map(|p| p.value.as_str())
    }

    /// The base64 `Signature` value.
    pub fn signature(&self) -> Option<&str> {
        self.signature.as_ref().map(|p| p.value.as_str())
    }

    /// The query string as received.
    pub fn raw_query(&self) -> &str {
        &self.raw_query
    }

    /// Check the query signature against `key`.
    ///
    /// Fails with [`Error::InvalidOperation`] on an unsigned message. A
    /// signature made with another key is `Ok(false)`.
    pub fn check_signature(&self, key: &Key) -> Result<bool, Error> {
        self.check_signature_with_keys(&KeyCandidateSet::single(key.clone()))
    }

    /// Check the query signature against each candidate in order.
    pub fn check_signature_with_keys(&self, keys: &KeyCandidateSet) -> Result<bool, Error> {
        let (Some(sig_alg), Some(signature)) = (self.sig_alg(), self.signature()) else {
            return Err(Error::InvalidOperation(
                "redirect binding message is not signed".into(),
            ));
        };
        let provider = SignatureProviderFactory::create_from_signature_uri(sig_alg)?;
        let signature = base64_decode(SIGNATURE, signature)?;
        let signed = self.signed_query();

        for key in keys.iter() {
            if provider.verify_signature(&key.to_verifying_key(), signed.as_bytes(), &signature) {
                return Ok(true);
            }
        }
        tracing::warn!(alg = sig_alg, "redirect signature did not verify");
        Ok(false)
    }

    /// The signed octets, rebuilt from the raw segments in signing order.
    fn signed_query(&self) -> String {
        let mut signed = self.message_param.raw.clone();
        for param in [&self.relay_state, &self.sig_alg].into_iter().flatten() {
            signed.push('&');
            signed.push_str(&param.raw);
        }
        signed
    }
}

/// Form-style decoding: `+` is a space, then percent-decoding.
/// True if `input` opens with `scheme://`. A bare query may carry `://`
/// inside a cleartext value, but never before its first `=`.
fn has_url_scheme(input: &str) -> bool {
    input.split_once("://").map_or(false, |(scheme, _)| {
        scheme.starts_with(|c: char| c.is_ascii_alphabetic())
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    })
}

fn form_decode(parameter: &str, value: &str) -> Result<String, Error> {
    let spaced = value.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|v| v.into_owned())
        .map_err(|e| Error::format(parameter, format!("invalid percent-encoding: {e}")))
}
