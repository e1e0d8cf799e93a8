#![forbid(unsafe_code)]

//! `<ds:KeyInfo>` processing: reads key material out of a signature and
//! writes it into new ones.

use base64::Engine;
use rsa::traits::PublicKeyParts;
use samlsec_core::{ns, Error};
use samlsec_xml::document::{child_element, is_element};
use samlsec_xml::XmlWriter;

use crate::key::{Key, KeyData};

/// One child of a `<KeyInfo>` element.
#[derive(Clone)]
pub enum KeyInfoClause {
    KeyName(String),
    RsaKeyValue(rsa::RsaPublicKey),
    DsaKeyValue(dsa::VerifyingKey),
    /// DER certificates in document order.
    X509Data(Vec<Vec<u8>>),
}

impl std::fmt::Debug for KeyInfoClause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KeyName(name) => write!(f, "KeyName({name})"),
            Self::RsaKeyValue(_) => write!(f, "RSAKeyValue"),
            Self::DsaKeyValue(_) => write!(f, "DSAKeyValue"),
            Self::X509Data(certs) => write!(f, "X509Data({} certificates)", certs.len()),
        }
    }
}

/// Ordered key material carried by a signature.
#[derive(Debug, Clone, Default)]
pub struct KeyInfo {
    clauses: Vec<KeyInfoClause>,
}

impl KeyInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, clause: KeyInfoClause) {
        self.clauses.push(clause);
    }

    pub fn clauses(&self) -> &[KeyInfoClause] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// KeyInfo carrying a full certificate chain (DER, leaf first).
    pub fn from_certificate_chain(chain: Vec<Vec<u8>>) -> Self {
        Self {
            clauses: vec![KeyInfoClause::X509Data(chain)],
        }
    }

    /// KeyInfo describing `key`: its certificate chain when it has one,
    /// otherwise its raw public key. With `include_chain` unset only the
    /// leaf certificate is written.
    pub fn for_key(key: &Key, include_chain: bool) -> Self {
        let mut info = Self::new();
        if let Some(name) = &key.name {
            info.push(KeyInfoClause::KeyName(name.clone()));
        }
        if !key.x509_chain.is_empty() {
            let chain = if include_chain {
                key.x509_chain.clone()
            } else {
                key.x509_chain[..1].to_vec()
            };
            info.push(KeyInfoClause::X509Data(chain));
        } else {
            match &key.data {
                KeyData::Rsa { public, .. } => info.push(KeyInfoClause::RsaKeyValue(public.clone())),
                KeyData::Dsa { public } => info.push(KeyInfoClause::DsaKeyValue(public.clone())),
            }
        }
        info
    }

    /// Read a `<KeyInfo>` element. Clauses that cannot be decoded are
    /// skipped with a warning; unknown children are ignored.
    pub fn parse(key_info: roxmltree::Node<'_, '_>) -> Result<Self, Error> {
        if !is_element(key_info, ns::DSIG, ns::node::KEY_INFO) {
            return Err(Error::XmlStructure(format!(
                "expected KeyInfo, found {}",
                key_info.tag_name().name()
            )));
        }
        let mut info = Self::new();
        for child in key_info.children().filter(|c| c.is_element()) {
            if child.tag_name().namespace() != Some(ns::DSIG) {
                continue;
            }
            let clause = match child.tag_name().name() {
                ns::node::KEY_NAME => Ok(Some(KeyInfoClause::KeyName(
                    child.text().unwrap_or("").trim().to_owned(),
                ))),
                ns::node::KEY_VALUE => parse_key_value(child),
                ns::node::X509_DATA => parse_x509_data(child).map(Some),
                _ => Ok(None),
            };
            match clause {
                Ok(Some(clause)) => info.push(clause),
                Ok(None) => {}
                Err(e) => tracing::warn!(clause = child.tag_name().name(), error = %e, "skipping KeyInfo clause"),
            }
        }
        Ok(info)
    }

    /// The first key or certificate that can be extracted, in clause order.
    pub fn first_key(&self) -> Result<Key, Error> {
        self.keys()
            .into_iter()
            .next()
            .ok_or_else(|| Error::KeyNotFound("KeyInfo carries no usable key".into()))
    }

    /// Every extractable key, in clause order.
    pub fn keys(&self) -> Vec<Key> {
        let mut keys = Vec::new();
        for clause in &self.clauses {
            match clause {
                KeyInfoClause::KeyName(_) => {}
                KeyInfoClause::RsaKeyValue(public) => keys.push(Key::rsa_public(public.clone())),
                KeyInfoClause::DsaKeyValue(public) => {
                    keys.push(Key::new(KeyData::Dsa {
                        public: public.clone(),
                    }))
                }
                KeyInfoClause::X509Data(certs) => match key_from_chain(certs) {
                    Ok(key) => keys.push(key),
                    Err(e) => tracing::warn!(error = %e, "unusable X509Data"),
                },
            }
        }
        keys
    }

    /// Write `<ds:KeyInfo>` with the given namespace prefix.
    ///
    /// With `declare_ns` the element carries its own `xmlns:` declaration;
    /// otherwise the prefix must already be bound by the enclosing element.
    pub fn write(&self, w: &mut XmlWriter, prefix: &str, declare_ns: bool) -> Result<(), Error> {
        let q = |local: &str| qualified(prefix, local);
        let xmlns = xmlns_attr(prefix);
        let root_attrs: Vec<(&str, &str)> = if declare_ns {
            vec![(xmlns.as_str(), ns::DSIG)]
        } else {
            Vec::new()
        };
        w.start_element(&q(ns::node::KEY_INFO), &root_attrs)?;
        for clause in &self.clauses {
            match clause {
                KeyInfoClause::KeyName(name) => w.text_element(&q(ns::node::KEY_NAME), &[], name)?,
                KeyInfoClause::RsaKeyValue(public) => {
                    w.start_element(&q(ns::node::KEY_VALUE), &[])?;
                    w.start_element(&q(ns::node::RSA_KEY_VALUE), &[])?;
                    w.text_element(&q(ns::node::RSA_MODULUS), &[], &b64(&public.n().to_bytes_be()))?;
                    w.text_element(&q(ns::node::RSA_EXPONENT), &[], &b64(&public.e().to_bytes_be()))?;
                    w.end_element(&q(ns::node::RSA_KEY_VALUE))?;
                    w.end_element(&q(ns::node::KEY_VALUE))?;
                }
                KeyInfoClause::DsaKeyValue(public) => {
                    let c = public.components();
                    w.start_element(&q(ns::node::KEY_VALUE), &[])?;
                    w.start_element(&q(ns::node::DSA_KEY_VALUE), &[])?;
                    w.text_element(&q(ns::node::DSA_P), &[], &b64(&c.p().to_bytes_be()))?;
                    w.text_element(&q(ns::node::DSA_Q), &[], &b64(&c.q().to_bytes_be()))?;
                    w.text_element(&q(ns::node::DSA_G), &[], &b64(&c.g().to_bytes_be()))?;
                    w.text_element(&q(ns::node::DSA_Y), &[], &b64(&public.y().to_bytes_be()))?;
                    w.end_element(&q(ns::node::DSA_KEY_VALUE))?;
                    w.end_element(&q(ns::node::KEY_VALUE))?;
                }
                KeyInfoClause::X509Data(certs) => {
                    w.start_element(&q(ns::node::X509_DATA), &[])?;
                    for cert in certs {
                        w.text_element(&q(ns::node::X509_CERTIFICATE), &[], &b64(cert))?;
                    }
                    w.end_element(&q(ns::node::X509_DATA))?;
                }
            }
        }
        w.end_element(&q(ns::node::KEY_INFO))
    }

    /// Serialize as a standalone `<ds:KeyInfo>` element.
    pub fn to_xml(&self) -> Result<String, Error> {
        let mut w = XmlWriter::new();
        self.write(&mut w, ns::DSIG_PREFIX, true)?;
        w.into_string()
    }
}

fn qualified(prefix: &str, local: &str) -> String {
    if prefix.is_empty() {
        local.to_owned()
    } else {
        format!("{prefix}:{local}")
    }
}

fn xmlns_attr(prefix: &str) -> String {
    if prefix.is_empty() {
        "xmlns".to_owned()
    } else {
        format!("xmlns:{prefix}")
    }
}

fn b64(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

/// Decode base64 element text, ignoring embedded whitespace.
fn decode_text(node: roxmltree::Node<'_, '_>, what: &str) -> Result<Vec<u8>, Error> {
    let clean: String = node
        .text()
        .unwrap_or("")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if clean.is_empty() {
        return Err(Error::Base64(format!("{what}: empty value")));
    }
    base64::engine::general_purpose::STANDARD
        .decode(&clean)
        .map_err(|e| Error::Base64(format!("{what}: {e}")))
}

fn decode_child(parent: roxmltree::Node<'_, '_>, local: &str) -> Result<Vec<u8>, Error> {
    let node = child_element(parent, ns::DSIG, local)
        .ok_or_else(|| Error::MissingElement(local.into()))?;
    decode_text(node, local)
}

fn parse_key_value(key_value: roxmltree::Node<'_, '_>) -> Result<Option<KeyInfoClause>, Error> {
    if let Some(rsa_kv) = child_element(key_value, ns::DSIG, ns::node::RSA_KEY_VALUE) {
        let n = rsa::BigUint::from_bytes_be(&decode_child(rsa_kv, ns::node::RSA_MODULUS)?);
        let e = rsa::BigUint::from_bytes_be(&decode_child(rsa_kv, ns::node::RSA_EXPONENT)?);
        let public = rsa::RsaPublicKey::new(n, e)
            .map_err(|err| Error::Key(format!("invalid RSA public key: {err}")))?;
        return Ok(Some(KeyInfoClause::RsaKeyValue(public)));
    }
    if let Some(dsa_kv) = child_element(key_value, ns::DSIG, ns::node::DSA_KEY_VALUE) {
        let p = dsa::BigUint::from_bytes_be(&decode_child(dsa_kv, ns::node::DSA_P)?);
        let q = dsa::BigUint::from_bytes_be(&decode_child(dsa_kv, ns::node::DSA_Q)?);
        let g = dsa::BigUint::from_bytes_be(&decode_child(dsa_kv, ns::node::DSA_G)?);
        let y = dsa::BigUint::from_bytes_be(&decode_child(dsa_kv, ns::node::DSA_Y)?);
        let components = dsa::Components::from_components(p, q, g)
            .map_err(|e| Error::Key(format!("invalid DSA components: {e}")))?;
        let vk = dsa::VerifyingKey::from_components(components, y)
            .map_err(|e| Error::Key(format!("invalid DSA public key: {e}")))?;
        return Ok(Some(KeyInfoClause::DsaKeyValue(vk)));
    }
    Ok(None)
}

fn parse_x509_data(x509_data: roxmltree::Node<'_, '_>) -> Result<KeyInfoClause, Error> {
    let certs = x509_data
        .children()
        .filter(|c| is_element(*c, ns::DSIG, ns::node::X509_CERTIFICATE))
        .map(|c| decode_text(c, ns::node::X509_CERTIFICATE))
        .collect::<Result<Vec<_>, _>>()?;
    if certs.is_empty() {
        return Err(Error::MissingElement(ns::node::X509_CERTIFICATE.into()));
    }
    Ok(KeyInfoClause::X509Data(certs))
}

/// Key of the end-entity certificate: the one that issued none of the
/// others. Falls back to the first certificate.
fn key_from_chain(certs: &[Vec<u8>]) -> Result<Key, Error> {
    use der::Decode;

    let parsed: Vec<x509_cert::Certificate> = certs
        .iter()
        .filter_map(|der| x509_cert::Certificate::from_der(der).ok())
        .collect();
    let leaf = if parsed.len() == certs.len() && certs.len() > 1 {
        (0..parsed.len())
            .find(|&i| {
                !parsed.iter().enumerate().any(|(j, other)| {
                    i != j && other.tbs_certificate.issuer == parsed[i].tbs_certificate.subject
                })
            })
            .unwrap_or(0)
    } else {
        0
    };
    let mut key = crate::loader::load_x509_cert_der(&certs[leaf])?;
    let mut chain = certs.to_vec();
    chain.swap(0, leaf);
    key.x509_chain = chain;
    Ok(key)
}
