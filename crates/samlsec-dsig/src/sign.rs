#![forbid(unsafe_code)]

//! XML-DSig signature creation.
//!
//! Inserts a `<ds:Signature>` template with empty DigestValue and
//! SignatureValue next to the signed element, then fills both in place.

use std::ops::Range;

use base64::Engine;
use samlsec_c14n::C14nMode;
use samlsec_core::{algorithm, ns, Error};
use samlsec_crypto::{digest, SignatureProvider, SignatureProviderFactory, SigningKey};
use samlsec_keys::{Key, KeyInfo};
use samlsec_transforms::{pipeline::transform_from_uri, uri::resolve_uri, TransformPipeline};
use samlsec_xml::document::{child_element, child_elements};
use samlsec_xml::{xpath, NodeSet, XmlDocument, XmlWriter};

use crate::context::DsigContext;

/// Where the new `<Signature>` goes inside the signed element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Immediately after the single `<saml:Issuer>` child.
    AfterIssuer,
    /// As the first child.
    FirstChild,
}

/// Sign the element carrying `element_id`, placing the signature after
/// its `<Issuer>`.
///
/// The algorithm follows `ctx.sha`. KeyInfo carries the key's certificate
/// chain when it has one, otherwise its RSA public key.
pub fn sign_document(
    ctx: &DsigContext,
    doc: &mut XmlDocument,
    element_id: &str,
    key: &Key,
) -> Result<(), Error> {
    let signing_key = private_key(key)?;
    let provider = SignatureProviderFactory::for_signing_key(&signing_key, ctx.sha)?;
    let key_info = KeyInfo::for_key(key, ctx.include_chain);
    sign_element(
        provider.as_ref(),
        ctx,
        doc,
        element_id,
        &signing_key,
        &key_info,
        Placement::AfterIssuer,
    )
}

/// SAML-specific signing on top of a [`SignatureProvider`].
///
/// Both operations require a key with a certificate chain; the whole
/// chain is written into KeyInfo.
pub trait XmlSignatureProvider {
    /// Sign an assertion (or protocol message) after its `<Issuer>`.
    fn sign_assertion(&self, doc: &mut XmlDocument, element_id: &str, key: &Key)
        -> Result<(), Error>;

    /// Sign an `<EntityDescriptor>`, placing the signature first.
    fn sign_metadata(&self, doc: &mut XmlDocument, element_id: &str, key: &Key)
        -> Result<(), Error>;
}

impl<P: SignatureProvider + ?Sized> XmlSignatureProvider for P {
    fn sign_assertion(
        &self,
        doc: &mut XmlDocument,
        element_id: &str,
        key: &Key,
    ) -> Result<(), Error> {
        sign_with_certificate(self, doc, element_id, key, Placement::AfterIssuer)
    }

    fn sign_metadata(
        &self,
        doc: &mut XmlDocument,
        element_id: &str,
        key: &Key,
    ) -> Result<(), Error> {
        sign_with_certificate(self, doc, element_id, key, Placement::FirstChild)
    }
}

fn sign_with_certificate<P: SignatureProvider + ?Sized>(
    provider: &P,
    doc: &mut XmlDocument,
    element_id: &str,
    key: &Key,
    placement: Placement,
) -> Result<(), Error> {
    if key.x509_chain.is_empty() {
        return Err(Error::Configuration(
            "signing key has no certificate for KeyInfo".into(),
        ));
    }
    let signing_key = private_key(key)?;
    let key_info = KeyInfo::from_certificate_chain(key.x509_chain.clone());
    sign_element(
        provider,
        &DsigContext::default(),
        doc,
        element_id,
        &signing_key,
        &key_info,
        placement,
    )
}

/// Sign the element carrying `element_id` with `provider`.
///
/// Any `<Signature>` already directly inside the element is removed first.
pub fn sign_element<P: SignatureProvider + ?Sized>(
    provider: &P,
    ctx: &DsigContext,
    doc: &mut XmlDocument,
    element_id: &str,
    signing_key: &SigningKey,
    key_info: &KeyInfo,
    placement: Placement,
) -> Result<(), Error> {
    doc.require_preserved_whitespace()?;
    let owned_attrs: Vec<String> = ctx.id_attrs(doc).into_iter().map(str::to_owned).collect();
    let id_attrs: Vec<&str> = owned_attrs.iter().map(String::as_str).collect();

    // Drop previous signatures.
    let stale: Vec<Range<usize>> = {
        let parsed = doc.parse_doc()?;
        let target = xpath::resolve_id(&parsed, &id_attrs, element_id)?;
        child_elements(target, ns::DSIG, ns::node::SIGNATURE)
            .map(|n| n.range())
            .collect()
    };
    if !stale.is_empty() {
        tracing::debug!(element_id, count = stale.len(), "removing existing signatures");
    }
    for range in stale.into_iter().rev() {
        doc.splice(range, "")?;
    }

    let template = signature_template(provider.uri(), provider.digest_uri(), element_id, key_info)?;
    let (range, insertion) = {
        let parsed = doc.parse_doc()?;
        let target = xpath::resolve_id(&parsed, &id_attrs, element_id)?;
        insertion_point(doc.text(), target, placement, template)?
    };
    doc.splice(range, &insertion)?;

    // Reference digest.
    let (range, digest_value) = {
        let parsed = doc.parse_doc()?;
        let target = xpath::resolve_id(&parsed, &id_attrs, element_id)?;
        let sig_node = child_element(target, ns::DSIG, ns::node::SIGNATURE)
            .ok_or_else(|| Error::MissingElement("Signature".into()))?;

        let mut pipeline = TransformPipeline::new();
        pipeline.push(transform_from_uri(algorithm::ENVELOPED_SIGNATURE, sig_node.id(), vec![])?);
        pipeline.push(transform_from_uri(algorithm::EXC_C14N, sig_node.id(), vec![])?);
        let input = resolve_uri(&format!("#{element_id}"), &parsed, &id_attrs, doc.text())?;
        let computed = digest::digest(provider.digest_uri(), &pipeline.execute(input)?)?;

        let digest_node = sig_node
            .descendants()
            .find(|n| samlsec_xml::document::is_element(*n, ns::DSIG, ns::node::DIGEST_VALUE))
            .ok_or_else(|| Error::MissingElement("DigestValue".into()))?;
        (digest_node.range(), b64(&computed))
    };
    doc.splice(range, &dsig_text_element(ns::node::DIGEST_VALUE, &digest_value)?)?;

    // SignatureValue over the canonical SignedInfo.
    let (range, signature_value) = {
        let parsed = doc.parse_doc()?;
        let target = xpath::resolve_id(&parsed, &id_attrs, element_id)?;
        let sig_node = child_element(target, ns::DSIG, ns::node::SIGNATURE)
            .ok_or_else(|| Error::MissingElement("Signature".into()))?;
        let signed_info = child_element(sig_node, ns::DSIG, ns::node::SIGNED_INFO)
            .ok_or_else(|| Error::MissingElement("SignedInfo".into()))?;
        let c14n_signed_info = samlsec_c14n::canonicalize_doc(
            &parsed,
            C14nMode::Exclusive,
            Some(&NodeSet::tree_without_comments(signed_info)),
            &[],
        )?;
        let raw = provider.sign_data(signing_key, &c14n_signed_info)?;
        let value_node = child_element(sig_node, ns::DSIG, ns::node::SIGNATURE_VALUE)
            .ok_or_else(|| Error::MissingElement("SignatureValue".into()))?;
        (value_node.range(), b64(&raw))
    };
    doc.splice(range, &dsig_text_element(ns::node::SIGNATURE_VALUE, &signature_value)?)?;

    tracing::debug!(element_id, alg = provider.uri(), "element signed");
    Ok(())
}

fn private_key(key: &Key) -> Result<SigningKey, Error> {
    key.to_signing_key()
        .ok_or_else(|| Error::Configuration("signing key has no private key".into()))
}

/// The text edit that places `template` inside `target`.
fn insertion_point(
    text: &str,
    target: roxmltree::Node<'_, '_>,
    placement: Placement,
    template: String,
) -> Result<(Range<usize>, String), Error> {
    match placement {
        Placement::AfterIssuer => {
            let issuers: Vec<_> = child_elements(target, ns::SAML_ASSERTION, ns::node::ISSUER).collect();
            match issuers.as_slice() {
                [issuer] => {
                    let end = issuer.range().end;
                    Ok((end..end, template))
                }
                other => Err(Error::XmlStructure(format!(
                    "expected exactly one Issuer in {}, found {}",
                    target.tag_name().name(),
                    other.len()
                ))),
            }
        }
        Placement::FirstChild => {
            if let Some(first) = target.first_child() {
                let at = first.range().start;
                return Ok((at..at, template));
            }
            let range = target.range();
            let source = &text[range.clone()];
            if source.ends_with("/>") {
                // Expand `<x .../>` into `<x ...>template</x>`.
                let qname = source[1..]
                    .split(|c: char| c.is_whitespace() || c == '/' || c == '>')
                    .next()
                    .unwrap_or_default();
                Ok((range.end - 2..range.end, format!(">{template}</{qname}>")))
            } else {
                let close = source.rfind("</").ok_or_else(|| {
                    Error::XmlStructure("element has no end tag".into())
                })?;
                let at = range.start + close;
                Ok((at..at, template))
            }
        }
    }
}

fn signature_template(
    signature_uri: &str,
    digest_uri: &str,
    element_id: &str,
    key_info: &KeyInfo,
) -> Result<String, Error> {
    let q = |local: &str| format!("{}:{local}", ns::DSIG_PREFIX);
    let xmlns = format!("xmlns:{}", ns::DSIG_PREFIX);
    let reference_uri = format!("#{element_id}");

    let mut w = XmlWriter::new();
    w.start_element(&q(ns::node::SIGNATURE), &[(xmlns.as_str(), ns::DSIG)])?;
    w.start_element(&q(ns::node::SIGNED_INFO), &[])?;
    w.empty_element(
        &q(ns::node::CANONICALIZATION_METHOD),
        &[(ns::attr::ALGORITHM, algorithm::EXC_C14N)],
    )?;
    w.empty_element(
        &q(ns::node::SIGNATURE_METHOD),
        &[(ns::attr::ALGORITHM, signature_uri)],
    )?;
    w.start_element(&q(ns::node::REFERENCE), &[(ns::attr::URI, reference_uri.as_str())])?;
    w.start_element(&q(ns::node::TRANSFORMS), &[])?;
    w.empty_element(
        &q(ns::node::TRANSFORM),
        &[(ns::attr::ALGORITHM, algorithm::ENVELOPED_SIGNATURE)],
    )?;
    w.empty_element(
        &q(ns::node::TRANSFORM),
        &[(ns::attr::ALGORITHM, algorithm::EXC_C14N)],
    )?;
    w.end_element(&q(ns::node::TRANSFORMS))?;
    w.empty_element(&q(ns::node::DIGEST_METHOD), &[(ns::attr::ALGORITHM, digest_uri)])?;
    w.text_element(&q(ns::node::DIGEST_VALUE), &[], "")?;
    w.end_element(&q(ns::node::REFERENCE))?;
    w.end_element(&q(ns::node::SIGNED_INFO))?;
    w.text_element(&q(ns::node::SIGNATURE_VALUE), &[], "")?;
    if !key_info.is_empty() {
        key_info.write(&mut w, ns::DSIG_PREFIX, false)?;
    }
    w.end_element(&q(ns::node::SIGNATURE))?;
    w.into_string()
}

fn dsig_text_element(local: &str, text: &str) -> Result<String, Error> {
    let mut w = XmlWriter::new();
    w.text_element(&format!("{}:{local}", ns::DSIG_PREFIX), &[], text)?;
    w.into_string()
}

fn b64(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::context::Scope;
    use crate::verify::{check_signature_with_key, is_signed};
    use samlsec_crypto::ShaHashingAlgorithm;
    use samlsec_keys::loader;

    const SIGNING_KEY: &str = include_str!("../../../test-data/signing-key.pem");
    const SIGNING_CERT: &str = include_str!("../../../test-data/signing-cert.pem");
    const OTHER_PUB: &str = include_str!("../../../test-data/other-pub.pem");

    pub(crate) const ASSERTION: &str = r#"<saml:Assertion xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_a1" Version="2.0" IssueInstant="2024-01-01T00:00:00Z">
  <saml:Issuer>https://idp.samlsec.test</saml:Issuer>
  <saml:Subject>
    <saml:NameID>alice</saml:NameID>
  </saml:Subject>
</saml:Assertion>"#;

    pub(crate) const METADATA: &str = r#"<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" ID="_m1" entityID="https://idp.samlsec.test"/>"#;

    /// Private key with its certificate attached.
    pub(crate) fn signing_key() -> Key {
        loader::load_rsa_private_pem(SIGNING_KEY.as_bytes())
            .unwrap()
            .with_certificate_chain(loader::load_x509_chain_pem(SIGNING_CERT.as_bytes()).unwrap())
    }

    pub(crate) fn certificate() -> Key {
        loader::load_x509_cert_pem(SIGNING_CERT.as_bytes()).unwrap()
    }

    pub(crate) fn other_key() -> Key {
        loader::load_rsa_public_pem(OTHER_PUB.as_bytes()).unwrap()
    }

    pub(crate) fn signed_assertion() -> XmlDocument {
        let mut doc = XmlDocument::parse(ASSERTION.to_owned()).unwrap();
        sign_document(&DsigContext::default(), &mut doc, "_a1", &signing_key()).unwrap();
        doc
    }

    #[test]
    fn signature_follows_issuer() {
        let doc = signed_assertion();
        let text = doc.text();
        let issuer_end = text.find("</saml:Issuer>").unwrap() + "</saml:Issuer>".len();
        assert!(text[issuer_end..].starts_with("<ds:Signature xmlns:ds=\"http://www.w3.org/2000/09/xmldsig#\">"));
        assert!(text.contains(r##"<ds:Reference URI="#_a1">"##));
        assert!(text.contains(algorithm::RSA_SHA256));
        assert!(text.contains("<ds:X509Certificate>"));
        assert!(!text.contains("<ds:DigestValue></ds:DigestValue>"));
        assert!(!text.contains("<ds:SignatureValue></ds:SignatureValue>"));
    }

    #[test]
    fn signed_assertion_verifies() {
        let ctx = DsigContext::default();
        let doc = signed_assertion();
        assert!(is_signed(&ctx, &doc, Scope::Document).unwrap());
        assert!(check_signature_with_key(&ctx, &doc, Scope::Document, &certificate()).unwrap());
        assert!(check_signature_with_key(&ctx, &doc, Scope::Element("_a1"), &certificate()).unwrap());
        assert!(!check_signature_with_key(&ctx, &doc, Scope::Document, &other_key()).unwrap());
    }

    #[test]
    fn every_strength_round_trips() {
        for sha in [ShaHashingAlgorithm::Sha1, ShaHashingAlgorithm::Sha256, ShaHashingAlgorithm::Sha512] {
            let ctx = DsigContext::default().with_sha(sha);
            let mut doc = XmlDocument::parse(ASSERTION.to_owned()).unwrap();
            sign_document(&ctx, &mut doc, "_a1", &signing_key()).unwrap();
            assert!(doc.text().contains(sha.rsa_signature_uri()));
            assert!(doc.text().contains(sha.digest_uri()));
            assert!(check_signature_with_key(&ctx, &doc, Scope::Document, &certificate()).unwrap());
        }
    }

    #[test]
    fn key_without_certificate_writes_rsa_key_value() {
        let key = loader::load_rsa_private_pem(SIGNING_KEY.as_bytes()).unwrap();
        let mut doc = XmlDocument::parse(ASSERTION.to_owned()).unwrap();
        sign_document(&DsigContext::default(), &mut doc, "_a1", &key).unwrap();
        assert!(doc.text().contains("<ds:RSAKeyValue>"));
        assert!(!doc.text().contains("<ds:X509Data>"));
        assert!(check_signature_with_key(&DsigContext::default(), &doc, Scope::Document, &key).unwrap());
    }

    #[test]
    fn resigning_replaces_the_old_signature() {
        let mut doc = signed_assertion();
        let ctx = DsigContext::default().with_sha(ShaHashingAlgorithm::Sha512);
        sign_document(&ctx, &mut doc, "_a1", &signing_key()).unwrap();
        assert_eq!(doc.text().matches("<ds:Signature ").count(), 1);
        assert!(doc.text().contains(algorithm::RSA_SHA512));
        assert!(check_signature_with_key(&ctx, &doc, Scope::Document, &certificate()).unwrap());
    }

    #[test]
    fn issuer_count_must_be_one() {
        let ctx = DsigContext::default();
        let no_issuer = r#"<saml:Assertion xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_a1"><saml:Subject/></saml:Assertion>"#;
        let mut doc = XmlDocument::parse(no_issuer.to_owned()).unwrap();
        assert!(matches!(
            sign_document(&ctx, &mut doc, "_a1", &signing_key()),
            Err(Error::XmlStructure(_))
        ));
        assert_eq!(doc.text(), no_issuer);

        let two = r#"<saml:Assertion xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_a1"><saml:Issuer>a</saml:Issuer><saml:Issuer>b</saml:Issuer></saml:Assertion>"#;
        let mut doc = XmlDocument::parse(two.to_owned()).unwrap();
        assert!(sign_document(&ctx, &mut doc, "_a1", &signing_key()).is_err());
    }

    #[test]
    fn public_key_cannot_sign() {
        let mut doc = XmlDocument::parse(ASSERTION.to_owned()).unwrap();
        assert!(matches!(
            sign_document(&DsigContext::default(), &mut doc, "_a1", &certificate()),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn unknown_element_id_is_rejected() {
        let mut doc = XmlDocument::parse(ASSERTION.to_owned()).unwrap();
        assert!(sign_document(&DsigContext::default(), &mut doc, "_nope", &signing_key()).is_err());
    }

    #[test]
    fn metadata_signature_is_first_child() {
        let provider = SignatureProviderFactory::create_from_hashing_algorithm(ShaHashingAlgorithm::Sha256);
        let mut doc = XmlDocument::parse(METADATA.to_owned()).unwrap();
        provider.sign_metadata(&mut doc, "_m1", &signing_key()).unwrap();
        let text = doc.text();
        assert!(text.contains(r#"entityID="https://idp.samlsec.test"><ds:Signature "#));
        assert!(text.ends_with("</ds:Signature></md:EntityDescriptor>"));
        assert!(check_signature_with_key(&DsigContext::default(), &doc, Scope::Element("_m1"), &certificate()).unwrap());
    }

    #[test]
    fn metadata_with_children_keeps_them_after_signature() {
        let xml = r#"<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" ID="_m1" entityID="e"><md:IDPSSODescriptor protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol"/></md:EntityDescriptor>"#;
        let provider = SignatureProviderFactory::create_from_hashing_algorithm(ShaHashingAlgorithm::Sha1);
        let mut doc = XmlDocument::parse(xml.to_owned()).unwrap();
        provider.sign_metadata(&mut doc, "_m1", &signing_key()).unwrap();
        let text = doc.text();
        assert!(text.find("<ds:Signature ").unwrap() < text.find("<md:IDPSSODescriptor").unwrap());
        assert!(check_signature_with_key(&DsigContext::default(), &doc, Scope::Document, &certificate()).unwrap());
    }

    #[test]
    fn assertion_signing_requires_certificate() {
        let provider = SignatureProviderFactory::create_from_hashing_algorithm(ShaHashingAlgorithm::Sha256);
        let bare = loader::load_rsa_private_pem(SIGNING_KEY.as_bytes()).unwrap();
        let mut doc = XmlDocument::parse(ASSERTION.to_owned()).unwrap();
        assert!(matches!(
            provider.sign_assertion(&mut doc, "_a1", &bare),
            Err(Error::Configuration(_))
        ));
        provider.sign_assertion(&mut doc, "_a1", &signing_key()).unwrap();
        assert!(check_signature_with_key(&DsigContext::default(), &doc, Scope::Document, &certificate()).unwrap());
    }

    #[test]
    fn leaf_only_chain() {
        let mut key = signing_key();
        let leaf = key.x509_chain[0].clone();
        key.x509_chain.push(leaf);
        let ctx = DsigContext {
            include_chain: false,
            ..DsigContext::default()
        };
        let mut doc = XmlDocument::parse(ASSERTION.to_owned()).unwrap();
        sign_document(&ctx, &mut doc, "_a1", &key).unwrap();
        assert_eq!(doc.text().matches("<ds:X509Certificate>").count(), 1);
    }
}
