#![forbid(unsafe_code)]

//! XML-DSig signature verification.
//!
//! Processing order:
//! 1. Resolve the scope element and the first `<Signature>` inside it
//! 2. Read `<SignedInfo>`: CanonicalizationMethod, SignatureMethod
//! 3. Check that the single `<Reference>` points at the scope element
//! 4. Dereference, transform and digest; compare with `<DigestValue>`
//! 5. Canonicalize `<SignedInfo>`
//! 6. Verify `<SignatureValue>` against each candidate key in turn

use base64::Engine;
use samlsec_c14n::C14nMode;
use samlsec_core::{ns, Error};
use samlsec_crypto::{digest, SignatureProviderFactory};
use samlsec_keys::{Key, KeyCandidateSet, KeyInfo};
use samlsec_transforms::{pipeline::transform_from_uri, uri::resolve_uri, TransformPipeline};
use samlsec_xml::document::{child_element, child_elements, is_element};
use samlsec_xml::{xpath, NodeSet, XmlDocument};

use crate::context::{DsigContext, Scope};

/// True if a `<Signature>` element exists within `scope`.
///
/// Fails with [`Error::InvalidOperation`] if the document was loaded
/// without preserving whitespace.
pub fn is_signed(ctx: &DsigContext, doc: &XmlDocument, scope: Scope<'_>) -> Result<bool, Error> {
    doc.require_preserved_whitespace()?;
    let parsed = doc.parse_doc()?;
    let root = scope.resolve(&parsed, &ctx.id_attrs(doc))?;
    Ok(find_signature(root).is_some())
}

/// Check the signature within `scope` against a single key.
pub fn check_signature_with_key(
    ctx: &DsigContext,
    doc: &XmlDocument,
    scope: Scope<'_>,
    key: &Key,
) -> Result<bool, Error> {
    check_signature_with_keys(ctx, doc, scope, &KeyCandidateSet::single(key.clone()))
}

/// Check the signature within `scope` using the first usable key of
/// `key_info`.
pub fn check_signature_with_key_info(
    ctx: &DsigContext,
    doc: &XmlDocument,
    scope: Scope<'_>,
    key_info: &KeyInfo,
) -> Result<bool, Error> {
    let key = key_info.first_key()?;
    check_signature_with_key(ctx, doc, scope, &key)
}

/// Check the signature within `scope` against each candidate in order.
///
/// Returns `Ok(true)` as soon as one key verifies. A digest mismatch or a
/// signature no candidate accepts is `Ok(false)`; structural problems
/// (no signature, a reference that does not point at the scope element,
/// ambiguous IDs) are errors.
pub fn check_signature_with_keys(
    ctx: &DsigContext,
    doc: &XmlDocument,
    scope: Scope<'_>,
    keys: &KeyCandidateSet,
) -> Result<bool, Error> {
    doc.require_preserved_whitespace()?;
    let xml = doc.text();
    let parsed = doc.parse_doc()?;
    let id_attrs = ctx.id_attrs(doc);

    let root = scope.resolve(&parsed, &id_attrs)?;
    let sig_node = find_signature(root).ok_or_else(|| Error::MissingElement("Signature".into()))?;

    let signed_info = child_element(sig_node, ns::DSIG, ns::node::SIGNED_INFO)
        .ok_or_else(|| Error::MissingElement("SignedInfo".into()))?;

    let c14n_method_node = child_element(signed_info, ns::DSIG, ns::node::CANONICALIZATION_METHOD)
        .ok_or_else(|| Error::MissingElement("CanonicalizationMethod".into()))?;
    let c14n_uri = c14n_method_node
        .attribute(ns::attr::ALGORITHM)
        .ok_or_else(|| Error::MissingAttribute("Algorithm on CanonicalizationMethod".into()))?;
    let c14n_mode = C14nMode::from_uri(c14n_uri)
        .ok_or_else(|| Error::Configuration(format!("unsupported canonicalization: {c14n_uri}")))?;

    let sig_method_uri = child_element(signed_info, ns::DSIG, ns::node::SIGNATURE_METHOD)
        .ok_or_else(|| Error::MissingElement("SignatureMethod".into()))?
        .attribute(ns::attr::ALGORITHM)
        .ok_or_else(|| Error::MissingAttribute("Algorithm on SignatureMethod".into()))?;
    let provider = SignatureProviderFactory::create_from_signature_uri(sig_method_uri)?;

    let references: Vec<_> = child_elements(signed_info, ns::DSIG, ns::node::REFERENCE).collect();
    let reference = match references.as_slice() {
        [single] => *single,
        [] => return Err(Error::MissingElement("Reference".into())),
        more => {
            return Err(Error::Integrity(format!(
                "expected exactly one Reference, found {}",
                more.len()
            )))
        }
    };
    check_reference_target(reference, root, &parsed, &id_attrs)?;

    if !reference_digest_matches(reference, sig_node, &parsed, &id_attrs, xml)? {
        tracing::warn!("reference digest mismatch");
        return Ok(false);
    }

    let signed_info_set = NodeSet::tree_without_comments(signed_info);
    let c14n_signed_info = samlsec_c14n::canonicalize_doc(
        &parsed,
        c14n_mode,
        Some(&signed_info_set),
        &read_inclusive_prefixes(c14n_method_node),
    )?;

    let sig_value_node = child_element(sig_node, ns::DSIG, ns::node::SIGNATURE_VALUE)
        .ok_or_else(|| Error::MissingElement("SignatureValue".into()))?;
    let sig_value = decode_base64_text(sig_value_node, "SignatureValue")?;

    for (index, key) in keys.iter().enumerate() {
        if provider.verify_signature(&key.to_verifying_key(), &c14n_signed_info, &sig_value) {
            tracing::debug!(index, alg = sig_method_uri, "signature verified");
            return Ok(true);
        }
        tracing::debug!(index, "candidate key rejected");
    }
    tracing::warn!(alg = sig_method_uri, "no candidate key verifies the signature");
    Ok(false)
}

/// The KeyInfo carried by the signature within `scope`.
pub fn extract_signature_keys(
    ctx: &DsigContext,
    doc: &XmlDocument,
    scope: Scope<'_>,
) -> Result<KeyInfo, Error> {
    let parsed = doc.parse_doc()?;
    let root = scope.resolve(&parsed, &ctx.id_attrs(doc))?;
    let sig_node = find_signature(root).ok_or_else(|| Error::MissingElement("Signature".into()))?;
    let key_info = child_element(sig_node, ns::DSIG, ns::node::KEY_INFO)
        .ok_or_else(|| Error::MissingElement("KeyInfo".into()))?;
    KeyInfo::parse(key_info)
}

/// First `<Signature>` at or below `root`, in document order.
pub(crate) fn find_signature<'a, 'input>(
    root: roxmltree::Node<'a, 'input>,
) -> Option<roxmltree::Node<'a, 'input>> {
    root.descendants()
        .find(|n| is_element(*n, ns::DSIG, ns::node::SIGNATURE))
}

/// The reference must be `#` followed by the signed element's own ID, and
/// that ID must resolve to the signed element alone.
fn check_reference_target(
    reference: roxmltree::Node<'_, '_>,
    signed: roxmltree::Node<'_, '_>,
    doc: &roxmltree::Document<'_>,
    id_attrs: &[&str],
) -> Result<(), Error> {
    let uri = reference.attribute(ns::attr::URI).unwrap_or("");
    if uri.is_empty() {
        return Err(Error::Integrity("Reference URI is empty".into()));
    }
    let id = xpath::parse_same_document_ref(uri).ok_or_else(|| {
        Error::Integrity(format!("Reference URI is not a same-document fragment: {uri}"))
    })?;
    let own_id = xpath::element_id(signed, id_attrs).ok_or_else(|| {
        Error::Integrity(format!(
            "signed element {} carries no ID attribute",
            signed.tag_name().name()
        ))
    })?;
    if own_id != id {
        return Err(Error::Integrity(format!(
            "Reference URI #{id} does not match signed element ID {own_id}"
        )));
    }
    let target = xpath::resolve_id(doc, id_attrs, id)?;
    if target.id() != signed.id() {
        return Err(Error::Integrity(format!(
            "Reference #{id} resolves to a different element"
        )));
    }
    tracing::debug!(id, "reference target checked");
    Ok(())
}

fn reference_digest_matches(
    reference: roxmltree::Node<'_, '_>,
    sig_node: roxmltree::Node<'_, '_>,
    doc: &roxmltree::Document<'_>,
    id_attrs: &[&str],
    xml: &str,
) -> Result<bool, Error> {
    let uri = reference.attribute(ns::attr::URI).unwrap_or("");
    let digest_uri = child_element(reference, ns::DSIG, ns::node::DIGEST_METHOD)
        .ok_or_else(|| Error::MissingElement("DigestMethod".into()))?
        .attribute(ns::attr::ALGORITHM)
        .ok_or_else(|| Error::MissingAttribute("Algorithm on DigestMethod".into()))?;
    let expected = decode_base64_text(
        child_element(reference, ns::DSIG, ns::node::DIGEST_VALUE)
            .ok_or_else(|| Error::MissingElement("DigestValue".into()))?,
        "DigestValue",
    )?;

    let mut pipeline = TransformPipeline::new();
    if let Some(transforms) = child_element(reference, ns::DSIG, ns::node::TRANSFORMS) {
        for transform in child_elements(transforms, ns::DSIG, ns::node::TRANSFORM) {
            let transform_uri = transform
                .attribute(ns::attr::ALGORITHM)
                .ok_or_else(|| Error::MissingAttribute("Algorithm on Transform".into()))?;
            pipeline.push(transform_from_uri(
                transform_uri,
                sig_node.id(),
                read_inclusive_prefixes(transform),
            )?);
        }
    }

    let input = resolve_uri(uri, doc, id_attrs, xml)?;
    let computed = digest::digest(digest_uri, &pipeline.execute(input)?)?;
    tracing::debug!(uri, transforms = ?pipeline.uris(), "computed reference digest");
    Ok(computed == expected)
}

/// Decode base64 element text, ignoring embedded whitespace.
fn decode_base64_text(node: roxmltree::Node<'_, '_>, what: &str) -> Result<Vec<u8>, Error> {
    let clean: String = node
        .text()
        .unwrap_or("")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    base64::engine::general_purpose::STANDARD
        .decode(&clean)
        .map_err(|e| Error::Base64(format!("{what}: {e}")))
}

fn read_inclusive_prefixes(node: roxmltree::Node<'_, '_>) -> Vec<String> {
    child_element(node, ns::EXC_C14N, ns::node::INCLUSIVE_NAMESPACES)
        .and_then(|n| n.attribute(ns::attr::PREFIX_LIST))
        .map(|list| list.split_whitespace().map(str::to_owned).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sign::tests::{certificate, other_key, signed_assertion, signing_key, ASSERTION};
    use samlsec_xml::LoadOptions;

    fn ctx() -> DsigContext {
        DsigContext::default()
    }

    fn reparse(text: String) -> XmlDocument {
        XmlDocument::parse(text).unwrap()
    }

    #[test]
    fn unsigned_document_is_not_signed() {
        let doc = reparse(ASSERTION.to_owned());
        assert!(!is_signed(&ctx(), &doc, Scope::Document).unwrap());
        assert!(matches!(
            check_signature_with_key(&ctx(), &doc, Scope::Document, &certificate()),
            Err(Error::MissingElement(_))
        ));
        assert!(matches!(
            extract_signature_keys(&ctx(), &doc, Scope::Document),
            Err(Error::MissingElement(_))
        ));
    }

    #[test]
    fn whitespace_must_be_preserved() {
        let doc = XmlDocument::parse_with_options(
            signed_assertion().into_string(),
            LoadOptions {
                preserve_whitespace: false,
            },
        )
        .unwrap();
        assert!(matches!(
            is_signed(&ctx(), &doc, Scope::Document),
            Err(Error::InvalidOperation(_))
        ));
        assert!(matches!(
            check_signature_with_key(&ctx(), &doc, Scope::Document, &certificate()),
            Err(Error::InvalidOperation(_))
        ));
    }

    #[test]
    fn content_tampering_fails() {
        let text = signed_assertion().into_string().replace(">alice<", ">mallory<");
        let doc = reparse(text);
        assert!(!check_signature_with_key(&ctx(), &doc, Scope::Document, &certificate()).unwrap());
    }

    #[test]
    fn changed_id_is_an_integrity_error() {
        let text = signed_assertion().into_string().replace(r#"ID="_a1""#, r#"ID="_a2""#);
        let doc = reparse(text);
        assert!(matches!(
            check_signature_with_key(&ctx(), &doc, Scope::Document, &certificate()),
            Err(Error::Integrity(_))
        ));
        assert!(matches!(
            check_signature_with_key(&ctx(), &doc, Scope::Element("_a2"), &certificate()),
            Err(Error::Integrity(_))
        ));
    }

    #[test]
    fn changed_reference_uri_is_an_integrity_error() {
        let signed = signed_assertion().into_string();
        for uri in ["#_other", "", "_a1", "http://evil.test/#_a1"] {
            let text = signed.replace(r##"URI="#_a1""##, &format!(r#"URI="{uri}""#));
            let doc = reparse(text);
            assert!(
                matches!(
                    check_signature_with_key(&ctx(), &doc, Scope::Document, &certificate()),
                    Err(Error::Integrity(_))
                ),
                "URI {uri:?} accepted"
            );
        }
    }

    #[test]
    fn wrapped_duplicate_id_is_rejected() {
        let signed = signed_assertion().into_string();
        let evil = ASSERTION.replace("alice", "mallory");
        let text = format!(
            r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" ID="_r1">{evil}{signed}</samlp:Response>"#
        );
        let doc = reparse(text);
        assert!(matches!(
            check_signature_with_key(&ctx(), &doc, Scope::Element("_a1"), &certificate()),
            Err(Error::Integrity(_))
        ));
    }

    #[test]
    fn signature_in_child_does_not_cover_the_document() {
        let signed = signed_assertion().into_string();
        let text = format!(
            r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" ID="_r1">{signed}</samlp:Response>"#
        );
        let doc = reparse(text);
        assert!(is_signed(&ctx(), &doc, Scope::Document).unwrap());
        assert!(matches!(
            check_signature_with_key(&ctx(), &doc, Scope::Document, &certificate()),
            Err(Error::Integrity(_))
        ));
        assert!(check_signature_with_key(&ctx(), &doc, Scope::Element("_a1"), &certificate()).unwrap());
    }

    #[test]
    fn lowercase_id_attribute_is_found() {
        let xml = ASSERTION.replace(r#"ID="_a1""#, r#"iD="_a1""#);
        let mut doc = reparse(xml);
        crate::sign::sign_document(&ctx(), &mut doc, "_a1", &signing_key()).unwrap();
        assert!(check_signature_with_key(&ctx(), &doc, Scope::Element("_a1"), &certificate()).unwrap());
    }

    #[test]
    fn candidate_set_skips_empty_and_wrong_keys() {
        let doc = signed_assertion();
        let keys: KeyCandidateSet = vec![None, Some(other_key()), None, Some(certificate())]
            .into_iter()
            .collect();
        assert!(check_signature_with_keys(&ctx(), &doc, Scope::Document, &keys).unwrap());

        let only_wrong: KeyCandidateSet = vec![None, Some(other_key())].into_iter().collect();
        assert!(!check_signature_with_keys(&ctx(), &doc, Scope::Document, &only_wrong).unwrap());
        assert!(!check_signature_with_keys(&ctx(), &doc, Scope::Document, &KeyCandidateSet::new()).unwrap());
    }

    #[test]
    fn embedded_key_info_verifies() {
        let doc = signed_assertion();
        let key_info = extract_signature_keys(&ctx(), &doc, Scope::Document).unwrap();
        assert!(key_info.first_key().unwrap().same_public_key(&certificate()));
        assert!(check_signature_with_key_info(&ctx(), &doc, Scope::Document, &key_info).unwrap());

        assert!(matches!(
            check_signature_with_key_info(&ctx(), &doc, Scope::Document, &KeyInfo::new()),
            Err(Error::KeyNotFound(_))
        ));
    }

    #[test]
    fn unknown_signature_method_is_a_configuration_error() {
        let text = signed_assertion()
            .into_string()
            .replace(samlsec_core::algorithm::RSA_SHA256, "urn:unknown:alg");
        let doc = reparse(text);
        assert!(matches!(
            check_signature_with_key(&ctx(), &doc, Scope::Document, &certificate()),
            Err(Error::Configuration(_))
        ));
    }
}
