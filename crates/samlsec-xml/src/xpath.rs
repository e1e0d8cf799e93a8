#![forbid(unsafe_code)]

//! Same-document reference handling for XML-DSig processing.
//!
//! SAML schemas declare `ID`/`Id` without DTD or schema `ID` typing, so
//! references are resolved by attribute name: first through the
//! registered ID attribute names, then by scanning for any attribute whose
//! local name is `id` in any letter case.

use samlsec_core::Error;

/// Parse a same-document reference (e.g., `#foo` → `foo`).
pub fn parse_same_document_ref(uri: &str) -> Option<&str> {
    uri.strip_prefix('#')
}

/// The identifier carried by `node` itself, if any.
pub fn element_id<'a>(node: roxmltree::Node<'a, '_>, id_attrs: &[&str]) -> Option<&'a str> {
    if !node.is_element() {
        return None;
    }
    for name in id_attrs {
        if let Some(attr) = node.attributes().find(|a| a.name() == *name) {
            return Some(attr.value());
        }
    }
    node.attributes()
        .find(|a| a.name().eq_ignore_ascii_case("id"))
        .map(|a| a.value())
}

/// Resolve an ID value in a parsed document.
///
/// Registered attribute names are tried first; only when none of them
/// carries `id` does the case-insensitive fallback run. More than one
/// matching element at either stage is an integrity error.
pub fn resolve_id<'a, 'input>(
    doc: &'a roxmltree::Document<'input>,
    id_attrs: &[&str],
    id: &str,
) -> Result<roxmltree::Node<'a, 'input>, Error> {
    let registered: Vec<_> = doc
        .descendants()
        .filter(|n| n.is_element())
        .filter(|n| {
            n.attributes()
                .any(|a| id_attrs.contains(&a.name()) && a.value() == id)
        })
        .collect();
    if let Some(node) = single(registered, id)? {
        return Ok(node);
    }

    let fallback: Vec<_> = doc
        .descendants()
        .filter(|n| n.is_element())
        .filter(|n| {
            n.attributes()
                .any(|a| a.name().eq_ignore_ascii_case("id") && a.value() == id)
        })
        .collect();
    let node = single(fallback, id)?
        .ok_or_else(|| Error::Integrity(format!("reference target not found: #{id}")))?;
    tracing::debug!(id, "resolved ID through case-insensitive attribute match");
    Ok(node)
}

fn single<'a, 'input>(
    mut nodes: Vec<roxmltree::Node<'a, 'input>>,
    id: &str,
) -> Result<Option<roxmltree::Node<'a, 'input>>, Error> {
    match nodes.len() {
        0 => Ok(None),
        1 => Ok(nodes.pop()),
        n => Err(Error::Integrity(format!(
            "ID {id} is carried by {n} elements"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DEFAULT_ID_ATTRS;

    #[test]
    fn same_document_ref() {
        assert_eq!(parse_same_document_ref("#abc"), Some("abc"));
        assert_eq!(parse_same_document_ref("abc"), None);
        assert_eq!(parse_same_document_ref(""), None);
    }

    #[test]
    fn resolves_registered_attribute() {
        let xml = r#"<r><a ID="_1"/><b Id="_2"/></r>"#;
        let doc = roxmltree::Document::parse(xml).unwrap();
        let node = resolve_id(&doc, &DEFAULT_ID_ATTRS, "_2").unwrap();
        assert_eq!(node.tag_name().name(), "b");
    }

    #[test]
    fn falls_back_to_any_case_id() {
        let xml = r#"<r><a iD="_x"/></r>"#;
        let doc = roxmltree::Document::parse(xml).unwrap();
        let node = resolve_id(&doc, &DEFAULT_ID_ATTRS, "_x").unwrap();
        assert_eq!(node.tag_name().name(), "a");
        assert_eq!(element_id(node, &DEFAULT_ID_ATTRS), Some("_x"));
    }

    #[test]
    fn namespaced_id_attribute_matches_local_name() {
        let xml = r#"<r xmlns:w="urn:w"><a w:Id="_n"/></r>"#;
        let doc = roxmltree::Document::parse(xml).unwrap();
        assert!(resolve_id(&doc, &DEFAULT_ID_ATTRS, "_n").is_ok());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let xml = r#"<r><a ID="_d"/><b ID="_d"/></r>"#;
        let doc = roxmltree::Document::parse(xml).unwrap();
        assert!(matches!(
            resolve_id(&doc, &DEFAULT_ID_ATTRS, "_d"),
            Err(Error::Integrity(_))
        ));
    }

    #[test]
    fn missing_id_is_an_error() {
        let doc = roxmltree::Document::parse("<r/>").unwrap();
        assert!(resolve_id(&doc, &DEFAULT_ID_ATTRS, "nope").is_err());
    }
}
