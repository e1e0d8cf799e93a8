#![forbid(unsafe_code)]

//! URI dereferencing for XML-DSig references.
//!
//! Handles:
//! - Empty URI (""): the entire document minus comments
//! - Same-document references ("#id"): resolved through the document's
//!   ID attributes

use samlsec_core::Error;
use samlsec_xml::{xpath, NodeSet};

use crate::pipeline::TransformData;

/// Dereference `uri` in `doc` (parsed from `xml_text`) into transform input.
pub fn resolve_uri(
    uri: &str,
    doc: &roxmltree::Document<'_>,
    id_attrs: &[&str],
    xml_text: &str,
) -> Result<TransformData, Error> {
    let node_set = if uri.is_empty() {
        NodeSet::all_without_comments(doc)
    } else if let Some(id) = xpath::parse_same_document_ref(uri) {
        NodeSet::tree_without_comments(xpath::resolve_id(doc, id_attrs, id)?)
    } else {
        return Err(Error::InvalidUri(format!("external URI not supported: {uri}")));
    };
    Ok(TransformData::Xml {
        xml_text: xml_text.to_owned(),
        node_set: Some(node_set),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_fragment_and_rejects_external() {
        let xml = r#"<r><a ID="_a">t</a></r>"#;
        let doc = roxmltree::Document::parse(xml).unwrap();
        let ids = ["ID"];
        let data = resolve_uri("#_a", &doc, &ids, xml).unwrap();
        assert_eq!(data.into_binary().unwrap(), br#"<a ID="_a">t</a>"#);
        assert!(matches!(
            resolve_uri("http://evil/", &doc, &ids, xml),
            Err(Error::InvalidUri(_))
        ));
        assert!(resolve_uri("#_missing", &doc, &ids, xml).is_err());
    }
}
