#![forbid(unsafe_code)]

//! Enveloped signature transform.
//!
//! Removes the enclosing `<Signature>` element from the node set.

use roxmltree::NodeId;
use samlsec_core::{algorithm, Error};
use samlsec_xml::NodeSet;

use crate::pipeline::{Transform, TransformData};

/// Removes the `<Signature>` element and its descendants from the node set.
pub struct EnvelopedSignatureTransform {
    /// Id of the `<Signature>` element within the document text.
    signature: NodeId,
}

impl EnvelopedSignatureTransform {
    pub fn new(signature: NodeId) -> Self {
        Self { signature }
    }
}

impl Transform for EnvelopedSignatureTransform {
    fn uri(&self) -> &str {
        algorithm::ENVELOPED_SIGNATURE
    }

    fn execute(&self, input: TransformData) -> Result<TransformData, Error> {
        match input {
            TransformData::Xml { xml_text, node_set } => {
                let mut set = node_set.unwrap_or_else(NodeSet::all);
                {
                    let doc = roxmltree::Document::parse_with_options(
                        &xml_text,
                        samlsec_xml::parsing_options(),
                    )
                    .map_err(|e| Error::XmlParse(e.to_string()))?;
                    let signature = doc.get_node(self.signature).ok_or_else(|| {
                        Error::Transform("enveloped signature node not found".into())
                    })?;
                    set.remove_subtree(&doc, signature);
                }
                Ok(TransformData::Xml {
                    xml_text,
                    node_set: Some(set),
                })
            }
            TransformData::Binary(_) => Err(Error::Transform(
                "enveloped-signature transform requires XML input".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{C14nTransform, TransformPipeline};
    use samlsec_c14n::C14nMode;

    #[test]
    fn removes_signature_subtree() {
        let xml = r#"<a ID="_1"><i>x</i><ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><ds:SignedInfo/></ds:Signature></a>"#;
        let doc = roxmltree::Document::parse(xml).unwrap();
        let sig = doc
            .descendants()
            .find(|n| n.has_tag_name(("http://www.w3.org/2000/09/xmldsig#", "Signature")))
            .unwrap();
        let mut pipeline = TransformPipeline::new();
        pipeline.push(Box::new(EnvelopedSignatureTransform::new(sig.id())));
        pipeline.push(Box::new(C14nTransform::new(C14nMode::Exclusive, vec![])));
        let out = pipeline
            .execute(TransformData::Xml {
                xml_text: xml.to_owned(),
                node_set: Some(NodeSet::tree_without_comments(doc.root_element())),
            })
            .unwrap();
        assert_eq!(out, br#"<a ID="_1"><i>x</i></a>"#);
    }

    #[test]
    fn rejects_binary_input() {
        let doc = roxmltree::Document::parse("<r/>").unwrap();
        let t = EnvelopedSignatureTransform::new(doc.root_element().id());
        assert!(t.execute(TransformData::Binary(vec![1])).is_err());
    }
}
