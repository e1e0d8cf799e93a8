#![forbid(unsafe_code)]

//! Transform pipeline and trait definitions.

use samlsec_c14n::C14nMode;
use samlsec_core::{algorithm, Error};
use samlsec_xml::NodeSet;

/// Data flowing through the transform pipeline.
#[derive(Debug, Clone)]
pub enum TransformData {
    /// XML node set (for XML-aware transforms like C14N).
    Xml {
        xml_text: String,
        node_set: Option<NodeSet>,
    },
    /// Raw octets.
    Binary(Vec<u8>),
}

impl TransformData {
    /// Convert to octets, canonicalizing a node set with exclusive C14N.
    pub fn into_binary(self) -> Result<Vec<u8>, Error> {
        match self {
            TransformData::Binary(data) => Ok(data),
            TransformData::Xml { xml_text, node_set } => {
                samlsec_c14n::canonicalize(&xml_text, C14nMode::Exclusive, node_set.as_ref(), &[])
            }
        }
    }
}

/// Trait for individual transforms.
pub trait Transform: Send + Sync {
    /// The algorithm URI for this transform.
    fn uri(&self) -> &str;

    /// Execute the transform on the given data.
    fn execute(&self, input: TransformData) -> Result<TransformData, Error>;
}

/// A pipeline of transforms executed in sequence.
#[derive(Default)]
pub struct TransformPipeline {
    transforms: Vec<Box<dyn Transform>>,
}

impl TransformPipeline {
    /// Create an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a transform to the pipeline.
    pub fn push(&mut self, transform: Box<dyn Transform>) {
        self.transforms.push(transform);
    }

    /// Execute all transforms in order and return the octets to digest.
    pub fn execute(&self, input: TransformData) -> Result<Vec<u8>, Error> {
        let mut data = input;
        for transform in &self.transforms {
            tracing::trace!(uri = transform.uri(), "applying transform");
            data = transform.execute(data)?;
        }
        data.into_binary()
    }

    /// The URIs of the transforms, in order.
    pub fn uris(&self) -> Vec<&str> {
        self.transforms.iter().map(|t| t.uri()).collect()
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}

// ── C14N Transform ───────────────────────────────────────────────────

/// A canonicalization transform.
pub struct C14nTransform {
    mode: C14nMode,
    inclusive_prefixes: Vec<String>,
}

impl C14nTransform {
    pub fn new(mode: C14nMode, inclusive_prefixes: Vec<String>) -> Self {
        Self {
            mode,
            inclusive_prefixes,
        }
    }
}

impl Transform for C14nTransform {
    fn uri(&self) -> &str {
        self.mode.uri()
    }

    fn execute(&self, input: TransformData) -> Result<TransformData, Error> {
        let bytes = match input {
            TransformData::Xml { xml_text, node_set } => samlsec_c14n::canonicalize(
                &xml_text,
                self.mode,
                node_set.as_ref(),
                &self.inclusive_prefixes,
            )?,
            TransformData::Binary(data) => samlsec_c14n::canonicalize(
                std::str::from_utf8(&data)
                    .map_err(|e| Error::Transform(format!("invalid UTF-8: {e}")))?,
                self.mode,
                None,
                &self.inclusive_prefixes,
            )?,
        };
        Ok(TransformData::Binary(bytes))
    }
}

/// Build a transform from its algorithm URI.
///
/// `signature` is the enclosing `<Signature>` element, needed by the
/// enveloped-signature transform.
pub fn transform_from_uri(
    uri: &str,
    signature: roxmltree::NodeId,
    inclusive_prefixes: Vec<String>,
) -> Result<Box<dyn Transform>, Error> {
    if uri == algorithm::ENVELOPED_SIGNATURE {
        return Ok(Box::new(crate::EnvelopedSignatureTransform::new(signature)));
    }
    match C14nMode::from_uri(uri) {
        Some(mode) => Ok(Box::new(C14nTransform::new(mode, inclusive_prefixes))),
        None => Err(Error::Transform(format!("unsupported transform: {uri}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const XML: &str = r#"<r xmlns:x="urn:x"><x:a ID="_1"><!--c--><x:b/></x:a></r>"#;

    #[test]
    fn c14n_transform_over_subtree() {
        let doc = roxmltree::Document::parse(XML).unwrap();
        let a = doc.descendants().find(|n| n.has_tag_name("a")).unwrap();
        let data = TransformData::Xml {
            xml_text: XML.to_owned(),
            node_set: Some(NodeSet::tree_without_comments(a)),
        };
        let mut pipeline = TransformPipeline::new();
        pipeline.push(Box::new(C14nTransform::new(C14nMode::Exclusive, vec![])));
        let out = pipeline.execute(data).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            r#"<x:a xmlns:x="urn:x" ID="_1"><x:b></x:b></x:a>"#
        );
    }

    #[test]
    fn binary_passes_through_empty_pipeline() {
        let out = TransformPipeline::new()
            .execute(TransformData::Binary(b"abc".to_vec()))
            .unwrap();
        assert_eq!(out, b"abc");
    }

    #[test]
    fn unknown_transform_is_rejected() {
        let doc = roxmltree::Document::parse("<r/>").unwrap();
        let id = doc.root_element().id();
        assert!(transform_from_uri("urn:nope", id, vec![]).is_err());
        assert!(transform_from_uri(algorithm::EXC_C14N, id, vec![]).is_ok());
        assert!(transform_from_uri(algorithm::ENVELOPED_SIGNATURE, id, vec![]).is_ok());
    }
}
