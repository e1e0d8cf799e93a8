#![forbid(unsafe_code)]

//! DSig context: configuration shared by signing and verification.

use samlsec_core::Error;
use samlsec_crypto::ShaHashingAlgorithm;
use samlsec_xml::{xpath, XmlDocument};

/// Configuration for XML-DSig operations.
#[derive(Debug, Clone)]
pub struct DsigContext {
    /// Additional ID attribute names to register.
    pub id_attrs: Vec<String>,
    /// Digest and signature strength used when signing.
    pub sha: ShaHashingAlgorithm,
    /// Write the whole certificate chain into KeyInfo, not just the leaf.
    pub include_chain: bool,
}

impl Default for DsigContext {
    fn default() -> Self {
        Self {
            id_attrs: Vec::new(),
            sha: ShaHashingAlgorithm::default(),
            include_chain: true,
        }
    }
}

impl DsigContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `sha` when signing.
    pub fn with_sha(mut self, sha: ShaHashingAlgorithm) -> Self {
        self.sha = sha;
        self
    }

    /// Add an ID attribute name to register during processing.
    pub fn add_id_attr(&mut self, name: &str) {
        self.id_attrs.push(name.to_owned());
    }

    /// ID attribute names for `doc`: the document's own, then ours.
    pub(crate) fn id_attrs<'a>(&'a self, doc: &'a XmlDocument) -> Vec<&'a str> {
        let mut attrs = doc.id_attrs();
        for extra in &self.id_attrs {
            if !attrs.contains(&extra.as_str()) {
                attrs.push(extra);
            }
        }
        attrs
    }
}

/// The part of a document an operation applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope<'a> {
    /// The document element.
    Document,
    /// The element carrying this ID.
    Element(&'a str),
}

impl Scope<'_> {
    /// The element this scope designates.
    pub(crate) fn resolve<'d, 'input>(
        &self,
        doc: &'d roxmltree::Document<'input>,
        id_attrs: &[&str],
    ) -> Result<roxmltree::Node<'d, 'input>, Error> {
        match self {
            Scope::Document => Ok(doc.root_element()),
            Scope::Element(id) => xpath::resolve_id(doc, id_attrs, id),
        }
    }
}
