#![forbid(unsafe_code)]

//! XML document wrapper over roxmltree with ID attribute registration.

use std::ops::Range;

use samlsec_core::Error;

/// Attribute names checked first when resolving a same-document reference.
pub const DEFAULT_ID_ATTRS: [&str; 3] = ["ID", "Id", "id"];

/// How a document is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Keep whitespace-only text nodes. Signature operations require it.
    pub preserve_whitespace: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            preserve_whitespace: true,
        }
    }
}

/// An owned XML document.  Stores the text and pre-computed metadata.
///
/// To work with the parsed tree, call [`XmlDocument::parse_doc`] which
/// returns a temporary `roxmltree::Document` borrowing from the text.
/// Edits go through [`XmlDocument::splice`], which re-validates the result.
#[derive(Debug, Clone)]
pub struct XmlDocument {
    text: String,
    preserve_whitespace: bool,
    /// Additional ID attribute names to register (beyond `ID`, `Id`, `id`).
    extra_id_attrs: Vec<String>,
}

impl XmlDocument {
    /// Parse and validate XML from a string, preserving all whitespace.
    pub fn parse(text: String) -> Result<Self, Error> {
        Self::parse_with_options(text, LoadOptions::default())
    }

    /// Parse and validate XML, dropping whitespace-only text nodes unless
    /// `options.preserve_whitespace` is set.
    pub fn parse_with_options(text: String, options: LoadOptions) -> Result<Self, Error> {
        let text = if options.preserve_whitespace {
            validate(&text)?;
            text
        } else {
            strip_insignificant_whitespace(&text)?
        };
        Ok(Self {
            text,
            preserve_whitespace: options.preserve_whitespace,
            extra_id_attrs: Vec::new(),
        })
    }

    /// Get the raw XML text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Consume the document and return its text.
    pub fn into_string(self) -> String {
        self.text
    }

    pub fn preserves_whitespace(&self) -> bool {
        self.preserve_whitespace
    }

    /// Fail with [`Error::InvalidOperation`] unless the document was loaded
    /// with whitespace preserved.
    pub fn require_preserved_whitespace(&self) -> Result<(), Error> {
        if self.preserve_whitespace {
            Ok(())
        } else {
            Err(Error::InvalidOperation(
                "document must be loaded with whitespace preserved before signature processing"
                    .into(),
            ))
        }
    }

    /// Register an additional ID attribute name, matched by local name.
    pub fn add_id_attr(&mut self, name: &str) {
        if !self.extra_id_attrs.iter().any(|a| a == name) {
            self.extra_id_attrs.push(name.to_owned());
        }
    }

    /// All registered ID attribute names, defaults first.
    pub fn id_attrs(&self) -> Vec<&str> {
        DEFAULT_ID_ATTRS
            .iter()
            .copied()
            .chain(self.extra_id_attrs.iter().map(String::as_str))
            .collect()
    }

    /// Parse the document and return a temporary `roxmltree::Document`.
    pub fn parse_doc(&self) -> Result<roxmltree::Document<'_>, Error> {
        roxmltree::Document::parse_with_options(&self.text, crate::parsing_options())
            .map_err(|e| Error::XmlParse(e.to_string()))
    }

    /// Replace `range` of the source text and re-validate the document.
    ///
    /// On failure the document is left unchanged.
    pub fn splice(&mut self, range: Range<usize>, replacement: &str) -> Result<(), Error> {
        if range.start > range.end
            || range.end > self.text.len()
            || !self.text.is_char_boundary(range.start)
            || !self.text.is_char_boundary(range.end)
        {
            return Err(Error::XmlStructure(format!(
                "edit range {range:?} outside document"
            )));
        }
        let mut edited = String::with_capacity(self.text.len() + replacement.len());
        edited.push_str(&self.text[..range.start]);
        edited.push_str(replacement);
        edited.push_str(&self.text[range.end..]);
        validate(&edited)?;
        self.text = edited;
        Ok(())
    }
}

/// True if `node` is an element named `{ns}local_name`.
pub fn is_element(node: roxmltree::Node<'_, '_>, ns: &str, local_name: &str) -> bool {
    node.is_element()
        && node.tag_name().name() == local_name
        && node.tag_name().namespace().unwrap_or("") == ns
}

/// Element children of `node` named `{ns}local_name`, in document order.
pub fn child_elements<'a, 'input: 'a>(
    node: roxmltree::Node<'a, 'input>,
    ns: &'a str,
    local_name: &'a str,
) -> impl Iterator<Item = roxmltree::Node<'a, 'input>> + 'a {
    node.children().filter(move |c| is_element(*c, ns, local_name))
}

/// First element child of `node` named `{ns}local_name`.
pub fn child_element<'a, 'input: 'a>(
    node: roxmltree::Node<'a, 'input>,
    ns: &'a str,
    local_name: &'a str,
) -> Option<roxmltree::Node<'a, 'input>> {
    child_elements(node, ns, local_name).next()
}

fn validate(text: &str) -> Result<(), Error> {
    roxmltree::Document::parse_with_options(text, crate::parsing_options())
        .map(|_| ())
        .map_err(|e| Error::XmlParse(e.to_string()))
}

/// Remove whitespace-only text nodes between elements.
fn strip_insignificant_whitespace(text: &str) -> Result<String, Error> {
    let doc = roxmltree::Document::parse_with_options(text, crate::parsing_options())
        .map_err(|e| Error::XmlParse(e.to_string()))?;
    let mut ranges: Vec<Range<usize>> = doc
        .descendants()
        .filter(|n| n.is_text() && n.parent().map_or(false, |p| p.is_element()))
        .filter(|n| n.text().map_or(false, |t| t.trim().is_empty()))
        .map(|n| n.range())
        .collect();
    ranges.sort_by_key(|r| r.start);

    let mut out = String::with_capacity(text.len());
    let mut pos = 0;
    for range in ranges {
        out.push_str(&text[pos..range.start]);
        pos = range.end;
    }
    out.push_str(&text[pos..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "<root>\n  <a ID=\"one\">x</a>\n  <b/>\n</root>";

    #[test]
    fn parse_preserves_whitespace_by_default() {
        let doc = XmlDocument::parse(SAMPLE.to_owned()).unwrap();
        assert!(doc.preserves_whitespace());
        assert_eq!(doc.text(), SAMPLE);
        assert!(doc.require_preserved_whitespace().is_ok());
    }

    #[test]
    fn parse_without_whitespace_strips_text_nodes() {
        let doc = XmlDocument::parse_with_options(
            SAMPLE.to_owned(),
            LoadOptions {
                preserve_whitespace: false,
            },
        )
        .unwrap();
        assert_eq!(doc.text(), "<root><a ID=\"one\">x</a><b/></root>");
        assert!(matches!(
            doc.require_preserved_whitespace(),
            Err(Error::InvalidOperation(_))
        ));
    }

    #[test]
    fn parse_rejects_malformed_xml() {
        assert!(matches!(
            XmlDocument::parse("<root>".to_owned()),
            Err(Error::XmlParse(_))
        ));
    }

    #[test]
    fn splice_replaces_and_validates() {
        let mut doc = XmlDocument::parse("<r><a/></r>".to_owned()).unwrap();
        doc.splice(3..7, "<b>t</b>").unwrap();
        assert_eq!(doc.text(), "<r><b>t</b></r>");
        // Unbalanced edits are rejected and leave the text untouched.
        assert!(doc.splice(3..3, "<c>").is_err());
        assert_eq!(doc.text(), "<r><b>t</b></r>");
    }

    #[test]
    fn id_attrs_include_registered_names() {
        let mut doc = XmlDocument::parse("<r/>".to_owned()).unwrap();
        doc.add_id_attr("AssertionID");
        doc.add_id_attr("AssertionID");
        assert_eq!(doc.id_attrs(), vec!["ID", "Id", "id", "AssertionID"]);
    }

    #[test]
    fn child_elements_match_namespace() {
        let xml = r#"<r xmlns:s="urn:x"><s:i/><i/><s:i/></r>"#;
        let doc = XmlDocument::parse(xml.to_owned()).unwrap();
        let parsed = doc.parse_doc().unwrap();
        let root = parsed.root_element();
        assert_eq!(child_elements(root, "urn:x", "i").count(), 2);
        assert!(child_element(root, "", "i").is_some());
    }
}
