#![forbid(unsafe_code)]

//! Exclusive Canonical XML 1.0 (exc-C14N).
//!
//! Algorithm URI: `http://www.w3.org/2001/10/xml-exc-c14n#`
//! With comments: `http://www.w3.org/2001/10/xml-exc-c14n#WithComments`
//!
//! Only "visibly utilized" namespace declarations are output.  A namespace
//! is visibly utilized by an element if:
//! 1. Its prefix is used by the element's tag name, OR
//! 2. Its prefix is used by one of the element's attributes, OR
//! 3. The prefix appears in the InclusiveNamespaces PrefixList.

use std::collections::{BTreeMap, HashSet};

use roxmltree::{Document, Node};
use samlsec_core::{ns, Error};
use samlsec_xml::NodeSet;

use crate::render::{self, Attr, NsDecl};

/// Canonicalize using Exclusive C14N 1.0.
pub fn canonicalize(
    doc: &Document<'_>,
    with_comments: bool,
    node_set: Option<&NodeSet>,
    inclusive_prefixes: &[String],
) -> Result<Vec<u8>, Error> {
    let ctx = ExcC14nContext {
        text: doc.input_text(),
        with_comments,
        node_set,
        inclusive_prefixes: inclusive_prefixes
            .iter()
            .map(|p| if p == "#default" { String::new() } else { p.clone() })
            .collect(),
    };
    let mut output = Vec::new();
    ctx.process_node(doc.root(), &mut output, &BTreeMap::new())?;
    Ok(output)
}

struct ExcC14nContext<'a> {
    text: &'a str,
    with_comments: bool,
    node_set: Option<&'a NodeSet>,
    inclusive_prefixes: HashSet<String>,
}

impl ExcC14nContext<'_> {
    fn is_visible(&self, node: Node<'_, '_>) -> bool {
        self.node_set.map_or(true, |set| set.contains(node))
    }

    fn process_node(
        &self,
        node: Node<'_, '_>,
        output: &mut Vec<u8>,
        rendered_ns: &BTreeMap<String, String>,
    ) -> Result<(), Error> {
        match node.node_type() {
            roxmltree::NodeType::Root => {
                for child in node.children() {
                    self.process_node(child, output, rendered_ns)?;
                }
            }
            roxmltree::NodeType::Element => self.process_element(node, output, rendered_ns)?,
            roxmltree::NodeType::Text => {
                if self.is_visible(node) {
                    render::push_text(output, node.text().unwrap_or(""));
                }
            }
            roxmltree::NodeType::Comment => {
                if self.with_comments && self.is_visible(node) {
                    self.write_top_level(node, output, |out| {
                        out.extend_from_slice(b"<!--");
                        out.extend_from_slice(node.text().unwrap_or("").as_bytes());
                        out.extend_from_slice(b"-->");
                    });
                }
            }
            roxmltree::NodeType::PI => {
                if let (true, Some(pi)) = (self.is_visible(node), node.pi()) {
                    self.write_top_level(node, output, |out| {
                        out.extend_from_slice(b"<?");
                        out.extend_from_slice(pi.target.as_bytes());
                        if let Some(value) = pi.value.filter(|v| !v.is_empty()) {
                            out.push(b' ');
                            render::push_pi_data(out, value);
                        }
                        out.extend_from_slice(b"?>");
                    });
                }
            }
        }
        Ok(())
    }

    /// Comments and PIs outside the document element are separated from it
    /// by a line feed.
    fn write_top_level(
        &self,
        node: Node<'_, '_>,
        output: &mut Vec<u8>,
        write: impl FnOnce(&mut Vec<u8>),
    ) {
        let top_level = node.parent().map_or(false, |p| p.is_root());
        if top_level && has_sibling_element(node, |n| n.prev_sibling()) {
            output.push(b'\n');
        }
        write(output);
        if top_level && has_sibling_element(node, |n| n.next_sibling()) {
            output.push(b'\n');
        }
    }

    fn process_element(
        &self,
        node: Node<'_, '_>,
        output: &mut Vec<u8>,
        rendered_ns: &BTreeMap<String, String>,
    ) -> Result<(), Error> {
        if !self.is_visible(node) {
            // Invisible elements render nothing themselves; their
            // descendants still see the ancestors' rendered bindings.
            for child in node.children() {
                self.process_node(child, output, rendered_ns)?;
            }
            return Ok(());
        }

        let elem_name = qualified_element_name(self.text, node)?;
        let inscope_ns = inscope_namespaces(node);

        let mut utilized: HashSet<String> = self.inclusive_prefixes.clone();
        utilized.insert(prefix_of(elem_name).to_owned());

        let mut attrs: Vec<Attr> = Vec::new();
        for attr in node.attributes() {
            let ns_uri = attr.namespace().unwrap_or("");
            let prefix = attribute_prefix(self.text, node, &attr, &inscope_ns);
            let qualified_name = if prefix.is_empty() {
                attr.name().to_owned()
            } else {
                utilized.insert(prefix.clone());
                format!("{prefix}:{}", attr.name())
            };
            attrs.push(Attr {
                ns_uri: ns_uri.to_owned(),
                local_name: attr.name().to_owned(),
                qualified_name,
                value: attr.value().to_owned(),
            });
        }
        attrs.sort();

        let mut ns_decls: Vec<NsDecl> = Vec::new();
        for prefix in &utilized {
            if prefix == "xml" {
                continue;
            }
            match inscope_ns.get(prefix) {
                Some(uri) if rendered_ns.get(prefix) != Some(uri) => ns_decls.push(NsDecl {
                    prefix: prefix.clone(),
                    uri: uri.clone(),
                }),
                Some(_) => {}
                None if prefix.is_empty() => {
                    // Undeclare a default namespace rendered by an ancestor.
                    if rendered_ns.get("").map_or(false, |uri| !uri.is_empty()) {
                        ns_decls.push(NsDecl {
                            prefix: String::new(),
                            uri: String::new(),
                        });
                    }
                }
                None => {}
            }
        }
        ns_decls.sort();

        output.push(b'<');
        output.extend_from_slice(elem_name.as_bytes());
        for decl in &ns_decls {
            decl.write(output);
        }
        for attr in &attrs {
            attr.write(output);
        }
        output.push(b'>');

        let mut child_rendered_ns = rendered_ns.clone();
        for decl in ns_decls {
            child_rendered_ns.insert(decl.prefix, decl.uri);
        }
        for child in node.children() {
            self.process_node(child, output, &child_rendered_ns)?;
        }

        output.extend_from_slice(b"</");
        output.extend_from_slice(elem_name.as_bytes());
        output.push(b'>');
        Ok(())
    }
}

fn has_sibling_element<'a, 'input>(
    node: Node<'a, 'input>,
    step: impl Fn(Node<'a, 'input>) -> Option<Node<'a, 'input>>,
) -> bool {
    let mut sib = step(node);
    while let Some(s) = sib {
        if s.is_element() {
            return true;
        }
        sib = step(s);
    }
    false
}

/// In-scope namespace bindings of an element, keyed by prefix ("" for default).
fn inscope_namespaces(node: Node<'_, '_>) -> BTreeMap<String, String> {
    node.namespaces()
        .filter(|ns| !ns.uri().is_empty())
        .map(|ns| (ns.name().unwrap_or("").to_owned(), ns.uri().to_owned()))
        .collect()
}

/// The element's tag name as written in the source.
fn qualified_element_name<'t>(text: &'t str, node: Node<'_, '_>) -> Result<&'t str, Error> {
    let start = node.range().start + 1;
    let rest = text.get(start..).unwrap_or("");
    let end = rest
        .find(|c: char| c.is_whitespace() || c == '/' || c == '>')
        .unwrap_or(rest.len());
    let qname = &rest[..end];
    if qname.is_empty() || !qname.ends_with(node.tag_name().name()) {
        return Err(Error::Canonicalization(format!(
            "cannot locate start tag of <{}>",
            node.tag_name().name()
        )));
    }
    Ok(qname)
}

fn prefix_of(qname: &str) -> &str {
    qname.split_once(':').map_or("", |(p, _)| p)
}

/// The prefix an attribute was written with.
///
/// When several prefixes bind the attribute's namespace, the start tag is
/// consulted to find the one actually used.
fn attribute_prefix(
    text: &str,
    node: Node<'_, '_>,
    attr: &roxmltree::Attribute<'_, '_>,
    inscope_ns: &BTreeMap<String, String>,
) -> String {
    let Some(ns_uri) = attr.namespace() else {
        return String::new();
    };
    if ns_uri == ns::XML {
        return "xml".to_owned();
    }
    let candidates: Vec<&String> = inscope_ns
        .iter()
        .filter(|(prefix, uri)| !prefix.is_empty() && uri.as_str() == ns_uri)
        .map(|(prefix, _)| prefix)
        .collect();
    if candidates.len() > 1 {
        let tag = start_tag(text, node);
        if let Some(p) = candidates.iter().find(|p| {
            tag.contains(&format!(" {}:{}=", p, attr.name()))
                || tag.contains(&format!("\n{}:{}=", p, attr.name()))
                || tag.contains(&format!("\t{}:{}=", p, attr.name()))
        }) {
            return (*p).clone();
        }
    }
    candidates.first().map(|p| (*p).clone()).unwrap_or_default()
}

/// The source text of the element's start tag, quotes respected.
fn start_tag<'t>(text: &'t str, node: Node<'_, '_>) -> &'t str {
    let start = node.range().start;
    let rest = text.get(start..).unwrap_or("");
    let mut quote: Option<char> = None;
    for (i, c) in rest.char_indices() {
        match (quote, c) {
            (None, '"') | (None, '\'') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, '>') => return &rest[..=i],
            _ => {}
        }
    }
    rest
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c14n(xml: &str, prefixes: &[&str]) -> String {
        let doc = Document::parse(xml).unwrap();
        let prefixes: Vec<String> = prefixes.iter().map(|s| s.to_string()).collect();
        String::from_utf8(canonicalize(&doc, false, None, &prefixes).unwrap()).unwrap()
    }

    fn c14n_subtree(xml: &str, local: &str) -> String {
        let doc = Document::parse(xml).unwrap();
        let node = doc.descendants().find(|n| n.has_tag_name(local)).unwrap();
        let set = NodeSet::tree_without_comments(node);
        String::from_utf8(canonicalize(&doc, false, Some(&set), &[]).unwrap()).unwrap()
    }

    #[test]
    fn empty_elements_are_expanded() {
        assert_eq!(c14n("<a><b/></a>", &[]), "<a><b></b></a>");
    }

    #[test]
    fn attributes_are_sorted_and_normalized() {
        assert_eq!(
            c14n("<a z='1' b=\"x&amp;y\"/>", &[]),
            r#"<a b="x&amp;y" z="1"></a>"#
        );
    }

    #[test]
    fn unused_namespaces_are_dropped() {
        let xml = r#"<a xmlns="urn:d" xmlns:u="urn:unused" xmlns:p="urn:p"><p:b/></a>"#;
        assert_eq!(
            c14n(xml, &[]),
            r#"<a xmlns="urn:d"><p:b xmlns:p="urn:p"></p:b></a>"#
        );
    }

    #[test]
    fn inclusive_prefix_list_is_honoured() {
        let xml = r#"<a xmlns:u="urn:u"><b/></a>"#;
        assert_eq!(c14n(xml, &["u"]), r#"<a xmlns:u="urn:u"><b></b></a>"#);
        assert_eq!(c14n(xml, &[]), "<a><b></b></a>");
    }

    #[test]
    fn subtree_pulls_ancestor_namespaces_it_uses() {
        let xml = r#"<samlp:Response xmlns:samlp="urn:p" xmlns:saml="urn:a"><saml:Assertion ID="_a"><saml:Issuer>idp</saml:Issuer></saml:Assertion></samlp:Response>"#;
        assert_eq!(
            c14n_subtree(xml, "Assertion"),
            r#"<saml:Assertion xmlns:saml="urn:a" ID="_a"><saml:Issuer>idp</saml:Issuer></saml:Assertion>"#
        );
    }

    #[test]
    fn prefixed_attributes_declare_their_namespace() {
        let xml = r#"<r xmlns:x="urn:x"><e x:k="v" a="1"/></r>"#;
        assert_eq!(
            c14n_subtree(xml, "e"),
            r#"<e xmlns:x="urn:x" a="1" x:k="v"></e>"#
        );
    }

    #[test]
    fn default_namespace_is_undeclared_for_unqualified_child() {
        let xml = r#"<a xmlns="urn:d"><b xmlns=""/></a>"#;
        assert_eq!(c14n(xml, &[]), r#"<a xmlns="urn:d"><b xmlns=""></b></a>"#);
    }

    #[test]
    fn comments_only_with_comments_mode() {
        let xml = "<a><!--x--><b>t</b></a>";
        let doc = Document::parse(xml).unwrap();
        let with = canonicalize(&doc, true, None, &[]).unwrap();
        assert_eq!(String::from_utf8(with).unwrap(), "<a><!--x--><b>t</b></a>");
        assert_eq!(c14n(xml, &[]), "<a><b>t</b></a>");
    }

    #[test]
    fn text_escaping_and_whitespace_are_kept() {
        assert_eq!(
            c14n("<a>\n  1 &lt; 2 &amp;&gt; <![CDATA[x<y]]>\n</a>", &[]),
            "<a>\n  1 &lt; 2 &amp;&gt; x&lt;y\n</a>"
        );
    }
}
