#![forbid(unsafe_code)]

//! XML document handling for samlsec.
//!
//! Wraps `roxmltree` with the pieces signature processing needs: a
//! whitespace-preservation flag, ID resolution that tolerates schema-less
//! SAML documents, node sets for canonicalization, and in-place edits of
//! the source text.

pub mod document;
pub mod nodeset;
pub mod writer;
pub mod xpath;

pub use document::{LoadOptions, XmlDocument};
pub use nodeset::NodeSet;
pub use writer::XmlWriter;

/// Return roxmltree parsing options that allow DTD.
///
/// roxmltree does not expand external entities, so DTDs are safe to accept.
pub fn parsing_options() -> roxmltree::ParsingOptions {
    roxmltree::ParsingOptions {
        allow_dtd: true,
        ..roxmltree::ParsingOptions::default()
    }
}
