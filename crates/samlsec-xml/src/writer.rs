#![forbid(unsafe_code)]

//! XML writing utilities over quick-xml, used to build signature elements.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use samlsec_core::Error;

/// A small XML writer wrapping `quick_xml::Writer`.
pub struct XmlWriter {
    writer: quick_xml::Writer<Vec<u8>>,
}

impl XmlWriter {
    /// Create a new XML writer.
    pub fn new() -> Self {
        Self {
            writer: quick_xml::Writer::new(Vec::new()),
        }
    }

    /// Start an element with the given name and attributes.
    pub fn start_element(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), Error> {
        self.write(Event::Start(start(name, attrs)))
    }

    /// Write an empty element (self-closing).
    pub fn empty_element(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), Error> {
        self.write(Event::Empty(start(name, attrs)))
    }

    /// End the current element.
    pub fn end_element(&mut self, name: &str) -> Result<(), Error> {
        self.write(Event::End(BytesEnd::new(name)))
    }

    /// Write escaped text content.
    pub fn write_text(&mut self, text: &str) -> Result<(), Error> {
        self.write(Event::Text(BytesText::new(text)))
    }

    /// Write `<name attrs>text</name>`.
    pub fn text_element(
        &mut self,
        name: &str,
        attrs: &[(&str, &str)],
        text: &str,
    ) -> Result<(), Error> {
        self.start_element(name, attrs)?;
        self.write_text(text)?;
        self.end_element(name)
    }

    /// Finish writing and return the XML bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.writer.into_inner()
    }

    /// Finish writing and return the XML as a string.
    pub fn into_string(self) -> Result<String, Error> {
        String::from_utf8(self.into_bytes()).map_err(|e| Error::XmlStructure(e.to_string()))
    }

    fn write(&mut self, event: Event<'_>) -> Result<(), Error> {
        self.writer
            .write_event(event)
            .map_err(|e| Error::XmlStructure(e.to_string()))
    }
}

impl Default for XmlWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn start<'a>(name: &'a str, attrs: &[(&'a str, &'a str)]) -> BytesStart<'a> {
    let mut elem = BytesStart::new(name);
    for attr in attrs {
        elem.push_attribute(*attr);
    }
    elem
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_nested_elements() {
        let mut w = XmlWriter::new();
        w.start_element("ds:KeyInfo", &[("xmlns:ds", "urn:x")]).unwrap();
        w.empty_element("ds:Transform", &[("Algorithm", "a&b")]).unwrap();
        w.text_element("ds:KeyName", &[], "k<1>").unwrap();
        w.end_element("ds:KeyInfo").unwrap();
        assert_eq!(
            w.into_string().unwrap(),
            r#"<ds:KeyInfo xmlns:ds="urn:x"><ds:Transform Algorithm="a&amp;b"/><ds:KeyName>k&lt;1&gt;</ds:KeyName></ds:KeyInfo>"#
        );
    }
}
