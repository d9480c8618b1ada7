//! Minimal XML node tree for the workspace configuration files.
//!
//! `vapprun.cfg`, `vm.cfg`, `vapp.cfg` and `deploy.cfg` are small documents
//! made of elements, attributes and trimmed text. They are read into an
//! [`XmlNode`] tree and written back with two-space indentation.

use crate::error::{Result, VappError};
use indexmap::IndexMap;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::path::Path;

/// An XML element with its attributes, text and child elements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlNode {
    pub tag: String,
    /// Attributes in document order.
    pub attrs: IndexMap<String, String>,
    /// Trimmed text content, `None` if the element has no text.
    pub text: Option<String>,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    pub fn new(tag: impl Into<String>) -> Self {
        Self { tag: tag.into(), ..Default::default() }
    }

    /// Element holding only text, e.g. `<gateway>192.168.0.1</gateway>`.
    pub fn text_node(tag: impl Into<String>, text: impl Into<String>) -> Self {
        Self { tag: tag.into(), text: Some(text.into()), ..Default::default() }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.attrs.insert(key.into(), value.to_string());
        self
    }

    pub fn with_child(mut self, child: XmlNode) -> Self {
        self.children.push(child);
        self
    }

    /// Attribute value, or empty string when absent.
    pub fn attr(&self, key: &str) -> &str {
        self.attrs.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn attr_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.attrs.get(key).map(String::as_str).unwrap_or(default)
    }

    pub fn attr_u32(&self, key: &str, default: u32) -> u32 {
        self.attrs.get(key).and_then(|v| v.trim().parse().ok()).unwrap_or(default)
    }

    pub fn attr_bool(&self, key: &str, default: bool) -> bool {
        match self.attrs.get(key) {
            Some(v) => parse_bool(v, default),
            None => default,
        }
    }

    /// First child element with the given tag.
    pub fn child(&self, tag: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.tag == tag)
    }

    /// Text of the first child with `tag` that carries text.
    pub fn child_text(&self, tag: &str) -> Option<&str> {
        self.children
            .iter()
            .find(|c| c.tag == tag && c.text.is_some())
            .and_then(|c| c.text.as_deref())
    }

    /// Parse a document from a string. `path` is only used for diagnostics.
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        let xml_err = |reason: String| VappError::Xml { path: path.to_path_buf(), reason };

        let mut reader = Reader::from_str(content);
        reader.trim_text(true);

        let mut stack: Vec<XmlNode> = Vec::new();
        let mut root: Option<XmlNode> = None;

        loop {
            match reader.read_event().map_err(|e| xml_err(e.to_string()))? {
                Event::Start(e) => {
                    stack.push(Self::from_start(&e, path)?);
                }
                Event::Empty(e) => {
                    let node = Self::from_start(&e, path)?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(node),
                        None => root = Some(node),
                    }
                }
                Event::Text(t) => {
                    let text = t.unescape().map_err(|e| xml_err(e.to_string()))?;
                    Self::append_text(&mut stack, text.trim());
                }
                Event::CData(c) => {
                    let text = String::from_utf8_lossy(&c.into_inner()).to_string();
                    Self::append_text(&mut stack, text.trim());
                }
                Event::End(_) => {
                    let node = stack
                        .pop()
                        .ok_or_else(|| xml_err("unbalanced closing tag".to_string()))?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(node),
                        None => root = Some(node),
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(xml_err("unexpected end of document".to_string()));
        }
        root.ok_or_else(|| xml_err("document has no root element".to_string()))
    }

    /// Read and parse a file. Returns `Ok(None)` if the file does not exist.
    pub fn read_file(path: &Path) -> Result<Option<Self>> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content, path).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(VappError::io(path, e)),
        }
    }

    /// Serialize the node as a complete UTF-8 document.
    pub fn to_document(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(|e| VappError::Internal(format!("Failed to write XML: {}", e)))?;
        self.write_to(&mut writer)?;
        let mut out = String::from_utf8(writer.into_inner())
            .map_err(|e| VappError::Internal(format!("XML output is not UTF-8: {}", e)))?;
        out.push('\n');
        Ok(out)
    }

    /// Serialize and write to `path`, replacing any previous content.
    pub fn write_file(&self, path: &Path) -> Result<()> {
        let doc = self.to_document()?;
        std::fs::write(path, doc).map_err(|e| VappError::io(path, e))
    }

    fn write_to(&self, writer: &mut Writer<Vec<u8>>) -> Result<()> {
        let write_err = |e: quick_xml::Error| VappError::Internal(format!("Failed to write XML: {}", e));

        let mut start = BytesStart::new(self.tag.as_str());
        for (k, v) in &self.attrs {
            start.push_attribute((k.as_str(), v.as_str()));
        }

        if self.children.is_empty() && self.text.is_none() {
            writer.write_event(Event::Empty(start)).map_err(write_err)?;
            return Ok(());
        }

        writer.write_event(Event::Start(start)).map_err(write_err)?;
        if let Some(text) = &self.text {
            writer.write_event(Event::Text(BytesText::new(text.trim()))).map_err(write_err)?;
        }
        for child in &self.children {
            child.write_to(writer)?;
        }
        writer.write_event(Event::End(BytesEnd::new(self.tag.as_str()))).map_err(write_err)?;
        Ok(())
    }

    fn from_start(e: &BytesStart<'_>, path: &Path) -> Result<Self> {
        let xml_err = |reason: String| VappError::Xml { path: path.to_path_buf(), reason };

        let mut node = XmlNode::new(String::from_utf8_lossy(e.name().as_ref()).to_string());
        for attr in e.attributes() {
            let attr = attr.map_err(|e| xml_err(e.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
            let value = attr.unescape_value().map_err(|e| xml_err(e.to_string()))?;
            node.attrs.insert(key, value.to_string());
        }
        Ok(node)
    }

    fn append_text(stack: &mut [XmlNode], text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(node) = stack.last_mut() {
            match &mut node.text {
                Some(existing) => existing.push_str(text),
                None => node.text = Some(text.to_string()),
            }
        }
    }
}

/// Parse a boolean in the config-file convention (`true`, `1`, `yes`).
pub fn parse_bool(s: &str, default: bool) -> bool {
    let s = s.trim();
    if s.is_empty() {
        return default;
    }
    matches!(s.to_lowercase().as_str(), "true" | "1" | "yes")
}

pub fn bool_str(b: bool) -> &'static str {
    if b {
        "true"
    } else {
        "false"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_attributes_text_and_children() {
        let doc = r#"<?xml version="1.0"?>
<vapprun configVersion="1">
  <ipPool>
    <gateway> 192.168.0.1 </gateway>
    <dns></dns>
  </ipPool>
</vapprun>"#;
        let node = XmlNode::parse(doc, Path::new("vapprun.cfg")).unwrap();
        assert_eq!(node.tag, "vapprun");
        assert_eq!(node.attr("configVersion"), "1");
        let pool = node.child("ipPool").unwrap();
        assert_eq!(pool.child_text("gateway"), Some("192.168.0.1"));
        assert_eq!(pool.child_text("dns"), None);
        assert!(pool.child("dns").is_some());
    }

    #[test]
    fn test_write_then_parse_keeps_structure() {
        let node = XmlNode::new("deployParameters")
            .with_attr("allocationPolicy", "dhcp")
            .with_child(XmlNode::text_node("web.ip", "10.0.0.4"))
            .with_child(XmlNode::text_node("motd", "a & b"));
        let doc = node.to_document().unwrap();
        assert!(doc.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));

        let parsed = XmlNode::parse(&doc, Path::new("deploy.cfg")).unwrap();
        assert_eq!(parsed.attr("allocationPolicy"), "dhcp");
        assert_eq!(parsed.child_text("motd"), Some("a & b"));
        assert_eq!(parsed.children.len(), 2);
    }

    #[test]
    fn test_malformed_document_is_rejected() {
        let err = XmlNode::parse("<vm><link></vm>", Path::new("vm.cfg")).unwrap_err();
        assert!(matches!(err, VappError::Xml { .. }));
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(XmlNode::read_file(&dir.path().join("deploy.cfg")).unwrap().is_none());
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("TRUE", false));
        assert!(parse_bool("yes", false));
        assert!(!parse_bool("no", true));
        assert!(parse_bool("", true));
    }
}
