//! Parent links between entities.

use crate::xml::{bool_str, XmlNode};
use std::fmt;

/// Default position in the parent's start sequence.
pub const DEFAULT_START_ORDER: u32 = 30;

/// Default start/stop wait, in poll steps.
pub const DEFAULT_WAIT: u32 = 30;

/// Record on a child naming its parent and its start/stop behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Name of the parent entity.
    pub name: String,
    /// Ascending for start, descending for stop.
    pub start_order: u32,
    pub start_wait: u32,
    pub stop_wait: u32,
    /// Poll the guest for an address after power-on.
    pub wait_for_tools: bool,
}

impl Link {
    pub fn new(parent: impl Into<String>) -> Self {
        Self::with_order(parent, DEFAULT_START_ORDER)
    }

    pub fn with_order(parent: impl Into<String>, start_order: u32) -> Self {
        Self {
            name: parent.into(),
            start_order,
            start_wait: DEFAULT_WAIT,
            stop_wait: DEFAULT_WAIT,
            wait_for_tools: true,
        }
    }

    /// Read a `<link>` element. Links without a parent name are skipped.
    pub fn from_xml(node: &XmlNode) -> Option<Self> {
        if node.tag != "link" || node.attr("name").is_empty() {
            return None;
        }
        Some(Self {
            name: node.attr("name").to_string(),
            start_order: node.attr_u32("startOrder", DEFAULT_START_ORDER),
            start_wait: node.attr_u32("startWait", DEFAULT_WAIT),
            stop_wait: node.attr_u32("stopWait", DEFAULT_WAIT),
            wait_for_tools: node.attr_bool("waitForTools", true),
        })
    }

    pub fn to_xml(&self) -> XmlNode {
        XmlNode::new("link")
            .with_attr("name", &self.name)
            .with_attr("startOrder", self.start_order)
            .with_attr("startWait", self.start_wait)
            .with_attr("stopWait", self.stop_wait)
            .with_attr("waitForTools", bool_str(self.wait_for_tools))
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[startOrder: {}  startWait: {} waitForTools: {} stopWait: {}]",
            self.start_order, self.start_wait, self.wait_for_tools, self.stop_wait
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let link = Link::from_xml(&XmlNode::new("link").with_attr("name", "app")).unwrap();
        assert_eq!(link.start_order, 30);
        assert_eq!(link.start_wait, 30);
        assert_eq!(link.stop_wait, 30);
        assert!(link.wait_for_tools);
    }

    #[test]
    fn test_parse_attributes() {
        let node = XmlNode::new("link")
            .with_attr("name", "app")
            .with_attr("startOrder", "10")
            .with_attr("startWait", "120")
            .with_attr("waitForTools", "false");
        let link = Link::from_xml(&node).unwrap();
        assert_eq!(link.start_order, 10);
        assert_eq!(link.start_wait, 120);
        assert!(!link.wait_for_tools);
        assert_eq!(Link::from_xml(&link.to_xml()), Some(link));
    }

    #[test]
    fn test_display() {
        let link = Link::with_order("app", 10);
        assert_eq!(link.to_string(), "[startOrder: 10  startWait: 30 waitForTools: true stopWait: 30]");
    }

    #[test]
    fn test_nameless_link_skipped() {
        assert!(Link::from_xml(&XmlNode::new("link")).is_none());
    }
}
