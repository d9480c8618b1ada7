//! OVF environment document generation.

use crate::inventory::VAppEnvironment;
use indexmap::IndexMap;
use quick_xml::escape::escape;
use std::fmt::Write;

const ENV_HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Environment xmlns="http://schemas.dmtf.org/ovf/environment/1"
             xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
             xmlns:oe="http://schemas.dmtf.org/ovf/environment/1"
             oe:id=""#;

const PLATFORM_SECTION: &str = "
   <PlatformSection>
       <Kind>vapprun</Kind>
       <Version>1.0</Version>
       <Vendor>VMware, Inc.</Vendor>
       <Locale>en_US</Locale>
   </PlatformSection>";

/// Environment of one entity plus the other members of its vApp.
#[derive(Debug, Clone)]
pub struct OvfEnv {
    /// Entity the document is generated for.
    pub id: String,
    /// Resolved properties per entity name; must contain `id`.
    pub env: VAppEnvironment,
}

impl OvfEnv {
    pub fn new(id: impl Into<String>, env: VAppEnvironment) -> Self {
        Self { id: id.into(), env }
    }

    /// Render the document. Entity and property order follow `env`.
    pub fn create_doc(&self) -> String {
        let mut out = String::with_capacity(1024);
        out.push_str(ENV_HEADER);
        out.push_str(&escape(self.id.as_str()));
        out.push_str("\">");
        out.push_str(PLATFORM_SECTION);

        let empty = IndexMap::new();
        push_property_section(&mut out, self.env.get(&self.id).unwrap_or(&empty));

        for (id, props) in self.env.iter().filter(|(id, _)| **id != self.id) {
            let _ = write!(out, "\n    <Entity oe:id=\"{}\">", escape(id.as_str()));
            push_property_section(&mut out, props);
            out.push_str("\n    </Entity>");
        }
        out.push_str("\n</Environment>\n");
        out
    }
}

fn push_property_section(out: &mut String, props: &IndexMap<String, String>) {
    out.push_str("\n   <PropertySection>");
    for (key, value) in props {
        let _ = write!(
            out,
            "\n      <Property oe:key=\"{}\" oe:value=\"{}\"/>",
            escape(key.as_str()),
            escape(value.as_str())
        );
    }
    out.push_str("\n   </PropertySection>");
}
