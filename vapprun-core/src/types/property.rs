//! Configuration properties and the `${...}` macro mini-language.
//!
//! A property value is either a literal default or, when the property type is
//! `expression`, one of two macro forms:
//!
//! - `${name}` copies the already-resolved value of `name` from the parent
//!   entity's environment.
//! - `${name:Network}` reads the `name` setting of the workspace IP pool
//!   configuration (`gateway`, `netmask`, `dns`, ...).

use crate::config::NetworkSettings;
use crate::error::{Result, VappError};
use crate::xml::{bool_str, parse_bool, XmlNode};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

/// Property type marking a macro.
pub const EXPRESSION_TYPE: &str = "expression";

/// Prefix of address-valued property types (`ip:<network>`).
pub const IP_TYPE_PREFIX: &str = "ip:";

/// The only network name a `${name:arg}` macro may reference.
pub const NETWORK_ARG: &str = "Network";

static MACRO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\$\{([\w\.]+)(:([\w\.]+))?\}$").expect("static regex is valid"));

/// A parsed macro expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Macro {
    /// `${name}`
    Assign(String),
    /// `${name:arg}`
    Lookup { name: String, arg: String },
}

impl Macro {
    /// Parse a macro string. Returns `None` if it is not one of the two forms.
    pub fn parse(value: &str) -> Option<Self> {
        let caps = MACRO_RE.captures(value)?;
        let name = caps[1].to_string();
        Some(match caps.get(3) {
            Some(arg) => Macro::Lookup { name, arg: arg.as_str().to_string() },
            None => Macro::Assign(name),
        })
    }
}

/// A configuration property on an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub key: String,
    /// Raw type: a plain type name, `ip:<network>`, or `expression`.
    pub ty: String,
    /// Literal default or macro string.
    pub value: String,
    user_configurable: bool,
    /// Parsed once at construction; `None` for literals and invalid macros.
    expr: Option<Macro>,
}

impl Property {
    pub fn new(
        key: impl Into<String>,
        ty: impl Into<String>,
        value: impl Into<String>,
        user_configurable: bool,
    ) -> Self {
        let ty = ty.into();
        let value = value.into();
        let is_macro = ty == EXPRESSION_TYPE;
        let expr = if is_macro { Macro::parse(&value) } else { None };
        Self {
            key: key.into(),
            ty,
            value,
            // A macro is never user configurable.
            user_configurable: user_configurable && !is_macro,
            expr,
        }
    }

    pub fn is_ip(&self) -> bool {
        self.ty.starts_with(IP_TYPE_PREFIX)
    }

    pub fn is_macro(&self) -> bool {
        self.ty == EXPRESSION_TYPE
    }

    pub fn is_user_configurable(&self) -> bool {
        self.user_configurable
    }

    /// Key referenced by an assignment macro (`${name}`), if this is one.
    pub fn assignee(&self) -> Option<&str> {
        match &self.expr {
            Some(Macro::Assign(name)) => Some(name),
            _ => None,
        }
    }

    /// Resolve the value this property contributes to the environment.
    ///
    /// Literal properties take the deploy parameter when user configurable and
    /// non-empty, otherwise their default. Macros resolve against the parent
    /// environment or the workspace network settings.
    pub fn effective_value(
        &self,
        deploy: &IndexMap<String, String>,
        parent_env: &IndexMap<String, String>,
        network: &NetworkSettings,
    ) -> Result<String> {
        if !self.is_macro() {
            let val = deploy.get(&self.key).map(|v| v.trim()).unwrap_or("");
            if !self.user_configurable || val.is_empty() {
                return Ok(self.value.clone());
            }
            return Ok(val.to_string());
        }

        match &self.expr {
            None => Err(VappError::InvalidExpression {
                key: self.key.clone(),
                expression: self.value.clone(),
            }),
            Some(Macro::Assign(name)) => {
                parent_env.get(name).cloned().ok_or_else(|| VappError::UndefinedReference {
                    key: self.key.clone(),
                    reference: name.clone(),
                })
            }
            Some(Macro::Lookup { name, arg }) => {
                if arg != NETWORK_ARG {
                    return Err(VappError::InvalidNetworkName {
                        key: self.key.clone(),
                        network: arg.clone(),
                    });
                }
                network.lookup(name).map(str::to_string).ok_or_else(|| {
                    VappError::InvalidExpression {
                        key: self.key.clone(),
                        expression: self.value.clone(),
                    }
                })
            }
        }
    }

    /// Read a `<property key=".." type=".." value=".." userConfigurable=".."/>`
    /// element. Elements without a key or type are skipped.
    pub fn from_xml(node: &XmlNode) -> Option<Self> {
        if node.tag != "property" {
            return None;
        }
        let key = node.attr("key");
        let ty = node.attr("type");
        if key.is_empty() || ty.is_empty() {
            return None;
        }
        Some(Self::new(key, ty, node.attr("value"), parse_bool(node.attr("userConfigurable"), true)))
    }

    pub fn to_xml(&self) -> XmlNode {
        XmlNode::new("property")
            .with_attr("key", &self.key)
            .with_attr("type", &self.ty)
            .with_attr("value", &self.value)
            .with_attr("userConfigurable", bool_str(self.user_configurable))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network() -> NetworkSettings {
        let mut n = NetworkSettings::default();
        n.set("gateway", "192.168.0.1");
        n.set("netmask", "255.255.255.0");
        n
    }

    fn deploy(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_macro_parse() {
        assert_eq!(Macro::parse("${web.ip}"), Some(Macro::Assign("web.ip".into())));
        assert_eq!(
            Macro::parse("${gateway:Network}"),
            Some(Macro::Lookup { name: "gateway".into(), arg: "Network".into() })
        );
        assert_eq!(Macro::parse("$web"), None);
        assert_eq!(Macro::parse("${a b}"), None);
        assert_eq!(Macro::parse("x${a}"), None);
    }

    #[test]
    fn test_plain_property_default() {
        let p = Property::new("motd", "string", "x", true);
        assert_eq!(p.effective_value(&deploy(&[("motd", "")]), &IndexMap::new(), &network()).unwrap(), "x");
        assert_eq!(p.effective_value(&IndexMap::new(), &IndexMap::new(), &network()).unwrap(), "x");
    }

    #[test]
    fn test_plain_property_user_override() {
        let p = Property::new("motd", "string", "x", true);
        let env = IndexMap::new();
        assert_eq!(
            p.effective_value(&deploy(&[("motd", "  hello ")]), &env, &network()).unwrap(),
            "hello"
        );
    }

    #[test]
    fn test_non_configurable_ignores_override() {
        let p = Property::new("motd", "string", "x", false);
        assert_eq!(
            p.effective_value(&deploy(&[("motd", "hello")]), &IndexMap::new(), &network()).unwrap(),
            "x"
        );
    }

    #[test]
    fn test_macro_is_never_user_configurable() {
        let p = Property::new("ip", EXPRESSION_TYPE, "${web.ip}", true);
        assert!(!p.is_user_configurable());
        assert_eq!(p.assignee(), Some("web.ip"));
    }

    #[test]
    fn test_assignment_macro_resolves_from_parent() {
        let p = Property::new("ip", EXPRESSION_TYPE, "${siblingKey}", false);
        let env = deploy(&[("siblingKey", "10.0.0.9")]);
        assert_eq!(p.effective_value(&IndexMap::new(), &env, &network()).unwrap(), "10.0.0.9");
    }

    #[test]
    fn test_assignment_macro_undefined_reference() {
        let p = Property::new("ip", EXPRESSION_TYPE, "${siblingKey}", false);
        let err = p.effective_value(&IndexMap::new(), &IndexMap::new(), &network()).unwrap_err();
        assert!(matches!(err, VappError::UndefinedReference { ref reference, .. } if reference == "siblingKey"));
    }

    #[test]
    fn test_network_macro() {
        let p = Property::new("gw", EXPRESSION_TYPE, "${gateway:Network}", false);
        assert_eq!(p.effective_value(&IndexMap::new(), &IndexMap::new(), &network()).unwrap(), "192.168.0.1");
        assert_eq!(p.assignee(), None);
    }

    #[test]
    fn test_network_macro_wrong_argument() {
        let p = Property::new("gw", EXPRESSION_TYPE, "${gateway:Foo}", false);
        let err = p.effective_value(&IndexMap::new(), &IndexMap::new(), &network()).unwrap_err();
        assert!(matches!(err, VappError::InvalidNetworkName { .. }));
    }

    #[test]
    fn test_network_macro_unknown_setting() {
        let p = Property::new("proxy", EXPRESSION_TYPE, "${httpProxy:Network}", false);
        let err = p.effective_value(&IndexMap::new(), &IndexMap::new(), &network()).unwrap_err();
        assert!(matches!(err, VappError::InvalidExpression { .. }));
    }

    #[test]
    fn test_invalid_macro_syntax() {
        let p = Property::new("bad", EXPRESSION_TYPE, "web.ip", false);
        assert!(matches!(
            p.effective_value(&IndexMap::new(), &IndexMap::new(), &network()),
            Err(VappError::InvalidExpression { .. })
        ));
    }

    #[test]
    fn test_from_xml() {
        let node = XmlNode::new("property")
            .with_attr("key", "web.ip")
            .with_attr("type", "ip:Network")
            .with_attr("value", "");
        let p = Property::from_xml(&node).unwrap();
        assert!(p.is_ip());
        assert!(p.is_user_configurable());

        assert!(Property::from_xml(&XmlNode::new("property").with_attr("key", "x")).is_none());
        assert!(Property::from_xml(&XmlNode::new("link")).is_none());
    }
}
