//! Declarative handler chain descriptors.
//!
//! Descriptors are loaded from configuration and matched against ports by
//! [`ConfiguredResolver`](crate::resolver::ConfiguredResolver).
//!
//! ```toml
//! [[handler_chains]]
//! port_name_pattern = "{urn:addnumbers}AddNumbers*"
//! protocol_bindings = ["##SOAP11_HTTP"]
//!
//! [[handler_chains.handlers]]
//! name = "AddNumbersLogicalHandler"
//! soap_roles = ["urn:roles:audit"]
//! ```

use serde::{Deserialize, Serialize};

/// One handler entry of a chain descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HandlerDescriptor {
    /// Handler name.
    pub name: String,
    /// Registry key of the factory building this handler. Defaults to `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory: Option<String>,
    /// SOAP roles the handler acts in.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub soap_roles: Vec<String>,
}

impl HandlerDescriptor {
    /// Creates a descriptor whose factory key is its name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            factory: None,
            soap_roles: Vec::new(),
        }
    }

    /// Sets the factory key.
    #[must_use]
    pub fn with_factory(mut self, factory: impl Into<String>) -> Self {
        self.factory = Some(factory.into());
        self
    }

    /// Adds a SOAP role.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.soap_roles.push(role.into());
        self
    }

    /// The registry key used to build this handler.
    pub fn factory_key(&self) -> &str {
        self.factory.as_deref().unwrap_or(&self.name)
    }
}

/// A handler chain and the ports it applies to.
///
/// A chain applies to a port when every constraint it declares matches.
/// A chain declaring no constraints applies to every port.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HandlerChainDescriptor {
    /// Pattern over the service name, `{namespace}local` with `*` wildcards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name_pattern: Option<String>,
    /// Pattern over the port name, `{namespace}local` with `*` wildcards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_name_pattern: Option<String>,
    /// Binding tokens (`##SOAP11_HTTP`, `soap12`, ...). Empty matches every binding.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub protocol_bindings: Vec<String>,
    /// Handlers in declared order.
    #[serde(default)]
    pub handlers: Vec<HandlerDescriptor>,
}

impl HandlerChainDescriptor {
    /// Creates a descriptor with no constraints.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the chain to matching service names.
    #[must_use]
    pub fn service_name_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.service_name_pattern = Some(pattern.into());
        self
    }

    /// Restricts the chain to matching port names.
    #[must_use]
    pub fn port_name_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.port_name_pattern = Some(pattern.into());
        self
    }

    /// Restricts the chain to a binding.
    #[must_use]
    pub fn protocol_binding(mut self, token: impl Into<String>) -> Self {
        self.protocol_bindings.push(token.into());
        self
    }

    /// Appends a handler.
    #[must_use]
    pub fn handler(mut self, handler: HandlerDescriptor) -> Self {
        self.handlers.push(handler);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_key_defaults_to_name() {
        let handler = HandlerDescriptor::new("Audit");
        assert_eq!(handler.factory_key(), "Audit");
        assert_eq!(handler.with_factory("audit-v2").factory_key(), "audit-v2");
    }

    #[test]
    fn test_deserialize_from_json() {
        let json = r###"{
            "port_name_pattern": "{urn:a}Port*",
            "protocol_bindings": ["##SOAP11_HTTP"],
            "handlers": [{"name": "L", "soap_roles": ["urn:role"]}]
        }"###;
        let chain: HandlerChainDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(chain.port_name_pattern.as_deref(), Some("{urn:a}Port*"));
        assert_eq!(chain.handlers[0].soap_roles, vec!["urn:role".to_string()]);
        assert!(chain.service_name_pattern.is_none());
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let json = r#"{"handlers": [{"name": "L", "class": "x"}]}"#;
        assert!(serde_json::from_str::<HandlerChainDescriptor>(json).is_err());
    }
}
