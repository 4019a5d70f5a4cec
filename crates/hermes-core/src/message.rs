//! Messages flowing through a handler chain.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Fault, FaultCode};
use crate::qname::QName;

/// The binding protocol an exchange runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// SOAP 1.1 over HTTP.
    #[default]
    Soap11,
    /// SOAP 1.2 over HTTP.
    Soap12,
    /// Plain XML/HTTP binding. Fault messages cannot be built for it.
    Http,
}

impl Protocol {
    /// Returns `true` for SOAP bindings.
    pub fn is_soap(&self) -> bool {
        matches!(self, Self::Soap11 | Self::Soap12)
    }

    /// Parses a binding token such as `soap11` or `##SOAP11_HTTP`.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim() {
            "soap11" | "##SOAP11_HTTP" | "##SOAP11_HTTP_MTOM" => Some(Self::Soap11),
            "soap12" | "##SOAP12_HTTP" | "##SOAP12_HTTP_MTOM" => Some(Self::Soap12),
            "http" | "##XML_HTTP" => Some(Self::Http),
            _ => None,
        }
    }

    /// Returns the short token for this protocol.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Soap11 => "soap11",
            Self::Soap12 => "soap12",
            Self::Http => "http",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A header block attached to a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderBlock {
    /// Header name.
    pub name: QName,
    /// Header content.
    pub value: Value,
    /// Whether the receiver must understand this header.
    #[serde(default)]
    pub must_understand: bool,
}

impl HeaderBlock {
    /// Creates an optional header block.
    pub fn new(name: QName, value: impl Into<Value>) -> Self {
        Self {
            name,
            value: value.into(),
            must_understand: false,
        }
    }

    /// Marks this header as must-understand.
    #[must_use]
    pub fn must_understand(mut self) -> Self {
        self.must_understand = true;
        self
    }
}

/// The body of a fault message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultInfo {
    /// Fault code.
    pub code: FaultCode,
    /// Human-readable fault string.
    pub fault_string: String,
    /// Optional structured detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

/// A message: a payload, its header blocks and, for fault messages, the fault body.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Message {
    payload: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    headers: Vec<HeaderBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fault: Option<FaultInfo>,
}

impl Message {
    /// Creates a message with the given payload.
    pub fn new(payload: impl Into<Value>) -> Self {
        Self {
            payload: payload.into(),
            headers: Vec::new(),
            fault: None,
        }
    }

    /// Creates a fault message.
    pub fn from_fault_info(info: FaultInfo) -> Self {
        Self {
            payload: Value::Null,
            headers: Vec::new(),
            fault: Some(info),
        }
    }

    /// Converts a fault into a fault message for the given protocol.
    ///
    /// Fails with a runtime fault when the protocol has no fault representation.
    pub fn from_fault(fault: &Fault, protocol: Protocol, expose_error_chain: bool) -> Result<Self, Fault> {
        if !protocol.is_soap() {
            return Err(Fault::runtime(format!(
                "cannot convert a fault into a message for the {protocol} binding"
            )));
        }
        Ok(Self::from_fault_info(fault.to_fault_info(expose_error_chain)))
    }

    /// Adds a header block.
    #[must_use]
    pub fn with_header(mut self, header: HeaderBlock) -> Self {
        self.headers.push(header);
        self
    }

    /// The payload.
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Mutable access to the payload.
    pub fn payload_mut(&mut self) -> &mut Value {
        &mut self.payload
    }

    /// Replaces the payload.
    pub fn set_payload(&mut self, payload: impl Into<Value>) {
        self.payload = payload.into();
    }

    /// Consumes the message, returning the payload.
    pub fn into_payload(self) -> Value {
        self.payload
    }

    /// The header blocks.
    pub fn headers(&self) -> &[HeaderBlock] {
        &self.headers
    }

    /// Mutable access to the header blocks.
    pub fn headers_mut(&mut self) -> &mut Vec<HeaderBlock> {
        &mut self.headers
    }

    /// Adds a header block.
    pub fn add_header(&mut self, header: HeaderBlock) {
        self.headers.push(header);
    }

    /// Finds a header block by name.
    pub fn header(&self, name: &QName) -> Option<&HeaderBlock> {
        self.headers.iter().find(|h| &h.name == name)
    }

    /// Returns `true` if this is a fault message.
    pub fn is_fault(&self) -> bool {
        self.fault.is_some()
    }

    /// The fault body, for fault messages.
    pub fn fault_info(&self) -> Option<&FaultInfo> {
        self.fault.as_ref()
    }

    /// Mutable access to the fault body, for fault messages.
    pub fn fault_info_mut(&mut self) -> Option<&mut FaultInfo> {
        self.fault.as_mut()
    }

    /// Converts a fault message back into the protocol fault it carries.
    pub fn to_fault(&self) -> Option<Fault> {
        self.fault.clone().map(Fault::from)
    }
}
