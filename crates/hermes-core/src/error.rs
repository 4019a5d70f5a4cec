//! Fault taxonomy for Hermes.
//!
//! Every failure that crosses a handler, endpoint or transport boundary is a
//! [`Fault`]. The async APIs never surface a raw fault; they wrap it in
//! [`ExecutionError::Failed`] so callers handle a single error shape.
//!
//! | Variant | Raised by | Reaches the caller as |
//! |---|---|---|
//! | `Protocol` | handlers and endpoints, on purpose | a fault message with code, string and detail |
//! | `Runtime` | unexpected handler/endpoint failures | a `Server` fault message on the wire |
//! | `Connection` | the transport | "service invocation failed" with the transport cause |
//! | `HandlerChain` | the chain itself | a `Server` fault message |

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::message::FaultInfo;

/// Result type alias using [`Fault`].
pub type FaultResult<T> = Result<T, Fault>;

/// Fault codes carried by fault messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultCode {
    /// The message was malformed or the caller is at fault.
    Client,
    /// The receiver failed to process a valid message.
    Server,
    /// A must-understand header was not understood.
    MustUnderstand,
    /// The envelope version is not supported.
    VersionMismatch,
}

impl FaultCode {
    /// Returns the wire name of this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Client => "Client",
            Self::Server => "Server",
            Self::MustUnderstand => "MustUnderstand",
            Self::VersionMismatch => "VersionMismatch",
        }
    }
}

impl std::fmt::Display for FaultCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fault raised while dispatching a message exchange.
#[derive(Error, Debug)]
pub enum Fault {
    /// A structured fault raised intentionally by a handler or endpoint.
    #[error("{fault_string}")]
    Protocol {
        /// Fault code.
        code: FaultCode,
        /// Human-readable fault string.
        fault_string: String,
        /// Optional structured detail.
        detail: Option<Value>,
    },

    /// An unexpected failure inside a handler or endpoint.
    #[error("{message}")]
    Runtime {
        /// Description of the failure.
        message: String,
        /// Underlying error, if any.
        #[source]
        source: Option<anyhow::Error>,
    },

    /// The transport could not deliver the message.
    #[error("service invocation failed")]
    Connection {
        /// The transport failure.
        #[source]
        source: TransportError,
    },

    /// A handler signalled failure outside the protocol fault path.
    #[error("handler {handler} failed: {message}")]
    HandlerChain {
        /// Name of the failing handler.
        handler: String,
        /// Description of the failure.
        message: String,
    },
}

impl Fault {
    /// Creates a protocol fault with the given code.
    pub fn protocol(code: FaultCode, fault_string: impl Into<String>) -> Self {
        Self::Protocol {
            code,
            fault_string: fault_string.into(),
            detail: None,
        }
    }

    /// Creates a `Client` protocol fault.
    pub fn client(fault_string: impl Into<String>) -> Self {
        Self::protocol(FaultCode::Client, fault_string)
    }

    /// Creates a `Server` protocol fault.
    pub fn server(fault_string: impl Into<String>) -> Self {
        Self::protocol(FaultCode::Server, fault_string)
    }

    /// Creates a `MustUnderstand` fault naming the headers that were not understood.
    pub fn must_understand<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: std::fmt::Display,
    {
        let names: Vec<String> = headers.into_iter().map(|h| h.to_string()).collect();
        Self::protocol(
            FaultCode::MustUnderstand,
            format!("must understand headers not understood: {}", names.join(", ")),
        )
    }

    /// Creates a runtime fault without an underlying cause.
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a runtime fault wrapping an underlying error.
    pub fn runtime_with_source(message: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Runtime {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Creates a connection fault from a transport error.
    pub fn connection(source: TransportError) -> Self {
        Self::Connection { source }
    }

    /// Creates a handler-chain fault.
    pub fn handler_chain(handler: impl Into<String>, message: impl Into<String>) -> Self {
        Self::HandlerChain {
            handler: handler.into(),
            message: message.into(),
        }
    }

    /// Attaches structured detail to a protocol fault. Other variants are returned unchanged.
    #[must_use]
    pub fn with_detail(self, detail: Value) -> Self {
        match self {
            Self::Protocol {
                code, fault_string, ..
            } => Self::Protocol {
                code,
                fault_string,
                detail: Some(detail),
            },
            other => other,
        }
    }

    /// Returns `true` if this is a protocol fault.
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol { .. })
    }

    /// Returns `true` if this is a runtime fault.
    pub fn is_runtime(&self) -> bool {
        matches!(self, Self::Runtime { .. })
    }

    /// Returns `true` if this is a connection fault.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    /// Returns `true` if this is a handler-chain fault.
    pub fn is_handler_chain(&self) -> bool {
        matches!(self, Self::HandlerChain { .. })
    }

    /// Returns the fault code this fault maps to on the wire.
    pub fn code(&self) -> FaultCode {
        match self {
            Self::Protocol { code, .. } => *code,
            _ => FaultCode::Server,
        }
    }

    /// Returns the fault string this fault maps to on the wire.
    pub fn fault_string(&self) -> String {
        self.to_string()
    }

    /// Returns the detail of a protocol fault.
    pub fn detail(&self) -> Option<&Value> {
        match self {
            Self::Protocol { detail, .. } => detail.as_ref(),
            _ => None,
        }
    }

    /// Returns the transport error behind a connection fault.
    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            Self::Connection { source } => Some(source),
            _ => None,
        }
    }

    /// Converts this fault into the shape carried by a fault message.
    ///
    /// With `expose_error_chain` set, the fault string of non-protocol faults
    /// carries every cause in the error chain.
    pub fn to_fault_info(&self, expose_error_chain: bool) -> FaultInfo {
        let fault_string = if expose_error_chain && !self.is_protocol() {
            error_chain(self)
        } else {
            self.fault_string()
        };

        FaultInfo {
            code: self.code(),
            fault_string,
            detail: self.detail().cloned(),
        }
    }
}

impl From<FaultInfo> for Fault {
    fn from(info: FaultInfo) -> Self {
        Self::Protocol {
            code: info.code,
            fault_string: info.fault_string,
            detail: info.detail,
        }
    }
}

impl From<TransportError> for Fault {
    fn from(source: TransportError) -> Self {
        Self::connection(source)
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut rendered = err.to_string();
    let mut current = err.source();
    while let Some(cause) = current {
        rendered.push_str("\n  caused by: ");
        rendered.push_str(&cause.to_string());
        current = cause.source();
    }
    rendered
}

/// Transport-level failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The host part of the endpoint address could not be resolved.
    #[error("unknown host: {host}")]
    UnknownHost {
        /// The unresolved host.
        host: String,
    },

    /// The remote side refused the connection.
    #[error("connection refused: {address}")]
    ConnectionRefused {
        /// The endpoint address.
        address: String,
    },

    /// The host is known but nothing is bound at the address.
    #[error("not found: {address}")]
    NotFound {
        /// The endpoint address.
        address: String,
    },

    /// The endpoint address is malformed.
    #[error("invalid endpoint address: {address}")]
    InvalidAddress {
        /// The endpoint address.
        address: String,
    },
}

impl TransportError {
    /// Creates an unknown host error.
    pub fn unknown_host(host: impl Into<String>) -> Self {
        Self::UnknownHost { host: host.into() }
    }

    /// Creates a connection refused error.
    pub fn connection_refused(address: impl Into<String>) -> Self {
        Self::ConnectionRefused {
            address: address.into(),
        }
    }

    /// Creates a not found error.
    pub fn not_found(address: impl Into<String>) -> Self {
        Self::NotFound {
            address: address.into(),
        }
    }

    /// Creates an invalid address error.
    pub fn invalid_address(address: impl Into<String>) -> Self {
        Self::InvalidAddress {
            address: address.into(),
        }
    }
}

/// Errors surfaced through the polling and callback APIs.
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// The exchange failed; the source is the original fault.
    #[error("execution failed")]
    Failed(#[source] Fault),

    /// The response was cancelled before it completed.
    #[error("execution cancelled")]
    Cancelled,

    /// The executor was shut down before the response completed.
    #[error("executor is shut down")]
    ExecutorShutdown,

    /// Waiting for the response exceeded the given timeout.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl ExecutionError {
    /// Returns the wrapped fault, if the exchange itself failed.
    pub fn fault(&self) -> Option<&Fault> {
        match self {
            Self::Failed(fault) => Some(fault),
            _ => None,
        }
    }

    /// Consumes the error and returns the wrapped fault.
    pub fn into_fault(self) -> Option<Fault> {
        match self {
            Self::Failed(fault) => Some(fault),
            _ => None,
        }
    }

    /// Returns `true` if the executor was shut down.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::ExecutorShutdown)
    }

    /// Returns `true` if the response was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns `true` if waiting timed out.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl From<Fault> for ExecutionError {
    fn from(fault: Fault) -> Self {
        Self::Failed(fault)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_protocol_fault_display() {
        let fault = Fault::server("I don't like the value 99");
        assert_eq!(fault.to_string(), "I don't like the value 99");
        assert_eq!(fault.code(), FaultCode::Server);
        assert!(fault.is_protocol());
    }

    #[test]
    fn test_with_detail_only_touches_protocol() {
        let fault = Fault::client("bad").with_detail(serde_json::json!({"field": "arg0"}));
        assert_eq!(fault.detail(), Some(&serde_json::json!({"field": "arg0"})));

        let runtime = Fault::runtime("boom").with_detail(serde_json::json!(1));
        assert!(runtime.detail().is_none());
    }

    #[test]
    fn test_connection_fault_keeps_transport_cause() {
        let fault = Fault::connection(TransportError::unknown_host("this.is.a.bad.endpoint"));
        assert_eq!(fault.to_string(), "service invocation failed");

        let cause = fault.source().map(ToString::to_string).unwrap_or_default();
        assert!(cause.contains("this.is.a.bad.endpoint"));
        assert!(matches!(
            fault.transport_error(),
            Some(TransportError::UnknownHost { .. })
        ));
    }

    #[test]
    fn test_runtime_fault_source_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let fault = Fault::runtime_with_source("endpoint failed", io);
        assert!(fault.is_runtime());
        assert!(fault.source().is_some());

        let info = fault.to_fault_info(true);
        assert_eq!(info.code, FaultCode::Server);
        assert!(info.fault_string.contains("endpoint failed"));
        assert!(info.fault_string.contains("disk gone"));

        let terse = fault.to_fault_info(false);
        assert_eq!(terse.fault_string, "endpoint failed");
    }

    #[test]
    fn test_fault_info_round_trip_into_protocol() {
        let info = FaultInfo {
            code: FaultCode::Client,
            fault_string: "nope".to_string(),
            detail: None,
        };
        let fault = Fault::from(info);
        assert!(fault.is_protocol());
        assert_eq!(fault.code(), FaultCode::Client);
    }

    #[test]
    fn test_must_understand_lists_headers() {
        let fault = Fault::must_understand(["{urn:a}One", "{urn:a}Two"]);
        assert_eq!(fault.code(), FaultCode::MustUnderstand);
        assert!(fault.to_string().contains("{urn:a}Two"));
    }

    #[test]
    fn test_execution_error_wraps_fault() {
        let err = ExecutionError::from(Fault::server("custom"));
        assert_eq!(err.to_string(), "execution failed");
        assert_eq!(
            err.source().map(ToString::to_string),
            Some("custom".to_string())
        );
        assert!(err.fault().is_some_and(Fault::is_protocol));
    }

    #[test]
    fn test_execution_error_predicates() {
        assert!(ExecutionError::ExecutorShutdown.is_shutdown());
        assert!(ExecutionError::Cancelled.is_cancelled());
        assert!(ExecutionError::Timeout(Duration::from_millis(5)).is_timeout());
        assert!(ExecutionError::Cancelled.into_fault().is_none());
    }
}
