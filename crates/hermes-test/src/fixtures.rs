//! Fixture endpoints.

use futures_util::future::BoxFuture;
use hermes_chain::PortInfo;
use hermes_core::{Fault, Protocol, QName};
use hermes_dispatch::{Endpoint, EndpointRequest};
use serde_json::{json, Value};

use crate::events::{EventKind, EventLog};

const ADD_NUMBERS_NS: &str = "http://duke.example.org";

/// Port metadata of the add-numbers service.
pub fn add_numbers_port(binding: Protocol) -> PortInfo {
    PortInfo::new(
        QName::new(ADD_NUMBERS_NS, "AddNumbersService"),
        QName::new(ADD_NUMBERS_NS, "AddNumbersPort"),
        binding,
    )
}

/// Adds `arg0` and `arg1`, answering `{"return": sum}`.
///
/// Negative numbers are refused with a `Server` fault carrying both numbers
/// in its detail. Missing arguments are a `Client` fault.
#[derive(Debug, Clone, Default)]
pub struct AddNumbersEndpoint {
    log: Option<EventLog>,
}

impl AddNumbersEndpoint {
    /// Creates the endpoint.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an `Endpoint INVOKE` event on every call.
    pub fn with_log(log: &EventLog) -> Self {
        Self { log: Some(log.clone()) }
    }

    fn add(payload: &Value) -> Result<Value, Fault> {
        let arg = |name: &str| {
            payload
                .get(name)
                .and_then(Value::as_i64)
                .ok_or_else(|| Fault::client(format!("{name} is required")))
        };
        let (a, b) = (arg("arg0")?, arg("arg1")?);
        if a < 0 || b < 0 {
            return Err(Fault::server("Negative numbers can't be added!")
                .with_detail(json!({ "info": format!("Numbers: {a}, {b}") })));
        }
        Ok(json!({ "return": a + b }))
    }
}

impl Endpoint for AddNumbersEndpoint {
    fn invoke(&self, request: EndpointRequest) -> BoxFuture<'_, Result<Value, Fault>> {
        if let Some(log) = &self.log {
            log.record("Endpoint", EventKind::Invoke);
        }
        Box::pin(async move { Self::add(&request.payload) })
    }
}

/// Answers with the request payload.
#[derive(Debug, Clone, Default)]
pub struct EchoEndpoint {
    log: Option<EventLog>,
    understood: Vec<QName>,
}

impl EchoEndpoint {
    /// Creates the endpoint.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an `Endpoint INVOKE` event on every call.
    pub fn with_log(log: &EventLog) -> Self {
        Self {
            log: Some(log.clone()),
            understood: Vec::new(),
        }
    }

    /// Declares a must-understand header the endpoint processes.
    pub fn understanding(mut self, header: QName) -> Self {
        self.understood.push(header);
        self
    }
}

impl Endpoint for EchoEndpoint {
    fn invoke(&self, request: EndpointRequest) -> BoxFuture<'_, Result<Value, Fault>> {
        if let Some(log) = &self.log {
            log.record("Endpoint", EventKind::Invoke);
        }
        Box::pin(async move { Ok(request.payload) })
    }

    fn understood_headers(&self) -> Vec<QName> {
        self.understood.clone()
    }
}

/// Always fails with the configured fault.
#[derive(Debug, Clone)]
pub struct FailingEndpoint {
    protocol: bool,
    message: String,
}

impl FailingEndpoint {
    /// Fails with a `Server` protocol fault.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self {
            protocol: true,
            message: message.into(),
        }
    }

    /// Fails with a runtime fault.
    pub fn runtime(message: impl Into<String>) -> Self {
        Self {
            protocol: false,
            message: message.into(),
        }
    }
}

impl Endpoint for FailingEndpoint {
    fn invoke(&self, _request: EndpointRequest) -> BoxFuture<'_, Result<Value, Fault>> {
        let fault = if self.protocol {
            Fault::server(self.message.clone())
        } else {
            Fault::runtime(self.message.clone())
        };
        Box::pin(async move { Err(fault) })
    }
}
