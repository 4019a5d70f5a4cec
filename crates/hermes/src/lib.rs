//! # Hermes
//!
//! A handler chain dispatch pipeline in the style of the JAX-WS handler
//! framework: ordered logical and protocol handlers around a service
//! endpoint, with message reversal, fault propagation and scoped context
//! properties.
//!
//! ## Quick Start
//!
//! ```rust
//! use hermes::prelude::*;
//! use serde_json::json;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Fault> {
//!     let transport = LocalTransport::new();
//!     let endpoint = FnEndpoint::new(|request: EndpointRequest| async move { Ok(request.payload) });
//!     let port = PortInfo::new(QName::local("EchoService"), QName::local("EchoPort"), Protocol::Soap11);
//!     transport.bind("local://localhost/echo", ServerRuntime::new(port, StaticResolver::default(), endpoint))?;
//!
//!     let audit = FnHandler::logical("Audit", |ctx: &mut MessageContext| {
//!         ctx.set_property_scoped("audited", true, Scope::Application);
//!         HandlerOutcome::Continue
//!     });
//!     let dispatcher = Dispatcher::builder("local://localhost/echo", transport)
//!         .chain(HandlerChain::builder().handler(audit).build())
//!         .build()?;
//!
//!     let response = dispatcher.invoke(Request::new(json!({"ping": 1}))).await?;
//!     assert_eq!(response.payload(), &json!({"ping": 1}));
//!     assert_eq!(response.property("audited"), Some(&json!(true)));
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! Handlers are sorted logical first, then protocol. A request travels the
//! chain in list order on the way out and in reverse on the way in:
//!
//! ```text
//! Client → L1 → L2 → P1 → P2 → Transport → P2 → P1 → L2 → L1 → Endpoint
//!                                                               ↓
//! Client ← L1 ← L2 ← P1 ← P2 ← Transport ← P2 ← P1 ← L2 ← L1 ←──┘
//! ```
//!
//! A handler may pivot (reverse the message early) or fault (switch the
//! touched handlers to fault processing). Every touched handler is closed
//! exactly once.

#![doc(html_root_url = "https://docs.rs/hermes/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Re-export core types
pub use hermes_core as core;

// Re-export chain processing
pub use hermes_chain as chain;

// Re-export client, server and transport
pub use hermes_dispatch as dispatch;

// Re-export observability
pub use hermes_telemetry as telemetry;

// Re-export configuration
pub use hermes_config as config;

/// Commonly used types.
///
/// ```rust
/// use hermes::prelude::*;
/// ```
pub mod prelude {
    pub use hermes_core::{
        ApplicationContext, Direction, ExecutionError, Fault, FaultCode, FnHandler, Handler,
        HandlerKind, HandlerOutcome, HeaderBlock, Message, MessageContext, Phase, Protocol, QName,
        Scope,
    };

    pub use hermes_chain::{
        ChainOutcome, ChainProcessor, ConfiguredResolver, HandlerChain, HandlerChainDescriptor,
        HandlerDescriptor, HandlerRegistry, HandlerResolver, Mep, PivotReentry, PortInfo,
        StaticResolver,
    };

    pub use hermes_dispatch::{
        AsyncHandler, Dispatcher, Endpoint, EndpointRequest, FnEndpoint, InvocationOptions,
        LocalTransport, OneWayFaultPolicy, Request, Response, ResponseFuture, ServerConfig,
        ServerRuntime, SharedExecutor, Transport,
    };

    pub use hermes_config::{ConfigLoader, HermesConfig};
}
