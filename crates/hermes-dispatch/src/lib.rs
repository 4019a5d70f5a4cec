//! # Hermes Dispatch
//!
//! Runs exchanges through handler chains on both sides of a connection.
//!
//! - [`Dispatcher`] - client side: outbound chain, transport, inbound chain,
//!   with synchronous, one-way, polling and callback invocation styles
//! - [`ServerRuntime`] - server side: per-exchange handler resolution,
//!   must-understand checking, inbound chain, [`Endpoint`], outbound or fault
//!   chain, close and destroy
//! - [`Transport`] - the seam between the two, with the in-process
//!   [`LocalTransport`]
//! - [`Executor`] - bounded async execution with cancellation, timeouts and
//!   observable shutdown
//!
//! ## Example
//!
//! ```
//! use hermes_chain::{PortInfo, StaticResolver};
//! use hermes_core::{Protocol, QName};
//! use hermes_dispatch::{Dispatcher, EndpointRequest, FnEndpoint, LocalTransport, Request, ServerRuntime};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let port = PortInfo::new(QName::new("urn:echo", "Echo"), QName::new("urn:echo", "EchoPort"), Protocol::Soap11);
//! let endpoint = FnEndpoint::new(|request: EndpointRequest| async move { Ok(request.payload) });
//!
//! let transport = LocalTransport::new();
//! transport
//!     .bind("local://server/echo", ServerRuntime::new(port.clone(), StaticResolver::default(), endpoint))
//!     .unwrap();
//!
//! let dispatcher = Dispatcher::builder("local://server/echo", transport).port(port).build().unwrap();
//! let response = dispatcher.invoke(Request::new(json!({"hello": "world"}))).await.unwrap();
//! assert_eq!(response.payload(), &json!({"hello": "world"}));
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/hermes-dispatch/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod client;
mod executor;
mod guard;
mod response;
mod server;
mod task;
mod transport;

pub use client::{Dispatcher, DispatcherBuilder, InvocationOptions, OneWayFaultPolicy, Request, Response};
pub use executor::{Executor, ExecutorConfig, SharedExecutor};
pub use response::{AsyncHandler, ResponseFuture};
pub use server::{Endpoint, EndpointRequest, FnEndpoint, ServerConfig, ServerRuntime};
pub use task::{TaskId, TaskInfo, TaskStats, TaskStatus};
pub use transport::{LocalAddress, LocalTransport, Transport, LOCAL_SCHEME};
