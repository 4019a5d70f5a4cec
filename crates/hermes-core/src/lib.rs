//! # Hermes Core
//!
//! Core types and traits for the Hermes handler chain pipeline.
//!
//! This crate provides the foundational types used throughout Hermes:
//!
//! - [`Handler`] - Lifecycle callbacks invoked by a handler chain
//! - [`HandlerOutcome`] - `Continue | Pivot | Fault` result of a callback
//! - [`MessageContext`] - Per-exchange state with APPLICATION/HANDLER scoped properties
//! - [`ApplicationContext`] - The application-visible view of exchange properties
//! - [`Message`] - Payload, header blocks and an optional fault
//! - [`Fault`] - Protocol, runtime, connection and handler-chain faults
//! - [`ExecutionError`] - Uniform wrapper for faults surfaced through async APIs

#![doc(html_root_url = "https://docs.rs/hermes-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod context;
mod error;
mod handler;
mod message;
mod qname;

pub use context::{
    ApplicationContext, Direction, ExchangeId, MessageContext, Phase, RequestContext,
    ResponseContext, Scope, WEBMETHOD_EXCEPTION,
};
pub use error::{ExecutionError, Fault, FaultCode, FaultResult, TransportError};
pub use handler::{BoxedHandler, FnHandler, Handler, HandlerKind, HandlerOutcome};
pub use message::{FaultInfo, HeaderBlock, Message, Protocol};
pub use qname::{QName, QNameError};
