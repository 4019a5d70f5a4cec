//! Handler trait and callback outcomes.
//!
//! A handler is a unit inserted into the message exchange path. The chain
//! drives its lifecycle in a fixed order:
//!
//! 1. [`Handler::init`] once after construction
//! 2. [`Handler::headers`] when the runtime checks must-understand headers
//! 3. [`Handler::handle_message`] / [`Handler::handle_fault`] per direction
//! 4. [`Handler::close`] once at the end of the exchange
//! 5. [`Handler::destroy`] once when the chain is torn down
//!
//! Callbacks return a [`HandlerOutcome`] instead of signalling control flow
//! through errors.

use std::fmt;
use std::sync::Arc;

use crate::context::MessageContext;
use crate::error::Fault;
use crate::qname::QName;

/// Whether a handler works on the payload only or on the full protocol message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    /// Operates on the message payload. Sorted ahead of protocol handlers.
    Logical,
    /// Operates on the full protocol message including headers.
    Protocol,
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Logical => f.write_str("logical"),
            Self::Protocol => f.write_str("protocol"),
        }
    }
}

/// Result of a `handle_message` or `handle_fault` callback.
#[derive(Debug)]
pub enum HandlerOutcome {
    /// Continue with the next handler.
    Continue,
    /// Stop here and reverse the direction of the exchange.
    Pivot,
    /// Abort with a fault.
    Fault(Fault),
}

impl HandlerOutcome {
    /// Returns `true` for [`HandlerOutcome::Continue`].
    pub fn is_continue(&self) -> bool {
        matches!(self, Self::Continue)
    }

    /// Returns `true` for [`HandlerOutcome::Pivot`].
    pub fn is_pivot(&self) -> bool {
        matches!(self, Self::Pivot)
    }

    /// Returns `true` for [`HandlerOutcome::Fault`].
    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Fault(_))
    }
}

impl From<bool> for HandlerOutcome {
    fn from(proceed: bool) -> Self {
        if proceed {
            Self::Continue
        } else {
            Self::Pivot
        }
    }
}

impl From<Fault> for HandlerOutcome {
    fn from(fault: Fault) -> Self {
        Self::Fault(fault)
    }
}

impl From<Result<bool, Fault>> for HandlerOutcome {
    fn from(result: Result<bool, Fault>) -> Self {
        match result {
            Ok(proceed) => proceed.into(),
            Err(fault) => Self::Fault(fault),
        }
    }
}

/// A processing unit in a handler chain.
///
/// Handlers are shared read-only across the exchanges that use a chain, so
/// callbacks take `&self`. Per-exchange state belongs in the
/// [`MessageContext`].
pub trait Handler: Send + Sync + 'static {
    /// Returns the handler name used in logs and lifecycle traces.
    fn name(&self) -> &str;

    /// Returns the handler kind.
    fn kind(&self) -> HandlerKind;

    /// Called once after construction, before any message is handled.
    fn init(&self) {}

    /// Headers this handler understands.
    fn headers(&self) -> Vec<QName> {
        Vec::new()
    }

    /// Handles a normal message in the current context direction.
    fn handle_message(&self, ctx: &mut MessageContext) -> HandlerOutcome;

    /// Handles a fault message in the current context direction.
    fn handle_fault(&self, ctx: &mut MessageContext) -> HandlerOutcome {
        let _ = ctx;
        HandlerOutcome::Continue
    }

    /// Called once at the end of the exchange.
    fn close(&self, ctx: &MessageContext) {
        let _ = ctx;
    }

    /// Called once when the chain is torn down.
    fn destroy(&self) {}
}

/// A reference-counted handler.
pub type BoxedHandler = Arc<dyn Handler>;

impl fmt::Debug for dyn Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .finish()
    }
}

/// A handler built from a closure over `handle_message`.
///
/// # Example
///
/// ```
/// use hermes_core::{FnHandler, Handler, HandlerKind, HandlerOutcome};
///
/// let handler = FnHandler::logical("audit", |ctx| {
///     ctx.set_property("audited", true);
///     HandlerOutcome::Continue
/// });
/// assert_eq!(handler.kind(), HandlerKind::Logical);
/// ```
pub struct FnHandler<F> {
    name: String,
    kind: HandlerKind,
    f: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&mut MessageContext) -> HandlerOutcome + Send + Sync + 'static,
{
    /// Creates a handler of the given kind.
    pub fn new(name: impl Into<String>, kind: HandlerKind, f: F) -> Self {
        Self {
            name: name.into(),
            kind,
            f,
        }
    }

    /// Creates a logical handler.
    pub fn logical(name: impl Into<String>, f: F) -> Self {
        Self::new(name, HandlerKind::Logical, f)
    }

    /// Creates a protocol handler.
    pub fn protocol(name: impl Into<String>, f: F) -> Self {
        Self::new(name, HandlerKind::Protocol, f)
    }
}

impl<F> Handler for FnHandler<F>
where
    F: Fn(&mut MessageContext) -> HandlerOutcome + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> HandlerKind {
        self.kind
    }

    fn handle_message(&self, ctx: &mut MessageContext) -> HandlerOutcome {
        (self.f)(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    #[test]
    fn test_outcome_from_bool() {
        assert!(HandlerOutcome::from(true).is_continue());
        assert!(HandlerOutcome::from(false).is_pivot());
    }

    #[test]
    fn test_outcome_from_result() {
        let outcome: HandlerOutcome = Err::<bool, _>(Fault::client("no")).into();
        assert!(outcome.is_fault());
        let outcome: HandlerOutcome = Ok::<_, Fault>(false).into();
        assert!(outcome.is_pivot());
    }

    #[test]
    fn test_fn_handler_runs_closure() {
        let handler = FnHandler::protocol("stamp", |ctx| {
            ctx.set_property("stamped", true);
            HandlerOutcome::Continue
        });
        let mut ctx = MessageContext::outbound(Message::default());
        assert!(handler.handle_message(&mut ctx).is_continue());
        assert_eq!(ctx.property("stamped"), Some(&serde_json::json!(true)));
        assert_eq!(handler.kind(), HandlerKind::Protocol);
        assert!(handler.headers().is_empty());
    }

    #[test]
    fn test_default_fault_callback_continues() {
        let handler = FnHandler::logical("noop", |_| HandlerOutcome::Continue);
        let mut ctx = MessageContext::inbound(Message::default());
        assert!(handler.handle_fault(&mut ctx).is_continue());
        let boxed: BoxedHandler = Arc::new(handler);
        assert!(format!("{boxed:?}").contains("noop"));
    }
}
