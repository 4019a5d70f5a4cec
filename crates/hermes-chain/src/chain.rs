//! Ordered handler chains.
//!
//! A [`HandlerChain`] is immutable once built and cheap to clone, so one chain
//! can be shared read-only by any number of concurrent exchanges.

use std::fmt;
use std::sync::Arc;

use hermes_core::{BoxedHandler, Handler, HandlerKind, QName};
use tracing::debug;

/// An ordered, immutable list of handlers.
///
/// On construction the handlers are stably sorted so that every logical
/// handler precedes every protocol handler. Declared order is otherwise kept.
#[derive(Clone)]
pub struct HandlerChain {
    handlers: Arc<[BoxedHandler]>,
    logical_len: usize,
}

impl HandlerChain {
    /// Creates a chain from handlers in declared order.
    pub fn new(handlers: Vec<BoxedHandler>) -> Self {
        let (mut logical, protocol): (Vec<_>, Vec<_>) = handlers
            .into_iter()
            .partition(|h| h.kind() == HandlerKind::Logical);
        let logical_len = logical.len();
        logical.extend(protocol);

        Self {
            handlers: logical.into(),
            logical_len,
        }
    }

    /// Creates an empty chain.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a chain builder.
    pub fn builder() -> HandlerChainBuilder {
        HandlerChainBuilder::new()
    }

    /// Number of handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns `true` if the chain has no handlers.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Number of logical handlers; they occupy the front of the chain.
    pub fn logical_len(&self) -> usize {
        self.logical_len
    }

    /// Returns the handler at `index`.
    pub fn get(&self, index: usize) -> Option<&BoxedHandler> {
        self.handlers.get(index)
    }

    /// Iterates over handlers in chain order.
    pub fn iter(&self) -> impl Iterator<Item = &BoxedHandler> {
        self.handlers.iter()
    }

    /// Handler names in chain order.
    pub fn names(&self) -> Vec<&str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    /// Headers understood by the protocol handlers of this chain.
    pub fn understood_headers(&self) -> Vec<QName> {
        self.handlers[self.logical_len..]
            .iter()
            .flat_map(|h| h.headers())
            .collect()
    }

    /// Calls `init` on every handler in chain order.
    pub fn init_all(&self) {
        for handler in self.handlers.iter() {
            debug!(handler = handler.name(), "initializing handler");
            handler.init();
        }
    }

    /// Calls `destroy` on every handler in chain order.
    pub fn destroy_all(&self) {
        for handler in self.handlers.iter() {
            debug!(handler = handler.name(), "destroying handler");
            handler.destroy();
        }
    }
}

impl Default for HandlerChain {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl fmt::Debug for HandlerChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerChain")
            .field("handlers", &self.names())
            .field("logical_len", &self.logical_len)
            .finish()
    }
}

impl FromIterator<BoxedHandler> for HandlerChain {
    fn from_iter<I: IntoIterator<Item = BoxedHandler>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Builder for [`HandlerChain`].
#[derive(Default)]
pub struct HandlerChainBuilder {
    handlers: Vec<BoxedHandler>,
}

impl HandlerChainBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a handler.
    #[must_use]
    pub fn handler<H: Handler>(mut self, handler: H) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    /// Appends a shared handler.
    #[must_use]
    pub fn shared(mut self, handler: BoxedHandler) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Builds the chain.
    pub fn build(self) -> HandlerChain {
        HandlerChain::new(self.handlers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hermes_core::{FnHandler, HandlerOutcome, MessageContext};

    struct HeaderAware;

    impl Handler for HeaderAware {
        fn name(&self) -> &str {
            "HeaderAware"
        }

        fn kind(&self) -> HandlerKind {
            HandlerKind::Protocol
        }

        fn headers(&self) -> Vec<QName> {
            vec![QName::new("urn:h", "Trace")]
        }

        fn handle_message(&self, _ctx: &mut MessageContext) -> HandlerOutcome {
            HandlerOutcome::Continue
        }
    }

    fn noop(ctx: &mut MessageContext) -> HandlerOutcome {
        let _ = ctx;
        HandlerOutcome::Continue
    }

    #[test]
    fn test_logical_handlers_sorted_first() {
        let chain = HandlerChain::builder()
            .handler(FnHandler::protocol("S1", noop))
            .handler(FnHandler::logical("L2", noop))
            .handler(FnHandler::protocol("S2", noop))
            .handler(FnHandler::logical("L1", noop))
            .build();

        assert_eq!(chain.names(), vec!["L2", "L1", "S1", "S2"]);
        assert_eq!(chain.logical_len(), 2);
        assert_eq!(chain.len(), 4);
    }

    #[test]
    fn test_understood_headers_from_protocol_handlers() {
        let chain = HandlerChain::builder()
            .handler(FnHandler::logical("L", noop))
            .handler(HeaderAware)
            .build();

        assert_eq!(chain.understood_headers(), vec![QName::new("urn:h", "Trace")]);
    }

    #[test]
    fn test_empty_chain() {
        let chain = HandlerChain::empty();
        assert!(chain.is_empty());
        assert!(chain.names().is_empty());
        chain.init_all();
        chain.destroy_all();
    }

    #[test]
    fn test_clone_shares_handlers() {
        let chain: HandlerChain = vec![Arc::new(FnHandler::logical("L", noop)) as BoxedHandler]
            .into_iter()
            .collect();
        let copy = chain.clone();
        assert!(Arc::ptr_eq(
            chain.get(0).unwrap(),
            copy.get(0).unwrap()
        ));
        assert!(format!("{chain:?}").contains("\"L\""));
    }
}
