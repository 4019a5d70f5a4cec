//! # Hermes Chain
//!
//! Handler chain traversal for Hermes.
//!
//! A [`HandlerChain`] is an ordered, immutable list of handlers with every
//! logical handler ahead of every protocol handler. A [`ChainProcessor`] walks
//! the chain for one exchange: outbound in list order, inbound in reverse,
//! turning around on a pivot or a protocol fault when a response is expected,
//! and closing exactly the handlers it invoked.
//!
//! Handlers for a port come from a [`HandlerResolver`]. [`ConfiguredResolver`]
//! matches declared [`HandlerChainDescriptor`]s against service name, port name
//! and binding, and builds fresh handlers from a [`HandlerRegistry`].
//!
//! ```
//! use hermes_chain::{ChainProcessor, HandlerChain, Mep};
//! use hermes_core::{Direction, FnHandler, HandlerOutcome, Message, MessageContext};
//!
//! let chain = HandlerChain::builder()
//!     .handler(FnHandler::logical("stamp", |ctx: &mut MessageContext| {
//!         ctx.set_property("stamped", true);
//!         HandlerOutcome::Continue
//!     }))
//!     .build();
//!
//! let mut ctx = MessageContext::outbound(Message::default());
//! let mut processor = ChainProcessor::new(chain);
//! let outcome = processor
//!     .process_chain(&mut ctx, Direction::Outbound, Mep::Request, true)
//!     .unwrap();
//! assert!(outcome.is_completed());
//! assert_eq!(ctx.property_as::<bool>("stamped"), Some(true));
//! ```

#![doc(html_root_url = "https://docs.rs/hermes-chain/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod chain;
mod descriptor;
mod processor;
mod resolver;

pub use chain::{HandlerChain, HandlerChainBuilder};
pub use descriptor::{HandlerChainDescriptor, HandlerDescriptor};
pub use processor::{
    ChainOutcome, ChainProcessor, ChainState, Mep, PivotReentry, ProcessorOptions,
};
pub use resolver::{
    does_pattern_match, ConfiguredResolver, FnResolver, HandlerFactory, HandlerRegistry,
    HandlerResolver, PortInfo, StaticResolver,
};
