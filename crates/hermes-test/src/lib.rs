//! # Hermes Test
//!
//! Test utilities for Hermes handler chains.
//!
//! - [`EventLog`] - shared, ordered record of handler lifecycle callbacks
//! - [`ScriptedHandler`] - handler whose every callback is logged and whose
//!   outcome per direction is scripted with a [`Behavior`]
//! - [`AddNumbersEndpoint`], [`EchoEndpoint`], [`FailingEndpoint`] - fixture
//!   service implementations
//!
//! ## Example
//!
//! ```
//! use hermes_chain::{ChainProcessor, HandlerChain, Mep};
//! use hermes_core::{Direction, Message, MessageContext};
//! use hermes_test::{Behavior, EventLog, ScriptedHandler};
//!
//! let log = EventLog::new();
//! let chain = HandlerChain::builder()
//!     .handler(ScriptedHandler::logical("L1", &log))
//!     .handler(ScriptedHandler::logical("L2", &log).on_message_outbound(Behavior::Pivot))
//!     .build();
//!
//! let mut ctx = MessageContext::outbound(Message::default());
//! let mut processor = ChainProcessor::new(chain);
//! let outcome = processor
//!     .process_chain(&mut ctx, Direction::Outbound, Mep::Request, true)
//!     .unwrap();
//!
//! assert!(outcome.is_reversed());
//! assert_eq!(log.compact(), "L1m:L2m:L2m:L1m:L2c:L1c:");
//! ```

#![doc(html_root_url = "https://docs.rs/hermes-test/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod events;
mod fixtures;
mod scripted;

pub use events::{Event, EventKind, EventLog};
pub use fixtures::{add_numbers_port, AddNumbersEndpoint, EchoEndpoint, FailingEndpoint};
pub use scripted::{Behavior, ScriptedHandler};
