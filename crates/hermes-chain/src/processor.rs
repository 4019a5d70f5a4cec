//! Handler chain traversal state machine.
//!
//! [`ChainProcessor`] drives one exchange through a [`HandlerChain`]:
//!
//! ```text
//!                 ┌──────────── Pivot ────────────┐
//!                 │                               ▼
//!  Ready ──► OutboundRunning ◄──────────────► InboundRunning
//!                 │   protocol fault                 │
//!                 ▼                                  ▼
//!            FaultInbound                       FaultOutbound
//!                 │                                  │
//!                 └──────────────► Closed ◄──────────┘
//! ```
//!
//! Handlers run in list order outbound and reverse list order inbound.
//! Whatever path the exchange takes, every handler whose `handle_message` was
//! reached is closed exactly once, in reverse order of invocation.

use std::fmt;

use hermes_core::{Direction, Fault, HandlerOutcome, Message, MessageContext, Phase, Protocol};
use hermes_telemetry::metrics::record_handler_fault;
use tracing::{debug, warn};

use crate::chain::HandlerChain;

/// Message exchange point: whether the message is a request or a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mep {
    /// A request; a response may follow.
    Request,
    /// A response; never reverses.
    Response,
}

/// Where the reverse pass starts after a handler pivots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PivotReentry {
    /// The pivoting handler is called again for the reversed direction.
    #[default]
    Include,
    /// The reverse pass starts at the handler preceding the pivot.
    Skip,
}

/// Options for one chain traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcessorOptions {
    /// Binding protocol, used when a protocol fault becomes a fault message.
    pub protocol: Protocol,
    /// Reverse pass behaviour after a pivot.
    pub pivot_reentry: PivotReentry,
    /// Whether converted fault messages carry the full error chain.
    pub expose_error_chain: bool,
}

impl ProcessorOptions {
    /// Creates default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the binding protocol.
    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Sets the pivot reentry behaviour.
    pub fn with_pivot_reentry(mut self, pivot_reentry: PivotReentry) -> Self {
        self.pivot_reentry = pivot_reentry;
        self
    }

    /// Enables or disables the error chain in converted fault messages.
    pub fn with_error_chain(mut self, expose: bool) -> Self {
        self.expose_error_chain = expose;
        self
    }
}

/// Traversal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainState {
    /// Nothing has run yet.
    Ready,
    /// `handle_message` running in list order.
    OutboundRunning,
    /// `handle_message` running in reverse list order.
    InboundRunning,
    /// `handle_fault` running in list order.
    FaultOutbound,
    /// `handle_fault` running in reverse list order.
    FaultInbound,
    /// Handlers have been closed.
    Closed,
}

impl ChainState {
    fn running(direction: Direction) -> Self {
        match direction {
            Direction::Outbound => Self::OutboundRunning,
            Direction::Inbound => Self::InboundRunning,
        }
    }

    fn fault(direction: Direction) -> Self {
        match direction {
            Direction::Outbound => Self::FaultOutbound,
            Direction::Inbound => Self::FaultInbound,
        }
    }

    /// Returns `true` once the handlers are closed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Upper-case state label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "READY",
            Self::OutboundRunning => "OUTBOUND_RUNNING",
            Self::InboundRunning => "INBOUND_RUNNING",
            Self::FaultOutbound => "FAULT_OUTBOUND",
            Self::FaultInbound => "FAULT_INBOUND",
            Self::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for ChainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a traversal ended.
#[derive(Debug)]
#[must_use]
pub enum ChainOutcome {
    /// Every handler ran in the requested direction.
    Completed,
    /// A handler pivoted or raised a protocol fault and the reverse pass ran.
    /// The context now holds the message heading back, possibly a fault message.
    Reversed,
    /// Traversal stopped and no reverse pass was possible because no response
    /// is expected. Carries the fault, if one stopped it.
    Halted(Option<Fault>),
}

impl ChainOutcome {
    /// Returns `true` for [`ChainOutcome::Completed`].
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Returns `true` for [`ChainOutcome::Reversed`].
    pub fn is_reversed(&self) -> bool {
        matches!(self, Self::Reversed)
    }

    /// Returns `true` for [`ChainOutcome::Halted`].
    pub fn is_halted(&self) -> bool {
        matches!(self, Self::Halted(_))
    }
}

enum Stop {
    Pivot,
    Fault(Fault),
}

/// Drives a single exchange through a handler chain.
///
/// A processor is created per exchange; the chain it borrows handlers from is
/// shared.
#[derive(Debug)]
pub struct ChainProcessor {
    chain: HandlerChain,
    options: ProcessorOptions,
    state: ChainState,
    history: Vec<ChainState>,
}

impl ChainProcessor {
    /// Creates a processor with default options.
    pub fn new(chain: HandlerChain) -> Self {
        Self::with_options(chain, ProcessorOptions::default())
    }

    /// Creates a processor with the given options.
    pub fn with_options(chain: HandlerChain, options: ProcessorOptions) -> Self {
        Self {
            chain,
            options,
            state: ChainState::Ready,
            history: vec![ChainState::Ready],
        }
    }

    /// The chain being traversed.
    pub fn chain(&self) -> &HandlerChain {
        &self.chain
    }

    /// Current state.
    pub fn state(&self) -> ChainState {
        self.state
    }

    /// Every state entered so far, in order.
    pub fn history(&self) -> &[ChainState] {
        &self.history
    }

    /// Runs `handle_message` over the chain in `direction`.
    ///
    /// With `expect_response` set on a request, a pivot or protocol fault
    /// reverses the exchange, runs the reverse pass, and closes the touched
    /// handlers. A request that completes successfully leaves its handlers
    /// open for the response. Responses never expect a response.
    pub fn process_chain(
        &mut self,
        ctx: &mut MessageContext,
        direction: Direction,
        mep: Mep,
        expect_response: bool,
    ) -> Result<ChainOutcome, Fault> {
        if self.chain.is_empty() {
            return Ok(ChainOutcome::Completed);
        }

        let expect_response = expect_response && mep == Mep::Request;
        ctx.set_direction(direction);
        ctx.set_phase(Phase::Normal);
        self.transition(ctx, ChainState::running(direction));

        let order = self.order(direction);
        let mut invoked = Vec::with_capacity(order.len());
        let mut stop = None;

        for &index in &order {
            invoked.push(index);
            match self.call_handle_message(ctx, index) {
                HandlerOutcome::Continue => {}
                HandlerOutcome::Pivot => {
                    stop = Some(Stop::Pivot);
                    break;
                }
                HandlerOutcome::Fault(fault) => {
                    stop = Some(Stop::Fault(fault));
                    break;
                }
            }
        }

        let touched: Vec<usize> = invoked.iter().rev().copied().collect();

        match (stop, expect_response) {
            (None, true) => Ok(ChainOutcome::Completed),
            (None, false) => {
                self.close_after(ctx, mep, &order, &touched);
                Ok(ChainOutcome::Completed)
            }
            (Some(Stop::Pivot), true) => self.reverse_after_pivot(ctx, direction, &touched),
            (Some(Stop::Pivot), false) => {
                self.close_after(ctx, mep, &order, &touched);
                Ok(ChainOutcome::Halted(None))
            }
            (Some(Stop::Fault(fault)), true) if fault.is_protocol() => {
                self.reverse_after_fault(ctx, direction, &fault, &touched)
            }
            (Some(Stop::Fault(fault)), true) => {
                debug!(exchange_id = %ctx.id(), error = %fault, "handler failed, closing chain");
                self.close_indices(ctx, &touched);
                Err(fault)
            }
            (Some(Stop::Fault(fault)), false) => {
                self.close_after(ctx, mep, &order, &touched);
                match mep {
                    Mep::Request => {
                        warn!(
                            exchange_id = %ctx.id(),
                            error = %fault,
                            "handler fault on an exchange without a response"
                        );
                        Ok(ChainOutcome::Halted(Some(fault)))
                    }
                    Mep::Response => Err(fault),
                }
            }
        }
    }

    /// Runs `handle_fault` over the whole chain in `direction`, then closes
    /// every handler.
    ///
    /// Used by the server when the endpoint fails and by the client when a
    /// fault message arrives. Traversal stops at the first handler that
    /// pivots; a fault raised by `handle_fault` is returned after closing.
    pub fn process_fault(&mut self, ctx: &mut MessageContext, direction: Direction) -> Result<(), Fault> {
        if self.chain.is_empty() {
            return Ok(());
        }

        ctx.set_direction(direction);
        ctx.set_phase(Phase::Fault);
        self.transition(ctx, ChainState::fault(direction));

        let order = self.order(direction);
        let mut result = Ok(());
        for &index in &order {
            match self.call_handle_fault(ctx, index) {
                HandlerOutcome::Continue => {}
                HandlerOutcome::Pivot => break,
                HandlerOutcome::Fault(fault) => {
                    result = Err(fault);
                    break;
                }
            }
        }

        self.close_indices(ctx, &order);
        result
    }

    /// Closes every handler in `direction` order.
    ///
    /// Used when an exchange is abandoned while its handlers are still open,
    /// for instance when the transport fails after the request chain ran.
    pub fn close_all(&mut self, ctx: &MessageContext, direction: Direction) {
        if self.chain.is_empty() || self.state.is_terminal() {
            return;
        }
        let order = self.order(direction);
        self.close_indices(ctx, &order);
    }

    fn reverse_after_pivot(
        &mut self,
        ctx: &mut MessageContext,
        direction: Direction,
        touched: &[usize],
    ) -> Result<ChainOutcome, Fault> {
        let reversed = direction.reverse();
        ctx.set_direction(reversed);
        self.transition(ctx, ChainState::running(reversed));

        let skip = usize::from(self.options.pivot_reentry == PivotReentry::Skip);
        for &index in &touched[skip..] {
            match self.call_handle_message(ctx, index) {
                HandlerOutcome::Continue => {}
                HandlerOutcome::Pivot => {
                    debug!(exchange_id = %ctx.id(), "reverse pass stopped by handler");
                    break;
                }
                HandlerOutcome::Fault(fault) => {
                    self.close_indices(ctx, touched);
                    return Err(fault);
                }
            }
        }

        self.close_indices(ctx, touched);
        Ok(ChainOutcome::Reversed)
    }

    fn reverse_after_fault(
        &mut self,
        ctx: &mut MessageContext,
        direction: Direction,
        fault: &Fault,
        touched: &[usize],
    ) -> Result<ChainOutcome, Fault> {
        let reversed = direction.reverse();
        ctx.set_direction(reversed);
        ctx.set_phase(Phase::Fault);
        self.transition(ctx, ChainState::fault(reversed));

        if !ctx.message().is_fault() {
            match Message::from_fault(fault, self.options.protocol, self.options.expose_error_chain) {
                Ok(message) => {
                    ctx.set_message(message);
                }
                Err(err) => {
                    self.close_indices(ctx, touched);
                    return Err(err);
                }
            }
        }

        // The handler that raised the fault does not see it.
        for &index in &touched[1..] {
            match self.call_handle_fault(ctx, index) {
                HandlerOutcome::Continue => {}
                HandlerOutcome::Pivot => break,
                HandlerOutcome::Fault(err) => {
                    self.close_indices(ctx, touched);
                    return Err(err);
                }
            }
        }

        self.close_indices(ctx, touched);
        Ok(ChainOutcome::Reversed)
    }

    fn close_after(&mut self, ctx: &MessageContext, mep: Mep, order: &[usize], touched: &[usize]) {
        match mep {
            Mep::Request => self.close_indices(ctx, touched),
            // Every handler ran on the request, so all of them are open.
            Mep::Response => self.close_indices(ctx, order),
        }
    }

    fn close_indices(&mut self, ctx: &MessageContext, indices: &[usize]) {
        for &index in indices {
            if let Some(handler) = self.chain.get(index) {
                debug!(exchange_id = %ctx.id(), handler = handler.name(), "close");
                handler.close(ctx);
            }
        }
        self.transition(ctx, ChainState::Closed);
    }

    fn call_handle_message(&self, ctx: &mut MessageContext, index: usize) -> HandlerOutcome {
        let Some(handler) = self.chain.get(index) else {
            return HandlerOutcome::Continue;
        };
        debug!(
            exchange_id = %ctx.id(),
            handler = handler.name(),
            direction = %ctx.direction(),
            "handle_message"
        );
        let outcome = handler.handle_message(ctx);
        if let HandlerOutcome::Fault(fault) = &outcome {
            debug!(handler = handler.name(), error = %fault, "handle_message returned a fault");
            record_handler_fault(handler.name());
        }
        outcome
    }

    fn call_handle_fault(&self, ctx: &mut MessageContext, index: usize) -> HandlerOutcome {
        let Some(handler) = self.chain.get(index) else {
            return HandlerOutcome::Continue;
        };
        debug!(
            exchange_id = %ctx.id(),
            handler = handler.name(),
            direction = %ctx.direction(),
            "handle_fault"
        );
        let outcome = handler.handle_fault(ctx);
        if let HandlerOutcome::Fault(fault) = &outcome {
            debug!(handler = handler.name(), error = %fault, "handle_fault returned a fault");
            record_handler_fault(handler.name());
        }
        outcome
    }

    fn order(&self, direction: Direction) -> Vec<usize> {
        let len = self.chain.len();
        match direction {
            Direction::Outbound => (0..len).collect(),
            Direction::Inbound => (0..len).rev().collect(),
        }
    }

    fn transition(&mut self, ctx: &MessageContext, next: ChainState) {
        if self.state != next {
            debug!(exchange_id = %ctx.id(), from = %self.state, to = %next, "chain state");
            self.state = next;
            self.history.push(next);
        }
    }
}
