//! Exchange cleanup that survives cancellation.

use hermes_chain::ChainProcessor;
use hermes_core::{Direction, MessageContext};
use tracing::debug;

/// Owns the processor and context of one in-flight exchange.
///
/// Closing the touched handlers (and destroying them, for exchanges that own
/// their handler instances) happens in [`finish`](Self::finish) or, when the
/// exchange future is dropped mid-await, on drop.
pub(crate) struct ExchangeGuard {
    processor: ChainProcessor,
    ctx: MessageContext,
    close_direction: Direction,
    destroy: bool,
}

impl ExchangeGuard {
    /// Guards an exchange whose remaining handlers close in `close_direction`.
    pub(crate) fn new(processor: ChainProcessor, ctx: MessageContext, close_direction: Direction) -> Self {
        Self {
            processor,
            ctx,
            close_direction,
            destroy: false,
        }
    }

    /// Also destroys the chain's handlers once the exchange is over.
    pub(crate) fn destroying(mut self, destroy: bool) -> Self {
        self.destroy = destroy;
        self
    }

    pub(crate) fn parts(&mut self) -> (&mut ChainProcessor, &mut MessageContext) {
        (&mut self.processor, &mut self.ctx)
    }

    pub(crate) fn context(&self) -> &MessageContext {
        &self.ctx
    }

    /// Closes every handler not yet closed, then destroys them if owned.
    ///
    /// Only the first call has an effect.
    pub(crate) fn finish(&mut self) {
        self.processor.close_all(&self.ctx, self.close_direction);
        if std::mem::take(&mut self.destroy) {
            self.processor.chain().destroy_all();
        }
    }
}

impl Drop for ExchangeGuard {
    fn drop(&mut self) {
        if !self.processor.state().is_terminal() {
            debug!(exchange_id = %self.ctx.id(), state = %self.processor.state(), "exchange dropped before completion");
        }
        self.finish();
    }
}
