//! Handlers with scripted outcomes.

use std::fmt;
use std::sync::Arc;

use hermes_core::{
    Direction, Fault, Handler, HandlerKind, HandlerOutcome, MessageContext, QName,
};

use crate::events::{EventKind, EventLog};

/// Scripted result of a callback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Behavior {
    /// Return [`HandlerOutcome::Continue`].
    #[default]
    Continue,
    /// Return [`HandlerOutcome::Pivot`].
    Pivot,
    /// Raise a `Server` protocol fault with this fault string.
    ProtocolFault(String),
    /// Raise a runtime fault with this message.
    RuntimeFault(String),
}

impl Behavior {
    /// Protocol fault behaviour.
    pub fn protocol_fault(message: impl Into<String>) -> Self {
        Self::ProtocolFault(message.into())
    }

    /// Runtime fault behaviour.
    pub fn runtime_fault(message: impl Into<String>) -> Self {
        Self::RuntimeFault(message.into())
    }

    fn outcome(&self) -> HandlerOutcome {
        match self {
            Self::Continue => HandlerOutcome::Continue,
            Self::Pivot => HandlerOutcome::Pivot,
            Self::ProtocolFault(message) => HandlerOutcome::Fault(Fault::server(message.clone())),
            Self::RuntimeFault(message) => HandlerOutcome::Fault(Fault::runtime(message.clone())),
        }
    }
}

type Action = Arc<dyn Fn(&mut MessageContext) + Send + Sync>;

/// A handler that logs every callback to an [`EventLog`].
///
/// Outcomes are fixed at construction: one [`Behavior`] per message
/// direction and one for faults.
#[derive(Clone)]
pub struct ScriptedHandler {
    name: String,
    kind: HandlerKind,
    log: EventLog,
    outbound: Behavior,
    inbound: Behavior,
    fault: Behavior,
    headers: Vec<QName>,
    action: Option<Action>,
}

impl ScriptedHandler {
    /// Creates a handler that always continues.
    pub fn new(name: impl Into<String>, kind: HandlerKind, log: &EventLog) -> Self {
        Self {
            name: name.into(),
            kind,
            log: log.clone(),
            outbound: Behavior::Continue,
            inbound: Behavior::Continue,
            fault: Behavior::Continue,
            headers: Vec::new(),
            action: None,
        }
    }

    /// Creates a logical handler.
    pub fn logical(name: impl Into<String>, log: &EventLog) -> Self {
        Self::new(name, HandlerKind::Logical, log)
    }

    /// Creates a protocol handler.
    pub fn protocol(name: impl Into<String>, log: &EventLog) -> Self {
        Self::new(name, HandlerKind::Protocol, log)
    }

    /// Scripts `handle_message` in both directions.
    pub fn on_message(mut self, behavior: Behavior) -> Self {
        self.outbound = behavior.clone();
        self.inbound = behavior;
        self
    }

    /// Scripts outbound `handle_message`.
    pub fn on_message_outbound(mut self, behavior: Behavior) -> Self {
        self.outbound = behavior;
        self
    }

    /// Scripts inbound `handle_message`.
    pub fn on_message_inbound(mut self, behavior: Behavior) -> Self {
        self.inbound = behavior;
        self
    }

    /// Scripts `handle_fault`.
    pub fn on_fault(mut self, behavior: Behavior) -> Self {
        self.fault = behavior;
        self
    }

    /// Declares a header the handler understands.
    pub fn with_header(mut self, header: QName) -> Self {
        self.headers.push(header);
        self
    }

    /// Runs `action` on every `handle_message`, before the scripted outcome.
    pub fn with_action<F>(mut self, action: F) -> Self
    where
        F: Fn(&mut MessageContext) + Send + Sync + 'static,
    {
        self.action = Some(Arc::new(action));
        self
    }
}

impl Handler for ScriptedHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> HandlerKind {
        self.kind
    }

    fn init(&self) {
        self.log.record(&self.name, EventKind::PostConstruct);
    }

    fn headers(&self) -> Vec<QName> {
        self.log.record(&self.name, EventKind::GetHeaders);
        self.headers.clone()
    }

    fn handle_message(&self, ctx: &mut MessageContext) -> HandlerOutcome {
        let direction = ctx.direction();
        self.log.record(&self.name, EventKind::HandleMessage(direction));
        if let Some(action) = &self.action {
            action(ctx);
        }
        match direction {
            Direction::Outbound => self.outbound.outcome(),
            Direction::Inbound => self.inbound.outcome(),
        }
    }

    fn handle_fault(&self, ctx: &mut MessageContext) -> HandlerOutcome {
        self.log.record(&self.name, EventKind::HandleFault(ctx.direction()));
        self.fault.outcome()
    }

    fn close(&self, _ctx: &MessageContext) {
        self.log.record(&self.name, EventKind::Close);
    }

    fn destroy(&self) {
        self.log.record(&self.name, EventKind::PreDestroy);
    }
}

impl fmt::Debug for ScriptedHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedHandler")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("outbound", &self.outbound)
            .field("inbound", &self.inbound)
            .field("fault", &self.fault)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hermes_core::Message;

    #[test]
    fn test_scripted_outcomes_per_direction() {
        let log = EventLog::new();
        let handler = ScriptedHandler::logical("L1", &log)
            .on_message_inbound(Behavior::Pivot)
            .on_fault(Behavior::protocol_fault("nope"));

        let mut ctx = MessageContext::outbound(Message::default());
        assert!(handler.handle_message(&mut ctx).is_continue());
        ctx.set_direction(Direction::Inbound);
        assert!(handler.handle_message(&mut ctx).is_pivot());
        assert!(handler.handle_fault(&mut ctx).is_fault());
        assert_eq!(log.compact(), "L1m:L1m:L1f:");
    }

    #[test]
    fn test_action_runs_before_outcome() {
        let log = EventLog::new();
        let handler = ScriptedHandler::protocol("P", &log)
            .with_action(|ctx| {
                ctx.set_property("seen", true);
            })
            .on_message(Behavior::runtime_fault("broken"));

        let mut ctx = MessageContext::outbound(Message::default());
        let outcome = handler.handle_message(&mut ctx);
        assert!(ctx.contains_property("seen"));
        match outcome {
            HandlerOutcome::Fault(fault) => assert!(fault.is_runtime()),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_lifecycle_callbacks_are_logged() {
        let log = EventLog::new();
        let handler = ScriptedHandler::protocol("P", &log).with_header(QName::new("urn:h", "Trace"));
        handler.init();
        assert_eq!(handler.headers(), vec![QName::new("urn:h", "Trace")]);
        handler.close(&MessageContext::inbound(Message::default()));
        handler.destroy();
        assert_eq!(
            log.lines(),
            vec!["P POST_CONSTRUCT", "P GET_HEADERS", "P CLOSE", "P PRE_DESTROY"]
        );
    }
}
