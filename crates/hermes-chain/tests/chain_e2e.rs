//! End-to-end traversal tests over a four-handler chain.
//!
//! The chain is declared `[S1, L2, S2, L1]` and sorts to `[L2, L1, S1, S2]`:
//! logical handlers first, declared order kept within each kind.

use hermes_chain::{
    ChainOutcome, ChainProcessor, ChainState, ConfiguredResolver, HandlerChain,
    HandlerChainDescriptor, HandlerDescriptor, HandlerRegistry, HandlerResolver, Mep, PivotReentry,
    PortInfo, ProcessorOptions,
};
use hermes_core::{Direction, Fault, Message, MessageContext, Phase, Protocol, QName};
use hermes_test::{Behavior, EventLog, ScriptedHandler};
use proptest::prelude::*;

struct Fixture {
    log: EventLog,
    l1: ScriptedHandler,
    l2: ScriptedHandler,
    s1: ScriptedHandler,
    s2: ScriptedHandler,
}

impl Fixture {
    fn new() -> Self {
        let log = EventLog::new();
        Self {
            l1: ScriptedHandler::logical("L1", &log),
            l2: ScriptedHandler::logical("L2", &log),
            s1: ScriptedHandler::protocol("S1", &log),
            s2: ScriptedHandler::protocol("S2", &log),
            log,
        }
    }

    fn processor(self, reentry: PivotReentry) -> (ChainProcessor, EventLog) {
        let chain = HandlerChain::builder()
            .handler(self.s1)
            .handler(self.l2)
            .handler(self.s2)
            .handler(self.l1)
            .build();
        assert_eq!(chain.names(), vec!["L2", "L1", "S1", "S2"]);
        let options = ProcessorOptions::new().with_pivot_reentry(reentry);
        (ChainProcessor::with_options(chain, options), self.log)
    }
}

fn run(
    fixture: Fixture,
    direction: Direction,
    mep: Mep,
    expect_response: bool,
) -> (Result<ChainOutcome, Fault>, MessageContext, EventLog) {
    let (mut processor, log) = fixture.processor(PivotReentry::Skip);
    let mut ctx = MessageContext::new(direction, Message::default());
    let result = processor.process_chain(&mut ctx, direction, mep, expect_response);
    assert_eq!(processor.state(), ChainState::Closed);
    (result, ctx, log)
}

#[test]
fn test_inbound_request_expecting_response_stays_open() {
    let (mut processor, log) = Fixture::new().processor(PivotReentry::Skip);
    let mut ctx = MessageContext::inbound(Message::default());
    let outcome = processor
        .process_chain(&mut ctx, Direction::Inbound, Mep::Request, true)
        .unwrap();
    assert!(outcome.is_completed());
    assert_eq!(log.compact(), "S2m:S1m:L1m:L2m:");
    assert_eq!(processor.state(), ChainState::InboundRunning);
}

#[test]
fn test_inbound_request_without_response_closes() {
    let (result, _, log) = run(Fixture::new(), Direction::Inbound, Mep::Request, false);
    assert!(result.unwrap().is_completed());
    assert_eq!(log.compact(), "S2m:S1m:L1m:L2m:L2c:L1c:S1c:S2c:");
}

#[test]
fn test_inbound_response_closes_in_direction_order() {
    let (result, _, log) = run(Fixture::new(), Direction::Inbound, Mep::Response, false);
    assert!(result.unwrap().is_completed());
    assert_eq!(log.compact(), "S2m:S1m:L1m:L2m:S2c:S1c:L1c:L2c:");
}

#[test]
fn test_outbound_request_expecting_response_stays_open() {
    let (mut processor, log) = Fixture::new().processor(PivotReentry::Skip);
    let mut ctx = MessageContext::outbound(Message::default());
    let outcome = processor
        .process_chain(&mut ctx, Direction::Outbound, Mep::Request, true)
        .unwrap();
    assert!(outcome.is_completed());
    assert_eq!(log.compact(), "L2m:L1m:S1m:S2m:");
}

#[test]
fn test_outbound_request_without_response_closes() {
    let (result, _, log) = run(Fixture::new(), Direction::Outbound, Mep::Request, false);
    assert!(result.unwrap().is_completed());
    assert_eq!(log.compact(), "L2m:L1m:S1m:S2m:S2c:S1c:L1c:L2c:");
}

#[test]
fn test_outbound_response_closes_in_direction_order() {
    let (result, _, log) = run(Fixture::new(), Direction::Outbound, Mep::Response, false);
    assert!(result.unwrap().is_completed());
    assert_eq!(log.compact(), "L2m:L1m:S1m:S2m:L2c:L1c:S1c:S2c:");
}

#[test]
fn test_response_never_expects_response() {
    let (result, _, log) = run(Fixture::new(), Direction::Outbound, Mep::Response, true);
    assert!(result.unwrap().is_completed());
    assert_eq!(log.compact(), "L2m:L1m:S1m:S2m:L2c:L1c:S1c:S2c:");
}

#[test]
fn test_pivot_inbound_reverses() {
    let mut fixture = Fixture::new();
    fixture.l1 = fixture.l1.on_message(Behavior::Pivot);
    let (result, ctx, log) = run(fixture, Direction::Inbound, Mep::Request, true);
    assert!(result.unwrap().is_reversed());
    assert_eq!(log.compact(), "S2m:S1m:L1m:S1m:S2m:L1c:S1c:S2c:");
    assert_eq!(ctx.direction(), Direction::Outbound);
}

#[test]
fn test_pivot_outbound_reverses() {
    let mut fixture = Fixture::new();
    fixture.l1 = fixture.l1.on_message(Behavior::Pivot);
    let (result, _, log) = run(fixture, Direction::Outbound, Mep::Request, true);
    assert!(result.unwrap().is_reversed());
    assert_eq!(log.compact(), "L2m:L1m:L2m:L1c:L2c:");
}

#[test]
fn test_pivot_without_response_halts() {
    let mut fixture = Fixture::new();
    fixture.l1 = fixture.l1.on_message(Behavior::Pivot);
    let (result, _, log) = run(fixture, Direction::Outbound, Mep::Request, false);
    assert!(matches!(result.unwrap(), ChainOutcome::Halted(None)));
    assert_eq!(log.compact(), "L2m:L1m:L1c:L2c:");
}

#[test]
fn test_pivot_includes_pivoting_handler_by_default() {
    let mut fixture = Fixture::new();
    fixture.l1 = fixture.l1.on_message_inbound(Behavior::Pivot);
    let (mut processor, log) = fixture.processor(PivotReentry::default());
    let mut ctx = MessageContext::inbound(Message::default());
    let outcome = processor
        .process_chain(&mut ctx, Direction::Inbound, Mep::Request, true)
        .unwrap();
    assert!(outcome.is_reversed());
    assert_eq!(log.compact(), "S2m:S1m:L1m:L1m:S1m:S2m:L1c:S1c:S2c:");
}

#[test]
fn test_protocol_fault_runs_fault_pass() {
    let mut fixture = Fixture::new();
    fixture.l1 = fixture.l1.on_message(Behavior::protocol_fault("L1 refused"));
    let (result, ctx, log) = run(fixture, Direction::Inbound, Mep::Request, true);
    assert!(result.unwrap().is_reversed());
    assert_eq!(log.compact(), "S2m:S1m:L1m:S1f:S2f:L1c:S1c:S2c:");
    assert_eq!(ctx.phase(), Phase::Fault);
    assert_eq!(ctx.message().to_fault().unwrap().fault_string(), "L1 refused");
}

#[test]
fn test_protocol_fault_without_response_halts() {
    let mut fixture = Fixture::new();
    fixture.l1 = fixture.l1.on_message(Behavior::protocol_fault("L1 refused"));
    let (result, _, log) = run(fixture, Direction::Inbound, Mep::Request, false);
    match result.unwrap() {
        ChainOutcome::Halted(Some(fault)) => assert!(fault.is_protocol()),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(log.compact(), "S2m:S1m:L1m:L1c:S1c:S2c:");
}

#[test]
fn test_runtime_fault_closes_without_fault_pass() {
    let mut fixture = Fixture::new();
    fixture.l1 = fixture.l1.on_message(Behavior::runtime_fault("L1 broke"));
    let (result, _, log) = run(fixture, Direction::Inbound, Mep::Request, true);
    assert!(result.unwrap_err().is_runtime());
    assert_eq!(log.compact(), "S2m:S1m:L1m:L1c:S1c:S2c:");
}

#[test]
fn test_fault_pass_stops_at_pivot() {
    let mut fixture = Fixture::new();
    fixture.l1 = fixture.l1.on_message(Behavior::protocol_fault("L1 refused"));
    fixture.s1 = fixture.s1.on_fault(Behavior::Pivot);
    let (result, _, log) = run(fixture, Direction::Inbound, Mep::Request, true);
    assert!(result.unwrap().is_reversed());
    assert_eq!(log.compact(), "S2m:S1m:L1m:S1f:L1c:S1c:S2c:");
}

#[test]
fn test_fault_in_fault_pass_propagates() {
    let mut fixture = Fixture::new();
    fixture.l1 = fixture.l1.on_message(Behavior::protocol_fault("L1 refused"));
    fixture.s1 = fixture.s1.on_fault(Behavior::protocol_fault("S1 refused too"));
    let (result, _, log) = run(fixture, Direction::Inbound, Mep::Request, true);
    assert_eq!(result.unwrap_err().fault_string(), "S1 refused too");
    assert_eq!(log.compact(), "S2m:S1m:L1m:S1f:L1c:S1c:S2c:");
}

#[test]
fn test_protocol_fault_on_http_is_runtime_error() {
    let mut fixture = Fixture::new();
    fixture.l1 = fixture.l1.on_message(Behavior::protocol_fault("L1 refused"));
    let (processor, log) = fixture.processor(PivotReentry::Skip);
    let chain = processor.chain().clone();
    let mut processor =
        ChainProcessor::with_options(chain, ProcessorOptions::new().with_protocol(Protocol::Http));
    let mut ctx = MessageContext::inbound(Message::default());
    let err = processor
        .process_chain(&mut ctx, Direction::Inbound, Mep::Request, true)
        .unwrap_err();
    assert!(err.is_runtime());
    assert_eq!(log.compact(), "S2m:S1m:L1m:L1c:S1c:S2c:");
}

#[test]
fn test_process_fault_outbound() {
    let (mut processor, log) = Fixture::new().processor(PivotReentry::Skip);
    let mut ctx = MessageContext::outbound(Message::default());
    processor.process_fault(&mut ctx, Direction::Outbound).unwrap();
    assert_eq!(log.compact(), "L2f:L1f:S1f:S2f:L2c:L1c:S1c:S2c:");
    assert_eq!(processor.state(), ChainState::Closed);
}

#[test]
fn test_process_fault_stops_at_pivot() {
    let mut fixture = Fixture::new();
    fixture.l1 = fixture.l1.on_fault(Behavior::Pivot);
    let (mut processor, log) = fixture.processor(PivotReentry::Skip);
    let mut ctx = MessageContext::outbound(Message::default());
    processor.process_fault(&mut ctx, Direction::Outbound).unwrap();
    assert_eq!(log.compact(), "L2f:L1f:L2c:L1c:S1c:S2c:");
}

#[test]
fn test_process_fault_propagates_handler_fault() {
    let mut fixture = Fixture::new();
    fixture.l1 = fixture.l1.on_fault(Behavior::protocol_fault("L1 fault"));
    let (mut processor, log) = fixture.processor(PivotReentry::Skip);
    let mut ctx = MessageContext::inbound(Message::default());
    let err = processor.process_fault(&mut ctx, Direction::Inbound).unwrap_err();
    assert_eq!(err.fault_string(), "L1 fault");
    assert_eq!(log.compact(), "S2f:S1f:L1f:S2c:S1c:L1c:L2c:");
}

#[test]
fn test_close_all_is_idempotent() {
    let (mut processor, log) = Fixture::new().processor(PivotReentry::Skip);
    let mut ctx = MessageContext::outbound(Message::default());
    let _ = processor.process_chain(&mut ctx, Direction::Outbound, Mep::Request, true);
    processor.close_all(&ctx, Direction::Inbound);
    processor.close_all(&ctx, Direction::Inbound);
    assert_eq!(log.compact(), "L2m:L1m:S1m:S2m:S2c:S1c:L1c:L2c:");
}

#[test]
fn test_configured_resolver_builds_scripted_chain() {
    let log = EventLog::new();
    let registry = HandlerRegistry::new();
    registry.register_prototype("soap", ScriptedHandler::protocol("S1", &log));
    registry.register_prototype("audit", ScriptedHandler::logical("L1", &log));

    let chains = vec![HandlerChainDescriptor::new()
        .port_name_pattern("{http://mysample}My*")
        .protocol_binding("##SOAP11_HTTP ##SOAP12_HTTP")
        .handler(HandlerDescriptor::new("soap"))
        .handler(HandlerDescriptor::new("audit"))];
    let resolver = ConfiguredResolver::new(chains, registry);

    let matching = PortInfo::new(
        QName::local("Service"),
        QName::with_prefix("http://mysample", "MyPort", "prefix"),
        Protocol::Soap12,
    );
    let chain = resolver.resolve(&matching).unwrap();
    assert_eq!(chain.names(), vec!["L1", "S1"]);
    assert_eq!(log.lines(), vec!["S1 POST_CONSTRUCT", "L1 POST_CONSTRUCT"]);

    let http = PortInfo::new(matching.service_name.clone(), matching.port_name.clone(), Protocol::Http);
    assert!(resolver.resolve(&http).unwrap().is_empty());
}

fn chain_of(kinds: &[bool], log: &EventLog, pivot_at: Option<usize>) -> HandlerChain {
    kinds
        .iter()
        .enumerate()
        .map(|(i, &logical)| {
            let name = format!("H{i}");
            let handler = if logical {
                ScriptedHandler::logical(name, log)
            } else {
                ScriptedHandler::protocol(name, log)
            };
            let handler = if pivot_at == Some(i) {
                handler.on_message_outbound(Behavior::Pivot)
            } else {
                handler
            };
            std::sync::Arc::new(handler) as hermes_core::BoxedHandler
        })
        .collect()
}

fn entries(log: &EventLog, code: char) -> Vec<String> {
    log.compact()
        .split(':')
        .filter(|e| e.ends_with(code))
        .map(|e| e.trim_end_matches(code).to_string())
        .collect()
}

proptest! {
    #[test]
    fn prop_close_reverses_invocation(kinds in prop::collection::vec(any::<bool>(), 1..8)) {
        let log = EventLog::new();
        let chain = chain_of(&kinds, &log, None);
        let mut processor = ChainProcessor::new(chain);
        let mut ctx = MessageContext::outbound(Message::default());
        let outcome = processor
            .process_chain(&mut ctx, Direction::Outbound, Mep::Request, false)
            .unwrap();
        prop_assert!(outcome.is_completed());

        let invoked = entries(&log, 'm');
        let mut closed = entries(&log, 'c');
        closed.reverse();
        prop_assert_eq!(invoked.len(), kinds.len());
        prop_assert_eq!(invoked, closed);
    }

    #[test]
    fn prop_pivot_reenters_touched_handlers(
        (kinds, k) in prop::collection::vec(any::<bool>(), 1..8)
            .prop_flat_map(|kinds| { let n = kinds.len(); (Just(kinds), 0..n) })
    ) {
        let log = EventLog::new();
        let chain = chain_of(&kinds, &log, None);
        // Pivot on whichever handler sorts to position k.
        let pivot_name = chain.get(k).map(|h| h.name().to_string()).unwrap();
        let pivot_index: usize = pivot_name[1..].parse().unwrap();
        let chain = chain_of(&kinds, &log, Some(pivot_index));
        let sorted: Vec<String> = chain.names().iter().map(|n| (*n).to_string()).collect();

        let mut processor = ChainProcessor::new(chain);
        let mut ctx = MessageContext::outbound(Message::default());
        let outcome = processor
            .process_chain(&mut ctx, Direction::Outbound, Mep::Request, true)
            .unwrap();
        prop_assert!(outcome.is_reversed());

        let mut expected: Vec<String> = sorted[..=k].to_vec();
        expected.extend(sorted[..=k].iter().rev().cloned());
        prop_assert_eq!(entries(&log, 'm'), expected);

        let closed: Vec<String> = sorted[..=k].iter().rev().cloned().collect();
        prop_assert_eq!(entries(&log, 'c'), closed);
    }
}
