//! Client-side dispatch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hermes_chain::{
    ChainOutcome, ChainProcessor, HandlerChain, HandlerResolver, Mep, PivotReentry, PortInfo,
    ProcessorOptions,
};
use hermes_core::{
    Direction, ExecutionError, Fault, HeaderBlock, Message, MessageContext, Protocol, QName,
    RequestContext, ResponseContext,
};
use hermes_telemetry::metrics;
use serde_json::Value;
use tracing::{debug, warn};

use crate::executor::SharedExecutor;
use crate::guard::ExchangeGuard;
use crate::response::{AsyncHandler, ResponseFuture};
use crate::transport::Transport;

/// What happens to a fault raised by an outbound handler of a one-way call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OneWayFaultPolicy {
    /// Return the fault to the caller.
    #[default]
    Propagate,
    /// Log and discard the fault.
    Suppress,
}

/// Per-invocation settings.
#[derive(Debug, Clone, Default)]
pub struct InvocationOptions {
    /// How handlers re-enter after one of them pivots.
    pub pivot_reentry: PivotReentry,
    /// Fate of outbound handler faults on one-way calls.
    pub one_way_fault_policy: OneWayFaultPolicy,
    /// How long to wait for a response.
    pub timeout: Option<Duration>,
}

impl InvocationOptions {
    /// Creates default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the pivot re-entry policy.
    pub fn with_pivot_reentry(mut self, pivot_reentry: PivotReentry) -> Self {
        self.pivot_reentry = pivot_reentry;
        self
    }

    /// Sets the one-way fault policy.
    pub fn with_one_way_fault_policy(mut self, policy: OneWayFaultPolicy) -> Self {
        self.one_way_fault_policy = policy;
        self
    }

    /// Sets the response timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// An outgoing request.
#[derive(Debug, Clone, Default)]
pub struct Request {
    payload: Value,
    headers: Vec<HeaderBlock>,
    context: RequestContext,
    options: InvocationOptions,
}

impl Request {
    /// Creates a request carrying `payload`.
    pub fn new(payload: impl Into<Value>) -> Self {
        Self {
            payload: payload.into(),
            ..Self::default()
        }
    }

    /// Adds a header block.
    pub fn with_header(mut self, header: HeaderBlock) -> Self {
        self.headers.push(header);
        self
    }

    /// Adds a request context property, visible to handlers as APPLICATION scoped.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key, value);
        self
    }

    /// Replaces the request context.
    pub fn with_context(mut self, context: RequestContext) -> Self {
        self.context = context;
        self
    }

    /// Sets the invocation options.
    pub fn with_options(mut self, options: InvocationOptions) -> Self {
        self.options = options;
        self
    }

    /// The payload.
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// The request context.
    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    /// The invocation options.
    pub fn options(&self) -> &InvocationOptions {
        &self.options
    }

    fn into_parts(self) -> (Message, RequestContext, InvocationOptions) {
        let mut message = Message::new(self.payload);
        for header in self.headers {
            message.add_header(header);
        }
        (message, self.context, self.options)
    }
}

/// A response returned to the application.
#[derive(Debug, Clone)]
pub struct Response {
    payload: Value,
    headers: Vec<HeaderBlock>,
    context: ResponseContext,
}

impl Response {
    fn from_context(ctx: &MessageContext) -> Self {
        Self {
            payload: ctx.payload().clone(),
            headers: ctx.message().headers().to_vec(),
            context: ctx.application_context(),
        }
    }

    /// The payload.
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Consumes the response, returning its payload.
    pub fn into_payload(self) -> Value {
        self.payload
    }

    /// Response header blocks.
    pub fn headers(&self) -> &[HeaderBlock] {
        &self.headers
    }

    /// APPLICATION-scoped properties of the exchange.
    pub fn context(&self) -> &ResponseContext {
        &self.context
    }

    /// A response context property. HANDLER-scoped properties are absent.
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.context.get(key)
    }
}

struct Inner {
    port: PortInfo,
    address: String,
    chain: HandlerChain,
    transport: Arc<dyn Transport>,
}

impl Inner {
    fn processor(&self, options: &InvocationOptions) -> ChainProcessor {
        let options = ProcessorOptions::new()
            .with_protocol(self.port.binding)
            .with_pivot_reentry(options.pivot_reentry);
        ChainProcessor::with_options(self.chain.clone(), options)
    }

    async fn exchange(&self, request: Request) -> Result<Response, Fault> {
        let started = Instant::now();
        let (message, context, options) = request.into_parts();
        let ctx = MessageContext::outbound(message).with_application_context(&context);
        let mut exchange = ExchangeGuard::new(self.processor(&options), ctx, Direction::Inbound);

        let result = {
            let (processor, ctx) = exchange.parts();
            self.run(processor, ctx, &options).await
        };
        exchange.finish();
        let ctx = exchange.context();

        let outcome = if result.is_ok() { "completed" } else { "fault" };
        debug!(exchange_id = %ctx.id(), address = %self.address, outcome, "client exchange finished");
        metrics::record_exchange("client", outcome, started.elapsed());
        result.map(|()| Response::from_context(ctx))
    }

    async fn run(
        &self,
        processor: &mut ChainProcessor,
        ctx: &mut MessageContext,
        options: &InvocationOptions,
    ) -> Result<(), Fault> {
        match processor.process_chain(ctx, Direction::Outbound, Mep::Request, true)? {
            ChainOutcome::Completed => {}
            ChainOutcome::Reversed | ChainOutcome::Halted(_) => return fault_or_ok(ctx),
        }

        let sent = self.transport.send(&self.address, ctx.message().clone(), false);
        let reply = match options.timeout {
            Some(limit) => tokio::time::timeout(limit, sent)
                .await
                .map_err(|_| Fault::runtime(format!("no response within {limit:?}")))?,
            None => sent.await,
        }?;
        let reply = reply.ok_or_else(|| Fault::runtime("no response received"))?;
        ctx.set_message(reply);

        if ctx.message().is_fault() {
            processor.process_fault(ctx, Direction::Inbound)?;
            return fault_or_ok(ctx);
        }

        match processor.process_chain(ctx, Direction::Inbound, Mep::Response, false)? {
            ChainOutcome::Halted(_) => debug!(exchange_id = %ctx.id(), "response chain stopped early"),
            ChainOutcome::Completed | ChainOutcome::Reversed => {}
        }
        Ok(())
    }
}

fn fault_or_ok(ctx: &MessageContext) -> Result<(), Fault> {
    match ctx.message().to_fault() {
        Some(fault) => Err(fault),
        None => Ok(()),
    }
}

/// Sends requests through a client handler chain to one address.
///
/// The handlers are created once, with the dispatcher, and destroyed by
/// [`shutdown`](Self::shutdown) or on drop.
pub struct Dispatcher {
    inner: Arc<Inner>,
    executor: SharedExecutor,
    destroyed: AtomicBool,
}

impl Dispatcher {
    /// Starts building a dispatcher for `address`.
    pub fn builder(address: impl Into<String>, transport: impl Transport) -> DispatcherBuilder {
        DispatcherBuilder::new(address, transport)
    }

    /// The endpoint address.
    pub fn address(&self) -> &str {
        &self.inner.address
    }

    /// The port invoked.
    pub fn port(&self) -> &PortInfo {
        &self.inner.port
    }

    /// The client handler chain.
    pub fn chain(&self) -> &HandlerChain {
        &self.inner.chain
    }

    /// The executor used for async and one-way dispatch.
    pub fn executor(&self) -> &SharedExecutor {
        &self.executor
    }

    /// Returns `true` once the handlers have been destroyed.
    pub fn is_shutdown(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Invokes the endpoint and waits for the response.
    pub async fn invoke(&self, request: Request) -> Result<Response, Fault> {
        self.ensure_open()?;
        self.inner.exchange(request).await
    }

    /// Sends a one-way message.
    ///
    /// The outbound chain runs on the caller. Delivery happens on the
    /// executor and its failures are logged, never returned.
    pub fn invoke_one_way(&self, request: Request) -> Result<(), Fault> {
        self.ensure_open()?;
        let inner = &self.inner;
        let (message, context, options) = request.into_parts();
        let mut ctx = MessageContext::outbound(message).with_application_context(&context);
        let mut processor = inner.processor(&options);

        match processor.process_chain(&mut ctx, Direction::Outbound, Mep::Request, false) {
            Ok(ChainOutcome::Halted(None)) => {
                debug!(exchange_id = %ctx.id(), "one-way message not sent, handler pivoted");
                return Ok(());
            }
            Ok(ChainOutcome::Halted(Some(fault))) | Err(fault) => {
                return match options.one_way_fault_policy {
                    OneWayFaultPolicy::Propagate => Err(fault),
                    OneWayFaultPolicy::Suppress => {
                        warn!(exchange_id = %ctx.id(), error = %fault, "suppressing one-way handler fault");
                        metrics::record_one_way_suppressed();
                        Ok(())
                    }
                };
            }
            Ok(ChainOutcome::Completed | ChainOutcome::Reversed) => {}
        }

        inner.transport.resolve(&inner.address).map_err(Fault::connection)?;

        let exchange_id = ctx.id();
        let transport = Arc::clone(&inner.transport);
        let address = inner.address.clone();
        let message = ctx.into_message();
        self.executor
            .spawn_detached("invoke_one_way", async move {
                match transport.send(&address, message, true).await {
                    Ok(_) => debug!(exchange_id = %exchange_id, address = %address, "one-way message delivered"),
                    Err(fault) => {
                        warn!(exchange_id = %exchange_id, address = %address, error = %fault, "one-way delivery failed");
                        metrics::record_one_way_suppressed();
                    }
                }
            })
            .map_err(|err| Fault::runtime_with_source("one-way handoff failed", err))?;
        Ok(())
    }

    /// Invokes the endpoint on the executor, returning a polling handle.
    pub fn invoke_async(&self, request: Request) -> ResponseFuture<Response> {
        if let Err(fault) = self.ensure_open() {
            return ResponseFuture::failed(ExecutionError::Failed(fault));
        }
        let inner = Arc::clone(&self.inner);
        self.executor
            .submit("invoke_async", async move { inner.exchange(request).await })
    }

    /// Invokes the endpoint on the executor, pushing the outcome to `handler`.
    pub fn invoke_with_callback<H>(&self, request: Request, handler: H) -> ResponseFuture<()>
    where
        H: AsyncHandler<Response>,
    {
        if let Err(fault) = self.ensure_open() {
            handler.handle_response(Err(ExecutionError::Failed(fault)));
            return ResponseFuture::failed(ExecutionError::Failed(Fault::runtime(
                "dispatcher is shut down",
            )));
        }
        let inner = Arc::clone(&self.inner);
        self.executor.submit_with_callback(
            "invoke_with_callback",
            async move { inner.exchange(request).await },
            handler,
        )
    }

    /// Destroys the client handlers. Later invocations fail.
    pub fn shutdown(&self) {
        if !self.destroyed.swap(true, Ordering::AcqRel) {
            debug!(address = %self.inner.address, "destroying client handlers");
            self.inner.chain.destroy_all();
        }
    }

    fn ensure_open(&self) -> Result<(), Fault> {
        if self.is_shutdown() {
            Err(Fault::runtime("dispatcher is shut down"))
        } else {
            Ok(())
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("address", &self.inner.address)
            .field("port", &self.inner.port)
            .field("chain", &self.inner.chain)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Dispatcher`].
pub struct DispatcherBuilder {
    address: String,
    transport: Arc<dyn Transport>,
    port: PortInfo,
    chain: HandlerChain,
    resolver: Option<Box<dyn HandlerResolver>>,
    executor: Option<SharedExecutor>,
}

impl DispatcherBuilder {
    fn new(address: impl Into<String>, transport: impl Transport) -> Self {
        Self {
            address: address.into(),
            transport: Arc::new(transport),
            port: PortInfo::new(QName::local("Dispatch"), QName::local("DispatchPort"), Protocol::default()),
            chain: HandlerChain::empty(),
            resolver: None,
            executor: None,
        }
    }

    /// Sets the port metadata.
    pub fn port(mut self, port: PortInfo) -> Self {
        self.port = port;
        self
    }

    /// Sets the handler chain. Its handlers are initialised on build.
    pub fn chain(mut self, chain: HandlerChain) -> Self {
        self.chain = chain;
        self
    }

    /// Resolves the handler chain for the port on build instead.
    pub fn resolver(mut self, resolver: impl HandlerResolver) -> Self {
        self.resolver = Some(Box::new(resolver));
        self
    }

    /// Shares an executor.
    pub fn executor(mut self, executor: SharedExecutor) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Builds the dispatcher.
    pub fn build(self) -> Result<Dispatcher, Fault> {
        let chain = match &self.resolver {
            Some(resolver) if resolver.owns_instances() => resolver.resolve(&self.port)?,
            Some(resolver) => {
                let chain = resolver.resolve(&self.port)?;
                chain.init_all();
                chain
            }
            None => {
                self.chain.init_all();
                self.chain
            }
        };

        Ok(Dispatcher {
            inner: Arc::new(Inner {
                port: self.port,
                address: self.address,
                chain,
                transport: self.transport,
            }),
            executor: self.executor.unwrap_or_default(),
            destroyed: AtomicBool::new(false),
        })
    }
}
