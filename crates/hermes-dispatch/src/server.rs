//! Server-side exchange processing.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use futures_util::future::BoxFuture;
use hermes_chain::{
    ChainOutcome, ChainProcessor, HandlerChain, HandlerResolver, Mep, PivotReentry, PortInfo,
    ProcessorOptions,
};
use hermes_core::{
    ApplicationContext, Direction, Fault, HeaderBlock, Message, MessageContext, QName, Scope,
    WEBMETHOD_EXCEPTION,
};
use hermes_telemetry::metrics;
use serde_json::Value;
use tracing::{debug, warn};

use crate::guard::ExchangeGuard;

/// What an endpoint receives for one exchange.
#[derive(Debug, Clone)]
pub struct EndpointRequest {
    /// Request payload.
    pub payload: Value,
    /// Request header blocks.
    pub headers: Vec<HeaderBlock>,
    /// APPLICATION-scoped properties of the exchange.
    pub context: ApplicationContext,
}

/// A service implementation.
pub trait Endpoint: Send + Sync + 'static {
    /// Handles a request, returning the response payload.
    fn invoke(&self, request: EndpointRequest) -> BoxFuture<'_, Result<Value, Fault>>;

    /// Must-understand headers the endpoint processes itself.
    fn understood_headers(&self) -> Vec<QName> {
        Vec::new()
    }
}

/// Endpoint backed by an async closure.
pub struct FnEndpoint<F> {
    f: F,
}

impl<F, Fut> FnEndpoint<F>
where
    F: Fn(EndpointRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, Fault>> + Send + 'static,
{
    /// Wraps a closure.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F, Fut> Endpoint for FnEndpoint<F>
where
    F: Fn(EndpointRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, Fault>> + Send + 'static,
{
    fn invoke(&self, request: EndpointRequest) -> BoxFuture<'_, Result<Value, Fault>> {
        Box::pin((self.f)(request))
    }
}

/// Server runtime settings.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    /// Put the full error chain of runtime faults into fault strings.
    pub expose_error_chain: bool,
    /// How handlers re-enter after one of them pivots.
    pub pivot_reentry: PivotReentry,
}

impl ServerConfig {
    /// Creates default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Exposes runtime fault error chains to callers.
    pub fn with_error_chain(mut self, expose: bool) -> Self {
        self.expose_error_chain = expose;
        self
    }

    /// Sets the pivot re-entry policy.
    pub fn with_pivot_reentry(mut self, pivot_reentry: PivotReentry) -> Self {
        self.pivot_reentry = pivot_reentry;
        self
    }
}

/// Processes exchanges for one port.
///
/// When the resolver [owns its instances](HandlerResolver::owns_instances),
/// every exchange gets fresh handlers that are destroyed once the exchange is
/// over, whether or not a response is returned. Otherwise the shared handlers
/// are initialised before the first exchange and destroyed with the runtime.
pub struct ServerRuntime {
    port: PortInfo,
    resolver: Arc<dyn HandlerResolver>,
    endpoint: Arc<dyn Endpoint>,
    config: ServerConfig,
    shared: OnceLock<HandlerChain>,
}

impl ServerRuntime {
    /// Creates a runtime.
    pub fn new(port: PortInfo, resolver: impl HandlerResolver, endpoint: impl Endpoint) -> Self {
        Self {
            port,
            resolver: Arc::new(resolver),
            endpoint: Arc::new(endpoint),
            config: ServerConfig::default(),
            shared: OnceLock::new(),
        }
    }

    /// Replaces the settings.
    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// The port served.
    pub fn port(&self) -> &PortInfo {
        &self.port
    }

    /// The settings.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Handles one incoming message.
    ///
    /// Returns the response, or `None` for one-way messages. Faults raised
    /// during processing are answered with fault messages; an error is only
    /// returned when no fault message can be built for the binding.
    pub async fn handle(&self, message: Message, one_way: bool) -> Result<Option<Message>, Fault> {
        let started = Instant::now();

        let chain = match self.chain() {
            Ok(chain) => chain,
            Err(fault) => {
                warn!(port = %self.port.port_name, error = %fault, "handler resolution failed");
                metrics::record_exchange("server", "fault", started.elapsed());
                return self.fault_response(fault, one_way);
            }
        };

        let mut ctx = MessageContext::inbound(message);
        ctx.set_roles(self.resolver.roles(&self.port));
        let options = ProcessorOptions::new()
            .with_protocol(self.port.binding)
            .with_pivot_reentry(self.config.pivot_reentry)
            .with_error_chain(self.config.expose_error_chain);
        let processor = ChainProcessor::with_options(chain.clone(), options);
        let mut exchange =
            ExchangeGuard::new(processor, ctx, Direction::Outbound).destroying(self.resolver.owns_instances());

        let result = {
            let (processor, ctx) = exchange.parts();
            self.exchange(processor, ctx, &chain, one_way).await
        };
        exchange.finish();

        let outcome = match &result {
            Ok(Some(response)) if response.is_fault() => "fault",
            Ok(_) => "completed",
            Err(_) => "error",
        };
        debug!(exchange_id = %exchange.context().id(), outcome, "server exchange finished");
        metrics::record_exchange("server", outcome, started.elapsed());
        result
    }

    fn chain(&self) -> Result<HandlerChain, Fault> {
        if self.resolver.owns_instances() {
            return self.resolver.resolve(&self.port);
        }
        if let Some(chain) = self.shared.get() {
            return Ok(chain.clone());
        }
        let resolved = self.resolver.resolve(&self.port)?;
        let chain = self.shared.get_or_init(|| {
            resolved.init_all();
            resolved
        });
        Ok(chain.clone())
    }

    async fn exchange(
        &self,
        processor: &mut ChainProcessor,
        ctx: &mut MessageContext,
        chain: &HandlerChain,
        one_way: bool,
    ) -> Result<Option<Message>, Fault> {
        let mut understood: HashSet<QName> = chain.understood_headers().into_iter().collect();
        understood.extend(self.endpoint.understood_headers());
        let not_understood: Vec<QName> = ctx
            .message()
            .headers()
            .iter()
            .filter(|h| h.must_understand && !understood.contains(&h.name))
            .map(|h| h.name.clone())
            .collect();
        if !not_understood.is_empty() {
            debug!(exchange_id = %ctx.id(), headers = ?not_understood, "must understand check failed");
            return self.fault_response(Fault::must_understand(not_understood), one_way);
        }

        match processor.process_chain(ctx, Direction::Inbound, Mep::Request, !one_way) {
            Ok(ChainOutcome::Completed) => {}
            Ok(ChainOutcome::Reversed) => return Ok(take_response(ctx, one_way)),
            Ok(ChainOutcome::Halted(fault)) => {
                if let Some(fault) = fault {
                    warn!(exchange_id = %ctx.id(), error = %fault, "one-way request stopped by handler fault");
                }
                return Ok(None);
            }
            Err(fault) => return self.fault_response(fault, one_way),
        }

        let request = EndpointRequest {
            payload: ctx.payload().clone(),
            headers: ctx.message().headers().to_vec(),
            context: ctx.application_context(),
        };
        let result = self.endpoint.invoke(request).await;

        if one_way {
            if let Err(fault) = result {
                warn!(exchange_id = %ctx.id(), error = %fault, "one-way endpoint failed");
            }
            return Ok(None);
        }

        match result {
            Ok(payload) => {
                ctx.set_message(Message::new(payload));
                match processor.process_chain(ctx, Direction::Outbound, Mep::Response, false) {
                    Ok(_) => Ok(take_response(ctx, false)),
                    Err(fault) => self.fault_response(fault, false),
                }
            }
            Err(fault) => {
                debug!(exchange_id = %ctx.id(), error = %fault, "endpoint failed");
                ctx.set_property_scoped(WEBMETHOD_EXCEPTION, fault.to_string(), Scope::Handler);
                let message = Message::from_fault(&fault, self.port.binding, self.config.expose_error_chain)?;
                ctx.set_message(message);
                match processor.process_fault(ctx, Direction::Outbound) {
                    Ok(()) => Ok(take_response(ctx, false)),
                    Err(fault) => self.fault_response(fault, false),
                }
            }
        }
    }

    fn fault_response(&self, fault: Fault, one_way: bool) -> Result<Option<Message>, Fault> {
        if one_way {
            warn!(error = %fault, "dropping fault on one-way exchange");
            return Ok(None);
        }
        Message::from_fault(&fault, self.port.binding, self.config.expose_error_chain).map(Some)
    }
}

fn take_response(ctx: &mut MessageContext, one_way: bool) -> Option<Message> {
    (!one_way).then(|| ctx.set_message(Message::default()))
}

impl Drop for ServerRuntime {
    fn drop(&mut self) {
        if let Some(chain) = self.shared.take() {
            chain.destroy_all();
        }
    }
}

impl std::fmt::Debug for ServerRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerRuntime")
            .field("port", &self.port)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
